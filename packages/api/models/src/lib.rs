#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Wire types for the Madzi Alipo API and the flat record format produced
//! by enrichment.
//!
//! Records that are shape-audited implement [`ShapeAudited`], which exposes
//! the field names seen on the wire alongside the allow-list the harvester
//! expects. Unknown fields never fail decoding.

pub mod detail;
pub mod source;

use serde::{Deserialize, Deserializer, Serialize};

pub use detail::{DetailRecord, DetailScalars, ImageAnswer, PartUsed, Question, VisitStaff};
pub use source::SecondarySourceRecord;

/// A single-level, insertion-ordered record. Key order is significant: it
/// drives the column order of the summary table.
pub type FlatRecord = serde_json::Map<String, serde_json::Value>;

/// Numeric agency identifier (`Id` on the wire).
pub type AgencyId = i64;

/// Numeric visit answer identifier (`answerId` on the wire).
pub type AnswerId = i64;

/// A record whose field names are checked against an allow-list to detect
/// upstream schema drift.
pub trait ShapeAudited {
    /// Human-readable record kind used in diagnostics.
    const LABEL: &'static str;

    /// Field names the harvester knows how to handle.
    const ALLOWED_FIELDS: &'static [&'static str];

    /// Field names present on the decoded record, in wire order.
    fn field_names(&self) -> Vec<&str>;
}

/// A pinpoint attached to an agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyPinpoint {
    pub additional_pinpoint_id: Option<i64>,
    pub name: Option<String>,
}

/// A water source reference attached to an agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyWaterSource {
    pub water_source_id: Option<i64>,
    pub name: Option<String>,
}

/// An agency as returned by the agency listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agency {
    #[serde(rename = "Id")]
    pub id: AgencyId,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub agency_code: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agency_additional_pinpoints: Vec<AgencyPinpoint>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agency_water_sources: Vec<AgencyWaterSource>,
}

/// Identifies one cached unit of work: all visits of one agency in one
/// calendar year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub year: i32,
    pub agency_id: AgencyId,
    pub agency_name: String,
}

impl PartitionKey {
    #[must_use]
    pub fn new(year: i32, agency: &Agency) -> Self {
        Self {
            year,
            agency_id: agency.id,
            agency_name: agency.name.clone(),
        }
    }

    /// Cache file name for this partition. Path separators in the agency
    /// name are replaced with `-` so the name stays a single path segment.
    #[must_use]
    pub fn file_name(&self) -> String {
        let sanitized: String = self
            .agency_name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '-' } else { c })
            .collect();
        format!("{sanitized}.json")
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "year {}, agency {}", self.year, self.agency_name)
    }
}

/// One row of the partition listing, kept as the raw wire object so every
/// field (expected or not) survives into the flat record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoarseLocationRecord(pub FlatRecord);

impl CoarseLocationRecord {
    /// The `answerId` foreign key. Accepts numeric strings as well as
    /// numbers.
    #[must_use]
    pub fn answer_id(&self) -> Option<AnswerId> {
        let value = self.0.get("answerId")?;
        value
            .as_i64()
            .or_else(|| value.as_str()?.trim().parse().ok())
    }
}

impl ShapeAudited for CoarseLocationRecord {
    const LABEL: &'static str = "location";

    const ALLOWED_FIELDS: &'static [&'static str] = &[
        "answerId",
        "agencyRecordId",
        "locationId",
        "newSourceName",
        "waterSourceType",
        "visitDate",
        "visitType",
        "endResult",
        "visitorName",
    ];

    fn field_names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// A resolved source location in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    /// Destructures a `[latitude, longitude]` pair. Returns `None` unless
    /// the value is an array of exactly two numbers.
    #[must_use]
    pub fn from_pair(value: &serde_json::Value) -> Option<Self> {
        match value.as_array()?.as_slice() {
            [lat, lng] => Some(Self {
                latitude: lat.as_f64()?,
                longitude: lng.as_f64()?,
            }),
            _ => None,
        }
    }
}

/// Treats an explicit JSON `null` the same as a missing field.
///
/// # Errors
///
/// Propagates the inner deserializer's error.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reads any JSON value as text. Strings pass through, `null` is `None`,
/// and anything else becomes its JSON form, so a number where a string was
/// expected never fails the whole record.
///
/// # Errors
///
/// Propagates the inner deserializer's error.
pub fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// [`loose_text`] with `null` read as an empty string.
///
/// # Errors
///
/// Propagates the inner deserializer's error.
pub fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_text(deserializer)?.unwrap_or_default())
}
