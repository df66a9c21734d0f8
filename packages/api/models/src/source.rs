//! Water source detail payload (`GetNewSourceAnswerDetail`).

use serde::Deserialize;

use crate::{FlatRecord, LatLng, ShapeAudited, loose_text};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecondarySourceWire {
    #[serde(default, deserialize_with = "loose_text")]
    code: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    new_source_name: Option<String>,
    #[serde(default)]
    source_lat_lng: serde_json::Value,
}

/// Detail for one water source, keyed by its `newSourceCode`. Only the
/// location is consumed downstream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "FlatRecord")]
pub struct SecondarySourceRecord {
    pub code: Option<String>,
    pub new_source_name: Option<String>,
    /// Raw `sourceLatLng` value; expected to be a `[lat, lng]` pair.
    pub source_lat_lng: serde_json::Value,
    field_names: Vec<String>,
}

impl TryFrom<FlatRecord> for SecondarySourceRecord {
    type Error = serde_json::Error;

    fn try_from(raw: FlatRecord) -> Result<Self, Self::Error> {
        let field_names = raw.keys().cloned().collect();
        let wire: SecondarySourceWire = serde_json::from_value(serde_json::Value::Object(raw))?;

        Ok(Self {
            code: wire.code,
            new_source_name: wire.new_source_name,
            source_lat_lng: wire.source_lat_lng,
            field_names,
        })
    }
}

impl SecondarySourceRecord {
    /// The source location, if `sourceLatLng` is a well-formed pair.
    #[must_use]
    pub fn lat_lng(&self) -> Option<LatLng> {
        LatLng::from_pair(&self.source_lat_lng)
    }
}

impl ShapeAudited for SecondarySourceRecord {
    const LABEL: &'static str = "new source";

    const ALLOWED_FIELDS: &'static [&'static str] = &[
        "newSourceAnswerId",
        "code",
        "newSourceName",
        "agencyRecordId",
        "mergewatersource",
        "canEditNewSourceName",
        "canViewCommitteeMembers",
        "waterSourceName",
        "waterSourceTypeName",
        "waterSourceStatus",
        "statusPin",
        "sourceLatLng",
        "lastVisitDate",
        "isFlagged",
        "canUnflagWaterSource",
        "isCommitteeAvailable",
        "isFundAvailable",
        "installedBy",
        "installDate",
        "DTAW",
        "TTAW",
        "zoneMembership",
        "committeeMembers",
        "informationSectionBgColor",
        "informationSection",
        "activitySection",
        "agencies",
        "formAnswers",
    ];

    fn field_names(&self) -> Vec<&str> {
        self.field_names.iter().map(String::as_str).collect()
    }
}
