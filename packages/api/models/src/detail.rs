//! Per-answer detail payload (`GetAnswerDetail`).
//!
//! Everything that is only passed through into the flat record is decoded
//! leniently: an unexpected scalar type is kept as text rather than failing
//! the record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AnswerId, FlatRecord, ShapeAudited, loose_string, loose_text, null_as_default};

/// One answered question of an information, activity, or comment section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "loose_text")]
    pub question_id: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub question_text: Option<String>,
    #[serde(default)]
    pub show_in_section: Value,
    #[serde(default)]
    pub control_type_id: Value,
    #[serde(default, deserialize_with = "loose_text")]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub group_id: Value,
    #[serde(default)]
    pub order_num: Value,
}

impl Question {
    /// Flat record column for this question: `"{questionId} : {questionText}"`.
    #[must_use]
    pub fn column(&self) -> String {
        format!(
            "{} : {}",
            self.question_id.as_deref().unwrap_or_default(),
            self.question_text.as_deref().unwrap_or_default(),
        )
    }

    /// The `(column, answer)` pair, or `None` when the question was left
    /// unanswered.
    #[must_use]
    pub fn flat_entry(&self) -> Option<(String, String)> {
        let answer = self.answer_text.as_deref().filter(|a| !a.is_empty())?;
        Some((self.column(), answer.to_owned()))
    }
}

/// A spare part consumed during a repair visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUsed {
    #[serde(default, deserialize_with = "loose_string")]
    pub name: String,
    #[serde(default)]
    pub quantity: Value,
    #[serde(default)]
    pub cost_mwk: Value,
    #[serde(default)]
    pub unique_ids: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnswer {
    #[serde(default, deserialize_with = "loose_text")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub thumb_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitStaff {
    #[serde(default, deserialize_with = "loose_text")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_pic: Value,
    #[serde(default)]
    pub user_id: Value,
}

impl VisitStaff {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default(),
        )
    }
}

/// Scalar detail fields copied verbatim into the flat record, kept as the
/// raw wire values (`null` included) in [`DetailScalars::FIELDS`] order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailScalars(FlatRecord);

impl DetailScalars {
    /// Every scalar the detail contributes, in merge order.
    pub const FIELDS: &'static [&'static str] = &[
        "answerId",
        "formTypeId",
        "agencyRecordId",
        "answerCode",
        "newSourceCode",
        "newSourceName",
        "waterSourceName",
        "waterSourceStatus",
        "user",
        "insertDate",
        "informationSectionBgColor",
        "canDelete",
        "canEdit",
        "isTelephoneSurvey",
    ];

    /// Picks the scalar fields present in `raw`.
    #[must_use]
    pub fn from_raw(raw: &FlatRecord) -> Self {
        Self(
            Self::FIELDS
                .iter()
                .filter_map(|field| Some(((*field).to_owned(), raw.get(*field)?.clone())))
                .collect(),
        )
    }

    /// The wire value of `field`; `None` if the detail did not carry it.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// `answerId` as a number, accepting numeric strings.
    #[must_use]
    pub fn answer_id(&self) -> Option<AnswerId> {
        let value = self.get("answerId")?;
        value
            .as_i64()
            .or_else(|| value.as_str()?.trim().parse().ok())
    }

    /// `newSourceCode` as text. `null` and the empty string count as absent.
    #[must_use]
    pub fn new_source_code(&self) -> Option<String> {
        match self.get("newSourceCode")? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// The present scalar fields as an ordered map.
    #[must_use]
    pub fn to_flat(&self) -> FlatRecord {
        self.0.clone()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailWire {
    #[serde(default, deserialize_with = "null_as_default")]
    information_section: Vec<Option<Question>>,
    #[serde(default, deserialize_with = "null_as_default")]
    activity_section: Vec<Option<Question>>,
    #[serde(default)]
    comment: Option<Question>,
    #[serde(default, deserialize_with = "null_as_default")]
    part_used: Vec<PartUsed>,
    #[serde(default, deserialize_with = "null_as_default")]
    image_answers: Vec<ImageAnswer>,
    #[serde(default, deserialize_with = "null_as_default")]
    visit_staff: Vec<VisitStaff>,
}

/// Enrichment payload for one visit answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "FlatRecord")]
pub struct DetailRecord {
    pub scalars: DetailScalars,
    pub information_section: Vec<Option<Question>>,
    pub activity_section: Vec<Option<Question>>,
    pub comment: Option<Question>,
    pub part_used: Vec<PartUsed>,
    pub image_answers: Vec<ImageAnswer>,
    pub visit_staff: Vec<VisitStaff>,
    field_names: Vec<String>,
}

impl TryFrom<FlatRecord> for DetailRecord {
    type Error = serde_json::Error;

    fn try_from(raw: FlatRecord) -> Result<Self, Self::Error> {
        let field_names = raw.keys().cloned().collect();
        let scalars = DetailScalars::from_raw(&raw);
        let wire: DetailWire = serde_json::from_value(Value::Object(raw))?;

        Ok(Self {
            scalars,
            information_section: wire.information_section,
            activity_section: wire.activity_section,
            comment: wire.comment,
            part_used: wire.part_used,
            image_answers: wire.image_answers,
            visit_staff: wire.visit_staff,
            field_names,
        })
    }
}

impl DetailRecord {
    /// Every question of the record in merge order: information section,
    /// activity section, then the comment.
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.information_section
            .iter()
            .chain(self.activity_section.iter())
            .chain(std::iter::once(&self.comment))
            .flatten()
    }
}

impl ShapeAudited for DetailRecord {
    const LABEL: &'static str = "detail";

    const ALLOWED_FIELDS: &'static [&'static str] = &[
        "answerId",
        "formTypeId",
        "agencyRecordId",
        "answerCode",
        "newSourceCode",
        "newSourceName",
        "waterSourceName",
        "waterSourceStatus",
        "user",
        "insertDate",
        "informationSectionBgColor",
        "canDelete",
        "canEdit",
        "isTelephoneSurvey",
        "informationSection",
        "activitySection",
        "comment",
        "partUsed",
        "imageAnswers",
        "visitStaff",
    ];

    fn field_names(&self) -> Vec<&str> {
        self.field_names.iter().map(String::as_str).collect()
    }
}
