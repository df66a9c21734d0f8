//! Turns one coarse listing row into one flat record.
//!
//! Merge order, later sources winning on key collision while keeping the
//! key's original position:
//!
//! 1. every field of the coarse row
//! 2. the detail scalars ([`madzi_api_models::DetailScalars`]), `null`
//!    included; a scalar the detail does not carry removes the coarse key
//! 3. answered questions as `"{questionId} : {questionText}"`
//! 4. `imageUrls` and `visitStaff`, newline-joined
//! 5. `part : {name} : quantity` / `part : {name} : costMwk`
//! 6. `latitude` / `longitude`, only when the source location resolved

use madzi_api::MadziApi;
use madzi_api_models::{
    CoarseLocationRecord, DetailRecord, DetailScalars, FlatRecord, LatLng, Question,
};
use serde_json::Value;

use crate::HarvestError;
use crate::audit::audit;
use crate::coordinates::{CoordinateCache, SourceLocation};

/// Enriches coarse rows using the API and a shared coordinate cache.
pub struct RecordEnricher<'a> {
    api: &'a dyn MadziApi,
    coordinates: &'a CoordinateCache,
}

impl<'a> RecordEnricher<'a> {
    #[must_use]
    pub fn new(api: &'a dyn MadziApi, coordinates: &'a CoordinateCache) -> Self {
        Self { api, coordinates }
    }

    /// Fetches the detail of `coarse`, resolves its source location, and
    /// merges everything into one flat record.
    ///
    /// A missing or malformed source location is logged and leaves the
    /// coordinates unset; it does not fail the record.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] if the row has no `answerId` or the detail
    /// request fails.
    pub async fn enrich(
        &self,
        coarse: CoarseLocationRecord,
    ) -> Result<FlatRecord, HarvestError> {
        audit(&coarse);
        let answer_id = coarse.answer_id().ok_or(HarvestError::MissingAnswerId)?;

        let detail = self.api.record_detail(answer_id).await?;
        audit(&detail);

        let lat_lng = match detail.scalars.new_source_code() {
            Some(code) => {
                let location = self.source_location(&code).await;
                if location.lat_lng().is_none() {
                    log::warn!(
                        "Could not retrieve lat/long for newSourceCode: {code} ({location:?})"
                    );
                }
                location.lat_lng()
            }
            None => {
                log::warn!("Answer {answer_id} has no newSourceCode, leaving lat/long unset");
                None
            }
        };

        Ok(flatten(coarse, &detail, lat_lng))
    }

    async fn source_location(&self, code: &str) -> SourceLocation {
        let api = self.api;
        self.coordinates
            .resolve(code, |code| async move {
                match api.secondary_source(&code).await {
                    Ok(source) => {
                        audit(&source);
                        source.lat_lng().map_or_else(
                            || SourceLocation::Malformed(source.source_lat_lng.clone()),
                            SourceLocation::Resolved,
                        )
                    }
                    Err(e) => {
                        log::error!("Source lookup for {code} failed: {e}");
                        SourceLocation::Unavailable(e.to_string())
                    }
                }
            })
            .await
    }
}

/// Merges a coarse row, its detail, and its resolved location.
#[must_use]
pub fn flatten(
    coarse: CoarseLocationRecord,
    detail: &DetailRecord,
    lat_lng: Option<LatLng>,
) -> FlatRecord {
    let mut record = coarse.0;

    for field in DetailScalars::FIELDS {
        match detail.scalars.get(field) {
            Some(value) => {
                record.insert((*field).to_owned(), value.clone());
            }
            None => {
                record.shift_remove(*field);
            }
        }
    }

    for (column, answer) in detail.questions().filter_map(Question::flat_entry) {
        record.insert(column, Value::String(answer));
    }

    let image_urls: Vec<&str> = detail
        .image_answers
        .iter()
        .filter_map(|image| image.url.as_deref())
        .collect();
    record.insert("imageUrls".to_owned(), Value::String(image_urls.join("\n")));

    let staff: Vec<String> = detail.visit_staff.iter().map(|s| s.full_name()).collect();
    record.insert("visitStaff".to_owned(), Value::String(staff.join("\n")));

    for part in &detail.part_used {
        record.insert(
            format!("part : {} : quantity", part.name),
            part.quantity.clone(),
        );
        record.insert(
            format!("part : {} : costMwk", part.name),
            part.cost_mwk.clone(),
        );
    }

    if let Some(LatLng {
        latitude,
        longitude,
    }) = lat_lng
    {
        record.insert("latitude".to_owned(), Value::from(latitude));
        record.insert("longitude".to_owned(), Value::from(longitude));
    }

    record
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use madzi_api::ApiError;
    use madzi_api_models::{Agency, AgencyId, AnswerId, SecondarySourceRecord};
    use serde_json::json;

    use super::*;

    fn coarse(value: Value) -> CoarseLocationRecord {
        serde_json::from_value(value).unwrap()
    }

    fn detail(value: Value) -> DetailRecord {
        serde_json::from_value(value).unwrap()
    }

    /// Answers detail requests from a fixed payload and source requests
    /// from a fixed `sourceLatLng`, recording every source code asked for.
    struct OneSourceApi {
        source_lat_lng: Option<Value>,
        source_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MadziApi for OneSourceApi {
        async fn list_agencies(&self) -> Result<Vec<Agency>, ApiError> {
            Ok(Vec::new())
        }

        async fn list_partition_records(
            &self,
            _year: i32,
            _agency_id: AgencyId,
        ) -> Result<Vec<CoarseLocationRecord>, ApiError> {
            Ok(Vec::new())
        }

        async fn record_detail(&self, answer_id: AnswerId) -> Result<DetailRecord, ApiError> {
            Ok(detail(json!({
                "answerId": answer_id,
                "newSourceCode": "SRC-1",
                "newSourceName": "From detail"
            })))
        }

        async fn secondary_source(&self, code: &str) -> Result<SecondarySourceRecord, ApiError> {
            self.source_calls.lock().unwrap().push(code.to_owned());
            match &self.source_lat_lng {
                Some(value) => Ok(serde_json::from_value(
                    json!({ "code": code, "sourceLatLng": value }),
                )
                .unwrap()),
                None => Err(ApiError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    url: format!("GetNewSourceAnswerDetail/{code}"),
                }),
            }
        }
    }

    #[test]
    fn flattens_questions_parts_images_and_staff() {
        let coarse = coarse(json!({
            "answerId": 1564,
            "newSourceName": "From listing",
            "visitDate": "2022-09-01"
        }));
        let detail = detail(json!({
            "answerId": 1564,
            "newSourceName": "From detail",
            "informationSection": [
                { "questionId": 472, "questionText": "How many strokes?", "answerText": "48" },
                { "questionId": 473, "questionText": "Unanswered", "answerText": "" }
            ],
            "comment": { "questionId": 9, "questionText": "Comment", "answerText": "fine" },
            "partUsed": [{ "name": "Rod Centraliser", "quantity": 4, "costMwk": 695 }],
            "imageAnswers": [{ "url": "https://img/1.jpg" }, { "url": "https://img/2.jpg" }],
            "visitStaff": [
                { "firstName": "Joseph", "lastName": "Smart" },
                { "firstName": "Grace", "lastName": "Banda" }
            ]
        }));

        let flat = flatten(
            coarse,
            &detail,
            Some(LatLng {
                latitude: -16.0,
                longitude: 34.8,
            }),
        );

        assert_eq!(flat["472 : How many strokes?"], json!("48"));
        assert!(!flat.contains_key("473 : Unanswered"));
        assert_eq!(flat["9 : Comment"], json!("fine"));
        assert_eq!(flat["newSourceName"], json!("From detail"));
        assert_eq!(flat["visitDate"], json!("2022-09-01"));
        assert_eq!(flat["imageUrls"], json!("https://img/1.jpg\nhttps://img/2.jpg"));
        assert_eq!(flat["visitStaff"], json!("Joseph Smart\nGrace Banda"));
        assert_eq!(flat["part : Rod Centraliser : quantity"], json!(4));
        assert_eq!(flat["part : Rod Centraliser : costMwk"], json!(695));
        assert_eq!(flat["latitude"], json!(-16.0));
        assert_eq!(flat["longitude"], json!(34.8));
    }

    #[test]
    fn detail_override_keeps_coarse_key_position() {
        let coarse = coarse(json!({
            "newSourceName": "old",
            "answerId": 1,
            "endResult": "Repaired"
        }));
        let detail = detail(json!({ "answerId": 1, "newSourceName": "new" }));

        let flat = flatten(coarse, &detail, None);
        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();

        assert_eq!(&keys[..3], &["newSourceName", "answerId", "endResult"]);
        assert_eq!(flat["newSourceName"], json!("new"));
        assert!(!flat.contains_key("latitude"));
        assert!(!flat.contains_key("longitude"));
    }

    #[test]
    fn detail_scalars_override_with_null_and_remove_when_absent() {
        let coarse = coarse(json!({
            "answerId": 1,
            "agencyRecordId": "R-9",
            "newSourceName": "Listing name",
            "visitDate": "2021-03-04"
        }));
        let detail = detail(json!({ "answerId": 1, "agencyRecordId": null }));

        let flat = flatten(coarse, &detail, None);
        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();

        assert_eq!(flat["agencyRecordId"], Value::Null);
        assert!(!flat.contains_key("newSourceName"));
        assert_eq!(&keys[..3], &["answerId", "agencyRecordId", "visitDate"]);
    }

    #[test]
    fn numeric_answer_and_unnamed_part_still_flatten() {
        let coarse = coarse(json!({ "answerId": 2 }));
        let detail = detail(json!({
            "answerId": 2,
            "informationSection": [
                { "questionId": 472, "questionText": "How many strokes?", "answerText": 48 }
            ],
            "partUsed": [{ "name": null, "quantity": 2, "costMwk": 150 }]
        }));

        let flat = flatten(coarse, &detail, None);

        assert_eq!(flat["472 : How many strokes?"], json!("48"));
        assert_eq!(flat["part :  : quantity"], json!(2));
        assert_eq!(flat["part :  : costMwk"], json!(150));
    }

    #[tokio::test]
    async fn enrich_resolves_coordinates_through_the_cache() {
        let api = OneSourceApi {
            source_lat_lng: Some(json!([-15.5, 35.0])),
            source_calls: Mutex::new(Vec::new()),
        };
        let cache = CoordinateCache::new();
        let enricher = RecordEnricher::new(&api, &cache);

        let first = enricher.enrich(coarse(json!({ "answerId": 1 }))).await.unwrap();
        let second = enricher.enrich(coarse(json!({ "answerId": 2 }))).await.unwrap();

        assert_eq!(first["latitude"], json!(-15.5));
        assert_eq!(second["longitude"], json!(35.0));
        assert_eq!(*api.source_calls.lock().unwrap(), vec!["SRC-1"]);
    }

    #[tokio::test]
    async fn malformed_location_leaves_coordinates_unset() {
        let api = OneSourceApi {
            source_lat_lng: Some(json!([-15.5])),
            source_calls: Mutex::new(Vec::new()),
        };
        let cache = CoordinateCache::new();
        let enricher = RecordEnricher::new(&api, &cache);

        let flat = enricher.enrich(coarse(json!({ "answerId": 3 }))).await.unwrap();

        assert!(!flat.contains_key("latitude"));
        assert_eq!(flat["answerId"], json!(3));
        assert!(matches!(cache.get("SRC-1"), Some(SourceLocation::Malformed(_))));
    }

    #[tokio::test]
    async fn failed_source_lookup_does_not_fail_the_record() {
        let api = OneSourceApi {
            source_lat_lng: None,
            source_calls: Mutex::new(Vec::new()),
        };
        let cache = CoordinateCache::new();
        let enricher = RecordEnricher::new(&api, &cache);

        let flat = enricher.enrich(coarse(json!({ "answerId": 4 }))).await.unwrap();

        assert!(!flat.contains_key("latitude"));
        assert_eq!(flat["newSourceName"], json!("From detail"));
    }

    #[tokio::test]
    async fn row_without_answer_id_is_rejected() {
        let api = OneSourceApi {
            source_lat_lng: None,
            source_calls: Mutex::new(Vec::new()),
        };
        let cache = CoordinateCache::new();
        let enricher = RecordEnricher::new(&api, &cache);

        let err = enricher
            .enrich(coarse(json!({ "locationId": "L1" })))
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::MissingAnswerId));
        assert!(api.source_calls.lock().unwrap().is_empty());
    }
}
