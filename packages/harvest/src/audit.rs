//! Upstream schema drift detection.
//!
//! Auditing never fails and never touches the record: unexpected fields are
//! logged and returned so callers can count them if they care.

use madzi_api_models::ShapeAudited;

/// Field names present in `fields` but absent from `allowed`, in input
/// order.
#[must_use]
pub fn unexpected_fields<'a>(fields: &[&'a str], allowed: &[&str]) -> Vec<&'a str> {
    fields
        .iter()
        .copied()
        .filter(|field| !allowed.contains(field))
        .collect()
}

/// Logs every field of `record` outside its allow-list.
pub fn audit<T: ShapeAudited>(record: &T) -> Vec<String> {
    let fields = record.field_names();
    let unexpected = unexpected_fields(&fields, T::ALLOWED_FIELDS);

    for field in &unexpected {
        log::warn!("Unexpected {} field: {field}", T::LABEL);
    }

    unexpected.into_iter().map(str::to_owned).collect()
}
