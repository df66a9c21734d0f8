#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Rectangular table output for flat records with differing key sets.
//!
//! The column set is every key that holds a truthy value (not `null`,
//! `false`, `0`, or `""`) in at least one record, in the order keys are
//! first seen across the record sequence. Columns that are falsy in every
//! record are dropped on purpose: they carry no information in the report.
//!
//! Two encodings are supported. [`TableFormat::Legacy`] wraps every cell
//! in double quotes without escaping embedded quotes or delimiters, which
//! is what existing consumers of the report expect. [`TableFormat::Escaped`]
//! writes RFC 4180 CSV through the `csv` crate.
//!
//! A record set with no truthy value at all has no columns and renders as
//! an empty string in both encodings, whatever the record count.

use madzi_api_models::FlatRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output was not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("CSV writer could not be flushed: {0}")]
    Flush(String),
}

/// Cell encoding of the summary table.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TableFormat {
    /// Quote every cell, no escaping of embedded quotes or delimiters.
    #[default]
    Legacy,
    /// RFC 4180 quoting (embedded quotes doubled).
    Escaped,
}

/// JavaScript-style truthiness of a JSON value.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Ordered union of keys holding a truthy value in at least one record.
#[must_use]
pub fn columns(records: &[FlatRecord]) -> Vec<&str> {
    let mut seen = std::collections::BTreeSet::new();
    let mut columns = Vec::new();

    for record in records {
        for (key, value) in record {
            if is_truthy(value) && seen.insert(key.as_str()) {
                columns.push(key.as_str());
            }
        }
    }

    columns
}

/// Text of one cell. Missing keys render empty. `null` renders as `null`
/// in [`TableFormat::Legacy`] and empty in [`TableFormat::Escaped`]. Nested
/// values render as compact JSON.
#[must_use]
pub fn cell_text(value: Option<&Value>, format: TableFormat) -> String {
    match value {
        None => String::new(),
        Some(Value::Null) => match format {
            TableFormat::Legacy => "null".to_owned(),
            TableFormat::Escaped => String::new(),
        },
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Serializes `records` as a table: header row first, rows joined by `\n`,
/// no trailing line break.
///
/// # Errors
///
/// Returns [`TableError`] if the escaped CSV writer fails.
pub fn to_table(records: &[FlatRecord], format: TableFormat) -> Result<String, TableError> {
    let columns = columns(records);
    if columns.is_empty() {
        return Ok(String::new());
    }

    match format {
        TableFormat::Legacy => Ok(legacy_table(&columns, records)),
        TableFormat::Escaped => escaped_table(&columns, records),
    }
}

fn legacy_table(columns: &[&str], records: &[FlatRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(columns.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(","));

    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| quoted(&cell_text(record.get(*column), TableFormat::Legacy)))
            .collect();
        lines.push(row.join(","));
    }

    lines.join("\n")
}

fn quoted(cell: &str) -> String {
    format!("\"{cell}\"")
}

fn escaped_table(columns: &[&str], records: &[FlatRecord]) -> Result<String, TableError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(columns)?;
    for record in records {
        writer.write_record(
            columns
                .iter()
                .map(|column| cell_text(record.get(*column), TableFormat::Escaped)),
        )?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| TableError::Flush(e.to_string()))?;
    let mut text = String::from_utf8(bytes)?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}
