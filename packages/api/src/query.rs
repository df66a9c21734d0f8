//! Query parameters for the report listing endpoint.

use chrono::{DateTime, NaiveDate, TimeZone as _, Utc};
use madzi_api_models::AgencyId;

/// Report type selector for water point visit reports.
pub const VISIT_REPORT_TYPE: &str = "5";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// First and last instant (UTC, millisecond precision) of `year`.
///
/// Returns `None` if the year is outside chrono's supported range.
#[must_use]
pub fn year_bounds(year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let from = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_milli_opt(0, 0, 0, 0)?;
    let to = NaiveDate::from_ymd_opt(year, 12, 31)?.and_hms_milli_opt(23, 59, 59, 999)?;
    Some((Utc.from_utc_datetime(&from), Utc.from_utc_datetime(&to)))
}

/// Query string pairs selecting every visit of `agency_id` in `year`.
///
/// Returns `None` if the year cannot be represented.
#[must_use]
pub fn partition_query(year: i32, agency_id: AgencyId) -> Option<Vec<(&'static str, String)>> {
    let (from, to) = year_bounds(year)?;

    Some(vec![
        ("selectedReportType", VISIT_REPORT_TYPE.to_owned()),
        ("agencyId", format!("[{agency_id}]")),
        ("agencyUser", "[]".to_owned()),
        ("fromDate", from.format(TIMESTAMP_FORMAT).to_string()),
        ("toDate", to.format(TIMESTAMP_FORMAT).to_string()),
        ("waterSource", r#"["1_t"]"#.to_owned()),
        ("indicatorID", "[]".to_owned()),
        ("countryId", String::new()),
        ("districtZoneId", String::new()),
        ("localZoneId", String::new()),
        ("regionZoneId", String::new()),
        ("radius", String::new()),
    ])
}
