//! Read-only release listing by date.

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::QueryError;
use crate::models::ReleaseSummary;
use crate::store::Store;

pub const DATE_FORMAT: &str = "%Y%m%d";

/// Releases dated on or after `date` (`YYYYMMDD`), newest first.
pub fn releases_since(store: &Store, date: &str) -> Result<Vec<ReleaseSummary>, QueryError> {
    let since = parse_query_date(date)?;
    Ok(store.releases_since(since)?)
}

pub fn parse_query_date(date: &str) -> Result<NaiveDate, QueryError> {
    let trimmed = date.trim();
    if trimmed.len() != 8 {
        return Err(QueryError::InvalidDate(date.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|_| QueryError::InvalidDate(date.to_string()))
}

/// Monday of the week containing `today`, formatted for [`releases_since`].
pub fn default_since_date(today: NaiveDate) -> String {
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    monday.format(DATE_FORMAT).to_string()
}
