//! Path and query parsing with field-named validation errors.

use axum::body::Bytes;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use trailhead_core::{CoreError, CoreResult};

pub fn uuid(raw: &str, field: &str) -> CoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| CoreError::validation(field, "must be a UUID"))
}

pub fn date(raw: &str, field: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| CoreError::validation(field, "must be YYYY-MM-DD"))
}

pub fn required_date(raw: Option<&str>, field: &str) -> CoreResult<NaiveDate> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => date(raw.trim(), field),
        _ => Err(CoreError::validation(field, "is required")),
    }
}

pub fn optional_date(raw: Option<&str>, field: &str) -> CoreResult<Option<NaiveDate>> {
    raw.filter(|r| !r.trim().is_empty())
        .map(|r| date(r.trim(), field))
        .transpose()
}

/// Blank query values count as absent.
pub fn optional_text(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|r| !r.is_empty())
}

/// Optional JSON body: empty means `T::default()`.
pub fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> CoreResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| CoreError::validation("body", e.to_string()))
}
