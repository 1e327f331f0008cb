//! Column encoding shared by the stores
//!
//! Timestamps are stored as RFC 3339 text with millisecond precision and a
//! `Z` suffix, so string comparison in SQL orders them chronologically.

use super::error::DatabaseError;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Row, Value as SqlValue};
use serde_json::{Map, Value};

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DatabaseError::invalid_data(format!("bad timestamp '{}': {}", value, e)))
}

pub fn parse_optional_timestamp(
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.as_deref().map(parse_timestamp).transpose()
}

/// JSON object column, an empty or `null` value reads as an empty map
pub fn json_map(text: &str) -> Result<Map<String, Value>, DatabaseError> {
    if text.is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(DatabaseError::invalid_data(format!(
            "expected JSON object, found {}",
            other
        ))),
        Err(e) => Err(DatabaseError::invalid_data(format!("bad JSON column: {}", e))),
    }
}

pub fn json_text(map: &Map<String, Value>) -> Result<String, DatabaseError> {
    serde_json::to_string(map).map_err(|e| DatabaseError::invalid_data(e.to_string()))
}

/// Rust value of a raw column, `None` when the storage type does not fit
pub trait FromColumn: Sized {
    fn from_column(value: SqlValue) -> Option<Self>;
}

impl FromColumn for i64 {
    fn from_column(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Integer(n) => Some(n),
            _ => None,
        }
    }
}

impl FromColumn for String {
    fn from_column(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl<T: FromColumn> FromColumn for Option<T> {
    fn from_column(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => Some(None),
            other => T::from_column(other).map(Some),
        }
    }
}

/// Typed column read with the column name in the error
pub fn column<T: FromColumn>(row: &Row, idx: i32, name: &str) -> Result<T, DatabaseError> {
    let value = row
        .get_value(idx)
        .map_err(|e| DatabaseError::invalid_data(format!("column '{}': {}", name, e)))?;
    decode_column(value, name)
}

fn decode_column<T: FromColumn>(value: SqlValue, name: &str) -> Result<T, DatabaseError> {
    let kind = format!("{:?}", value);
    T::from_column(value).ok_or_else(|| {
        DatabaseError::invalid_data(format!("column '{}': unexpected value {}", name, kind))
    })
}
