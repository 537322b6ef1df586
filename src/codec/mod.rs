//! Conversion between wire payloads, typed field values and persisted columns.
//!
//! `encode`/`decode` never fail: any value that cannot be represented in the
//! requested column type degrades to a stored `NULL` (or a decoded
//! [`FieldValue::Null`]). Legacy or corrupt rows therefore surface as missing
//! fields instead of aborting a load.

pub mod lenient;
pub mod row;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use row::{MATCH_COLUMNS, MatchRow, match_from_row, match_to_row};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no usable id")]
    MissingId,

    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Date,
    Json,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::String => "TEXT",
            ColumnType::Number => "NUMERIC",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "INTEGER",
            ColumnType::Json => "TEXT",
        }
    }
}

/// A value as it sits in a row column.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// A typed in-memory field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Json(Value),
}

impl FieldValue {
    /// Reads a wire value into the typed shape a column expects.
    pub fn from_json(value: &Value, column_type: ColumnType) -> Self {
        if value.is_null() {
            return FieldValue::Null;
        }

        match column_type {
            ColumnType::String => match value {
                Value::String(s) => FieldValue::String(s.clone()),
                Value::Number(n) => FieldValue::String(n.to_string()),
                Value::Bool(b) => FieldValue::String(b.to_string()),
                _ => FieldValue::Null,
            },
            ColumnType::Number => lenient::number_from_value(value)
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Null),
            ColumnType::Boolean => match value {
                Value::Bool(b) => FieldValue::Boolean(*b),
                Value::Number(n) => FieldValue::Boolean(n.as_f64().is_some_and(|n| n != 0.0)),
                _ => FieldValue::Null,
            },
            ColumnType::Date => lenient::datetime_from_value(value)
                .map(FieldValue::Date)
                .unwrap_or(FieldValue::Null),
            ColumnType::Json => FieldValue::Json(value.clone()),
        }
    }

    /// The wire representation; dates become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            FieldValue::Json(v) => v.clone(),
        }
    }
}

pub fn encode(value: &FieldValue, column_type: ColumnType) -> StoredValue {
    match (column_type, value) {
        (_, FieldValue::Null) => StoredValue::Null,

        (ColumnType::String, FieldValue::String(s)) => StoredValue::Text(s.clone()),
        (ColumnType::String, FieldValue::Number(n)) if n.is_finite() => {
            StoredValue::Text(n.to_string())
        }
        (ColumnType::String, FieldValue::Boolean(b)) => StoredValue::Text(b.to_string()),
        (ColumnType::String, FieldValue::Date(d)) => {
            StoredValue::Text(d.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        (ColumnType::String, FieldValue::Json(Value::String(s))) => StoredValue::Text(s.clone()),

        (ColumnType::Number, FieldValue::Number(n)) if n.is_finite() => StoredValue::Real(*n),
        (ColumnType::Number, FieldValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(StoredValue::Real)
            .unwrap_or(StoredValue::Null),
        (ColumnType::Number, FieldValue::Json(v)) => lenient::number_from_value(v)
            .map(StoredValue::Real)
            .unwrap_or(StoredValue::Null),

        (ColumnType::Boolean, FieldValue::Boolean(b)) => StoredValue::Integer(i64::from(*b)),
        (ColumnType::Boolean, FieldValue::Number(n)) if !n.is_nan() => {
            StoredValue::Integer(i64::from(*n != 0.0))
        }
        (ColumnType::Boolean, FieldValue::String(s)) => match s.trim() {
            "true" | "1" => StoredValue::Integer(1),
            "false" | "0" => StoredValue::Integer(0),
            _ => StoredValue::Null,
        },

        (ColumnType::Date, FieldValue::Date(d)) => StoredValue::Integer(d.timestamp_millis()),
        (ColumnType::Date, FieldValue::String(s)) => lenient::parse_datetime(s)
            .map(|d| StoredValue::Integer(d.timestamp_millis()))
            .unwrap_or(StoredValue::Null),
        (ColumnType::Date, FieldValue::Number(n)) if n.is_finite() => {
            StoredValue::Integer(*n as i64)
        }

        (ColumnType::Json, FieldValue::Json(Value::Null)) => StoredValue::Null,
        (ColumnType::Json, other) => match serde_json::to_string(&other.to_json()) {
            Ok(text) => StoredValue::Text(STANDARD.encode(text)),
            Err(_) => StoredValue::Null,
        },

        _ => StoredValue::Null,
    }
}

pub fn decode(stored: &StoredValue, column_type: ColumnType) -> FieldValue {
    match (column_type, stored) {
        (_, StoredValue::Null) => FieldValue::Null,

        (ColumnType::String, StoredValue::Text(s)) => FieldValue::String(s.clone()),
        (ColumnType::String, StoredValue::Integer(i)) => FieldValue::String(i.to_string()),
        (ColumnType::String, StoredValue::Real(r)) => FieldValue::String(r.to_string()),

        (ColumnType::Number, StoredValue::Real(r)) if r.is_finite() => FieldValue::Number(*r),
        (ColumnType::Number, StoredValue::Integer(i)) => FieldValue::Number(*i as f64),
        (ColumnType::Number, StoredValue::Text(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Null),

        (ColumnType::Boolean, StoredValue::Integer(i)) => FieldValue::Boolean(*i != 0),
        (ColumnType::Boolean, StoredValue::Real(r)) if !r.is_nan() => FieldValue::Boolean(*r != 0.0),
        (ColumnType::Boolean, StoredValue::Text(s)) => match s.trim() {
            "true" | "1" => FieldValue::Boolean(true),
            "false" | "0" | "" => FieldValue::Boolean(false),
            _ => FieldValue::Null,
        },

        (ColumnType::Date, StoredValue::Integer(ms)) => DateTime::from_timestamp_millis(*ms)
            .map(FieldValue::Date)
            .unwrap_or(FieldValue::Null),
        (ColumnType::Date, StoredValue::Real(ms)) if ms.is_finite() => {
            DateTime::from_timestamp_millis(*ms as i64)
                .map(FieldValue::Date)
                .unwrap_or(FieldValue::Null)
        }
        (ColumnType::Date, StoredValue::Text(s)) => lenient::parse_datetime(s)
            .map(FieldValue::Date)
            .unwrap_or(FieldValue::Null),

        (ColumnType::Json, StoredValue::Text(s)) => decode_json_blob(s),

        _ => FieldValue::Null,
    }
}

fn decode_json_blob(blob: &str) -> FieldValue {
    let text = match STANDARD.decode(blob.trim()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => return FieldValue::Null,
        },
        // legacy rows stored bare JSON
        Err(_) => blob.to_string(),
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Null) | Err(_) => FieldValue::Null,
        Ok(value) => FieldValue::Json(value),
    }
}
