use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::schema::Column;

/// A single SQL value travelling between generators, inserts, and stories.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
}

/// One row's column values. Ordered so iteration, statement building, and
/// uniqueness keys are deterministic.
pub type Row = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical string form used for uniqueness-tracking keys.
    pub fn key_str(&self) -> String {
        match self {
            Value::Null => "<null>".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Text(value) => value.clone(),
            Value::Uuid(value) => value.to_string(),
            Value::Date(value) => value.format("%Y-%m-%d").to_string(),
            Value::Time(value) => value.format("%H:%M:%S").to_string(),
            Value::Timestamp(value) => value.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            Value::Json(value) => value.to_string(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Convert a JSON value into a `Value`, guided by the column's declared
    /// type so that textual forms of dates, times, and UUIDs land as their
    /// typed variants. Used when loading vocabulary datasets.
    pub fn from_json(json: &serde_json::Value, column: &Column) -> Result<Value> {
        let invalid = |message: String| Error::InvalidValue {
            column: column.name.clone(),
            message,
        };

        let base_type = column
            .column_type
            .data_type
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(value) => Ok(Value::Bool(*value)),
            serde_json::Value::Number(value) => {
                if let Some(int) = value.as_i64() {
                    match base_type.as_str() {
                        "real" | "double precision" | "numeric" | "decimal"
                            if column.column_type.numeric_scale.unwrap_or(0) > 0 =>
                        {
                            Ok(Value::Float(int as f64))
                        }
                        "real" | "double precision" => Ok(Value::Float(int as f64)),
                        _ => Ok(Value::Int(int)),
                    }
                } else if let Some(float) = value.as_f64() {
                    Ok(Value::Float(float))
                } else {
                    Err(invalid(format!("unrepresentable number {value}")))
                }
            }
            serde_json::Value::String(text) => match base_type.as_str() {
                "uuid" => text
                    .parse::<Uuid>()
                    .map(Value::Uuid)
                    .map_err(|err| invalid(format!("bad uuid: {err}"))),
                "date" => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|err| invalid(format!("bad date: {err}"))),
                "time with time zone" | "time without time zone" => {
                    NaiveTime::parse_from_str(text, "%H:%M:%S")
                        .map(Value::Time)
                        .map_err(|err| invalid(format!("bad time: {err}")))
                }
                "timestamp with time zone" | "timestamp without time zone" => {
                    parse_timestamp(text)
                        .map(Value::Timestamp)
                        .ok_or_else(|| invalid("bad timestamp".to_string()))
                }
                "json" | "jsonb" => Ok(Value::Json(json.clone())),
                _ => Ok(Value::Text(text.clone())),
            },
            other => match base_type.as_str() {
                "json" | "jsonb" => Ok(Value::Json(other.clone())),
                _ => Err(invalid(format!("expected scalar, got {other}"))),
            },
        }
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(value) = NaiveDateTime::parse_from_str(text, format) {
            return Some(value);
        }
    }
    None
}

/// Merge `overrides` over `base`: the override wins on key collision.
pub fn merge_rows(base: &Row, overrides: &Row) -> Row {
    let mut merged = base.clone();
    for (column, value) in overrides {
        merged.insert(column.clone(), value.clone());
    }
    merged
}
