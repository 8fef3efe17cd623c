//! Sensor events fed to a compiled condition.
//!
//! An event carries an identifier, a sensor name, a raw value kept as a
//! string, and a millisecond timestamp. All time semantics (delay, slope,
//! time windows) come from `ts`, never from the wall clock.

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::value::Value;

/// A single timestamped reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Raw value. Numbers in JSON input are stored in their textual form.
    #[serde(deserialize_with = "de_value")]
    pub value: String,
    /// Milliseconds since the Unix epoch. JSON input may also use RFC 3339.
    #[serde(deserialize_with = "de_timestamp")]
    pub ts: i64,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
        ts: i64,
    ) -> Self {
        Event {
            id: id.into(),
            name: name.into(),
            value: value.into(),
            ts,
        }
    }

    /// Anonymous event with just a value and a timestamp.
    pub fn at(ts: i64, value: impl ToString) -> Self {
        Event::new("", "", value.to_string(), ts)
    }

    /// Parse a JSON object such as `{"id":"1","name":"temp","value":21.5,"ts":1000}`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Event::deserialize(json)
    }

    /// The value as a number, if it parses as one.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Field access used by compiled programs: `event.value`, `event.ts`, ...
    pub fn field(&self, name: &str) -> Value {
        match name {
            "id" => Value::Str(self.id.clone()),
            "name" => Value::Str(self.name.clone()),
            "value" => Value::Str(self.value.clone()),
            "ts" | "timestamp" => Value::Int(self.ts),
            _ => Value::Nil,
        }
    }
}

fn de_value<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    use serde::de::Error;

    match serde_json::Value::deserialize(d)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp {n}"))),
        serde_json::Value::String(s) => match s.parse::<i64>() {
            Ok(ms) => Ok(ms),
            Err(_) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| D::Error::custom(format!("invalid timestamp '{s}': {e}"))),
        },
        other => Err(D::Error::custom(format!("invalid timestamp {other}"))),
    }
}
