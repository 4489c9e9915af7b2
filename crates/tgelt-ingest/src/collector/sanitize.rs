//! Message record normalization
//!
//! Telegram objects carry timestamps and raw byte strings (file references,
//! hashes) that have no JSON representation. The client layer converts each
//! object into a [`RawValue`] tree and [`sanitize`] turns that tree into plain
//! JSON: timestamps become ISO-8601 strings, byte strings become lowercase hex.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A scraped value before JSON normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    /// A map tagged with its Telegram type name under the `_` key.
    pub fn object<I, K>(type_name: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: Into<String>,
    {
        let mut map: BTreeMap<String, RawValue> =
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        map.insert("_".to_string(), RawValue::String(type_name.to_string()));
        RawValue::Map(map)
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        RawValue::Bytes(bytes.into())
    }

    /// Unix timestamp in seconds; out-of-range values become null.
    pub fn timestamp(secs: i64) -> Self {
        DateTime::<Utc>::from_timestamp(secs, 0)
            .map(RawValue::DateTime)
            .unwrap_or(RawValue::Null)
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        match self {
            RawValue::Map(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Int(v.into())
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::String(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::String(v)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(v: DateTime<Utc>) -> Self {
        RawValue::DateTime(v)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Null)
    }
}

impl<T: Into<RawValue>> From<Vec<T>> for RawValue {
    fn from(v: Vec<T>) -> Self {
        RawValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Recursively convert a raw value into serializable JSON.
pub fn sanitize(value: RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(i) => Value::Number(i.into()),
        RawValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        RawValue::String(s) => Value::String(s),
        RawValue::Bytes(bytes) => Value::String(hex::encode(bytes)),
        RawValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        RawValue::List(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        RawValue::Map(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_nested_timestamps_and_bytes() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let raw = RawValue::object(
            "Message",
            [
                ("id", RawValue::from(4021)),
                ("date", RawValue::from(date)),
                (
                    "media",
                    RawValue::object(
                        "MessageMediaPhoto",
                        [(
                            "photo",
                            RawValue::object(
                                "Photo",
                                [("file_reference", RawValue::bytes(vec![0x01, 0xab, 0xff]))],
                            ),
                        )],
                    ),
                ),
                ("edit_dates", RawValue::from(vec![date])),
            ],
        );

        assert_eq!(
            sanitize(raw),
            json!({
                "_": "Message",
                "id": 4021,
                "date": "2024-03-09T14:05:00+00:00",
                "media": {
                    "_": "MessageMediaPhoto",
                    "photo": { "_": "Photo", "file_reference": "01abff" }
                },
                "edit_dates": ["2024-03-09T14:05:00+00:00"]
            })
        );
    }

    #[test]
    fn test_optional_and_non_finite_values() {
        assert_eq!(sanitize(RawValue::from(None::<i32>)), Value::Null);
        assert_eq!(sanitize(RawValue::from(Some("hi"))), json!("hi"));
        assert_eq!(sanitize(RawValue::Float(f64::NAN)), Value::Null);
        assert_eq!(sanitize(RawValue::bytes(Vec::new())), json!(""));
    }

    #[test]
    fn test_timestamp_constructor() {
        assert_eq!(
            sanitize(RawValue::timestamp(0)),
            json!("1970-01-01T00:00:00+00:00")
        );
        assert_eq!(RawValue::timestamp(i64::MAX), RawValue::Null);
    }

    #[test]
    fn test_object_tag_and_lookup() {
        let raw = RawValue::object("PeerChannel", [("channel_id", RawValue::from(1_234_i64))]);
        assert_eq!(raw.get("_"), Some(&RawValue::String("PeerChannel".to_string())));
        assert_eq!(raw.get("channel_id"), Some(&RawValue::Int(1_234)));
        assert_eq!(RawValue::Null.get("_"), None);
    }
}
