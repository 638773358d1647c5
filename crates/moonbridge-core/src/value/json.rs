//! JSON interchange for `Value`
//!
//! Tables have no direct JSON counterpart, so the mapping is:
//! JSON arrays become tables keyed `1..=n` (script-style indexing) and
//! JSON objects become tables with string keys. Going the other way,
//! only tables shaped like one of those two forms convert; anything
//! else is reported as an error rather than silently approximated.

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::{TableMap, Value};
use crate::error::{Error, Result};

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Table(t) => {
                let mut map = serializer.serialize_map(Some(t.len()))?;
                for (key, value) in t {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("nil, a boolean, a number, a string, a sequence or a map")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Nil)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Nil)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> std::result::Result<Value, E> {
        Ok(Value::Boolean(b))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_i64<E: de::Error>(self, n: i64) -> std::result::Result<Value, E> {
        Ok(Value::Number(n as f64))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, n: u64) -> std::result::Result<Value, E> {
        Ok(Value::Number(n as f64))
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> std::result::Result<Value, E> {
        Ok(Value::Number(n))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> std::result::Result<Value, E> {
        Ok(Value::string(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut table = TableMap::new();
        let mut index = 0_i32;
        while let Some(element) = seq.next_element::<Value>()? {
            index += 1;
            table.insert(Value::from(index), element);
        }
        Ok(Value::Table(table))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Value, A::Error> {
        let mut table = TableMap::new();
        while let Some((key, value)) = map.next_entry::<Value, Value>()? {
            table.insert(key, value);
        }
        Ok(Value::Table(table))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Convert a JSON document into a `Value`
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(elements) => {
            let mut table = TableMap::new();
            for (i, element) in elements.iter().enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let key = Value::Number((i + 1) as f64);
                table.insert(key, from_json(element));
            }
            Value::Table(table)
        }
        serde_json::Value::Object(fields) => {
            let mut table = TableMap::new();
            for (key, value) in fields {
                table.insert(Value::string(key.clone()), from_json(value));
            }
            Value::Table(table)
        }
    }
}

/// Convert a `Value` into a JSON document
pub fn to_json(value: &Value) -> Result<serde_json::Value> {
    match value {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::Json(format!("number {n} has no JSON representation"))),
        Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        Value::Table(table) => {
            if is_sequence(table) {
                let elements = table.values().map(to_json).collect::<Result<Vec<_>>>()?;
                return Ok(serde_json::Value::Array(elements));
            }
            let mut fields = serde_json::Map::new();
            for (key, value) in table {
                let Value::String(name) = key else {
                    return Err(Error::Json(format!(
                        "table key {key} has no JSON representation"
                    )));
                };
                fields.insert(name.clone(), to_json(value)?);
            }
            Ok(serde_json::Value::Object(fields))
        }
    }
}

// A table whose keys are exactly the numbers 1..=n maps to a JSON array.
fn is_sequence(table: &TableMap) -> bool {
    if table.is_empty() {
        return false;
    }
    table.keys().enumerate().all(|(i, key)| {
        #[allow(clippy::cast_precision_loss)]
        let expected = (i + 1) as f64;
        matches!(key, Value::Number(n) if *n == expected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_round_trip() {
        for json in [
            serde_json::json!(null),
            serde_json::json!(true),
            serde_json::json!(2.5),
            serde_json::json!("text"),
        ] {
            assert_eq!(to_json(&from_json(&json)).unwrap(), json);
        }
    }

    #[test]
    fn array_becomes_one_based_table() {
        let json = serde_json::json!([10, 20, 30]);
        let value = from_json(&json);
        assert_eq!(value.get(&Value::from(1)).unwrap(), &Value::from(10));
        assert_eq!(value.get(&Value::from(3)).unwrap(), &Value::from(30));
        assert_eq!(to_json(&value).unwrap(), serde_json::json!([10.0, 20.0, 30.0]));
    }

    #[test]
    fn nested_object_round_trips() {
        let json = serde_json::json!({"outer": {"inner": [1, 2]}, "flag": false});
        let value = from_json(&json);
        assert_eq!(
            to_json(&value).unwrap(),
            serde_json::json!({"outer": {"inner": [1.0, 2.0]}, "flag": false})
        );
    }

    #[test]
    fn mixed_keys_are_rejected() {
        let mut table = Value::table();
        table.set("name", 1.0).unwrap();
        table.set(true, 2.0).unwrap();
        assert!(matches!(to_json(&table), Err(Error::Json(_))));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert!(to_json(&Value::Number(f64::NAN)).is_err());
        assert!(to_json(&Value::Number(f64::INFINITY)).is_err());
    }

    #[test]
    fn serde_serialization_of_string_keyed_table() {
        let mut table = Value::table();
        table.set("a", 1.0).unwrap();
        let text = serde_json::to_string(&table).unwrap();
        assert_eq!(text, r#"{"a":1.0}"#);
    }

    #[test]
    fn serde_deserialization_into_value() {
        let value: Value = serde_json::from_str(r#"{"k": [true, null]}"#).unwrap();
        let inner = value.get(&Value::string("k")).unwrap();
        assert_eq!(inner.get(&Value::from(1)).unwrap(), &Value::Boolean(true));
        assert_eq!(inner.get(&Value::from(2)).unwrap(), &Value::Nil);
    }
}
