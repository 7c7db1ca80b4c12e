//! Field accessors over `serde_json` values
//!
//! Ids arrive either as `*_str` strings or as JSON numbers; the string form
//! is preferred because numeric ids may exceed what some producers encode
//! exactly. Absent fields and zero are never conflated.

use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};
use userstream_core::{Timestamp, parse_created_at, parse_epoch_millis};
use userstream_ports::Clock;

use crate::error::ParseErrorKind;

pub(crate) type FieldResult<T> = Result<T, ParseErrorKind>;

pub(crate) type Object = Map<String, Value>;

/// Borrow `value` as a JSON object
pub(crate) fn as_object<'a>(value: &'a Value, field: &str) -> FieldResult<&'a Object> {
    value
        .as_object()
        .ok_or_else(|| ParseErrorKind::invalid(field, "expected an object"))
}

/// Required nested object
pub(crate) fn object<'a>(obj: &'a Object, field: &str) -> FieldResult<&'a Object> {
    let value = present(obj, field).ok_or_else(|| ParseErrorKind::missing(field))?;
    as_object(value, field)
}

/// Required string
pub(crate) fn string<'a>(obj: &'a Object, field: &str) -> FieldResult<&'a str> {
    optional_string(obj, field)?.ok_or_else(|| ParseErrorKind::missing(field))
}

/// Optional string; `null` counts as absent
pub(crate) fn optional_string<'a>(obj: &'a Object, field: &str) -> FieldResult<Option<&'a str>> {
    match present(obj, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ParseErrorKind::invalid(field, "expected a string")),
    }
}

/// Required 64-bit integer, given as a number or a decimal string
pub(crate) fn integer(obj: &Object, field: &str) -> FieldResult<i64> {
    optional_integer(obj, field)?.ok_or_else(|| ParseErrorKind::missing(field))
}

pub(crate) fn optional_integer(obj: &Object, field: &str) -> FieldResult<Option<i64>> {
    match present(obj, field) {
        None => Ok(None),
        Some(value) => value_to_i64(value)
            .map(Some)
            .ok_or_else(|| ParseErrorKind::invalid(field, "expected a 64-bit integer")),
    }
}

/// Required id: `{name}_str` if present, otherwise `{name}`
pub(crate) fn id(obj: &Object, name: &str) -> FieldResult<i64> {
    optional_id(obj, name)?.ok_or_else(|| ParseErrorKind::missing(&format!("{}_str", name)))
}

pub(crate) fn optional_id(obj: &Object, name: &str) -> FieldResult<Option<i64>> {
    let str_field = format!("{}_str", name);
    match optional_integer(obj, &str_field)? {
        Some(id) => Ok(Some(id)),
        None => optional_integer(obj, name),
    }
}

/// Array of ids, each a number or a decimal string
pub(crate) fn id_array(obj: &Object, field: &str) -> FieldResult<Vec<i64>> {
    let values = present(obj, field)
        .ok_or_else(|| ParseErrorKind::missing(field))?
        .as_array()
        .ok_or_else(|| ParseErrorKind::invalid(field, "expected an array"))?;

    values
        .iter()
        .map(|v| value_to_i64(v).ok_or_else(|| ParseErrorKind::invalid(field, "non-integer id")))
        .collect()
}

/// Array of strings; absent means empty
pub(crate) fn string_array(obj: &Object, field: &str) -> FieldResult<Vec<String>> {
    let Some(value) = present(obj, field) else {
        return Ok(Vec::new());
    };
    let values = value
        .as_array()
        .ok_or_else(|| ParseErrorKind::invalid(field, "expected an array"))?;

    values
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| ParseErrorKind::invalid(field, "expected strings"))
        })
        .collect()
}

/// `timestamp_ms` of `obj`, or receipt time when the protocol sent none
pub(crate) fn timestamp_ms(obj: &Object, clock: &dyn Clock) -> FieldResult<Timestamp> {
    const FIELD: &str = "timestamp_ms";
    let Some(value) = present(obj, FIELD) else {
        return Ok(clock.now());
    };
    let parsed = match value {
        Value::String(s) => parse_epoch_millis(s),
        other => other
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
    };
    parsed.ok_or_else(|| ParseErrorKind::invalid(FIELD, "expected epoch milliseconds"))
}

/// Required `created_at`
pub(crate) fn created_at(obj: &Object) -> FieldResult<Timestamp> {
    const FIELD: &str = "created_at";
    let raw = string(obj, FIELD)?;
    parse_created_at(raw)
        .ok_or_else(|| ParseErrorKind::invalid(FIELD, format!("unrecognised date {:?}", raw)))
}

/// `created_at` if present, otherwise receipt time
pub(crate) fn created_at_or_now(obj: &Object, clock: &dyn Clock) -> FieldResult<Timestamp> {
    if present(obj, "created_at").is_some() {
        created_at(obj)
    } else {
        Ok(clock.now())
    }
}

fn present<'a>(obj: &'a Object, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use userstream_ports::FixedClock;

    fn obj(value: Value) -> Object {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_id_prefers_string_form() {
        let o = obj(json!({"id": 1, "id_str": "9007199254740993"}));
        assert_eq!(id(&o, "id").unwrap(), 9_007_199_254_740_993);

        let o = obj(json!({"id": 12}));
        assert_eq!(id(&o, "id").unwrap(), 12);
    }

    #[test]
    fn test_absent_is_not_zero() {
        let o = obj(json!({"user_id_str": "0"}));
        assert_eq!(optional_id(&o, "user_id").unwrap(), Some(0));

        let o = obj(json!({"user_id_str": null}));
        assert_eq!(optional_id(&o, "user_id").unwrap(), None);
        assert_eq!(
            id(&o, "user_id").unwrap_err(),
            ParseErrorKind::MissingField("user_id_str".to_string())
        );
    }

    #[test]
    fn test_garbage_id_is_an_error() {
        let o = obj(json!({"id_str": "12x"}));
        assert!(matches!(
            id(&o, "id"),
            Err(ParseErrorKind::InvalidField { .. })
        ));
    }

    #[test]
    fn test_timestamp_ms_or_receipt_time() {
        let now = Utc.timestamp_millis_opt(5_000).single().unwrap();
        let clock = FixedClock::new(now);

        let o = obj(json!({"timestamp_ms": "1294972852000"}));
        assert_eq!(
            timestamp_ms(&o, &clock).unwrap().timestamp_millis(),
            1_294_972_852_000
        );

        let o = obj(json!({}));
        assert_eq!(timestamp_ms(&o, &clock).unwrap(), now);

        let o = obj(json!({"timestamp_ms": "soon"}));
        assert!(timestamp_ms(&o, &clock).is_err());
    }

    #[test]
    fn test_id_array_accepts_mixed_forms() {
        let o = obj(json!({"friends": [1, "2", 3]}));
        assert_eq!(id_array(&o, "friends").unwrap(), vec![1, 2, 3]);

        let o = obj(json!({"friends": [1, true]}));
        assert!(id_array(&o, "friends").is_err());
    }
}
