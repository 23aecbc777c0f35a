//! Canonical text decoding.

use crate::error::{CodecError, CodecResult};
use crate::value::{Kind, Value};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Decodes canonical text into a value of the given kind.
///
/// `None` decodes to `Value::Null` for every kind - the inverse of
/// [`crate::encode_text`] mapping `Null` to `None`.
///
/// # Errors
///
/// Returns [`CodecError::Parse`] when the text is not a valid encoding of
/// the requested kind, and [`CodecError::MalformedBytes`] for byte strings
/// missing the `\x` prefix or containing non-hex digits.
pub fn decode_text(kind: Kind, text: Option<&str>) -> CodecResult<Value> {
    let Some(text) = text else {
        return Ok(Value::Null);
    };

    let value = match kind {
        Kind::Bool => match text {
            "t" | "true" => Value::Bool(true),
            "f" | "false" => Value::Bool(false),
            _ => return Err(CodecError::parse(kind, text)),
        },
        Kind::Int16 => Value::Int16(parse_number(kind, text)?),
        Kind::Int32 => Value::Int32(parse_number(kind, text)?),
        Kind::Int64 => Value::Int64(parse_number(kind, text)?),
        Kind::Float32 => Value::Float32(parse_number(kind, text)?),
        Kind::Float64 => Value::Float64(parse_number(kind, text)?),
        Kind::Text => Value::Text(text.to_owned()),
        Kind::Bytes => Value::Bytes(parse_bytes(text)?),
        Kind::Uuid => Uuid::parse_str(text)
            .map(Value::Uuid)
            .map_err(|_| CodecError::parse(kind, text))?,
        Kind::Timestamp => DateTime::parse_from_rfc3339(text)
            .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
            .map_err(|_| CodecError::parse(kind, text))?,
    };
    Ok(value)
}

fn parse_number<T: std::str::FromStr>(kind: Kind, text: &str) -> CodecResult<T> {
    text.parse::<T>().map_err(|_| CodecError::parse(kind, text))
}

fn parse_bytes(text: &str) -> CodecResult<Vec<u8>> {
    let hex = text
        .strip_prefix("\\x")
        .ok_or_else(|| CodecError::MalformedBytes {
            text: text.to_owned(),
        })?;
    if hex.len() % 2 != 0 {
        return Err(CodecError::MalformedBytes {
            text: text.to_owned(),
        });
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).map_err(|_| CodecError::MalformedBytes {
            text: text.to_owned(),
        })?;
        let byte = u8::from_str_radix(pair, 16).map_err(|_| CodecError::MalformedBytes {
            text: text.to_owned(),
        })?;
        bytes.push(byte);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_text;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn round_trip(value: Value) {
        let kind = value.kind().expect("round_trip takes non-null values");
        let encoded = encode_text(&value).unwrap();
        let decoded = decode_text(kind, encoded.as_deref()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn none_decodes_to_null() {
        for kind in [
            Kind::Bool,
            Kind::Int16,
            Kind::Int32,
            Kind::Int64,
            Kind::Float32,
            Kind::Float64,
            Kind::Text,
            Kind::Bytes,
            Kind::Uuid,
            Kind::Timestamp,
        ] {
            assert_eq!(decode_text(kind, None).unwrap(), Value::Null);
        }
    }

    #[test]
    fn boundary_round_trips() {
        round_trip(Value::Bool(true));
        round_trip(Value::Bool(false));
        round_trip(Value::Int16(i16::MIN));
        round_trip(Value::Int16(i16::MAX));
        round_trip(Value::Int32(i32::MIN));
        round_trip(Value::Int32(i32::MAX));
        round_trip(Value::Int64(i64::MIN));
        round_trip(Value::Int64(i64::MAX));
        round_trip(Value::Int64(0));
        round_trip(Value::Float64(0.0));
        round_trip(Value::Float64(f64::MIN));
        round_trip(Value::Float64(f64::MAX));
        round_trip(Value::Float64(f64::INFINITY));
        round_trip(Value::Float64(f64::NEG_INFINITY));
        round_trip(Value::Float32(f32::MIN_POSITIVE));
        round_trip(Value::text(""));
        round_trip(Value::text("alice"));
        round_trip(Value::Bytes(Vec::new()));
        round_trip(Value::Bytes(vec![0, 1, 254, 255]));
        round_trip(Value::Uuid(Uuid::nil()));
        round_trip(Value::Uuid(Uuid::new_v4()));
        round_trip(Value::timestamp(
            Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap(),
        ));
        round_trip(Value::timestamp(
            Utc.with_ymd_and_hms(2099, 12, 31, 23, 59, 59).unwrap(),
        ));
    }

    #[test]
    fn bad_bool_rejected() {
        assert!(decode_text(Kind::Bool, Some("yes")).is_err());
    }

    #[test]
    fn bad_bytes_rejected() {
        assert!(decode_text(Kind::Bytes, Some("00ff")).is_err());
        assert!(decode_text(Kind::Bytes, Some("\\x0")).is_err());
        assert!(decode_text(Kind::Bytes, Some("\\xzz")).is_err());
    }

    #[test]
    fn overflow_rejected() {
        assert!(decode_text(Kind::Int16, Some("40000")).is_err());
        assert!(decode_text(Kind::Int32, Some("9999999999")).is_err());
    }

    proptest! {
        #[test]
        fn prop_int64_round_trip(v in any::<i64>()) {
            round_trip(Value::Int64(v));
        }

        #[test]
        fn prop_int16_round_trip(v in any::<i16>()) {
            round_trip(Value::Int16(v));
        }

        #[test]
        fn prop_text_round_trip(s in ".*") {
            round_trip(Value::Text(s));
        }

        #[test]
        fn prop_bytes_round_trip(b in proptest::collection::vec(any::<u8>(), 0..64)) {
            round_trip(Value::Bytes(b));
        }

        #[test]
        fn prop_float64_round_trip(v in any::<f64>()) {
            prop_assume!(!v.is_nan());
            round_trip(Value::Float64(v));
        }
    }
}
