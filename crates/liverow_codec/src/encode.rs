//! Canonical text encoding.

use crate::error::{CodecError, CodecResult};
use crate::value::{Kind, Value};
use chrono::SecondsFormat;
use std::fmt::Write as _;

/// Encodes a value into its canonical text form.
///
/// Returns `None` for `Value::Null` - absence is the canonical encoding of
/// NULL, both in change-feed payloads and in the cache tier.
///
/// The encoding matches the relational store's text output format, so values
/// decoded from a change-feed payload compare equal to values the engine
/// encoded itself:
///
/// - booleans as `t` / `f`
/// - integers and floats in decimal (shortest round-trip form for floats)
/// - bytes as `\x`-prefixed lowercase hex
/// - UUIDs hyphenated
/// - timestamps as RFC 3339 UTC with microseconds
///
/// # Errors
///
/// NaN floats are rejected: NaN never compares equal to itself, which would
/// break the no-op write suppression and round-trip contracts.
pub fn encode_text(value: &Value) -> CodecResult<Option<String>> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => (if *b { "t" } else { "f" }).to_owned(),
        Value::Int16(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Float32(v) => encode_float(Kind::Float32, f64::from(*v), v.to_string())?,
        Value::Float64(v) => encode_float(Kind::Float64, *v, v.to_string())?,
        Value::Text(s) => s.clone(),
        Value::Bytes(bytes) => {
            let mut out = String::with_capacity(2 + bytes.len() * 2);
            out.push_str("\\x");
            for byte in bytes {
                // Writing to a String cannot fail.
                let _ = write!(out, "{byte:02x}");
            }
            out
        }
        Value::Uuid(u) => u.hyphenated().to_string(),
        Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Micros, true),
    };
    Ok(Some(text))
}

fn encode_float(kind: Kind, probe: f64, rendered: String) -> CodecResult<String> {
    if probe.is_nan() {
        return Err(CodecError::unencodable(kind, "NaN is not representable"));
    }
    // Normalize negative zero so encode/decode round-trips bytewise.
    if probe == 0.0 {
        return Ok("0".to_owned());
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn null_encodes_to_absent() {
        assert_eq!(encode_text(&Value::Null).unwrap(), None);
    }

    #[test]
    fn booleans_use_store_text_form() {
        assert_eq!(encode_text(&Value::Bool(true)).unwrap().unwrap(), "t");
        assert_eq!(encode_text(&Value::Bool(false)).unwrap().unwrap(), "f");
    }

    #[test]
    fn bytes_encode_as_hex() {
        let value = Value::Bytes(vec![0x00, 0xab, 0xff]);
        assert_eq!(encode_text(&value).unwrap().unwrap(), "\\x00abff");
    }

    #[test]
    fn empty_string_is_not_null() {
        assert_eq!(encode_text(&Value::text("")).unwrap(), Some(String::new()));
    }

    #[test]
    fn nan_is_rejected() {
        assert!(encode_text(&Value::Float64(f64::NAN)).is_err());
        assert!(encode_text(&Value::Float32(f32::NAN)).is_err());
    }

    #[test]
    fn negative_zero_normalized() {
        assert_eq!(encode_text(&Value::Float64(-0.0)).unwrap().unwrap(), "0");
    }

    #[test]
    fn uuid_hyphenated() {
        let u = Uuid::nil();
        assert_eq!(
            encode_text(&Value::Uuid(u)).unwrap().unwrap(),
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn timestamp_rfc3339_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap();
        assert_eq!(
            encode_text(&Value::timestamp(ts)).unwrap().unwrap(),
            "2024-05-01T12:30:45.000000Z"
        );
    }
}
