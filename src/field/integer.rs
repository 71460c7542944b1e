// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `I` (integer) field codec.
//!
//! dBase dialects disagree on whether `I` fields are stored as right-aligned ASCII text or as
//! a raw 4-byte little-endian signed integer. This codec accepts both forms on read and always
//! emits the binary form on write when `length == 4`, maximizing interoperability.

use super::value::FieldValue;
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Decodes an `I` field: ASCII text first, falling back to 4-byte little-endian binary.
pub fn decode(field: &str, length: u8, bytes: &[u8]) -> Result<FieldValue> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();

    if !trimmed.is_empty() {
        if let Ok(value) = trimmed.parse::<i64>() {
            return Ok(FieldValue::Integer(Some(value)));
        }
    }

    if length == 4 {
        let mut cursor = bytes;
        if let Ok(value) = cursor.read_i32::<LittleEndian>() {
            return Ok(FieldValue::Integer(Some(i64::from(value))));
        }
    }

    if trimmed.is_empty() {
        return Ok(FieldValue::Integer(None));
    }

    Err(Error::InvalidNumeric {
        field: field.to_string(),
        value: trimmed.to_string(),
    })
}

/// Encodes an `I` field. When `length == 4`, emits a 4-byte little-endian signed integer
/// (the canonical binary form), rejecting values that overflow `i32`; otherwise falls back to
/// right-aligned ASCII text.
pub fn encode(field: &str, length: u8, value: &FieldValue) -> Result<Vec<u8>> {
    let number = match value {
        FieldValue::Integer(n) => *n,
        _ => {
            return Err(Error::InvalidType {
                field: field.to_string(),
                expected: "integer",
            })
        }
    };

    if length == 4 {
        let narrowed = match number {
            None => 0i32,
            Some(n) => i32::try_from(n).map_err(|_| Error::IntegerOutOfRange {
                field: field.to_string(),
                value: n,
            })?,
        };
        let mut out = Vec::with_capacity(4);
        out.write_i32::<LittleEndian>(narrowed).map_err(Error::Io)?;
        return Ok(out);
    }

    let length_usize = usize::from(length);
    let Some(number) = number else {
        return Ok(vec![b' '; length_usize]);
    };
    let digits = number.to_string();
    if digits.len() > length_usize {
        return Err(Error::FieldTooLarge {
            field: field.to_string(),
            length,
        });
    }
    let mut out = vec![b' '; length_usize - digits.len()];
    out.extend_from_slice(digits.as_bytes());
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decode_ascii_form() {
        let v = decode("ID", 4, b" 123").unwrap();
        assert_eq!(v, FieldValue::Integer(Some(123)));
    }

    #[test]
    fn decode_binary_fallback() {
        let bytes = 300i32.to_le_bytes();
        let v = decode("ID", 4, &bytes).unwrap();
        assert_eq!(v, FieldValue::Integer(Some(300)));
    }

    #[test]
    fn encode_binary_round_trip() {
        let encoded = encode("ID", 4, &FieldValue::Integer(Some(-5))).unwrap();
        let decoded = decode("ID", 4, &encoded).unwrap();
        assert_eq!(decoded, FieldValue::Integer(Some(-5)));
    }

    #[test]
    fn encode_rejects_overflow_for_binary_form() {
        let err = encode("ID", 4, &FieldValue::Integer(Some(3_000_000_000))).unwrap_err();
        assert!(matches!(err, Error::IntegerOutOfRange { .. }));
    }

    #[test]
    fn null_encodes_to_zero_in_binary_form() {
        let encoded = encode("ID", 4, &FieldValue::Integer(None)).unwrap();
        assert_eq!(encoded, 0i32.to_le_bytes());
    }

    #[test]
    fn random_i32_range_round_trips_through_binary_form() {
        use rand::Rng;
        let mut rng = rand::rng();
        for _ in 0..256 {
            let n = rng.random_range(i64::from(i32::MIN)..=i64::from(i32::MAX));
            let encoded = encode("ID", 4, &FieldValue::Integer(Some(n))).unwrap();
            let decoded = decode("ID", 4, &encoded).unwrap();
            assert_eq!(decoded, FieldValue::Integer(Some(n)));
        }
    }
}
