// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `L` (logical) field codec.

use super::value::FieldValue;
use crate::error::{Error, Result};

/// Decodes a single logical byte into a tri-state boolean.
pub fn decode(byte: u8) -> FieldValue {
    match byte {
        b'T' | b't' | b'Y' | b'y' => FieldValue::Logical(Some(true)),
        b'F' | b'f' | b'N' | b'n' => FieldValue::Logical(Some(false)),
        _ => FieldValue::Logical(None),
    }
}

/// Encodes a tri-state boolean as a single byte: `T`, `F`, or `?`.
pub fn encode(field: &str, value: &FieldValue) -> Result<Vec<u8>> {
    match value {
        FieldValue::Logical(Some(true)) => Ok(vec![b'T']),
        FieldValue::Logical(Some(false)) => Ok(vec![b'F']),
        FieldValue::Logical(None) => Ok(vec![b'?']),
        _ => Err(Error::InvalidType {
            field: field.to_string(),
            expected: "logical",
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_truthy_variants() {
        for b in [b'T', b't', b'Y', b'y'] {
            assert_eq!(decode(b), FieldValue::Logical(Some(true)));
        }
    }

    #[test]
    fn decodes_falsy_variants() {
        for b in [b'F', b'f', b'N', b'n'] {
            assert_eq!(decode(b), FieldValue::Logical(Some(false)));
        }
    }

    #[test]
    fn decodes_unknown_as_null() {
        assert_eq!(decode(b'?'), FieldValue::Logical(None));
        assert_eq!(decode(b' '), FieldValue::Logical(None));
        assert_eq!(decode(b'x'), FieldValue::Logical(None));
    }

    #[test]
    fn encode_round_trip() {
        assert_eq!(encode("A", &FieldValue::Logical(Some(true))).unwrap(), b"T");
        assert_eq!(encode("A", &FieldValue::Logical(Some(false))).unwrap(), b"F");
        assert_eq!(encode("A", &FieldValue::Logical(None)).unwrap(), b"?");
    }
}
