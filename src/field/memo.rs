// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `M` (memo) field codec.
//!
//! This module only knows about the integer reference stored in the field's bytes; resolving
//! that reference to memo content is [`crate::coordinator`]'s job.

use super::value::{FieldValue, MemoInput, MemoReference};
use crate::error::{Error, Result};

/// Decodes a right-aligned ASCII block number. Blank or unparsable decodes to `None`.
pub fn decode(bytes: &[u8]) -> FieldValue {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    match trimmed.parse::<u32>() {
        Ok(block_number) if block_number > 0 => {
            FieldValue::Memo(MemoInput::Reference(MemoReference { block_number }))
        }
        _ => FieldValue::Memo(MemoInput::None),
    }
}

/// Encodes a memo reference as right-aligned ASCII digits; rejects raw text (the coordinator
/// resolves that).
pub fn encode(field: &str, length: u8, value: &FieldValue) -> Result<Vec<u8>> {
    let length_usize = usize::from(length);
    let memo = match value {
        FieldValue::Memo(m) => m,
        _ => {
            return Err(Error::InvalidType {
                field: field.to_string(),
                expected: "memo",
            })
        }
    };

    match memo {
        MemoInput::None => Ok(vec![b' '; length_usize]),
        MemoInput::Reference(r) if r.block_number == 0 => Ok(vec![b' '; length_usize]),
        MemoInput::Reference(r) => {
            let digits = r.block_number.to_string();
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
        MemoInput::Text(_) => Err(Error::InvalidType {
            field: field.to_string(),
            expected: "memo reference (raw text must be resolved by the memo coordinator)",
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decode_reference() {
        let v = decode(b"         7");
        assert_eq!(
            v,
            FieldValue::Memo(MemoInput::Reference(MemoReference { block_number: 7 }))
        );
    }

    #[test]
    fn decode_blank_is_none() {
        assert_eq!(decode(b"          "), FieldValue::Memo(MemoInput::None));
    }

    #[test]
    fn encode_text_is_rejected() {
        let err = encode("NOTES", 10, &FieldValue::Memo(MemoInput::Text("hi".into()))).unwrap_err();
        assert!(matches!(err, Error::InvalidType { .. }));
    }

    #[test]
    fn round_trip_reference() {
        let original = FieldValue::Memo(MemoInput::Reference(MemoReference { block_number: 42 }));
        let encoded = encode("NOTES", 10, &original).unwrap();
        assert_eq!(decode(&encoded), original);
    }
}
