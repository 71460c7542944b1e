// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `C` (character) field codec.

use super::value::FieldValue;
use crate::error::{Error, Result};

/// Decodes `length` bytes of a `C` field, trimming trailing ASCII spaces.
pub fn decode(bytes: &[u8]) -> FieldValue {
    let mut end = bytes.len();
    while end > 0 && bytes.get(end - 1) == Some(&b' ') {
        end -= 1;
    }
    FieldValue::Character(bytes[..end].to_vec())
}

/// Encodes a `C` field: right-pad with spaces, truncate if too long, all-spaces if absent.
pub fn encode(field: &str, length: u8, value: &FieldValue) -> Result<Vec<u8>> {
    let length = usize::from(length);
    let src: &[u8] = match value {
        FieldValue::Character(bytes) => bytes,
        _ => {
            return Err(Error::InvalidType {
                field: field.to_string(),
                expected: "character",
            })
        }
    };

    let mut out = vec![b' '; length];
    let n = src.len().min(length);
    if let Some(slot) = out.get_mut(..n) {
        if let Some(head) = src.get(..n) {
            slot.copy_from_slice(head);
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_spaces() {
        let v = decode(b"Alice     ");
        assert_eq!(v, FieldValue::Character(b"Alice".to_vec()));
    }

    #[test]
    fn empty_field_decodes_to_empty_string() {
        let v = decode(b"          ");
        assert_eq!(v, FieldValue::Character(Vec::new()));
    }

    #[test]
    fn encode_pads_and_truncates() {
        let short = encode("NAME", 10, &FieldValue::Character(b"Al".to_vec())).unwrap();
        assert_eq!(short, b"Al        ");

        let long = encode("NAME", 3, &FieldValue::Character(b"Alice".to_vec())).unwrap();
        assert_eq!(long, b"Ali");
    }

    #[test]
    fn encode_rejects_wrong_type() {
        let err = encode("NAME", 10, &FieldValue::Integer(Some(1))).unwrap_err();
        assert!(matches!(err, Error::InvalidType { .. }));
    }
}
