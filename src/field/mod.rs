// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Field codec: decode/encode one field value from/to its fixed-width byte slice.
//!
//! Dispatch is a total function over a closed sum type of field types, keyed by the
//! single-character `type_code` a
//! [`crate::header::FieldDescriptor`] carries.

mod character;
mod date;
mod datetime;
mod integer;
mod logical;
mod memo;
mod numeric;
pub mod value;

pub use value::{CalendarDate, DateTimeValue, FieldValue, MemoInput, MemoReference, Numeric};
pub(crate) use datetime::date_from_julian_day;

use crate::error::{Error, Result};
use crate::header::FieldDescriptor;

/// The closed set of field types this crate interprets, derived from a descriptor's
/// `type_code` byte. `Unknown` is the forward-compatibility variant for an unrecognized byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `C` — character.
    Character,
    /// `N` — numeric, with a fixed decimal scale.
    Numeric,
    /// `D` — date.
    Date,
    /// `L` — logical.
    Logical,
    /// `M` — memo reference.
    Memo,
    /// `I` — integer.
    Integer,
    /// `T` — datetime.
    DateTime,
    /// A `type_code` byte not in `{C, N, D, L, M, I, T}`.
    Unknown(u8),
}

impl FieldType {
    /// Classifies a raw `type_code` byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'C' => Self::Character,
            b'N' => Self::Numeric,
            b'D' => Self::Date,
            b'L' => Self::Logical,
            b'M' => Self::Memo,
            b'I' => Self::Integer,
            b'T' => Self::DateTime,
            other => Self::Unknown(other),
        }
    }

    /// Returns the original `type_code` byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Character => b'C',
            Self::Numeric => b'N',
            Self::Date => b'D',
            Self::Logical => b'L',
            Self::Memo => b'M',
            Self::Integer => b'I',
            Self::DateTime => b'T',
            Self::Unknown(b) => b,
        }
    }
}

/// Decodes one field's raw bytes (exactly `descriptor.length` bytes) according to its
/// declared `type_code`.
pub fn decode(descriptor: &FieldDescriptor, bytes: &[u8]) -> Result<FieldValue> {
    match FieldType::from_byte(descriptor.type_code) {
        FieldType::Character => Ok(character::decode(bytes)),
        FieldType::Numeric => numeric::decode(&descriptor.name, descriptor.decimal_count, bytes),
        FieldType::Date => date::decode(&descriptor.name, bytes),
        FieldType::Logical => {
            let byte = bytes.first().copied().unwrap_or(b' ');
            Ok(logical::decode(byte))
        }
        FieldType::Memo => Ok(memo::decode(bytes)),
        FieldType::Integer => integer::decode(&descriptor.name, descriptor.length, bytes),
        FieldType::DateTime => datetime::decode(&descriptor.name, descriptor.length, bytes),
        FieldType::Unknown(b) => {
            let _ = b;
            Ok(FieldValue::Unknown(bytes.to_vec()))
        }
    }
}

/// Encodes one field value into exactly `descriptor.length` bytes according to its declared
/// `type_code`.
pub fn encode(descriptor: &FieldDescriptor, value: &FieldValue) -> Result<Vec<u8>> {
    match FieldType::from_byte(descriptor.type_code) {
        FieldType::Character => character::encode(&descriptor.name, descriptor.length, value),
        FieldType::Numeric => {
            numeric::encode(&descriptor.name, descriptor.length, descriptor.decimal_count, value)
        }
        FieldType::Date => date::encode(&descriptor.name, value),
        FieldType::Logical => logical::encode(&descriptor.name, value),
        FieldType::Memo => memo::encode(&descriptor.name, descriptor.length, value),
        FieldType::Integer => integer::encode(&descriptor.name, descriptor.length, value),
        FieldType::DateTime => datetime::encode(&descriptor.name, descriptor.length, value),
        FieldType::Unknown(_) => match value {
            FieldValue::Unknown(bytes) => {
                let length = usize::from(descriptor.length);
                let mut out = vec![0u8; length];
                let n = bytes.len().min(length);
                if let (Some(dst), Some(src)) = (out.get_mut(..n), bytes.get(..n)) {
                    dst.copy_from_slice(src);
                }
                Ok(out)
            }
            _ => Err(Error::UnknownFieldType(descriptor.type_code)),
        },
    }
}

/// Returns the per-type default value used by `append_record` when a field is missing from
/// the caller-supplied values.
#[must_use]
pub fn default_value(descriptor: &FieldDescriptor) -> FieldValue {
    match FieldType::from_byte(descriptor.type_code) {
        FieldType::Character => FieldValue::Character(Vec::new()),
        FieldType::Numeric => FieldValue::Numeric(Some(Numeric::from_i64(0))),
        FieldType::Logical => FieldValue::Logical(Some(false)),
        FieldType::Date => FieldValue::Date(None),
        FieldType::Memo => FieldValue::Memo(MemoInput::None),
        FieldType::Integer => FieldValue::Integer(None),
        FieldType::DateTime => FieldValue::DateTime(None),
        FieldType::Unknown(_) => FieldValue::Unknown(Vec::new()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn descriptor(type_code: u8, length: u8, decimal_count: u8) -> FieldDescriptor {
        FieldDescriptor::new("F".to_string(), type_code, length, decimal_count)
    }

    #[test]
    fn unknown_type_round_trips_raw_bytes() {
        let d = descriptor(b'X', 4, 0);
        let decoded = decode(&d, b"abcd").unwrap();
        assert_eq!(decoded, FieldValue::Unknown(b"abcd".to_vec()));
        let encoded = encode(&d, &decoded).unwrap();
        assert_eq!(encoded, b"abcd");
    }

    #[test]
    fn dispatch_covers_every_known_type_code() {
        for (byte, expected) in [
            (b'C', FieldType::Character),
            (b'N', FieldType::Numeric),
            (b'D', FieldType::Date),
            (b'L', FieldType::Logical),
            (b'M', FieldType::Memo),
            (b'I', FieldType::Integer),
            (b'T', FieldType::DateTime),
        ] {
            assert_eq!(FieldType::from_byte(byte), expected);
        }
    }
}
