// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `D` (date) field codec: 8-byte `YYYYMMDD` ASCII.

use super::value::{CalendarDate, FieldValue};
use crate::error::{Error, Result};

/// Decodes an 8-byte `YYYYMMDD` field. Blank decodes to `None`.
pub fn decode(field: &str, bytes: &[u8]) -> Result<FieldValue> {
    if bytes.iter().all(|&b| b == b' ') {
        return Ok(FieldValue::Date(None));
    }

    let text = std::str::from_utf8(bytes).map_err(|_| Error::InvalidDate {
        field: field.to_string(),
        value: String::from_utf8_lossy(bytes).to_string(),
    })?;

    parse_ymd8(text)
        .map(|date| FieldValue::Date(Some(date)))
        .ok_or_else(|| Error::InvalidDate {
            field: field.to_string(),
            value: text.to_string(),
        })
}

/// Encodes a calendar date as `YYYYMMDD`; `None` encodes to 8 spaces.
pub fn encode(field: &str, value: &FieldValue) -> Result<Vec<u8>> {
    match value {
        FieldValue::Date(Some(date)) => Ok(format!("{:04}{:02}{:02}", date.year, date.month, date.day).into_bytes()),
        FieldValue::Date(None) => Ok(vec![b' '; 8]),
        _ => Err(Error::InvalidType {
            field: field.to_string(),
            expected: "date",
        }),
    }
}

pub(crate) fn parse_ymd8(text: &str) -> Option<CalendarDate> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = text.get(0..4)?.parse().ok()?;
    let month: u8 = text.get(4..6)?.parse().ok()?;
    let day: u8 = text.get(6..8)?.parse().ok()?;
    CalendarDate::new(year, month, day)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decode_valid_date() {
        let v = decode("JOINED", b"20240101").unwrap();
        assert_eq!(v, FieldValue::Date(Some(CalendarDate::new(2024, 1, 1).unwrap())));
    }

    #[test]
    fn decode_blank_is_null() {
        let v = decode("JOINED", b"        ").unwrap();
        assert_eq!(v, FieldValue::Date(None));
    }

    #[test]
    fn decode_invalid_calendar_date_errors() {
        let err = decode("JOINED", b"20240231").unwrap_err();
        assert!(matches!(err, Error::InvalidDate { .. }));
    }

    #[test]
    fn round_trip() {
        let original = FieldValue::Date(CalendarDate::new(1999, 12, 31));
        let encoded = encode("JOINED", &original).unwrap();
        assert_eq!(encoded, b"19991231");
        let decoded = decode("JOINED", &encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn leap_day_valid_and_non_leap_invalid() {
        assert!(CalendarDate::new(2024, 2, 29).is_some());
        assert!(CalendarDate::new(2023, 2, 29).is_none());
    }
}
