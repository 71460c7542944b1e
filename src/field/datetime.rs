// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `T` (datetime) field codec.
//!
//! Like `I`, dialects disagree on the wire form: some write `YYYYMMDD`/`YYYYMMDDHHMMSS` ASCII
//! text, others a pair of little-endian `u32`s (Julian day number, milliseconds since
//! midnight). This codec accepts both on read and always emits the binary form on write.

use super::date::parse_ymd8;
use super::value::{CalendarDate, DateTimeValue, FieldValue};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Decodes a `T` field: ASCII text first (`YYYYMMDD` or `YYYYMMDDHHMMSS`), then binary
/// `(julian_day, millis_since_midnight)` if `length == 8`.
pub fn decode(field: &str, length: u8, bytes: &[u8]) -> Result<FieldValue> {
    if bytes.iter().all(|&b| b == b' ') {
        return Ok(FieldValue::DateTime(None));
    }

    if let Some(text) = std::str::from_utf8(bytes).ok().map(str::trim) {
        if !text.is_empty() {
            if let Some(value) = parse_ascii(text) {
                return Ok(FieldValue::DateTime(Some(value)));
            }
        }
    }

    if length == 8 {
        let mut cursor = bytes;
        let julian_day = cursor.read_u32::<LittleEndian>().map_err(Error::Io)?;
        let millis = cursor.read_u32::<LittleEndian>().map_err(Error::Io)?;

        if julian_day == 0 && millis == 0 {
            return Ok(FieldValue::DateTime(None));
        }

        if i64::from(millis) >= MILLIS_PER_DAY {
            return Ok(FieldValue::DateTime(None));
        }

        let Some(date) = date_from_julian_day(i64::from(julian_day)) else {
            return Ok(FieldValue::DateTime(None));
        };

        return Ok(FieldValue::DateTime(Some(millis_to_datetime(date, millis))));
    }

    Err(Error::InvalidDatetime {
        field: field.to_string(),
        value: String::from_utf8_lossy(bytes).to_string(),
    })
}

/// Encodes a `T` field as `(julian_day, millis_since_midnight)`, little-endian; `None` encodes
/// to 8 zero bytes.
pub fn encode(field: &str, length: u8, value: &FieldValue) -> Result<Vec<u8>> {
    if length != 8 {
        return Err(Error::InvalidType {
            field: field.to_string(),
            expected: "datetime (length must be 8)",
        });
    }

    let datetime = match value {
        FieldValue::DateTime(v) => *v,
        _ => {
            return Err(Error::InvalidType {
                field: field.to_string(),
                expected: "datetime",
            })
        }
    };

    let mut out = Vec::with_capacity(8);
    match datetime {
        None => {
            out.write_u32::<LittleEndian>(0).map_err(Error::Io)?;
            out.write_u32::<LittleEndian>(0).map_err(Error::Io)?;
        }
        Some(value) => {
            let julian_day = julian_day_from_date(value.date);
            let millis = datetime_to_millis(value);
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            out.write_u32::<LittleEndian>(julian_day as u32).map_err(Error::Io)?;
            out.write_u32::<LittleEndian>(millis).map_err(Error::Io)?;
        }
    }
    Ok(out)
}

fn parse_ascii(text: &str) -> Option<DateTimeValue> {
    if text.len() == 8 {
        let date = parse_ymd8(text)?;
        return Some(DateTimeValue { date, hour: 0, minute: 0, second: 0, millisecond: 0 });
    }
    if text.len() == 14 {
        let date = parse_ymd8(text.get(0..8)?)?;
        let hour: u8 = text.get(8..10)?.parse().ok()?;
        let minute: u8 = text.get(10..12)?.parse().ok()?;
        let second: u8 = text.get(12..14)?.parse().ok()?;
        if hour > 23 || minute > 59 || second > 59 {
            return None;
        }
        return Some(DateTimeValue { date, hour, minute, second, millisecond: 0 });
    }
    None
}

fn datetime_to_millis(value: DateTimeValue) -> u32 {
    let seconds = u32::from(value.hour) * 3600 + u32::from(value.minute) * 60 + u32::from(value.second);
    seconds * 1000 + u32::from(value.millisecond)
}

fn millis_to_datetime(date: CalendarDate, millis: u32) -> DateTimeValue {
    let millisecond = (millis % 1000) as u16;
    let total_seconds = millis / 1000;
    let second = (total_seconds % 60) as u8;
    let total_minutes = total_seconds / 60;
    let minute = (total_minutes % 60) as u8;
    let hour = (total_minutes / 60) as u8;
    DateTimeValue { date, hour, minute, second, millisecond }
}

/// Converts a Gregorian calendar date to a Julian day number using the Fliegel & Van Flandern
/// algorithm (the integer form of Meeus's conversion in *Astronomical Algorithms*).
pub(crate) fn julian_day_from_date(date: CalendarDate) -> i64 {
    let y = i64::from(date.year);
    let m = i64::from(date.month);
    let d = i64::from(date.day);

    (1461 * (y + 4800 + (m - 14) / 12)) / 4 + (367 * (m - 2 - 12 * ((m - 14) / 12))) / 12
        - (3 * ((y + 4900 + (m - 14) / 12) / 100)) / 4
        + d
        - 32075
}

/// Converts a Julian day number back to a Gregorian calendar date. Returns `None` if the
/// result would not be a valid calendar date (defensive; the forward conversion always
/// produces a valid day number for a valid date).
pub(crate) fn date_from_julian_day(jdn: i64) -> Option<CalendarDate> {
    if jdn <= 0 {
        return None;
    }

    let l = jdn + 68569;
    let n = (4 * l) / 146_097;
    let l = l - (146_097 * n + 3) / 4;
    let i = (4000 * (l + 1)) / 1_461_001;
    let l = l - (1461 * i) / 4 + 31;
    let j = (80 * l) / 2447;
    let day = l - (2447 * j) / 80;
    let l = j / 11;
    let month = j + 2 - 12 * l;
    let year = 100 * (n - 49) + i + l;

    CalendarDate::new(i32::try_from(year).ok()?, u8::try_from(month).ok()?, u8::try_from(day).ok()?)
}
