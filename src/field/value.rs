// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The closed sum type shared between the field codec, the record engine, and the memo
//! coordinator.

use std::fmt;

/// A decoded or to-be-encoded field value.
///
/// This is the common currency between [`crate::field::decode`]/[`crate::field::encode`]
/// the field codec, the record engine, and the memo coordinator. Every `type_code` from
/// Every recognized `type_code` has exactly one variant; [`FieldValue::Unknown`] is a
/// forward-compatibility
/// escape hatch for a `type_code` byte this crate does not interpret.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `C` — a (possibly empty) trimmed byte string.
    Character(Vec<u8>),
    /// `N` — a fixed-point decimal, or `None` for a blank/overflowed field.
    Numeric(Option<Numeric>),
    /// `D` — a calendar date, or `None` for a blank field.
    Date(Option<CalendarDate>),
    /// `L` — a tri-state boolean.
    Logical(Option<bool>),
    /// `M` — a memo field, either an on-disk reference or (write-path only) raw text.
    Memo(MemoInput),
    /// `I` — an integer value, or `None` for a blank field. Held as `i64` so out-of-range
    /// values (too wide for the eventual signed 32-bit on-disk encoding) can be represented
    /// and rejected with `integer_out_of_range` at encode time rather than truncated silently.
    Integer(Option<i64>),
    /// `T` — a date and time, or `None` for a blank/zero field.
    DateTime(Option<DateTimeValue>),
    /// A `type_code` byte this crate does not know how to interpret; bytes pass through as-is.
    Unknown(Vec<u8>),
}

impl FieldValue {
    /// Returns the character bytes, if this is a `Character` value.
    #[must_use]
    pub fn as_character(&self) -> Option<&[u8]> {
        match self {
            Self::Character(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the string content, if this is a `Character` value and valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_character().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns the numeric value, if this is a `Numeric` value.
    #[must_use]
    pub fn as_numeric(&self) -> Option<&Numeric> {
        match self {
            Self::Numeric(n) => n.as_ref(),
            _ => None,
        }
    }

    /// Returns the logical value, if this is a `Logical` value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Logical(b) => *b,
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Character(value.as_bytes().to_vec())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Character(value.into_bytes())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Logical(Some(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(Some(i64::from(value)))
    }
}

/// A fixed-point decimal value, stored as an integer mantissa and a decimal scale.
///
/// `value = mantissa / 10^scale`. This avoids floating-point round-trip loss for the exact
/// ASCII representation dBase numeric fields use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Numeric {
    mantissa: i128,
    scale: u8,
}

impl Numeric {
    /// Builds a numeric value from an integer mantissa and decimal scale.
    #[must_use]
    pub fn new(mantissa: i128, scale: u8) -> Self {
        Self { mantissa, scale }
    }

    /// Builds an integer-valued (`scale = 0`) numeric value.
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self { mantissa: i128::from(value), scale: 0 }
    }

    /// The raw integer mantissa (`value * 10^scale`).
    #[must_use]
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// The number of fractional decimal digits.
    #[must_use]
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Converts to `f64` for convenience; may lose precision for very large mantissas.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let mantissa = self.mantissa as f64;
        mantissa / 10f64.powi(i32::from(self.scale))
    }

    /// Converts to `i64`, truncating any fractional part.
    #[must_use]
    pub fn to_i64(&self) -> i64 {
        let divisor = 10i128.pow(u32::from(self.scale));
        (self.mantissa / divisor) as i64
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.mantissa < 0;
        let magnitude = self.mantissa.unsigned_abs();
        let digits = magnitude.to_string();
        let scale = self.scale as usize;

        if negative {
            write!(f, "-")?;
        }

        if scale == 0 {
            return write!(f, "{digits}");
        }

        if digits.len() <= scale {
            let padded = format!("{:0>width$}", digits, width = scale + 1);
            let (int_part, frac_part) = padded.split_at(padded.len() - scale);
            write!(f, "{int_part}.{frac_part}")
        } else {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{int_part}.{frac_part}")
        }
    }
}

/// A Gregorian calendar date, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalendarDate {
    /// Full year, e.g. `2024`.
    pub year: i32,
    /// Month, `1..=12`.
    pub month: u8,
    /// Day of month, `1..=31`.
    pub day: u8,
}

impl CalendarDate {
    /// Builds a calendar date, validating that `(year, month, day)` is a real Gregorian date.
    pub fn new(year: i32, month: u8, day: u8) -> Option<Self> {
        if !(1..=12).contains(&month) {
            return None;
        }
        let days_in_month = days_in_month(year, month);
        if day < 1 || day > days_in_month {
            return None;
        }
        Some(Self { year, month, day })
    }
}

/// Returns whether `year` is a Gregorian leap year.
#[must_use]
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Returns the number of days in `(year, month)`.
#[must_use]
pub fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// A date and time of day, with millisecond precision (the granularity the `T` binary
/// encoding uses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeValue {
    /// The calendar date component.
    pub date: CalendarDate,
    /// Hour, `0..=23`.
    pub hour: u8,
    /// Minute, `0..=59`.
    pub minute: u8,
    /// Second, `0..=59`.
    pub second: u8,
    /// Millisecond, `0..=999`.
    pub millisecond: u16,
}

/// An integer block number stored in an `M`-typed field, linking a record to content in the
/// memo file. `block_number = 0` means "no memo".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoReference {
    /// The 1-based block number in the bound memo file, or `0` for "no memo".
    pub block_number: u32,
}

impl MemoReference {
    /// The sentinel reference meaning "no memo".
    pub const NONE: Self = Self { block_number: 0 };

    /// Returns whether this reference actually points at a memo block.
    #[must_use]
    pub fn is_some(&self) -> bool {
        self.block_number > 0
    }
}

/// The value carried by a `Memo`-typed [`FieldValue`].
///
/// The field codec only ever decodes to [`MemoInput::Reference`] or [`MemoInput::None`]
/// — it has no access to the memo file. [`MemoInput::Text`] exists only as a write-path input
/// the memo coordinator resolves into a [`MemoInput::Reference`] before the record engine
/// encodes it; the field codec's own encoder rejects `Text` with `invalid_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoInput {
    /// No memo content (`block_number = 0`, or a blank/unparsable field on decode).
    None,
    /// A resolved block reference, ready for the field codec to encode as right-aligned ASCII
    /// digits.
    Reference(MemoReference),
    /// Raw text to be written to the memo file before encoding (write-path only).
    Text(String),
}

impl MemoInput {
    /// Returns the reference, if this is a `Reference` (or `None`, yielding `MemoReference::NONE`).
    #[must_use]
    pub fn as_reference(&self) -> Option<MemoReference> {
        match self {
            Self::None => Some(MemoReference::NONE),
            Self::Reference(r) => Some(*r),
            Self::Text(_) => None,
        }
    }
}
