// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `N` (numeric) field codec.

use super::value::{FieldValue, Numeric};
use crate::error::{Error, Result};

/// Decodes a right-aligned, space-padded ASCII numeric field.
pub fn decode(field: &str, decimal_count: u8, bytes: &[u8]) -> Result<FieldValue> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();

    if trimmed.is_empty() || trimmed.starts_with('*') {
        return Ok(FieldValue::Numeric(None));
    }

    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rest, ""),
    };

    let int_valid = !int_part.is_empty() && int_part.bytes().all(|b| b.is_ascii_digit());
    let frac_valid = frac_part.bytes().all(|b| b.is_ascii_digit());
    if !int_valid || !frac_valid {
        return Err(Error::InvalidNumeric {
            field: field.to_string(),
            value: trimmed.to_string(),
        });
    }

    let digits = format!("{int_part}{frac_part}");
    let mut mantissa: i128 = digits.parse().map_err(|_| Error::InvalidNumeric {
        field: field.to_string(),
        value: trimmed.to_string(),
    })?;

    let observed_scale = frac_part.len();
    let target_scale = usize::from(decimal_count);
    if observed_scale < target_scale {
        mantissa *= 10i128.pow((target_scale - observed_scale) as u32);
    } else if observed_scale > target_scale {
        mantissa /= 10i128.pow((observed_scale - target_scale) as u32);
    }

    if negative {
        mantissa = -mantissa;
    }

    Ok(FieldValue::Numeric(Some(Numeric::new(mantissa, decimal_count))))
}

/// Encodes a value with exactly `decimal_count` fractional digits, right-aligned to `length`.
pub fn encode(field: &str, length: u8, decimal_count: u8, value: &FieldValue) -> Result<Vec<u8>> {
    let length_usize = usize::from(length);

    let numeric = match value {
        FieldValue::Numeric(n) => *n,
        _ => {
            return Err(Error::InvalidType {
                field: field.to_string(),
                expected: "numeric",
            })
        }
    };

    let Some(numeric) = numeric else {
        return Ok(vec![b' '; length_usize]);
    };

    let rescaled = rescale(numeric.mantissa(), numeric.scale(), decimal_count);
    let formatted = format_fixed(rescaled, decimal_count);

    if formatted.len() > length_usize {
        return Err(Error::FieldTooLarge {
            field: field.to_string(),
            length,
        });
    }

    let mut out = vec![b' '; length_usize - formatted.len()];
    out.extend_from_slice(formatted.as_bytes());
    Ok(out)
}

fn rescale(mantissa: i128, from_scale: u8, to_scale: u8) -> i128 {
    if from_scale == to_scale {
        mantissa
    } else if from_scale < to_scale {
        mantissa * 10i128.pow(u32::from(to_scale - from_scale))
    } else {
        mantissa / 10i128.pow(u32::from(from_scale - to_scale))
    }
}

fn format_fixed(mantissa: i128, scale: u8) -> String {
    let negative = mantissa < 0;
    let magnitude = mantissa.unsigned_abs();
    let digits = magnitude.to_string();
    let scale = usize::from(scale);

    let body = if scale == 0 {
        digits
    } else if digits.len() <= scale {
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let split_at = padded.len() - scale;
        #[allow(clippy::indexing_slicing)]
        format!("{}.{}", &padded[..split_at], &padded[split_at..])
    } else {
        let split_at = digits.len() - scale;
        #[allow(clippy::indexing_slicing)]
        format!("{}.{}", &digits[..split_at], &digits[split_at..])
    };

    if negative {
        format!("-{body}")
    } else {
        body
    }
}
