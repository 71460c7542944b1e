// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Wall-clock date used to stamp a table header's `last_update` field.

use crate::field::date_from_julian_day;
use crate::header::HeaderDate;
use std::time::{SystemTime, UNIX_EPOCH};

/// Julian day number of 1970-01-01, the Unix epoch.
const UNIX_EPOCH_JULIAN_DAY: i64 = 2_440_588;

/// Returns today's date, for stamping a header's `last_update` field.
pub(crate) fn today() -> HeaderDate {
    #[cfg(test)]
    {
        if let Some(cell) = TODAY_OVERRIDE.get() {
            if let Some(value) = *cell.lock().expect("lock is poisoned") {
                return value;
            }
        }
    }

    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let days = elapsed.as_secs() / 86_400;
    #[allow(clippy::cast_possible_wrap)]
    let jdn = UNIX_EPOCH_JULIAN_DAY + days as i64;

    date_from_julian_day(jdn)
        .map(|d| HeaderDate { year: u16::try_from(d.year).unwrap_or(1900), month: d.month, day: d.day })
        .unwrap_or(HeaderDate { year: 1900, month: 1, day: 1 })
}

#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(test)]
static TODAY_OVERRIDE: OnceLock<Mutex<Option<HeaderDate>>> = OnceLock::new();

#[cfg(test)]
pub(crate) fn set_today_for_test(value: Option<HeaderDate>) {
    let cell = TODAY_OVERRIDE.get_or_init(|| Mutex::new(None));
    *cell.lock().expect("lock is poisoned") = value;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn today_is_deterministic_when_overridden() {
        set_today_for_test(Some(HeaderDate { year: 2024, month: 1, day: 1 }));
        assert_eq!(today(), HeaderDate { year: 2024, month: 1, day: 1 });
        set_today_for_test(None);
    }
}
