// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Conflict detection: compare a handle's last-known fingerprint against the current
//! on-disk state before a mutating call, when the caller opts in via `with_conflict_check`.

use crate::error::{Error, Result};
use crate::header::HeaderDate;
use crate::table::TableHandle;

/// A cheap summary of a table's on-disk state, used to detect concurrent writers.
///
/// Two independent handles to the same file that both observe the same fingerprint have seen
/// the same on-disk state; a fingerprint mismatch means something else wrote to the file since
/// this handle last read or refreshed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub(crate) record_count: u32,
    pub(crate) last_update: HeaderDate,
    pub(crate) file_len: u64,
}

impl Fingerprint {
    /// Compares `self` (the handle's last-known state) against `current` (freshly read from
    /// disk), returning `write_conflict` on any mismatch.
    pub(crate) fn check_against(self, current: Self) -> Result<()> {
        if self == current {
            Ok(())
        } else {
            log::warn!(
                "write conflict detected: in-handle fingerprint {self:?} != on-disk {current:?}"
            );
            Err(Error::WriteConflict)
        }
    }
}

/// Runs `op` against `handle` only if `expected` still matches the handle's on-disk state.
///
/// Returns `op`'s result alongside the fingerprint taken immediately after `op` ran, so the
/// caller can feed it into the next `with_conflict_check` call without re-reading the header
/// itself.
pub fn with_conflict_check<R>(
    handle: &mut TableHandle,
    expected: Fingerprint,
    op: impl FnOnce(&mut TableHandle) -> Result<R>,
) -> Result<(R, Fingerprint)> {
    let current = handle.fingerprint()?;
    expected.check_against(current)?;

    let result = op(handle)?;
    let updated = handle.fingerprint()?;
    Ok((result, updated))
}

/// Re-reads `handle`'s header from disk and returns the fingerprint it now observes, so a
/// caller that hit `write_conflict` can retry against fresh state.
pub fn refresh_handle_state(handle: &mut TableHandle) -> Result<Fingerprint> {
    handle.refresh()?;
    handle.fingerprint()
}

/// `with_conflict_check`, but on a `write_conflict` mismatch performs one automatic
/// refresh-and-retry cycle before giving up.
pub fn with_conflict_check_with_retry<R>(
    handle: &mut TableHandle,
    expected: Fingerprint,
    op: impl Fn(&mut TableHandle) -> Result<R>,
) -> Result<(R, Fingerprint)> {
    match with_conflict_check(handle, expected, &op) {
        Ok(outcome) => Ok(outcome),
        Err(Error::WriteConflict) => {
            let refreshed = refresh_handle_state(handle)?;
            with_conflict_check(handle, refreshed, &op)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::field::FieldValue;
    use crate::header::FieldDescriptor;
    use crate::table::{TableCreateOptions, TableOpenOptions};
    use rustc_hash::FxHashMap;
    use tempfile::tempdir;

    #[test]
    fn mismatched_fingerprint_yields_write_conflict() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.dbf");
        let fields = vec![FieldDescriptor::new("NAME".to_string(), b'C', 20, 0)];
        TableHandle::create(&path, fields, &TableCreateOptions::default()).unwrap().close().unwrap();

        let mut h1 = TableHandle::open(&path, &TableOpenOptions::read_write()).unwrap();
        let mut h2 = TableHandle::open(&path, &TableOpenOptions::read_write()).unwrap();
        let stale = h2.fingerprint().unwrap();

        let mut values = FxHashMap::default();
        values.insert("NAME".to_string(), FieldValue::from("Alice"));
        h1.append_record(&values).unwrap();

        let err = with_conflict_check(&mut h2, stale, |h| h.append_record(&values)).unwrap_err();
        assert!(matches!(err, Error::WriteConflict));

        let refreshed = refresh_handle_state(&mut h2).unwrap();
        let (index, _) = with_conflict_check(&mut h2, refreshed, |h| h.append_record(&values)).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn retry_variant_recovers_from_one_conflict() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.dbf");
        let fields = vec![FieldDescriptor::new("NAME".to_string(), b'C', 20, 0)];
        TableHandle::create(&path, fields, &TableCreateOptions::default()).unwrap().close().unwrap();

        let mut h1 = TableHandle::open(&path, &TableOpenOptions::read_write()).unwrap();
        let mut h2 = TableHandle::open(&path, &TableOpenOptions::read_write()).unwrap();
        let stale = h2.fingerprint().unwrap();

        let mut values = FxHashMap::default();
        values.insert("NAME".to_string(), FieldValue::from("Alice"));
        h1.append_record(&values).unwrap();

        let (index, _) =
            with_conflict_check_with_retry(&mut h2, stale, |h| h.append_record(&values)).unwrap();
        assert_eq!(index, 1);
    }
}
