// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Transaction manager: whole-file backup/commit/restore around a user closure.
//!
//! The backup is a full copy of the underlying file(s), taken while the handle is closed and
//! restored verbatim on failure. This is coarse but crash-safe against arbitrary partial
//! mutations and needs no on-disk log format.

use crate::coordinator::{MemoCoordinator, MemoCoordinatorOptions};
use crate::error::{Error, Result};
use crate::io;
use crate::table::{TableHandle, TableOpenOptions};
use std::ffi::OsString;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(OsString::from(".bak"));
    PathBuf::from(name)
}

/// Runs `closure` against a fresh read-write reopening of the table at `handle`'s path,
/// backing up the file first and restoring it verbatim if `closure` fails or panics.
///
/// On success, `handle` is consumed, the backup is discarded, and a fresh handle (opened with
/// `reopen_options`) is returned alongside the closure's result.
pub fn transaction_table<R>(
    handle: TableHandle,
    reopen_options: &TableOpenOptions,
    closure: impl FnOnce(&mut TableHandle) -> Result<R>,
) -> Result<(TableHandle, R)> {
    let path = handle.path().to_path_buf();
    handle.close()?;

    let backup_path = backup_path_for(&path);
    io::copy_file(&path, &backup_path)?;
    log::debug!("transaction backed up {path:?} -> {backup_path:?}");

    let mut working = TableHandle::open(&path, &TableOpenOptions::read_write())?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| closure(&mut working)));
    let _ = working.close();

    match outcome {
        Ok(Ok(value)) => {
            std::fs::remove_file(&backup_path)?;
            let fresh = TableHandle::open(&path, reopen_options)?;
            log::debug!("transaction committed on {path:?}");
            Ok((fresh, value))
        }
        Ok(Err(err)) => {
            restore_and_discard(&path, &backup_path)?;
            log::warn!("transaction rolled back on {path:?}: {err}");
            Err(err)
        }
        Err(_panic) => {
            restore_and_discard(&path, &backup_path)?;
            log::warn!("transaction closure panicked on {path:?}, rolled back");
            Err(Error::InvalidTransactionReturn)
        }
    }
}

/// Same protocol as [`transaction_table`], but covers both the table and its bound memo file
/// (if any), backing up and restoring them together.
pub fn transaction_coordinator<R>(
    coordinator: MemoCoordinator,
    table_reopen_options: &TableOpenOptions,
    coordinator_reopen_options: &MemoCoordinatorOptions,
    closure: impl FnOnce(&mut MemoCoordinator) -> Result<R>,
) -> Result<(MemoCoordinator, R)> {
    let table_path = coordinator.table().path().to_path_buf();
    let memo_path = coordinator.memo_path().to_path_buf();
    let had_memo = coordinator.has_memo();
    coordinator.close()?;

    let table_backup = backup_path_for(&table_path);
    io::copy_file(&table_path, &table_backup)?;
    let memo_backup = backup_path_for(&memo_path);
    if had_memo {
        io::copy_file(&memo_path, &memo_backup)?;
    }
    log::debug!("transaction backed up {table_path:?} (memo bound: {had_memo})");

    let mut working =
        MemoCoordinator::open(&table_path, &TableOpenOptions::read_write(), coordinator_reopen_options)?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| closure(&mut working)));
    let _ = working.close();

    match outcome {
        Ok(Ok(value)) => {
            std::fs::remove_file(&table_backup)?;
            if had_memo {
                std::fs::remove_file(&memo_backup)?;
            }
            let fresh =
                MemoCoordinator::open(&table_path, table_reopen_options, coordinator_reopen_options)?;
            log::debug!("transaction committed on {table_path:?}");
            Ok((fresh, value))
        }
        Ok(Err(err)) => {
            restore_and_discard(&table_path, &table_backup)?;
            if had_memo {
                restore_and_discard(&memo_path, &memo_backup)?;
            } else {
                discard_created_memo(&memo_path)?;
            }
            log::warn!("transaction rolled back on {table_path:?}: {err}");
            Err(err)
        }
        Err(_panic) => {
            restore_and_discard(&table_path, &table_backup)?;
            if had_memo {
                restore_and_discard(&memo_path, &memo_backup)?;
            } else {
                discard_created_memo(&memo_path)?;
            }
            log::warn!("transaction closure panicked on {table_path:?}, rolled back");
            Err(Error::InvalidTransactionReturn)
        }
    }
}

fn restore_and_discard(original: &Path, backup: &Path) -> Result<()> {
    io::copy_file(backup, original)?;
    std::fs::remove_file(backup)?;
    Ok(())
}

/// Deletes a memo file the closure created from scratch (no backup exists for it since there
/// was nothing to back up), so a rolled-back transaction leaves no new `.dbt` behind.
fn discard_created_memo(memo_path: &Path) -> Result<()> {
    if memo_path.exists() {
        std::fs::remove_file(memo_path)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::field::{FieldValue, MemoInput};
    use crate::header::FieldDescriptor;
    use crate::table::TableCreateOptions;
    use rustc_hash::FxHashMap;
    use tempfile::tempdir;

    fn schema() -> Vec<FieldDescriptor> {
        vec![FieldDescriptor::new("NAME".to_string(), b'C', 20, 0)]
    }

    #[test]
    fn commit_keeps_changes_and_discards_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.dbf");
        let handle = TableHandle::create(&path, schema(), &TableCreateOptions::default()).unwrap();

        let (handle, count) = transaction_table(handle, &TableOpenOptions::read_write(), |h| {
            let mut values = FxHashMap::default();
            values.insert("NAME".to_string(), FieldValue::from("Alice"));
            h.append_record(&values)?;
            h.record_statistics().map(|s| s.total)
        })
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(handle.record_count(), 1);
        assert!(!backup_path_for(&path).exists());
    }

    #[test]
    fn failure_restores_original_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.dbf");
        let handle = TableHandle::create(&path, schema(), &TableCreateOptions::default()).unwrap();
        handle.close().unwrap();

        let before = std::fs::read(&path).unwrap();

        let reopened = TableHandle::open(&path, &TableOpenOptions::read_write()).unwrap();
        let err = transaction_table(reopened, &TableOpenOptions::read_write(), |h| {
            let mut values = FxHashMap::default();
            values.insert("NAME".to_string(), FieldValue::from("Bob"));
            h.append_record(&values)?;
            Err::<(), Error>(Error::InvalidTransactionReturn)
        })
        .unwrap_err();

        assert!(matches!(err, Error::InvalidTransactionReturn));
        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
        assert!(!backup_path_for(&path).exists());
    }

    #[test]
    fn panicking_closure_rolls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.dbf");
        let handle = TableHandle::create(&path, schema(), &TableCreateOptions::default()).unwrap();
        handle.close().unwrap();
        let before = std::fs::read(&path).unwrap();

        let reopened = TableHandle::open(&path, &TableOpenOptions::read_write()).unwrap();
        let err = transaction_table(reopened, &TableOpenOptions::read_write(), |_h| -> Result<()> {
            panic!("boom")
        })
        .unwrap_err();

        assert!(matches!(err, Error::InvalidTransactionReturn));
        assert_eq!(before, std::fs::read(&path).unwrap());
    }

    #[test]
    fn coordinator_failure_restores_both_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.dbf");
        let fields = vec![
            FieldDescriptor::new("NAME".to_string(), b'C', 20, 0),
            FieldDescriptor::new("NOTES".to_string(), b'M', 10, 0),
        ];
        let coordinator = MemoCoordinator::create(
            &path,
            fields,
            &TableCreateOptions::default().with_version(0x83),
            &MemoCoordinatorOptions::default(),
        )
        .unwrap();
        let memo_path = coordinator.memo_path().to_path_buf();
        coordinator.close().unwrap();

        let table_before = std::fs::read(&path).unwrap();
        let memo_before = std::fs::read(&memo_path).unwrap();

        let reopened =
            MemoCoordinator::open(&path, &TableOpenOptions::read_write(), &MemoCoordinatorOptions::default())
                .unwrap();
        let err = transaction_coordinator(
            reopened,
            &TableOpenOptions::read_write(),
            &MemoCoordinatorOptions::default(),
            |c| {
                let mut values = FxHashMap::default();
                values.insert("NAME".to_string(), FieldValue::from("U"));
                values.insert("NOTES".to_string(), FieldValue::Memo(MemoInput::Text("hello".to_string())));
                c.append_record_with_memo(&values)?;
                c.append_record_with_memo(&values)?;
                Err::<(), Error>(Error::InvalidTransactionReturn)
            },
        )
        .unwrap_err();

        assert!(matches!(err, Error::InvalidTransactionReturn));
        assert_eq!(table_before, std::fs::read(&path).unwrap());
        assert_eq!(memo_before, std::fs::read(&memo_path).unwrap());
    }

    #[test]
    fn coordinator_failure_removes_memo_file_created_during_the_transaction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.dbf");
        let fields = vec![
            FieldDescriptor::new("NAME".to_string(), b'C', 20, 0),
            FieldDescriptor::new("NOTES".to_string(), b'M', 10, 0),
        ];
        let handle =
            TableHandle::create(&path, fields, &TableCreateOptions::default().with_version(0x83)).unwrap();
        handle.close().unwrap();

        let memo_path = path.with_extension("dbt");
        assert!(!memo_path.exists());

        let reopened =
            MemoCoordinator::open(&path, &TableOpenOptions::read_write(), &MemoCoordinatorOptions::default())
                .unwrap();
        let err = transaction_coordinator(
            reopened,
            &TableOpenOptions::read_write(),
            &MemoCoordinatorOptions::default(),
            |c| {
                let mut values = FxHashMap::default();
                values.insert("NAME".to_string(), FieldValue::from("U"));
                values.insert("NOTES".to_string(), FieldValue::Memo(MemoInput::Text("hello".to_string())));
                c.append_record_with_memo(&values)?;
                assert!(memo_path.exists());
                Err::<(), Error>(Error::InvalidTransactionReturn)
            },
        )
        .unwrap_err();

        assert!(matches!(err, Error::InvalidTransactionReturn));
        assert!(!memo_path.exists());
    }
}
