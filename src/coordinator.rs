// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Memo Coordinator: binds one table handle to at most one memo file, translating
//! between memo content and memo references on the record engine's read and write paths.

use crate::error::{Error, Result};
use crate::field::{FieldValue, MemoInput, MemoReference};
use crate::header::Dialect;
use crate::memo::{self, MemoDialect, MemoFile, MemoOpenOptions};
use crate::table::record::Record;
use crate::table::{TableCreateOptions, TableHandle, TableOpenOptions};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// How a coordinator should treat the memo file associated with a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoMode {
    /// Open an existing memo file if present; create one on first write in read-write mode;
    /// otherwise the table is treated as having no memo file.
    Auto,
    /// Fail to open/create the table if a memo file is not available.
    Required,
    /// Never touch the memo file; `M`-typed fields are neither resolved nor written.
    Disabled,
}

/// Options controlling how a `MemoCoordinator` locates and creates its memo file.
#[derive(Debug, Clone)]
pub struct MemoCoordinatorOptions {
    mode: MemoMode,
    explicit_memo_path: Option<PathBuf>,
    block_size: u16,
}

impl MemoCoordinatorOptions {
    /// Sets the memo mode. Default `Auto`.
    #[must_use]
    pub fn with_mode(mut self, mode: MemoMode) -> Self {
        self.mode = mode;
        self
    }

    /// Overrides auto-discovery with an explicit memo file path.
    #[must_use]
    pub fn with_memo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_memo_path = Some(path.into());
        self
    }

    /// Sets the `block_size` used when a memo file is created. Default `512`.
    #[must_use]
    pub fn with_block_size(mut self, block_size: u16) -> Self {
        self.block_size = block_size;
        self
    }
}

impl Default for MemoCoordinatorOptions {
    fn default() -> Self {
        Self { mode: MemoMode::Auto, explicit_memo_path: None, block_size: 512 }
    }
}

/// A record resolved through the memo coordinator: `M`-typed fields carry their memo content
/// as `FieldValue::Memo(MemoInput::Text(..))` rather than a raw block-number reference (unless
/// the coordinator is in `Disabled` mode, in which case fields pass through unresolved).
#[derive(Debug, Clone)]
pub struct CoordinatedRecord {
    data: FxHashMap<String, FieldValue>,
    deleted: bool,
}

impl CoordinatedRecord {
    /// Looks up a field's resolved value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.data.get(name)
    }

    /// Whether the underlying record is tombstoned.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Iterates over all `(field name, resolved value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Binds a table handle to at most one memo file handle.
#[derive(Debug)]
pub struct MemoCoordinator {
    table: TableHandle,
    memo: Option<MemoFile>,
    mode: MemoMode,
    memo_path: PathBuf,
    block_size: u16,
}

impl MemoCoordinator {
    /// Opens a table and, per `options.mode`, its associated memo file.
    pub fn open(
        table_path: impl AsRef<Path>,
        table_options: &TableOpenOptions,
        options: &MemoCoordinatorOptions,
    ) -> Result<Self> {
        let table = TableHandle::open(table_path.as_ref(), table_options)?;
        let memo_path = derive_memo_path(table_path.as_ref(), options);
        let memo_open_options = match table.mode() {
            crate::table::OpenMode::ReadOnly => MemoOpenOptions::read_only(),
            crate::table::OpenMode::ReadWrite => MemoOpenOptions::read_write(),
        };

        let memo = match options.mode {
            MemoMode::Disabled => None,
            MemoMode::Required => {
                if !memo_path.exists() {
                    return Err(Error::DbtFileRequired);
                }
                Some(memo::open_memo_file(&memo_path, memo_dialect_for(table.header().dialect()), &memo_open_options)?)
            }
            MemoMode::Auto => {
                if memo_path.exists() {
                    Some(memo::open_memo_file(&memo_path, memo_dialect_for(table.header().dialect()), &memo_open_options)?)
                } else {
                    None
                }
            }
        };

        Ok(Self { table, memo, mode: options.mode, memo_path, block_size: options.block_size })
    }

    /// Creates a table and, if its schema declares at least one `M` field, a memo file
    /// alongside it. Fails `dbf_no_memo_support` if the schema has `M` fields but
    /// `table_options`'s `version_flag` does not advertise memo capability.
    pub fn create(
        table_path: impl AsRef<Path>,
        fields: Vec<crate::header::FieldDescriptor>,
        table_options: &TableCreateOptions,
        options: &MemoCoordinatorOptions,
    ) -> Result<Self> {
        let needs_memo = fields.iter().any(|f| f.type_code == b'M');
        let table = TableHandle::create(table_path.as_ref(), fields, table_options)?;

        if needs_memo && !table.header().dialect().has_memo() {
            let created_path = table.path().to_path_buf();
            drop(table);
            let _ = std::fs::remove_file(&created_path);
            return Err(Error::DbfNoMemoSupport);
        }

        let memo_path = derive_memo_path(table_path.as_ref(), options);
        let memo = if needs_memo {
            Some(memo::create_memo_file(&memo_path, memo_dialect_for(table.header().dialect()), options.block_size)?)
        } else {
            None
        };

        Ok(Self { table, memo, mode: options.mode, memo_path, block_size: options.block_size })
    }

    /// The derived or explicit path of this coordinator's memo file.
    #[must_use]
    pub fn memo_path(&self) -> &Path {
        &self.memo_path
    }

    /// Read-only access to the bound table handle.
    #[must_use]
    pub fn table(&self) -> &TableHandle {
        &self.table
    }

    /// Whether a memo file is currently bound to this coordinator.
    #[must_use]
    pub fn has_memo(&self) -> bool {
        self.memo.is_some()
    }

    /// Reads record `index`, resolving any `M`-typed fields to their memo content.
    pub fn read_record_with_memo(&self, index: u32) -> Result<CoordinatedRecord> {
        let record = self.table.read_record(index)?;

        if self.mode == MemoMode::Disabled {
            let data = record.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
            return Ok(CoordinatedRecord { data, deleted: record.is_deleted() });
        }

        let mut data = FxHashMap::default();
        for (name, value) in record.iter() {
            let resolved = match value {
                FieldValue::Memo(MemoInput::Reference(r)) if r.block_number > 0 => {
                    let memo = self.memo.as_ref().ok_or(Error::MemoContentWithoutDbt)?;
                    let content = memo.read_memo(r.block_number)?;
                    FieldValue::Memo(MemoInput::Text(String::from_utf8_lossy(&content).into_owned()))
                }
                FieldValue::Memo(_) => FieldValue::Memo(MemoInput::Text(String::new())),
                other => other.clone(),
            };
            data.insert(name.to_string(), resolved);
        }

        Ok(CoordinatedRecord { data, deleted: record.is_deleted() })
    }

    /// Appends a record, allocating a memo block for each `M`-typed field supplied as text.
    pub fn append_record_with_memo(&mut self, values: &FxHashMap<String, FieldValue>) -> Result<u32> {
        let resolved = self.resolve_write_values(values, None)?;
        self.table.append_record(&resolved)
    }

    /// Updates record `index`, allocating or reusing a memo block for each `M`-typed field
    /// supplied as text.
    pub fn update_record_with_memo(&mut self, index: u32, partial: &FxHashMap<String, FieldValue>) -> Result<()> {
        let existing = self.table.read_record(index)?;
        let resolved = self.resolve_write_values(partial, Some(&existing))?;
        self.table.update_record(index, &resolved)
    }

    fn resolve_write_values(
        &mut self,
        values: &FxHashMap<String, FieldValue>,
        existing: Option<&Record>,
    ) -> Result<FxHashMap<String, FieldValue>> {
        let mut resolved = values.clone();

        for field in self.table.schema().to_vec() {
            if field.type_code != b'M' {
                continue;
            }
            let Some(value) = values.get(&field.name) else { continue };

            if self.mode == MemoMode::Disabled {
                resolved.insert(field.name.clone(), FieldValue::Memo(MemoInput::None));
                continue;
            }

            let FieldValue::Memo(memo_input) = value else {
                return Err(Error::InvalidMemoValue { field: field.name.clone() });
            };

            let new_value = match memo_input {
                MemoInput::None | MemoInput::Reference(_) => continue,
                MemoInput::Text(text) => {
                    let block_number = self.allocate_memo_block(field.name.as_str(), text.as_bytes(), existing)?;
                    FieldValue::Memo(MemoInput::Reference(MemoReference { block_number }))
                }
            };
            resolved.insert(field.name.clone(), new_value);
        }

        Ok(resolved)
    }

    fn allocate_memo_block(&mut self, field_name: &str, content: &[u8], existing: Option<&Record>) -> Result<u32> {
        self.ensure_memo_file()?;
        let memo = self.memo.as_mut().ok_or(Error::MemoContentWithoutDbt)?;

        let existing_block = existing.and_then(|record| match record.get(field_name) {
            Some(FieldValue::Memo(MemoInput::Reference(r))) if r.block_number > 0 => Some(r.block_number),
            _ => None,
        });

        if let Some(block_number) = existing_block {
            if memo.update_memo(block_number, content).is_ok() {
                return Ok(block_number);
            }
        }

        memo.write_memo(content)
    }

    fn ensure_memo_file(&mut self) -> Result<()> {
        if self.memo.is_some() {
            return Ok(());
        }
        if self.mode == MemoMode::Required {
            return Err(Error::DbtFileRequired);
        }
        let dialect = memo_dialect_for(self.table.header().dialect());
        self.memo = Some(memo::create_memo_file(&self.memo_path, dialect, self.block_size)?);
        Ok(())
    }

    /// Closes the table and, if bound, the memo file.
    pub fn close(self) -> Result<()> {
        self.table.close()?;
        if let Some(memo) = self.memo {
            memo.close()?;
        }
        Ok(())
    }
}

fn derive_memo_path(table_path: &Path, options: &MemoCoordinatorOptions) -> PathBuf {
    options.explicit_memo_path.clone().unwrap_or_else(|| table_path.with_extension("dbt"))
}

fn memo_dialect_for(dialect: Dialect) -> MemoDialect {
    match dialect {
        Dialect::DBase4WithMemo | Dialect::FoxProWithMemo => MemoDialect::Iv,
        _ => MemoDialect::Iii,
    }
}
