// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Table operations and record engine.
//!
//! Composes the header/schema parser and the field codec into the public table API:
//! open, create, close, and every record operation, including batch
//! variants and streaming statistics.

pub mod cursor;
pub mod record;

use crate::conflict::Fingerprint;
use crate::error::{Error, Result};
use crate::field::{self, FieldValue};
use crate::header::{
    self, compute_header_bytes, compute_record_bytes, FieldDescriptor, TableHeader,
    FIELD_TERMINATOR, HEADER_SIZE, TABLE_EOF_SENTINEL,
};
use crate::io;
use crate::time;
use cursor::RecordCursor;
use record::{is_tombstone, Record, DELETION_FLAG_DELETED, DELETION_FLAG_LIVE};
use rustc_hash::FxHashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Whether a table handle was opened for reading only, or for reading and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Mutating operations are rejected.
    ReadOnly,
    /// Mutating operations are permitted.
    ReadWrite,
}

/// Options for `open_table`.
#[derive(Debug, Clone, Copy)]
pub struct TableOpenOptions {
    mode: OpenMode,
}

impl TableOpenOptions {
    /// Opens the table read-only.
    #[must_use]
    pub fn read_only() -> Self {
        Self { mode: OpenMode::ReadOnly }
    }

    /// Opens the table for reading and writing.
    #[must_use]
    pub fn read_write() -> Self {
        Self { mode: OpenMode::ReadWrite }
    }
}

impl Default for TableOpenOptions {
    fn default() -> Self {
        Self::read_only()
    }
}

/// Options for `create_table`.
#[derive(Debug, Clone, Copy)]
pub struct TableCreateOptions {
    overwrite: bool,
    version_flag: u8,
}

impl TableCreateOptions {
    /// Whether an existing file at the target path may be overwritten. Default `false`.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// The `version_flag` byte to stamp into the new header. Default `0x03` (dBase III, no
    /// memo); `create_table_with_memo` overrides this to a memo-capable dialect.
    #[must_use]
    pub fn with_version(mut self, version_flag: u8) -> Self {
        self.version_flag = version_flag;
        self
    }
}

impl Default for TableCreateOptions {
    fn default() -> Self {
        Self { overwrite: false, version_flag: 0x03 }
    }
}

/// Summary statistics over a table's records, from a single streaming pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordStatistics {
    /// `record_count` (live + tombstoned).
    pub total: u32,
    /// Count of non-tombstoned records.
    pub active: u32,
    /// Count of tombstoned records.
    pub deleted: u32,
    /// `active / total`, or `0.0` if `total == 0`.
    pub percent_active: f64,
    /// `deleted / total`, or `0.0` if `total == 0`.
    pub percent_deleted: f64,
}

/// Owns a table file's file handle, parsed header, and parsed field list.
#[derive(Debug)]
pub struct TableHandle {
    file: File,
    header: TableHeader,
    fields: Arc<Vec<FieldDescriptor>>,
    path: PathBuf,
    mode: OpenMode,
}

impl TableHandle {
    /// Opens an existing table file.
    pub fn open(path: impl AsRef<Path>, options: &TableOpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(options.mode == OpenMode::ReadWrite)
            .open(&path)?;

        let (header, fields) = read_schema(&file)?;
        log::debug!(
            "opened table {path:?}: {} records, {} fields, version_flag {:#04x}",
            header.record_count,
            fields.len(),
            header.version_flag
        );

        Ok(Self { file, header, fields: Arc::new(fields), path, mode: options.mode })
    }

    /// Creates a new table file with the given schema.
    ///
    /// Validates that there is at least one field, every field name is non-empty and at most
    /// 10 bytes after cleaning, and (unless `options` sets `overwrite`) that `path` does not
    /// already exist.
    pub fn create(
        path: impl AsRef<Path>,
        fields: Vec<FieldDescriptor>,
        options: &TableCreateOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        validate_schema(&fields)?;

        let header_bytes = compute_header_bytes(&fields);
        let record_bytes = compute_record_bytes(&fields);

        let header =
            TableHeader::new(options.version_flag, time::today(), 0, header_bytes, record_bytes);

        let mut open_options = OpenOptions::new();
        open_options.read(true).write(true);
        if options.overwrite {
            open_options.create(true).truncate(true);
        } else {
            open_options.create_new(true);
        }
        let mut file = open_options.open(&path)?;

        write_schema(&mut file, &header, &fields)?;
        file.sync_all()?;

        log::debug!("created table {path:?} with {} fields", fields.len());

        Ok(Self { file, header, fields: Arc::new(fields), path, mode: OpenMode::ReadWrite })
    }

    /// Flushes and closes the handle.
    pub fn close(mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// The table's parsed header.
    #[must_use]
    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    /// The table's field schema, in descriptor order.
    #[must_use]
    pub fn schema(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field descriptor by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The path this handle was opened or created at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The open mode (`ReadOnly`/`ReadWrite`) this handle was opened with.
    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// `record_count` (live + tombstoned).
    #[must_use]
    pub fn record_count(&self) -> u32 {
        self.header.record_count
    }

    pub(crate) fn fingerprint(&self) -> Result<Fingerprint> {
        Ok(Fingerprint {
            record_count: self.header.record_count,
            last_update: self.header.last_update,
            file_len: self.file.metadata()?.len(),
        })
    }

    /// Re-reads the header from disk and resets any conflict-detection fingerprint derived
    /// from this handle (see [`crate::conflict::refresh_handle_state`]).
    pub fn refresh(&mut self) -> Result<()> {
        let (header, fields) = read_schema(&self.file)?;
        self.header = header;
        self.fields = Arc::new(fields);
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.mode == OpenMode::ReadWrite {
            Ok(())
        } else {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "table handle was opened read-only",
            )))
        }
    }

    fn offset_of(&self, index: u32) -> u64 {
        u64::from(self.header.header_bytes) + u64::from(index) * u64::from(self.header.record_bytes)
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index < self.header.record_count {
            Ok(())
        } else {
            Err(Error::InvalidRecordIndex { index, record_count: self.header.record_count })
        }
    }

    /// Reads record `index`.
    pub fn read_record(&self, index: u32) -> Result<Record> {
        self.check_index(index)?;
        read_record_at(&self.file, &self.fields, self.header.header_bytes, self.header.record_bytes, index)
    }

    /// Appends a new record, filling any field missing from `values` with its per-type
    /// default. Returns the new record's index.
    pub fn append_record(&mut self, values: &FxHashMap<String, FieldValue>) -> Result<u32> {
        self.ensure_writable()?;

        let raw = encode_record(&self.fields, values, false)?;
        let index = self.header.record_count;
        let offset = self.offset_of(index);
        io::write_all_at(&self.file, offset, &raw)?;

        self.header.record_count += 1;
        self.header.last_update = time::today();
        self.persist_header()?;

        Ok(index)
    }

    /// Merges `partial` over record `index`'s existing values and rewrites it in place,
    /// preserving its current deletion flag.
    pub fn update_record(&mut self, index: u32, partial: &FxHashMap<String, FieldValue>) -> Result<()> {
        self.ensure_writable()?;
        self.check_index(index)?;

        let existing = self.read_record(index)?;
        let mut merged: FxHashMap<String, FieldValue> =
            existing.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        for (k, v) in partial {
            merged.insert(k.clone(), v.clone());
        }

        let raw = encode_record(&self.fields, &merged, existing.is_deleted())?;
        let offset = self.offset_of(index);
        io::write_all_at(&self.file, offset, &raw)?;

        self.header.last_update = time::today();
        self.persist_header()?;
        Ok(())
    }

    /// Marks record `index` as tombstoned.
    pub fn mark_deleted(&mut self, index: u32) -> Result<()> {
        self.ensure_writable()?;
        self.set_deletion_flag(index, DELETION_FLAG_DELETED)
    }

    /// Clears record `index`'s tombstone flag.
    pub fn undelete_record(&mut self, index: u32) -> Result<()> {
        self.ensure_writable()?;
        self.set_deletion_flag(index, DELETION_FLAG_LIVE)
    }

    fn set_deletion_flag(&mut self, index: u32, flag: u8) -> Result<()> {
        self.check_index(index)?;
        let offset = self.offset_of(index);
        io::write_all_at(&self.file, offset, &[flag])?;
        self.header.last_update = time::today();
        self.persist_header()?;
        Ok(())
    }

    /// Validates every index, then marks each as tombstoned, refreshing the header once.
    pub fn batch_delete(&mut self, indices: &[u32]) -> Result<()> {
        self.ensure_writable()?;
        for &index in indices {
            self.check_index(index)?;
        }
        for &index in indices {
            let offset = self.offset_of(index);
            io::write_all_at(&self.file, offset, &[DELETION_FLAG_DELETED])?;
        }
        self.header.last_update = time::today();
        self.persist_header()?;
        Ok(())
    }

    /// Marks every record in `start..end` as tombstoned, refreshing the header once.
    pub fn batch_delete_range(&mut self, start: u32, end: u32) -> Result<()> {
        self.ensure_writable()?;
        if start > end || end > self.header.record_count {
            return Err(Error::InvalidRange { start, end });
        }
        let indices: Vec<u32> = (start..end).collect();
        self.batch_delete(&indices)
    }

    /// Marks every live record matching `predicate` as tombstoned, refreshing the header
    /// once. Returns the indices that were deleted.
    pub fn batch_delete_where(&mut self, predicate: impl Fn(&Record) -> bool) -> Result<Vec<u32>> {
        self.ensure_writable()?;

        let mut matched = Vec::new();
        for item in self.stream_records()? {
            let (index, record) = item?;
            if !record.is_deleted() && predicate(&record) {
                matched.push(index);
            }
        }

        if !matched.is_empty() {
            self.batch_delete(&matched)?;
        }
        Ok(matched)
    }

    /// A lazy, restartable iterator over every record in the table. Each call produces an
    /// independent cursor starting at record 0.
    pub fn stream_records(&self) -> Result<RecordCursor> {
        let file = self.file.try_clone()?;
        Ok(RecordCursor::new(
            file,
            Arc::clone(&self.fields),
            self.header.header_bytes,
            self.header.record_bytes,
            self.header.record_count,
        ))
    }

    /// Counts non-tombstoned records via a single streaming pass.
    pub fn count_active_records(&self) -> Result<u32> {
        let mut count = 0;
        for item in self.stream_records()? {
            let (_, record) = item?;
            if !record.is_deleted() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Counts tombstoned records via a single streaming pass.
    pub fn count_deleted_records(&self) -> Result<u32> {
        let mut count = 0;
        for item in self.stream_records()? {
            let (_, record) = item?;
            if record.is_deleted() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Computes `{total, active, deleted, percent_active, percent_deleted}` in one streaming
    /// pass, guarding against division by zero for an empty table.
    pub fn record_statistics(&self) -> Result<RecordStatistics> {
        let mut active = 0u32;
        let mut deleted = 0u32;
        for item in self.stream_records()? {
            let (_, record) = item?;
            if record.is_deleted() {
                deleted += 1;
            } else {
                active += 1;
            }
        }
        let total = self.header.record_count;
        let (percent_active, percent_deleted) = if total == 0 {
            (0.0, 0.0)
        } else {
            (f64::from(active) / f64::from(total), f64::from(deleted) / f64::from(total))
        };
        Ok(RecordStatistics { total, active, deleted, percent_active, percent_deleted })
    }

    /// Rewrites this table to `output_path`, omitting tombstoned records but preserving the
    /// relative order of the records that remain. Live records are copied byte-for-byte (no
    /// decode/re-encode round trip), so memo references inside them are preserved verbatim.
    pub fn pack(&self, output_path: impl AsRef<Path>) -> Result<Self> {
        let output_path = output_path.as_ref().to_path_buf();

        let mut live_records: Vec<Vec<u8>> = Vec::new();
        for item in self.stream_records()? {
            let (_, record) = item?;
            if !record.is_deleted() {
                live_records.push(record.raw().to_vec());
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        let new_header = self.header.with_record_count(live_records.len() as u32, time::today());

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&output_path)?;

        write_schema(&mut file, &new_header, &self.fields)?;
        for raw in &live_records {
            file.write_all(raw)?;
        }
        file.write_all(&[TABLE_EOF_SENTINEL])?;
        file.sync_all()?;

        log::debug!(
            "packed table {:?} -> {output_path:?}: {} -> {} records",
            self.path,
            self.header.record_count,
            new_header.record_count
        );

        Ok(Self {
            file,
            header: new_header,
            fields: Arc::clone(&self.fields),
            path: output_path,
            mode: OpenMode::ReadWrite,
        })
    }

    fn persist_header(&mut self) -> Result<()> {
        let bytes = header::emit_header(&self.header)?;
        io::write_all_at(&self.file, 0, &bytes)?;
        Ok(())
    }
}

fn validate_schema(fields: &[FieldDescriptor]) -> Result<()> {
    if fields.is_empty() {
        return Err(Error::InvalidHeaderFormat("a table must declare at least one field"));
    }
    for field in fields {
        if field.name.is_empty() || field.name.len() > 10 {
            return Err(Error::InvalidFieldName(field.name.clone()));
        }
    }
    Ok(())
}

fn read_schema(file: &File) -> Result<(TableHeader, Vec<FieldDescriptor>)> {
    let header_prefix = io::read_exact_at(file, 0, HEADER_SIZE)?;
    let header = header::parse_header(&header_prefix)?;

    let region = io::read_exact_at(file, 0, usize::from(header.header_bytes))?;
    let fields = header::parse_fields(&region, HEADER_SIZE)?;

    Ok((header, fields))
}

fn write_schema(file: &mut File, header: &TableHeader, fields: &[FieldDescriptor]) -> Result<()> {
    file.write_all(&header::emit_header(header)?)?;
    file.write_all(&header::emit_fields(fields)?)?;
    file.write_all(&[FIELD_TERMINATOR])?;
    file.write_all(&[TABLE_EOF_SENTINEL])?;
    Ok(())
}

pub(crate) fn read_record_at(
    file: &File,
    fields: &[FieldDescriptor],
    header_bytes: u16,
    record_bytes: u16,
    index: u32,
) -> Result<Record> {
    let offset = u64::from(header_bytes) + u64::from(index) * u64::from(record_bytes);
    let raw = io::read_exact_at(file, offset, usize::from(record_bytes))?;
    decode_record(fields, raw)
}

fn decode_record(fields: &[FieldDescriptor], raw: Vec<u8>) -> Result<Record> {
    let flag = *raw.first().ok_or(Error::InvalidHeaderFormat("empty record"))?;
    let deleted = is_tombstone(flag);

    let mut data = FxHashMap::default();
    let mut offset = 1usize;
    for field_descriptor in fields {
        let length = usize::from(field_descriptor.length);
        let chunk = raw
            .get(offset..offset + length)
            .ok_or(Error::InvalidHeaderFormat("record shorter than its declared record_bytes"))?;
        let value = field::decode(field_descriptor, chunk)?;
        data.insert(field_descriptor.name.clone(), value);
        offset += length;
    }

    Ok(Record::new(data, deleted, raw))
}

pub(crate) fn encode_record(
    fields: &[FieldDescriptor],
    values: &FxHashMap<String, FieldValue>,
    deleted: bool,
) -> Result<Vec<u8>> {
    let mut out = vec![if deleted { DELETION_FLAG_DELETED } else { DELETION_FLAG_LIVE }];
    for field_descriptor in fields {
        let value = values
            .get(&field_descriptor.name)
            .cloned()
            .unwrap_or_else(|| field::default_value(field_descriptor));
        out.extend_from_slice(&field::encode(field_descriptor, &value)?);
    }
    Ok(out)
}
