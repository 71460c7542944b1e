// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `stream_records`: a lazy, restartable, finite sequence over a table's records.

use super::read_record_at;
use crate::error::Result;
use crate::header::FieldDescriptor;
use crate::table::record::Record;
use std::fs::File;
use std::sync::Arc;

/// A lazy iterator over a table's records, holding only a cloned file handle and a cursor
/// index. Each `next()` call performs exactly one `pread`; nothing is buffered beyond the
/// record currently being decoded.
///
/// Built via `TableHandle::stream_records`, which can be called repeatedly to produce
/// independent, restartable cursors, each beginning at record 0.
pub struct RecordCursor {
    file: File,
    fields: Arc<Vec<FieldDescriptor>>,
    header_bytes: u16,
    record_bytes: u16,
    record_count: u32,
    next_index: u32,
}

impl RecordCursor {
    pub(crate) fn new(
        file: File,
        fields: Arc<Vec<FieldDescriptor>>,
        header_bytes: u16,
        record_bytes: u16,
        record_count: u32,
    ) -> Self {
        Self { file, fields, header_bytes, record_bytes, record_count, next_index: 0 }
    }

    /// The index that will be returned by the next call to `next()`.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.next_index
    }
}

impl Iterator for RecordCursor {
    type Item = Result<(u32, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.record_count {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;

        let result =
            read_record_at(&self.file, &self.fields, self.header_bytes, self.record_bytes, index)
                .map(|record| (index, record));
        Some(result)
    }
}
