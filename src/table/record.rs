// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The in-memory `Record` representation.

use crate::field::FieldValue;
use rustc_hash::FxHashMap;

/// Deletion flag byte meaning "live".
pub const DELETION_FLAG_LIVE: u8 = 0x20;
/// Deletion flag byte meaning "tombstoned".
pub const DELETION_FLAG_DELETED: u8 = 0x2A;

/// One decoded table record.
///
/// `data` maps each field's name to its decoded value, in no particular order. `raw` is the
/// original `record_bytes` this record was parsed from (deletion flag included), kept around
/// so operations like `pack` can copy live records byte-for-byte without a decode/re-encode
/// round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    data: FxHashMap<String, FieldValue>,
    deleted: bool,
    raw: Vec<u8>,
}

impl Record {
    pub(crate) fn new(data: FxHashMap<String, FieldValue>, deleted: bool, raw: Vec<u8>) -> Self {
        Self { data, deleted, raw }
    }

    /// Looks up a field's decoded value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.data.get(name)
    }

    /// Whether this record is tombstoned (deletion flag `0x2A`).
    ///
    /// A deletion flag byte other than `0x20` (live) or `0x2A` (deleted) is treated as live,
    /// defensively.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Iterates over all `(field name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The original on-disk bytes for this record (deletion flag byte followed by encoded
    /// field bytes).
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Classifies a deletion flag byte, treating anything but the tombstone byte as live.
#[must_use]
pub fn is_tombstone(flag: u8) -> bool {
    flag == DELETION_FLAG_DELETED
}
