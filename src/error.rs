// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Error and result types shared across the whole crate.

use std::fmt;

/// Errors that can occur while parsing, reading, or writing a table, memo, or index file.
#[derive(Debug)]
pub enum Error {
    /// I/O error propagated from the host filesystem.
    Io(std::io::Error),

    /// The 32-byte table header has the wrong length.
    InvalidHeaderSize(usize),

    /// The table header could not be parsed (malformed, not a length problem).
    InvalidHeaderFormat(&'static str),

    /// The `version_flag` byte is not one of the accepted dialect bytes.
    InvalidVersion(u8),

    /// The field descriptor array was not terminated with `0x0D` before the buffer ran out.
    MissingFieldTerminator,

    /// A field descriptor's name is empty after trimming, or longer than 10 bytes.
    InvalidFieldName(String),

    /// `create_memo_file`/`open_memo_file` was given a `block_size` outside `512..=65536`.
    InvalidBlockSize(u16),

    /// An index page was not exactly 512 bytes.
    InvalidPageSize(usize),

    /// An index node's header bits or key/pointer layout could not be parsed.
    InvalidNodeFormat(&'static str),

    /// An index header declared a `key_length` outside `1..=240`.
    InvalidKeyLength(u8),

    /// A record index was out of range for the table's `record_count`.
    InvalidRecordIndex {
        /// The record index that was requested.
        index: u32,
        /// The table's current record count.
        record_count: u32,
    },

    /// A record range (start, end) was invalid for the table's `record_count`.
    InvalidRange {
        /// The inclusive start of the requested range.
        start: u32,
        /// The exclusive end of the requested range.
        end: u32,
    },

    /// A memo block number is out of range for the memo file's allocation cursor.
    InvalidBlockNumber(u32),

    /// `update_memo`/`delete_memo` was given a block number that was never allocated.
    BlockNotAllocated(u32),

    /// An index page number was out of range.
    InvalidPageNumber(u32),

    /// A numeric (`N`) field's bytes could not be parsed, with trailing garbage or malformed text.
    InvalidNumeric {
        /// The name of the offending field.
        field: String,
        /// The raw value that failed to parse.
        value: String,
    },

    /// A date (`D`) field's bytes did not form a valid calendar date.
    InvalidDate {
        /// The name of the offending field.
        field: String,
        /// The raw value that failed to parse.
        value: String,
    },

    /// A datetime (`T`) field's bytes were neither valid text nor a valid binary encoding.
    InvalidDatetime {
        /// The name of the offending field.
        field: String,
        /// The raw value that failed to parse.
        value: String,
    },

    /// A value of the wrong Rust type was supplied for a field's declared `type_code`.
    InvalidType {
        /// The name of the offending field.
        field: String,
        /// A description of the Rust type that was expected.
        expected: &'static str,
    },

    /// An encoded value does not fit within the field's declared `length`.
    FieldTooLarge {
        /// The name of the offending field.
        field: String,
        /// The field's declared length in bytes.
        length: u8,
    },

    /// An `I`-typed value does not fit in a signed 32-bit integer.
    IntegerOutOfRange {
        /// The name of the offending field.
        field: String,
        /// The out-of-range value that was supplied.
        value: i64,
    },

    /// A field descriptor declared a `type_code` byte this crate does not know how to decode.
    UnknownFieldType(u8),

    /// The table's `version_flag` does not advertise memo capability, but a memo operation was attempted.
    DbfNoMemoSupport,

    /// A memo-typed field held content to write, but no memo file is bound to the table.
    MemoContentWithoutDbt,

    /// A value supplied for an `M`-typed field was neither a string nor a `MemoReference`.
    InvalidMemoValue {
        /// The name of the offending field.
        field: String,
    },

    /// The memo coordinator was opened in `required` mode but no memo file could be found.
    DbtFileRequired,

    /// A `with_conflict_check` call observed a fingerprint mismatch against the on-disk state.
    WriteConflict,

    /// A transaction closure returned something other than a recognized success/failure shape.
    InvalidTransactionReturn,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidHeaderSize(n) => write!(f, "invalid header size: {n} bytes"),
            Self::InvalidHeaderFormat(reason) => write!(f, "invalid header format: {reason}"),
            Self::InvalidVersion(b) => write!(f, "unknown version_flag byte: {b:#04x}"),
            Self::MissingFieldTerminator => {
                write!(f, "field descriptor array is missing its 0x0D terminator")
            }
            Self::InvalidFieldName(name) => write!(f, "invalid field name: {name:?}"),
            Self::InvalidBlockSize(n) => write!(f, "invalid memo block_size: {n}"),
            Self::InvalidPageSize(n) => write!(f, "invalid index page size: {n} bytes"),
            Self::InvalidNodeFormat(reason) => write!(f, "invalid index node format: {reason}"),
            Self::InvalidKeyLength(n) => write!(f, "invalid index key_length: {n}"),
            Self::InvalidRecordIndex { index, record_count } => write!(
                f,
                "record index {index} out of range (record_count = {record_count})"
            ),
            Self::InvalidRange { start, end } => {
                write!(f, "invalid record range [{start}, {end})")
            }
            Self::InvalidBlockNumber(n) => write!(f, "invalid memo block number: {n}"),
            Self::BlockNotAllocated(n) => write!(f, "memo block {n} is not allocated"),
            Self::InvalidPageNumber(n) => write!(f, "invalid index page number: {n}"),
            Self::InvalidNumeric { field, value } => {
                write!(f, "field {field:?}: invalid numeric value {value:?}")
            }
            Self::InvalidDate { field, value } => {
                write!(f, "field {field:?}: invalid date value {value:?}")
            }
            Self::InvalidDatetime { field, value } => {
                write!(f, "field {field:?}: invalid datetime value {value:?}")
            }
            Self::InvalidType { field, expected } => {
                write!(f, "field {field:?}: expected a {expected} value")
            }
            Self::FieldTooLarge { field, length } => {
                write!(f, "field {field:?}: encoded value exceeds {length} bytes")
            }
            Self::IntegerOutOfRange { field, value } => write!(
                f,
                "field {field:?}: value {value} does not fit in a signed 32-bit integer"
            ),
            Self::UnknownFieldType(b) => write!(f, "unknown field type_code: {:?}", *b as char),
            Self::DbfNoMemoSupport => write!(
                f,
                "table version_flag does not advertise memo capability"
            ),
            Self::MemoContentWithoutDbt => {
                write!(f, "memo content supplied but no memo file is bound")
            }
            Self::InvalidMemoValue { field } => {
                write!(f, "field {field:?}: invalid value for a memo field")
            }
            Self::DbtFileRequired => write!(f, "memo mode is `required` but no .dbt file exists"),
            Self::WriteConflict => write!(f, "write conflict: on-disk state changed since open"),
            Self::InvalidTransactionReturn => {
                write!(f, "transaction closure returned an unrecognized result")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
