// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Header & schema parser: the 32-byte table header, the field descriptor array, and
//! its terminator.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Size in bytes of the fixed table header.
pub const HEADER_SIZE: usize = 32;
/// Size in bytes of one field descriptor.
pub const FIELD_DESCRIPTOR_SIZE: usize = 32;
/// The byte that terminates the field descriptor array.
pub const FIELD_TERMINATOR: u8 = 0x0D;
/// The table file's trailing end-of-file sentinel.
pub const TABLE_EOF_SENTINEL: u8 = 0x1A;

/// `version_flag` bytes this crate accepts.
const ACCEPTED_VERSIONS: &[u8] = &[
    0x02, 0x03, 0x04, 0x05, 0x07, 0x30, 0x31, 0x83, 0x8B, 0x8E, 0xF5,
];
/// `version_flag` bytes that advertise memo capability.
const MEMO_CAPABLE_VERSIONS: &[u8] = &[0x83, 0x8B, 0xF5];

/// The dialect and memo-capability a `version_flag` byte identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `0x02` — FoxBASE.
    FoxBase,
    /// `0x03` — dBase III, no memo.
    DBase3,
    /// `0x83` — dBase III with memo.
    DBase3WithMemo,
    /// `0x04` — dBase IV, no memo.
    DBase4,
    /// `0x8B` — dBase IV with memo.
    DBase4WithMemo,
    /// `0x05` — dBase V.
    DBase5,
    /// `0x30` or `0x31` — Visual FoxPro variants.
    VisualFoxPro,
    /// `0xF5` — FoxPro with memo.
    FoxProWithMemo,
    /// An accepted but otherwise uninterpreted `version_flag` byte (e.g. `0x07`, `0x8E`).
    Other(u8),
}

impl Dialect {
    /// Classifies an accepted `version_flag` byte.
    #[must_use]
    fn from_byte(byte: u8) -> Self {
        match byte {
            0x02 => Self::FoxBase,
            0x03 => Self::DBase3,
            0x83 => Self::DBase3WithMemo,
            0x04 => Self::DBase4,
            0x8B => Self::DBase4WithMemo,
            0x05 => Self::DBase5,
            0x30 | 0x31 => Self::VisualFoxPro,
            0xF5 => Self::FoxProWithMemo,
            other => Self::Other(other),
        }
    }

    /// Whether this dialect's `version_flag` advertises memo capability.
    #[must_use]
    pub fn has_memo(self) -> bool {
        matches!(self, Self::DBase3WithMemo | Self::DBase4WithMemo | Self::FoxProWithMemo)
    }
}

/// A `(year, month, day)` date as stored in the header's `last_update` field.
///
/// `year` is stored on disk as a single byte, years-since-1900 (so this cannot represent
/// years before 1900 or after 2155).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderDate {
    /// Full year, e.g. `2024`.
    pub year: u16,
    /// Month, `1..=12`.
    pub month: u8,
    /// Day of month, `1..=31`.
    pub day: u8,
}

/// The fixed 32-byte table header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    /// Dialect/memo-capability byte.
    pub version_flag: u8,
    /// Date of last update.
    pub last_update: HeaderDate,
    /// Count of records (live + tombstoned).
    pub record_count: u32,
    /// Total header region length (descriptors + terminator).
    pub header_bytes: u16,
    /// Per-record length, including the leading deletion flag.
    pub record_bytes: u16,
    /// Opaque, preserved round-trip.
    pub transaction_flag: u8,
    /// Opaque, preserved round-trip.
    pub encryption_flag: u8,
    /// Opaque, preserved round-trip.
    pub mdx_flag: u8,
    /// Opaque, preserved round-trip; not interpreted for codepage semantics.
    pub language_driver: u8,
    reserved_a: [u8; 2],
    reserved_b: [u8; 12],
    reserved_c: [u8; 2],
}

impl TableHeader {
    /// Returns the dialect this header's `version_flag` identifies.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        Dialect::from_byte(self.version_flag)
    }

    /// Builds a fresh header for `create_table`, with every opaque/reserved byte zeroed.
    #[must_use]
    pub fn new(
        version_flag: u8,
        last_update: HeaderDate,
        record_count: u32,
        header_bytes: u16,
        record_bytes: u16,
    ) -> Self {
        Self {
            version_flag,
            last_update,
            record_count,
            header_bytes,
            record_bytes,
            transaction_flag: 0,
            encryption_flag: 0,
            mdx_flag: 0,
            language_driver: 0,
            reserved_a: [0; 2],
            reserved_b: [0; 12],
            reserved_c: [0; 2],
        }
    }

    /// Returns a copy of this header with `record_count` and `last_update` replaced,
    /// preserving every opaque byte. Used by `pack` to build the packed table's header.
    #[must_use]
    pub fn with_record_count(&self, record_count: u32, last_update: HeaderDate) -> Self {
        Self { record_count, last_update, ..self.clone() }
    }
}

/// One 32-byte field descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Trimmed field name (non-empty, at most 10 bytes once cleaned).
    pub name: String,
    /// One character from `{C, N, D, L, M, I, T}`, or another byte for forward compatibility.
    pub type_code: u8,
    /// Field length in bytes, `1..=255`.
    pub length: u8,
    /// Fractional digit count; meaningful only for `N`.
    pub decimal_count: u8,
    /// Opaque, preserved round-trip.
    pub work_area_id: u8,
    /// Opaque, preserved round-trip.
    pub set_fields_flag: u8,
    /// Opaque, preserved round-trip.
    pub index_field_flag: u8,
    reserved: [u8; 15],
}

impl FieldDescriptor {
    /// Builds a field descriptor with all opaque bytes zeroed, for programmatic schema
    /// construction (e.g. `create_table`).
    #[must_use]
    pub fn new(name: String, type_code: u8, length: u8, decimal_count: u8) -> Self {
        Self {
            name,
            type_code,
            length,
            decimal_count,
            work_area_id: 0,
            set_fields_flag: 0,
            index_field_flag: 0,
            reserved: [0u8; 15],
        }
    }
}

/// Parses the 32-byte table header. Rejects a wrong-length input or an unknown
/// `version_flag`.
pub fn parse_header(bytes: &[u8]) -> Result<TableHeader> {
    if bytes.len() != HEADER_SIZE {
        return Err(Error::InvalidHeaderSize(bytes.len()));
    }

    let mut cursor = bytes;
    let version_flag = cursor.read_u8()?;
    if !ACCEPTED_VERSIONS.contains(&version_flag) {
        return Err(Error::InvalidVersion(version_flag));
    }

    let year_offset = cursor.read_u8()?;
    let month = cursor.read_u8()?;
    let day = cursor.read_u8()?;
    let last_update = HeaderDate { year: 1900 + u16::from(year_offset), month, day };

    let record_count = cursor.read_u32::<LittleEndian>()?;
    let header_bytes = cursor.read_u16::<LittleEndian>()?;
    let record_bytes = cursor.read_u16::<LittleEndian>()?;

    let mut reserved_a = [0u8; 2];
    cursor.read_exact(&mut reserved_a)?;

    let transaction_flag = cursor.read_u8()?;
    let encryption_flag = cursor.read_u8()?;

    let mut reserved_b = [0u8; 12];
    cursor.read_exact(&mut reserved_b)?;

    let mdx_flag = cursor.read_u8()?;
    let language_driver = cursor.read_u8()?;

    let mut reserved_c = [0u8; 2];
    cursor.read_exact(&mut reserved_c)?;

    Ok(TableHeader {
        version_flag,
        last_update,
        record_count,
        header_bytes,
        record_bytes,
        transaction_flag,
        encryption_flag,
        mdx_flag,
        language_driver,
        reserved_a,
        reserved_b,
        reserved_c,
    })
}

/// Emits a `TableHeader` back to its 32-byte on-disk form.
pub fn emit_header(header: &TableHeader) -> Result<[u8; HEADER_SIZE]> {
    let mut out = Vec::with_capacity(HEADER_SIZE);

    out.write_u8(header.version_flag)?;
    #[allow(clippy::cast_possible_truncation)]
    out.write_u8((header.last_update.year.saturating_sub(1900)) as u8)?;
    out.write_u8(header.last_update.month)?;
    out.write_u8(header.last_update.day)?;
    out.write_u32::<LittleEndian>(header.record_count)?;
    out.write_u16::<LittleEndian>(header.header_bytes)?;
    out.write_u16::<LittleEndian>(header.record_bytes)?;
    out.write_all(&header.reserved_a)?;
    out.write_u8(header.transaction_flag)?;
    out.write_u8(header.encryption_flag)?;
    out.write_all(&header.reserved_b)?;
    out.write_u8(header.mdx_flag)?;
    out.write_u8(header.language_driver)?;
    out.write_all(&header.reserved_c)?;

    out.try_into().map_err(|_| Error::InvalidHeaderFormat("emitted header was not 32 bytes"))
}

/// Parses field descriptors starting at `offset` in `bytes`, until the terminator byte
/// `0x0D`. Fails with `missing_field_terminator` if the buffer is exhausted first.
pub fn parse_fields(bytes: &[u8], offset: usize) -> Result<Vec<FieldDescriptor>> {
    let mut fields = Vec::new();
    let mut pos = offset;

    loop {
        let Some(&marker) = bytes.get(pos) else {
            return Err(Error::MissingFieldTerminator);
        };
        if marker == FIELD_TERMINATOR {
            break;
        }

        let Some(chunk) = bytes.get(pos..pos + FIELD_DESCRIPTOR_SIZE) else {
            return Err(Error::MissingFieldTerminator);
        };

        fields.push(parse_one_field(chunk)?);
        pos += FIELD_DESCRIPTOR_SIZE;
    }

    Ok(fields)
}

fn parse_one_field(bytes: &[u8]) -> Result<FieldDescriptor> {
    if bytes.len() != FIELD_DESCRIPTOR_SIZE {
        return Err(Error::InvalidHeaderFormat("field descriptor must be 32 bytes"));
    }

    let raw_name = bytes.get(0..11).ok_or(Error::InvalidHeaderFormat("truncated field name"))?;
    let trimmed: Vec<u8> = raw_name.iter().copied().take_while(|&b| b != 0).collect();
    let name = String::from_utf8_lossy(&trimmed).trim().to_string();
    if name.is_empty() || name.len() > 10 {
        return Err(Error::InvalidFieldName(name));
    }

    let type_code = *bytes.get(11).ok_or(Error::InvalidHeaderFormat("truncated type_code"))?;

    let mut reserved_address = [0u8; 4];
    reserved_address.copy_from_slice(
        bytes.get(12..16).ok_or(Error::InvalidHeaderFormat("truncated descriptor"))?,
    );

    let length = *bytes.get(16).ok_or(Error::InvalidHeaderFormat("truncated length"))?;
    let decimal_count = *bytes.get(17).ok_or(Error::InvalidHeaderFormat("truncated decimal_count"))?;

    let mut reserved_mu_a = [0u8; 2];
    reserved_mu_a.copy_from_slice(
        bytes.get(18..20).ok_or(Error::InvalidHeaderFormat("truncated descriptor"))?,
    );

    let work_area_id = *bytes.get(20).ok_or(Error::InvalidHeaderFormat("truncated work_area_id"))?;

    let mut reserved_mu_b = [0u8; 2];
    reserved_mu_b.copy_from_slice(
        bytes.get(21..23).ok_or(Error::InvalidHeaderFormat("truncated descriptor"))?,
    );

    let set_fields_flag =
        *bytes.get(23).ok_or(Error::InvalidHeaderFormat("truncated set_fields_flag"))?;

    let mut reserved_tail = [0u8; 7];
    reserved_tail.copy_from_slice(
        bytes.get(24..31).ok_or(Error::InvalidHeaderFormat("truncated descriptor"))?,
    );

    let index_field_flag =
        *bytes.get(31).ok_or(Error::InvalidHeaderFormat("truncated index_field_flag"))?;

    let mut reserved = [0u8; 15];
    reserved[0..4].copy_from_slice(&reserved_address);
    reserved[4..6].copy_from_slice(&reserved_mu_a);
    reserved[6..8].copy_from_slice(&reserved_mu_b);
    reserved[8..15].copy_from_slice(&reserved_tail);

    Ok(FieldDescriptor {
        name,
        type_code,
        length,
        decimal_count,
        work_area_id,
        set_fields_flag,
        index_field_flag,
        reserved,
    })
}

/// Emits field descriptors back to their concatenated on-disk form (without the terminator
/// byte; callers append `FIELD_TERMINATOR` themselves).
pub fn emit_fields(fields: &[FieldDescriptor]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(fields.len() * FIELD_DESCRIPTOR_SIZE);
    for field in fields {
        out.extend_from_slice(&emit_one_field(field)?);
    }
    Ok(out)
}

fn emit_one_field(field: &FieldDescriptor) -> Result<[u8; FIELD_DESCRIPTOR_SIZE]> {
    if field.name.is_empty() || field.name.len() > 10 {
        return Err(Error::InvalidFieldName(field.name.clone()));
    }

    let mut out = [0u8; FIELD_DESCRIPTOR_SIZE];
    let name_bytes = field.name.as_bytes();
    #[allow(clippy::indexing_slicing)]
    out[..name_bytes.len()].copy_from_slice(name_bytes);
    out[11] = field.type_code;
    out[12..16].copy_from_slice(&field.reserved[0..4]);
    out[16] = field.length;
    out[17] = field.decimal_count;
    out[18..20].copy_from_slice(&field.reserved[4..6]);
    out[20] = field.work_area_id;
    out[21..23].copy_from_slice(&field.reserved[6..8]);
    out[23] = field.set_fields_flag;
    out[24..31].copy_from_slice(&field.reserved[8..15]);
    out[31] = field.index_field_flag;

    Ok(out)
}

/// Computes `header_bytes = 32 + 32*N + 1` for `fields.len() == N`.
#[must_use]
pub fn compute_header_bytes(fields: &[FieldDescriptor]) -> u16 {
    #[allow(clippy::cast_possible_truncation)]
    let n = fields.len() as u16;
    HEADER_SIZE as u16 + FIELD_DESCRIPTOR_SIZE as u16 * n + 1
}

/// Computes `record_bytes = 1 + sum(field.length)`.
#[must_use]
pub fn compute_record_bytes(fields: &[FieldDescriptor]) -> u16 {
    let sum: u32 = fields.iter().map(|f| u32::from(f.length)).sum();
    #[allow(clippy::cast_possible_truncation)]
    {
        1 + sum as u16
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_header() -> TableHeader {
        TableHeader {
            version_flag: 0x03,
            last_update: HeaderDate { year: 2024, month: 1, day: 2 },
            record_count: 3,
            header_bytes: 97,
            record_bytes: 34,
            transaction_flag: 0,
            encryption_flag: 0,
            mdx_flag: 0,
            language_driver: 0x57,
            reserved_a: [1, 2],
            reserved_b: [3; 12],
            reserved_c: [4, 5],
        }
    }

    #[test]
    fn header_round_trip_preserves_opaque_bytes() {
        let header = sample_header();
        let bytes = emit_header(&header).unwrap();
        let parsed = parse_header(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = parse_header(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::InvalidHeaderSize(10)));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = emit_header(&sample_header()).unwrap();
        bytes[0] = 0xFF;
        let err = parse_header(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidVersion(0xFF)));
    }

    #[test]
    fn memo_capable_versions() {
        assert!(Dialect::from_byte(0x83).has_memo());
        assert!(Dialect::from_byte(0x8B).has_memo());
        assert!(Dialect::from_byte(0xF5).has_memo());
        assert!(!Dialect::from_byte(0x03).has_memo());
    }

    #[test]
    fn field_round_trip() {
        let fields = vec![
            FieldDescriptor::new("NAME".to_string(), b'C', 20, 0),
            FieldDescriptor::new("AGE".to_string(), b'N', 3, 0),
        ];
        let mut bytes = emit_fields(&fields).unwrap();
        bytes.push(FIELD_TERMINATOR);
        let parsed = parse_fields(&bytes, 0).unwrap();
        assert_eq!(parsed, fields);
    }

    #[test]
    fn missing_terminator_errors() {
        let fields = vec![FieldDescriptor::new("NAME".to_string(), b'C', 20, 0)];
        let bytes = emit_fields(&fields).unwrap();
        let err = parse_fields(&bytes, 0).unwrap_err();
        assert!(matches!(err, Error::MissingFieldTerminator));
    }

    #[test]
    fn rejects_empty_field_name() {
        let field = FieldDescriptor::new(String::new(), b'C', 10, 0);
        let err = emit_one_field(&field).unwrap_err();
        assert!(matches!(err, Error::InvalidFieldName(_)));
    }

    #[test]
    fn header_bytes_and_record_bytes_invariants() {
        let fields = vec![
            FieldDescriptor::new("NAME".to_string(), b'C', 20, 0),
            FieldDescriptor::new("AGE".to_string(), b'N', 3, 0),
        ];
        assert_eq!(compute_header_bytes(&fields), 32 + 32 * 2 + 1);
        assert_eq!(compute_record_bytes(&fields), 1 + 23);
    }
}
