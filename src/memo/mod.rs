// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Memo Store: the block-addressed `.dbt` file backing `M`-typed fields.
//!
//! A memo file is a flat array of fixed-size blocks. Block 0 is the 512-byte header; block
//! `N` (`N >= 1`) occupies `[N * block_size, (N + 1) * block_size)`. This module only knows
//! about blocks and byte content — resolving an `M` field's integer reference to memo content
//! is [`crate::coordinator`]'s job.

use crate::error::{Error, Result};
use crate::io;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Size in bytes of the fixed memo file header.
pub const MEMO_HEADER_SIZE: usize = 512;
/// The two-byte sequence terminating a memo block's content.
const MEMO_TERMINATOR: [u8; 2] = [0x1A, 0x1A];
/// Smallest accepted `block_size`.
const MIN_BLOCK_SIZE: u16 = 512;

/// Which of the two on-disk memo header layouts to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoDialect {
    /// dBase III: `next_block`, 4 opaque bytes, 2 opaque bytes, `block_size`, 500 padding.
    Iii,
    /// dBase IV: `next_block`, `block_size`, 2 opaque bytes, 504 padding.
    Iv,
}

/// The parsed 512-byte memo file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoHeader {
    /// The next unallocated block number; also the current block count (excluding block 0).
    pub next_block: u32,
    /// Size in bytes of each block, including the header block. `512..=65536`.
    pub block_size: u16,
    /// The on-disk layout this header was read as / will be written as.
    pub dialect: MemoDialect,
}

/// Whether a memo handle was opened for reading only, or for reading and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoOpenMode {
    /// Mutating operations are rejected.
    ReadOnly,
    /// Mutating operations are permitted.
    ReadWrite,
}

/// Options for `open_memo_file`.
#[derive(Debug, Clone, Copy)]
pub struct MemoOpenOptions {
    mode: MemoOpenMode,
}

impl MemoOpenOptions {
    /// Opens the memo file read-only.
    #[must_use]
    pub fn read_only() -> Self {
        Self { mode: MemoOpenMode::ReadOnly }
    }

    /// Opens the memo file for reading and writing.
    #[must_use]
    pub fn read_write() -> Self {
        Self { mode: MemoOpenMode::ReadWrite }
    }
}

impl Default for MemoOpenOptions {
    fn default() -> Self {
        Self::read_write()
    }
}

/// Block-usage summary produced by `analyze_fragmentation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentationReport {
    /// Allocated blocks holding non-zero content.
    pub used_blocks: u32,
    /// Allocated blocks that are entirely zero bytes.
    pub free_blocks: u32,
    /// `used_blocks + free_blocks`.
    pub total_blocks: u32,
    /// `free_blocks / total_blocks`, or `0.0` if there are no allocated blocks.
    pub fragmentation_ratio: f64,
}

/// Owns a memo file's file handle, parsed header, and path.
#[derive(Debug)]
pub struct MemoFile {
    file: File,
    header: MemoHeader,
    path: PathBuf,
    mode: MemoOpenMode,
}

impl MemoFile {
    /// This handle's parsed header.
    #[must_use]
    pub fn header(&self) -> &MemoHeader {
        &self.header
    }

    /// The path this handle was opened or created at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.mode == MemoOpenMode::ReadWrite {
            Ok(())
        } else {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "memo handle was opened read-only",
            )))
        }
    }

    fn block_offset(&self, block_number: u32) -> u64 {
        u64::from(block_number) * u64::from(self.header.block_size)
    }

    fn persist_header(&mut self) -> Result<()> {
        let bytes = emit_memo_header(&self.header)?;
        io::write_all_at(&self.file, 0, &bytes)
    }

    /// Allocates `block_number = next_block`, writes `content` (terminated and zero-padded to
    /// `block_size`), then atomically increments and persists `next_block`. Returns the
    /// assigned block number.
    pub fn write_memo(&mut self, content: &[u8]) -> Result<u32> {
        self.ensure_writable()?;

        let block_number = self.header.next_block;
        let block = encode_block(content, self.header.block_size);
        io::write_all_at(&self.file, self.block_offset(block_number), &block)?;

        self.header.next_block += 1;
        self.persist_header()?;

        log::debug!("wrote memo block {block_number} ({} bytes of content)", content.len());
        Ok(block_number)
    }

    /// Overwrites an already-allocated block in place.
    pub fn update_memo(&mut self, block_number: u32, content: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.check_allocated(block_number)?;

        let block = encode_block(content, self.header.block_size);
        io::write_all_at(&self.file, self.block_offset(block_number), &block)?;
        Ok(())
    }

    /// Overwrites an allocated block with zero bytes.
    pub fn delete_memo(&mut self, block_number: u32) -> Result<()> {
        self.ensure_writable()?;
        self.check_allocated(block_number)?;

        let zeros = vec![0u8; usize::from(self.header.block_size)];
        io::write_all_at(&self.file, self.block_offset(block_number), &zeros)?;
        Ok(())
    }

    /// Reads a block's content, up to its `0x1A 0x1A` terminator (or, if absent, up to the
    /// last non-zero byte).
    pub fn read_memo(&self, block_number: u32) -> Result<Vec<u8>> {
        self.check_allocated(block_number)?;
        let raw =
            io::read_exact_at(&self.file, self.block_offset(block_number), usize::from(self.header.block_size))?;
        Ok(decode_block(&raw))
    }

    fn check_allocated(&self, block_number: u32) -> Result<()> {
        if block_number == 0 || block_number >= self.header.next_block {
            Err(Error::BlockNotAllocated(block_number))
        } else {
            Ok(())
        }
    }

    /// Classifies every allocated block as used (non-zero content) or free (all-zero), in one
    /// streaming pass.
    pub fn analyze_fragmentation(&self) -> Result<FragmentationReport> {
        let mut used = 0u32;
        let mut free = 0u32;
        for block_number in 1..self.header.next_block {
            let raw = io::read_exact_at(
                &self.file,
                self.block_offset(block_number),
                usize::from(self.header.block_size),
            )?;
            if raw.iter().all(|&b| b == 0) {
                free += 1;
            } else {
                used += 1;
            }
        }
        let total = used + free;
        let fragmentation_ratio =
            if total == 0 { 0.0 } else { f64::from(free) / f64::from(total) };
        Ok(FragmentationReport { used_blocks: used, free_blocks: free, total_blocks: total, fragmentation_ratio })
    }

    /// Creates a fresh memo file at `output_path` holding only used blocks, renumbered
    /// contiguously from 1. Copies one block at a time (constant memory regardless of file
    /// size).
    ///
    /// Block numbers change. The caller is responsible for remapping any `M`-field references
    /// in the associated table — this function does not have access to the table and cannot do
    /// so itself.
    pub fn compact_memo_file(&self, output_path: impl AsRef<Path>) -> Result<Self> {
        let output_path = output_path.as_ref().to_path_buf();
        let folder = output_path.parent().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no parent directory",
            ))
        })?;

        let temp_file = tempfile::NamedTempFile::new_in(folder)?;
        let mut target_block = 1u32;
        {
            let file = temp_file.as_file();
            for source_block in 1..self.header.next_block {
                let raw = io::read_exact_at(
                    &self.file,
                    self.block_offset(source_block),
                    usize::from(self.header.block_size),
                )?;
                if raw.iter().any(|&b| b != 0) {
                    let offset = u64::from(target_block) * u64::from(self.header.block_size);
                    io::write_all_at(file, offset, &raw)?;
                    target_block += 1;
                }
            }

            let new_header =
                MemoHeader { next_block: target_block, block_size: self.header.block_size, dialect: self.header.dialect };
            io::write_all_at(file, 0, &emit_memo_header(&new_header)?)?;
            file.sync_all()?;
        }

        log::warn!(
            "compacted memo file {:?} -> {output_path:?}: block numbers were reassigned, the caller must remap table references",
            self.path
        );

        let new_header =
            MemoHeader { next_block: target_block, block_size: self.header.block_size, dialect: self.header.dialect };
        let file = temp_file.persist(&output_path).map_err(|e| Error::Io(e.error))?;

        Ok(Self { file, header: new_header, path: output_path, mode: MemoOpenMode::ReadWrite })
    }

    /// Flushes and closes the handle.
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Creates a new memo file. Fails if `path` already exists.
pub fn create_memo_file(path: impl AsRef<Path>, dialect: MemoDialect, block_size: u16) -> Result<MemoFile> {
    if !(MIN_BLOCK_SIZE..=u16::MAX).contains(&block_size) {
        return Err(Error::InvalidBlockSize(block_size));
    }

    let path = path.as_ref().to_path_buf();
    let header = MemoHeader { next_block: 1, block_size, dialect };

    let mut file = OpenOptions::new().read(true).write(true).create_new(true).open(&path)?;
    file.write_all(&emit_memo_header(&header)?)?;
    file.sync_all()?;

    log::debug!("created memo file {path:?} with block_size {block_size}");

    Ok(MemoFile { file, header, path, mode: MemoOpenMode::ReadWrite })
}

/// Opens an existing memo file and validates its header.
pub fn open_memo_file(
    path: impl AsRef<Path>,
    dialect: MemoDialect,
    options: &MemoOpenOptions,
) -> Result<MemoFile> {
    let path = path.as_ref().to_path_buf();
    let file = OpenOptions::new()
        .read(true)
        .write(options.mode == MemoOpenMode::ReadWrite)
        .open(&path)?;

    let raw = io::read_exact_at(&file, 0, MEMO_HEADER_SIZE)?;
    let header = parse_memo_header(&raw, dialect)?;

    log::debug!("opened memo file {path:?}: next_block {}, block_size {}", header.next_block, header.block_size);

    Ok(MemoFile { file, header, path, mode: options.mode })
}

fn parse_memo_header(bytes: &[u8], dialect: MemoDialect) -> Result<MemoHeader> {
    if bytes.len() != MEMO_HEADER_SIZE {
        return Err(Error::InvalidHeaderSize(bytes.len()));
    }

    let mut cursor = bytes;
    let (next_block, block_size) = match dialect {
        MemoDialect::Iii => {
            let next_block = cursor.read_u32::<LittleEndian>()?;
            let mut opaque_a = [0u8; 4];
            cursor.read_exact(&mut opaque_a)?;
            let mut opaque_b = [0u8; 2];
            cursor.read_exact(&mut opaque_b)?;
            let block_size = cursor.read_u16::<LittleEndian>()?;
            (next_block, block_size)
        }
        MemoDialect::Iv => {
            let next_block = cursor.read_u32::<LittleEndian>()?;
            let block_size = cursor.read_u16::<LittleEndian>()?;
            (next_block, block_size)
        }
    };

    if !(MIN_BLOCK_SIZE..=u16::MAX).contains(&block_size) {
        return Err(Error::InvalidBlockSize(block_size));
    }

    Ok(MemoHeader { next_block, block_size, dialect })
}

fn emit_memo_header(header: &MemoHeader) -> Result<[u8; MEMO_HEADER_SIZE]> {
    let mut out = Vec::with_capacity(MEMO_HEADER_SIZE);
    match header.dialect {
        MemoDialect::Iii => {
            out.write_u32::<LittleEndian>(header.next_block)?;
            out.write_all(&[0u8; 4])?;
            out.write_all(&[0u8; 2])?;
            out.write_u16::<LittleEndian>(header.block_size)?;
            out.write_all(&[0u8; 500])?;
        }
        MemoDialect::Iv => {
            out.write_u32::<LittleEndian>(header.next_block)?;
            out.write_u16::<LittleEndian>(header.block_size)?;
            out.write_all(&[0u8; 2])?;
            out.write_all(&[0u8; 504])?;
        }
    }
    out.try_into().map_err(|_| Error::InvalidHeaderFormat("emitted memo header was not 512 bytes"))
}

fn encode_block(content: &[u8], block_size: u16) -> Vec<u8> {
    let block_size = usize::from(block_size);
    let max_content = block_size.saturating_sub(MEMO_TERMINATOR.len());
    let n = content.len().min(max_content);
    if n < content.len() {
        log::warn!("memo content truncated from {} to {n} bytes (block_size {block_size})", content.len());
    }

    let mut out = vec![0u8; block_size];
    out[..n].copy_from_slice(&content[..n]);
    out[n..n + MEMO_TERMINATOR.len()].copy_from_slice(&MEMO_TERMINATOR);
    out
}

fn decode_block(bytes: &[u8]) -> Vec<u8> {
    match bytes.windows(2).position(|w| w == MEMO_TERMINATOR) {
        Some(pos) => bytes[..pos].to_vec(),
        None => {
            let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            bytes[..end].to_vec()
        }
    }
}
