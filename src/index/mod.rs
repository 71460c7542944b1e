// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Index engine: the compound B-tree `.ndx`/`.mdx`-style index file.
//!
//! Exact-match search (`search_key`) is a faithful descent. Range search (`search_range`) is
//! a deliberate simplification: nodes carry only a `left_sibling` pointer,
//! not a right-sibling chain, so spanning multiple leaves means re-descending from the root for
//! each successive key rather than walking a linked list of leaves.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use quick_cache::sync::Cache;
use std::cmp::Ordering;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Size in bytes of the fixed index header and of every page.
pub const INDEX_PAGE_SIZE: usize = 512;
const NODE_HEADER_SIZE: usize = 20;
const KEY_EXPR_BUFFER: usize = 220;
const FOR_EXPR_BUFFER: usize = 220;
/// Default bound on the number of cached pages per handle.
const DEFAULT_CACHE_CAPACITY: usize = 128;
/// Hard cap on leaves visited by `search_range`'s re-descend loop, guarding against an
/// index whose keys never exceed `high_key` (or a malformed successor chain).
const MAX_RANGE_LEAVES: usize = 10_000;

/// The parsed 512-byte index header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    /// Page number of the root node.
    pub root_page: u32,
    /// Head of the free-page list, or a negative sentinel if empty.
    pub free_list: i32,
    /// Byte length of every key in this index, `1..=240`.
    pub key_length: u8,
    /// Opaque collation/order byte, preserved round-trip but not interpreted: all comparisons
    /// in this module are byte-wise.
    pub sort_order: u8,
    /// The key expression text (e.g. `"UPPER(LASTNAME)"`).
    pub key_expression: String,
    /// An optional filter expression restricting which records are indexed.
    pub for_expression: Option<String>,
}

/// The role a node plays, derived from its `attributes` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Pointers reference record numbers in the table.
    Leaf,
    /// The root page, not also a leaf. Pointers reference child pages.
    Root,
    /// Pointers reference child pages.
    Branch,
}

impl NodeRole {
    fn from_attributes(attributes: u16) -> Self {
        let is_root = attributes & 0x01 != 0;
        let is_leaf = attributes & 0x02 != 0;
        if is_leaf {
            Self::Leaf
        } else if is_root {
            Self::Root
        } else {
            Self::Branch
        }
    }
}

/// One `(key, pointer)` slot within a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The fixed-`key_length` key bytes, in their stored (untrimmed) form.
    pub key: Vec<u8>,
    /// A record number (leaf) or child page number (branch/root).
    pub pointer: u32,
}

/// One parsed 512-byte index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNode {
    attributes: u16,
    /// Page number of the left sibling, or a negative sentinel if there is none.
    pub left_sibling: i32,
    /// This node's `(key, pointer)` slots, ascending by key.
    pub entries: Vec<IndexEntry>,
}

impl IndexNode {
    /// This node's role, derived from its attribute bits.
    #[must_use]
    pub fn role(&self) -> NodeRole {
        NodeRole::from_attributes(self.attributes)
    }
}

/// Options bounding an index handle's page cache.
#[derive(Debug, Clone, Copy)]
pub struct IndexCacheOptions {
    capacity: usize,
}

impl IndexCacheOptions {
    /// Sets the maximum number of pages cached per handle.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl Default for IndexCacheOptions {
    fn default() -> Self {
        Self { capacity: DEFAULT_CACHE_CAPACITY }
    }
}

/// Owns an index file's file handle, parsed header, and a bounded, process-local page cache.
pub struct IndexHandle {
    file: File,
    header: IndexHeader,
    path: PathBuf,
    cache: Cache<u32, Arc<IndexNode>>,
}

impl IndexHandle {
    /// This handle's parsed header.
    #[must_use]
    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// The path this handle was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of keys in the root node, as a cheap size hint.
    pub fn key_count(&self) -> Result<u16> {
        #[allow(clippy::cast_possible_truncation)]
        let count = self.read_node(self.header.root_page)?.entries.len() as u16;
        Ok(count)
    }

    /// This index's root page number.
    #[must_use]
    pub fn root_page(&self) -> u32 {
        self.header.root_page
    }

    /// Reads and parses a page, consulting (and populating) the bounded cache.
    pub fn read_node(&self, page_number: u32) -> Result<Arc<IndexNode>> {
        if let Some(node) = self.cache.get(&page_number) {
            return Ok(node);
        }

        let offset = u64::from(page_number) * INDEX_PAGE_SIZE as u64;
        let raw = crate::io::read_exact_at(&self.file, offset, INDEX_PAGE_SIZE)?;
        let node = Arc::new(parse_node(&raw, self.header.key_length)?);
        self.cache.insert(page_number, Arc::clone(&node));
        Ok(node)
    }

    /// Exact-match search. Returns the record number for `key`, or `None` if absent.
    pub fn search_key(&self, key: &[u8]) -> Result<Option<u32>> {
        let leaf_page = self.descend_to_leaf(key)?;
        let node = self.read_node(leaf_page)?;
        let target = trim_trailing_zeros(key);
        for entry in &node.entries {
            if trim_trailing_zeros(&entry.key) == target {
                return Ok(Some(entry.pointer));
            }
        }
        Ok(None)
    }

    /// Best-effort range search: descends to the leaf containing `low_key`, then re-descends
    /// from the root for each key past the current leaf's maximum, until `high_key` is
    /// exceeded or no successor leaf is found.
    pub fn search_range(&self, low_key: &[u8], high_key: &[u8]) -> Result<Vec<(Vec<u8>, u32)>> {
        let key_length = usize::from(self.header.key_length);
        let high = pad_to(high_key, key_length);
        let mut cursor = pad_to(low_key, key_length);
        let mut results = Vec::new();

        for _ in 0..MAX_RANGE_LEAVES {
            if cursor.as_slice().cmp(high.as_slice()) == Ordering::Greater {
                break;
            }

            let leaf_page = self.descend_to_leaf(&cursor)?;
            let node = self.read_node(leaf_page)?;
            let mut max_in_leaf: Option<Vec<u8>> = None;

            for entry in &node.entries {
                if entry.key.as_slice().cmp(cursor.as_slice()) != Ordering::Less
                    && entry.key.as_slice().cmp(high.as_slice()) != Ordering::Greater
                {
                    results.push((trim_trailing_zeros(&entry.key).to_vec(), entry.pointer));
                }
                if max_in_leaf.as_deref().is_none_or(|m| entry.key.as_slice().cmp(m) == Ordering::Greater) {
                    max_in_leaf = Some(entry.key.clone());
                }
            }

            match max_in_leaf.as_deref().and_then(successor) {
                Some(next) if next.as_slice().cmp(cursor.as_slice()) == Ordering::Greater => cursor = next,
                _ => break,
            }
        }

        Ok(results)
    }

    fn descend_to_leaf(&self, key: &[u8]) -> Result<u32> {
        let mut page = self.header.root_page;
        loop {
            let node = self.read_node(page)?;
            if node.role() == NodeRole::Leaf {
                return Ok(page);
            }
            page = choose_child(&node, key)?;
        }
    }

    /// Closes the handle, releasing the file and the page cache.
    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

fn choose_child(node: &IndexNode, key: &[u8]) -> Result<u32> {
    let target = trim_trailing_zeros(key);
    for entry in &node.entries {
        if trim_trailing_zeros(&entry.key).cmp(target) != Ordering::Less {
            return Ok(entry.pointer);
        }
    }
    node.entries
        .last()
        .map(|e| e.pointer)
        .ok_or(Error::InvalidNodeFormat("branch node has no entries to descend through"))
}

fn trim_trailing_zeros(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

fn pad_to(bytes: &[u8], length: usize) -> Vec<u8> {
    let mut out = vec![0u8; length];
    let n = bytes.len().min(length);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// The lexicographically smallest fixed-length byte string greater than `key`, or `None` if
/// `key` is already the maximum representable value (all `0xFF`).
fn successor(key: &[u8]) -> Option<Vec<u8>> {
    let mut out = key.to_vec();
    for byte in out.iter_mut().rev() {
        if *byte == 0xFF {
            *byte = 0x00;
        } else {
            *byte += 1;
            return Some(out);
        }
    }
    None
}

/// Opens an index file: reads and parses the 512-byte header and initializes a bounded,
/// process-local page cache.
pub fn open_index(path: impl AsRef<Path>, options: &IndexCacheOptions) -> Result<IndexHandle> {
    let path = path.as_ref().to_path_buf();
    let file = OpenOptions::new().read(true).write(true).open(&path)?;

    let raw = crate::io::read_exact_at(&file, 0, INDEX_PAGE_SIZE)?;
    let header = parse_index_header(&raw)?;

    log::debug!(
        "opened index {path:?}: root_page {}, key_length {}, expr {:?}",
        header.root_page,
        header.key_length,
        header.key_expression
    );

    Ok(IndexHandle { file, header, path, cache: Cache::new(options.capacity) })
}

fn parse_index_header(bytes: &[u8]) -> Result<IndexHeader> {
    if bytes.len() != INDEX_PAGE_SIZE {
        return Err(Error::InvalidPageSize(bytes.len()));
    }

    let mut cursor = bytes;
    let root_page = cursor.read_u32::<LittleEndian>()?;
    let free_list = cursor.read_i32::<LittleEndian>()?;
    let key_length = cursor.read_u8()?;
    let sort_order = cursor.read_u8()?;
    let key_expr_len = cursor.read_u16::<LittleEndian>()? as usize;
    let for_expr_len = cursor.read_u16::<LittleEndian>()? as usize;

    let mut opaque = [0u8; 2];
    cursor.read_exact(&mut opaque)?;

    if !(1..=240).contains(&key_length) {
        return Err(Error::InvalidKeyLength(key_length));
    }
    if key_expr_len > KEY_EXPR_BUFFER || for_expr_len > FOR_EXPR_BUFFER {
        return Err(Error::InvalidNodeFormat("index header declares an oversized expression length"));
    }

    let key_expr_bytes =
        bytes.get(16..16 + KEY_EXPR_BUFFER).ok_or(Error::InvalidNodeFormat("truncated index header"))?;
    let key_expression = String::from_utf8_lossy(&key_expr_bytes[..key_expr_len]).into_owned();

    let for_start = 16 + KEY_EXPR_BUFFER;
    let for_expr_bytes = bytes
        .get(for_start..for_start + FOR_EXPR_BUFFER)
        .ok_or(Error::InvalidNodeFormat("truncated index header"))?;
    let for_expression = if for_expr_len == 0 {
        None
    } else {
        Some(String::from_utf8_lossy(&for_expr_bytes[..for_expr_len]).into_owned())
    };

    Ok(IndexHeader { root_page, free_list, key_length, sort_order, key_expression, for_expression })
}

/// Emits an `IndexHeader` back to its 512-byte on-disk form.
pub fn emit_index_header(header: &IndexHeader) -> Result<[u8; INDEX_PAGE_SIZE]> {
    if !(1..=240).contains(&header.key_length) {
        return Err(Error::InvalidKeyLength(header.key_length));
    }

    let key_expr_bytes = header.key_expression.as_bytes();
    let for_expr_bytes = header.for_expression.as_deref().unwrap_or("").as_bytes();
    if key_expr_bytes.len() > KEY_EXPR_BUFFER || for_expr_bytes.len() > FOR_EXPR_BUFFER {
        return Err(Error::InvalidNodeFormat("expression text exceeds the header's reserved space"));
    }

    let mut out = Vec::with_capacity(INDEX_PAGE_SIZE);
    out.write_u32::<LittleEndian>(header.root_page)?;
    out.write_i32::<LittleEndian>(header.free_list)?;
    out.write_u8(header.key_length)?;
    out.write_u8(header.sort_order)?;
    #[allow(clippy::cast_possible_truncation)]
    out.write_u16::<LittleEndian>(key_expr_bytes.len() as u16)?;
    #[allow(clippy::cast_possible_truncation)]
    out.write_u16::<LittleEndian>(for_expr_bytes.len() as u16)?;
    out.write_all(&[0u8; 2])?;

    let mut key_expr_field = vec![0u8; KEY_EXPR_BUFFER];
    key_expr_field[..key_expr_bytes.len()].copy_from_slice(key_expr_bytes);
    out.write_all(&key_expr_field)?;

    let mut for_expr_field = vec![0u8; FOR_EXPR_BUFFER];
    for_expr_field[..for_expr_bytes.len()].copy_from_slice(for_expr_bytes);
    out.write_all(&for_expr_field)?;

    let remaining = INDEX_PAGE_SIZE - out.len();
    out.write_all(&vec![0u8; remaining])?;

    out.try_into().map_err(|_| Error::InvalidNodeFormat("emitted index header was not 512 bytes"))
}

fn parse_node(bytes: &[u8], key_length: u8) -> Result<IndexNode> {
    if bytes.len() != INDEX_PAGE_SIZE {
        return Err(Error::InvalidPageSize(bytes.len()));
    }

    let mut cursor = bytes;
    let attributes = cursor.read_u16::<LittleEndian>()?;
    let key_count = cursor.read_u16::<LittleEndian>()?;
    let left_sibling = cursor.read_i32::<LittleEndian>()?;
    let mut reserved = [0u8; 16];
    cursor.read_exact(&mut reserved)?;

    let slot_size = usize::from(key_length) + 4;
    #[allow(clippy::arithmetic_side_effects)]
    let capacity = (INDEX_PAGE_SIZE - NODE_HEADER_SIZE) / slot_size;
    if usize::from(key_count) > capacity {
        return Err(Error::InvalidNodeFormat("key_count exceeds the node's slot capacity"));
    }

    let mut entries = Vec::with_capacity(usize::from(key_count));
    let mut pos = NODE_HEADER_SIZE;
    for _ in 0..key_count {
        let slot = bytes.get(pos..pos + slot_size).ok_or(Error::InvalidNodeFormat("truncated key/pointer slot"))?;
        let key = slot[..usize::from(key_length)].to_vec();
        let mut pointer_bytes = &slot[usize::from(key_length)..];
        let pointer = pointer_bytes.read_u32::<LittleEndian>()?;
        entries.push(IndexEntry { key, pointer });
        pos += slot_size;
    }

    Ok(IndexNode { attributes, left_sibling, entries })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_leaf_page(entries: &[(&[u8], u32)], key_length: u8, attributes: u16) -> [u8; INDEX_PAGE_SIZE] {
        let mut out = [0u8; INDEX_PAGE_SIZE];
        let mut cursor = &mut out[..];
        cursor.write_u16::<LittleEndian>(attributes).unwrap();
        #[allow(clippy::cast_possible_truncation)]
        cursor.write_u16::<LittleEndian>(entries.len() as u16).unwrap();
        cursor.write_i32::<LittleEndian>(-1).unwrap();
        cursor.write_all(&[0u8; 16]).unwrap();

        let mut pos = NODE_HEADER_SIZE;
        for (key, pointer) in entries {
            let slot = &mut out[pos..pos + usize::from(key_length) + 4];
            slot[..key.len()].copy_from_slice(key);
            let mut pointer_slot = &mut slot[usize::from(key_length)..];
            pointer_slot.write_u32::<LittleEndian>(*pointer).unwrap();
            pos += usize::from(key_length) + 4;
        }
        out
    }

    fn sample_header(key_length: u8) -> IndexHeader {
        IndexHeader {
            root_page: 1,
            free_list: -1,
            key_length,
            sort_order: 0,
            key_expression: "LASTNAME".to_string(),
            for_expression: None,
        }
    }

    #[test]
    fn header_round_trip() {
        let header = sample_header(10);
        let bytes = emit_index_header(&header).unwrap();
        let parsed = parse_index_header(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_invalid_key_length() {
        let mut header = sample_header(10);
        header.key_length = 0;
        let err = emit_index_header(&header).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyLength(0)));
    }

    #[test]
    fn node_role_from_attributes() {
        assert_eq!(NodeRole::from_attributes(0x03), NodeRole::Leaf);
        assert_eq!(NodeRole::from_attributes(0x01), NodeRole::Root);
        assert_eq!(NodeRole::from_attributes(0x02), NodeRole::Leaf);
        assert_eq!(NodeRole::from_attributes(0x00), NodeRole::Branch);
    }

    #[test]
    fn search_key_single_leaf_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("names.ndx");

        let header = sample_header(10);
        let page = write_leaf_page(
            &[(b"ALLEN     ", 3), (b"SMITH     ", 7), (b"ZIEGLER   ", 9)],
            10,
            0x03,
        );

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&emit_index_header(&header).unwrap()).unwrap();
        file.write_all(&page).unwrap();
        drop(file);

        let handle = open_index(&path, &IndexCacheOptions::default()).unwrap();
        assert_eq!(handle.search_key(b"SMITH     ").unwrap(), Some(7));
        assert_eq!(handle.search_key(b"NOBODY    ").unwrap(), None);
    }

    #[test]
    fn search_range_within_one_leaf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("names.ndx");

        let header = sample_header(10);
        let page = write_leaf_page(
            &[(b"ALLEN     ", 3), (b"SMITH     ", 7), (b"ZIEGLER   ", 9)],
            10,
            0x03,
        );

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&emit_index_header(&header).unwrap()).unwrap();
        file.write_all(&page).unwrap();
        drop(file);

        let handle = open_index(&path, &IndexCacheOptions::default()).unwrap();
        let results = handle.search_range(b"BAKER     ", b"SMITH     ").unwrap();
        assert_eq!(results, vec![(b"SMITH     ".to_vec(), 7)]);
    }

    #[test]
    fn successor_increments_last_byte() {
        assert_eq!(successor(b"AB"), Some(b"AC".to_vec()));
        assert_eq!(successor(&[0xFF, 0xFF]), None);
    }
}
