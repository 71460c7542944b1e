// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Positioned file I/O helpers.
//!
//! Every handle in this crate performs reads and writes with an explicit
//! offset (`pread`/`pwrite`) rather than relying on a shared seek cursor, so
//! operation ordering stays explicit even when multiple independent handles
//! point at the same file.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;

/// Reads exactly `size` bytes at `offset`, failing with an I/O error on a short read.
pub fn read_exact_at(file: &File, offset: u64, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    read_into_at(file, offset, &mut buf)?;
    Ok(buf)
}

/// Reads exactly `buf.len()` bytes at `offset` into `buf`.
#[cfg(unix)]
pub fn read_into_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<()> {
    file.read_exact_at(buf, offset).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("short read at offset {offset}, wanted {} bytes", buf.len()),
            ))
        } else {
            Error::Io(e)
        }
    })
}

#[cfg(windows)]
pub fn read_into_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<()> {
    let mut total = 0usize;
    while total < buf.len() {
        #[allow(clippy::indexing_slicing)]
        let n = file.seek_read(&mut buf[total..], offset + total as u64)?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("short read at offset {offset}"),
            )));
        }
        total += n;
    }
    Ok(())
}

/// Writes all of `data` at `offset`.
#[cfg(unix)]
pub fn write_all_at(file: &File, offset: u64, data: &[u8]) -> Result<()> {
    file.write_all_at(data, offset).map_err(Error::Io)
}

#[cfg(windows)]
pub fn write_all_at(file: &File, offset: u64, data: &[u8]) -> Result<()> {
    let mut total = 0usize;
    while total < data.len() {
        #[allow(clippy::indexing_slicing)]
        let n = file.seek_write(&data[total..], offset + total as u64)?;
        total += n;
    }
    Ok(())
}

/// Atomically replaces the contents of the file at `path` with `content`.
///
/// Writes to a temporary file in the same directory, flushes and syncs it,
/// then renames it into place, so a crash mid-write never leaves `path`
/// half-written.
pub fn rewrite_atomic(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    let folder = path.parent().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;

    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file_mut().sync_all()?;
    temp_file.persist(path).map_err(|e| Error::Io(e.error))?;

    Ok(())
}

/// Copies `src` to `dst`, used by the transaction manager to take a whole-file backup.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    std::fs::copy(src, dst)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use test_log::test;

    #[test]
    fn positioned_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positioned.bin");
        let file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();

        write_all_at(&file, 4, b"hello").unwrap();
        let read = read_exact_at(&file, 4, 5).unwrap();
        assert_eq!(read, b"hello");
    }

    #[test]
    fn rewrite_atomic_replaces_contents_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(b"old contents").unwrap();
        }

        rewrite_atomic(&path, b"new contents").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new contents");
    }

    #[test]
    fn copy_file_duplicates_bytes_at_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.dbf");
        let dst = dir.path().join("a.dbf.bak");
        std::fs::write(&src, b"table bytes").unwrap();

        copy_file(&src, &dst).unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), b"table bytes");
    }
}
