// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `xbase-core` reads, writes, and randomly accesses legacy dBase-family database files — table
//! (`.dbf`), memo (`.dbt`), and compound-index (`.ndx`/`.mdx`-style) files — as one coordinated
//! system.
//!
//! # Layout
//!
//! - [`header`] — the 32-byte table header and field descriptor array.
//! - [`field`] — per-type codec over the closed [`field::FieldValue`] sum type.
//! - [`table`] — [`table::TableHandle`]: open/create/close and every record operation.
//! - [`memo`] — [`memo::MemoFile`]: the block-addressed `.dbt` store.
//! - [`index`] — [`index::IndexHandle`]: the compound B-tree index file, with a bounded
//!   per-handle page cache.
//! - [`coordinator`] — [`coordinator::MemoCoordinator`]: binds a table to its memo file and
//!   resolves memo references transparently on read and write.
//! - [`transaction`] — whole-file backup/commit/restore around a user closure.
//! - [`conflict`] — optimistic concurrency checks between independent handles to one file.
//!
//! Every positioned read/write goes through [`io`]'s `pread`/`pwrite`-style helpers rather than
//! a shared seek cursor, so operation ordering stays explicit even across independent handles to
//! the same file. This crate does not install a logger; it emits [`log`] records at
//! coordination points for whichever logger the caller chooses.

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod field;
pub mod header;
pub mod index;
pub mod io;
pub mod memo;
pub mod table;
pub mod transaction;

mod time;

pub use {
    conflict::{refresh_handle_state, with_conflict_check, with_conflict_check_with_retry, Fingerprint},
    coordinator::{CoordinatedRecord, MemoCoordinator, MemoCoordinatorOptions, MemoMode},
    error::{Error, Result},
    field::{CalendarDate, DateTimeValue, FieldValue, MemoInput, MemoReference, Numeric},
    header::{Dialect, FieldDescriptor, HeaderDate, TableHeader},
    index::{IndexCacheOptions, IndexHandle},
    memo::{MemoDialect, MemoFile, MemoOpenOptions},
    table::{record::Record, OpenMode, TableCreateOptions, TableHandle, TableOpenOptions},
    transaction::{transaction_coordinator, transaction_table},
};
