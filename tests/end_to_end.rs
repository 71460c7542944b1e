// Copyright (c) 2024-present, xbase-core
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! End-to-end scenarios tying the record engine, memo store, index engine, transaction
//! manager, and conflict detection together over real files on disk.

use rustc_hash::FxHashMap;
use std::io::Write;
use tempfile::tempdir;
use xbase_core::field::{CalendarDate, MemoInput, Numeric};
use xbase_core::index::{self, IndexCacheOptions};
use xbase_core::table::{TableCreateOptions, TableHandle, TableOpenOptions};
use xbase_core::transaction::transaction_coordinator;
use xbase_core::{
    Error, FieldDescriptor, FieldValue, MemoCoordinator, MemoCoordinatorOptions,
};

fn basic_schema() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("NAME".to_string(), b'C', 20, 0),
        FieldDescriptor::new("AGE".to_string(), b'N', 3, 0),
        FieldDescriptor::new("ACTIVE".to_string(), b'L', 1, 0),
        FieldDescriptor::new("JOINED".to_string(), b'D', 8, 0),
    ]
}

fn age(value: i64) -> FieldValue {
    FieldValue::Numeric(Some(Numeric::from_i64(value)))
}

fn joined(year: i32, month: u8, day: u8) -> FieldValue {
    FieldValue::Date(Some(CalendarDate::new(year, month, day).expect("valid date")))
}

fn alice_values() -> FxHashMap<String, FieldValue> {
    let mut values = FxHashMap::default();
    values.insert("NAME".to_string(), FieldValue::from("Alice"));
    values.insert("AGE".to_string(), age(25));
    values.insert("ACTIVE".to_string(), FieldValue::from(true));
    values.insert("JOINED".to_string(), joined(2024, 1, 1));
    values
}

/// Scenario 1: create, append one record, read it back.
#[test]
fn scenario_append_and_read_single_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.dbf");

    let mut handle = TableHandle::create(&path, basic_schema(), &TableCreateOptions::default()).unwrap();
    let index = handle.append_record(&alice_values()).unwrap();
    assert_eq!(index, 0);

    let record = handle.read_record(0).unwrap();
    assert_eq!(record.get("NAME"), Some(&FieldValue::from("Alice")));
    assert_eq!(record.get("AGE"), Some(&age(25)));
    assert_eq!(record.get("ACTIVE"), Some(&FieldValue::from(true)));
    assert_eq!(record.get("JOINED"), Some(&joined(2024, 1, 1)));
}

/// Scenario 2: append three records, delete one, check counts, then pack.
#[test]
fn scenario_delete_counts_and_pack() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.dbf");

    let mut handle = TableHandle::create(&path, basic_schema(), &TableCreateOptions::default()).unwrap();
    for a in [25, 35, 45] {
        let mut values = alice_values();
        values.insert("AGE".to_string(), age(a));
        handle.append_record(&values).unwrap();
    }
    handle.mark_deleted(1).unwrap();

    assert_eq!(handle.count_active_records().unwrap(), 2);
    assert_eq!(handle.count_deleted_records().unwrap(), 1);

    let packed_path = dir.path().join("packed.dbf");
    let packed = handle.pack(&packed_path).unwrap();
    assert_eq!(packed.record_count(), 2);

    let ages: Vec<i64> = packed
        .stream_records()
        .unwrap()
        .map(|item| match item.unwrap().1.get("AGE") {
            Some(FieldValue::Numeric(Some(n))) => n.to_i64(),
            other => panic!("unexpected AGE value: {other:?}"),
        })
        .collect();
    assert_eq!(ages, vec![25, 45]);
}

/// Scenario 3: memo-capable table round trip, including an update, ending at `next_block = 2`.
#[test]
fn scenario_memo_round_trip_and_update() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.dbf");
    let fields = vec![
        FieldDescriptor::new("NAME".to_string(), b'C', 20, 0),
        FieldDescriptor::new("NOTES".to_string(), b'M', 10, 0),
    ];

    let mut coordinator = MemoCoordinator::create(
        &path,
        fields,
        &TableCreateOptions::default().with_version(0x83),
        &MemoCoordinatorOptions::default(),
    )
    .unwrap();

    let mut values = FxHashMap::default();
    values.insert("NAME".to_string(), FieldValue::from("U"));
    values.insert("NOTES".to_string(), FieldValue::Memo(MemoInput::Text("hello".to_string())));
    let index = coordinator.append_record_with_memo(&values).unwrap();

    let record = coordinator.read_record_with_memo(index).unwrap();
    assert_eq!(record.get("NOTES"), Some(&FieldValue::Memo(MemoInput::Text("hello".to_string()))));

    let mut update = FxHashMap::default();
    update.insert("NOTES".to_string(), FieldValue::Memo(MemoInput::Text("world".to_string())));
    coordinator.update_record_with_memo(index, &update).unwrap();

    let record = coordinator.read_record_with_memo(index).unwrap();
    assert_eq!(record.get("NOTES"), Some(&FieldValue::Memo(MemoInput::Text("world".to_string()))));

    let memo_path = coordinator.memo_path().to_path_buf();
    coordinator.close().unwrap();

    let memo =
        xbase_core::memo::open_memo_file(&memo_path, xbase_core::memo::MemoDialect::Iii, &xbase_core::memo::MemoOpenOptions::read_only())
            .unwrap();
    assert_eq!(memo.header().next_block, 2);
}

/// Scenario 4: a transaction that appends two records then fails leaves both files untouched.
#[test]
fn scenario_failed_transaction_restores_both_files_byte_for_byte() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.dbf");
    let fields = vec![
        FieldDescriptor::new("NAME".to_string(), b'C', 20, 0),
        FieldDescriptor::new("NOTES".to_string(), b'M', 10, 0),
    ];

    let coordinator = MemoCoordinator::create(
        &path,
        fields,
        &TableCreateOptions::default().with_version(0x83),
        &MemoCoordinatorOptions::default(),
    )
    .unwrap();
    let memo_path = coordinator.memo_path().to_path_buf();
    coordinator.close().unwrap();

    let table_before = std::fs::read(&path).unwrap();
    let memo_before = std::fs::read(&memo_path).unwrap();

    let reopened =
        MemoCoordinator::open(&path, &TableOpenOptions::read_write(), &MemoCoordinatorOptions::default()).unwrap();
    let err = transaction_coordinator(
        reopened,
        &TableOpenOptions::read_write(),
        &MemoCoordinatorOptions::default(),
        |coordinator| {
            let mut values = FxHashMap::default();
            values.insert("NAME".to_string(), FieldValue::from("A"));
            values.insert("NOTES".to_string(), FieldValue::Memo(MemoInput::Text("first".to_string())));
            coordinator.append_record_with_memo(&values)?;
            values.insert("NAME".to_string(), FieldValue::from("B"));
            values.insert("NOTES".to_string(), FieldValue::Memo(MemoInput::Text("second".to_string())));
            coordinator.append_record_with_memo(&values)?;
            Err::<(), Error>(Error::InvalidTransactionReturn)
        },
    )
    .unwrap_err();

    assert!(matches!(err, Error::InvalidTransactionReturn));
    assert_eq!(table_before, std::fs::read(&path).unwrap());
    assert_eq!(memo_before, std::fs::read(&memo_path).unwrap());
}

/// Scenario 5: exact-match search on a `key_length = 10` index never returns a different
/// key's record number.
#[test]
fn scenario_index_exact_match_never_returns_wrong_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("names.ndx");

    let header = index::IndexHeader {
        root_page: 1,
        free_list: -1,
        key_length: 10,
        sort_order: 0,
        key_expression: "LASTNAME".to_string(),
        for_expression: None,
    };

    let mut page = [0u8; index::INDEX_PAGE_SIZE];
    {
        use byteorder::{LittleEndian, WriteBytesExt};
        let mut cursor = &mut page[..];
        cursor.write_u16::<LittleEndian>(0x03).unwrap();
        cursor.write_u16::<LittleEndian>(2).unwrap();
        cursor.write_i32::<LittleEndian>(-1).unwrap();
        cursor.write_all(&[0u8; 16]).unwrap();
    }
    let slot_size = 10 + 4;
    let mut pos = 20usize;
    for (key, pointer) in [(b"JONES     ".as_slice(), 4u32), (b"SMITH     ".as_slice(), 7u32)] {
        page[pos..pos + key.len()].copy_from_slice(key);
        use byteorder::{LittleEndian, WriteBytesExt};
        let mut pointer_slot = &mut page[pos + 10..pos + slot_size];
        pointer_slot.write_u32::<LittleEndian>(pointer).unwrap();
        pos += slot_size;
    }

    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&index::emit_index_header(&header).unwrap()).unwrap();
    file.write_all(&page).unwrap();
    drop(file);

    let handle = index::open_index(&path, &IndexCacheOptions::default()).unwrap();
    assert_eq!(handle.search_key(b"SMITH     ").unwrap(), Some(7));
    assert_eq!(handle.search_key(b"JONES     ").unwrap(), Some(4));
    assert_eq!(handle.search_key(b"NOBODY    ").unwrap(), None);
}

/// Scenario 6: out-of-range numeric and integer values are rejected, not silently truncated.
#[test]
fn scenario_oversized_values_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("limits.dbf");
    let fields = vec![
        FieldDescriptor::new("QTY".to_string(), b'N', 3, 0),
        FieldDescriptor::new("SERIAL".to_string(), b'I', 4, 0),
    ];
    let mut handle = TableHandle::create(&path, fields, &TableCreateOptions::default()).unwrap();

    let mut qty_overflow = FxHashMap::default();
    qty_overflow.insert("QTY".to_string(), age(1000));
    let err = handle.append_record(&qty_overflow).unwrap_err();
    assert!(matches!(err, Error::FieldTooLarge { length: 3, .. }));

    let mut serial_overflow = FxHashMap::default();
    serial_overflow.insert("SERIAL".to_string(), FieldValue::Integer(Some(3_000_000_000)));
    let err = handle.append_record(&serial_overflow).unwrap_err();
    assert!(matches!(err, Error::IntegerOutOfRange { value: 3_000_000_000, .. }));
}
