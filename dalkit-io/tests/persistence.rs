#![allow(clippy::float_cmp)]
use dalkit_core::Error as CoreError;
use dalkit_io::{
    Attributes, Buffer, Column, Dataset, DatasetOptions, ElementType, Error, IoMode, NodeKind,
    Schema, StorageKind,
};
use std::fs;
use tempfile::tempdir;

fn core(err: Error) -> CoreError {
    match err {
        Error::Core(e) => e,
        other => panic!("expected a taxonomy error, got {other:?}"),
    }
}

fn visibility_schema() -> Schema {
    Schema::from_columns([
        Column::new("TIME", ElementType::F64),
        Column::new("STATION", ElementType::Str),
        Column::array("DATA", ElementType::F32, 2),
    ])
    .unwrap()
}

#[test]
fn test_reopen_preserves_tree() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("observation.dal");
    {
        let dataset = Dataset::create(&path, StorageKind::Hierarchical).unwrap();
        dataset.set_attribute_str("OBSERVER", "Rosa").unwrap();
        let beam = dataset.create_group("beam_0").unwrap();
        beam.set_attribute_list("POINTING", vec![1.25_f64, -0.5])
            .unwrap();
        let table = beam.create_table("VIS", Some(visibility_schema())).unwrap();
        table
            .append_rows(
                &[
                    Buffer::F64(vec![10.0, 11.0]),
                    Buffer::from(vec!["CS001", "RS208"]),
                    Buffer::F32(vec![0.5, 1.5, 2.5, 3.5]),
                ],
                2,
            )
            .unwrap();
        table.set_attribute("SUBBAND", 301_u16).unwrap();
        let array = beam
            .create_array("spectrum", &[2, 4], ElementType::U32, Some(&[1, 4]))
            .unwrap();
        array.write_all((0..8).collect::<Vec<u32>>()).unwrap();
        assert!(dataset.has_pending_changes());
        dataset.close().unwrap();
    }

    let dataset = Dataset::open(&path).unwrap();
    assert!(!dataset.has_pending_changes());
    assert_eq!(dataset.storage_kind(), StorageKind::Hierarchical);
    assert_eq!(dataset.attribute_as::<String>("OBSERVER").unwrap(), "Rosa");
    assert_eq!(
        dataset.list().unwrap(),
        vec![("beam_0".to_string(), NodeKind::Group)]
    );

    let beam = dataset.open_group("beam_0").unwrap();
    assert_eq!(
        beam.attribute_list_as::<f64>("POINTING").unwrap(),
        vec![1.25, -0.5]
    );
    let table = beam.open_table("VIS").unwrap();
    assert_eq!(table.schema().unwrap(), visibility_schema());
    assert_eq!(table.number_of_rows().unwrap(), 2);
    assert_eq!(table.attribute_as::<u16>("SUBBAND").unwrap(), 301);
    let rows = table.read_rows(1, 1).unwrap();
    assert_eq!(rows[0].value::<String>(1), Some("RS208".to_string()));
    assert_eq!(rows[0][2], Buffer::F32(vec![2.5, 3.5]));

    let array = beam.open_array("spectrum").unwrap();
    assert_eq!(array.chunk_dims().unwrap(), Some(vec![1, 4]));
    assert_eq!(array.read_chunk(&[1, 0]).unwrap(), Buffer::U32(vec![4, 5, 6, 7]));
    assert!(matches!(
        core(array.read_chunk(&[2, 0]).unwrap_err()),
        CoreError::OutOfBounds(_)
    ));
}

#[test]
fn test_double_close_and_closed_handles() {
    let dir = tempdir().unwrap();
    let dataset = Dataset::create(dir.path().join("close.dal"), StorageKind::Hierarchical).unwrap();
    let group = dataset.create_group("g").unwrap();
    let table = group.create_table("t", Some(visibility_schema())).unwrap();
    let array = group
        .create_array("a", &[3], ElementType::I64, None)
        .unwrap();

    dataset.close().unwrap();
    dataset.close().unwrap();
    assert!(dataset.is_closed());

    assert!(matches!(core(group.list().unwrap_err()), CoreError::Closed));
    assert!(matches!(
        core(table.number_of_rows().unwrap_err()),
        CoreError::Closed
    ));
    assert!(matches!(core(array.read_all().unwrap_err()), CoreError::Closed));
    assert!(matches!(
        core(group.set_attribute("x", 1_i8).unwrap_err()),
        CoreError::Closed
    ));
    assert!(matches!(core(dataset.root().unwrap_err()), CoreError::Closed));
    assert!(matches!(core(dataset.flush().unwrap_err()), CoreError::Closed));
    assert!(core(dataset.list().unwrap_err()).is_terminal());

    // handle close after dataset close is a no-op
    table.close().unwrap();
}

#[test]
fn test_handle_close_releases_only_that_handle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("handles.dal");
    let dataset = Dataset::create(&path, StorageKind::Hierarchical).unwrap();
    let array = dataset
        .create_array("a", &[2], ElementType::I32, None)
        .unwrap();
    array.write_all(vec![4_i32, 2]).unwrap();

    array.close().unwrap();
    assert!(!dataset.has_pending_changes());
    assert!(matches!(core(array.dims().unwrap_err()), CoreError::Closed));
    array.close().unwrap();

    let again = dataset.open_array("a").unwrap();
    assert_eq!(again.read_all_as::<i32>().unwrap(), vec![4, 2]);
}

#[test]
fn test_unflushed_changes_are_discarded_on_drop() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("drop.dal");
    Dataset::create(&path, StorageKind::Hierarchical)
        .unwrap()
        .close()
        .unwrap();

    {
        let dataset = Dataset::open(&path).unwrap();
        dataset.create_group("scratch").unwrap();
    }
    let dataset = Dataset::open(&path).unwrap();
    assert!(dataset.list().unwrap().is_empty());

    dataset.create_group("kept").unwrap();
    dataset.flush().unwrap();
    drop(dataset);
    assert_eq!(Dataset::open(&path).unwrap().list().unwrap().len(), 1);
}

#[test]
fn test_create_and_open_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("exists.dal");
    Dataset::create(&path, StorageKind::Hierarchical)
        .unwrap()
        .close()
        .unwrap();

    assert!(matches!(
        core(Dataset::create(&path, StorageKind::Hierarchical).unwrap_err()),
        CoreError::AlreadyExists(_)
    ));
    assert!(matches!(
        core(Dataset::open(dir.path().join("missing.dal")).unwrap_err()),
        CoreError::NotFound(_)
    ));

    // Create replaces an existing file
    let replaced = Dataset::open_with_options(
        &path,
        &DatasetOptions::default()
            .with_mode(IoMode::Create)
            .with_storage_kind(StorageKind::Columnar),
    )
    .unwrap();
    assert_eq!(replaced.storage_kind(), StorageKind::Columnar);
    replaced.close().unwrap();
    assert_eq!(
        Dataset::open(&path).unwrap().storage_kind(),
        StorageKind::Columnar
    );

    let fresh = dir.path().join("fresh.dal");
    let created = Dataset::open_with_options(
        &fresh,
        &DatasetOptions::default().with_mode(IoMode::OpenOrCreate),
    )
    .unwrap();
    created.create_group("g").unwrap();
    created.close().unwrap();
    let opened = Dataset::open_with_options(
        &fresh,
        &DatasetOptions::default().with_mode(IoMode::OpenOrCreate),
    )
    .unwrap();
    assert_eq!(opened.list().unwrap().len(), 1);
}

#[test]
fn test_corrupt_files_are_format_errors() {
    let dir = tempdir().unwrap();

    let garbage = dir.path().join("garbage.dal");
    fs::write(&garbage, b"this is not a dataset file at all, not even close").unwrap();
    let err = Dataset::open(&garbage).unwrap_err();
    assert!(err.is_terminal());
    assert!(matches!(core(err), CoreError::FormatError(_)));

    let empty = dir.path().join("empty.dal");
    fs::write(&empty, b"").unwrap();
    assert!(matches!(
        core(Dataset::open(&empty).unwrap_err()),
        CoreError::FormatError(_)
    ));

    let valid = dir.path().join("valid.dal");
    let dataset = Dataset::create(&valid, StorageKind::Hierarchical).unwrap();
    dataset
        .create_array("a", &[16], ElementType::F64, None)
        .unwrap()
        .write_all(vec![1.0_f64; 16])
        .unwrap();
    dataset.close().unwrap();
    let mut bytes = fs::read(&valid).unwrap();

    let truncated = dir.path().join("truncated.dal");
    fs::write(&truncated, &bytes[..bytes.len() - 8]).unwrap();
    assert!(matches!(
        core(Dataset::open(&truncated).unwrap_err()),
        CoreError::FormatError(_)
    ));

    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    let flipped = dir.path().join("flipped.dal");
    fs::write(&flipped, &bytes).unwrap();
    assert!(matches!(
        core(Dataset::open(&flipped).unwrap_err()),
        CoreError::FormatError(_)
    ));
}

#[test]
fn test_directories_are_format_errors() {
    let dir = tempdir().unwrap();
    let err = Dataset::open(dir.path()).unwrap_err();
    assert!(err.is_terminal());
    assert!(matches!(core(err), CoreError::FormatError(_)));

    let nested = dir.path().join("nested.dal");
    fs::create_dir(&nested).unwrap();
    fs::write(nested.join("payload"), b"not a dataset").unwrap();
    assert!(matches!(
        core(Dataset::open(&nested).unwrap_err()),
        CoreError::FormatError(_)
    ));
}

#[test]
fn test_read_only_rejects_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ro.dal");
    let dataset = Dataset::create(&path, StorageKind::Hierarchical).unwrap();
    let table = dataset.create_table("T", Some(visibility_schema())).unwrap();
    table
        .append_row(&[
            Buffer::F64(vec![1.0]),
            Buffer::from(vec!["CS002"]),
            Buffer::F32(vec![0.0, 1.0]),
        ])
        .unwrap();
    dataset.close().unwrap();
    let before = fs::read(&path).unwrap();

    let dataset = Dataset::open_read_only(&path).unwrap();
    assert_eq!(dataset.mode(), IoMode::ReadOnly);
    let table = dataset.open_table("T").unwrap();
    assert_eq!(table.number_of_rows().unwrap(), 1);
    assert!(matches!(
        core(dataset.create_group("g").unwrap_err()),
        CoreError::ReadOnly(_)
    ));
    assert!(matches!(
        core(
            table
                .append_row(&[
                    Buffer::F64(vec![2.0]),
                    Buffer::from(vec!["CS003"]),
                    Buffer::F32(vec![0.0, 1.0]),
                ])
                .unwrap_err()
        ),
        CoreError::ReadOnly(_)
    ));
    assert!(matches!(
        core(table.set_attribute("x", 1_u8).unwrap_err()),
        CoreError::ReadOnly(_)
    ));
    dataset.close().unwrap();
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_columnar_datasets_hold_tables_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("columnar.dal");
    let dataset = Dataset::create(&path, StorageKind::Columnar).unwrap();
    assert!(matches!(
        core(dataset.create_group("g").unwrap_err()),
        CoreError::Unsupported(_)
    ));
    assert!(matches!(
        core(
            dataset
                .create_array("a", &[4], ElementType::U8, None)
                .unwrap_err()
        ),
        CoreError::Unsupported(_)
    ));
    let table = dataset.create_table("MAIN", Some(visibility_schema())).unwrap();
    table
        .append_row(&[
            Buffer::F64(vec![0.0]),
            Buffer::from(vec!["CS001"]),
            Buffer::F32(vec![1.0, 2.0]),
        ])
        .unwrap();
    dataset.close().unwrap();

    let dataset = Dataset::open(&path).unwrap();
    assert_eq!(dataset.storage_kind(), StorageKind::Columnar);
    assert_eq!(dataset.list_tables().unwrap(), vec!["MAIN".to_string()]);
    let view = dataset
        .open_table("MAIN")
        .unwrap()
        .query(&["STATION"], "TIME = 0")
        .unwrap();
    assert_eq!(view.column_as::<String>("STATION").unwrap().to_vec(), vec!["CS001"]);
}

#[test]
fn test_options_from_file() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("options.json");
    fs::write(
        &config,
        r#"{"mode": "open_or_create", "storage_kind": "columnar", "scan_buffer_rows": 2}"#,
    )
    .unwrap();
    let options = DatasetOptions::from_file(&config).unwrap();
    assert!(options.sync_on_flush);

    let dataset = Dataset::open_with_options(dir.path().join("c.dal"), &options).unwrap();
    assert_eq!(dataset.storage_kind(), StorageKind::Columnar);
    assert_eq!(dataset.options().scan_buffer_rows, 2);

    let table = dataset.create_table("T", None).unwrap();
    table.add_column("N", ElementType::I16, 1).unwrap();
    table
        .append_rows(&[Buffer::I16(vec![1, 2, 3, 4, 5])], 5)
        .unwrap();
    let blocks: Vec<usize> = table
        .scan(None)
        .unwrap()
        .map(|block| block.unwrap().len())
        .collect();
    assert_eq!(blocks, vec![2, 2, 1]);
}
