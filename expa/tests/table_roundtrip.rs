//! End-to-end table-file tests: write a container, read it back, and
//! bridge through CSV.

use std::fs;

use expa::{
    export_csv, import_csv, read_table_file, write_table_file, EntryType, ExpaError,
    SchemaRegistry, Structure, StructureEntry, Table, TableFile, Value,
};

fn structure(fields: &[(&str, EntryType)]) -> Structure {
    Structure::new(
        fields
            .iter()
            .map(|(n, t)| StructureEntry::new(*n, *t))
            .collect(),
    )
}

fn sample_table(name: &str) -> Table {
    Table {
        name: name.to_string(),
        structure: structure(&[
            ("id", EntryType::Int32),
            ("rate", EntryType::Float),
            ("flag_a", EntryType::Bool),
            ("flag_b", EntryType::Bool),
            ("label", EntryType::String),
            ("drops", EntryType::IntArray),
            ("rank", EntryType::Int16),
            ("tier", EntryType::Int8),
        ]),
        rows: vec![
            vec![
                Value::Int32(1),
                Value::Float(0.5),
                Value::Bool(true),
                Value::Bool(false),
                Value::String("first entry".into()),
                Value::IntArray(vec![10, 20, -30]),
                Value::Int16(-2),
                Value::Int8(3),
            ],
            vec![
                Value::Int32(-99),
                Value::Float(12.25),
                Value::Bool(false),
                Value::Bool(false),
                Value::String(String::new()),
                Value::IntArray(vec![]),
                Value::Int16(500),
                Value::Int8(-1),
            ],
        ],
    }
}

fn empty_registry() -> (tempfile::TempDir, SchemaRegistry) {
    let dir = tempfile::tempdir().unwrap();
    let registry = SchemaRegistry::new(dir.path().join("nothing"));
    (dir, registry)
}

/// Registry resolving any source to the sample table's field list.
fn sample_registry(table_pattern: &str) -> (tempfile::TempDir, SchemaRegistry) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("structure.json"),
        r#"{ ".*": "tables.json" }"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("tables.json"),
        format!(
            r#"{{ "{table_pattern}": {{
                "id": "int32", "rate": "float", "flag_a": "bool", "flag_b": "bool",
                "label": "string", "drops": "int array", "rank": "int16", "tier": "int8"
            }} }}"#
        ),
    )
    .unwrap();
    let registry = SchemaRegistry::new(dir.path().to_path_buf());
    (dir, registry)
}

#[test]
fn inline_type_dialect_round_trips_without_descriptors() {
    let workdir = tempfile::tempdir().unwrap();
    let path = workdir.path().join("sample.mbe");
    let original = TableFile {
        tables: vec![sample_table("monsters")],
    };

    write_table_file(&original, &path, &expa::variant::DSTS).unwrap();

    let (_reg_dir, registry) = empty_registry();
    let back = read_table_file(&path, &expa::variant::DSTS, &registry).unwrap();

    assert_eq!(back.tables.len(), 1);
    let table = &back.tables[0];
    assert_eq!(table.name, "monsters");
    // Without descriptors the names are auto-generated, but types and
    // values survive.
    let types: Vec<EntryType> = table.structure.entries().iter().map(|e| e.ty).collect();
    let expected: Vec<EntryType> = original.tables[0]
        .structure
        .entries()
        .iter()
        .map(|e| e.ty)
        .collect();
    assert_eq!(types, expected);
    assert_eq!(table.structure.entries()[0].name, "int32 0");
    assert_eq!(table.rows, original.tables[0].rows);
}

#[test]
fn descriptors_supply_field_names_for_inline_dialects() {
    let workdir = tempfile::tempdir().unwrap();
    let path = workdir.path().join("named.mbe");
    let original = TableFile {
        tables: vec![sample_table("monsters")],
    };
    write_table_file(&original, &path, &expa::variant::DSTS).unwrap();

    let (_reg_dir, registry) = sample_registry("monsters");
    let back = read_table_file(&path, &expa::variant::DSTS, &registry).unwrap();
    assert_eq!(back.tables[0].structure, original.tables[0].structure);
    assert_eq!(back.tables[0].rows, original.tables[0].rows);
}

#[test]
fn plain_dialect_needs_a_descriptor() {
    let workdir = tempfile::tempdir().unwrap();
    let path = workdir.path().join("plain.mbe");
    let original = TableFile {
        tables: vec![sample_table("monsters")],
    };
    write_table_file(&original, &path, &expa::variant::DSCS).unwrap();

    // Without a matching descriptor the stride cannot be reconstructed.
    let (_reg_dir, registry) = empty_registry();
    assert!(matches!(
        read_table_file(&path, &expa::variant::DSCS, &registry),
        Err(ExpaError::SchemaMismatch { .. })
    ));

    let (_reg_dir, registry) = sample_registry("monsters");
    let back = read_table_file(&path, &expa::variant::DSCS, &registry).unwrap();
    assert_eq!(back.tables[0].structure, original.tables[0].structure);
    assert_eq!(back.tables[0].rows, original.tables[0].rows);
}

#[test]
fn multiple_tables_share_the_chunk_section() {
    let workdir = tempfile::tempdir().unwrap();
    let path = workdir.path().join("multi.mbe");

    let mut second = sample_table("second_table");
    second.rows[0][4] = Value::String("a different label".into());
    let original = TableFile {
        tables: vec![sample_table("first_table"), second],
    };
    write_table_file(&original, &path, &expa::variant::THL).unwrap();

    let (_reg_dir, registry) = empty_registry();
    let back = read_table_file(&path, &expa::variant::THL, &registry).unwrap();
    assert_eq!(back.tables.len(), 2);
    assert_eq!(back.tables[0].rows, original.tables[0].rows);
    assert_eq!(back.tables[1].rows, original.tables[1].rows);
    assert_eq!(
        back.tables[1].rows[0][4],
        Value::String("a different label".into())
    );
}

#[test]
fn empty_table_round_trips() {
    let workdir = tempfile::tempdir().unwrap();
    let path = workdir.path().join("empty.mbe");
    let original = TableFile {
        tables: vec![Table {
            name: "nothing_here".into(),
            structure: structure(&[("id", EntryType::Int32)]),
            rows: Vec::new(),
        }],
    };
    write_table_file(&original, &path, &expa::variant::DSTS).unwrap();

    let (_reg_dir, registry) = empty_registry();
    let back = read_table_file(&path, &expa::variant::DSTS, &registry).unwrap();
    assert!(back.tables[0].rows.is_empty());
}

#[test]
fn garbage_magic_is_rejected() {
    let workdir = tempfile::tempdir().unwrap();
    let path = workdir.path().join("bogus.mbe");
    fs::write(&path, b"MDB1this is something else entirely").unwrap();

    let (_reg_dir, registry) = empty_registry();
    assert!(matches!(
        read_table_file(&path, &expa::variant::DSTS, &registry),
        Err(ExpaError::BadMagic(_))
    ));
}

#[test]
fn csv_round_trip_with_descriptors() {
    let workdir = tempfile::tempdir().unwrap();
    let original = TableFile {
        tables: vec![sample_table("monsters")],
    };

    let csv_dir = workdir.path().join("csv");
    export_csv(&original, &csv_dir).unwrap();

    let exported = fs::read_to_string(csv_dir.join("000_monsters.csv")).unwrap();
    assert!(exported.starts_with("id,rate,flag_a"));
    assert!(exported.contains("first entry"));

    let (_reg_dir, registry) = sample_registry("monsters");
    let back = import_csv(&csv_dir, &registry).unwrap();
    assert_eq!(back.tables.len(), 1);
    assert_eq!(back.tables[0].name, "monsters");
    assert_eq!(back.tables[0].rows, original.tables[0].rows);
}

#[test]
fn csv_import_falls_back_to_header_types() {
    let workdir = tempfile::tempdir().unwrap();
    let csv_dir = workdir.path().join("csv");
    fs::create_dir_all(&csv_dir).unwrap();
    fs::write(
        csv_dir.join("000_auto.csv"),
        "int32 0,float 1,string 2\n7,1.5,hello\n",
    )
    .unwrap();

    let (_reg_dir, registry) = empty_registry();
    let back = import_csv(&csv_dir, &registry).unwrap();
    let table = &back.tables[0];
    assert_eq!(table.name, "auto");
    assert_eq!(
        table.rows[0],
        vec![
            Value::Int32(7),
            Value::Float(1.5),
            Value::String("hello".into())
        ]
    );
}

#[test]
fn csv_to_container_and_back() {
    let workdir = tempfile::tempdir().unwrap();
    let original = TableFile {
        tables: vec![sample_table("monsters")],
    };

    let csv_dir = workdir.path().join("csv");
    export_csv(&original, &csv_dir).unwrap();

    let (_reg_dir, registry) = sample_registry("monsters");
    let imported = import_csv(&csv_dir, &registry).unwrap();

    let container = workdir.path().join("rebuilt.mbe");
    write_table_file(&imported, &container, &expa::variant::DSTS).unwrap();
    let reread = read_table_file(&container, &expa::variant::DSTS, &registry).unwrap();
    assert_eq!(reread.tables[0].rows, original.tables[0].rows);
}
