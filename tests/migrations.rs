//! Schema produced by the cetane registry on SQLite.
//!
//! The diesel table definitions in `schema.rs` are maintained by hand, so
//! this checks every column they name exists with the expected affinity.

use std::collections::BTreeMap;

use rusqlite::{Connection, Result as SqliteResult};

/// Column name -> (declared type, not null, primary key)
type Columns = BTreeMap<String, (String, bool, bool)>;

fn run_cetane_migrations(conn: &Connection) -> SqliteResult<Vec<String>> {
    use cetane::backend::Sqlite;

    let registry = varscan_fanout::migrations::registry();
    let backend = Sqlite;

    let ordered_names = registry
        .resolve_order()
        .expect("Failed to resolve migration order");

    let mut applied = Vec::new();
    for name in ordered_names {
        let migration = registry
            .get(name)
            .expect("Migration not found after resolve");
        for stmt in migration.forward_sql(&backend) {
            if stmt.trim().is_empty() {
                continue;
            }
            conn.execute_batch(&stmt)?;
        }
        applied.push(name.to_string());
    }

    Ok(applied)
}

fn columns(conn: &Connection, table: &str) -> SqliteResult<Columns> {
    let mut pragma = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let rows = pragma.query_map([], |row| {
        Ok((
            row.get::<_, String>(1)?,
            (
                row.get::<_, String>(2)?.to_uppercase(),
                row.get::<_, bool>(3)?,
                row.get::<_, i32>(5)? > 0,
            ),
        ))
    })?;
    rows.collect()
}

fn index_names(conn: &Connection) -> SqliteResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='index' AND sql IS NOT NULL ORDER BY name",
    )?;
    let names = stmt.query_map([], |row| row.get(0))?;
    names.collect()
}

fn migrated() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    run_cetane_migrations(&conn).unwrap();
    conn
}

#[test]
fn test_registry_order() {
    let conn = Connection::open_in_memory().unwrap();
    assert_eq!(
        run_cetane_migrations(&conn).unwrap(),
        vec!["0001_job_tables", "0002_job_metrics"]
    );
}

#[test]
fn test_job_status_columns() {
    let conn = migrated();
    let cols = columns(&conn, "job_status").unwrap();

    let expected = [
        ("job_id", "TEXT", true, true),
        ("input_id", "TEXT", false, false),
        ("case_id", "TEXT", false, false),
        ("tumor_id", "TEXT", false, false),
        ("normal_id", "TEXT", false, false),
        ("identifiers", "TEXT", true, false),
        ("status", "TEXT", true, false),
        ("location", "TEXT", false, false),
        ("datetime_start", "TEXT", true, false),
        ("datetime_end", "TEXT", false, false),
        ("checksum", "TEXT", false, false),
        ("size", "INTEGER", false, false),
        ("host", "TEXT", false, false),
        ("elapsed_by_phase", "TEXT", true, false),
    ];
    assert_eq!(cols.len(), expected.len());
    for (name, ty, not_null, pk) in expected {
        assert_eq!(
            cols.get(name),
            Some(&(ty.to_string(), not_null, pk)),
            "job_status.{}",
            name
        );
    }
}

#[test]
fn test_inputs_and_metrics_tables() {
    let conn = migrated();

    let inputs = columns(&conn, "job_inputs").unwrap();
    for name in ["id", "case_id", "tumor_id", "normal_id", "tumor_url", "normal_url", "created_at"] {
        assert!(inputs.contains_key(name), "job_inputs.{}", name);
    }
    assert!(inputs["id"].2);

    let metrics = columns(&conn, "job_metrics").unwrap();
    assert_eq!(metrics["thread_count"].0, "INTEGER");
    assert_eq!(metrics["download_seconds"].0, "REAL");
    assert!(!metrics["user_time"].1);
    assert_eq!(metrics.len(), 14);
}

#[test]
fn test_pair_index_created() {
    let conn = migrated();
    assert_eq!(index_names(&conn).unwrap(), vec!["idx_job_status_pair"]);
}
