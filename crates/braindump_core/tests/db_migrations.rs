use braindump_core::db::migrations::latest_version;
use braindump_core::db::{open_db, open_db_in_memory, DbError};
use braindump_core::{SnapshotStore, SnapshotTrigger, SqliteSnapshotStore};
use braindump_core::Document;
use chrono::Utc;
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "snapshots");
}

#[test]
fn reopening_database_keeps_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshots.sqlite3");
    let document = Document::new(Utc::now());

    let store = SqliteSnapshotStore::open(&path).unwrap();
    let saved = store.save(&document, SnapshotTrigger::Manual).unwrap();
    drop(store);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    drop(conn);

    let reopened = SqliteSnapshotStore::open(&path).unwrap();
    let loaded = reopened.load(saved.meta.version).unwrap();
    assert_eq!(loaded.document, document);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn open_failure_names_the_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("snapshots.sqlite3");

    let err = open_db(&path).unwrap_err();
    match &err {
        DbError::Open { location, .. } => assert_eq!(location, &path.display().to_string()),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("snapshots.sqlite3"));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
