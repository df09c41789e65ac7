use officina_core::db::migrations::latest_version;
use officina_core::db::{open_db, open_db_in_memory, DbError};
use officina_core::{SqliteRecordStore, StoreError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "records");
    assert_table_exists(&conn, "sequences");
    assert_index_exists(&conn, "idx_records_client_ref");
    assert_index_exists(&conn, "idx_records_supplier_ref");
}

#[test]
fn reopening_file_database_keeps_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("officina.db");

    let first = open_db(&path).unwrap();
    assert_eq!(schema_version(&first), latest_version());
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    assert_table_exists(&second, "records");
}

#[test]
fn newer_schema_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn store_refuses_connection_without_migrations() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteRecordStore::from_connection(conn).unwrap_err();
    assert!(matches!(err, StoreError::Db(DbError::SchemaMismatch(_))));
}

#[test]
fn file_store_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("officina.db");
    let store = SqliteRecordStore::open(&path).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert_schema_object(conn, "table", table_name);
}

fn assert_index_exists(conn: &Connection, index_name: &str) {
    assert_schema_object(conn, "index", index_name);
}

fn assert_schema_object(conn: &Connection, kind: &str, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "{kind} `{name}` should exist");
}

#[test]
fn blocked_parent_directory_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"plain file").unwrap();

    let err = open_db(blocker.join("officina.db")).unwrap_err();
    assert!(matches!(err, DbError::CreateDir { ref path, .. } if path == &blocker));
}
