//! SQLite-backed record store.
//!
//! # Responsibility
//! - Persist records as JSON bodies in the `records` table.
//! - Allocate identifiers from the `sequences` table.
//! - Map read scopes to deferred transactions and write scopes to
//!   `BEGIN IMMEDIATE` transactions.
//!
//! # Invariants
//! - The connection must be at the latest migrated schema version.
//! - One handle serializes all scopes through its connection mutex.

use super::{
    Collection, RawRecord, ReadScope, RecordId, RecordStore, RefField, StoreError, StoreResult,
    WriteScope,
};
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{open_db, open_db_in_memory, DbError};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Single-file embedded record store.
#[derive(Debug)]
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteRecordStore {
    /// Opens (or creates) the store file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = open_db(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(open_db_in_memory()?)
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::LockPoisoned("sqlite store"))
    }
}

struct SqliteScope<'a> {
    conn: &'a Connection,
}

impl ReadScope for SqliteScope<'_> {
    fn get_raw(&self, collection: Collection, id: RecordId) -> StoreResult<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body
                 FROM records
                 WHERE collection = ?1
                   AND id = ?2;",
                params![collection.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn list_raw(&self, collection: Collection) -> StoreResult<Vec<RawRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, body
             FROM records
             WHERE collection = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([collection.as_str()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(RawRecord {
                id: row.get(0)?,
                body: row.get(1)?,
            });
        }
        Ok(records)
    }

    fn count(&self, collection: Collection) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1;",
            [collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn peek_next_id(&self, collection: Collection) -> StoreResult<RecordId> {
        let next: Option<RecordId> = self
            .conn
            .query_row(
                "SELECT next_id FROM sequences WHERE collection = ?1;",
                [collection.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(next.unwrap_or(1))
    }

    fn find_referencing(
        &self,
        collection: Collection,
        field: RefField,
        target: RecordId,
    ) -> StoreResult<Vec<RecordId>> {
        // Path is a fixed literal so the expression indexes apply.
        let sql = format!(
            "SELECT id
             FROM records
             WHERE collection = ?1
               AND json_valid(body)
               AND json_extract(body, '$.{}') = ?2
             ORDER BY id ASC;",
            field.as_str()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params![collection.as_str(), target])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }
}

impl WriteScope for SqliteScope<'_> {
    fn next_id(&mut self, collection: Collection) -> StoreResult<RecordId> {
        let id = self.peek_next_id(collection)?;
        self.conn.execute(
            "INSERT INTO sequences (collection, next_id)
             VALUES (?1, ?2)
             ON CONFLICT(collection) DO UPDATE SET next_id = excluded.next_id;",
            params![collection.as_str(), id + 1],
        )?;
        Ok(id)
    }

    fn ensure_next_id_at_least(
        &mut self,
        collection: Collection,
        floor: RecordId,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO sequences (collection, next_id)
             VALUES (?1, MAX(?2, 1))
             ON CONFLICT(collection) DO UPDATE SET next_id = MAX(next_id, excluded.next_id);",
            params![collection.as_str(), floor],
        )?;
        Ok(())
    }

    fn put_raw(&mut self, collection: Collection, id: RecordId, body: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO records (collection, id, body)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![collection.as_str(), id, body],
        )?;
        Ok(())
    }

    fn remove_raw(&mut self, collection: Collection, id: RecordId) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2;",
            params![collection.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    fn clear(&mut self, collection: Collection) -> StoreResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM records WHERE collection = ?1;",
            [collection.as_str()],
        )?;
        Ok(changed)
    }
}

impl RecordStore for SqliteRecordStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn read<T, E, F>(&self, scope: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ReadScope) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(StoreError::from)?;
        let value = scope(&SqliteScope { conn: &tx })?;
        tx.finish().map_err(StoreError::from)?;
        Ok(value)
    }

    fn write<T, E, F>(&self, scope: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn WriteScope) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        // Dropping `tx` on the error path rolls the whole scope back.
        let value = scope(&mut SqliteScope { conn: &tx }).inspect_err(|_| {
            debug!("event=write_scope module=store status=rolled_back backend=sqlite");
        })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected = latest_version();
    let actual = current_user_version(conn)?;
    if actual != expected {
        return Err(DbError::SchemaMismatch(format!(
            "record store requires schema version {expected}, got {actual}"
        ))
        .into());
    }

    for table in ["records", "sequences"] {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(DbError::SchemaMismatch(format!("missing table `{table}`")).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::SqliteRecordStore;
    use crate::db::open_db_in_memory;
    use crate::store::{Collection, ReadScope, RecordStore, RefField, StoreResult, WriteScope};
    use rusqlite::Connection;

    #[test]
    fn rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(SqliteRecordStore::from_connection(conn).is_err());
    }

    #[test]
    fn find_referencing_skips_malformed_bodies() {
        let store = SqliteRecordStore::from_connection(open_db_in_memory().unwrap()).unwrap();
        store
            .write(|scope| -> StoreResult<()> {
                scope.put_raw(Collection::Vehicles, 1, r#"{"client_id": 7}"#)?;
                scope.put_raw(Collection::Vehicles, 2, "not json")?;
                scope.put_raw(Collection::Vehicles, 3, r#"{"client_id": 8}"#)?;
                Ok(())
            })
            .unwrap();

        let ids = store
            .read(|scope| scope.find_referencing(Collection::Vehicles, RefField::ClientId, 7))
            .unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn ensure_next_id_never_lowers_counter() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let next = store
            .write(|scope| -> StoreResult<i64> {
                scope.ensure_next_id_at_least(Collection::Invoices, 10)?;
                scope.ensure_next_id_at_least(Collection::Invoices, 3)?;
                scope.next_id(Collection::Invoices)
            })
            .unwrap();
        assert_eq!(next, 10);
    }
}
