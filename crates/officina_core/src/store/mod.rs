//! Record store contract and backing implementations.
//!
//! # Responsibility
//! - Define collection-scoped CRUD over serialized records keyed by integer id.
//! - Wrap every access in a read scope (consistent view) or a write scope
//!   (exclusive, all-or-nothing).
//! - Keep backend details (SQL, locking) behind the `RecordStore` trait.
//!
//! # Invariants
//! - Identifiers come from a per-collection counter that never moves back.
//! - A write scope whose closure returns `Err` leaves no trace in the store.
//! - `update`/`delete` check existence inside the same scope as the mutation.

use crate::db::DbError;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod collection;
mod memory;
mod sqlite;

pub use collection::{Collection, EntityRef, RecordId, RefField};
pub(crate) use collection::OwnerRefs;
pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Infrastructure and contract errors raised by record stores.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Requested record does not exist in its collection.
    NotFound(EntityRef),
    /// Record could not be encoded for persistence.
    Serialization {
        collection: Collection,
        source: serde_json::Error,
    },
    /// A stored record exists but cannot be decoded.
    InvalidData {
        record: EntityRef,
        message: String,
    },
    /// A previous holder of the store lock panicked.
    LockPoisoned(&'static str),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(record) => write!(f, "record not found: {record}"),
            Self::Serialization { collection, source } => {
                write!(f, "failed to serialize {collection} record: {source}")
            }
            Self::InvalidData { record, message } => {
                write!(f, "invalid persisted data in {record}: {message}")
            }
            Self::LockPoisoned(store) => write!(f, "{store} lock poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization { source, .. } => Some(source),
            Self::NotFound(_) | Self::InvalidData { .. } | Self::LockPoisoned(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One serialized record as held by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: RecordId,
    pub body: String,
}

/// Consistent, read-only view of the store.
pub trait ReadScope {
    fn get_raw(&self, collection: Collection, id: RecordId) -> StoreResult<Option<String>>;
    /// All records of a collection in ascending id order.
    fn list_raw(&self, collection: Collection) -> StoreResult<Vec<RawRecord>>;
    fn count(&self, collection: Collection) -> StoreResult<usize>;
    /// Identifier the next `next_id` call would hand out.
    fn peek_next_id(&self, collection: Collection) -> StoreResult<RecordId>;

    /// Ids of records in `collection` whose `field` equals `target`.
    ///
    /// The default scans the collection and decodes only the reference
    /// fields; records that are not JSON objects are skipped.
    fn find_referencing(
        &self,
        collection: Collection,
        field: RefField,
        target: RecordId,
    ) -> StoreResult<Vec<RecordId>> {
        let mut ids = Vec::new();
        for raw in self.list_raw(collection)? {
            match serde_json::from_str::<OwnerRefs>(&raw.body) {
                Ok(refs) if refs.get(field) == Some(target) => ids.push(raw.id),
                Ok(_) => {}
                Err(err) => warn!(
                    "event=reference_scan module=store status=skipped collection={} id={} error={}",
                    collection, raw.id, err
                ),
            }
        }
        Ok(ids)
    }

    fn exists(&self, collection: Collection, id: RecordId) -> StoreResult<bool> {
        Ok(self.get_raw(collection, id)?.is_some())
    }
}

/// Exclusive mutation scope. Committed only when the scope closure succeeds.
pub trait WriteScope: ReadScope {
    /// Allocates the next identifier for `collection`.
    fn next_id(&mut self, collection: Collection) -> StoreResult<RecordId>;
    /// Raises the counter so the next allocation is at least `floor`.
    fn ensure_next_id_at_least(&mut self, collection: Collection, floor: RecordId)
        -> StoreResult<()>;
    /// Inserts or overwrites one record body.
    fn put_raw(&mut self, collection: Collection, id: RecordId, body: &str) -> StoreResult<()>;
    /// Removes one record; returns whether it existed.
    fn remove_raw(&mut self, collection: Collection, id: RecordId) -> StoreResult<bool>;
    /// Removes every record of a collection; the id counter is kept.
    fn clear(&mut self, collection: Collection) -> StoreResult<usize>;
}

/// Store handle shared by every component of the core.
///
/// Implementations must make write scopes mutually exclusive and must roll
/// back every change made inside a scope whose closure fails.
pub trait RecordStore: Send + Sync {
    /// Short backend name used in log events.
    fn backend(&self) -> &'static str;

    fn read<T, E, F>(&self, scope: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ReadScope) -> Result<T, E>,
        E: From<StoreError>;

    fn write<T, E, F>(&self, scope: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn WriteScope) -> Result<T, E>,
        E: From<StoreError>;
}

/// A typed record living in one collection.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const COLLECTION: Collection;

    fn id(&self) -> RecordId;
    fn set_id(&mut self, id: RecordId);

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::COLLECTION, self.id())
    }
}

/// Result of a lenient listing: decoded records plus how many were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOutcome<R> {
    pub records: Vec<R>,
    pub skipped: usize,
}

impl<R> ListOutcome<R> {
    pub fn into_records(self) -> Vec<R> {
        self.records
    }
}

pub(crate) fn encode<R: Record>(record: &R) -> StoreResult<String> {
    serde_json::to_string(record).map_err(|source| StoreError::Serialization {
        collection: R::COLLECTION,
        source,
    })
}

pub(crate) fn decode<R: Record>(id: RecordId, body: &str) -> StoreResult<R> {
    let mut record: R = serde_json::from_str(body).map_err(|err| StoreError::InvalidData {
        record: EntityRef::new(R::COLLECTION, id),
        message: err.to_string(),
    })?;
    // The storage key is authoritative over whatever id the body carries.
    record.set_id(id);
    Ok(record)
}

/// Allocates an id, stamps it on `record` and persists it.
pub fn create<R, S>(scope: &mut S, record: &mut R) -> StoreResult<RecordId>
where
    R: Record,
    S: WriteScope + ?Sized,
{
    let id = scope.next_id(R::COLLECTION)?;
    record.set_id(id);
    scope.put_raw(R::COLLECTION, id, &encode(record)?)?;
    Ok(id)
}

/// Loads one record or fails with `NotFound`.
pub fn get<R, S>(scope: &S, id: RecordId) -> StoreResult<R>
where
    R: Record,
    S: ReadScope + ?Sized,
{
    find(scope, id)?.ok_or(StoreError::NotFound(EntityRef::new(R::COLLECTION, id)))
}

/// Loads one record if present.
pub fn find<R, S>(scope: &S, id: RecordId) -> StoreResult<Option<R>>
where
    R: Record,
    S: ReadScope + ?Sized,
{
    scope
        .get_raw(R::COLLECTION, id)?
        .map(|body| decode(id, &body))
        .transpose()
}

/// Overwrites an existing record; fails with `NotFound` when it is missing.
pub fn update<R, S>(scope: &mut S, record: &R) -> StoreResult<()>
where
    R: Record,
    S: WriteScope + ?Sized,
{
    let id = record.id();
    if id <= 0 || !scope.exists(R::COLLECTION, id)? {
        return Err(StoreError::NotFound(EntityRef::new(R::COLLECTION, id)));
    }
    scope.put_raw(R::COLLECTION, id, &encode(record)?)
}

/// Deletes an existing record; fails with `NotFound` when it is missing.
pub fn delete<S>(scope: &mut S, record: EntityRef) -> StoreResult<()>
where
    S: WriteScope + ?Sized,
{
    if scope.remove_raw(record.collection, record.id)? {
        Ok(())
    } else {
        Err(StoreError::NotFound(record))
    }
}

/// Decodes every record of a collection, skipping the ones that fail.
///
/// Skipped records are logged with their id and counted in the outcome so
/// callers can surface corruption instead of hiding it.
pub fn list<R, S>(scope: &S) -> StoreResult<ListOutcome<R>>
where
    R: Record,
    S: ReadScope + ?Sized,
{
    let raw_records = scope.list_raw(R::COLLECTION)?;
    let mut records = Vec::with_capacity(raw_records.len());
    let mut skipped = 0;
    for raw in raw_records {
        match decode::<R>(raw.id, &raw.body) {
            Ok(record) => records.push(record),
            Err(err) => {
                skipped += 1;
                warn!(
                    "event=record_decode module=store status=skipped collection={} id={} error={}",
                    R::COLLECTION,
                    raw.id,
                    err
                );
            }
        }
    }
    Ok(ListOutcome { records, skipped })
}

#[cfg(test)]
mod tests {
    use super::{
        create, delete, get, list, update, Collection, EntityRef, MemoryRecordStore, Record,
        RecordId, RecordStore, StoreError, StoreResult, WriteScope,
    };
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Badge {
        #[serde(default)]
        id: RecordId,
        name: String,
    }

    impl Record for Badge {
        const COLLECTION: Collection = Collection::Operators;

        fn id(&self) -> RecordId {
            self.id
        }

        fn set_id(&mut self, id: RecordId) {
            self.id = id;
        }
    }

    fn badge(name: &str) -> Badge {
        Badge {
            id: 0,
            name: name.to_string(),
        }
    }

    #[test]
    fn typed_helpers_cover_crud_cycle() {
        let store = MemoryRecordStore::new();
        let id = store
            .write(|scope| create(scope, &mut badge("first")))
            .unwrap();

        store
            .write(|scope| update(scope, &Badge { id, name: "renamed".to_string() }))
            .unwrap();
        let loaded: Badge = store.read(|scope| get(scope, id)).unwrap();
        assert_eq!(loaded.name, "renamed");

        store
            .write(|scope| delete(scope, EntityRef::new(Collection::Operators, id)))
            .unwrap();
        let err = store
            .read(|scope| get::<Badge, _>(scope, id))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(record) if record.id == id));
    }

    #[test]
    fn update_of_unassigned_record_is_not_found() {
        let store = MemoryRecordStore::new();
        let err = store
            .write(|scope| update(scope, &badge("ghost")))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn list_skips_undecodable_records_and_counts_them() {
        let store = MemoryRecordStore::new();
        store
            .write(|scope| -> StoreResult<()> {
                create(scope, &mut badge("ok"))?;
                let id = scope.next_id(Collection::Operators)?;
                scope.put_raw(Collection::Operators, id, "{\"name\": 42}")?;
                Ok(())
            })
            .unwrap();

        let outcome = store.read(|scope| list::<Badge, _>(scope)).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped, 1);
    }
}
