//! In-process document store.
//!
//! Models a document database: collections of JSON documents addressed by
//! external integer ids, with multi-document writes staged and published as
//! one unit. Write scopes operate on a private copy of the state which
//! replaces the live state only when the scope closure succeeds.

use super::{
    Collection, RawRecord, ReadScope, RecordId, RecordStore, StoreError, StoreResult, WriteScope,
};
use log::debug;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    documents: BTreeMap<Collection, BTreeMap<RecordId, String>>,
    next_ids: BTreeMap<Collection, RecordId>,
}

impl MemoryState {
    fn get_raw(&self, collection: Collection, id: RecordId) -> Option<String> {
        self.documents
            .get(&collection)
            .and_then(|documents| documents.get(&id))
            .cloned()
    }

    fn list_raw(&self, collection: Collection) -> Vec<RawRecord> {
        self.documents
            .get(&collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, body)| RawRecord {
                        id: *id,
                        body: body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn count(&self, collection: Collection) -> usize {
        self.documents.get(&collection).map_or(0, BTreeMap::len)
    }

    fn peek_next_id(&self, collection: Collection) -> RecordId {
        self.next_ids.get(&collection).copied().unwrap_or(1)
    }
}

/// Document-store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: RwLock<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryReadScope<'a> {
    state: &'a MemoryState,
}

struct MemoryWriteScope<'a> {
    state: &'a mut MemoryState,
}

impl ReadScope for MemoryReadScope<'_> {
    fn get_raw(&self, collection: Collection, id: RecordId) -> StoreResult<Option<String>> {
        Ok(self.state.get_raw(collection, id))
    }

    fn list_raw(&self, collection: Collection) -> StoreResult<Vec<RawRecord>> {
        Ok(self.state.list_raw(collection))
    }

    fn count(&self, collection: Collection) -> StoreResult<usize> {
        Ok(self.state.count(collection))
    }

    fn peek_next_id(&self, collection: Collection) -> StoreResult<RecordId> {
        Ok(self.state.peek_next_id(collection))
    }
}

impl ReadScope for MemoryWriteScope<'_> {
    fn get_raw(&self, collection: Collection, id: RecordId) -> StoreResult<Option<String>> {
        Ok(self.state.get_raw(collection, id))
    }

    fn list_raw(&self, collection: Collection) -> StoreResult<Vec<RawRecord>> {
        Ok(self.state.list_raw(collection))
    }

    fn count(&self, collection: Collection) -> StoreResult<usize> {
        Ok(self.state.count(collection))
    }

    fn peek_next_id(&self, collection: Collection) -> StoreResult<RecordId> {
        Ok(self.state.peek_next_id(collection))
    }
}

impl WriteScope for MemoryWriteScope<'_> {
    fn next_id(&mut self, collection: Collection) -> StoreResult<RecordId> {
        let id = self.state.peek_next_id(collection);
        self.state.next_ids.insert(collection, id + 1);
        Ok(id)
    }

    fn ensure_next_id_at_least(
        &mut self,
        collection: Collection,
        floor: RecordId,
    ) -> StoreResult<()> {
        let next = self.state.peek_next_id(collection).max(floor);
        self.state.next_ids.insert(collection, next);
        Ok(())
    }

    fn put_raw(&mut self, collection: Collection, id: RecordId, body: &str) -> StoreResult<()> {
        self.state
            .documents
            .entry(collection)
            .or_default()
            .insert(id, body.to_string());
        Ok(())
    }

    fn remove_raw(&mut self, collection: Collection, id: RecordId) -> StoreResult<bool> {
        Ok(self
            .state
            .documents
            .get_mut(&collection)
            .and_then(|documents| documents.remove(&id))
            .is_some())
    }

    fn clear(&mut self, collection: Collection) -> StoreResult<usize> {
        Ok(self
            .state
            .documents
            .remove(&collection)
            .map_or(0, |documents| documents.len()))
    }
}

impl RecordStore for MemoryRecordStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn read<T, E, F>(&self, scope: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ReadScope) -> Result<T, E>,
        E: From<StoreError>,
    {
        let guard = self
            .state
            .read()
            .map_err(|_| StoreError::LockPoisoned("memory store"))?;
        scope(&MemoryReadScope { state: &guard })
    }

    fn write<T, E, F>(&self, scope: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn WriteScope) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self
            .state
            .write()
            .map_err(|_| StoreError::LockPoisoned("memory store"))?;
        let mut staged = guard.clone();
        let value = scope(&mut MemoryWriteScope { state: &mut staged }).inspect_err(|_| {
            debug!("event=write_scope module=store status=rolled_back backend=memory");
        })?;
        *guard = staged;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryRecordStore;
    use crate::store::{Collection, ReadScope, RecordStore, StoreError, StoreResult, WriteScope};

    #[test]
    fn failed_write_scope_publishes_nothing() {
        let store = MemoryRecordStore::new();
        let result: StoreResult<()> = store.write(|scope| {
            let id = scope.next_id(Collection::Quotes)?;
            scope.put_raw(Collection::Quotes, id, "{}")?;
            Err(StoreError::LockPoisoned("simulated"))
        });
        assert!(result.is_err());

        let (count, next) = store
            .read(|scope| -> StoreResult<_> {
                Ok((
                    scope.count(Collection::Quotes)?,
                    scope.peek_next_id(Collection::Quotes)?,
                ))
            })
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(next, 1);
    }

    #[test]
    fn ids_are_not_reused_after_delete_or_clear() {
        let store = MemoryRecordStore::new();
        let ids = store
            .write(|scope| -> StoreResult<Vec<i64>> {
                let first = scope.next_id(Collection::Clients)?;
                scope.put_raw(Collection::Clients, first, "{}")?;
                scope.remove_raw(Collection::Clients, first)?;
                scope.clear(Collection::Clients)?;
                let second = scope.next_id(Collection::Clients)?;
                Ok(vec![first, second])
            })
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }
}
