use super::{
    collection_file, io_error, snapshot_name, BackupError, RestoreReport, SnapshotInfo,
    SnapshotManifest, SnapshotOutcome, SnapshotRecord, FORMAT_VERSION, MANIFEST_FILE,
    STAGING_PREFIX,
};
use crate::config::CoreConfig;
use crate::store::{Collection, RawRecord, RecordId, RecordStore, StoreResult};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Everything read from the store in one read scope.
struct Export {
    collections: Vec<(Collection, Vec<RawRecord>)>,
    sequences: BTreeMap<Collection, RecordId>,
}

/// Snapshot content loaded and checked before any store mutation.
struct LoadedSnapshot {
    manifest: SnapshotManifest,
    collections: Vec<(Collection, Vec<SnapshotRecord>)>,
}

/// Snapshot, retention and restore over one shared store handle.
pub struct BackupManager<S: RecordStore> {
    store: Arc<S>,
    backup_dir: PathBuf,
    max_snapshots: usize,
}

impl<S: RecordStore> BackupManager<S> {
    pub fn new(store: Arc<S>, backup_dir: impl Into<PathBuf>, max_snapshots: usize) -> Self {
        Self {
            store,
            backup_dir: backup_dir.into(),
            max_snapshots,
        }
    }

    pub fn from_config(store: Arc<S>, config: &CoreConfig) -> Self {
        Self::new(store, config.backup_dir.clone(), config.max_snapshots)
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    /// Writes a new snapshot, then prunes down to the retention limit.
    ///
    /// A pruning failure does not fail the call; it is reported in
    /// `SnapshotOutcome::prune_warning`.
    pub fn snapshot(&self) -> Result<SnapshotOutcome, BackupError> {
        self.snapshot_with_retention(|max| self.prune(max))
    }

    fn snapshot_with_retention<F>(&self, retain: F) -> Result<SnapshotOutcome, BackupError>
    where
        F: FnOnce(usize) -> Result<Vec<SnapshotInfo>, BackupError>,
    {
        info!(
            "event=snapshot module=backup status=start backend={} dir={}",
            self.store.backend(),
            self.backup_dir.display()
        );
        let (info, records) = self.write_snapshot().inspect_err(|err| {
            error!("event=snapshot module=backup status=error error={err}");
        })?;

        let (pruned, prune_warning) = match retain(self.max_snapshots) {
            Ok(pruned) => (pruned, None),
            Err(err) => {
                warn!(
                    "event=snapshot module=backup status=degraded snapshot={} error={}",
                    info.name, err
                );
                (Vec::new(), Some(err))
            }
        };

        info!(
            "event=snapshot module=backup status=ok snapshot={} records={} pruned={}",
            info.name,
            records,
            pruned.len()
        );
        Ok(SnapshotOutcome {
            snapshot: info,
            records,
            pruned,
            prune_warning,
        })
    }

    /// Removes the oldest snapshots until at most `max` remain.
    ///
    /// Returns the removed snapshots, oldest first.
    pub fn prune(&self, max: usize) -> Result<Vec<SnapshotInfo>, BackupError> {
        let mut snapshots = self.list()?;
        if snapshots.len() <= max {
            return Ok(Vec::new());
        }
        snapshots.reverse();
        let excess = snapshots.len() - max;
        let mut removed = Vec::with_capacity(excess);
        for snapshot in snapshots.into_iter().take(excess) {
            fs::remove_dir_all(&snapshot.path).map_err(io_error(&snapshot.path))?;
            info!("event=prune module=backup status=ok removed={}", snapshot.name);
            removed.push(snapshot);
        }
        Ok(removed)
    }

    /// Snapshots under the backup directory, most recent first.
    pub fn list(&self) -> Result<Vec<SnapshotInfo>, BackupError> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.backup_dir).map_err(io_error(&self.backup_dir))? {
            let entry = entry.map_err(io_error(&self.backup_dir))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(info) = SnapshotInfo::parse(&path) {
                snapshots.push(info);
            }
        }
        snapshots.sort_by_key(|info| std::cmp::Reverse(info.order_key()));
        Ok(snapshots)
    }

    /// Replaces the content of every collection listed in the snapshot.
    ///
    /// The snapshot is fully read and checked first; any failure leaves the
    /// live store unchanged. Identifier counters never move backwards.
    pub fn restore(&self, location: &Path) -> Result<RestoreReport, BackupError> {
        info!(
            "event=restore module=backup status=start snapshot={}",
            location.display()
        );
        let loaded = load_snapshot(location).inspect_err(|err| {
            error!("event=restore module=backup status=error phase=validate error={err}");
        })?;

        let report = self
            .store
            .write(|scope| -> Result<RestoreReport, BackupError> {
                let mut records = 0;
                for (collection, snapshot_records) in &loaded.collections {
                    scope.clear(*collection)?;
                    let mut floor = loaded
                        .manifest
                        .sequences
                        .get(collection)
                        .copied()
                        .unwrap_or(1);
                    for record in snapshot_records {
                        scope.put_raw(*collection, record.id, &record.body)?;
                        floor = floor.max(record.id + 1);
                    }
                    scope.ensure_next_id_at_least(*collection, floor)?;
                    records += snapshot_records.len();
                }
                Ok(RestoreReport {
                    collections: loaded.collections.len(),
                    records,
                })
            })
            .inspect_err(|err| {
                error!("event=restore module=backup status=error phase=apply error={err}");
            })?;

        info!(
            "event=restore module=backup status=ok collections={} records={}",
            report.collections, report.records
        );
        Ok(report)
    }

    fn export(&self) -> StoreResult<Export> {
        self.store.read(|scope| -> StoreResult<Export> {
            let mut collections = Vec::with_capacity(Collection::ALL.len());
            let mut sequences = BTreeMap::new();
            for collection in Collection::ALL {
                collections.push((collection, scope.list_raw(collection)?));
                sequences.insert(collection, scope.peek_next_id(collection)?);
            }
            Ok(Export {
                collections,
                sequences,
            })
        })
    }

    fn write_snapshot(&self) -> Result<(SnapshotInfo, usize), BackupError> {
        let taken_at = Utc::now();
        let export = self.export()?;

        fs::create_dir_all(&self.backup_dir).map_err(io_error(&self.backup_dir))?;
        let staging = self
            .backup_dir
            .join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        fs::create_dir(&staging).map_err(io_error(&staging))?;

        let records = match write_export(&staging, &export, taken_at) {
            Ok(records) => records,
            Err(err) => {
                discard_staging(&staging);
                return Err(err);
            }
        };

        let target = self.free_snapshot_path(taken_at);
        if let Err(source) = fs::rename(&staging, &target) {
            discard_staging(&staging);
            return Err(BackupError::Io {
                path: target,
                source,
            });
        }

        let info = SnapshotInfo::parse(&target).ok_or_else(|| BackupError::InvalidSnapshot {
            path: target.clone(),
            message: "generated name does not parse".to_string(),
        })?;
        Ok((info, records))
    }

    fn free_snapshot_path(&self, taken_at: DateTime<Utc>) -> PathBuf {
        let stamp = taken_at.naive_utc();
        let mut suffix = 0;
        loop {
            let candidate = self.backup_dir.join(snapshot_name(stamp, suffix));
            if !candidate.exists() {
                return candidate;
            }
            suffix += 1;
        }
    }
}

fn write_export(
    dir: &Path,
    export: &Export,
    taken_at: DateTime<Utc>,
) -> Result<usize, BackupError> {
    let mut records = 0;
    for (collection, raw_records) in &export.collections {
        let snapshot_records: Vec<SnapshotRecord> = raw_records
            .iter()
            .map(|raw| SnapshotRecord {
                id: raw.id,
                body: raw.body.clone(),
            })
            .collect();
        write_json(&collection_file(dir, *collection), &snapshot_records)?;
        records += snapshot_records.len();
    }

    let manifest = SnapshotManifest {
        timestamp: taken_at,
        format_version: FORMAT_VERSION,
        collections: export
            .collections
            .iter()
            .map(|(collection, _)| *collection)
            .collect(),
        sequences: export.sequences.clone(),
    };
    write_json(&dir.join(MANIFEST_FILE), &manifest)?;
    Ok(records)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), BackupError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(BackupError::Encode)?;
    writer.flush().map_err(io_error(path))?;
    writer.get_ref().sync_all().map_err(io_error(path))
}

fn discard_staging(staging: &Path) {
    if let Err(err) = fs::remove_dir_all(staging) {
        warn!(
            "event=snapshot module=backup status=cleanup_failed staging={} error={}",
            staging.display(),
            err
        );
    }
}

fn load_snapshot(location: &Path) -> Result<LoadedSnapshot, BackupError> {
    let manifest_path = location.join(MANIFEST_FILE);
    let manifest: SnapshotManifest = read_json(&manifest_path)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(BackupError::UnsupportedFormat {
            found: manifest.format_version,
            supported: FORMAT_VERSION,
        });
    }

    let mut seen = BTreeSet::new();
    let mut collections = Vec::with_capacity(manifest.collections.len());
    for collection in &manifest.collections {
        if !seen.insert(*collection) {
            return Err(BackupError::InvalidSnapshot {
                path: manifest_path,
                message: format!("collection `{collection}` listed twice"),
            });
        }
        let path = collection_file(location, *collection);
        if !path.is_file() {
            return Err(BackupError::MissingCollection {
                collection: *collection,
                path,
            });
        }
        let records: Vec<SnapshotRecord> = read_json(&path)?;
        check_records(&path, &records)?;
        collections.push((*collection, records));
    }

    Ok(LoadedSnapshot {
        manifest,
        collections,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BackupError> {
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&content).map_err(|err| BackupError::InvalidSnapshot {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn check_records(path: &Path, records: &[SnapshotRecord]) -> Result<(), BackupError> {
    let mut ids = BTreeSet::new();
    for record in records {
        // The counter is raised to `id + 1` on restore.
        if record.id <= 0 || record.id == RecordId::MAX || !ids.insert(record.id) {
            return Err(BackupError::InvalidSnapshot {
                path: path.to_path_buf(),
                message: format!("invalid or duplicate record id {}", record.id),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::BackupManager;
    use crate::backup::{BackupError, MANIFEST_FILE};
    use crate::store::{
        Collection, MemoryRecordStore, ReadScope, RecordId, RecordStore, StoreResult, WriteScope,
    };
    use std::fs;
    use std::io;
    use std::sync::Arc;

    #[test]
    fn list_ignores_staging_and_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".staging-1234")).unwrap();
        fs::create_dir(dir.path().join("backup_20240101000000")).unwrap();
        fs::write(dir.path().join("backup_20240102000000"), b"file, not dir").unwrap();
        fs::create_dir(dir.path().join("other")).unwrap();

        let manager = BackupManager::new(Arc::new(MemoryRecordStore::new()), dir.path(), 7);
        let names: Vec<String> = manager
            .list()
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["backup_20240101000000".to_string()]);
    }

    #[test]
    fn snapshot_leaves_no_staging_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        store
            .write(|scope| -> StoreResult<()> {
                scope.put_raw(Collection::Operators, 1, r#"{"badge":"A1"}"#)?;
                Ok(())
            })
            .unwrap();

        let manager = BackupManager::new(store, dir.path(), 7);
        let outcome = manager.snapshot().unwrap();
        assert_eq!(outcome.records, 1);
        assert!(!outcome.is_degraded());
        assert!(outcome.snapshot.path.join(MANIFEST_FILE).is_file());

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn restore_rejects_missing_collection_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(Arc::new(MemoryRecordStore::new()), dir.path(), 7);
        let outcome = manager.snapshot().unwrap();
        fs::remove_file(outcome.snapshot.path.join("invoices.json")).unwrap();

        let err = manager.restore(&outcome.snapshot.path).unwrap_err();
        assert!(matches!(
            err,
            BackupError::MissingCollection { collection: Collection::Invoices, .. }
        ));
    }

    #[test]
    fn retention_failure_keeps_the_new_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("backup_20200101000000");
        fs::create_dir(&older).unwrap();

        let manager = BackupManager::new(Arc::new(MemoryRecordStore::new()), dir.path(), 1);
        let outcome = manager
            .snapshot_with_retention(|_| {
                Err(BackupError::Io {
                    path: older.clone(),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
                })
            })
            .unwrap();

        assert!(outcome.is_degraded());
        assert!(matches!(outcome.prune_warning, Some(BackupError::Io { .. })));
        assert!(outcome.pruned.is_empty());
        assert!(outcome.snapshot.path.join(MANIFEST_FILE).is_file());
        assert!(older.is_dir());

        let names: Vec<String> = manager
            .list()
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(
            names,
            vec![outcome.snapshot.name.clone(), "backup_20200101000000".to_string()]
        );
    }

    #[test]
    fn restore_rejects_id_at_counter_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        store
            .write(|scope| -> StoreResult<()> {
                scope.put_raw(Collection::Operators, 1, r#"{"badge":"A1"}"#)?;
                Ok(())
            })
            .unwrap();
        let manager = BackupManager::new(Arc::clone(&store), dir.path(), 7);
        let outcome = manager.snapshot().unwrap();

        let crafted = format!(r#"[{{"id": {}, "body": "{{}}"}}]"#, RecordId::MAX);
        fs::write(outcome.snapshot.path.join("operators.json"), crafted).unwrap();

        let err = manager.restore(&outcome.snapshot.path).unwrap_err();
        assert!(matches!(err, BackupError::InvalidSnapshot { .. }));
        let live = store
            .read(|scope| scope.list_raw(Collection::Operators))
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, 1);
    }
}
