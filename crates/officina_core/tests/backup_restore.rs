use chrono::NaiveDate;
use officina_core::backup::{SnapshotManifest, FORMAT_VERSION, MANIFEST_FILE};
use officina_core::model::documents::Invoice;
use officina_core::model::ledger::{LedgerEntry, PaymentMethod};
use officina_core::model::party::Client;
use officina_core::model::vehicle::Vehicle;
use officina_core::model::work_order::WorkOrder;
use officina_core::store::{RawRecord, ReadScope, StoreResult};
use officina_core::{
    BackupError, BackupManager, CascadeService, Collection, LedgerService, RecordStore,
    SqliteRecordStore, Workshop,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

type Contents = BTreeMap<Collection, Vec<RawRecord>>;

fn contents<S: RecordStore>(store: &S) -> Contents {
    store
        .read(|scope| -> StoreResult<Contents> {
            let mut all = BTreeMap::new();
            for collection in Collection::ALL {
                all.insert(collection, scope.list_raw(collection)?);
            }
            Ok(all)
        })
        .unwrap()
}

fn seed(store: &Arc<SqliteRecordStore>) {
    let workshop = Workshop::new(Arc::clone(store));
    let ledger = LedgerService::new(Arc::clone(store));
    for name in ["Rossi", "Verdi"] {
        let client = workshop.create(Client::new(name)).unwrap();
        let vehicle = workshop
            .create(Vehicle::new(client.id, format!("{name}-1"), "Fiat"))
            .unwrap();
        let order = workshop
            .create(WorkOrder::new(
                vehicle.id,
                Decimal::new(20_000, 2),
                Decimal::new(5_000, 2),
            ))
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        ledger
            .record_entry(
                LedgerEntry::income(date, Decimal::new(10_000, 2), PaymentMethod::Cash)
                    .for_work_order(order.id),
            )
            .unwrap();
        workshop
            .create(Invoice::new(date, Decimal::new(25_000, 2)).for_client(client.id))
            .unwrap();
    }
}

fn make_snapshot_dirs(root: &Path, names: &[&str]) {
    for name in names {
        fs::create_dir_all(root.join(name)).unwrap();
    }
}

#[test]
fn restore_reproduces_snapshot_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteRecordStore::open(dir.path().join("officina.db")).unwrap());
    seed(&store);
    let expected = contents(store.as_ref());

    let manager = BackupManager::new(Arc::clone(&store), dir.path().join("backups"), 7);
    let outcome = manager.snapshot().unwrap();
    assert_eq!(outcome.records, 10);

    let manifest: SnapshotManifest = serde_json::from_str(
        &fs::read_to_string(outcome.snapshot.path.join(MANIFEST_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.format_version, FORMAT_VERSION);
    assert_eq!(manifest.collections, Collection::ALL.to_vec());

    // Diverge from the snapshot: cascade one client away and add new records.
    let workshop = Workshop::new(Arc::clone(&store));
    CascadeService::new(Arc::clone(&store))
        .delete_client(1)
        .unwrap();
    let newcomer = workshop.create(Client::new("Bianchi")).unwrap();
    assert_ne!(contents(store.as_ref()), expected);

    let report = manager.restore(&outcome.snapshot.path).unwrap();
    assert_eq!(report.collections, Collection::ALL.len());
    assert_eq!(report.records, 10);
    assert_eq!(contents(store.as_ref()), expected);

    // Identifiers handed out before the restore are never reissued.
    let after = workshop.create(Client::new("Neri")).unwrap();
    assert!(after.id > newcomer.id);
}

#[test]
fn invalid_snapshot_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
    seed(&store);
    let manager = BackupManager::new(Arc::clone(&store), dir.path(), 7);
    let outcome = manager.snapshot().unwrap();

    Workshop::new(Arc::clone(&store))
        .create(Client::new("Post-snapshot"))
        .unwrap();
    let live = contents(store.as_ref());

    fs::write(outcome.snapshot.path.join("work_orders.json"), b"[{\"id\": 1}").unwrap();
    let err = manager.restore(&outcome.snapshot.path).unwrap_err();
    assert!(matches!(err, BackupError::InvalidSnapshot { .. }));
    assert_eq!(contents(store.as_ref()), live);

    let manifest_path = outcome.snapshot.path.join(MANIFEST_FILE);
    let mut manifest: SnapshotManifest =
        serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    manifest.format_version = FORMAT_VERSION + 1;
    fs::write(&manifest_path, serde_json::to_string(&manifest).unwrap()).unwrap();
    let err = manager.restore(&outcome.snapshot.path).unwrap_err();
    assert!(matches!(err, BackupError::UnsupportedFormat { .. }));
    assert_eq!(contents(store.as_ref()), live);
}

#[test]
fn prune_keeps_newest_by_name_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    // Created out of order so filesystem metadata disagrees with the names.
    make_snapshot_dirs(
        dir.path(),
        &[
            "backup_20240105000000",
            "backup_20240101000000",
            "backup_20240103000000",
            "backup_20240104000000",
            "backup_20240102000000",
        ],
    );
    let manager = BackupManager::new(
        Arc::new(SqliteRecordStore::open_in_memory().unwrap()),
        dir.path(),
        3,
    );

    let removed: Vec<String> = manager
        .prune(3)
        .unwrap()
        .into_iter()
        .map(|info| info.name)
        .collect();
    assert_eq!(
        removed,
        vec![
            "backup_20240101000000".to_string(),
            "backup_20240102000000".to_string()
        ]
    );

    let remaining: Vec<String> = manager
        .list()
        .unwrap()
        .into_iter()
        .map(|info| info.name)
        .collect();
    assert_eq!(
        remaining,
        vec![
            "backup_20240105000000".to_string(),
            "backup_20240104000000".to_string(),
            "backup_20240103000000".to_string()
        ]
    );

    assert!(manager.prune(3).unwrap().is_empty());
    assert_eq!(manager.list().unwrap().len(), 3);
}

#[test]
fn snapshot_applies_retention_and_orders_same_second_names() {
    let dir = tempfile::tempdir().unwrap();
    make_snapshot_dirs(
        dir.path(),
        &["backup_20200101000000", "backup_20200102000000"],
    );
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
    let manager = BackupManager::new(store, dir.path(), 2);

    let first = manager.snapshot().unwrap();
    let second = manager.snapshot().unwrap();
    assert!(!second.is_degraded());

    let names: Vec<String> = manager
        .list()
        .unwrap()
        .into_iter()
        .map(|info| info.name)
        .collect();
    assert_eq!(names, vec![second.snapshot.name.clone(), first.snapshot.name.clone()]);
    assert_eq!(first.pruned.len() + second.pruned.len(), 2);
}
