//! Workshop record facade.
//!
//! # Responsibility
//! - Provide CRUD entry points for every entity with derived fields applied.
//! - Resolve owner references inside the same write scope as the mutation.
//! - Serve the relation and statistics queries used by callers.
//!
//! # Invariants
//! - Every create/update runs validation, reference checks, derivation and
//!   the write itself in one write scope.
//! - Only leaf entities can be deleted directly; owning entities go through
//!   `CascadeService`.

use super::assigner::{insert_new, DerivedFields};
use super::{CoreError, CoreResult};
use crate::model::documents::Quote;
use crate::model::ledger::LedgerEntry;
use crate::model::vehicle::{Appointment, Vehicle};
use crate::model::work_order::{WorkOrder, WorkOrderStatus};
use crate::model::{Entity, LeafEntity, ValidationError};
use crate::store::{
    self, decode, EntityRef, ListOutcome, ReadScope, Record, RecordId, RecordStore, RefField,
    StoreResult, WriteScope,
};
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use std::sync::Arc;

/// Open/closed work order counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkOrderStats {
    pub open: usize,
    pub closed: usize,
}

impl WorkOrderStats {
    pub fn total(&self) -> usize {
        self.open + self.closed
    }
}

/// Entry point for entity CRUD over one shared store handle.
pub struct Workshop<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> Clone for Workshop<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> Workshop<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates `record` and returns it as persisted (id and derived fields set).
    pub fn create<E: DerivedFields>(&self, mut record: E) -> CoreResult<E> {
        let now = Utc::now();
        self.store.write(|scope| -> CoreResult<()> {
            create_in(scope, &mut record, now)?;
            Ok(())
        })?;
        info!(
            "event=record_create module=workshop status=ok collection={} id={}",
            E::COLLECTION,
            record.id()
        );
        Ok(record)
    }

    /// Overwrites an existing record and returns it as persisted.
    pub fn update<E: DerivedFields>(&self, mut record: E) -> CoreResult<E> {
        let now = Utc::now();
        self.store
            .write(|scope| update_in(scope, &mut record, now))
            .inspect_err(|err| {
                warn!(
                    "event=record_update module=workshop status=error collection={} id={} error={}",
                    E::COLLECTION,
                    record.id(),
                    err
                );
            })?;
        info!(
            "event=record_update module=workshop status=ok collection={} id={}",
            E::COLLECTION,
            record.id()
        );
        Ok(record)
    }

    pub fn get<E: Entity>(&self, id: RecordId) -> CoreResult<E> {
        self.store.read(|scope| store::get(scope, id).map_err(CoreError::from))
    }

    pub fn find<E: Entity>(&self, id: RecordId) -> CoreResult<Option<E>> {
        self.store.read(|scope| store::find(scope, id).map_err(CoreError::from))
    }

    /// All decodable records of a collection, in id order.
    pub fn list<E: Entity>(&self) -> CoreResult<ListOutcome<E>> {
        self.store.read(|scope| store::list(scope).map_err(CoreError::from))
    }

    pub fn count<E: Entity>(&self) -> CoreResult<usize> {
        self.store
            .read(|scope| scope.count(E::COLLECTION).map_err(CoreError::from))
    }

    /// Deletes a record that owns no dependents.
    pub fn delete_leaf<E: LeafEntity>(&self, id: RecordId) -> CoreResult<()> {
        let record = EntityRef::new(E::COLLECTION, id);
        self.store
            .write(|scope| store::delete(scope, record).map_err(CoreError::from))?;
        info!("event=record_delete module=workshop status=ok record={record}");
        Ok(())
    }

    pub fn vehicles_of_client(&self, client_id: RecordId) -> CoreResult<Vec<Vehicle>> {
        self.referencing(RefField::ClientId, client_id)
    }

    pub fn work_orders_of_vehicle(&self, vehicle_id: RecordId) -> CoreResult<Vec<WorkOrder>> {
        self.referencing(RefField::VehicleId, vehicle_id)
    }

    pub fn appointments_of_vehicle(&self, vehicle_id: RecordId) -> CoreResult<Vec<Appointment>> {
        self.referencing(RefField::VehicleId, vehicle_id)
    }

    pub fn entries_of_work_order(&self, work_order_id: RecordId) -> CoreResult<Vec<LedgerEntry>> {
        self.referencing(RefField::WorkOrderId, work_order_id)
    }

    pub fn entries_of_supplier(&self, supplier_id: RecordId) -> CoreResult<Vec<LedgerEntry>> {
        self.referencing(RefField::SupplierId, supplier_id)
    }

    /// Appointments scheduled on `date`, earliest first.
    pub fn appointments_on(&self, date: NaiveDate) -> CoreResult<Vec<Appointment>> {
        let mut appointments: Vec<Appointment> = self
            .list::<Appointment>()?
            .into_records()
            .into_iter()
            .filter(|appointment| appointment.scheduled_at.date() == date)
            .collect();
        appointments.sort_by_key(|appointment| (appointment.scheduled_at, appointment.id));
        Ok(appointments)
    }

    pub fn work_order_stats(&self) -> CoreResult<WorkOrderStats> {
        let orders = self.list::<WorkOrder>()?.into_records();
        let mut stats = WorkOrderStats::default();
        for order in orders {
            match order.status {
                WorkOrderStatus::Open => stats.open += 1,
                WorkOrderStatus::Closed => stats.closed += 1,
            }
        }
        Ok(stats)
    }

    /// Flips the accepted flag of a quote, keeping number and date.
    pub fn set_quote_accepted(&self, id: RecordId, accepted: bool) -> CoreResult<Quote> {
        let now = Utc::now();
        self.store.write(|scope| -> CoreResult<Quote> {
            let mut quote: Quote = store::get(&*scope, id)?;
            quote.accepted = accepted;
            update_in(scope, &mut quote, now)?;
            Ok(quote)
        })
    }

    fn referencing<E: Entity>(&self, field: RefField, target: RecordId) -> CoreResult<Vec<E>> {
        self.store
            .read(|scope| load_referencing(scope, field, target).map_err(CoreError::from))
    }
}

/// Validates, checks references and inserts `record` inside `scope`.
pub(crate) fn create_in<E, S>(
    scope: &mut S,
    record: &mut E,
    now: DateTime<Utc>,
) -> CoreResult<RecordId>
where
    E: DerivedFields,
    S: WriteScope + ?Sized,
{
    record.validate()?;
    check_references(&*scope, record)?;
    Ok(insert_new(scope, record, now)?)
}

/// Validates, checks references, re-derives and overwrites `record`.
pub(crate) fn update_in<E, S>(
    scope: &mut S,
    record: &mut E,
    now: DateTime<Utc>,
) -> CoreResult<()>
where
    E: DerivedFields,
    S: WriteScope + ?Sized,
{
    let stored: E = store::get(&*scope, record.id())?;
    record.validate()?;
    check_references(&*scope, record)?;
    record.rederive_on_update(&stored, now);
    store::update(scope, record)?;
    Ok(())
}

pub(crate) fn check_references<E, S>(scope: &S, record: &E) -> CoreResult<()>
where
    E: Entity,
    S: ReadScope + ?Sized,
{
    for reference in record.references() {
        let target = reference.target();
        if !scope.exists(target.collection, target.id)? {
            return Err(ValidationError::DanglingReference {
                field: reference.field,
                target,
            }
            .into());
        }
    }
    Ok(())
}

/// Records of `R`'s collection whose `field` points at `target`.
///
/// Records that cannot be decoded are skipped and logged.
pub(crate) fn load_referencing<R, S>(
    scope: &S,
    field: RefField,
    target: RecordId,
) -> StoreResult<Vec<R>>
where
    R: Record,
    S: ReadScope + ?Sized,
{
    let ids = scope.find_referencing(R::COLLECTION, field, target)?;
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(body) = scope.get_raw(R::COLLECTION, id)? else {
            continue;
        };
        match decode::<R>(id, &body) {
            Ok(record) => records.push(record),
            Err(err) => warn!(
                "event=record_decode module=workshop status=skipped collection={} id={} error={}",
                R::COLLECTION,
                id,
                err
            ),
        }
    }
    Ok(records)
}
