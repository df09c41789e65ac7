//! Cascade delete engine.
//!
//! # Responsibility
//! - Remove an owning entity together with everything it owns.
//! - Report how many records were removed per level.
//!
//! # Invariants
//! - Discovery and deletion run in one write scope: either every dependent
//!   and the root are removed, or nothing is.
//! - Deletion order is bottom-up (ledger entries, work orders, appointments,
//!   vehicles, root) so no committed state ever holds a dangling owner.
//! - Supplier deletion only reaches ledger entries tagged with that supplier.
//! - Invoices billed to a deleted client are kept and detached from it.

use super::{CoreError, CoreResult};
use crate::model::documents::Invoice;
use crate::store::{
    self, Collection, EntityRef, ReadScope, RecordId, RecordStore, RefField, WriteScope,
};
use log::{error, info};
use std::sync::Arc;

/// Root of a cascade delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwningEntity {
    Client(RecordId),
    Vehicle(RecordId),
    WorkOrder(RecordId),
    Supplier(RecordId),
}

impl OwningEntity {
    pub fn root(self) -> EntityRef {
        match self {
            Self::Client(id) => EntityRef::new(Collection::Clients, id),
            Self::Vehicle(id) => EntityRef::new(Collection::Vehicles, id),
            Self::WorkOrder(id) => EntityRef::new(Collection::WorkOrders, id),
            Self::Supplier(id) => EntityRef::new(Collection::Suppliers, id),
        }
    }
}

/// Per-level removal counts. The root itself is not counted in any level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeReport {
    pub root: EntityRef,
    pub vehicles: usize,
    pub work_orders: usize,
    pub appointments: usize,
    pub ledger_entries: usize,
    /// Invoices whose client reference was cleared.
    pub detached_invoices: usize,
}

impl CascadeReport {
    /// Records removed including the root.
    pub fn total_removed(&self) -> usize {
        1 + self.vehicles + self.work_orders + self.appointments + self.ledger_entries
    }
}

#[derive(Debug)]
struct CascadePlan {
    root: EntityRef,
    vehicles: Vec<RecordId>,
    work_orders: Vec<RecordId>,
    appointments: Vec<RecordId>,
    ledger_entries: Vec<RecordId>,
    detached_invoices: Vec<RecordId>,
}

impl CascadePlan {
    fn new(root: EntityRef) -> Self {
        Self {
            root,
            vehicles: Vec::new(),
            work_orders: Vec::new(),
            appointments: Vec::new(),
            ledger_entries: Vec::new(),
            detached_invoices: Vec::new(),
        }
    }

    fn report(&self) -> CascadeReport {
        CascadeReport {
            root: self.root,
            vehicles: self.vehicles.len(),
            work_orders: self.work_orders.len(),
            appointments: self.appointments.len(),
            ledger_entries: self.ledger_entries.len(),
            detached_invoices: self.detached_invoices.len(),
        }
    }

    fn add_vehicle<S: ReadScope + ?Sized>(
        &mut self,
        scope: &S,
        vehicle_id: RecordId,
    ) -> CoreResult<()> {
        self.appointments.extend(scope.find_referencing(
            Collection::Appointments,
            RefField::VehicleId,
            vehicle_id,
        )?);
        for work_order_id in
            scope.find_referencing(Collection::WorkOrders, RefField::VehicleId, vehicle_id)?
        {
            self.add_work_order(scope, work_order_id)?;
        }
        Ok(())
    }

    fn add_work_order<S: ReadScope + ?Sized>(
        &mut self,
        scope: &S,
        work_order_id: RecordId,
    ) -> CoreResult<()> {
        self.work_orders.push(work_order_id);
        self.ledger_entries.extend(scope.find_referencing(
            Collection::LedgerEntries,
            RefField::WorkOrderId,
            work_order_id,
        )?);
        Ok(())
    }
}

fn discover<S: ReadScope + ?Sized>(scope: &S, owner: OwningEntity) -> CoreResult<CascadePlan> {
    let root = owner.root();
    if !scope.exists(root.collection, root.id)? {
        return Err(CoreError::NotFound(root));
    }

    let mut plan = CascadePlan::new(root);
    match owner {
        OwningEntity::Client(client_id) => {
            for vehicle_id in
                scope.find_referencing(Collection::Vehicles, RefField::ClientId, client_id)?
            {
                plan.vehicles.push(vehicle_id);
                plan.add_vehicle(scope, vehicle_id)?;
            }
            plan.detached_invoices =
                scope.find_referencing(Collection::Invoices, RefField::ClientId, client_id)?;
        }
        OwningEntity::Vehicle(vehicle_id) => plan.add_vehicle(scope, vehicle_id)?,
        OwningEntity::WorkOrder(work_order_id) => {
            plan.ledger_entries.extend(scope.find_referencing(
                Collection::LedgerEntries,
                RefField::WorkOrderId,
                work_order_id,
            )?);
        }
        OwningEntity::Supplier(supplier_id) => {
            plan.ledger_entries.extend(scope.find_referencing(
                Collection::LedgerEntries,
                RefField::SupplierId,
                supplier_id,
            )?);
        }
    }
    Ok(plan)
}

fn execute<S: WriteScope + ?Sized>(scope: &mut S, plan: &CascadePlan) -> CoreResult<()> {
    for id in &plan.detached_invoices {
        let mut invoice: Invoice = store::get(&*scope, *id)?;
        invoice.client_id = None;
        store::update(scope, &invoice)?;
    }

    let levels = [
        (Collection::LedgerEntries, &plan.ledger_entries),
        (Collection::WorkOrders, &plan.work_orders),
        (Collection::Appointments, &plan.appointments),
        (Collection::Vehicles, &plan.vehicles),
    ];
    for (collection, ids) in levels {
        for id in ids {
            store::delete(scope, EntityRef::new(collection, *id))?;
        }
    }
    store::delete(scope, plan.root)?;
    Ok(())
}

/// Cascade delete entry points over one shared store handle.
pub struct CascadeService<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> CascadeService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Computes what `delete` would remove, without removing anything.
    pub fn preview(&self, owner: OwningEntity) -> CoreResult<CascadeReport> {
        self.store
            .read(|scope| discover(scope, owner).map(|plan| plan.report()))
    }

    /// Deletes `owner` and all of its dependents atomically.
    ///
    /// # Errors
    /// - `NotFound` when the root does not exist.
    /// - `CascadeFailure` for any other failure; the store is left unchanged.
    pub fn delete(&self, owner: OwningEntity) -> CoreResult<CascadeReport> {
        let root = owner.root();
        let result = self.store.write(|scope| -> CoreResult<CascadeReport> {
            let plan = discover(&*scope, owner)?;
            execute(scope, &plan)?;
            Ok(plan.report())
        });

        match result {
            Ok(report) => {
                info!(
                    "event=cascade_delete module=cascade status=ok root={} vehicles={} work_orders={} appointments={} ledger_entries={} detached_invoices={}",
                    root,
                    report.vehicles,
                    report.work_orders,
                    report.appointments,
                    report.ledger_entries,
                    report.detached_invoices
                );
                Ok(report)
            }
            Err(CoreError::NotFound(missing)) if missing == root => Err(CoreError::NotFound(root)),
            Err(err) => {
                error!("event=cascade_delete module=cascade status=error root={root} error={err}");
                Err(CoreError::CascadeFailure {
                    root,
                    source: Box::new(err),
                })
            }
        }
    }

    pub fn delete_client(&self, id: RecordId) -> CoreResult<CascadeReport> {
        self.delete(OwningEntity::Client(id))
    }

    pub fn delete_vehicle(&self, id: RecordId) -> CoreResult<CascadeReport> {
        self.delete(OwningEntity::Vehicle(id))
    }

    pub fn delete_work_order(&self, id: RecordId) -> CoreResult<CascadeReport> {
        self.delete(OwningEntity::WorkOrder(id))
    }

    pub fn delete_supplier(&self, id: RecordId) -> CoreResult<CascadeReport> {
        self.delete(OwningEntity::Supplier(id))
    }
}

#[cfg(test)]
mod tests {
    use super::{CascadeService, OwningEntity};
    use crate::model::party::Client;
    use crate::model::vehicle::Vehicle;
    use crate::service::workshop::Workshop;
    use crate::service::CoreError;
    use crate::store::MemoryRecordStore;
    use std::sync::Arc;

    #[test]
    fn missing_root_is_not_found() {
        let cascade = CascadeService::new(Arc::new(MemoryRecordStore::new()));
        let err = cascade.delete_client(3).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(root) if root == OwningEntity::Client(3).root()));
    }

    #[test]
    fn preview_counts_without_deleting() {
        let store = Arc::new(MemoryRecordStore::new());
        let workshop = Workshop::new(Arc::clone(&store));
        let client = workshop.create(Client::new("Rossi")).unwrap();
        workshop
            .create(Vehicle::new(client.id, "AB123CD", "Fiat"))
            .unwrap();

        let cascade = CascadeService::new(store);
        let report = cascade.preview(OwningEntity::Client(client.id)).unwrap();
        assert_eq!(report.vehicles, 1);
        assert_eq!(report.total_removed(), 2);
        assert_eq!(workshop.count::<Vehicle>().unwrap(), 1);
    }
}
