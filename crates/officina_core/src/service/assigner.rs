//! Identifier and derived-field assignment.
//!
//! # Responsibility
//! - Hand out record identifiers on create.
//! - Compute business-visible fields (document numbers, totals, status
//!   timestamps) on create and update.
//!
//! # Invariants
//! - Document numbers use the record identifier as their sequence and are
//!   never regenerated after creation.
//! - `WorkOrder.total` is recomputed on every write.
//! - `closed_at` is stamped once per closed period and cleared on reopen.

use crate::model::documents::{Invoice, Operator, Quote};
use crate::model::ledger::LedgerEntry;
use crate::model::party::{Client, Supplier};
use crate::model::vehicle::{Appointment, Vehicle};
use crate::model::work_order::{WorkOrder, WorkOrderStatus};
use crate::model::Entity;
use crate::store::{encode, RecordId, StoreResult, WriteScope};
use chrono::{DateTime, Datelike, Utc};

/// Work order number, e.g. `COM-0007`.
pub fn work_order_number(sequence: RecordId) -> String {
    format!("COM-{sequence:04}")
}

/// Invoice number, e.g. `FT-0012/2024`.
pub fn invoice_number(sequence: RecordId, year: i32) -> String {
    format!("FT-{sequence:04}/{year}")
}

/// Quote number, e.g. `PREV-0003`.
pub fn quote_number(sequence: RecordId) -> String {
    format!("PREV-{sequence:04}")
}

/// Fields the core derives instead of trusting the caller.
pub trait DerivedFields: Entity {
    /// Called once the identifier is assigned, before the first write.
    fn stamp_on_create(&mut self, _now: DateTime<Utc>) {}

    /// Called before overwriting `stored` with `self`.
    fn rederive_on_update(&mut self, _stored: &Self, _now: DateTime<Utc>) {}
}

impl DerivedFields for WorkOrder {
    fn stamp_on_create(&mut self, now: DateTime<Utc>) {
        self.opened_at = now;
        self.number = work_order_number(self.id);
        self.total = self.computed_total();
        self.closed_at = match self.status {
            WorkOrderStatus::Closed => Some(now),
            WorkOrderStatus::Open => None,
        };
    }

    fn rederive_on_update(&mut self, stored: &Self, now: DateTime<Utc>) {
        self.number = stored.number.clone();
        self.opened_at = stored.opened_at;
        self.total = self.computed_total();
        self.closed_at = match self.status {
            WorkOrderStatus::Closed => self.closed_at.or(stored.closed_at).or(Some(now)),
            WorkOrderStatus::Open => None,
        };
    }
}

impl DerivedFields for Invoice {
    fn stamp_on_create(&mut self, _now: DateTime<Utc>) {
        self.number = invoice_number(self.id, self.date.year());
    }

    fn rederive_on_update(&mut self, stored: &Self, _now: DateTime<Utc>) {
        self.number = stored.number.clone();
    }
}

impl DerivedFields for Quote {
    fn stamp_on_create(&mut self, now: DateTime<Utc>) {
        self.number = quote_number(self.id);
        self.date = now;
        self.accepted = false;
    }

    fn rederive_on_update(&mut self, stored: &Self, _now: DateTime<Utc>) {
        self.number = stored.number.clone();
        self.date = stored.date;
    }
}

impl DerivedFields for Client {}
impl DerivedFields for Supplier {}
impl DerivedFields for Vehicle {}
impl DerivedFields for Appointment {}
impl DerivedFields for LedgerEntry {}
impl DerivedFields for Operator {}

/// Allocates an identifier, derives fields and inserts `record`.
pub(crate) fn insert_new<E, S>(
    scope: &mut S,
    record: &mut E,
    now: DateTime<Utc>,
) -> StoreResult<RecordId>
where
    E: DerivedFields,
    S: WriteScope + ?Sized,
{
    let id = scope.next_id(E::COLLECTION)?;
    record.set_id(id);
    record.stamp_on_create(now);
    scope.put_raw(E::COLLECTION, id, &encode(record)?)?;
    Ok(id)
}
