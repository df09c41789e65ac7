//! Ledger aggregation and entry classification.
//!
//! # Responsibility
//! - Sum income recorded against a work order.
//! - Classify new income as settlement or deposit and describe it.
//! - Describe supplier expenses from supplier name and invoice number.
//!
//! # Invariants
//! - Aggregation and insertion of a described entry share one write scope.
//! - Descriptions are stored text; later entries never rewrite them.
//! - When an entry is edited, the running sum excludes that entry.
//! - A missing owner is a dangling reference, checked before describing.

use super::workshop::{check_references, create_in, load_referencing, update_in};
use super::{CoreError, CoreResult};
use crate::model::ledger::{EntryKind, LedgerEntry};
use crate::model::party::Supplier;
use crate::model::vehicle::Vehicle;
use crate::model::work_order::WorkOrder;
use crate::model::Entity;
use crate::store::{self, ReadScope, RecordId, RecordStore, RefField};
use chrono::{Datelike, Utc};
use log::info;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Whether an income entry completes the payment of its work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    /// Paid amount reaches or exceeds the work order total.
    Settlement,
    /// Paid amount stays below the total.
    Deposit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerDescription {
    pub class: EntryClass,
    pub text: String,
}

/// Payment position of one work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkOrderBalance {
    pub total: Decimal,
    pub paid: Decimal,
    /// `total - paid`, floored at zero.
    pub outstanding: Decimal,
}

/// Income/expense sums over a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub income: Decimal,
    pub expense: Decimal,
}

impl LedgerTotals {
    pub fn net(&self) -> Decimal {
        self.income - self.expense
    }
}

pub fn settlement_text(number: &str, plate: &str) -> String {
    format!("Saldo Commessa #{number} - Targa {plate}")
}

pub fn deposit_text(number: &str, plate: &str) -> String {
    format!("Acconto Commessa #{number} - Targa {plate}")
}

pub fn supplier_expense_text(supplier: &str, invoice_number: Option<&str>) -> String {
    match invoice_number.map(str::trim).filter(|number| !number.is_empty()) {
        Some(number) => format!("Fattura {number} - {supplier}"),
        None => format!("Pagamento {supplier}"),
    }
}

/// Ledger use cases over one shared store handle.
pub struct LedgerService<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> LedgerService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Sum of income entries tagged with `work_order_id`.
    ///
    /// `excluding` leaves one entry out of the sum (the entry being edited).
    pub fn paid_so_far(
        &self,
        work_order_id: RecordId,
        excluding: Option<RecordId>,
    ) -> CoreResult<Decimal> {
        self.store.read(|scope| paid_in(scope, work_order_id, excluding))
    }

    /// Classifies an income of `new_amount` against the work order's total.
    pub fn classify_and_describe(
        &self,
        work_order_id: RecordId,
        new_amount: Decimal,
    ) -> CoreResult<LedgerDescription> {
        self.store
            .read(|scope| describe_in(scope, work_order_id, new_amount, None))
    }

    pub fn balance_of(&self, work_order_id: RecordId) -> CoreResult<WorkOrderBalance> {
        self.store.read(|scope| -> CoreResult<WorkOrderBalance> {
            let order: WorkOrder = store::get(scope, work_order_id)?;
            let paid = paid_in(scope, work_order_id, None)?;
            Ok(WorkOrderBalance {
                total: order.total,
                paid,
                outstanding: (order.total - paid).max(Decimal::ZERO),
            })
        })
    }

    /// Income and expense totals of entries dated in `year`.
    pub fn totals_for_year(&self, year: i32) -> CoreResult<LedgerTotals> {
        let entries = self
            .store
            .read(|scope| store::list::<LedgerEntry, _>(scope).map_err(CoreError::from))?
            .into_records();
        let mut totals = LedgerTotals::default();
        for entry in entries.iter().filter(|entry| entry.date.year() == year) {
            match entry.kind {
                EntryKind::Income => totals.income += entry.amount,
                EntryKind::Expense => totals.expense += entry.amount,
            }
        }
        Ok(totals)
    }

    /// Creates an entry with its description derived from its owner.
    ///
    /// Entries without an owner keep the caller's description.
    pub fn record_entry(&self, mut entry: LedgerEntry) -> CoreResult<LedgerEntry> {
        let now = Utc::now();
        self.store.write(|scope| -> CoreResult<()> {
            entry.validate()?;
            check_references(&*scope, &entry)?;
            apply_description(&*scope, &mut entry, None)?;
            create_in(scope, &mut entry, now)?;
            Ok(())
        })?;
        info!(
            "event=ledger_record module=ledger status=ok id={} kind={:?}",
            entry.id, entry.kind
        );
        Ok(entry)
    }

    /// Rewrites an existing entry, re-deriving its description.
    pub fn update_entry(&self, mut entry: LedgerEntry) -> CoreResult<LedgerEntry> {
        let now = Utc::now();
        let id = entry.id;
        self.store.write(|scope| -> CoreResult<()> {
            entry.validate()?;
            check_references(&*scope, &entry)?;
            apply_description(&*scope, &mut entry, Some(id))?;
            update_in(scope, &mut entry, now)
        })?;
        info!("event=ledger_update module=ledger status=ok id={id}");
        Ok(entry)
    }
}

fn paid_in<S: ReadScope + ?Sized>(
    scope: &S,
    work_order_id: RecordId,
    excluding: Option<RecordId>,
) -> CoreResult<Decimal> {
    let entries: Vec<LedgerEntry> = load_referencing(scope, RefField::WorkOrderId, work_order_id)?;
    Ok(entries
        .iter()
        .filter(|entry| entry.kind == EntryKind::Income)
        .filter(|entry| Some(entry.id) != excluding)
        .map(|entry| entry.amount)
        .sum())
}

fn describe_in<S: ReadScope + ?Sized>(
    scope: &S,
    work_order_id: RecordId,
    new_amount: Decimal,
    excluding: Option<RecordId>,
) -> CoreResult<LedgerDescription> {
    let order: WorkOrder = store::get(scope, work_order_id)?;
    let plate = store::find::<Vehicle, _>(scope, order.vehicle_id)?
        .map(|vehicle| vehicle.plate)
        .unwrap_or_default();
    let paid = paid_in(scope, work_order_id, excluding)?;

    let description = if paid + new_amount >= order.total {
        LedgerDescription {
            class: EntryClass::Settlement,
            text: settlement_text(&order.number, &plate),
        }
    } else {
        LedgerDescription {
            class: EntryClass::Deposit,
            text: deposit_text(&order.number, &plate),
        }
    };
    Ok(description)
}

fn apply_description<S: ReadScope + ?Sized>(
    scope: &S,
    entry: &mut LedgerEntry,
    excluding: Option<RecordId>,
) -> CoreResult<()> {
    match (entry.kind, entry.work_order_id, entry.supplier_id) {
        (EntryKind::Income, Some(work_order_id), _) if work_order_id > 0 => {
            entry.description =
                describe_in(scope, work_order_id, entry.amount, excluding)?.text;
        }
        (EntryKind::Expense, _, Some(supplier_id)) if supplier_id > 0 => {
            let supplier: Supplier = store::get(scope, supplier_id)?;
            entry.description =
                supplier_expense_text(&supplier.business_name, entry.invoice_number.as_deref());
        }
        _ => {}
    }
    Ok(())
}
