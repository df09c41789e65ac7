//! Cash-ledger ("prima nota") entries.

use super::{impl_record, reference, Entity, LeafEntity, Reference, ValidationError};
use crate::store::{Collection, RecordId, RefField};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Bank,
    Card,
    Check,
    Transfer,
}

/// One ledger movement. `amount` is always positive; `kind` carries the sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(default)]
    pub id: RecordId,
    pub date: NaiveDate,
    pub kind: EntryKind,
    pub amount: Decimal,
    #[serde(default)]
    pub method: PaymentMethod,
    #[serde(default)]
    pub work_order_id: Option<RecordId>,
    #[serde(default)]
    pub supplier_id: Option<RecordId>,
    /// External (supplier) invoice number.
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

impl LedgerEntry {
    pub fn income(date: NaiveDate, amount: Decimal, method: PaymentMethod) -> Self {
        Self::new(date, EntryKind::Income, amount, method)
    }

    pub fn expense(date: NaiveDate, amount: Decimal, method: PaymentMethod) -> Self {
        Self::new(date, EntryKind::Expense, amount, method)
    }

    fn new(date: NaiveDate, kind: EntryKind, amount: Decimal, method: PaymentMethod) -> Self {
        Self {
            id: 0,
            date,
            kind,
            amount,
            method,
            work_order_id: None,
            supplier_id: None,
            invoice_number: None,
            invoice_date: None,
            description: String::new(),
        }
    }

    pub fn for_work_order(mut self, work_order_id: RecordId) -> Self {
        self.work_order_id = Some(work_order_id);
        self
    }

    pub fn for_supplier(mut self, supplier_id: RecordId) -> Self {
        self.supplier_id = Some(supplier_id);
        self
    }

    pub fn with_invoice(mut self, number: impl Into<String>, date: Option<NaiveDate>) -> Self {
        self.invoice_number = Some(number.into());
        self.invoice_date = date;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Amount with the sign implied by `kind`.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Income => self.amount,
            EntryKind::Expense => -self.amount,
        }
    }
}

impl_record!(LedgerEntry, Collection::LedgerEntries);

impl Entity for LedgerEntry {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount);
        }
        let owners = self.references();
        if owners.len() > 1 {
            return Err(ValidationError::ConflictingOwners);
        }
        Ok(())
    }

    fn references(&self) -> Vec<Reference> {
        reference(RefField::WorkOrderId, self.work_order_id)
            .into_iter()
            .chain(reference(RefField::SupplierId, self.supplier_id))
            .collect()
    }
}

impl LeafEntity for LedgerEntry {}

#[cfg(test)]
mod tests {
    use super::{LedgerEntry, PaymentMethod};
    use crate::model::{Entity, ValidationError};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn zero_amount_is_rejected() {
        let entry = LedgerEntry::income(day(), Decimal::ZERO, PaymentMethod::Cash);
        assert_eq!(entry.validate(), Err(ValidationError::NonPositiveAmount));
    }

    #[test]
    fn entry_cannot_have_two_owners() {
        let entry = LedgerEntry::expense(day(), Decimal::ONE, PaymentMethod::Bank)
            .for_work_order(1)
            .for_supplier(2);
        assert_eq!(entry.validate(), Err(ValidationError::ConflictingOwners));
    }

    #[test]
    fn unassigned_owner_ids_are_not_references() {
        let mut entry = LedgerEntry::income(day(), Decimal::ONE, PaymentMethod::Card);
        entry.work_order_id = Some(0);
        assert!(entry.references().is_empty());
        assert_eq!(entry.signed_amount(), Decimal::ONE);
    }
}
