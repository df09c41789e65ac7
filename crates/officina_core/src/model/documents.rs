//! Standalone documents: quotes, invoices, operators.

use super::{impl_record, reference, Entity, LeafEntity, Reference, ValidationError};
use crate::store::{Collection, RecordId, RefField};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quote ("preventivo"). Number and date are fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default)]
    pub number: String,
    pub client_name: String,
    #[serde(default = "Utc::now")]
    pub date: DateTime<Utc>,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub accepted: bool,
}

impl Quote {
    pub fn new(client_name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: 0,
            number: String::new(),
            client_name: client_name.into(),
            date: Utc::now(),
            amount,
            description: String::new(),
            accepted: false,
        }
    }
}

impl_record!(Quote, Collection::Quotes);

impl Entity for Quote {
    fn validate(&self) -> Result<(), ValidationError> {
        non_negative("amount", self.amount)
    }
}

impl LeafEntity for Quote {}

/// Issued invoice. The number embeds the year of `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default)]
    pub number: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub client_id: Option<RecordId>,
    pub amount: Decimal,
}

impl Invoice {
    pub fn new(date: NaiveDate, amount: Decimal) -> Self {
        Self {
            id: 0,
            number: String::new(),
            date,
            client_id: None,
            amount,
        }
    }

    pub fn for_client(mut self, client_id: RecordId) -> Self {
        self.client_id = Some(client_id);
        self
    }
}

impl_record!(Invoice, Collection::Invoices);

impl Entity for Invoice {
    fn validate(&self) -> Result<(), ValidationError> {
        non_negative("amount", self.amount)
    }

    fn references(&self) -> Vec<Reference> {
        reference(RefField::ClientId, self.client_id)
            .into_iter()
            .collect()
    }
}

impl LeafEntity for Invoice {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    #[serde(default)]
    pub id: RecordId,
    pub badge: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: String,
}

impl Operator {
    pub fn new(
        badge: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            badge: badge.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role: String::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl_record!(Operator, Collection::Operators);
impl Entity for Operator {}
impl LeafEntity for Operator {}

fn non_negative(field: &'static str, amount: Decimal) -> Result<(), ValidationError> {
    if amount < Decimal::ZERO {
        Err(ValidationError::NegativeAmount(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Invoice, Quote};
    use crate::model::{Entity, ValidationError};
    use crate::store::RefField;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    #[test]
    fn negative_quote_amount_is_rejected() {
        let quote = Quote::new("Rossi", Decimal::new(-500, 2));
        assert_eq!(quote.validate(), Err(ValidationError::NegativeAmount("amount")));
    }

    #[test]
    fn invoice_client_is_an_optional_reference() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let anonymous = Invoice::new(date, Decimal::TEN);
        assert!(anonymous.references().is_empty());

        let billed = anonymous.for_client(4);
        let refs = billed.references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].field, RefField::ClientId);
        assert_eq!(refs[0].id, 4);
    }
}
