//! Clients and suppliers.

use super::{impl_record, Entity};
use crate::store::{Collection, RecordId};
use serde::{Deserialize, Serialize};

/// Registry and contact data shared by clients and suppliers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactDetails {
    pub phone: String,
    pub email: String,
    /// Certified e-mail address.
    pub pec: String,
    pub tax_code: String,
    pub vat_number: String,
    /// E-invoicing recipient code.
    pub recipient_code: String,
    pub address: String,
    pub postal_code: String,
    pub city: String,
    pub province: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    #[serde(default)]
    pub id: RecordId,
    pub business_name: String,
    #[serde(flatten)]
    pub contact: ContactDetails,
}

impl Client {
    pub fn new(business_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            business_name: business_name.into(),
            contact: ContactDetails::default(),
        }
    }
}

impl_record!(Client, Collection::Clients);
impl Entity for Client {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    #[serde(default)]
    pub id: RecordId,
    pub business_name: String,
    #[serde(flatten)]
    pub contact: ContactDetails,
}

impl Supplier {
    pub fn new(business_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            business_name: business_name.into(),
            contact: ContactDetails::default(),
        }
    }
}

impl_record!(Supplier, Collection::Suppliers);
impl Entity for Supplier {}
