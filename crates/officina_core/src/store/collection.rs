//! Collection names and cross-collection record references.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Internal numeric record key. Assigned values start at 1; 0 means "unassigned".
pub type RecordId = i64;

/// Named record collection in the workshop store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Clients,
    Suppliers,
    Vehicles,
    WorkOrders,
    LedgerEntries,
    Appointments,
    Quotes,
    Invoices,
    Operators,
}

impl Collection {
    /// Every collection, in export order.
    pub const ALL: [Collection; 9] = [
        Collection::Clients,
        Collection::Suppliers,
        Collection::Vehicles,
        Collection::WorkOrders,
        Collection::LedgerEntries,
        Collection::Appointments,
        Collection::Quotes,
        Collection::Invoices,
        Collection::Operators,
    ];

    /// Stable storage name, also used as the snapshot file stem.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::Suppliers => "suppliers",
            Self::Vehicles => "vehicles",
            Self::WorkOrders => "work_orders",
            Self::LedgerEntries => "ledger_entries",
            Self::Appointments => "appointments",
            Self::Quotes => "quotes",
            Self::Invoices => "invoices",
            Self::Operators => "operators",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == value)
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully-qualified pointer to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityRef {
    pub collection: Collection,
    pub id: RecordId,
}

impl EntityRef {
    pub fn new(collection: Collection, id: RecordId) -> Self {
        Self { collection, id }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Owner reference fields that link records across collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefField {
    ClientId,
    VehicleId,
    WorkOrderId,
    SupplierId,
}

impl RefField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientId => "client_id",
            Self::VehicleId => "vehicle_id",
            Self::WorkOrderId => "work_order_id",
            Self::SupplierId => "supplier_id",
        }
    }

    /// Collection the field points into.
    pub fn target(self) -> Collection {
        match self {
            Self::ClientId => Collection::Clients,
            Self::VehicleId => Collection::Vehicles,
            Self::WorkOrderId => Collection::WorkOrders,
            Self::SupplierId => Collection::Suppliers,
        }
    }
}

/// Lenient projection of a record body onto its owner references only.
///
/// Used where a full decode is not needed (cascade discovery), so a record
/// with an unrelated malformed field is still found through its references.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct OwnerRefs {
    #[serde(default)]
    pub client_id: Option<RecordId>,
    #[serde(default)]
    pub vehicle_id: Option<RecordId>,
    #[serde(default)]
    pub work_order_id: Option<RecordId>,
    #[serde(default)]
    pub supplier_id: Option<RecordId>,
}

impl OwnerRefs {
    pub fn get(&self, field: RefField) -> Option<RecordId> {
        match field {
            RefField::ClientId => self.client_id,
            RefField::VehicleId => self.vehicle_id,
            RefField::WorkOrderId => self.work_order_id,
            RefField::SupplierId => self.supplier_id,
        }
    }
}
