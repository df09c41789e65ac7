//! Work orders ("commesse").
//!
//! # Invariants
//! - `total == labor_cost + parts_cost` after every create and update.
//! - `closed_at` is set iff `status == Closed`.

use super::{impl_record, reference, require, Entity, Reference, ValidationError};
use crate::store::{Collection, RecordId, RefField};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    #[default]
    Open,
    Closed,
}

impl WorkOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    #[serde(default)]
    pub id: RecordId,
    /// Business number (`COM-0001`), assigned on create.
    #[serde(default)]
    pub number: String,
    pub vehicle_id: RecordId,
    #[serde(default = "Utc::now")]
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: WorkOrderStatus,
    #[serde(default)]
    pub work_performed: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub labor_cost: Decimal,
    #[serde(default)]
    pub parts_cost: Decimal,
    /// Derived; any caller-supplied value is overwritten.
    #[serde(default)]
    pub total: Decimal,
}

impl WorkOrder {
    pub fn new(vehicle_id: RecordId, labor_cost: Decimal, parts_cost: Decimal) -> Self {
        Self {
            id: 0,
            number: String::new(),
            vehicle_id,
            opened_at: Utc::now(),
            closed_at: None,
            status: WorkOrderStatus::Open,
            work_performed: String::new(),
            notes: String::new(),
            labor_cost,
            parts_cost,
            total: labor_cost + parts_cost,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == WorkOrderStatus::Closed
    }

    pub fn computed_total(&self) -> Decimal {
        self.labor_cost + self.parts_cost
    }
}

impl_record!(WorkOrder, Collection::WorkOrders);

impl Entity for WorkOrder {
    fn validate(&self) -> Result<(), ValidationError> {
        require(RefField::VehicleId, self.vehicle_id)?;
        if self.labor_cost < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount("labor_cost"));
        }
        if self.parts_cost < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount("parts_cost"));
        }
        Ok(())
    }

    fn references(&self) -> Vec<Reference> {
        reference(RefField::VehicleId, Some(self.vehicle_id))
            .into_iter()
            .collect()
    }
}
