//! Vehicles and workshop appointments.

use super::{impl_record, reference, require, Entity, LeafEntity, Reference, ValidationError};
use crate::store::{Collection, RecordId, RefField};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(default)]
    pub id: RecordId,
    pub plate: String,
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub year: i32,
    /// Owning client.
    pub client_id: RecordId,
    #[serde(default)]
    pub mileage_km: u32,
    #[serde(default)]
    pub last_inspection: Option<NaiveDate>,
}

impl Vehicle {
    pub fn new(client_id: RecordId, plate: impl Into<String>, make: impl Into<String>) -> Self {
        Self {
            id: 0,
            plate: plate.into(),
            make: make.into(),
            model: String::new(),
            year: 0,
            client_id,
            mileage_km: 0,
            last_inspection: None,
        }
    }

    /// Human-facing label, e.g. `Fiat Panda (AB123CD)`.
    pub fn label(&self) -> String {
        if self.model.is_empty() {
            format!("{} ({})", self.make, self.plate)
        } else {
            format!("{} {} ({})", self.make, self.model, self.plate)
        }
    }
}

impl_record!(Vehicle, Collection::Vehicles);

impl Entity for Vehicle {
    fn validate(&self) -> Result<(), ValidationError> {
        require(RefField::ClientId, self.client_id)
    }

    fn references(&self) -> Vec<Reference> {
        reference(RefField::ClientId, Some(self.client_id))
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    #[serde(default)]
    pub id: RecordId,
    /// Workshop wall-clock time of the appointment.
    pub scheduled_at: NaiveDateTime,
    pub vehicle_id: RecordId,
    #[serde(default)]
    pub note: String,
}

impl Appointment {
    pub fn new(vehicle_id: RecordId, scheduled_at: NaiveDateTime, note: impl Into<String>) -> Self {
        Self {
            id: 0,
            scheduled_at,
            vehicle_id,
            note: note.into(),
        }
    }
}

impl_record!(Appointment, Collection::Appointments);

impl Entity for Appointment {
    fn validate(&self) -> Result<(), ValidationError> {
        require(RefField::VehicleId, self.vehicle_id)
    }

    fn references(&self) -> Vec<Reference> {
        reference(RefField::VehicleId, Some(self.vehicle_id))
            .into_iter()
            .collect()
    }
}

impl LeafEntity for Appointment {}

#[cfg(test)]
mod tests {
    use super::Vehicle;
    use crate::model::{Entity, ValidationError};
    use crate::store::RefField;

    #[test]
    fn vehicle_requires_owner() {
        let vehicle = Vehicle::new(0, "AB123CD", "Fiat");
        assert_eq!(
            vehicle.validate(),
            Err(ValidationError::MissingReference(RefField::ClientId))
        );
    }

    #[test]
    fn label_omits_missing_model() {
        let mut vehicle = Vehicle::new(1, "AB123CD", "Fiat");
        assert_eq!(vehicle.label(), "Fiat (AB123CD)");
        vehicle.model = "Panda".to_string();
        assert_eq!(vehicle.label(), "Fiat Panda (AB123CD)");
    }
}
