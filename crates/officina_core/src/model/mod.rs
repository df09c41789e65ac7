//! Workshop domain records.
//!
//! # Responsibility
//! - Define the typed documents stored in each collection.
//! - Declare structural invariants and owner references per entity.
//!
//! # Invariants
//! - Every entity is identified by a `RecordId` assigned by the store.
//! - Owner references are explicit fields, checked by the service layer
//!   (the store itself has no foreign keys).
//! - Content rules for human input (required names, plate formats) belong
//!   to callers and are not re-checked here.

use crate::store::{EntityRef, Record, RecordId, RefField};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod documents;
pub mod ledger;
pub mod party;
pub mod vehicle;
pub mod work_order;

/// Structural validation failure for a record about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required owner reference was left unassigned.
    MissingReference(RefField),
    /// An owner reference points to a record that does not exist.
    DanglingReference { field: RefField, target: EntityRef },
    /// Ledger amounts must be strictly positive.
    NonPositiveAmount,
    /// Monetary field must not be negative.
    NegativeAmount(&'static str),
    /// Ledger entry linked to both a work order and a supplier.
    ConflictingOwners,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingReference(field) => {
                write!(f, "required reference `{}` is missing", field.as_str())
            }
            Self::DanglingReference { field, target } => {
                write!(f, "reference `{}` points to missing record {target}", field.as_str())
            }
            Self::NonPositiveAmount => write!(f, "amount must be greater than zero"),
            Self::NegativeAmount(field) => write!(f, "`{field}` must not be negative"),
            Self::ConflictingOwners => {
                write!(f, "ledger entry cannot belong to both a work order and a supplier")
            }
        }
    }
}

impl Error for ValidationError {}

/// Owner reference carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub field: RefField,
    pub id: RecordId,
}

impl Reference {
    pub fn target(&self) -> EntityRef {
        EntityRef::new(self.field.target(), self.id)
    }
}

/// A record with structural rules and owner references.
pub trait Entity: Record {
    /// Checks structural invariants that do not need the store.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Owner references that must resolve at write time.
    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }
}

/// Marker for entities that own no dependents and may be deleted directly.
pub trait LeafEntity: Entity {}

pub(crate) fn require(field: RefField, id: RecordId) -> Result<(), ValidationError> {
    if id > 0 {
        Ok(())
    } else {
        Err(ValidationError::MissingReference(field))
    }
}

pub(crate) fn reference(field: RefField, id: Option<RecordId>) -> Option<Reference> {
    id.filter(|id| *id > 0).map(|id| Reference { field, id })
}

macro_rules! impl_record {
    ($ty:ty, $collection:expr) => {
        impl $crate::store::Record for $ty {
            const COLLECTION: $crate::store::Collection = $collection;

            fn id(&self) -> $crate::store::RecordId {
                self.id
            }

            fn set_id(&mut self, id: $crate::store::RecordId) {
                self.id = id;
            }
        }
    };
}

pub(crate) use impl_record;
