//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate record-store scopes into workshop use cases.
//! - Own derived fields, reference checks, cascades and ledger aggregation.
//! - Keep callers decoupled from storage details.

use crate::model::ValidationError;
use crate::store::{EntityRef, StoreError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod assigner;
pub mod cascade;
pub mod ledger;
pub mod workshop;

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by core services.
#[derive(Debug)]
pub enum CoreError {
    /// Target record does not exist.
    NotFound(EntityRef),
    /// Record failed structural or reference checks.
    Validation(ValidationError),
    /// Cascade delete aborted; nothing was removed.
    CascadeFailure {
        root: EntityRef,
        source: Box<CoreError>,
    },
    /// Infrastructure failure propagated from the store.
    Store(StoreError),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(record) => write!(f, "record not found: {record}"),
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::CascadeFailure { root, source } => {
                write!(f, "cascade delete of {root} failed: {source}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::CascadeFailure { source, .. } => Some(source.as_ref()),
            Self::Store(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(record) => Self::NotFound(record),
            other => Self::Store(other),
        }
    }
}

impl From<ValidationError> for CoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::CoreError;
    use crate::store::{Collection, EntityRef, StoreError};

    #[test]
    fn store_not_found_maps_to_core_not_found() {
        let record = EntityRef::new(Collection::Vehicles, 9);
        let err = CoreError::from(StoreError::NotFound(record));
        assert!(matches!(err, CoreError::NotFound(found) if found == record));
    }

    #[test]
    fn other_store_errors_stay_infrastructure() {
        let err = CoreError::from(StoreError::LockPoisoned("memory store"));
        assert!(matches!(err, CoreError::Store(_)));
    }
}
