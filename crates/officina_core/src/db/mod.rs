//! Workshop database file: opening, pragmas, and schema versioning.
//!
//! # Responsibility
//! - Hand out connections to the record store file with the schema current.
//! - Describe why a file cannot be used as a record store.
//!
//! # Invariants
//! - No record is read or written on a connection before its migrations
//!   have been applied.
//! - A file stamped by a newer build is refused instead of being migrated
//!   backwards.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The directory holding the database file could not be created.
    CreateDir { path: PathBuf, source: io::Error },
    /// The file was stamped by a build with more migrations than this one.
    SchemaTooNew { found: u32, supported: u32 },
    /// The connection is reachable but lacks the record store tables.
    SchemaMismatch(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "record database error: {err}"),
            Self::CreateDir { path, source } => write!(
                f,
                "cannot create database directory {}: {source}",
                path.display()
            ),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "record database is at schema {found}, this build knows up to {supported}"
            ),
            Self::SchemaMismatch(message) => {
                write!(f, "file is not a usable record database: {message}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::CreateDir { source, .. } => Some(source),
            Self::SchemaTooNew { .. } | Self::SchemaMismatch(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
