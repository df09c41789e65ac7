//! Point-in-time snapshots and retention.
//!
//! # Responsibility
//! - Export every collection of a store into a timestamped directory.
//! - Keep at most a configured number of snapshots.
//! - Restore a snapshot back into a live store.
//!
//! # Invariants
//! - A snapshot directory only appears under its final name once every
//!   file inside it has been written.
//! - Snapshot order is the timestamp embedded in the directory name, never
//!   filesystem metadata.
//! - Restore validates the whole snapshot before touching the store and
//!   applies it in one write scope.

use crate::store::{Collection, RecordId, StoreError};
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

mod manager;

pub use manager::BackupManager;

/// Snapshot layout version written to every manifest.
pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub(crate) const SNAPSHOT_PREFIX: &str = "backup_";
pub(crate) const STAGING_PREFIX: &str = ".staging-";
const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

static SNAPSHOT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^backup_(\d{14})(?:_(\d+))?$").expect("valid snapshot name regex"));

#[derive(Debug)]
pub enum BackupError {
    /// Filesystem failure on `path`.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Store failure while exporting or restoring.
    Store(StoreError),
    /// Snapshot content could not be encoded.
    Encode(serde_json::Error),
    /// Snapshot file exists but is malformed.
    InvalidSnapshot { path: PathBuf, message: String },
    /// Manifest lists a collection whose file is absent.
    MissingCollection {
        collection: Collection,
        path: PathBuf,
    },
    /// Manifest written by an unknown layout version.
    UnsupportedFormat { found: u32, supported: u32 },
}

impl Display for BackupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "i/o error on `{}`: {source}", path.display()),
            Self::Store(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode snapshot: {err}"),
            Self::InvalidSnapshot { path, message } => {
                write!(f, "invalid snapshot file `{}`: {message}", path.display())
            }
            Self::MissingCollection { collection, path } => write!(
                f,
                "snapshot lists `{collection}` but `{}` is missing",
                path.display()
            ),
            Self::UnsupportedFormat { found, supported } => write!(
                f,
                "snapshot format version {found} is not supported (expected {supported})"
            ),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Store(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::InvalidSnapshot { .. }
            | Self::MissingCollection { .. }
            | Self::UnsupportedFormat { .. } => None,
        }
    }
}

impl From<StoreError> for BackupError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> BackupError + '_ {
    move |source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `manifest.json` of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub timestamp: DateTime<Utc>,
    pub format_version: u32,
    pub collections: Vec<Collection>,
    /// Next identifier per collection at export time.
    #[serde(default)]
    pub sequences: BTreeMap<Collection, RecordId>,
}

/// One exported record; `body` is the stored JSON text, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: RecordId,
    pub body: String,
}

/// A snapshot directory found under the backup root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub name: String,
    pub path: PathBuf,
    /// Timestamp parsed from the directory name.
    pub taken_at: NaiveDateTime,
    /// Disambiguation suffix for snapshots taken in the same second.
    pub suffix: u32,
}

impl SnapshotInfo {
    /// Parses a snapshot directory name; `None` for anything else.
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let captures = SNAPSHOT_NAME_RE.captures(name)?;
        let taken_at =
            NaiveDateTime::parse_from_str(captures.get(1)?.as_str(), NAME_TIMESTAMP_FORMAT).ok()?;
        let suffix = match captures.get(2) {
            Some(value) => value.as_str().parse().ok()?,
            None => 0,
        };
        Some(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            taken_at,
            suffix,
        })
    }

    fn order_key(&self) -> (NaiveDateTime, u32) {
        (self.taken_at, self.suffix)
    }
}

pub(crate) fn snapshot_name(taken_at: NaiveDateTime, suffix: u32) -> String {
    let stamp = taken_at.format(NAME_TIMESTAMP_FORMAT);
    if suffix == 0 {
        format!("{SNAPSHOT_PREFIX}{stamp}")
    } else {
        format!("{SNAPSHOT_PREFIX}{stamp}_{suffix}")
    }
}

pub(crate) fn collection_file(dir: &Path, collection: Collection) -> PathBuf {
    dir.join(format!("{}.json", collection.as_str()))
}

/// Result of a successful snapshot.
#[derive(Debug)]
pub struct SnapshotOutcome {
    pub snapshot: SnapshotInfo,
    /// Records exported across all collections.
    pub records: usize,
    /// Snapshots removed by the retention pass.
    pub pruned: Vec<SnapshotInfo>,
    /// Set when the snapshot was written but retention failed.
    pub prune_warning: Option<BackupError>,
}

impl SnapshotOutcome {
    pub fn is_degraded(&self) -> bool {
        self.prune_warning.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    pub collections: usize,
    pub records: usize,
}
