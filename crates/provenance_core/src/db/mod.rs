//! Lineage graph store.
//!
//! One SQLite file holds the whole graph: document and rule vertices,
//! `derived_from` and age-off edges, plus purge and age-off event records.
//! [`open_db`] and [`open_db_in_memory`] are the only ways to obtain a
//! connection; both upgrade the schema through [`migrations`] first, so
//! repositories never see a half-built graph.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failures while opening or upgrading the graph store.
#[derive(Debug)]
pub enum DbError {
    /// Connection setup or pragma failure outside any migration step.
    Sqlite(rusqlite::Error),
    /// A schema step failed; nothing from the failed upgrade was kept.
    Migration {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },
    /// The file was written by a newer engine with graph tables this build
    /// does not understand.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "graph store error: {err}"),
            Self::Migration {
                version,
                name,
                source,
            } => write!(f, "graph schema step {version} ({name}) failed: {source}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "graph schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
