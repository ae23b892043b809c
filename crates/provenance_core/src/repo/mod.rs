//! Repository layer over the SQLite graph store.
//!
//! # Responsibility
//! - Define use-case oriented access contracts for the lineage graph,
//!   age-off rules and purge/age-off events.
//! - Isolate SQL details from lineage and query orchestration.
//!
//! # Invariants
//! - Repositories only accept connections migrated to the latest schema.
//! - Repositories never enforce business rules beyond storage constraints;
//!   validation lives in the service layer.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use log::warn;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod event_repo;
pub mod graph_repo;
pub mod rule_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors shared by all provenance repositories.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "provenance repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "provenance repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid provenance data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Unit-of-work boundary of the graph store.
///
/// Everything `f` does through the same connection commits or rolls back as
/// one transaction. Calls made while a transaction is already open join it.
pub trait StoreTransaction {
    fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>;
}

pub(crate) fn run_in_transaction<T, E, F>(conn: &Connection, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<RepoError>,
{
    if !conn.is_autocommit() {
        return f();
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(RepoError::from)?;
    match f() {
        Ok(value) => {
            tx.commit().map_err(RepoError::from)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(
                    "event=tx_rollback module=repo status=error error={rollback_err}"
                );
            }
            Err(err)
        }
    }
}

pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn flag_to_db(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn last_insert_id(conn: &Connection, table: &'static str) -> RepoResult<u64> {
    let rowid = conn.last_insert_rowid();
    u64::try_from(rowid)
        .map_err(|_| RepoError::InvalidData(format!("negative rowid `{rowid}` in {table}")))
}
