//! Graph schema steps.
//!
//! Step 1 creates the lineage graph (documents, rules, `derived_from`,
//! age-off edges). Step 2 adds the purge and age-off event tables that
//! reference it. The highest applied step is stored in `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::{Connection, Transaction};

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "lineage_graph",
        sql: include_str!("0001_lineage_graph.sql"),
    },
    SchemaStep {
        version: 2,
        name: "events",
        sql: include_str!("0002_events.sql"),
    },
];

/// Newest graph schema this build can open.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Graph schema version recorded in the store, `0` for a fresh file.
pub fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
}

/// Brings the store up to [`latest_version`].
///
/// All pending steps run in one transaction. A failing step rolls the whole
/// upgrade back and is reported as [`DbError::Migration`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = schema_version(conn)?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let pending: Vec<&SchemaStep> = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > from_version)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in pending {
        apply_step(&tx, step).map_err(|source| {
            error!(
                "event=db_migrate module=db status=error version={} name={} error={source}",
                step.version, step.name
            );
            DbError::Migration {
                version: step.version,
                name: step.name,
                source,
            }
        })?;
        info!(
            "event=db_migrate module=db status=step version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={from_version} to_version={latest}");
    Ok(())
}

fn apply_step(tx: &Transaction<'_>, step: &SchemaStep) -> rusqlite::Result<()> {
    tx.execute_batch(step.sql)?;
    tx.pragma_update(None, "user_version", step.version)
}
