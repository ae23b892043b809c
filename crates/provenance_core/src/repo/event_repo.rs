//! Purge and age-off event repository.
//!
//! # Responsibility
//! - Persist purge requests with their candidate document sets.
//! - Persist a record of every initiated age-off sweep.

use super::{
    ensure_connection_ready, flag_to_db, last_insert_id, parse_flag, run_in_transaction,
    RepoError, RepoResult, StoreTransaction,
};
use crate::model::audit::AuditContext;
use crate::model::document::DocumentId;
use crate::model::event::{AgeOffEvent, AgeOffId, PurgeEvent, PurgeId};
use crate::model::rule::RuleId;
use crate::model::EpochMillis;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

/// Repository interface for purge and age-off events.
pub trait EventRepository: StoreTransaction {
    /// Inserts a purge event. `requested_uris` keeps request order; entries
    /// listed in `uris_not_found` are stored as not found.
    fn insert_purge(
        &self,
        name: &str,
        description: &str,
        requested_uris: &[String],
        uris_not_found: &[String],
        document_ids: &BTreeSet<DocumentId>,
        audit: &AuditContext,
    ) -> RepoResult<PurgeId>;
    fn purge_by_id(&self, purge_id: PurgeId) -> RepoResult<Option<PurgeEvent>>;
    /// All purge ids, ascending.
    fn purge_ids(&self) -> RepoResult<Vec<PurgeId>>;
    fn mark_completely_purged(
        &self,
        purge_id: PurgeId,
        document_ids: &BTreeSet<DocumentId>,
    ) -> RepoResult<()>;
    fn update_purge_status(
        &self,
        purge_id: PurgeId,
        description: &str,
        resolved: bool,
        updated_at: EpochMillis,
    ) -> RepoResult<()>;

    fn insert_age_off_event(
        &self,
        rule_id: RuleId,
        effective_time: EpochMillis,
        document_count: u64,
        audit: &AuditContext,
    ) -> RepoResult<AgeOffId>;
    fn age_off_event_by_id(&self, age_off_id: AgeOffId) -> RepoResult<Option<AgeOffEvent>>;
}

/// SQLite-backed event repository.
pub struct SqliteEventRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                "purge_events",
                "purge_uris",
                "purge_documents",
                "age_off_events",
            ],
        )?;
        Ok(Self { conn })
    }

    fn purge_uris(&self, purge_id: PurgeId) -> RepoResult<(Vec<String>, Vec<String>)> {
        let mut stmt = self.conn.prepare(
            "SELECT uri, found
             FROM purge_uris
             WHERE purge_id = ?1
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query([purge_id])?;
        let mut requested = Vec::new();
        let mut not_found = Vec::new();
        while let Some(row) = rows.next()? {
            let uri: String = row.get(0)?;
            if !parse_flag(row.get(1)?, "purge_uris.found")? {
                not_found.push(uri.clone());
            }
            requested.push(uri);
        }
        Ok((requested, not_found))
    }

    fn purge_documents(
        &self,
        purge_id: PurgeId,
    ) -> RepoResult<(BTreeSet<DocumentId>, BTreeSet<DocumentId>)> {
        let mut stmt = self.conn.prepare(
            "SELECT document_id, completely_purged
             FROM purge_documents
             WHERE purge_id = ?1;",
        )?;
        let mut rows = stmt.query([purge_id])?;
        let mut candidates = BTreeSet::new();
        let mut purged = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let document_id: DocumentId = row.get(0)?;
            if parse_flag(row.get(1)?, "purge_documents.completely_purged")? {
                purged.insert(document_id);
            }
            candidates.insert(document_id);
        }
        Ok((candidates, purged))
    }
}

impl StoreTransaction for SqliteEventRepository<'_> {
    fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>,
    {
        run_in_transaction(self.conn, f)
    }
}

impl EventRepository for SqliteEventRepository<'_> {
    fn insert_purge(
        &self,
        name: &str,
        description: &str,
        requested_uris: &[String],
        uris_not_found: &[String],
        document_ids: &BTreeSet<DocumentId>,
        audit: &AuditContext,
    ) -> RepoResult<PurgeId> {
        self.conn.execute(
            "INSERT INTO purge_events (
                name,
                description,
                resolved,
                application,
                user_name,
                created_at,
                updated_at
            ) VALUES (?1, ?2, 0, ?3, ?4, ?5, ?5);",
            params![
                name,
                description,
                audit.application.as_str(),
                audit.user.as_str(),
                audit.timestamp,
            ],
        )?;
        let purge_id = last_insert_id(self.conn, "purge_events")?;

        let mut uri_stmt = self.conn.prepare(
            "INSERT INTO purge_uris (purge_id, position, uri, found)
             VALUES (?1, ?2, ?3, ?4);",
        )?;
        for (position, uri) in requested_uris.iter().enumerate() {
            let found = !uris_not_found.contains(uri);
            uri_stmt.execute(params![purge_id, position as i64, uri, flag_to_db(found)])?;
        }

        let mut doc_stmt = self.conn.prepare(
            "INSERT INTO purge_documents (purge_id, document_id, completely_purged)
             VALUES (?1, ?2, 0);",
        )?;
        for document_id in document_ids {
            doc_stmt.execute(params![purge_id, document_id])?;
        }

        Ok(purge_id)
    }

    fn purge_by_id(&self, purge_id: PurgeId) -> RepoResult<Option<PurgeEvent>> {
        let header = self
            .conn
            .query_row(
                "SELECT
                    purge_id,
                    name,
                    description,
                    resolved,
                    application,
                    user_name,
                    created_at,
                    updated_at
                 FROM purge_events
                 WHERE purge_id = ?1;",
                [purge_id],
                |row| Ok(parse_purge_header(row)),
            )
            .optional()?
            .transpose()?;

        let Some(mut event) = header else {
            return Ok(None);
        };
        let (requested_uris, uris_not_found) = self.purge_uris(purge_id)?;
        let (purge_document_ids, completely_purged_document_ids) =
            self.purge_documents(purge_id)?;
        event.requested_uris = requested_uris;
        event.uris_not_found = uris_not_found;
        event.purge_document_ids = purge_document_ids;
        event.completely_purged_document_ids = completely_purged_document_ids;
        Ok(Some(event))
    }

    fn purge_ids(&self) -> RepoResult<Vec<PurgeId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT purge_id FROM purge_events ORDER BY purge_id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get::<_, PurgeId>(0)?);
        }
        Ok(ids)
    }

    fn mark_completely_purged(
        &self,
        purge_id: PurgeId,
        document_ids: &BTreeSet<DocumentId>,
    ) -> RepoResult<()> {
        let mut stmt = self.conn.prepare(
            "UPDATE purge_documents
             SET completely_purged = 1
             WHERE purge_id = ?1
               AND document_id = ?2;",
        )?;
        for document_id in document_ids {
            stmt.execute(params![purge_id, document_id])?;
        }
        Ok(())
    }

    fn update_purge_status(
        &self,
        purge_id: PurgeId,
        description: &str,
        resolved: bool,
        updated_at: EpochMillis,
    ) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE purge_events
             SET description = ?2,
                 resolved = ?3,
                 updated_at = ?4
             WHERE purge_id = ?1;",
            params![purge_id, description, flag_to_db(resolved), updated_at],
        )?;
        Ok(())
    }

    fn insert_age_off_event(
        &self,
        rule_id: RuleId,
        effective_time: EpochMillis,
        document_count: u64,
        audit: &AuditContext,
    ) -> RepoResult<AgeOffId> {
        self.conn.execute(
            "INSERT INTO age_off_events (
                rule_id,
                effective_time,
                document_count,
                application,
                user_name,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                rule_id,
                effective_time,
                document_count,
                audit.application.as_str(),
                audit.user.as_str(),
                audit.timestamp,
            ],
        )?;
        last_insert_id(self.conn, "age_off_events")
    }

    fn age_off_event_by_id(&self, age_off_id: AgeOffId) -> RepoResult<Option<AgeOffEvent>> {
        let event = self
            .conn
            .query_row(
                "SELECT
                    age_off_id,
                    rule_id,
                    effective_time,
                    document_count,
                    application,
                    user_name,
                    created_at
                 FROM age_off_events
                 WHERE age_off_id = ?1;",
                [age_off_id],
                |row| {
                    Ok(AgeOffEvent {
                        age_off_id: row.get("age_off_id")?,
                        rule_id: row.get("rule_id")?,
                        effective_time: row.get("effective_time")?,
                        document_count: row.get("document_count")?,
                        application: row.get("application")?,
                        user: row.get("user_name")?,
                        created_at: row.get("created_at")?,
                    })
                },
            )
            .optional()?;
        Ok(event)
    }
}

fn parse_purge_header(row: &Row<'_>) -> RepoResult<PurgeEvent> {
    Ok(PurgeEvent {
        purge_id: row.get("purge_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        requested_uris: Vec::new(),
        uris_not_found: Vec::new(),
        purge_document_ids: BTreeSet::new(),
        completely_purged_document_ids: BTreeSet::new(),
        resolved: parse_flag(row.get("resolved")?, "purge_events.resolved")?,
        application: row.get("application")?,
        user: row.get("user_name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
