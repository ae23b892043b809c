//! Lineage graph repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist document vertices, `derived_from` edges and `age_off` edges.
//! - Answer adjacency and transitive-closure questions over the graph.
//!
//! # Invariants
//! - Neighbour listings are deterministic: ordered by document id.
//! - Closure queries include the starting document itself.
//! - Explicit age-off edges store `source_document_id = NULL`.

use super::rule_repo::load_rule_by_id;
use super::{
    ensure_connection_ready, flag_to_db, last_insert_id, parse_flag, run_in_transaction,
    RepoError, RepoResult, StoreTransaction,
};
use crate::model::audit::AuditContext;
use crate::model::document::{Document, DocumentId};
use crate::model::lineage::{AgeOffEdge, AgeOffSource, DerivedFrom, InheritanceInfo};
use crate::model::rule::{AgeOffRule, RuleId};
use crate::model::EpochMillis;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, BTreeSet};

const DOCUMENT_SELECT_SQL: &str = "SELECT
    document_id,
    uri,
    aged,
    application,
    user_name,
    created_at
FROM documents";

const DERIVED_FROM_SELECT_SQL: &str = "SELECT
    child_id,
    parent_id,
    inherit_age_off,
    track_age_off,
    relevant_date_override,
    application,
    user_name,
    created_at
FROM derived_from";

const AGE_OFF_EDGE_SELECT_SQL: &str = "SELECT
    edge_id,
    document_id,
    rule_id,
    source_document_id,
    relevant_date,
    application,
    user_name,
    created_at
FROM age_off_edges";

/// Direction of a transitive walk over `derived_from` edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineageDirection {
    /// Towards parents.
    Ancestors,
    /// Towards children.
    Descendants,
}

/// Repository interface for the lineage graph.
pub trait GraphRepository: StoreTransaction {
    /// Inserts a non-aged document vertex and returns its new id.
    fn insert_document(&self, uri: &str, audit: &AuditContext) -> RepoResult<DocumentId>;
    fn document_by_uri(&self, uri: &str) -> RepoResult<Option<Document>>;
    fn document_by_id(&self, document_id: DocumentId) -> RepoResult<Option<Document>>;
    fn mark_document_aged(&self, document_id: DocumentId) -> RepoResult<()>;
    /// Loads a rule vertex; the lineage engine only needs read access.
    fn rule_by_id(&self, rule_id: RuleId) -> RepoResult<Option<AgeOffRule>>;

    fn insert_derived_from(
        &self,
        child_id: DocumentId,
        parent_id: DocumentId,
        info: &InheritanceInfo,
        audit: &AuditContext,
    ) -> RepoResult<()>;
    fn derived_from(
        &self,
        child_id: DocumentId,
        parent_id: DocumentId,
    ) -> RepoResult<Option<DerivedFrom>>;
    /// Turns a link into plain lineage: no inheritance, no tracking.
    fn clear_inheritance_flags(&self, child_id: DocumentId, parent_id: DocumentId)
        -> RepoResult<()>;
    fn parent_links(&self, child_id: DocumentId) -> RepoResult<Vec<DerivedFrom>>;
    fn child_links(&self, parent_id: DocumentId) -> RepoResult<Vec<DerivedFrom>>;
    /// Transitive closure in `direction`, including `document_id` itself.
    fn closure(
        &self,
        document_id: DocumentId,
        direction: LineageDirection,
    ) -> RepoResult<BTreeSet<DocumentId>>;

    fn insert_age_off_edge(
        &self,
        document_id: DocumentId,
        rule_id: RuleId,
        source: AgeOffSource,
        relevant_date: EpochMillis,
        audit: &AuditContext,
    ) -> RepoResult<u64>;
    fn age_off_edges(&self, document_id: DocumentId) -> RepoResult<Vec<AgeOffEdge>>;
    fn age_off_edge(
        &self,
        document_id: DocumentId,
        rule_id: RuleId,
        source: AgeOffSource,
    ) -> RepoResult<Option<AgeOffEdge>>;
    fn update_age_off_edge_date(&self, edge_id: u64, relevant_date: EpochMillis)
        -> RepoResult<()>;
    fn delete_age_off_edge(&self, edge_id: u64) -> RepoResult<()>;
    /// Deletes edges at `document_id` inherited from `parent_id`; returns the
    /// affected rule ids.
    fn delete_inherited_edges(
        &self,
        document_id: DocumentId,
        parent_id: DocumentId,
    ) -> RepoResult<BTreeSet<RuleId>>;
    /// Deletes every edge into `document_id`; returns the number removed.
    fn delete_all_age_off_edges(&self, document_id: DocumentId) -> RepoResult<usize>;
    /// Oldest relevant date per rule over all edges into `document_id`.
    fn oldest_relevant_dates(
        &self,
        document_id: DocumentId,
    ) -> RepoResult<BTreeMap<RuleId, EpochMillis>>;
    fn oldest_relevant_date(
        &self,
        document_id: DocumentId,
        rule_id: RuleId,
    ) -> RepoResult<Option<EpochMillis>>;
    /// Non-aged documents holding an edge for `rule_id` dated at or before
    /// `cutoff`, ordered by id.
    fn documents_due(&self, rule_id: RuleId, cutoff: EpochMillis)
        -> RepoResult<Vec<DocumentId>>;
}

/// SQLite-backed lineage graph repository.
pub struct SqliteGraphRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGraphRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &["documents", "derived_from", "age_off_edges", "age_off_rules"],
        )?;
        Ok(Self { conn })
    }
}

impl StoreTransaction for SqliteGraphRepository<'_> {
    fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>,
    {
        run_in_transaction(self.conn, f)
    }
}

impl GraphRepository for SqliteGraphRepository<'_> {
    fn insert_document(&self, uri: &str, audit: &AuditContext) -> RepoResult<DocumentId> {
        self.conn.execute(
            "INSERT INTO documents (
                uri,
                aged,
                application,
                user_name,
                created_at
            ) VALUES (?1, 0, ?2, ?3, ?4);",
            params![
                uri,
                audit.application.as_str(),
                audit.user.as_str(),
                audit.timestamp,
            ],
        )?;
        last_insert_id(self.conn, "documents")
    }

    fn document_by_uri(&self, uri: &str) -> RepoResult<Option<Document>> {
        let sql = format!("{DOCUMENT_SELECT_SQL} WHERE uri = ?1;");
        let document = self
            .conn
            .query_row(&sql, [uri], |row| Ok(parse_document_row(row)))
            .optional()?
            .transpose()?;
        Ok(document)
    }

    fn document_by_id(&self, document_id: DocumentId) -> RepoResult<Option<Document>> {
        let sql = format!("{DOCUMENT_SELECT_SQL} WHERE document_id = ?1;");
        let document = self
            .conn
            .query_row(&sql, [document_id], |row| Ok(parse_document_row(row)))
            .optional()?
            .transpose()?;
        Ok(document)
    }

    fn mark_document_aged(&self, document_id: DocumentId) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE documents SET aged = 1 WHERE document_id = ?1;",
            [document_id],
        )?;
        Ok(())
    }

    fn rule_by_id(&self, rule_id: RuleId) -> RepoResult<Option<AgeOffRule>> {
        load_rule_by_id(self.conn, rule_id)
    }

    fn insert_derived_from(
        &self,
        child_id: DocumentId,
        parent_id: DocumentId,
        info: &InheritanceInfo,
        audit: &AuditContext,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO derived_from (
                child_id,
                parent_id,
                inherit_age_off,
                track_age_off,
                relevant_date_override,
                application,
                user_name,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                child_id,
                parent_id,
                flag_to_db(info.inherit_age_off),
                flag_to_db(info.track_age_off),
                info.relevant_date_override,
                audit.application.as_str(),
                audit.user.as_str(),
                audit.timestamp,
            ],
        )?;
        Ok(())
    }

    fn derived_from(
        &self,
        child_id: DocumentId,
        parent_id: DocumentId,
    ) -> RepoResult<Option<DerivedFrom>> {
        let sql = format!("{DERIVED_FROM_SELECT_SQL} WHERE child_id = ?1 AND parent_id = ?2;");
        let link = self
            .conn
            .query_row(&sql, [child_id, parent_id], |row| {
                Ok(parse_derived_from_row(row))
            })
            .optional()?
            .transpose()?;
        Ok(link)
    }

    fn clear_inheritance_flags(
        &self,
        child_id: DocumentId,
        parent_id: DocumentId,
    ) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE derived_from
             SET inherit_age_off = 0,
                 track_age_off = 0
             WHERE child_id = ?1
               AND parent_id = ?2;",
            [child_id, parent_id],
        )?;
        Ok(())
    }

    fn parent_links(&self, child_id: DocumentId) -> RepoResult<Vec<DerivedFrom>> {
        let sql = format!("{DERIVED_FROM_SELECT_SQL} WHERE child_id = ?1 ORDER BY parent_id ASC;");
        query_links(self.conn, &sql, child_id)
    }

    fn child_links(&self, parent_id: DocumentId) -> RepoResult<Vec<DerivedFrom>> {
        let sql = format!("{DERIVED_FROM_SELECT_SQL} WHERE parent_id = ?1 ORDER BY child_id ASC;");
        query_links(self.conn, &sql, parent_id)
    }

    fn closure(
        &self,
        document_id: DocumentId,
        direction: LineageDirection,
    ) -> RepoResult<BTreeSet<DocumentId>> {
        // UNION (not UNION ALL) deduplicates diamonds as the walk proceeds.
        let sql = match direction {
            LineageDirection::Ancestors => {
                "WITH RECURSIVE lineage(document_id) AS (
                    SELECT ?1
                    UNION
                    SELECT link.parent_id
                    FROM derived_from link
                    INNER JOIN lineage ON link.child_id = lineage.document_id
                )
                SELECT document_id FROM lineage;"
            }
            LineageDirection::Descendants => {
                "WITH RECURSIVE lineage(document_id) AS (
                    SELECT ?1
                    UNION
                    SELECT link.child_id
                    FROM derived_from link
                    INNER JOIN lineage ON link.parent_id = lineage.document_id
                )
                SELECT document_id FROM lineage;"
            }
        };

        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([document_id])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            ids.insert(row.get::<_, DocumentId>(0)?);
        }
        Ok(ids)
    }

    fn insert_age_off_edge(
        &self,
        document_id: DocumentId,
        rule_id: RuleId,
        source: AgeOffSource,
        relevant_date: EpochMillis,
        audit: &AuditContext,
    ) -> RepoResult<u64> {
        self.conn.execute(
            "INSERT INTO age_off_edges (
                document_id,
                rule_id,
                source_document_id,
                relevant_date,
                application,
                user_name,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                document_id,
                rule_id,
                source_document_id(source),
                relevant_date,
                audit.application.as_str(),
                audit.user.as_str(),
                audit.timestamp,
            ],
        )?;
        last_insert_id(self.conn, "age_off_edges")
    }

    fn age_off_edges(&self, document_id: DocumentId) -> RepoResult<Vec<AgeOffEdge>> {
        let sql = format!(
            "{AGE_OFF_EDGE_SELECT_SQL} WHERE document_id = ?1 ORDER BY rule_id ASC, edge_id ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([document_id])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(parse_age_off_edge_row(row)?);
        }
        Ok(edges)
    }

    fn age_off_edge(
        &self,
        document_id: DocumentId,
        rule_id: RuleId,
        source: AgeOffSource,
    ) -> RepoResult<Option<AgeOffEdge>> {
        let edge = match source {
            AgeOffSource::Rule(_) => {
                let sql = format!(
                    "{AGE_OFF_EDGE_SELECT_SQL}
                     WHERE document_id = ?1
                       AND rule_id = ?2
                       AND source_document_id IS NULL;"
                );
                self.conn
                    .query_row(&sql, [document_id, rule_id], |row| {
                        Ok(parse_age_off_edge_row(row))
                    })
                    .optional()?
            }
            AgeOffSource::Document(parent_id) => {
                let sql = format!(
                    "{AGE_OFF_EDGE_SELECT_SQL}
                     WHERE document_id = ?1
                       AND rule_id = ?2
                       AND source_document_id = ?3;"
                );
                self.conn
                    .query_row(&sql, [document_id, rule_id, parent_id], |row| {
                        Ok(parse_age_off_edge_row(row))
                    })
                    .optional()?
            }
        };
        Ok(edge.transpose()?)
    }

    fn update_age_off_edge_date(
        &self,
        edge_id: u64,
        relevant_date: EpochMillis,
    ) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE age_off_edges SET relevant_date = ?2 WHERE edge_id = ?1;",
            params![edge_id, relevant_date],
        )?;
        Ok(())
    }

    fn delete_age_off_edge(&self, edge_id: u64) -> RepoResult<()> {
        self.conn
            .execute("DELETE FROM age_off_edges WHERE edge_id = ?1;", [edge_id])?;
        Ok(())
    }

    fn delete_inherited_edges(
        &self,
        document_id: DocumentId,
        parent_id: DocumentId,
    ) -> RepoResult<BTreeSet<RuleId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT rule_id
             FROM age_off_edges
             WHERE document_id = ?1
               AND source_document_id = ?2;",
        )?;
        let mut rows = stmt.query([document_id, parent_id])?;
        let mut rules = BTreeSet::new();
        while let Some(row) = rows.next()? {
            rules.insert(row.get::<_, RuleId>(0)?);
        }

        self.conn.execute(
            "DELETE FROM age_off_edges
             WHERE document_id = ?1
               AND source_document_id = ?2;",
            [document_id, parent_id],
        )?;
        Ok(rules)
    }

    fn delete_all_age_off_edges(&self, document_id: DocumentId) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM age_off_edges WHERE document_id = ?1;",
            [document_id],
        )?;
        Ok(removed)
    }

    fn oldest_relevant_dates(
        &self,
        document_id: DocumentId,
    ) -> RepoResult<BTreeMap<RuleId, EpochMillis>> {
        let mut stmt = self.conn.prepare(
            "SELECT rule_id, MIN(relevant_date)
             FROM age_off_edges
             WHERE document_id = ?1
             GROUP BY rule_id;",
        )?;
        let mut rows = stmt.query([document_id])?;
        let mut dates = BTreeMap::new();
        while let Some(row) = rows.next()? {
            dates.insert(row.get::<_, RuleId>(0)?, row.get::<_, EpochMillis>(1)?);
        }
        Ok(dates)
    }

    fn oldest_relevant_date(
        &self,
        document_id: DocumentId,
        rule_id: RuleId,
    ) -> RepoResult<Option<EpochMillis>> {
        // MIN over zero rows yields a single NULL row.
        let oldest: Option<EpochMillis> = self.conn.query_row(
            "SELECT MIN(relevant_date)
             FROM age_off_edges
             WHERE document_id = ?1
               AND rule_id = ?2;",
            [document_id, rule_id],
            |row| row.get(0),
        )?;
        Ok(oldest)
    }

    fn documents_due(
        &self,
        rule_id: RuleId,
        cutoff: EpochMillis,
    ) -> RepoResult<Vec<DocumentId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT edge.document_id
             FROM age_off_edges edge
             INNER JOIN documents doc ON doc.document_id = edge.document_id
             WHERE edge.rule_id = ?1
               AND edge.relevant_date <= ?2
               AND doc.aged = 0
             ORDER BY edge.document_id ASC;",
        )?;
        let mut rows = stmt.query(params![rule_id, cutoff])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get::<_, DocumentId>(0)?);
        }
        Ok(ids)
    }
}

fn query_links(conn: &Connection, sql: &str, document_id: DocumentId) -> RepoResult<Vec<DerivedFrom>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([document_id])?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        links.push(parse_derived_from_row(row)?);
    }
    Ok(links)
}

fn source_document_id(source: AgeOffSource) -> Option<DocumentId> {
    match source {
        AgeOffSource::Rule(_) => None,
        AgeOffSource::Document(parent_id) => Some(parent_id),
    }
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<Document> {
    Ok(Document {
        document_id: row.get("document_id")?,
        uri: row.get("uri")?,
        aged: parse_flag(row.get("aged")?, "documents.aged")?,
        application: row.get("application")?,
        user: row.get("user_name")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_derived_from_row(row: &Row<'_>) -> RepoResult<DerivedFrom> {
    Ok(DerivedFrom {
        child_id: row.get("child_id")?,
        parent_id: row.get("parent_id")?,
        inherit_age_off: parse_flag(row.get("inherit_age_off")?, "derived_from.inherit_age_off")?,
        track_age_off: parse_flag(row.get("track_age_off")?, "derived_from.track_age_off")?,
        relevant_date_override: row.get("relevant_date_override")?,
        application: row.get("application")?,
        user: row.get("user_name")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_age_off_edge_row(row: &Row<'_>) -> RepoResult<AgeOffEdge> {
    let rule_id: RuleId = row.get("rule_id")?;
    let source = match row.get::<_, Option<DocumentId>>("source_document_id")? {
        Some(parent_id) => AgeOffSource::Document(parent_id),
        None => AgeOffSource::Rule(rule_id),
    };

    Ok(AgeOffEdge {
        edge_id: row.get("edge_id")?,
        document_id: row.get("document_id")?,
        rule_id,
        source,
        relevant_date: row.get("relevant_date")?,
        application: row.get("application")?,
        user: row.get("user_name")?,
        created_at: row.get("created_at")?,
    })
}
