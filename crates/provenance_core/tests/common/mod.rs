//! Shared fixtures for provenance integration tests.
#![allow(dead_code)]

use provenance_core::db::open_db_in_memory;
use provenance_core::model::EpochMillis;
use provenance_core::{
    AuditContext, DocumentId, GraphRepository, LineageService, QueryService, RuleId,
    RuleService, SqliteEventRepository, SqliteGraphRepository, SqliteRuleRepository,
};
use rusqlite::Connection;

pub const HOUR_MILLIS: EpochMillis = 3_600_000;
pub const DAY_SECONDS: u64 = 86_400;
pub const T0: EpochMillis = 1_700_000_000_000;

pub fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

pub fn audit() -> AuditContext {
    AuditContext::new("ingest", "alice", T0)
}

pub fn graph(conn: &Connection) -> SqliteGraphRepository<'_> {
    SqliteGraphRepository::try_new(conn).unwrap()
}

pub fn lineage(conn: &Connection) -> LineageService<SqliteGraphRepository<'_>> {
    LineageService::new(graph(conn))
}

pub fn query(
    conn: &Connection,
) -> QueryService<SqliteGraphRepository<'_>, SqliteEventRepository<'_>> {
    QueryService::new(graph(conn), SqliteEventRepository::try_new(conn).unwrap())
}

pub fn add_rule(conn: &Connection, name: &str, duration_seconds: u64) -> RuleId {
    RuleService::new(SqliteRuleRepository::try_new(conn).unwrap())
        .add_rule(name, duration_seconds, 1, &audit())
        .unwrap()
        .rule_id
}

pub fn document_id(conn: &Connection, uri: &str) -> DocumentId {
    graph(conn)
        .document_by_uri(uri)
        .unwrap()
        .unwrap_or_else(|| panic!("document {uri} should exist"))
        .document_id
}

/// Oldest relevant date of `rule_id` at `uri`, as readers see it.
pub fn visible_date(conn: &Connection, uri: &str, rule_id: RuleId) -> Option<EpochMillis> {
    graph(conn)
        .oldest_relevant_date(document_id(conn, uri), rule_id)
        .unwrap()
}

pub fn edge_count(conn: &Connection, uri: &str) -> usize {
    graph(conn)
        .age_off_edges(document_id(conn, uri))
        .unwrap()
        .len()
}

pub fn uris(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
