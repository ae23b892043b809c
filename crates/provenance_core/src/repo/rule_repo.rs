//! Age-off rule repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist and look up rule vertices by id and by unique name.
//! - Keep rule listing deterministic: `name ASC`.

use super::{ensure_connection_ready, last_insert_id, run_in_transaction, RepoError, RepoResult};
use super::StoreTransaction;
use crate::model::audit::AuditContext;
use crate::model::rule::{AgeOffRule, RuleId};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(crate) const RULE_SELECT_SQL: &str = "SELECT
    rule_id,
    name,
    duration_seconds,
    maximum_execution_period,
    application,
    user_name,
    created_at,
    updated_at
FROM age_off_rules";

/// Repository interface for age-off rule vertices.
pub trait RuleRepository: StoreTransaction {
    /// Inserts one rule and returns its new id.
    fn insert_rule(
        &self,
        name: &str,
        duration_seconds: u64,
        maximum_execution_period: u32,
        audit: &AuditContext,
    ) -> RepoResult<RuleId>;
    fn rule_by_id(&self, rule_id: RuleId) -> RepoResult<Option<AgeOffRule>>;
    fn rule_by_name(&self, name: &str) -> RepoResult<Option<AgeOffRule>>;
    /// Lists rules ordered by name. `limit == None` lists everything.
    fn list_rules(&self, limit: Option<u32>, offset: u32) -> RepoResult<Vec<AgeOffRule>>;
    fn count_rules(&self) -> RepoResult<u64>;
    fn update_rule_duration(
        &self,
        rule_id: RuleId,
        duration_seconds: u64,
        audit: &AuditContext,
    ) -> RepoResult<()>;
}

/// SQLite-backed rule repository.
pub struct SqliteRuleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRuleRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["age_off_rules"])?;
        Ok(Self { conn })
    }
}

impl StoreTransaction for SqliteRuleRepository<'_> {
    fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepoError>,
    {
        run_in_transaction(self.conn, f)
    }
}

impl RuleRepository for SqliteRuleRepository<'_> {
    fn insert_rule(
        &self,
        name: &str,
        duration_seconds: u64,
        maximum_execution_period: u32,
        audit: &AuditContext,
    ) -> RepoResult<RuleId> {
        self.conn.execute(
            "INSERT INTO age_off_rules (
                name,
                duration_seconds,
                maximum_execution_period,
                application,
                user_name,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
            params![
                name,
                duration_seconds,
                maximum_execution_period,
                audit.application.as_str(),
                audit.user.as_str(),
                audit.timestamp,
            ],
        )?;
        last_insert_id(self.conn, "age_off_rules")
    }

    fn rule_by_id(&self, rule_id: RuleId) -> RepoResult<Option<AgeOffRule>> {
        load_rule_by_id(self.conn, rule_id)
    }

    fn rule_by_name(&self, name: &str) -> RepoResult<Option<AgeOffRule>> {
        let sql = format!("{RULE_SELECT_SQL} WHERE name = ?1;");
        let rule = self
            .conn
            .query_row(&sql, [name], |row| Ok(parse_rule_row(row)))
            .optional()?
            .transpose()?;
        Ok(rule)
    }

    fn list_rules(&self, limit: Option<u32>, offset: u32) -> RepoResult<Vec<AgeOffRule>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, i64::from);
        let sql = format!("{RULE_SELECT_SQL} ORDER BY name ASC, rule_id ASC LIMIT ?1 OFFSET ?2;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![limit, offset])?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next()? {
            rules.push(parse_rule_row(row)?);
        }
        Ok(rules)
    }

    fn count_rules(&self) -> RepoResult<u64> {
        let count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM age_off_rules;", [], |row| row.get(0))?;
        Ok(count)
    }

    fn update_rule_duration(
        &self,
        rule_id: RuleId,
        duration_seconds: u64,
        audit: &AuditContext,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE age_off_rules
             SET duration_seconds = ?2,
                 updated_at = ?3
             WHERE rule_id = ?1;",
            params![rule_id, duration_seconds, audit.timestamp],
        )?;
        if changed == 0 {
            return Err(RepoError::InvalidData(format!(
                "age_off_rules row {rule_id} vanished during update"
            )));
        }
        Ok(())
    }
}

pub(crate) fn load_rule_by_id(conn: &Connection, rule_id: RuleId) -> RepoResult<Option<AgeOffRule>> {
    let sql = format!("{RULE_SELECT_SQL} WHERE rule_id = ?1;");
    let rule = conn
        .query_row(&sql, [rule_id], |row| Ok(parse_rule_row(row)))
        .optional()?
        .transpose()?;
    Ok(rule)
}

pub(crate) fn parse_rule_row(row: &Row<'_>) -> RepoResult<AgeOffRule> {
    let duration_seconds: u64 = row.get("duration_seconds")?;
    if duration_seconds == 0 {
        return Err(RepoError::InvalidData(
            "zero duration in age_off_rules.duration_seconds".to_string(),
        ));
    }

    Ok(AgeOffRule {
        rule_id: row.get("rule_id")?,
        name: row.get("name")?,
        duration_seconds,
        maximum_execution_period: row.get("maximum_execution_period")?,
        application: row.get("application")?,
        user: row.get("user_name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
