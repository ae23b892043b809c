//! Age-off rule registration and lookup.
//!
//! # Invariants
//! - Rule names are trimmed before storage and lookup.
//! - Only the creating application or the configured admin application
//!   may change a rule.

use super::error::{ProvenanceError, RuleRef};
use crate::config::ProvenanceConfig;
use crate::model::audit::AuditContext;
use crate::model::rule::{
    normalize_rule_name, validate_duration, validate_execution_period, AgeOffRule, RuleId,
};
use crate::repo::rule_repo::RuleRepository;
use log::info;

/// Rule management facade.
pub struct RuleService<R: RuleRepository> {
    repo: R,
    config: ProvenanceConfig,
}

impl<R: RuleRepository> RuleService<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            config: ProvenanceConfig::default(),
        }
    }

    pub fn with_config(repo: R, config: ProvenanceConfig) -> Result<Self, ProvenanceError> {
        config.validate()?;
        Ok(Self { repo, config })
    }

    /// Registers a rule.
    ///
    /// # Errors
    /// - `InvalidRule` for a blank name, zero duration or an execution
    ///   period outside 1..=90 days.
    /// - `RuleNameExists` when the trimmed name is taken.
    pub fn add_rule(
        &self,
        name: &str,
        duration_seconds: u64,
        maximum_execution_period: u32,
        audit: &AuditContext,
    ) -> Result<AgeOffRule, ProvenanceError> {
        let name = normalize_rule_name(name)?;
        validate_duration(duration_seconds)?;
        validate_execution_period(maximum_execution_period)?;

        let rule = self.repo.in_transaction(|| {
            if self.repo.rule_by_name(&name)?.is_some() {
                return Err(ProvenanceError::RuleNameExists(name.clone()));
            }
            let rule_id =
                self.repo
                    .insert_rule(&name, duration_seconds, maximum_execution_period, audit)?;
            self.rule_by_id(rule_id)
        })?;

        info!(
            "event=rule_add module=rules status=ok rule_id={} duration_seconds={} max_execution_days={}",
            rule.rule_id, rule.duration_seconds, rule.maximum_execution_period
        );
        Ok(rule)
    }

    pub fn rule_by_name(&self, name: &str) -> Result<AgeOffRule, ProvenanceError> {
        let name = normalize_rule_name(name)?;
        self.repo
            .rule_by_name(&name)?
            .ok_or(ProvenanceError::RuleNotFound(RuleRef::Name(name)))
    }

    pub fn rule_by_id(&self, rule_id: RuleId) -> Result<AgeOffRule, ProvenanceError> {
        self.repo
            .rule_by_id(rule_id)?
            .ok_or(ProvenanceError::RuleNotFound(RuleRef::Id(rule_id)))
    }

    /// Lists rules by name. `page` is 1-based; `limit == 0` or `page == 0`
    /// returns every rule.
    pub fn list_rules(&self, limit: u32, page: u32) -> Result<Vec<AgeOffRule>, ProvenanceError> {
        if limit == 0 || page == 0 {
            return Ok(self.repo.list_rules(None, 0)?);
        }
        let offset = limit.saturating_mul(page - 1);
        Ok(self.repo.list_rules(Some(limit), offset)?)
    }

    pub fn count_rules(&self) -> Result<u64, ProvenanceError> {
        Ok(self.repo.count_rules()?)
    }

    /// Changes the retention duration of a rule.
    pub fn update_rule(
        &self,
        name: &str,
        duration_seconds: u64,
        audit: &AuditContext,
    ) -> Result<AgeOffRule, ProvenanceError> {
        validate_duration(duration_seconds)?;
        let rule = self.repo.in_transaction(|| {
            let rule = self.rule_by_name(name)?;
            if rule.application != audit.application && !self.config.is_admin(&audit.application)
            {
                return Err(ProvenanceError::NotAuthorized {
                    application: audit.application.clone(),
                    operation: "update age-off rule",
                });
            }
            self.repo
                .update_rule_duration(rule.rule_id, duration_seconds, audit)?;
            self.rule_by_id(rule.rule_id)
        })?;

        info!(
            "event=rule_update module=rules status=ok rule_id={} duration_seconds={}",
            rule.rule_id, rule.duration_seconds
        );
        Ok(rule)
    }
}
