//! Age-off rule vertex model.
//!
//! # Invariants
//! - `name` is unique and not blank.
//! - `0 < duration_seconds <= i64::MAX`, so it always fits the store.
//! - `maximum_execution_period` is within
//!   `MIN_EXECUTION_PERIOD_DAYS..=MAX_EXECUTION_PERIOD_DAYS`.

use super::EpochMillis;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable numeric rule identifier.
pub type RuleId = u64;

pub const MIN_EXECUTION_PERIOD_DAYS: u32 = 1;
pub const MAX_EXECUTION_PERIOD_DAYS: u32 = 90;

/// Named retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeOffRule {
    pub rule_id: RuleId,
    pub name: String,
    /// Retention measured from a document's relevant date.
    pub duration_seconds: u64,
    /// Days the purge executor has to act once a document matures.
    pub maximum_execution_period: u32,
    pub application: String,
    pub user: String,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

impl AgeOffRule {
    /// Retention duration in epoch milliseconds, saturating.
    pub fn duration_millis(&self) -> i64 {
        duration_seconds_to_millis(self.duration_seconds)
    }

    /// Latest relevant date that has matured at `effective_time`.
    ///
    /// A document is due when `relevant_date <= maturity_cutoff(effective_time)`.
    pub fn maturity_cutoff(&self, effective_time: EpochMillis) -> EpochMillis {
        effective_time.saturating_sub(self.duration_millis())
    }
}

/// Converts seconds to milliseconds without overflowing `i64`.
pub fn duration_seconds_to_millis(duration_seconds: u64) -> i64 {
    i64::try_from(duration_seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000)
}

/// Validation errors for rule definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleValidationError {
    BlankName,
    NonPositiveDuration,
    DurationTooLarge(u64),
    ExecutionPeriodOutOfRange(u32),
}

impl Display for RuleValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "age-off rule name must not be blank"),
            Self::NonPositiveDuration => {
                write!(f, "age-off rule duration seconds must be greater than 0")
            }
            Self::DurationTooLarge(seconds) => write!(
                f,
                "age-off rule duration seconds must not exceed {}, got {seconds}",
                i64::MAX
            ),
            Self::ExecutionPeriodOutOfRange(days) => write!(
                f,
                "maximum execution period must be between {MIN_EXECUTION_PERIOD_DAYS} and {MAX_EXECUTION_PERIOD_DAYS} days, got {days}"
            ),
        }
    }
}

impl Error for RuleValidationError {}

/// Normalizes a rule name, rejecting blank input.
pub fn normalize_rule_name(name: &str) -> Result<String, RuleValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RuleValidationError::BlankName);
    }
    Ok(trimmed.to_string())
}

pub fn validate_duration(duration_seconds: u64) -> Result<(), RuleValidationError> {
    if duration_seconds == 0 {
        return Err(RuleValidationError::NonPositiveDuration);
    }
    if i64::try_from(duration_seconds).is_err() {
        return Err(RuleValidationError::DurationTooLarge(duration_seconds));
    }
    Ok(())
}

pub fn validate_execution_period(days: u32) -> Result<(), RuleValidationError> {
    if !(MIN_EXECUTION_PERIOD_DAYS..=MAX_EXECUTION_PERIOD_DAYS).contains(&days) {
        return Err(RuleValidationError::ExecutionPeriodOutOfRange(days));
    }
    Ok(())
}
