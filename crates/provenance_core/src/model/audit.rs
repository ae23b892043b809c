//! Caller identity stamped on every created vertex and edge.

use super::EpochMillis;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Placeholder recorded when the transport layer supplies no principal.
pub const UNKNOWN_PRINCIPAL: &str = "NOT SET";

/// Authenticated principal and clock reading for one call.
///
/// Supplied by the transport layer; the engine never validates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    /// Calling application (security id).
    pub application: String,
    /// Calling user principal.
    pub user: String,
    /// Time the call was accepted.
    pub timestamp: EpochMillis,
}

impl AuditContext {
    /// Creates a context with an explicit timestamp.
    ///
    /// Blank principals are replaced by [`UNKNOWN_PRINCIPAL`].
    pub fn new(
        application: impl Into<String>,
        user: impl Into<String>,
        timestamp: EpochMillis,
    ) -> Self {
        Self {
            application: principal_or_unknown(application.into()),
            user: principal_or_unknown(user.into()),
            timestamp,
        }
    }

    /// Creates a context stamped with the current wall clock.
    pub fn now(application: impl Into<String>, user: impl Into<String>) -> Self {
        Self::new(application, user, now_epoch_millis())
    }
}

/// Current wall clock as epoch milliseconds. Clamps to 0 before the epoch.
pub fn now_epoch_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn principal_or_unknown(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN_PRINCIPAL.to_string()
    } else {
        trimmed.to_string()
    }
}
