//! Engine configuration.
//!
//! Hosts deserialize `ProvenanceConfig` from whatever format they use;
//! missing fields fall back to defaults.

use crate::service::error::ProvenanceError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    /// Largest batch accepted by bulk document insertion.
    pub max_batch_size: usize,
    /// Application allowed to update any rule, not just its own.
    pub admin_application: Option<String>,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            admin_application: None,
        }
    }
}

impl ProvenanceConfig {
    pub fn validate(&self) -> Result<(), ProvenanceError> {
        if self.max_batch_size == 0 {
            return Err(ProvenanceError::InvalidConfig(
                "max_batch_size must be greater than 0".to_string(),
            ));
        }
        if let Some(admin) = &self.admin_application {
            if admin.trim().is_empty() {
                return Err(ProvenanceError::InvalidConfig(
                    "admin_application must not be blank".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_admin(&self, application: &str) -> bool {
        self.admin_application.as_deref() == Some(application)
    }
}
