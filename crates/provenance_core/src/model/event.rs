//! Purge and age-off event vertices.
//!
//! # Invariants
//! - `completely_purged_document_ids` is always a subset of
//!   `purge_document_ids`.
//! - Event ids are never reused.

use super::document::DocumentId;
use super::rule::RuleId;
use super::EpochMillis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type PurgeId = u64;
pub type AgeOffId = u64;

/// Tracks one purge request from initiation to resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeEvent {
    pub purge_id: PurgeId,
    pub name: String,
    /// Initial description followed by appended notes.
    pub description: String,
    /// Uris as submitted, in request order.
    pub requested_uris: Vec<String>,
    pub uris_not_found: Vec<String>,
    /// Candidate set: ancestor and descendant closure of the found uris.
    pub purge_document_ids: BTreeSet<DocumentId>,
    pub completely_purged_document_ids: BTreeSet<DocumentId>,
    pub resolved: bool,
    pub application: String,
    pub user: String,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

impl PurgeEvent {
    /// Candidates not yet reported as completely purged.
    pub fn outstanding_document_ids(&self) -> BTreeSet<DocumentId> {
        self.purge_document_ids
            .difference(&self.completely_purged_document_ids)
            .copied()
            .collect()
    }
}

/// Record of one initiated age-off sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeOffEvent {
    pub age_off_id: AgeOffId,
    pub rule_id: RuleId,
    pub effective_time: EpochMillis,
    pub document_count: u64,
    pub application: String,
    pub user: String,
    pub created_at: EpochMillis,
}
