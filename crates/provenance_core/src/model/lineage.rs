//! Derivation and age-off edge model.
//!
//! # Responsibility
//! - Describe how a child document derives from a parent (`DerivedFrom`).
//! - Describe one age-off obligation flowing into a document (`AgeOffEdge`).
//!
//! # Invariants
//! - At most one `DerivedFrom` edge per (child, parent) pair.
//! - At most one explicit `AgeOffEdge` per (document, rule) and one inherited
//!   edge per (document, parent, rule).
//! - The visible relevant date of a (document, rule) pair is the minimum
//!   over that pair's edges: the oldest date wins.

use super::document::DocumentId;
use super::rule::RuleId;
use super::EpochMillis;
use serde::{Deserialize, Serialize};

/// Caller-supplied description of one parent link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceInfo {
    pub parent_uri: String,
    /// Copy the parent's age-off obligations onto the child.
    pub inherit_age_off: bool,
    /// Keep the copied obligations in sync with later parent changes.
    pub track_age_off: bool,
    /// Date used instead of the parent's date for edges through this link.
    pub relevant_date_override: Option<EpochMillis>,
}

impl InheritanceInfo {
    pub fn new(parent_uri: impl Into<String>, inherit_age_off: bool, track_age_off: bool) -> Self {
        Self {
            parent_uri: parent_uri.into(),
            inherit_age_off,
            track_age_off,
            relevant_date_override: None,
        }
    }

    /// Inherit and track, the common case for derived documents.
    pub fn tracking(parent_uri: impl Into<String>) -> Self {
        Self::new(parent_uri, true, true)
    }

    pub fn with_relevant_date_override(mut self, relevant_date: EpochMillis) -> Self {
        self.relevant_date_override = Some(relevant_date);
        self
    }
}

/// Explicit attachment of a rule to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeOffMapping {
    pub rule_id: RuleId,
    /// Date the retention clock starts for this rule at the document.
    pub relevant_date: EpochMillis,
}

impl AgeOffMapping {
    pub fn new(rule_id: RuleId, relevant_date: EpochMillis) -> Self {
        Self {
            rule_id,
            relevant_date,
        }
    }
}

/// Persisted derivation edge `child -> parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFrom {
    pub child_id: DocumentId,
    pub parent_id: DocumentId,
    pub inherit_age_off: bool,
    pub track_age_off: bool,
    pub relevant_date_override: Option<EpochMillis>,
    pub application: String,
    pub user: String,
    pub created_at: EpochMillis,
}

impl DerivedFrom {
    /// Whether later changes at the parent must cascade into the child.
    pub fn cascades(&self) -> bool {
        self.inherit_age_off && self.track_age_off
    }

    /// Date an edge propagated through this link should carry, given the
    /// parent's oldest date for the rule.
    pub fn propagated_date(&self, parent_oldest: EpochMillis) -> EpochMillis {
        self.relevant_date_override.unwrap_or(parent_oldest)
    }
}

/// Origin of an age-off edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeOffSource {
    /// Explicit attachment; the rule itself is the source.
    Rule(RuleId),
    /// Inherited from this parent document.
    Document(DocumentId),
}

/// Persisted age-off edge into `document_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeOffEdge {
    pub edge_id: u64,
    pub document_id: DocumentId,
    pub rule_id: RuleId,
    pub source: AgeOffSource,
    pub relevant_date: EpochMillis,
    pub application: String,
    pub user: String,
    pub created_at: EpochMillis,
}

impl AgeOffEdge {
    pub fn is_inherited(&self) -> bool {
        matches!(self.source, AgeOffSource::Document(_))
    }
}
