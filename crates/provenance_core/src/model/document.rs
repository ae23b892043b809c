//! Document vertex model.
//!
//! # Invariants
//! - `uri` is unique across the graph and never changes.
//! - `document_id` is assigned by the store, increases monotonically and is
//!   never reused.
//! - `aged == true` means the document carries no age-off edges.

use super::lineage::AgeOffSource;
use super::rule::RuleId;
use super::EpochMillis;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable numeric document identifier.
pub type DocumentId = u64;

/// Document vertex as persisted in the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: DocumentId,
    pub uri: String,
    /// Set once the document has been aged off.
    pub aged: bool,
    pub application: String,
    pub user: String,
    pub created_at: EpochMillis,
}

/// Lookup key for a document: numeric id or uri.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRef {
    Id(DocumentId),
    Uri(String),
}

impl Display for DocumentRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Uri(uri) => write!(f, "uri={uri}"),
        }
    }
}

impl From<DocumentId> for DocumentRef {
    fn from(value: DocumentId) -> Self {
        Self::Id(value)
    }
}

impl From<&str> for DocumentRef {
    fn from(value: &str) -> Self {
        Self::Uri(value.to_string())
    }
}

/// Id/uri pair used when listing neighbours.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: DocumentId,
    pub uri: String,
}

impl From<&Document> for DocumentSummary {
    fn from(value: &Document) -> Self {
        Self {
            document_id: value.document_id,
            uri: value.uri.clone(),
        }
    }
}

/// One age-off obligation attached to a document, resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAgeOffInfo {
    pub rule_id: RuleId,
    pub relevant_date: EpochMillis,
    /// Copied from the rule, in days.
    pub maximum_execution_period: u32,
    /// Parent the obligation was inherited from; `None` for explicit rules.
    pub inherited_from: Option<DocumentSummary>,
    pub application: String,
    pub user: String,
    pub created_at: EpochMillis,
}

impl DocumentAgeOffInfo {
    pub fn is_inherited(&self) -> bool {
        self.inherited_from.is_some()
    }

    pub fn source(&self) -> AgeOffSource {
        match &self.inherited_from {
            Some(parent) => AgeOffSource::Document(parent.document_id),
            None => AgeOffSource::Rule(self.rule_id),
        }
    }
}

/// Full read model of one document and its immediate neighbourhood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document: Document,
    pub parents: Vec<DocumentSummary>,
    pub children: Vec<DocumentSummary>,
    pub age_off: Vec<DocumentAgeOffInfo>,
}
