//! Error taxonomy of the provenance services.
//!
//! Every service call fails with one `ProvenanceError`; `kind()` collapses
//! the structured variants into the coarse categories hosts map to their
//! own status codes.

use crate::model::document::{DocumentId, DocumentRef};
use crate::model::event::PurgeId;
use crate::model::rule::{RuleId, RuleValidationError};
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Coarse error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    CircularDependency,
    InvalidArgument,
    PartialFailure,
    NotAuthorized,
    Storage,
}

/// Lookup key for a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleRef {
    Id(RuleId),
    Name(String),
}

impl Display for RuleRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Name(name) => write!(f, "name={name}"),
        }
    }
}

/// Errors from lineage, query and rule services.
#[derive(Debug)]
pub enum ProvenanceError {
    DocumentNotFound(DocumentRef),
    /// Every requested id that does not exist.
    DocumentIdsNotFound(Vec<DocumentId>),
    RuleNotFound(RuleRef),
    PurgeNotFound(PurgeId),
    DocumentExists(String),
    RuleNameExists(String),
    /// Rule already attached explicitly to the document.
    AgeOffExists {
        uri: String,
        rule_id: RuleId,
    },
    InheritanceExists {
        uri: String,
        parent_uri: String,
    },
    /// Link would make a document its own ancestor.
    CircularInheritance {
        uri: String,
        parent_uri: String,
    },
    /// Every parent uri of the request that does not exist.
    ParentsNotFound {
        uri: String,
        parent_uris: Vec<String>,
    },
    InvalidRule(RuleValidationError),
    InvalidDocumentUri,
    BatchTooLarge {
        size: usize,
        max: usize,
    },
    DocumentNotInPurge {
        purge_id: PurgeId,
        document_ids: Vec<DocumentId>,
    },
    /// Aged documents no longer accept lineage or age-off changes.
    DocumentAlreadyAged(String),
    NotAuthorized {
        application: String,
        operation: &'static str,
    },
    InvalidConfig(String),
    Repo(RepoError),
}

impl ProvenanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DocumentNotFound(_)
            | Self::DocumentIdsNotFound(_)
            | Self::RuleNotFound(_)
            | Self::PurgeNotFound(_) => ErrorKind::NotFound,
            Self::DocumentExists(_)
            | Self::RuleNameExists(_)
            | Self::AgeOffExists { .. }
            | Self::InheritanceExists { .. } => ErrorKind::AlreadyExists,
            Self::CircularInheritance { .. } => ErrorKind::CircularDependency,
            Self::ParentsNotFound { .. } => ErrorKind::PartialFailure,
            Self::InvalidRule(_)
            | Self::InvalidDocumentUri
            | Self::DocumentNotInPurge { .. }
            | Self::BatchTooLarge { .. }
            | Self::DocumentAlreadyAged(_)
            | Self::InvalidConfig(_) => ErrorKind::InvalidArgument,
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::Repo(_) => ErrorKind::Storage,
        }
    }
}

impl Display for ProvenanceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DocumentNotFound(document) => write!(f, "document not found: {document}"),
            Self::DocumentIdsNotFound(ids) => write!(f, "document ids not found: {ids:?}"),
            Self::RuleNotFound(rule) => write!(f, "age-off rule not found: {rule}"),
            Self::PurgeNotFound(id) => write!(f, "purge not found: {id}"),
            Self::DocumentExists(uri) => write!(f, "document already exists: {uri}"),
            Self::RuleNameExists(name) => write!(f, "age-off rule name already exists: {name}"),
            Self::AgeOffExists { uri, rule_id } => write!(
                f,
                "age-off rule {rule_id} is already attached to document {uri}"
            ),
            Self::InheritanceExists { uri, parent_uri } => write!(
                f,
                "document {uri} already derives from {parent_uri}"
            ),
            Self::CircularInheritance { uri, parent_uri } => write!(
                f,
                "linking {uri} to parent {parent_uri} would create a cycle"
            ),
            Self::ParentsNotFound { uri, parent_uris } => write!(
                f,
                "parents of {uri} not found: {parent_uris:?}"
            ),
            Self::InvalidRule(err) => write!(f, "{err}"),
            Self::InvalidDocumentUri => write!(f, "document uri must not be blank"),
            Self::BatchTooLarge { size, max } => {
                write!(f, "batch of {size} documents exceeds limit of {max}")
            }
            Self::DocumentNotInPurge {
                purge_id,
                document_ids,
            } => write!(
                f,
                "documents {document_ids:?} are not part of purge {purge_id}"
            ),
            Self::DocumentAlreadyAged(uri) => write!(f, "document already aged: {uri}"),
            Self::NotAuthorized {
                application,
                operation,
            } => write!(f, "application {application} may not {operation}"),
            Self::InvalidConfig(message) => write!(f, "invalid provenance config: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProvenanceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRule(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ProvenanceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<RuleValidationError> for ProvenanceError {
    fn from(value: RuleValidationError) -> Self {
        Self::InvalidRule(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ProvenanceError, RuleRef};
    use crate::model::rule::RuleValidationError;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            ProvenanceError::RuleNotFound(RuleRef::Id(3)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ProvenanceError::CircularInheritance {
                uri: "a".to_string(),
                parent_uri: "a".to_string(),
            }
            .kind(),
            ErrorKind::CircularDependency
        );
        assert_eq!(
            ProvenanceError::ParentsNotFound {
                uri: "a".to_string(),
                parent_uris: vec!["b".to_string()],
            }
            .kind(),
            ErrorKind::PartialFailure
        );
        assert_eq!(
            ProvenanceError::DocumentNotInPurge {
                purge_id: 1,
                document_ids: vec![9],
            }
            .kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            ProvenanceError::from(RuleValidationError::BlankName).kind(),
            ErrorKind::InvalidArgument
        );
    }
}
