//! Provenance lineage and age-off engine.
//!
//! Tracks which documents derive from which, and keeps the age-off
//! (retention) obligations inherited along that lineage consistent as the
//! graph changes. SQLite is the graph store.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::ProvenanceConfig;
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::audit::AuditContext;
pub use model::document::{Document, DocumentId, DocumentInfo, DocumentRef};
pub use model::event::{AgeOffEvent, PurgeEvent, PurgeId};
pub use model::lineage::{AgeOffMapping, InheritanceInfo};
pub use model::rule::{AgeOffRule, RuleId};
pub use repo::event_repo::{EventRepository, SqliteEventRepository};
pub use repo::graph_repo::{GraphRepository, SqliteGraphRepository};
pub use repo::rule_repo::{RuleRepository, SqliteRuleRepository};
pub use repo::{RepoError, RepoResult};
pub use service::error::{ErrorKind, ProvenanceError, RuleRef};
pub use service::lineage_service::{
    AddDocumentEntry, AddDocumentResult, AddDocumentStatus, LineageService,
};
pub use service::query_service::{
    AgeOffInitiation, IdUriMapping, LineageResult, PurgeInitiation, PurgeUpdate, QueryService,
    UriIdMapping,
};
pub use service::rule_service::RuleService;

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
