//! Domain model for the provenance lineage graph.
//!
//! # Responsibility
//! - Define the vertices (documents, age-off rules, events) and edges
//!   (derived_from, age_off) persisted by the graph store.
//! - Keep one canonical shape shared by repositories and services.
//!
//! # Invariants
//! - Documents and rules are identified by stable, never reused ids.
//! - Documents are never deleted; aging-off only flips the `aged` flag.
//! - All timestamps are Unix epoch milliseconds.

pub mod audit;
pub mod document;
pub mod event;
pub mod lineage;
pub mod rule;

/// Unix epoch milliseconds.
pub type EpochMillis = i64;
