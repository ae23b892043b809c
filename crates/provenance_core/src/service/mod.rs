//! Use-case services of the provenance engine.
//!
//! # Responsibility
//! - Validate requests above the repository layer.
//! - Orchestrate repository calls into transactional operations.

pub mod batch_order;
pub mod error;
pub mod lineage_service;
pub mod query_service;
pub mod rule_service;
