//! Lineage mutation service.
//!
//! # Responsibility
//! - Insert documents (single and batch) with their derivation links.
//! - Attach and detach explicit age-off rules and inheritance links.
//! - Keep inherited age-off edges consistent after every mutation.
//!
//! # Invariants
//! - Every call validates before it writes and runs in one transaction.
//! - For a tracking link `child -> parent` and a rule, the child carries an
//!   edge sourced from the parent iff the parent carries any edge for the
//!   rule, dated by the link override or else the parent's oldest date.
//! - Links with `track_age_off == false` are never revisited.
//! - Aged documents are skipped by cascades and reject new obligations.

use super::batch_order;
use super::error::{ProvenanceError, RuleRef};
use crate::config::ProvenanceConfig;
use crate::model::audit::AuditContext;
use crate::model::document::{Document, DocumentId, DocumentRef};
use crate::model::lineage::{AgeOffMapping, AgeOffSource, InheritanceInfo};
use crate::model::rule::RuleId;
use crate::repo::graph_repo::{GraphRepository, LineageDirection};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// One document of a bulk insertion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDocumentEntry {
    pub uri: String,
    pub parents: Vec<InheritanceInfo>,
}

impl AddDocumentEntry {
    pub fn new(uri: impl Into<String>, parents: Vec<InheritanceInfo>) -> Self {
        Self {
            uri: uri.into(),
            parents,
        }
    }
}

/// Outcome category of one bulk entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddDocumentStatus {
    Success,
    AlreadyExists,
    ParentNotFound,
    CircularInheritanceNotAllowed,
    InvalidUri,
}

/// Per-entry result of a bulk insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDocumentResult {
    pub status: AddDocumentStatus,
    /// New id on success, existing id for `AlreadyExists`.
    pub document_id: Option<DocumentId>,
    /// Populated for `ParentNotFound`.
    pub parents_not_found: Vec<String>,
}

impl AddDocumentResult {
    fn with_status(status: AddDocumentStatus) -> Self {
        Self {
            status,
            document_id: None,
            parents_not_found: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AddDocumentStatus::Success
    }
}

/// Lineage mutation facade.
pub struct LineageService<G: GraphRepository> {
    repo: G,
    config: ProvenanceConfig,
}

impl<G: GraphRepository> LineageService<G> {
    /// Creates service with default configuration.
    pub fn new(repo: G) -> Self {
        Self {
            repo,
            config: ProvenanceConfig::default(),
        }
    }

    /// Creates service with validated configuration.
    pub fn with_config(repo: G, config: ProvenanceConfig) -> Result<Self, ProvenanceError> {
        config.validate()?;
        Ok(Self { repo, config })
    }

    /// Inserts one document with its parents and explicit rules.
    ///
    /// # Errors
    /// - `InvalidDocumentUri` for a blank uri.
    /// - `DocumentExists` when the uri is taken.
    /// - `CircularInheritance` when the document lists itself as parent.
    /// - `ParentsNotFound` listing every unknown parent.
    /// - `RuleNotFound` for an unknown explicit rule.
    pub fn add_document(
        &self,
        uri: &str,
        parents: &[InheritanceInfo],
        mappings: &[AgeOffMapping],
        audit: &AuditContext,
    ) -> Result<DocumentId, ProvenanceError> {
        let mappings = dedupe_mappings(mappings);
        self.repo.in_transaction(|| {
            self.ensure_rules_exist(&mappings)?;
            self.insert_document(uri, parents, &mappings, audit)
        })
    }

    /// Inserts a batch of documents whose parents may be in the same batch.
    ///
    /// `shared_mappings` are attached explicitly to every inserted entry.
    /// Per-entry failures are reported in the returned map; the call itself
    /// fails only for oversized batches, unknown shared rules or storage
    /// errors, in which case nothing is written.
    pub fn add_documents(
        &self,
        entries: &[AddDocumentEntry],
        shared_mappings: &[AgeOffMapping],
        audit: &AuditContext,
    ) -> Result<BTreeMap<String, AddDocumentResult>, ProvenanceError> {
        if entries.len() > self.config.max_batch_size {
            return Err(ProvenanceError::BatchTooLarge {
                size: entries.len(),
                max: self.config.max_batch_size,
            });
        }

        let mappings = dedupe_mappings(shared_mappings);
        let mut results = BTreeMap::new();
        let mut merged: BTreeMap<String, Vec<InheritanceInfo>> = BTreeMap::new();
        for entry in entries {
            if entry.uri.trim().is_empty() {
                results.insert(
                    entry.uri.clone(),
                    AddDocumentResult::with_status(AddDocumentStatus::InvalidUri),
                );
                continue;
            }
            merged
                .entry(entry.uri.clone())
                .or_default()
                .extend(entry.parents.iter().cloned());
        }
        if merged.len() + results.len() < entries.len() {
            warn!(
                "event=batch_merge module=lineage status=merged entries={} distinct={}",
                entries.len(),
                merged.len()
            );
        }

        let graph: BTreeMap<String, BTreeSet<String>> = merged
            .iter()
            .map(|(uri, parents)| {
                let parent_uris = parents
                    .iter()
                    .map(|parent| parent.parent_uri.clone())
                    .filter(|parent_uri| !parent_uri.trim().is_empty())
                    .collect();
                (uri.clone(), parent_uris)
            })
            .collect();
        let ordered = batch_order::order(&graph);

        let inserted = self.repo.in_transaction(|| {
            self.ensure_rules_exist(&mappings)?;
            let mut inserted = BTreeMap::new();
            for uri in &ordered {
                let parents = merged.get(uri).map(Vec::as_slice).unwrap_or_default();
                let result = self.insert_batch_entry(uri, parents, &mappings, audit)?;
                inserted.insert(uri.clone(), result);
            }
            Ok::<_, ProvenanceError>(inserted)
        })?;
        results.extend(inserted);

        for uri in merged.keys() {
            results.entry(uri.clone()).or_insert_with(|| {
                AddDocumentResult::with_status(AddDocumentStatus::CircularInheritanceNotAllowed)
            });
        }

        let succeeded = results.values().filter(|result| result.is_success()).count();
        info!(
            "event=documents_add module=lineage status=ok entries={} succeeded={} rejected={}",
            entries.len(),
            succeeded,
            results.len() - succeeded
        );
        Ok(results)
    }

    /// Links an existing child to an existing parent and propagates the
    /// parent's obligations when `info.inherit_age_off` is set.
    pub fn add_inheritance_info(
        &self,
        child_uri: &str,
        info: &InheritanceInfo,
        audit: &AuditContext,
    ) -> Result<(), ProvenanceError> {
        self.repo.in_transaction(|| {
            let child = self.require_document(child_uri)?;
            ensure_not_aged(&child)?;
            if info.parent_uri == child.uri {
                return Err(circular(child_uri, &info.parent_uri));
            }
            let parent = self.require_document(&info.parent_uri)?;
            if self
                .repo
                .derived_from(child.document_id, parent.document_id)?
                .is_some()
            {
                return Err(ProvenanceError::InheritanceExists {
                    uri: child.uri.clone(),
                    parent_uri: parent.uri.clone(),
                });
            }
            let descendants = self
                .repo
                .closure(child.document_id, LineageDirection::Descendants)?;
            if descendants.contains(&parent.document_id) {
                return Err(circular(child_uri, &info.parent_uri));
            }

            self.repo
                .insert_derived_from(child.document_id, parent.document_id, info, audit)?;
            let rules = if info.inherit_age_off {
                self.inherit_from(child.document_id, parent.document_id, info, audit)?
            } else {
                BTreeSet::new()
            };
            let cascaded = self.cascade(child.document_id, &rules, audit)?;

            info!(
                "event=inheritance_add module=lineage status=ok child_id={} parent_id={} rules={} cascaded={}",
                child.document_id,
                parent.document_id,
                rules.len(),
                cascaded
            );
            Ok(())
        })
    }

    /// Stops age-off inheritance from `parent_uri`. Lineage is kept; the
    /// link's flags are cleared. No link is a no-op.
    pub fn remove_inheritance(
        &self,
        child_uri: &str,
        parent_uri: &str,
        audit: &AuditContext,
    ) -> Result<(), ProvenanceError> {
        self.repo.in_transaction(|| {
            let child = self.require_document(child_uri)?;
            ensure_not_aged(&child)?;
            let parent = self.require_document(parent_uri)?;
            if self
                .repo
                .derived_from(child.document_id, parent.document_id)?
                .is_none()
            {
                return Ok(());
            }

            let rules = self
                .repo
                .delete_inherited_edges(child.document_id, parent.document_id)?;
            self.repo
                .clear_inheritance_flags(child.document_id, parent.document_id)?;
            let cascaded = self.cascade(child.document_id, &rules, audit)?;

            info!(
                "event=inheritance_remove module=lineage status=ok child_id={} parent_id={} rules={} cascaded={}",
                child.document_id,
                parent.document_id,
                rules.len(),
                cascaded
            );
            Ok(())
        })
    }

    /// Attaches a rule explicitly to a document and cascades.
    pub fn add_explicit_rule(
        &self,
        uri: &str,
        mapping: AgeOffMapping,
        audit: &AuditContext,
    ) -> Result<(), ProvenanceError> {
        self.repo.in_transaction(|| {
            let document = self.require_document(uri)?;
            ensure_not_aged(&document)?;
            self.ensure_rules_exist(&[mapping])?;
            let source = AgeOffSource::Rule(mapping.rule_id);
            if self
                .repo
                .age_off_edge(document.document_id, mapping.rule_id, source)?
                .is_some()
            {
                return Err(ProvenanceError::AgeOffExists {
                    uri: document.uri.clone(),
                    rule_id: mapping.rule_id,
                });
            }

            self.repo.insert_age_off_edge(
                document.document_id,
                mapping.rule_id,
                source,
                mapping.relevant_date,
                audit,
            )?;
            let cascaded =
                self.cascade(document.document_id, &BTreeSet::from([mapping.rule_id]), audit)?;

            info!(
                "event=explicit_rule_add module=lineage status=ok document_id={} rule_id={} cascaded={}",
                document.document_id, mapping.rule_id, cascaded
            );
            Ok(())
        })
    }

    /// Detaches an explicit rule and cascades. No attachment is a no-op.
    pub fn remove_explicit_rule(
        &self,
        uri: &str,
        rule_id: RuleId,
        audit: &AuditContext,
    ) -> Result<(), ProvenanceError> {
        self.repo.in_transaction(|| {
            let document = self.require_document(uri)?;
            ensure_not_aged(&document)?;
            if self.repo.rule_by_id(rule_id)?.is_none() {
                return Err(ProvenanceError::RuleNotFound(RuleRef::Id(rule_id)));
            }
            let Some(edge) = self.repo.age_off_edge(
                document.document_id,
                rule_id,
                AgeOffSource::Rule(rule_id),
            )?
            else {
                return Ok(());
            };

            self.repo.delete_age_off_edge(edge.edge_id)?;
            let cascaded =
                self.cascade(document.document_id, &BTreeSet::from([rule_id]), audit)?;

            info!(
                "event=explicit_rule_remove module=lineage status=ok document_id={} rule_id={} cascaded={}",
                document.document_id, rule_id, cascaded
            );
            Ok(())
        })
    }

    /// Marks documents as aged and drops every age-off edge into them.
    ///
    /// Descendants keep the edges they already inherited.
    pub fn mark_aged(&self, document_ids: &BTreeSet<DocumentId>) -> Result<(), ProvenanceError> {
        self.repo.in_transaction(|| {
            let mut missing = Vec::new();
            for document_id in document_ids {
                if self.repo.document_by_id(*document_id)?.is_none() {
                    missing.push(*document_id);
                }
            }
            if !missing.is_empty() {
                return Err(ProvenanceError::DocumentIdsNotFound(missing));
            }

            let mut removed_edges = 0;
            for document_id in document_ids {
                self.repo.mark_document_aged(*document_id)?;
                removed_edges += self.repo.delete_all_age_off_edges(*document_id)?;
            }

            info!(
                "event=documents_aged module=lineage status=ok documents={} edges_removed={}",
                document_ids.len(),
                removed_edges
            );
            Ok(())
        })
    }

    fn insert_batch_entry(
        &self,
        uri: &str,
        parents: &[InheritanceInfo],
        mappings: &[AgeOffMapping],
        audit: &AuditContext,
    ) -> Result<AddDocumentResult, ProvenanceError> {
        match self.insert_document(uri, parents, mappings, audit) {
            Ok(document_id) => Ok(AddDocumentResult {
                status: AddDocumentStatus::Success,
                document_id: Some(document_id),
                parents_not_found: Vec::new(),
            }),
            Err(ProvenanceError::DocumentExists(_)) => Ok(AddDocumentResult {
                status: AddDocumentStatus::AlreadyExists,
                document_id: self.repo.document_by_uri(uri)?.map(|doc| doc.document_id),
                parents_not_found: Vec::new(),
            }),
            Err(ProvenanceError::ParentsNotFound { parent_uris, .. }) => Ok(AddDocumentResult {
                status: AddDocumentStatus::ParentNotFound,
                document_id: None,
                parents_not_found: parent_uris,
            }),
            Err(ProvenanceError::CircularInheritance { .. }) => Ok(
                AddDocumentResult::with_status(AddDocumentStatus::CircularInheritanceNotAllowed),
            ),
            Err(ProvenanceError::InvalidDocumentUri) => Ok(AddDocumentResult::with_status(
                AddDocumentStatus::InvalidUri,
            )),
            Err(other) => Err(other),
        }
    }

    /// Validates and writes one document. Caller owns the transaction and
    /// has already checked that every mapped rule exists.
    fn insert_document(
        &self,
        uri: &str,
        parents: &[InheritanceInfo],
        mappings: &[AgeOffMapping],
        audit: &AuditContext,
    ) -> Result<DocumentId, ProvenanceError> {
        if uri.trim().is_empty() {
            return Err(ProvenanceError::InvalidDocumentUri);
        }
        if self.repo.document_by_uri(uri)?.is_some() {
            return Err(ProvenanceError::DocumentExists(uri.to_string()));
        }

        let parents = dedupe_parents(parents);
        if let Some(own) = parents.iter().find(|parent| parent.parent_uri == uri) {
            return Err(circular(uri, &own.parent_uri));
        }

        let mut resolved = Vec::with_capacity(parents.len());
        let mut missing = Vec::new();
        for info in parents {
            match self.repo.document_by_uri(&info.parent_uri)? {
                Some(parent) => resolved.push((parent, info)),
                None => missing.push(info.parent_uri.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ProvenanceError::ParentsNotFound {
                uri: uri.to_string(),
                parent_uris: missing,
            });
        }

        let document_id = self.repo.insert_document(uri, audit)?;
        for mapping in mappings {
            self.repo.insert_age_off_edge(
                document_id,
                mapping.rule_id,
                AgeOffSource::Rule(mapping.rule_id),
                mapping.relevant_date,
                audit,
            )?;
        }
        for (parent, info) in &resolved {
            self.repo
                .insert_derived_from(document_id, parent.document_id, info, audit)?;
            if info.inherit_age_off {
                self.inherit_from(document_id, parent.document_id, info, audit)?;
            }
        }

        info!(
            "event=document_add module=lineage status=ok document_id={} parents={} rules={}",
            document_id,
            resolved.len(),
            mappings.len()
        );
        Ok(document_id)
    }

    /// Copies every obligation of `parent_id` onto `child_id` through one
    /// link; returns the rules touched.
    fn inherit_from(
        &self,
        child_id: DocumentId,
        parent_id: DocumentId,
        info: &InheritanceInfo,
        audit: &AuditContext,
    ) -> Result<BTreeSet<RuleId>, ProvenanceError> {
        let parent_dates = self.repo.oldest_relevant_dates(parent_id)?;
        for (rule_id, oldest) in &parent_dates {
            let relevant_date = info.relevant_date_override.unwrap_or(*oldest);
            self.repo.insert_age_off_edge(
                child_id,
                *rule_id,
                AgeOffSource::Document(parent_id),
                relevant_date,
                audit,
            )?;
        }
        Ok(parent_dates.into_keys().collect())
    }

    /// Pushes (document, rule) changes down tracking links until nothing
    /// changes. Returns the number of edges created, updated or deleted.
    fn cascade(
        &self,
        document_id: DocumentId,
        rules: &BTreeSet<RuleId>,
        audit: &AuditContext,
    ) -> Result<usize, ProvenanceError> {
        let mut work: VecDeque<(DocumentId, RuleId)> =
            rules.iter().map(|rule_id| (document_id, *rule_id)).collect();
        let mut changed_edges = 0;

        while let Some((source_id, rule_id)) = work.pop_front() {
            let oldest = self.repo.oldest_relevant_date(source_id, rule_id)?;
            for link in self.repo.child_links(source_id)? {
                if !link.cascades() {
                    continue;
                }
                let child_id = link.child_id;
                match self.repo.document_by_id(child_id)? {
                    Some(child) if !child.aged => {}
                    _ => continue,
                }

                let desired = oldest.map(|date| link.propagated_date(date));
                let source = AgeOffSource::Document(source_id);
                let existing = self.repo.age_off_edge(child_id, rule_id, source)?;
                let before = self.repo.oldest_relevant_date(child_id, rule_id)?;

                match (existing, desired) {
                    (None, None) => continue,
                    (None, Some(date)) => {
                        self.repo
                            .insert_age_off_edge(child_id, rule_id, source, date, audit)?;
                    }
                    (Some(edge), None) => self.repo.delete_age_off_edge(edge.edge_id)?,
                    (Some(edge), Some(date)) => {
                        if edge.relevant_date == date {
                            continue;
                        }
                        self.repo.update_age_off_edge_date(edge.edge_id, date)?;
                    }
                }
                changed_edges += 1;

                let after = self.repo.oldest_relevant_date(child_id, rule_id)?;
                if before != after {
                    work.push_back((child_id, rule_id));
                }
            }
        }

        Ok(changed_edges)
    }

    fn require_document(&self, uri: &str) -> Result<Document, ProvenanceError> {
        self.repo
            .document_by_uri(uri)?
            .ok_or_else(|| ProvenanceError::DocumentNotFound(DocumentRef::from(uri)))
    }

    fn ensure_rules_exist(&self, mappings: &[AgeOffMapping]) -> Result<(), ProvenanceError> {
        for mapping in mappings {
            if self.repo.rule_by_id(mapping.rule_id)?.is_none() {
                return Err(ProvenanceError::RuleNotFound(RuleRef::Id(mapping.rule_id)));
            }
        }
        Ok(())
    }
}

fn ensure_not_aged(document: &Document) -> Result<(), ProvenanceError> {
    if document.aged {
        return Err(ProvenanceError::DocumentAlreadyAged(document.uri.clone()));
    }
    Ok(())
}

fn circular(uri: &str, parent_uri: &str) -> ProvenanceError {
    ProvenanceError::CircularInheritance {
        uri: uri.to_string(),
        parent_uri: parent_uri.to_string(),
    }
}

/// Drops blank parent uris and repeats of an already listed parent.
fn dedupe_parents(parents: &[InheritanceInfo]) -> Vec<&InheritanceInfo> {
    let mut seen = BTreeSet::new();
    let mut kept = Vec::with_capacity(parents.len());
    for info in parents {
        if info.parent_uri.trim().is_empty() {
            warn!("event=parent_skipped module=lineage status=ignored reason=blank_uri");
            continue;
        }
        if !seen.insert(info.parent_uri.as_str()) {
            warn!("event=parent_skipped module=lineage status=ignored reason=duplicate");
            continue;
        }
        kept.push(info);
    }
    kept
}

/// Keeps the first mapping per rule.
fn dedupe_mappings(mappings: &[AgeOffMapping]) -> Vec<AgeOffMapping> {
    let mut seen = BTreeSet::new();
    let mut kept = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        if seen.insert(mapping.rule_id) {
            kept.push(*mapping);
        } else {
            warn!(
                "event=mapping_skipped module=lineage status=ignored reason=duplicate rule_id={}",
                mapping.rule_id
            );
        }
    }
    kept
}
