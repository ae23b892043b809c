//! Read paths over the lineage graph plus purge and age-off bookkeeping.
//!
//! # Responsibility
//! - Ancestor/descendant closures and id/uri resolution.
//! - Rule maturity sweeps and age-off event records.
//! - Purge initiation, progress updates and lookups.
//!
//! # Invariants
//! - Unknown uris and ids are reported in "not found" lists, never as errors.
//! - Purge candidates are fixed at initiation.

use super::error::{ProvenanceError, RuleRef};
use crate::model::audit::AuditContext;
use crate::model::document::{
    Document, DocumentAgeOffInfo, DocumentId, DocumentInfo, DocumentRef, DocumentSummary,
};
use crate::model::event::{AgeOffEvent, AgeOffId, PurgeEvent, PurgeId};
use crate::model::lineage::AgeOffSource;
use crate::model::rule::{AgeOffRule, RuleId};
use crate::model::EpochMillis;
use crate::repo::event_repo::EventRepository;
use crate::repo::graph_repo::{GraphRepository, LineageDirection};
use crate::repo::RepoError;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Result of an ancestor or descendant query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineageResult {
    /// Closure of every found uri, including the found documents themselves.
    pub document_ids: BTreeSet<DocumentId>,
    pub uris_not_found: Vec<String>,
    /// One-hop neighbours; only set for a single found uri.
    pub immediate: Option<BTreeSet<DocumentId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdUriMapping {
    pub mapping: BTreeMap<DocumentId, String>,
    pub ids_not_found: Vec<DocumentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UriIdMapping {
    pub mapping: BTreeMap<String, DocumentId>,
    pub uris_not_found: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeOffInitiation {
    pub age_off_id: AgeOffId,
    pub document_ids: Vec<DocumentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeInitiation {
    pub purge_id: PurgeId,
    pub document_ids: BTreeSet<DocumentId>,
    pub uris_not_found: Vec<String>,
}

/// Progress report for a running purge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PurgeUpdate<'a> {
    pub completely_purged_document_ids: BTreeSet<DocumentId>,
    /// Appended to the description when not blank.
    pub note: Option<&'a str>,
    pub resolved: bool,
}

/// Query facade over graph and event repositories sharing one connection.
pub struct QueryService<G: GraphRepository, E: EventRepository> {
    graph: G,
    events: E,
}

impl<G: GraphRepository, E: EventRepository> QueryService<G, E> {
    pub fn new(graph: G, events: E) -> Self {
        Self { graph, events }
    }

    pub fn ancestors(&self, uris: &[String]) -> Result<LineageResult, ProvenanceError> {
        self.lineage(uris, LineageDirection::Ancestors)
    }

    pub fn descendants(&self, uris: &[String]) -> Result<LineageResult, ProvenanceError> {
        self.lineage(uris, LineageDirection::Descendants)
    }

    /// Non-aged documents whose obligation for `rule_id` has matured at
    /// `effective_time`, ascending by id.
    pub fn due_for_age_off(
        &self,
        rule_id: RuleId,
        effective_time: EpochMillis,
    ) -> Result<Vec<DocumentId>, ProvenanceError> {
        let rule = self.require_rule(rule_id)?;
        Ok(self
            .graph
            .documents_due(rule_id, rule.maturity_cutoff(effective_time))?)
    }

    /// Runs the maturity sweep and records it as an age-off event.
    pub fn initiate_age_off(
        &self,
        rule_id: RuleId,
        effective_time: EpochMillis,
        audit: &AuditContext,
    ) -> Result<AgeOffInitiation, ProvenanceError> {
        let initiation = self.events.in_transaction(|| {
            let document_ids = self.due_for_age_off(rule_id, effective_time)?;
            let age_off_id = self.events.insert_age_off_event(
                rule_id,
                effective_time,
                document_ids.len() as u64,
                audit,
            )?;
            Ok::<_, ProvenanceError>(AgeOffInitiation {
                age_off_id,
                document_ids,
            })
        })?;

        info!(
            "event=age_off_initiate module=query status=ok age_off_id={} rule_id={} documents={}",
            initiation.age_off_id,
            rule_id,
            initiation.document_ids.len()
        );
        Ok(initiation)
    }

    pub fn age_off_info(&self, age_off_id: AgeOffId) -> Result<Option<AgeOffEvent>, ProvenanceError> {
        Ok(self.events.age_off_event_by_id(age_off_id)?)
    }

    /// Records a purge over the ancestor and descendant closure of `uris`.
    pub fn initiate_purge(
        &self,
        uris: &[String],
        name: &str,
        description: &str,
        audit: &AuditContext,
    ) -> Result<PurgeInitiation, ProvenanceError> {
        let initiation = self.events.in_transaction(|| {
            let (found, uris_not_found) = self.resolve_uris(uris)?;
            let mut document_ids = BTreeSet::new();
            for document in &found {
                document_ids.extend(
                    self.graph
                        .closure(document.document_id, LineageDirection::Ancestors)?,
                );
                document_ids.extend(
                    self.graph
                        .closure(document.document_id, LineageDirection::Descendants)?,
                );
            }

            let purge_id = self.events.insert_purge(
                name,
                description,
                uris,
                &uris_not_found,
                &document_ids,
                audit,
            )?;
            Ok::<_, ProvenanceError>(PurgeInitiation {
                purge_id,
                document_ids,
                uris_not_found,
            })
        })?;

        info!(
            "event=purge_initiate module=query status=ok purge_id={} documents={} uris_not_found={}",
            initiation.purge_id,
            initiation.document_ids.len(),
            initiation.uris_not_found.len()
        );
        Ok(initiation)
    }

    /// Records purge progress.
    ///
    /// # Errors
    /// - `PurgeNotFound` for an unknown purge.
    /// - `DocumentNotInPurge` listing ids outside the candidate set.
    pub fn update_purge(
        &self,
        purge_id: PurgeId,
        update: &PurgeUpdate<'_>,
        audit: &AuditContext,
    ) -> Result<(), ProvenanceError> {
        self.events.in_transaction(|| {
            let purge = self.require_purge(purge_id)?;
            let outside: Vec<DocumentId> = update
                .completely_purged_document_ids
                .difference(&purge.purge_document_ids)
                .copied()
                .collect();
            if !outside.is_empty() {
                return Err(ProvenanceError::DocumentNotInPurge {
                    purge_id,
                    document_ids: outside,
                });
            }

            let mut description = purge.description;
            if let Some(note) = update.note.filter(|note| !note.trim().is_empty()) {
                if !description.is_empty() {
                    description.push_str("\n\n");
                }
                description.push_str(&format!(
                    "Note: {} {} {}\n{}",
                    audit.timestamp, audit.application, audit.user, note
                ));
            }

            self.events
                .mark_completely_purged(purge_id, &update.completely_purged_document_ids)?;
            self.events.update_purge_status(
                purge_id,
                &description,
                update.resolved,
                audit.timestamp,
            )?;

            info!(
                "event=purge_update module=query status=ok purge_id={} purged={} resolved={}",
                purge_id,
                update.completely_purged_document_ids.len(),
                update.resolved
            );
            Ok(())
        })
    }

    pub fn purge_info(&self, purge_id: PurgeId) -> Result<PurgeEvent, ProvenanceError> {
        self.require_purge(purge_id)
    }

    pub fn all_purge_ids(&self) -> Result<Vec<PurgeId>, ProvenanceError> {
        Ok(self.events.purge_ids()?)
    }

    pub fn uris_for_ids(&self, ids: &[DocumentId]) -> Result<IdUriMapping, ProvenanceError> {
        let mut result = IdUriMapping::default();
        for document_id in ids {
            match self.graph.document_by_id(*document_id)? {
                Some(document) => {
                    result.mapping.insert(document.document_id, document.uri);
                }
                None if !result.ids_not_found.contains(document_id) => {
                    result.ids_not_found.push(*document_id);
                }
                None => {}
            }
        }
        Ok(result)
    }

    pub fn ids_for_uris(&self, uris: &[String]) -> Result<UriIdMapping, ProvenanceError> {
        let (found, uris_not_found) = self.resolve_uris(uris)?;
        Ok(UriIdMapping {
            mapping: found
                .into_iter()
                .map(|document| (document.uri, document.document_id))
                .collect(),
            uris_not_found,
        })
    }

    /// Subset of `ids` that exists.
    pub fn existing_ids(
        &self,
        ids: &BTreeSet<DocumentId>,
    ) -> Result<BTreeSet<DocumentId>, ProvenanceError> {
        let mut existing = BTreeSet::new();
        for document_id in ids {
            if self.graph.document_by_id(*document_id)?.is_some() {
                existing.insert(*document_id);
            }
        }
        Ok(existing)
    }

    /// Document with its neighbours and resolved age-off obligations.
    pub fn document_info(&self, document: &DocumentRef) -> Result<DocumentInfo, ProvenanceError> {
        let found = match document {
            DocumentRef::Id(id) => self.graph.document_by_id(*id)?,
            DocumentRef::Uri(uri) => self.graph.document_by_uri(uri)?,
        };
        let document = found.ok_or_else(|| ProvenanceError::DocumentNotFound(document.clone()))?;

        let parents = self.summaries(
            self.graph
                .parent_links(document.document_id)?
                .iter()
                .map(|link| link.parent_id),
        )?;
        let children = self.summaries(
            self.graph
                .child_links(document.document_id)?
                .iter()
                .map(|link| link.child_id),
        )?;

        let mut rules: BTreeMap<RuleId, AgeOffRule> = BTreeMap::new();
        let mut age_off = Vec::new();
        for edge in self.graph.age_off_edges(document.document_id)? {
            if !rules.contains_key(&edge.rule_id) {
                let rule = self.graph.rule_by_id(edge.rule_id)?.ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "age-off edge {} references missing rule {}",
                        edge.edge_id, edge.rule_id
                    ))
                })?;
                rules.insert(edge.rule_id, rule);
            }
            let maximum_execution_period = rules
                .get(&edge.rule_id)
                .map(|rule| rule.maximum_execution_period)
                .unwrap_or_default();
            let inherited_from = match edge.source {
                AgeOffSource::Rule(_) => None,
                AgeOffSource::Document(parent_id) => self
                    .graph
                    .document_by_id(parent_id)?
                    .as_ref()
                    .map(DocumentSummary::from),
            };
            age_off.push(DocumentAgeOffInfo {
                rule_id: edge.rule_id,
                relevant_date: edge.relevant_date,
                maximum_execution_period,
                inherited_from,
                application: edge.application,
                user: edge.user,
                created_at: edge.created_at,
            });
        }

        Ok(DocumentInfo {
            document,
            parents,
            children,
            age_off,
        })
    }

    fn lineage(
        &self,
        uris: &[String],
        direction: LineageDirection,
    ) -> Result<LineageResult, ProvenanceError> {
        let (found, uris_not_found) = self.resolve_uris(uris)?;
        let mut document_ids = BTreeSet::new();
        for document in &found {
            document_ids.extend(self.graph.closure(document.document_id, direction)?);
        }

        let immediate = match found.as_slice() {
            [single] if uris.len() == 1 => {
                let links = match direction {
                    LineageDirection::Ancestors => self.graph.parent_links(single.document_id)?,
                    LineageDirection::Descendants => self.graph.child_links(single.document_id)?,
                };
                Some(
                    links
                        .iter()
                        .map(|link| match direction {
                            LineageDirection::Ancestors => link.parent_id,
                            LineageDirection::Descendants => link.child_id,
                        })
                        .collect(),
                )
            }
            _ => None,
        };

        Ok(LineageResult {
            document_ids,
            uris_not_found,
            immediate,
        })
    }

    /// Splits `uris` into found documents and unknown uris, each deduplicated
    /// in request order.
    fn resolve_uris(&self, uris: &[String]) -> Result<(Vec<Document>, Vec<String>), ProvenanceError> {
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        let mut not_found = Vec::new();
        for uri in uris {
            if !seen.insert(uri.as_str()) {
                continue;
            }
            match self.graph.document_by_uri(uri)? {
                Some(document) => found.push(document),
                None => not_found.push(uri.clone()),
            }
        }
        Ok((found, not_found))
    }

    fn summaries(
        &self,
        ids: impl Iterator<Item = DocumentId>,
    ) -> Result<Vec<DocumentSummary>, ProvenanceError> {
        let mut summaries = Vec::new();
        for document_id in ids {
            if let Some(document) = self.graph.document_by_id(document_id)? {
                summaries.push(DocumentSummary::from(&document));
            }
        }
        Ok(summaries)
    }

    fn require_rule(&self, rule_id: RuleId) -> Result<AgeOffRule, ProvenanceError> {
        self.graph
            .rule_by_id(rule_id)?
            .ok_or(ProvenanceError::RuleNotFound(RuleRef::Id(rule_id)))
    }

    fn require_purge(&self, purge_id: PurgeId) -> Result<PurgeEvent, ProvenanceError> {
        self.events
            .purge_by_id(purge_id)?
            .ok_or(ProvenanceError::PurgeNotFound(purge_id))
    }
}
