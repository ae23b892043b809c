mod common;

use common::{add_rule, audit, document_id, edge_count, graph, lineage, setup, visible_date, T0};
use provenance_core::model::lineage::AgeOffSource;
use provenance_core::{
    AgeOffMapping, DocumentRef, ErrorKind, GraphRepository, InheritanceInfo, ProvenanceError,
    RuleRef,
};

#[test]
fn add_document_attaches_explicit_rules() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);

    let id = service
        .add_document("doc://a", &[], &[AgeOffMapping::new(rule, T0)], &audit())
        .unwrap();

    let document = graph(&conn).document_by_id(id).unwrap().unwrap();
    assert_eq!(document.uri, "doc://a");
    assert!(!document.aged);
    assert_eq!(document.application, "ingest");
    let edges = graph(&conn).age_off_edges(id).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, AgeOffSource::Rule(rule));
    assert_eq!(edges[0].relevant_date, T0);
}

#[test]
fn document_ids_increase_monotonically() {
    let conn = setup();
    let service = lineage(&conn);

    let first = service.add_document("doc://a", &[], &[], &audit()).unwrap();
    let second = service.add_document("doc://b", &[], &[], &audit()).unwrap();
    assert!(second > first);
}

#[test]
fn duplicate_uri_is_rejected() {
    let conn = setup();
    let service = lineage(&conn);
    service.add_document("doc://a", &[], &[], &audit()).unwrap();

    let err = service
        .add_document("doc://a", &[], &[], &audit())
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::DocumentExists(ref uri) if uri == "doc://a"));
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn every_missing_parent_is_reported() {
    let conn = setup();
    let service = lineage(&conn);
    service.add_document("doc://p1", &[], &[], &audit()).unwrap();

    let parents = [
        InheritanceInfo::tracking("doc://p1"),
        InheritanceInfo::tracking("doc://gone-1"),
        InheritanceInfo::tracking("doc://gone-2"),
    ];
    let err = service
        .add_document("doc://child", &parents, &[], &audit())
        .unwrap_err();

    match err {
        ProvenanceError::ParentsNotFound { uri, parent_uris } => {
            assert_eq!(uri, "doc://child");
            assert_eq!(parent_uris, vec!["doc://gone-1", "doc://gone-2"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(graph(&conn).document_by_uri("doc://child").unwrap().is_none());
}

#[test]
fn self_parent_is_circular() {
    let conn = setup();
    let service = lineage(&conn);

    let err = service
        .add_document(
            "doc://loop",
            &[InheritanceInfo::tracking("doc://loop")],
            &[],
            &audit(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircularDependency);
    assert!(graph(&conn).document_by_uri("doc://loop").unwrap().is_none());
}

#[test]
fn unknown_rule_fails_without_writing() {
    let conn = setup();
    let service = lineage(&conn);

    let err = service
        .add_document("doc://a", &[], &[AgeOffMapping::new(99, T0)], &audit())
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::RuleNotFound(RuleRef::Id(99))));
    assert!(graph(&conn).document_by_uri("doc://a").unwrap().is_none());
}

#[test]
fn blank_uri_is_invalid() {
    let conn = setup();
    let err = lineage(&conn)
        .add_document("   ", &[], &[], &audit())
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::InvalidDocumentUri));
}

#[test]
fn repeated_and_blank_parents_are_ignored() {
    let conn = setup();
    let service = lineage(&conn);
    service.add_document("doc://p", &[], &[], &audit()).unwrap();

    let parents = [
        InheritanceInfo::tracking("doc://p"),
        InheritanceInfo::tracking(""),
        InheritanceInfo::new("doc://p", false, false),
    ];
    let child = service
        .add_document("doc://c", &parents, &[], &audit())
        .unwrap();

    let links = graph(&conn).parent_links(child).unwrap();
    assert_eq!(links.len(), 1);
    assert!(links[0].inherit_age_off);
    assert!(links[0].track_age_off);
}

#[test]
fn child_inherits_parent_obligations() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://p", &[], &[AgeOffMapping::new(rule, T0)], &audit())
        .unwrap();

    service
        .add_document(
            "doc://c",
            &[InheritanceInfo::tracking("doc://p")],
            &[],
            &audit(),
        )
        .unwrap();

    assert_eq!(visible_date(&conn, "doc://c", rule), Some(T0));
    let parent_id = document_id(&conn, "doc://p");
    let edges = graph(&conn)
        .age_off_edges(document_id(&conn, "doc://c"))
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, AgeOffSource::Document(parent_id));
}

#[test]
fn link_override_replaces_parent_date() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://p", &[], &[AgeOffMapping::new(rule, T0)], &audit())
        .unwrap();

    service
        .add_document(
            "doc://c",
            &[InheritanceInfo::tracking("doc://p").with_relevant_date_override(T0 + 500)],
            &[],
            &audit(),
        )
        .unwrap();

    assert_eq!(visible_date(&conn, "doc://c", rule), Some(T0 + 500));
}

#[test]
fn non_inheriting_parent_contributes_lineage_only() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://p", &[], &[AgeOffMapping::new(rule, T0)], &audit())
        .unwrap();

    let child = service
        .add_document(
            "doc://c",
            &[InheritanceInfo::new("doc://p", false, false)],
            &[],
            &audit(),
        )
        .unwrap();

    assert_eq!(edge_count(&conn, "doc://c"), 0);
    assert_eq!(graph(&conn).parent_links(child).unwrap().len(), 1);
}

#[test]
fn oldest_parent_date_wins_across_parents() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://p1", &[], &[AgeOffMapping::new(rule, T0)], &audit())
        .unwrap();
    service
        .add_document(
            "doc://p2",
            &[],
            &[AgeOffMapping::new(rule, T0 - 1_000)],
            &audit(),
        )
        .unwrap();

    service
        .add_document(
            "doc://c",
            &[
                InheritanceInfo::tracking("doc://p1"),
                InheritanceInfo::tracking("doc://p2"),
            ],
            &[AgeOffMapping::new(rule, T0 + 1_000)],
            &audit(),
        )
        .unwrap();

    assert_eq!(edge_count(&conn, "doc://c"), 3);
    assert_eq!(visible_date(&conn, "doc://c", rule), Some(T0 - 1_000));
}

#[test]
fn missing_document_lookup_reports_uri() {
    let conn = setup();
    let err = lineage(&conn)
        .add_explicit_rule("doc://none", AgeOffMapping::new(1, T0), &audit())
        .unwrap_err();
    assert!(matches!(
        err,
        ProvenanceError::DocumentNotFound(DocumentRef::Uri(ref uri)) if uri == "doc://none"
    ));
}
