mod common;

use common::{
    add_rule, audit, document_id, edge_count, graph, lineage, query, setup, uris, visible_date, T0,
};
use provenance_core::{
    AgeOffMapping, ErrorKind, GraphRepository, InheritanceInfo, ProvenanceError,
};
use std::collections::BTreeSet;

const D1: i64 = T0 - 10_000;
const D2: i64 = T0;

#[test]
fn oldest_source_wins_and_removal_recomputes() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://p", &[], &[AgeOffMapping::new(rule, D1)], &audit())
        .unwrap();
    service
        .add_document(
            "doc://c",
            &[InheritanceInfo::tracking("doc://p")],
            &[AgeOffMapping::new(rule, D2)],
            &audit(),
        )
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://c", rule), Some(D1));

    service
        .remove_inheritance("doc://c", "doc://p", &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://c", rule), Some(D2));

    service
        .remove_explicit_rule("doc://c", rule, &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://c", rule), None);
    assert_eq!(edge_count(&conn, "doc://c"), 0);
}

#[test]
fn explicit_rule_changes_cascade_down_tracking_chain() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service.add_document("doc://a", &[], &[], &audit()).unwrap();
    service
        .add_document("doc://b", &[InheritanceInfo::tracking("doc://a")], &[], &audit())
        .unwrap();
    service
        .add_document("doc://c", &[InheritanceInfo::tracking("doc://b")], &[], &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://c", rule), None);

    service
        .add_explicit_rule("doc://a", AgeOffMapping::new(rule, D2), &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://b", rule), Some(D2));
    assert_eq!(visible_date(&conn, "doc://c", rule), Some(D2));

    service
        .remove_explicit_rule("doc://a", rule, &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://b", rule), None);
    assert_eq!(visible_date(&conn, "doc://c", rule), None);
}

#[test]
fn older_date_upstream_updates_descendants_in_place() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let other = add_rule(&conn, "two-day", 2 * common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://a", &[], &[AgeOffMapping::new(rule, D2)], &audit())
        .unwrap();
    service.add_document("doc://x", &[], &[], &audit()).unwrap();
    service
        .add_document(
            "doc://b",
            &[
                InheritanceInfo::tracking("doc://a"),
                InheritanceInfo::tracking("doc://x"),
            ],
            &[],
            &audit(),
        )
        .unwrap();
    service
        .add_document("doc://c", &[InheritanceInfo::tracking("doc://b")], &[], &audit())
        .unwrap();

    service
        .add_explicit_rule("doc://x", AgeOffMapping::new(rule, D1), &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://b", rule), Some(D1));
    assert_eq!(visible_date(&conn, "doc://c", rule), Some(D1));
    assert_eq!(edge_count(&conn, "doc://c"), 1);

    service
        .add_explicit_rule("doc://x", AgeOffMapping::new(other, D2), &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://c", other), Some(D2));
    assert_eq!(edge_count(&conn, "doc://c"), 2);
}

#[test]
fn override_link_keeps_its_date_but_follows_presence() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service.add_document("doc://a", &[], &[], &audit()).unwrap();
    service
        .add_document(
            "doc://b",
            &[InheritanceInfo::tracking("doc://a").with_relevant_date_override(T0 + 7)],
            &[],
            &audit(),
        )
        .unwrap();

    service
        .add_explicit_rule("doc://a", AgeOffMapping::new(rule, D1), &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://b", rule), Some(T0 + 7));

    service
        .remove_explicit_rule("doc://a", rule, &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://b", rule), None);
}

#[test]
fn untracked_link_is_frozen_at_creation() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let other = add_rule(&conn, "two-day", 2 * common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://a", &[], &[AgeOffMapping::new(rule, D2)], &audit())
        .unwrap();
    service
        .add_document(
            "doc://b",
            &[InheritanceInfo::new("doc://a", true, false)],
            &[],
            &audit(),
        )
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://b", rule), Some(D2));

    service
        .add_explicit_rule("doc://a", AgeOffMapping::new(other, D1), &audit())
        .unwrap();
    service
        .remove_explicit_rule("doc://a", rule, &audit())
        .unwrap();

    assert_eq!(visible_date(&conn, "doc://b", rule), Some(D2));
    assert_eq!(visible_date(&conn, "doc://b", other), None);
}

#[test]
fn add_inheritance_merges_and_fans_out() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://p", &[], &[AgeOffMapping::new(rule, D1)], &audit())
        .unwrap();
    service
        .add_document("doc://c", &[], &[AgeOffMapping::new(rule, D2)], &audit())
        .unwrap();
    service
        .add_document("doc://g", &[InheritanceInfo::tracking("doc://c")], &[], &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://g", rule), Some(D2));

    service
        .add_inheritance_info("doc://c", &InheritanceInfo::tracking("doc://p"), &audit())
        .unwrap();

    assert_eq!(visible_date(&conn, "doc://c", rule), Some(D1));
    assert_eq!(edge_count(&conn, "doc://c"), 2);
    assert_eq!(visible_date(&conn, "doc://g", rule), Some(D1));
    assert_eq!(edge_count(&conn, "doc://g"), 1);
}

#[test]
fn add_inheritance_rejects_cycles_and_duplicates() {
    let conn = setup();
    let service = lineage(&conn);
    service.add_document("doc://a", &[], &[], &audit()).unwrap();
    service
        .add_document("doc://b", &[InheritanceInfo::tracking("doc://a")], &[], &audit())
        .unwrap();
    service
        .add_document("doc://c", &[InheritanceInfo::tracking("doc://b")], &[], &audit())
        .unwrap();

    let descendant_as_parent = service
        .add_inheritance_info("doc://a", &InheritanceInfo::tracking("doc://c"), &audit())
        .unwrap_err();
    assert_eq!(descendant_as_parent.kind(), ErrorKind::CircularDependency);

    let self_link = service
        .add_inheritance_info("doc://a", &InheritanceInfo::tracking("doc://a"), &audit())
        .unwrap_err();
    assert_eq!(self_link.kind(), ErrorKind::CircularDependency);

    let duplicate = service
        .add_inheritance_info("doc://b", &InheritanceInfo::tracking("doc://a"), &audit())
        .unwrap_err();
    assert!(matches!(duplicate, ProvenanceError::InheritanceExists { .. }));

    let missing = service
        .add_inheritance_info("doc://b", &InheritanceInfo::tracking("doc://zz"), &audit())
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn resubmitting_a_link_creates_no_duplicate_edges() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://p", &[], &[AgeOffMapping::new(rule, D1)], &audit())
        .unwrap();
    service.add_document("doc://c", &[], &[], &audit()).unwrap();

    let link = InheritanceInfo::tracking("doc://p");
    service
        .add_inheritance_info("doc://c", &link, &audit())
        .unwrap();
    let _ = service.add_inheritance_info("doc://c", &link, &audit());

    let child = document_id(&conn, "doc://c");
    assert_eq!(graph(&conn).parent_links(child).unwrap().len(), 1);
    assert_eq!(edge_count(&conn, "doc://c"), 1);
}

#[test]
fn remove_inheritance_keeps_lineage_and_tolerates_missing_link() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://p", &[], &[AgeOffMapping::new(rule, D1)], &audit())
        .unwrap();
    service
        .add_document("doc://c", &[InheritanceInfo::tracking("doc://p")], &[], &audit())
        .unwrap();
    service.add_document("doc://q", &[], &[], &audit()).unwrap();

    service
        .remove_inheritance("doc://c", "doc://q", &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://c", rule), Some(D1));

    service
        .remove_inheritance("doc://c", "doc://p", &audit())
        .unwrap();
    assert_eq!(visible_date(&conn, "doc://c", rule), None);

    let ancestors = query(&conn).ancestors(&uris(&["doc://c"])).unwrap();
    assert!(ancestors
        .document_ids
        .contains(&document_id(&conn, "doc://p")));
    let link = graph(&conn)
        .derived_from(document_id(&conn, "doc://c"), document_id(&conn, "doc://p"))
        .unwrap()
        .unwrap();
    assert!(!link.inherit_age_off);
    assert!(!link.track_age_off);
}

#[test]
fn explicit_rule_errors() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://a", &[], &[AgeOffMapping::new(rule, D1)], &audit())
        .unwrap();

    let duplicate = service
        .add_explicit_rule("doc://a", AgeOffMapping::new(rule, D2), &audit())
        .unwrap_err();
    assert!(matches!(duplicate, ProvenanceError::AgeOffExists { .. }));
    assert_eq!(visible_date(&conn, "doc://a", rule), Some(D1));

    let unknown = service
        .remove_explicit_rule("doc://a", 404, &audit())
        .unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::NotFound);
}

#[test]
fn mark_aged_requires_every_id() {
    let conn = setup();
    let service = lineage(&conn);
    let a = service.add_document("doc://a", &[], &[], &audit()).unwrap();

    let err = service
        .mark_aged(&BTreeSet::from([a, 500, 501]))
        .unwrap_err();
    match err {
        ProvenanceError::DocumentIdsNotFound(ids) => assert_eq!(ids, vec![500, 501]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!graph(&conn).document_by_id(a).unwrap().unwrap().aged);
}

#[test]
fn aged_documents_lose_edges_and_are_skipped_by_cascades() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://a", &[], &[AgeOffMapping::new(rule, D2)], &audit())
        .unwrap();
    let b = service
        .add_document("doc://b", &[InheritanceInfo::tracking("doc://a")], &[], &audit())
        .unwrap();

    service.mark_aged(&BTreeSet::from([b])).unwrap();
    assert!(graph(&conn).document_by_id(b).unwrap().unwrap().aged);
    assert_eq!(edge_count(&conn, "doc://b"), 0);

    service
        .remove_explicit_rule("doc://a", rule, &audit())
        .unwrap();
    service
        .add_explicit_rule("doc://a", AgeOffMapping::new(rule, D1), &audit())
        .unwrap();
    assert_eq!(edge_count(&conn, "doc://b"), 0);

    let err = service
        .add_explicit_rule("doc://b", AgeOffMapping::new(rule, D1), &audit())
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::DocumentAlreadyAged(_)));
}
