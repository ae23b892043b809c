mod common;

use common::{add_rule, audit, document_id, graph, lineage, setup, visible_date, T0};
use provenance_core::{
    AddDocumentEntry, AddDocumentStatus, AgeOffMapping, ErrorKind, GraphRepository,
    InheritanceInfo, LineageService, ProvenanceConfig, ProvenanceError,
};

fn entry(uri: &str, parents: &[&str]) -> AddDocumentEntry {
    AddDocumentEntry::new(
        uri,
        parents
            .iter()
            .map(|parent| InheritanceInfo::tracking(*parent))
            .collect(),
    )
}

#[test]
fn in_batch_parents_are_inserted_first() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);
    service
        .add_document("doc://root", &[], &[AgeOffMapping::new(rule, T0)], &audit())
        .unwrap();

    let entries = vec![
        entry("doc://c", &["doc://b"]),
        entry("doc://b", &["doc://a"]),
        entry("doc://a", &["doc://root"]),
    ];
    let results = service.add_documents(&entries, &[], &audit()).unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.values().all(|result| result.is_success()));
    let a = results["doc://a"].document_id.unwrap();
    let b = results["doc://b"].document_id.unwrap();
    let c = results["doc://c"].document_id.unwrap();
    assert!(a < b && b < c);
    assert_eq!(visible_date(&conn, "doc://c", rule), Some(T0));
}

#[test]
fn cyclic_entries_are_excluded_without_failing_the_batch() {
    let conn = setup();
    let service = lineage(&conn);

    let entries = vec![
        entry("doc://x", &["doc://z"]),
        entry("doc://y", &["doc://x"]),
        entry("doc://z", &["doc://y"]),
        entry("doc://self", &["doc://self"]),
        entry("doc://free", &[]),
    ];
    let results = service.add_documents(&entries, &[], &audit()).unwrap();

    for uri in ["doc://x", "doc://y", "doc://z", "doc://self"] {
        assert_eq!(
            results[uri].status,
            AddDocumentStatus::CircularInheritanceNotAllowed,
            "{uri}"
        );
        assert!(graph(&conn).document_by_uri(uri).unwrap().is_none());
    }
    assert_eq!(results["doc://free"].status, AddDocumentStatus::Success);
}

#[test]
fn per_entry_failures_are_reported() {
    let conn = setup();
    let service = lineage(&conn);
    let existing = service
        .add_document("doc://old", &[], &[], &audit())
        .unwrap();

    let entries = vec![
        entry("doc://old", &[]),
        entry("doc://orphan", &["doc://nowhere", "doc://old"]),
        entry("  ", &[]),
        entry("doc://new", &["doc://old"]),
    ];
    let results = service.add_documents(&entries, &[], &audit()).unwrap();

    assert_eq!(results["doc://old"].status, AddDocumentStatus::AlreadyExists);
    assert_eq!(results["doc://old"].document_id, Some(existing));
    assert_eq!(results["doc://orphan"].status, AddDocumentStatus::ParentNotFound);
    assert_eq!(results["doc://orphan"].parents_not_found, vec!["doc://nowhere"]);
    assert_eq!(results["  "].status, AddDocumentStatus::InvalidUri);
    assert_eq!(results["doc://new"].status, AddDocumentStatus::Success);
}

#[test]
fn oversized_batch_is_rejected_before_any_write() {
    let conn = setup();
    let config = ProvenanceConfig {
        max_batch_size: 2,
        ..ProvenanceConfig::default()
    };
    let service = LineageService::with_config(common::graph(&conn), config).unwrap();

    let entries = vec![
        entry("doc://1", &[]),
        entry("doc://2", &[]),
        entry("doc://3", &[]),
    ];
    let err = service.add_documents(&entries, &[], &audit()).unwrap_err();

    assert!(matches!(
        err,
        ProvenanceError::BatchTooLarge { size: 3, max: 2 }
    ));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(graph(&conn).document_by_uri("doc://1").unwrap().is_none());
}

#[test]
fn unknown_shared_rule_fails_whole_batch() {
    let conn = setup();
    let service = lineage(&conn);

    let entries = vec![entry("doc://1", &[]), entry("doc://2", &[])];
    let err = service
        .add_documents(&entries, &[AgeOffMapping::new(77, T0)], &audit())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(graph(&conn).document_by_uri("doc://1").unwrap().is_none());
}

#[test]
fn shared_mappings_apply_to_every_entry() {
    let conn = setup();
    let rule = add_rule(&conn, "one-day", common::DAY_SECONDS);
    let service = lineage(&conn);

    let entries = vec![entry("doc://1", &[]), entry("doc://2", &["doc://1"])];
    service
        .add_documents(&entries, &[AgeOffMapping::new(rule, T0)], &audit())
        .unwrap();

    assert_eq!(visible_date(&conn, "doc://1", rule), Some(T0));
    // explicit edge plus the one inherited from doc://1
    let edges = graph(&conn)
        .age_off_edges(document_id(&conn, "doc://2"))
        .unwrap();
    assert_eq!(edges.len(), 2);
}

#[test]
fn duplicate_entries_merge_their_parents() {
    let conn = setup();
    let service = lineage(&conn);
    service.add_document("doc://p1", &[], &[], &audit()).unwrap();
    service.add_document("doc://p2", &[], &[], &audit()).unwrap();

    let entries = vec![entry("doc://c", &["doc://p1"]), entry("doc://c", &["doc://p2"])];
    let results = service.add_documents(&entries, &[], &audit()).unwrap();

    assert_eq!(results.len(), 1);
    let child = results["doc://c"].document_id.unwrap();
    assert_eq!(graph(&conn).parent_links(child).unwrap().len(), 2);
}
