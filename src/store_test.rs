#![allow(clippy::float_cmp)]

use uuid::Uuid;

use super::*;
use crate::annotation::{AnnotationDraft, Author};
use crate::doc::ElementContent;
use crate::spatial::{Point, Size};

fn text(s: &str) -> ElementContent {
    ElementContent::Text { text: s.into(), font_size: None }
}

fn draft_at(x: f64, y: f64) -> ElementDraft {
    ElementDraft::new(text("t"), Point::new(x, y), Size::new(200.0, 150.0))
}

fn store() -> ElementStore {
    ElementStore::new(CanvasDocument::default(), EventBus::new(64))
}

fn author() -> Author {
    Author::new(Uuid::new_v4(), "ana")
}

// =============================================================
// add
// =============================================================

#[test]
fn add_clamps_and_assigns_first_z() {
    let mut store = store();
    let element = store.add(draft_at(1900.0, 1060.0));
    assert_eq!(element.position, Position::new(1720.0, 930.0, 1));
    assert!(element.within(store.bounds()));
    assert_eq!(store.len(), 1);
}

#[test]
fn add_z_is_monotonic() {
    let mut store = store();
    let zs: Vec<i64> = (0..5).map(|_| store.add(draft_at(0.0, 0.0)).position.z).collect();
    assert_eq!(zs, vec![1, 2, 3, 4, 5]);
}

#[test]
fn add_keeps_draft_id_unless_taken() {
    let mut store = store();
    let draft = draft_at(0.0, 0.0);
    let id = draft.id;
    let first = store.add(draft.clone());
    assert_eq!(first.id, id);
    let second = store.add(draft);
    assert_ne!(second.id, id);
    assert_eq!(store.len(), 2);
}

#[test]
fn add_normalizes_degenerate_size() {
    let mut store = store();
    let element = store.add(ElementDraft::new(text("t"), Point::new(5.0, 5.0), Size::new(0.0, f64::NAN)));
    assert_eq!(element.size, Size::new(1.0, 1.0));
}

#[test]
fn add_emits_element_added() {
    let mut store = store();
    let mut rx = store.events().subscribe();
    let element = store.add(draft_at(10.0, 10.0));
    match rx.try_recv().unwrap() {
        CanvasEvent::ElementAdded(added) => assert_eq!(added.id, element.id),
        other => panic!("unexpected event: {other:?}"),
    }
}

// =============================================================
// update
// =============================================================

#[test]
fn update_reclamps_position() {
    let mut store = store();
    let element = store.add(draft_at(0.0, 0.0));
    let updated = store.update(&element.id, &ElementPatch::position(Point::new(-50.0, 5000.0))).unwrap();
    assert_eq!(updated.position.point(), Point::new(0.0, 930.0));
}

#[test]
fn update_size_reclamps_existing_position() {
    let mut store = store();
    let element = store.add(draft_at(1720.0, 930.0));
    let patch = ElementPatch { size: Some(Size::new(400.0, 300.0)), ..ElementPatch::default() };
    let updated = store.update(&element.id, &patch).unwrap();
    assert_eq!(updated.position.point(), Point::new(1520.0, 780.0));
    assert!(updated.within(store.bounds()));
}

#[test]
fn update_content_only_leaves_geometry() {
    let mut store = store();
    let element = store.add(draft_at(30.0, 40.0));
    let patch = ElementPatch { content: Some(text("changed")), ..ElementPatch::default() };
    let updated = store.update(&element.id, &patch).unwrap();
    assert_eq!(updated.position, element.position);
    assert_eq!(updated.content, text("changed"));
}

#[test]
fn update_missing_is_not_found() {
    let mut store = store();
    let id = Uuid::new_v4();
    let err = store.update(&id, &ElementPatch::default()).unwrap_err();
    assert_eq!(err, StoreError::ElementNotFound(id));
}

#[test]
fn update_rejects_taken_z() {
    let mut store = store();
    let a = store.add(draft_at(0.0, 0.0));
    let b = store.add(draft_at(0.0, 0.0));
    let err = store.update(&b.id, &ElementPatch { z: Some(a.position.z), ..ElementPatch::default() }).unwrap_err();
    assert_eq!(err, StoreError::ZOrderTaken { z: a.position.z, holder: a.id });
    assert_eq!(store.get(&b.id).unwrap().position.z, 2);
}

// =============================================================
// remove
// =============================================================

#[test]
fn remove_cascades_annotations() {
    let mut store = store();
    let element = store.add(draft_at(0.0, 0.0));
    let annotation = store.add_annotation(&element.id, AnnotationDraft::new("note", author())).unwrap();
    store.remove(&element.id).unwrap();
    assert!(store.is_empty());
    assert!(store.annotation(&annotation.id).is_none());
    assert!(store.annotation_owner(&annotation.id).is_none());
}

#[test]
fn remove_twice_is_not_found() {
    let mut store = store();
    let element = store.add(draft_at(0.0, 0.0));
    store.remove(&element.id).unwrap();
    assert_eq!(store.remove(&element.id).unwrap_err(), StoreError::ElementNotFound(element.id));
}

// =============================================================
// reorder / ordering
// =============================================================

#[test]
fn reorder_to_front_takes_next_z() {
    let mut store = store();
    let a = store.add(draft_at(0.0, 0.0));
    store.add(draft_at(0.0, 0.0));
    let front = store.reorder_to_front(&a.id).unwrap();
    assert_eq!(front.position.z, 3);
    let order: Vec<_> = store.sorted_elements().iter().map(|e| e.id).collect();
    assert_eq!(order.last(), Some(&a.id));
}

fn loaded(id: ElementId, x: f64, y: f64, z: i64) -> Element {
    Element {
        id,
        position: Position::new(x, y, z),
        size: Size::new(10.0, 10.0),
        content: text("t"),
        annotations: Vec::new(),
        created_by: None,
        created_at: 0,
    }
}

#[test]
fn load_moves_duplicate_z_to_front_in_id_order() {
    let mut doc = CanvasDocument::default();
    let mut ids = [Uuid::new_v4(), Uuid::new_v4()];
    for id in ids {
        doc.elements.push(loaded(id, 0.0, 0.0, 1));
    }
    let store = ElementStore::new(doc, EventBus::new(4));
    ids.sort();
    let order: Vec<_> = store.sorted_elements().iter().map(|e| (e.id, e.position.z)).collect();
    assert_eq!(order, vec![(ids[0], 1), (ids[1], 2)]);
}

#[test]
fn load_clamps_positions_and_drops_duplicate_ids() {
    let id = Uuid::new_v4();
    let mut doc = CanvasDocument::default();
    doc.elements.push(loaded(id, -30.0, 5000.0, 4));
    doc.elements.push(loaded(id, 50.0, 50.0, 9));
    let store = ElementStore::new(doc, EventBus::new(4));

    assert_eq!(store.len(), 1);
    let element = store.get(&id).unwrap();
    assert_eq!(element.position, Position::new(0.0, 1070.0, 4));
    assert!(element.within(store.bounds()));
}

#[test]
fn load_keeps_valid_document_unchanged() {
    let mut doc = CanvasDocument::default();
    doc.elements.push(loaded(Uuid::new_v4(), 10.0, 20.0, 3));
    doc.elements.push(loaded(Uuid::new_v4(), 30.0, 40.0, 7));
    doc.elements.sort_by_key(|e| e.position.z);
    let store = ElementStore::new(doc.clone(), EventBus::new(4));
    assert_eq!(store.to_document(), doc);
}

#[test]
fn exhausted_z_is_renumbered_and_add_stays_on_top() {
    let low = Uuid::new_v4();
    let high = Uuid::new_v4();
    let mut doc = CanvasDocument::default();
    doc.elements.push(loaded(high, 0.0, 0.0, i64::MAX));
    doc.elements.push(loaded(low, 0.0, 0.0, -5));
    let mut store = ElementStore::new(doc, EventBus::new(4));

    assert_eq!(store.get(&low).unwrap().position.z, 1);
    assert_eq!(store.get(&high).unwrap().position.z, 2);
    let added = store.add(draft_at(0.0, 0.0));
    assert_eq!(added.position.z, 3);
    let front = store.reorder_to_front(&low).unwrap();
    assert_eq!(front.position.z, 4);
}

// =============================================================
// restore / documents
// =============================================================

#[test]
fn restore_none_removes_added_element() {
    let mut store = store();
    let element = store.add(draft_at(0.0, 0.0));
    store.restore_element(&element.id, None);
    assert!(!store.contains(&element.id));
}

#[test]
fn restore_some_recreates_removed_element() {
    let mut store = store();
    let element = store.add(draft_at(10.0, 10.0));
    store.add_annotation(&element.id, AnnotationDraft::new("keep", author())).unwrap();
    let snapshot = store.get(&element.id).cloned();
    store.remove(&element.id).unwrap();
    store.restore_element(&element.id, snapshot);
    let restored = store.get(&element.id).unwrap();
    assert_eq!(restored.annotations.len(), 1);
    assert!(store.annotation_owner(&restored.annotations[0].id).is_some());
}

#[test]
fn restore_keeps_current_annotations() {
    let mut store = store();
    let element = store.add(draft_at(10.0, 10.0));
    let before = store.get(&element.id).cloned();
    store.update(&element.id, &ElementPatch::position(Point::new(500.0, 500.0))).unwrap();
    store.add_annotation(&element.id, AnnotationDraft::new("later", author())).unwrap();
    store.restore_element(&element.id, before);
    let restored = store.get(&element.id).unwrap();
    assert_eq!(restored.position.point(), Point::new(10.0, 10.0));
    assert_eq!(restored.annotations.len(), 1);
}

#[test]
fn document_round_trip_preserves_state() {
    let mut store = store();
    store.add(draft_at(1.0, 2.0));
    store.add(draft_at(3.0, 4.0));
    store.commit_version(1);
    store.commit_version(0);
    let doc = store.to_document();
    assert_eq!(doc.version, 1);
    assert_eq!(doc.elements.len(), 2);
    assert!(doc.elements[0].position.z < doc.elements[1].position.z);

    let copy = ElementStore::new(doc.clone(), EventBus::new(4));
    assert_eq!(copy.to_document(), doc);
}

#[test]
fn reconcile_preserves_dragged_geometry() {
    let mut store = store();
    let element = store.add(draft_at(100.0, 100.0));
    let mut remote = store.to_document();
    remote.version = 7;
    remote.elements[0].position.x = 300.0;

    store.update(&element.id, &ElementPatch::position(Point::new(0.0, 0.0))).unwrap();
    store.reconcile(remote.clone(), Some(element.id));
    assert_eq!(store.version(), 7);
    assert_eq!(store.get(&element.id).unwrap().position.point(), Point::new(0.0, 0.0));

    store.reconcile(remote, None);
    assert_eq!(store.get(&element.id).unwrap().position.x, 300.0);
}

#[test]
fn set_background_shows_in_document() {
    let mut store = store();
    store.set_background("#101010");
    assert_eq!(store.to_document().background, "#101010");
}
