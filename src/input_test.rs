#![allow(clippy::float_cmp)]

use uuid::Uuid;

use super::*;
use crate::doc::{CanvasDocument, ElementContent, ElementDraft};
use crate::event::EventBus;
use crate::spatial::Size;

fn setup() -> (ElementStore, ElementId, ElementId) {
    let mut store = ElementStore::new(CanvasDocument::default(), EventBus::new(64));
    let a = store.add(ElementDraft::new(swatch(), Point::new(100.0, 100.0), Size::new(200.0, 150.0)));
    let b = store.add(ElementDraft::new(swatch(), Point::new(400.0, 400.0), Size::new(200.0, 150.0)));
    (store, a.id, b.id)
}

fn swatch() -> ElementContent {
    ElementContent::ColorSwatch { hex: "#00ff00".into(), label: None }
}

// =============================================================
// begin
// =============================================================

#[test]
fn begin_promotes_and_captures_origin() {
    let (mut store, a, _) = setup();
    let mut drag = DragController::new();
    let front = drag.begin(&mut store, &a, Point::new(110.0, 120.0)).unwrap().unwrap();
    assert_eq!(front.position.z, 3);
    match drag.state() {
        DragState::Dragging { element_id, offset, origin } => {
            assert_eq!(element_id, a);
            assert_eq!(offset, Point::new(10.0, 20.0));
            assert_eq!(origin, Position::new(100.0, 100.0, 1));
        }
        DragState::Idle => panic!("expected dragging"),
    }
}

#[test]
fn second_begin_is_ignored() {
    let (mut store, a, b) = setup();
    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(100.0, 100.0)).unwrap();
    assert!(drag.begin(&mut store, &b, Point::new(400.0, 400.0)).unwrap().is_none());
    assert_eq!(drag.dragging_element(), Some(a));
    assert_eq!(store.get(&b).unwrap().position.z, 2);
}

#[test]
fn begin_on_missing_element_stays_idle() {
    let (mut store, _, _) = setup();
    let mut drag = DragController::new();
    let missing = Uuid::new_v4();
    assert_eq!(drag.begin(&mut store, &missing, Point::default()).unwrap_err(), StoreError::ElementNotFound(missing));
    assert_eq!(drag.state(), DragState::Idle);
}

// =============================================================
// update / end
// =============================================================

#[test]
fn update_follows_pointer_with_offset() {
    let (mut store, a, _) = setup();
    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(110.0, 110.0)).unwrap();
    let moved = drag.update(&mut store, Point::new(310.0, 210.0)).unwrap();
    assert_eq!(moved.position.point(), Point::new(300.0, 200.0));
}

#[test]
fn update_clamps_to_canvas() {
    let (mut store, a, _) = setup();
    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(100.0, 100.0)).unwrap();
    let moved = drag.update(&mut store, Point::new(-50.0, -50.0)).unwrap();
    assert_eq!(moved.position.point(), Point::new(0.0, 0.0));
    assert!(moved.within(store.bounds()));
}

#[test]
fn update_while_idle_is_noop() {
    let (mut store, a, _) = setup();
    let mut drag = DragController::new();
    assert!(drag.update(&mut store, Point::new(1.0, 1.0)).is_none());
    assert_eq!(store.get(&a).unwrap().position.point(), Point::new(100.0, 100.0));
}

#[test]
fn update_after_target_removed_goes_idle() {
    let (mut store, a, _) = setup();
    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(100.0, 100.0)).unwrap();
    store.remove(&a).unwrap();
    assert!(drag.update(&mut store, Point::new(5.0, 5.0)).is_none());
    assert!(!drag.is_dragging());
}

#[test]
fn end_returns_commit_and_goes_idle() {
    let (mut store, a, _) = setup();
    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(100.0, 100.0)).unwrap();
    drag.update(&mut store, Point::new(50.0, 60.0));
    let commit = drag.end(&store).unwrap();
    assert_eq!(commit.element_id, a);
    assert_eq!(commit.origin, Position::new(100.0, 100.0, 1));
    assert_eq!(commit.position, Position::new(50.0, 60.0, 3));
    assert!(!drag.is_dragging());
    assert!(drag.end(&store).is_none());
}

// =============================================================
// cancel / pointer leave
// =============================================================

#[test]
fn cancel_restores_position_and_z() {
    let (mut store, a, _) = setup();
    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(100.0, 100.0)).unwrap();
    drag.update(&mut store, Point::new(900.0, 700.0));
    let restored = drag.cancel(&mut store).unwrap();
    assert_eq!(restored.position, Position::new(100.0, 100.0, 1));
    assert_eq!(drag.state(), DragState::Idle);
}

#[test]
fn pointer_leave_matches_cancel() {
    let (mut store, a, _) = setup();
    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(100.0, 100.0)).unwrap();
    drag.update(&mut store, Point::new(0.0, 0.0));
    let restored = drag.pointer_leave(&mut store).unwrap();
    assert_eq!(restored.position, Position::new(100.0, 100.0, 1));
}

#[test]
fn cancel_while_idle_is_noop() {
    let (mut store, _, _) = setup();
    let mut drag = DragController::new();
    assert!(drag.cancel(&mut store).is_none());
}

#[test]
fn repeated_drag_is_idempotent_on_final_position() {
    let (mut store, a, _) = setup();
    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(100.0, 100.0)).unwrap();
    for _ in 0..3 {
        drag.update(&mut store, Point::new(250.0, 250.0));
    }
    let commit = drag.end(&store).unwrap();
    assert_eq!(commit.position.point(), Point::new(250.0, 250.0));
}

// =============================================================
// loaded documents
// =============================================================

#[test]
fn cancel_is_exact_after_loading_duplicate_z() {
    let mut doc = CanvasDocument::default();
    for at in [1.0, 300.0] {
        let draft = ElementDraft::new(swatch(), Point::new(at, at), Size::new(10.0, 10.0));
        let mut element = ElementStore::new(CanvasDocument::default(), EventBus::new(4)).add(draft);
        element.position.z = 1;
        doc.elements.push(element);
    }
    let mut store = ElementStore::new(doc, EventBus::new(64));
    let before = store.to_document();
    let a = before.elements[0].id;
    let origin = before.elements[0].position;

    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(origin.x + 4.0, origin.y + 4.0)).unwrap();
    drag.update(&mut store, Point::new(600.0, 600.0));
    let restored = drag.cancel(&mut store).unwrap();

    assert_eq!(restored.position, origin);
    assert_eq!(store.to_document(), before);
}

#[test]
fn cancel_restores_position_when_origin_z_was_taken() {
    let (mut store, a, b) = setup();
    let mut drag = DragController::new();
    drag.begin(&mut store, &a, Point::new(100.0, 100.0)).unwrap();
    drag.update(&mut store, Point::new(700.0, 500.0));
    // Another writer moved b onto a's old z while the drag was live.
    store.elements.get_mut(&b).unwrap().position.z = 1;

    let restored = drag.cancel(&mut store).unwrap();
    assert_eq!(restored.position.point(), Point::new(100.0, 100.0));
    assert_eq!(restored.position.z, 3);
    assert_eq!(drag.state(), DragState::Idle);
}
