#![allow(clippy::float_cmp)]

use std::time::Duration;

use uuid::Uuid;

use super::*;
use crate::annotation::Annotation;
use crate::doc::{Element, ElementContent};
use crate::spatial::{Point, Position, Size};
use crate::workspace::{WorkspaceSettings, WorkspaceType};

fn element_at(x: f64, y: f64) -> Element {
    Element {
        id: Uuid::new_v4(),
        position: Position::new(x, y, 1),
        size: Size::new(10.0, 10.0),
        content: ElementContent::Text { text: "t".into(), font_size: None },
        annotations: Vec::new(),
        created_by: None,
        created_at: 0,
    }
}

fn annotation() -> Annotation {
    Annotation {
        id: Uuid::new_v4(),
        position: Point::default(),
        content: "note".into(),
        author_id: Uuid::new_v4(),
        author_name: "ana".into(),
        created_at: 0,
        resolved: false,
        resolved_at: None,
        replies: Vec::new(),
    }
}

fn canvas_patch(version: u64, elements: Vec<Element>) -> WorkspacePatch {
    let canvas = CanvasDocument { version, elements, ..CanvasDocument::default() };
    WorkspacePatch { settings: Some(WorkspaceSettings::default().with_canvas(Some(canvas))), ..WorkspacePatch::default() }
}

async fn moodboard(store: &MemoryRemoteStore) -> Workspace {
    store.create_workspace(&WorkspaceDraft::new(Uuid::new_v4(), WorkspaceType::Moodboard)).await.unwrap()
}

// =============================================================
// Workspaces
// =============================================================

#[tokio::test]
async fn create_then_get_and_list() {
    let store = MemoryRemoteStore::new();
    let ws = moodboard(&store).await;
    assert_eq!(store.get_workspace(ws.id).await.unwrap(), ws);
    assert_eq!(store.list_workspaces(ws.project_id).await.unwrap(), vec![ws.clone()]);
    assert!(store.list_workspaces(Uuid::new_v4()).await.unwrap().is_empty());
    assert_eq!(store.calls().create, 1);
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let store = MemoryRemoteStore::new();
    assert!(matches!(store.get_workspace(Uuid::new_v4()).await, Err(RemoteError::NotFound(_))));
}

#[tokio::test]
async fn update_replaces_canvas_and_records_write() {
    let store = MemoryRemoteStore::new();
    let ws = moodboard(&store).await;
    let updated = store.update_workspace(ws.id, &canvas_patch(1, vec![element_at(5.0, 5.0)])).await.unwrap();
    assert_eq!(updated.canvas_document().elements.len(), 1);
    assert_eq!(store.writes(), vec![WriteRecord { workspace_id: ws.id, canvas_version: Some(1) }]);
}

#[tokio::test]
async fn stale_canvas_version_rejected() {
    let store = MemoryRemoteStore::new();
    let ws = moodboard(&store).await;
    store.update_workspace(ws.id, &canvas_patch(3, Vec::new())).await.unwrap();
    let err = store.update_workspace(ws.id, &canvas_patch(2, Vec::new())).await.unwrap_err();
    assert_eq!(err, RemoteError::StaleVersion { incoming: 2, current: 3 });
    assert_eq!(store.writes().len(), 1);
}

#[tokio::test]
async fn rounding_normalizes_positions() {
    let store = MemoryRemoteStore::new();
    store.set_round_positions(true);
    let ws = moodboard(&store).await;
    let updated = store.update_workspace(ws.id, &canvas_patch(1, vec![element_at(10.4, 20.6)])).await.unwrap();
    let element = &updated.canvas_document().elements[0];
    assert_eq!(element.position.point(), Point::new(10.0, 21.0));
}

#[tokio::test]
async fn injected_failure_rejects_writes() {
    let store = MemoryRemoteStore::new();
    let ws = moodboard(&store).await;
    store.set_fail_writes(true);
    assert!(matches!(store.update_workspace(ws.id, &WorkspacePatch::default()).await, Err(RemoteError::Rejected(_))));
    assert!(store.writes().is_empty());
    store.set_fail_writes(false);
    assert!(store.update_workspace(ws.id, &WorkspacePatch::default()).await.is_ok());
}

#[tokio::test]
async fn write_delay_is_applied() {
    let store = MemoryRemoteStore::new();
    let ws = moodboard(&store).await;
    store.set_write_delay(Duration::from_millis(40));
    let started = std::time::Instant::now();
    store.update_workspace(ws.id, &WorkspacePatch::default()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(40));
}

// =============================================================
// Annotations
// =============================================================

#[tokio::test]
async fn annotation_create_is_idempotent_on_id() {
    let store = MemoryRemoteStore::new();
    let ws = moodboard(&store).await;
    let element = element_at(0.0, 0.0);
    store.update_workspace(ws.id, &canvas_patch(1, vec![element.clone()])).await.unwrap();

    let note = annotation();
    store.create_annotation(element.id, &note).await.unwrap();
    store.create_annotation(element.id, &note).await.unwrap();

    let stored = store.workspace(&ws.id).unwrap().canvas_document();
    assert_eq!(stored.elements[0].annotations, vec![note]);
    assert_eq!(store.calls().create_annotation, 2);
}

#[tokio::test]
async fn annotation_on_missing_element_is_not_found() {
    let store = MemoryRemoteStore::new();
    moodboard(&store).await;
    assert!(matches!(store.create_annotation(Uuid::new_v4(), &annotation()).await, Err(RemoteError::NotFound(_))));
}

#[tokio::test]
async fn annotation_update_sets_resolution() {
    let store = MemoryRemoteStore::new();
    let ws = moodboard(&store).await;
    let element = element_at(0.0, 0.0);
    store.update_workspace(ws.id, &canvas_patch(1, vec![element.clone()])).await.unwrap();
    let note = annotation();
    store.create_annotation(element.id, &note).await.unwrap();

    let resolved = store
        .update_annotation(note.id, &AnnotationPatch { resolved: Some(true), ..AnnotationPatch::default() })
        .await
        .unwrap();
    assert!(resolved.resolved);
    assert!(resolved.resolved_at.is_some());

    let reopened = store
        .update_annotation(note.id, &AnnotationPatch { resolved: Some(false), ..AnnotationPatch::default() })
        .await
        .unwrap();
    assert!(!reopened.resolved);
    assert!(reopened.resolved_at.is_none());
}

#[tokio::test]
async fn seeded_workspaces_are_listed_oldest_first() {
    let store = MemoryRemoteStore::new();
    let project_id = Uuid::new_v4();
    let mut newer = moodboard(&store).await;
    newer.project_id = project_id;
    newer.created_at = 200;
    let mut older = newer.clone();
    older.id = Uuid::new_v4();
    older.created_at = 100;
    store.seed(newer.clone());
    store.seed(older.clone());

    let listed = store.list_workspaces(project_id).await.unwrap();
    assert_eq!(listed.iter().map(|w| w.id).collect::<Vec<_>>(), vec![older.id, newer.id]);
}
