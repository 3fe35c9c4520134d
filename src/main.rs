//! Demo driver: opens a moodboard and walks one editing session through the
//! engine, logging each step.
//!
//! Uses the in-memory remote store unless `REMOTE_BASE_URL` is set, in which
//! case it talks to that backend over HTTP.

use std::error::Error;
use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;
use uuid::Uuid;

use canvas_sync::annotation::{AnnotationDraft, AnnotationFilter, Author};
use canvas_sync::config::{RemoteConfig, SyncConfig};
use canvas_sync::directory::WorkspaceDirectory;
use canvas_sync::doc::{ElementContent, ElementDraft};
use canvas_sync::engine::WorkspaceEngine;
use canvas_sync::event::CanvasEvent;
use canvas_sync::remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore};
use canvas_sync::spatial::{Point, Size};
use canvas_sync::sync::SyncLayer;
use canvas_sync::workspace::WorkspaceType;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let config = SyncConfig::from_env()?;
    let remote: Arc<dyn RemoteStore> = if std::env::var_os("REMOTE_BASE_URL").is_some() {
        let remote_config = RemoteConfig::from_env()?;
        tracing::info!(base_url = %remote_config.base_url, "using HTTP remote store");
        Arc::new(HttpRemoteStore::new(&remote_config)?)
    } else {
        tracing::info!("using in-memory remote store");
        Arc::new(MemoryRemoteStore::new())
    };

    let directory = Arc::new(WorkspaceDirectory::new(Arc::clone(&remote), config));
    let sync = Arc::new(SyncLayer::new(Arc::clone(&remote), config).with_directory(Arc::clone(&directory)));

    let project_id = Uuid::new_v4();
    let user = Author::new(Uuid::new_v4(), "demo");
    let engine = WorkspaceEngine::open(&directory, sync, project_id, WorkspaceType::Moodboard, Some(user.id)).await?;
    let mut events = engine.subscribe();
    tracing::info!(workspace_id = %engine.workspace_id(), created = engine.was_created(), "moodboard ready");

    let swatch = ElementContent::ColorSwatch { hex: "#1f6feb".into(), label: Some("primary".into()) };
    let first = engine.add_element(ElementDraft::new(swatch, Point::new(1900.0, 1060.0), Size::new(200.0, 150.0)).created_by(user.id))?;
    let note = ElementContent::Text { text: "headline".into(), font_size: Some(32.0) };
    let second = engine.add_element(ElementDraft::new(note, Point::new(100.0, 100.0), Size::new(300.0, 80.0)).created_by(user.id))?;
    first.ticket.wait().await?;
    second.ticket.wait().await?;
    tracing::info!(x = first.value.position.x, y = first.value.position.y, z = first.value.position.z, "first element placed");

    let grab = Point::new(first.value.position.x + 10.0, first.value.position.y + 10.0);
    engine.begin_drag(&first.value.id, grab)?;
    engine.update_drag(Point::new(500.0, 400.0));
    engine.update_drag(Point::new(-40.0, -40.0));
    if let Some(ticket) = engine.end_drag()? {
        ticket.wait().await?;
    }

    let draft = AnnotationDraft::new("fix contrast", user.clone()).at(Point::new(20.0, 20.0));
    let annotation = engine.add_annotation(&first.value.id, draft)?;
    annotation.ticket.wait().await?;
    engine.reply_annotation(&annotation.value.id, "on it", user.clone())?.ticket.wait().await?;
    if let Some(ticket) = engine.resolve_annotation(&annotation.value.id)? {
        ticket.wait().await?;
    }
    let unresolved = engine.visible_annotations(&first.value.id, AnnotationFilter::Unresolved)?;

    let mut seen = 0usize;
    loop {
        match events.try_recv() {
            Ok(CanvasEvent::SyncFailed { error, code, .. }) => tracing::warn!(%error, code, "write rolled back"),
            Ok(_) => seen += 1,
            Err(TryRecvError::Lagged(skipped)) => tracing::warn!(skipped, "event stream lagged"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    let snapshot = engine.snapshot();
    let canvas = snapshot.canvas_document();
    for element in &canvas.elements {
        tracing::info!(
            id = %element.id,
            kind = ?element.kind(),
            x = element.position.x,
            y = element.position.y,
            z = element.position.z,
            annotations = element.annotations.len(),
            "element"
        );
    }
    tracing::info!(
        version = canvas.version,
        elements = canvas.elements.len(),
        unresolved = unresolved.len(),
        events = seen,
        duplicates = directory.duplicates(project_id).len(),
        "session complete"
    );
    Ok(())
}
