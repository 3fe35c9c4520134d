//! In-memory remote store.
//!
//! Backs tests, the demo binary, and offline use. Behaves like a strict
//! backend: canvas writes with an older document version are rejected, and
//! it can be told to fail writes, add latency, or normalize positions the way
//! a server might, so rollback and reconciliation paths can be driven
//! deterministically.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use super::{RemoteError, RemoteStore};
use crate::annotation::{Annotation, AnnotationId, AnnotationPatch};
use crate::doc::{CanvasDocument, ElementId, now_ms};
use crate::workspace::{ProjectId, Workspace, WorkspaceDraft, WorkspaceId, WorkspacePatch};

/// One accepted `update_workspace` call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub workspace_id: WorkspaceId,
    /// Canvas version carried by the write, if it replaced the settings bag.
    pub canvas_version: Option<u64>,
}

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub get: usize,
    pub create: usize,
    pub update: usize,
    pub create_annotation: usize,
    pub update_annotation: usize,
}

#[derive(Default)]
struct Counters {
    list: AtomicUsize,
    get: AtomicUsize,
    create: AtomicUsize,
    update: AtomicUsize,
    create_annotation: AtomicUsize,
    update_annotation: AtomicUsize,
}

#[derive(Default)]
struct MemoryState {
    workspaces: HashMap<WorkspaceId, Workspace>,
    writes: Vec<WriteRecord>,
}

/// Thread-safe in-memory implementation of [`RemoteStore`].
#[derive(Default)]
pub struct MemoryRemoteStore {
    inner: Mutex<MemoryState>,
    counters: Counters,
    fail_writes: AtomicBool,
    round_positions: AtomicBool,
    write_delay_ms: AtomicU64,
    create_delay_ms: AtomicU64,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Knobs ---

    /// Make every write (workspace update, annotation create/update) fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Round element coordinates to whole units on every canvas write.
    pub fn set_round_positions(&self, round: bool) {
        self.round_positions.store(round, Ordering::SeqCst);
    }

    /// Delay applied before each write is processed.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms.store(duration_ms(delay), Ordering::SeqCst);
    }

    /// Delay applied before each workspace create is processed.
    pub fn set_create_delay(&self, delay: Duration) {
        self.create_delay_ms.store(duration_ms(delay), Ordering::SeqCst);
    }

    // --- Inspection ---

    /// Insert a workspace as-is, bypassing create (e.g. to stage duplicates).
    pub fn seed(&self, workspace: Workspace) {
        self.lock().workspaces.insert(workspace.id, workspace);
    }

    #[must_use]
    pub fn workspace(&self, id: &WorkspaceId) -> Option<Workspace> {
        self.lock().workspaces.get(id).cloned()
    }

    #[must_use]
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            list: self.counters.list.load(Ordering::SeqCst),
            get: self.counters.get.load(Ordering::SeqCst),
            create: self.counters.create.load(Ordering::SeqCst),
            update: self.counters.update.load(Ordering::SeqCst),
            create_annotation: self.counters.create_annotation.load(Ordering::SeqCst),
            update_annotation: self.counters.update_annotation.load(Ordering::SeqCst),
        }
    }

    // --- Internals ---

    async fn delay(&self, cell: &AtomicU64) {
        let ms = cell.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn check_writable(&self) -> Result<(), RemoteError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected("write failure injected".into()));
        }
        Ok(())
    }

    fn normalize(&self, canvas: &mut CanvasDocument) {
        if !self.round_positions.load(Ordering::SeqCst) {
            return;
        }
        for element in &mut canvas.elements {
            element.position.x = element.position.x.round();
            element.position.y = element.position.y.round();
        }
    }
}

fn duration_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

fn find_annotation_mut<'a>(
    workspaces: &'a mut HashMap<WorkspaceId, Workspace>,
    id: &AnnotationId,
) -> Option<&'a mut Annotation> {
    workspaces
        .values_mut()
        .filter_map(|ws| ws.settings.canvas.as_mut())
        .flat_map(|canvas| canvas.elements.iter_mut())
        .flat_map(|element| element.annotations.iter_mut())
        .find(|a| a.id == *id)
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list_workspaces(&self, project_id: ProjectId) -> Result<Vec<Workspace>, RemoteError> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        let mut out: Vec<Workspace> = state
            .workspaces
            .values()
            .filter(|ws| ws.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn get_workspace(&self, id: WorkspaceId) -> Result<Workspace, RemoteError> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .workspaces
            .get(&id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("workspace {id}")))
    }

    async fn create_workspace(&self, draft: &WorkspaceDraft) -> Result<Workspace, RemoteError> {
        self.counters.create.fetch_add(1, Ordering::SeqCst);
        self.delay(&self.create_delay_ms).await;

        let now = now_ms();
        let workspace = Workspace {
            id: Uuid::new_v4(),
            project_id: draft.project_id,
            kind: draft.kind,
            name: draft.name.clone(),
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
            collaborators: draft.collaborators.clone(),
            settings: draft.settings.clone(),
            archived: false,
        };
        self.lock().workspaces.insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    async fn update_workspace(&self, id: WorkspaceId, patch: &WorkspacePatch) -> Result<Workspace, RemoteError> {
        self.counters.update.fetch_add(1, Ordering::SeqCst);
        self.delay(&self.write_delay_ms).await;
        self.check_writable()?;

        let mut state = self.lock();
        let workspace = state
            .workspaces
            .get_mut(&id)
            .ok_or_else(|| RemoteError::NotFound(format!("workspace {id}")))?;

        let mut canvas_version = None;
        if let Some(settings) = &patch.settings {
            let mut settings = settings.clone();
            if let (Some(incoming), Some(current)) = (&settings.canvas, &workspace.settings.canvas) {
                if incoming.version < current.version {
                    return Err(RemoteError::StaleVersion { incoming: incoming.version, current: current.version });
                }
            }
            if let Some(canvas) = settings.canvas.as_mut() {
                self.normalize(canvas);
                canvas_version = Some(canvas.version);
            }
            workspace.settings = settings;
        }
        if let Some(name) = &patch.name {
            workspace.name.clone_from(name);
        }
        if let Some(collaborators) = &patch.collaborators {
            workspace.collaborators.clone_from(collaborators);
        }
        if let Some(archived) = patch.archived {
            workspace.archived = archived;
        }
        workspace.updated_at = now_ms();

        let updated = workspace.clone();
        state.writes.push(WriteRecord { workspace_id: id, canvas_version });
        Ok(updated)
    }

    async fn create_annotation(&self, element_id: ElementId, annotation: &Annotation) -> Result<Annotation, RemoteError> {
        self.counters.create_annotation.fetch_add(1, Ordering::SeqCst);
        self.delay(&self.write_delay_ms).await;
        self.check_writable()?;

        let mut state = self.lock();
        let element = state
            .workspaces
            .values_mut()
            .filter_map(|ws| ws.settings.canvas.as_mut())
            .flat_map(|canvas| canvas.elements.iter_mut())
            .find(|e| e.id == element_id)
            .ok_or_else(|| RemoteError::NotFound(format!("element {element_id}")))?;

        // Replays of the same client-chosen id overwrite rather than duplicate.
        element.annotations.retain(|a| a.id != annotation.id);
        element.annotations.push(annotation.clone());
        Ok(annotation.clone())
    }

    async fn update_annotation(&self, id: AnnotationId, patch: &AnnotationPatch) -> Result<Annotation, RemoteError> {
        self.counters.update_annotation.fetch_add(1, Ordering::SeqCst);
        self.delay(&self.write_delay_ms).await;
        self.check_writable()?;

        let mut state = self.lock();
        let annotation = find_annotation_mut(&mut state.workspaces, &id)
            .ok_or_else(|| RemoteError::NotFound(format!("annotation {id}")))?;
        if let Some(resolved) = patch.resolved {
            if resolved && !annotation.resolved {
                annotation.resolved_at = Some(now_ms());
            } else if !resolved {
                annotation.resolved_at = None;
            }
            annotation.resolved = resolved;
        }
        if let Some(replies) = &patch.replies {
            annotation.replies.clone_from(replies);
        }
        Ok(annotation.clone())
    }
}
