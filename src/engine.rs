//! Workspace engine: the per-workspace facade the UI layer talks to.
//!
//! DESIGN
//! ======
//! One `WorkspaceEngine` per open workspace. It owns the shared
//! [`LocalModel`] and turns each imperative call into a local change plus,
//! where the change must persist, a pending mutation queued on the
//! [`SyncLayer`]. Calls never block on the network: mutating calls return a
//! [`Submitted`] carrying the local result and a [`WriteTicket`] the caller
//! may await or drop. Drag moves stay purely local until pointer-up.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::annotation::{Annotation, AnnotationDraft, AnnotationFilter, AnnotationId, AnnotationPatch, AnnotationReply, Author};
use crate::directory::{DirectoryError, WorkspaceDirectory};
use crate::doc::{Element, ElementDraft, ElementId, ElementPatch, UserId};
use crate::event::{CanvasEvent, EventBus};
use crate::spatial::Point;
use crate::store::StoreError;
use crate::sync::{LocalModel, PendingMutation, Scope, SharedModel, Snapshot, SyncError, SyncLayer, WriteOp, WriteTicket, lock_model};
use crate::workspace::{ProjectId, SettingsPatch, Workspace, WorkspaceId, WorkspaceType};

/// Local result of a mutating call plus the handle of its remote write.
#[derive(Debug)]
pub struct Submitted<T> {
    pub value: T,
    pub ticket: WriteTicket,
}

pub struct WorkspaceEngine {
    workspace_id: WorkspaceId,
    model: SharedModel,
    sync: Arc<SyncLayer>,
    events: EventBus,
    created: bool,
}

impl WorkspaceEngine {
    /// Resolve the canonical workspace for `(project, type)` through the
    /// directory, creating it if needed, and open it.
    ///
    /// # Errors
    ///
    /// Returns the directory's error if the workspace cannot be listed or
    /// created.
    pub async fn open(
        directory: &WorkspaceDirectory,
        sync: Arc<SyncLayer>,
        project_id: ProjectId,
        kind: WorkspaceType,
        user: Option<UserId>,
    ) -> Result<Self, DirectoryError> {
        let entry = directory.get_or_create(project_id, kind, user).await?;
        let mut engine = Self::new(entry.workspace, sync);
        engine.created = entry.is_new;
        Ok(engine)
    }

    /// Open an already fetched workspace.
    #[must_use]
    pub fn new(workspace: Workspace, sync: Arc<SyncLayer>) -> Self {
        let events = EventBus::new(sync.config().event_capacity);
        let workspace_id = workspace.id;
        let model = LocalModel::new(workspace, events.clone());
        info!(%workspace_id, elements = model.store.len(), "workspace opened");
        Self { workspace_id, model: Arc::new(Mutex::new(model)), sync, events, created: false }
    }

    #[must_use]
    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    /// Whether `open` created the workspace rather than finding it.
    #[must_use]
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Shared model handle, e.g. for rendering under a short lock.
    #[must_use]
    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    // =========================================================================
    // DRAG
    // =========================================================================

    /// Pointer-down on an element. `Ok(None)` if a drag is already active.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is absent.
    pub fn begin_drag(&self, element_id: &ElementId, pointer: Point) -> Result<Option<Element>, StoreError> {
        let mut guard = lock_model(&self.model);
        let model = &mut *guard;
        model.drag.begin(&mut model.store, element_id, pointer)
    }

    /// Pointer-move. `None` when no drag is active.
    pub fn update_drag(&self, pointer: Point) -> Option<Element> {
        let mut guard = lock_model(&self.model);
        let model = &mut *guard;
        model.drag.update(&mut model.store, pointer)
    }

    /// Pointer-up. Queues the final position for write-through and returns
    /// immediately; `Ok(None)` when no drag was active.
    ///
    /// # Errors
    ///
    /// Returns the queueing error after rolling the drag back.
    pub fn end_drag(&self) -> Result<Option<WriteTicket>, SyncError> {
        let mutation = {
            let mut guard = lock_model(&self.model);
            let model = &mut *guard;
            let Some(commit) = model.drag.end(&model.store) else {
                return Ok(None);
            };
            let applied = model.capture(Scope::Element(commit.element_id));
            let previous = match &applied {
                Snapshot::Element { id, state: Some(element) } => {
                    let mut before = element.clone();
                    before.position = commit.origin;
                    Snapshot::Element { id: *id, state: Some(before) }
                }
                other => other.clone(),
            };
            model.record_pending(Scope::Element(commit.element_id), previous, applied, WriteOp::SaveWorkspace)
        };
        debug!(element_id = %mutation.target.target_id(), "drag committed");
        self.sync.submit(&self.model, &mutation).map(Some)
    }

    /// Escape or explicit cancel. Restores the pre-drag position and z.
    pub fn cancel_drag(&self) -> Option<Element> {
        let mut guard = lock_model(&self.model);
        let model = &mut *guard;
        model.drag.cancel(&mut model.store)
    }

    /// Pointer left the surface mid-drag; same as cancel.
    pub fn pointer_leave(&self) -> Option<Element> {
        let mut guard = lock_model(&self.model);
        let model = &mut *guard;
        model.drag.pointer_leave(&mut model.store)
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        lock_model(&self.model).drag.is_dragging()
    }

    // =========================================================================
    // ELEMENTS
    // =========================================================================

    /// Add an element.
    ///
    /// # Errors
    ///
    /// Returns a queueing error after rolling the add back.
    pub fn add_element(&self, mut draft: ElementDraft) -> Result<Submitted<Element>, SyncError> {
        self.apply(|model| {
            if model.store.contains(&draft.id) {
                draft.id = Uuid::new_v4();
            }
            model.apply_optimistic(Scope::Element(draft.id), |model| Ok((model.store.add(draft), WriteOp::SaveWorkspace)))
        })
    }

    /// Merge a sparse patch into an element.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the element is absent or the requested z is taken.
    pub fn update_element(&self, element_id: &ElementId, patch: &ElementPatch) -> Result<Submitted<Element>, SyncError> {
        self.apply(|model| {
            model.apply_optimistic(Scope::Element(*element_id), |model| {
                Ok((model.store.update(element_id, patch)?, WriteOp::SaveWorkspace))
            })
        })
    }

    /// Remove an element and its annotations.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the element is absent.
    pub fn remove_element(&self, element_id: &ElementId) -> Result<Submitted<Element>, SyncError> {
        self.apply(|model| {
            model.apply_optimistic(Scope::Element(*element_id), |model| {
                Ok((model.store.remove(element_id)?, WriteOp::SaveWorkspace))
            })
        })
    }

    /// Raise an element above all others.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the element is absent.
    pub fn bring_to_front(&self, element_id: &ElementId) -> Result<Submitted<Element>, SyncError> {
        self.apply(|model| {
            model.apply_optimistic(Scope::Element(*element_id), |model| {
                Ok((model.store.reorder_to_front(element_id)?, WriteOp::SaveWorkspace))
            })
        })
    }

    /// Change the canvas background.
    ///
    /// # Errors
    ///
    /// Returns a queueing error after rolling the change back.
    pub fn set_background(&self, background: impl Into<String>) -> Result<Submitted<()>, SyncError> {
        let background = background.into();
        self.apply(|model| {
            model.apply_optimistic(Scope::Canvas, |model| {
                model.store.set_background(background);
                Ok(((), WriteOp::SaveWorkspace))
            })
        })
    }

    #[must_use]
    pub fn element(&self, element_id: &ElementId) -> Option<Element> {
        lock_model(&self.model).store.get(element_id).cloned()
    }

    /// All elements in draw order.
    #[must_use]
    pub fn elements(&self) -> Vec<Element> {
        lock_model(&self.model)
            .store
            .sorted_elements()
            .into_iter()
            .cloned()
            .collect()
    }

    // =========================================================================
    // ANNOTATIONS
    // =========================================================================

    /// Attach an annotation to an element.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the element is absent.
    pub fn add_annotation(&self, element_id: &ElementId, mut draft: AnnotationDraft) -> Result<Submitted<Annotation>, SyncError> {
        self.apply(|model| {
            if model.store.annotation_owner(&draft.id).is_some() {
                draft.id = Uuid::new_v4();
            }
            let scope = Scope::Annotation { element_id: *element_id, annotation_id: draft.id };
            model.apply_optimistic(scope, |model| {
                let annotation = model.store.add_annotation(element_id, draft)?;
                let op = WriteOp::CreateAnnotation { element_id: *element_id, annotation: annotation.clone() };
                Ok((annotation, op))
            })
        })
    }

    /// Append a reply to an annotation thread.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the annotation is absent.
    pub fn reply_annotation(
        &self,
        annotation_id: &AnnotationId,
        content: impl Into<String>,
        author: Author,
    ) -> Result<Submitted<AnnotationReply>, SyncError> {
        let content = content.into();
        self.apply(|model| {
            let scope = annotation_scope(model, annotation_id)?;
            model.apply_optimistic(scope, |model| {
                let reply = model.store.reply(annotation_id, content, author)?;
                let replies = model
                    .store
                    .annotation(annotation_id)
                    .map(|a| a.replies.clone())
                    .unwrap_or_default();
                let patch = AnnotationPatch { replies: Some(replies), ..AnnotationPatch::default() };
                Ok((reply, WriteOp::UpdateAnnotation { annotation_id: *annotation_id, patch }))
            })
        })
    }

    /// Resolve an annotation. `Ok(None)` when it was already resolved: nothing
    /// changes, no event fires, nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the annotation is absent.
    pub fn resolve_annotation(&self, annotation_id: &AnnotationId) -> Result<Option<WriteTicket>, SyncError> {
        self.set_resolved(annotation_id, true)
    }

    /// Reopen an annotation. `Ok(None)` when it was not resolved.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the annotation is absent.
    pub fn reopen_annotation(&self, annotation_id: &AnnotationId) -> Result<Option<WriteTicket>, SyncError> {
        self.set_resolved(annotation_id, false)
    }

    /// Annotations on an element that pass `filter`.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is absent.
    pub fn visible_annotations(&self, element_id: &ElementId, filter: AnnotationFilter) -> Result<Vec<Annotation>, StoreError> {
        let model = lock_model(&self.model);
        Ok(model
            .store
            .visible_annotations(element_id, filter)?
            .into_iter()
            .cloned()
            .collect())
    }

    fn set_resolved(&self, annotation_id: &AnnotationId, resolved: bool) -> Result<Option<WriteTicket>, SyncError> {
        let mutation = {
            let mut model = lock_model(&self.model);
            let current = model
                .store
                .annotation(annotation_id)
                .ok_or(StoreError::AnnotationNotFound(*annotation_id))?;
            if current.resolved == resolved {
                return Ok(None);
            }
            let scope = annotation_scope(&model, annotation_id)?;
            let ((), mutation) = model.apply_optimistic(scope, |model| {
                if resolved {
                    model.store.resolve(annotation_id)?;
                } else {
                    model.store.reopen(annotation_id)?;
                }
                let patch = AnnotationPatch { resolved: Some(resolved), ..AnnotationPatch::default() };
                Ok(((), WriteOp::UpdateAnnotation { annotation_id: *annotation_id, patch }))
            })?;
            mutation
        };
        self.sync.submit(&self.model, &mutation).map(Some)
    }

    // =========================================================================
    // WORKSPACE
    // =========================================================================

    /// Change workspace settings flags. `Ok(None)` when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns a queueing error after rolling the change back.
    pub fn update_settings(&self, patch: SettingsPatch) -> Result<Option<WriteTicket>, SyncError> {
        let mutation = {
            let mut model = lock_model(&self.model);
            let mut next = model.workspace.settings.clone();
            if !patch.apply_to(&mut next) {
                return Ok(None);
            }
            let ((), mutation) = model.apply_optimistic(Scope::Workspace, |model| {
                model.workspace.settings = next;
                Ok(((), WriteOp::SaveWorkspace))
            })?;
            mutation
        };
        self.sync.submit(&self.model, &mutation).map(Some)
    }

    /// Re-apply and re-send a mutation reported by `SyncFailed`.
    ///
    /// # Errors
    ///
    /// Returns a queueing error after rolling the retry back.
    pub fn retry(&self, failed: &PendingMutation) -> Result<WriteTicket, SyncError> {
        self.sync.retry(&self.model, failed)
    }

    /// Changes applied locally whose writes have not finished.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingMutation> {
        lock_model(&self.model).pending().to_vec()
    }

    /// Subscribe to model changes made after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.events.subscribe()
    }

    /// The workspace as it stands locally, canvas included.
    #[must_use]
    pub fn snapshot(&self) -> Workspace {
        lock_model(&self.model).snapshot()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Run `mutate` under the model lock, then queue the mutation it
    /// recorded once the lock is released.
    fn apply<T, F>(&self, mutate: F) -> Result<Submitted<T>, SyncError>
    where
        F: FnOnce(&mut LocalModel) -> Result<(T, PendingMutation), StoreError>,
    {
        let (value, mutation) = mutate(&mut *lock_model(&self.model))?;
        let ticket = self.sync.submit(&self.model, &mutation)?;
        Ok(Submitted { value, ticket })
    }
}

impl Drop for WorkspaceEngine {
    fn drop(&mut self) {
        self.sync.close(self.workspace_id);
    }
}

fn annotation_scope(model: &LocalModel, annotation_id: &AnnotationId) -> Result<Scope, StoreError> {
    let element_id = model
        .store
        .annotation_owner(annotation_id)
        .ok_or(StoreError::AnnotationNotFound(*annotation_id))?;
    Ok(Scope::Annotation { element_id, annotation_id: *annotation_id })
}
