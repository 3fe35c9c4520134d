//! Synchronization layer: optimistic mutation, write-through, reconcile.
//!
//! DESIGN
//! ======
//! Every edit is applied to the [`LocalModel`] first and recorded as a
//! [`PendingMutation`] holding the target's snapshot from before and after
//! the edit. The mutation is then queued on its workspace's FIFO: one tokio
//! task per workspace drains the queue, so writes for a workspace reach the
//! remote store strictly in submission order and never overlap.
//!
//! Workspace payloads (canvas plus settings) are built when a job is dequeued,
//! not when it is submitted. A change rolled back by an earlier failure is
//! therefore never re-persisted by a later queued write.
//!
//! Outcome of a write:
//! - success: the pending mutation is discarded, the workspace is refetched,
//!   and the local model reconciled to it. Reconciliation is skipped while
//!   other mutations for the workspace are still pending; the last write's
//!   reconcile covers them.
//! - failure or timeout: the target is restored from the `previous` snapshot
//!   and `SyncFailed` is emitted. Nothing retries automatically; callers use
//!   [`SyncLayer::retry`].
//!
//! The model sits behind a `std::sync::Mutex` shared by the caller and the
//! queue worker. The lock is never held across an `.await`.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::annotation::{Annotation, AnnotationId, AnnotationPatch};
use crate::config::SyncConfig;
use crate::directory::WorkspaceDirectory;
use crate::doc::{Element, ElementId, now_ms};
use crate::error::ErrorCode;
use crate::event::{CanvasEvent, EventBus};
use crate::input::DragController;
use crate::remote::{RemoteError, RemoteStore};
use crate::store::{ElementStore, StoreError};
use crate::workspace::{Workspace, WorkspaceId, WorkspacePatch, WorkspaceSettings};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The local target does not exist. Nothing was applied or sent.
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("write-through failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("write-through timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },
    #[error("write queue closed")]
    QueueClosed,
    #[error("no async runtime available for write-through")]
    NoRuntime,
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_code(),
            Self::Remote(e) => e.error_code(),
            Self::TimedOut { .. } => "E_SYNC_TIMEOUT",
            Self::QueueClosed => "E_SYNC_QUEUE_CLOSED",
            Self::NoRuntime => "E_SYNC_NO_RUNTIME",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Remote(e) => e.retryable(),
            Self::TimedOut { .. } | Self::QueueClosed | Self::NoRuntime => true,
            Self::Store(_) => false,
        }
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Unique identifier for a pending mutation.
pub type MutationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Element,
    Canvas,
    Workspace,
}

/// What a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationTarget {
    Element(ElementId),
    Canvas(WorkspaceId),
    Workspace(WorkspaceId),
}

impl MutationTarget {
    #[must_use]
    pub fn target_type(&self) -> TargetType {
        match self {
            Self::Element(_) => TargetType::Element,
            Self::Canvas(_) => TargetType::Canvas,
            Self::Workspace(_) => TargetType::Workspace,
        }
    }

    #[must_use]
    pub fn target_id(&self) -> Uuid {
        match self {
            Self::Element(id) | Self::Canvas(id) | Self::Workspace(id) => *id,
        }
    }
}

/// The part of the local model a mutation may change, and so must snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One element's geometry and content (not its annotations).
    Element(ElementId),
    /// One annotation on an element, thread included.
    Annotation { element_id: ElementId, annotation_id: AnnotationId },
    /// Canvas-level properties.
    Canvas,
    /// Workspace settings flags.
    Workspace,
}

/// Captured state of a [`Scope`]. `None` states mean "did not exist".
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Element { id: ElementId, state: Option<Element> },
    Annotation { element_id: ElementId, annotation_id: AnnotationId, state: Option<Annotation> },
    Canvas { background: String },
    /// Settings flags; `canvas` is always `None`.
    Workspace(WorkspaceSettings),
}

/// Remote write performed for a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the workspace settings bag, current canvas included.
    SaveWorkspace,
    CreateAnnotation { element_id: ElementId, annotation: Annotation },
    UpdateAnnotation { annotation_id: AnnotationId, patch: AnnotationPatch },
}

/// A locally applied change waiting on its remote write.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub id: MutationId,
    pub workspace_id: WorkspaceId,
    pub target: MutationTarget,
    /// State before the change; restored on failure.
    pub previous: Snapshot,
    /// State after the change; re-applied by a manual retry.
    pub applied: Snapshot,
    pub op: WriteOp,
    pub applied_at: i64,
}

// =============================================================================
// LOCAL MODEL
// =============================================================================

/// Client-local state of one open workspace.
#[derive(Debug)]
pub struct LocalModel {
    /// Workspace metadata. `settings.canvas` is always `None`; the canvas
    /// lives in `store`.
    pub workspace: Workspace,
    pub store: ElementStore,
    pub drag: DragController,
    pending: Vec<PendingMutation>,
}

/// Model handle shared between the engine and the queue worker.
pub type SharedModel = Arc<Mutex<LocalModel>>;

/// Lock the model, recovering from poisoning.
pub fn lock_model(model: &SharedModel) -> MutexGuard<'_, LocalModel> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LocalModel {
    /// Hydrate from a fetched workspace.
    #[must_use]
    pub fn new(mut workspace: Workspace, events: EventBus) -> Self {
        let document = workspace.canvas_document();
        workspace.settings.canvas = None;
        Self { workspace, store: ElementStore::new(document, events), drag: DragController::new(), pending: Vec::new() }
    }

    #[must_use]
    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace.id
    }

    #[must_use]
    pub fn pending(&self) -> &[PendingMutation] {
        &self.pending
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn is_pending(&self, id: &MutationId) -> bool {
        self.pending.iter().any(|m| m.id == *id)
    }

    fn take_pending(&mut self, id: &MutationId) -> Option<PendingMutation> {
        let index = self.pending.iter().position(|m| m.id == *id)?;
        Some(self.pending.remove(index))
    }

    /// Current state of a scope.
    #[must_use]
    pub fn capture(&self, scope: Scope) -> Snapshot {
        match scope {
            Scope::Element(id) => Snapshot::Element { id, state: self.store.get(&id).cloned() },
            Scope::Annotation { element_id, annotation_id } => Snapshot::Annotation {
                element_id,
                annotation_id,
                state: self.store.annotation(&annotation_id).cloned(),
            },
            Scope::Canvas => Snapshot::Canvas { background: self.store.background().to_string() },
            Scope::Workspace => Snapshot::Workspace(self.workspace.settings.with_canvas(None)),
        }
    }

    /// Put a scope back to a snapshot.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        match snapshot {
            Snapshot::Element { id, state } => self.store.restore_element(id, state.clone()),
            Snapshot::Annotation { element_id, annotation_id, state } => {
                self.store.restore_annotation(element_id, annotation_id, state.clone());
            }
            Snapshot::Canvas { background } => self.store.set_background(background.clone()),
            Snapshot::Workspace(settings) => self.workspace.settings = settings.with_canvas(None),
        }
    }

    /// Apply `mutate` locally and record it as pending. On error nothing is
    /// recorded and the model is left as `mutate` found it.
    ///
    /// # Errors
    ///
    /// Propagates the `StoreError` returned by `mutate`.
    pub fn apply_optimistic<T, F>(&mut self, scope: Scope, mutate: F) -> Result<(T, PendingMutation), StoreError>
    where
        F: FnOnce(&mut LocalModel) -> Result<(T, WriteOp), StoreError>,
    {
        let previous = self.capture(scope);
        let (value, op) = mutate(self)?;
        let applied = self.capture(scope);
        let mutation = self.record_pending(scope, previous, applied, op);
        Ok((value, mutation))
    }

    /// Record a change that was already applied (e.g. by the drag controller).
    pub fn record_pending(&mut self, scope: Scope, previous: Snapshot, applied: Snapshot, op: WriteOp) -> PendingMutation {
        let workspace_id = self.workspace.id;
        let target = match scope {
            Scope::Element(id) | Scope::Annotation { element_id: id, .. } => MutationTarget::Element(id),
            Scope::Canvas => MutationTarget::Canvas(workspace_id),
            Scope::Workspace => MutationTarget::Workspace(workspace_id),
        };
        let mutation = PendingMutation { id: Uuid::new_v4(), workspace_id, target, previous, applied, op, applied_at: now_ms() };
        self.pending.push(mutation.clone());
        mutation
    }

    /// Settings bag for a workspace write, carrying the canvas at the next
    /// document version, plus that version. The store's own version is left
    /// alone until the write succeeds.
    fn settings_payload(&self) -> (WorkspaceSettings, Option<u64>) {
        let carries_canvas = self.workspace.kind.has_canvas() || !self.store.is_empty();
        let canvas = carries_canvas.then(|| {
            let mut document = self.store.to_document();
            document.version += 1;
            document
        });
        let version = canvas.as_ref().map(|c| c.version);
        (self.workspace.settings.with_canvas(canvas), version)
    }

    /// Replace local state with the authoritative workspace. An element being
    /// dragged keeps its local position.
    pub fn reconcile(&mut self, mut workspace: Workspace) {
        if let Some(canvas) = workspace.settings.canvas.take() {
            self.store.reconcile(canvas, self.drag.dragging_element());
        }
        self.workspace = workspace;
    }

    /// Full workspace as it stands locally, canvas included.
    #[must_use]
    pub fn snapshot(&self) -> Workspace {
        let mut workspace = self.workspace.clone();
        workspace.settings.canvas = Some(self.store.to_document());
        workspace
    }
}

// =============================================================================
// WRITE QUEUE
// =============================================================================

/// Completion handle for a submitted write. May be awaited or dropped.
#[derive(Debug)]
pub struct WriteTicket {
    mutation_id: MutationId,
    rx: oneshot::Receiver<Result<(), SyncError>>,
}

impl WriteTicket {
    #[must_use]
    pub fn mutation_id(&self) -> MutationId {
        self.mutation_id
    }

    /// Wait for the write (and any reconcile) to finish.
    ///
    /// # Errors
    ///
    /// Returns the write's failure, already rolled back, or `QueueClosed` if
    /// the worker went away.
    pub async fn wait(self) -> Result<(), SyncError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(SyncError::QueueClosed),
        }
    }
}

struct WriteJob {
    mutation_id: MutationId,
    op: WriteOp,
    model: SharedModel,
    done: oneshot::Sender<Result<(), SyncError>>,
}

/// Request built from a job at dequeue time.
enum RemoteWrite {
    Workspace(WorkspacePatch),
    CreateAnnotation { element_id: ElementId, annotation: Annotation },
    UpdateAnnotation { annotation_id: AnnotationId, patch: AnnotationPatch },
}

#[derive(Clone)]
struct Worker {
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    directory: Option<Arc<WorkspaceDirectory>>,
}

/// Routes pending mutations to per-workspace FIFO queues.
pub struct SyncLayer {
    worker: Worker,
    queues: Mutex<HashMap<WorkspaceId, mpsc::UnboundedSender<WriteJob>>>,
}

impl SyncLayer {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self { worker: Worker { remote, config, directory: None }, queues: Mutex::new(HashMap::new()) }
    }

    /// Keep a directory's cache current with every reconciling refetch.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<WorkspaceDirectory>) -> Self {
        self.worker.directory = Some(directory);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.worker.config
    }

    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.worker.remote
    }

    /// Queue a pending mutation's write without waiting for it.
    ///
    /// If the write cannot even be queued, the mutation is rolled back and
    /// `SyncFailed` emitted before the error is returned. The caller must not
    /// hold the model lock.
    ///
    /// # Errors
    ///
    /// Returns `NoRuntime` outside a tokio runtime, or `QueueClosed`.
    pub fn submit(&self, model: &SharedModel, mutation: &PendingMutation) -> Result<WriteTicket, SyncError> {
        let (done, rx) = oneshot::channel();
        let job = WriteJob { mutation_id: mutation.id, op: mutation.op.clone(), model: Arc::clone(model), done };

        let queued = self
            .queue(mutation.workspace_id)
            .and_then(|tx| tx.send(job).map_err(|_| SyncError::QueueClosed));
        match queued {
            Ok(()) => Ok(WriteTicket { mutation_id: mutation.id, rx }),
            Err(e) => {
                warn!(error = %e, mutation_id = %mutation.id, "write could not be queued; rolling back");
                roll_back(&mut lock_model(model), &mutation.id, &e);
                Err(e)
            }
        }
    }

    /// Queue a mutation and wait for its outcome.
    ///
    /// # Errors
    ///
    /// See [`SyncLayer::submit`] and [`WriteTicket::wait`].
    pub async fn write_through(&self, model: &SharedModel, mutation: &PendingMutation) -> Result<(), SyncError> {
        self.submit(model, mutation)?.wait().await
    }

    /// Re-apply a failed mutation's `applied` snapshot and queue the same
    /// write again under a fresh mutation id.
    ///
    /// # Errors
    ///
    /// See [`SyncLayer::submit`].
    pub fn retry(&self, model: &SharedModel, failed: &PendingMutation) -> Result<WriteTicket, SyncError> {
        let mutation = {
            let mut guard = lock_model(model);
            let scope = scope_of(&failed.applied);
            let previous = guard.capture(scope);
            guard.restore(&failed.applied);
            let applied = guard.capture(scope);
            guard.record_pending(scope, previous, applied, failed.op.clone())
        };
        info!(retry_of = %failed.id, mutation_id = %mutation.id, "retrying failed write");
        self.submit(model, &mutation)
    }

    /// Stop accepting writes for a workspace. Jobs already queued still run;
    /// the worker exits once they are drained. A later submit starts a new
    /// queue.
    pub fn close(&self, workspace_id: WorkspaceId) {
        let removed = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&workspace_id);
        if removed.is_some() {
            debug!(%workspace_id, "write queue closed");
        }
    }

    /// Number of workspaces with a live write queue.
    #[must_use]
    pub fn open_queues(&self) -> usize {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn queue(&self, workspace_id: WorkspaceId) -> Result<mpsc::UnboundedSender<WriteJob>, SyncError> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = queues.get(&workspace_id) {
            if !tx.is_closed() {
                return Ok(tx.clone());
            }
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(self.worker.clone().run(workspace_id, rx));
        queues.insert(workspace_id, tx.clone());
        debug!(%workspace_id, "write queue started");
        Ok(tx)
    }
}

impl Worker {
    async fn run(self, workspace_id: WorkspaceId, mut rx: mpsc::UnboundedReceiver<WriteJob>) {
        while let Some(job) = rx.recv().await {
            let result = self.process(workspace_id, &job).await;
            if job.done.send(result).is_err() {
                debug!(mutation_id = %job.mutation_id, "write ticket dropped before completion");
            }
        }
        debug!(%workspace_id, "write queue stopped");
    }

    async fn process(&self, workspace_id: WorkspaceId, job: &WriteJob) -> Result<(), SyncError> {
        let (request, version) = {
            let model = lock_model(&job.model);
            if !model.is_pending(&job.mutation_id) {
                debug!(mutation_id = %job.mutation_id, "mutation no longer pending; skipping write");
                return Ok(());
            }
            build_request(&model, &job.op)
        };

        let written = match tokio::time::timeout(self.config.write_timeout(), self.execute(workspace_id, request)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SyncError::Remote(e)),
            Err(_) => Err(SyncError::TimedOut { after_ms: self.config.write_timeout_ms }),
        };
        if let Err(e) = written {
            warn!(%workspace_id, mutation_id = %job.mutation_id, error = %e, code = e.error_code(), "write-through failed");
            roll_back(&mut lock_model(&job.model), &job.mutation_id, &e);
            return Err(e);
        }

        {
            let mut model = lock_model(&job.model);
            model.take_pending(&job.mutation_id);
            if let Some(version) = version {
                model.store.commit_version(version);
            }
        }
        debug!(%workspace_id, mutation_id = %job.mutation_id, "write-through confirmed");
        self.refetch_and_reconcile(workspace_id, &job.model).await;
        Ok(())
    }

    async fn execute(&self, workspace_id: WorkspaceId, request: RemoteWrite) -> Result<(), RemoteError> {
        match request {
            RemoteWrite::Workspace(patch) => {
                self.remote.update_workspace(workspace_id, &patch).await?;
            }
            RemoteWrite::CreateAnnotation { element_id, annotation } => {
                self.remote.create_annotation(element_id, &annotation).await?;
            }
            RemoteWrite::UpdateAnnotation { annotation_id, patch } => {
                self.remote.update_annotation(annotation_id, &patch).await?;
            }
        }
        Ok(())
    }

    async fn refetch_and_reconcile(&self, workspace_id: WorkspaceId, model: &SharedModel) {
        let fetched = match tokio::time::timeout(self.config.fetch_timeout(), self.remote.get_workspace(workspace_id)).await {
            Ok(Ok(workspace)) => workspace,
            Ok(Err(e)) => {
                warn!(%workspace_id, error = %e, "reconcile refetch failed; keeping local state");
                return;
            }
            Err(_) => {
                warn!(%workspace_id, after_ms = self.config.fetch_timeout_ms, "reconcile refetch timed out; keeping local state");
                return;
            }
        };
        if let Some(directory) = &self.directory {
            directory.record(fetched.clone());
        }

        let mut model = lock_model(model);
        if model.has_pending() {
            debug!(%workspace_id, pending = model.pending.len(), "reconcile deferred to a later write");
            return;
        }
        model.reconcile(fetched);
        let version = model.store.version();
        model.store.events().emit(CanvasEvent::Reconciled { workspace_id, version });
        debug!(%workspace_id, version, "local model reconciled");
    }
}

/// Request for a job, plus the canvas version it carries, if any.
fn build_request(model: &LocalModel, op: &WriteOp) -> (RemoteWrite, Option<u64>) {
    match op {
        WriteOp::SaveWorkspace => {
            let (settings, version) = model.settings_payload();
            let patch = WorkspacePatch { settings: Some(settings), ..WorkspacePatch::default() };
            (RemoteWrite::Workspace(patch), version)
        }
        WriteOp::CreateAnnotation { element_id, annotation } => {
            (RemoteWrite::CreateAnnotation { element_id: *element_id, annotation: annotation.clone() }, None)
        }
        WriteOp::UpdateAnnotation { annotation_id, patch } => {
            (RemoteWrite::UpdateAnnotation { annotation_id: *annotation_id, patch: patch.clone() }, None)
        }
    }
}

/// Undo a pending mutation and tell subscribers. No-op if it is not pending.
fn roll_back(model: &mut LocalModel, mutation_id: &MutationId, error: &SyncError) {
    let Some(mutation) = model.take_pending(mutation_id) else {
        return;
    };
    model.restore(&mutation.previous);
    model.store.events().emit(CanvasEvent::SyncFailed {
        mutation: Box::new(mutation),
        error: error.to_string(),
        code: error.error_code(),
    });
}

fn scope_of(snapshot: &Snapshot) -> Scope {
    match snapshot {
        Snapshot::Element { id, .. } => Scope::Element(*id),
        Snapshot::Annotation { element_id, annotation_id, .. } => {
            Scope::Annotation { element_id: *element_id, annotation_id: *annotation_id }
        }
        Snapshot::Canvas { .. } => Scope::Canvas,
        Snapshot::Workspace(_) => Scope::Workspace,
    }
}
