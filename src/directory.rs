//! Workspace directory: per-project dedup cache of canonical workspaces.
//!
//! DESIGN
//! ======
//! Maps `(project, type)` to the canonical workspace. The cache is derived
//! and never authoritative: a project is listed from the remote store the
//! first time it is touched, every fetched workspace is folded back in with
//! [`WorkspaceDirectory::record`], and [`WorkspaceDirectory::invalidate`]
//! drops a project so the next lookup lists again.
//!
//! Duplicate creation is prevented by serializing `get_or_create` per
//! `(project, type)` through an async keyed lock: the first caller lists and
//! creates while the rest wait, then find the new workspace in the cache.
//! Duplicates that already exist remotely (created by another client) are
//! reported after the fact: the earliest-created live workspace is canonical
//! and the rest come back as [`DuplicateWorkspace`]. Nothing is deleted.

#[cfg(test)]
#[path = "directory_test.rs"]
mod directory_test;

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::doc::UserId;
use crate::remote::{RemoteError, RemoteStore};
use crate::workspace::{ProjectId, Workspace, WorkspaceDraft, WorkspaceId, WorkspaceType};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("workspace directory call timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },
}

impl crate::error::ErrorCode for DirectoryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Remote(e) => e.error_code(),
            Self::TimedOut { .. } => "E_DIRECTORY_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Remote(e) => e.retryable(),
            Self::TimedOut { .. } => true,
        }
    }
}

/// More than one live workspace exists for one `(project, type)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate {kind} workspaces in project {project_id}: canonical {canonical}, duplicates {duplicates:?}")]
pub struct DuplicateWorkspace {
    pub project_id: ProjectId,
    pub kind: WorkspaceType,
    /// Earliest-created live workspace.
    pub canonical: WorkspaceId,
    /// The rest, oldest first.
    pub duplicates: Vec<WorkspaceId>,
}

impl crate::error::ErrorCode for DuplicateWorkspace {
    fn error_code(&self) -> &'static str {
        "E_DUPLICATE_WORKSPACE"
    }
}

// =============================================================================
// MERGE
// =============================================================================

/// A list item that can be deduplicated and shallow-merged by key.
pub trait Mergeable {
    type Key: Eq + Hash;

    /// Identity used for dedupe. Items without one are always appended.
    fn merge_key(&self) -> Option<Self::Key>;

    /// Fold a newer copy of the same item into this one.
    fn merge_from(&mut self, incoming: Self);
}

impl Mergeable for Workspace {
    type Key = WorkspaceId;

    fn merge_key(&self) -> Option<WorkspaceId> {
        Some(self.id)
    }

    fn merge_from(&mut self, incoming: Self) {
        *self = incoming;
    }
}

/// Raw JSON records keyed on their `"id"` field; incoming keys overwrite
/// existing ones one level deep.
impl Mergeable for serde_json::Value {
    type Key = String;

    fn merge_key(&self) -> Option<String> {
        self.get("id").map(ToString::to_string)
    }

    fn merge_from(&mut self, incoming: Self) {
        match (self.as_object_mut(), incoming) {
            (Some(current), serde_json::Value::Object(fields)) => {
                for (key, value) in fields {
                    current.insert(key, value);
                }
            }
            (_, other) => *self = other,
        }
    }
}

/// Merge two lists, deduplicating by key. Existing order is kept, new keys
/// are appended in incoming order, and a later copy of a key shallow-merges
/// into the first.
pub fn merge_list<T: Mergeable>(existing: Vec<T>, incoming: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<T::Key, usize> = HashMap::new();
    for item in existing.into_iter().chain(incoming) {
        let Some(key) = item.merge_key() else {
            out.push(item);
            continue;
        };
        match index.get(&key).and_then(|&pos| out.get_mut(pos)) {
            Some(slot) => slot.merge_from(item),
            None => {
                index.insert(key, out.len());
                out.push(item);
            }
        }
    }
    out
}

// =============================================================================
// DIRECTORY
// =============================================================================

/// Result of [`WorkspaceDirectory::get_or_create`].
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub workspace: Workspace,
    /// True only for the caller whose request created the workspace.
    pub is_new: bool,
}

#[derive(Default)]
struct ProjectCache {
    /// Set once the full project listing has been merged in.
    listed: bool,
    workspaces: Vec<Workspace>,
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

pub struct WorkspaceDirectory {
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    projects: Mutex<HashMap<ProjectId, ProjectCache>>,
    creating: Mutex<HashMap<(ProjectId, WorkspaceType), KeyLock>>,
}

impl WorkspaceDirectory {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self { remote, config, projects: Mutex::new(HashMap::new()), creating: Mutex::new(HashMap::new()) }
    }

    fn projects(&self) -> MutexGuard<'_, HashMap<ProjectId, ProjectCache>> {
        self.projects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_lock(&self, project_id: ProjectId, kind: WorkspaceType) -> KeyLock {
        self.creating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((project_id, kind))
            .or_default()
            .clone()
    }

    /// The canonical workspace for `(project, type)`, creating it remotely
    /// if none exists. Served from cache without network when possible.
    ///
    /// # Errors
    ///
    /// Returns `Remote` if listing or creating fails and `TimedOut` if either
    /// call exceeds its configured bound. Nothing is cached on failure.
    pub async fn get_or_create(
        &self,
        project_id: ProjectId,
        kind: WorkspaceType,
        created_by: Option<UserId>,
    ) -> Result<DirectoryEntry, DirectoryError> {
        if let Some(workspace) = self.cached(project_id, kind) {
            return Ok(DirectoryEntry { workspace, is_new: false });
        }

        let lock = self.key_lock(project_id, kind);
        let resolved = {
            let _guard = lock.lock().await;
            self.resolve_locked(project_id, kind, created_by).await
        };
        self.release_key(project_id, kind, &lock);
        resolved
    }

    async fn resolve_locked(
        &self,
        project_id: ProjectId,
        kind: WorkspaceType,
        created_by: Option<UserId>,
    ) -> Result<DirectoryEntry, DirectoryError> {
        // Another caller may have finished while this one waited.
        if let Some(workspace) = self.cached(project_id, kind) {
            debug!(%project_id, %kind, "workspace resolved by concurrent caller");
            return Ok(DirectoryEntry { workspace, is_new: false });
        }

        if !self.is_listed(project_id) {
            let listed = bounded(self.config.fetch_timeout(), self.remote.list_workspaces(project_id)).await?;
            self.populate(project_id, listed);
            if let Some(workspace) = self.cached(project_id, kind) {
                return Ok(DirectoryEntry { workspace, is_new: false });
            }
        }

        let mut draft = WorkspaceDraft::new(project_id, kind);
        if let Some(user) = created_by {
            draft = draft.created_by(user);
        }
        let workspace = bounded(self.config.write_timeout(), self.remote.create_workspace(&draft)).await?;
        info!(%project_id, %kind, workspace_id = %workspace.id, "workspace created");
        self.record(workspace.clone());
        Ok(DirectoryEntry { workspace, is_new: true })
    }

    /// Cached canonical workspace for `(project, type)`, no network.
    #[must_use]
    pub fn cached(&self, project_id: ProjectId, kind: WorkspaceType) -> Option<Workspace> {
        let projects = self.projects();
        canonical(&projects.get(&project_id)?.workspaces, kind).cloned()
    }

    /// Fold a freshly fetched workspace into the cache.
    pub fn record(&self, workspace: Workspace) {
        let project_id = workspace.project_id;
        let mut projects = self.projects();
        let cache = projects.entry(project_id).or_default();
        let existing = std::mem::take(&mut cache.workspaces);
        cache.workspaces = merge_list(existing, vec![workspace]);
    }

    /// Drop a project's cache; the next lookup lists it again.
    pub fn invalidate(&self, project_id: ProjectId) {
        self.creating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(project, _), _| *project != project_id);
        if self.projects().remove(&project_id).is_some() {
            debug!(%project_id, "workspace directory invalidated");
        }
    }

    /// Every `(project, type)` in the cache with more than one live workspace.
    #[must_use]
    pub fn duplicates(&self, project_id: ProjectId) -> Vec<DuplicateWorkspace> {
        let projects = self.projects();
        let Some(cache) = projects.get(&project_id) else {
            return Vec::new();
        };
        WorkspaceType::ALL
            .into_iter()
            .filter_map(|kind| duplicate_report(project_id, kind, &cache.workspaces))
            .collect()
    }

    /// Forget the key lock once no other caller is queued on it. A caller
    /// that arrives later finds the workspace in the cache, or takes a fresh
    /// lock.
    fn release_key(&self, project_id: ProjectId, kind: WorkspaceType, lock: &KeyLock) {
        let mut creating = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = creating
            .get(&(project_id, kind))
            .is_some_and(|current| Arc::ptr_eq(current, lock) && Arc::strong_count(current) == 2);
        if idle {
            creating.remove(&(project_id, kind));
        }
    }

    fn is_listed(&self, project_id: ProjectId) -> bool {
        self.projects().get(&project_id).is_some_and(|c| c.listed)
    }

    fn populate(&self, project_id: ProjectId, listed: Vec<Workspace>) {
        let count = listed.len();
        {
            let mut projects = self.projects();
            let cache = projects.entry(project_id).or_default();
            let existing = std::mem::take(&mut cache.workspaces);
            cache.workspaces = merge_list(existing, listed);
            cache.listed = true;
        }
        debug!(%project_id, count, "workspace directory populated");
        for report in self.duplicates(project_id) {
            warn!(
                code = "E_DUPLICATE_WORKSPACE",
                %project_id,
                kind = %report.kind,
                canonical = %report.canonical,
                duplicates = report.duplicates.len(),
                "duplicate workspaces detected"
            );
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Live workspaces of one type, oldest first (ties broken by id).
fn live_by_age(workspaces: &[Workspace], kind: WorkspaceType) -> Vec<&Workspace> {
    let mut live: Vec<&Workspace> = workspaces
        .iter()
        .filter(|ws| ws.kind == kind && !ws.archived)
        .collect();
    live.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    live
}

fn canonical(workspaces: &[Workspace], kind: WorkspaceType) -> Option<&Workspace> {
    live_by_age(workspaces, kind).into_iter().next()
}

fn duplicate_report(project_id: ProjectId, kind: WorkspaceType, workspaces: &[Workspace]) -> Option<DuplicateWorkspace> {
    let live = live_by_age(workspaces, kind);
    let (first, rest) = live.split_first()?;
    if rest.is_empty() {
        return None;
    }
    Some(DuplicateWorkspace {
        project_id,
        kind,
        canonical: first.id,
        duplicates: rest.iter().map(|ws| ws.id).collect(),
    })
}

async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, DirectoryError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DirectoryError::TimedOut { after_ms: duration_ms(limit) }),
    }
}

fn duration_ms(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}
