//! Remote store: the engine's only view of the backend.
//!
//! DESIGN
//! ======
//! `RemoteStore` is a provider-neutral async trait so the sync layer and the
//! workspace directory can be exercised against `MemoryRemoteStore` in tests
//! and pointed at `HttpRemoteStore` in production. There is no element-level
//! remote API: canvas changes travel as a full `CanvasDocument` inside a
//! `WorkspacePatch`.

pub mod http;
pub mod memory;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

use crate::annotation::{Annotation, AnnotationId, AnnotationPatch};
use crate::doc::ElementId;
use crate::workspace::{ProjectId, Workspace, WorkspaceDraft, WorkspaceId, WorkspacePatch};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The referenced workspace, element, or annotation does not exist remotely.
    #[error("remote resource not found: {0}")]
    NotFound(String),

    /// The backend refused the write.
    #[error("remote rejected write: {0}")]
    Rejected(String),

    /// A canvas write carried an older document version than the stored one.
    #[error("stale canvas write: incoming version {incoming} < current {current}")]
    StaleVersion { incoming: u64, current: u64 },

    /// The request never produced a response.
    #[error("remote request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("remote response error: status {status}")]
    Status { status: u16, body: String },

    /// The response body could not be deserialized.
    #[error("remote response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl crate::error::ErrorCode for RemoteError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_REMOTE_NOT_FOUND",
            Self::Rejected(_) => "E_REMOTE_REJECTED",
            Self::StaleVersion { .. } => "E_STALE_VERSION",
            Self::Transport(_) => "E_REMOTE_TRANSPORT",
            Self::Status { .. } => "E_REMOTE_STATUS",
            Self::Parse(_) => "E_REMOTE_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Backend operations consumed by the engine. Enables mocking in tests.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// All workspaces of a project, archived ones included.
    async fn list_workspaces(&self, project_id: ProjectId) -> Result<Vec<Workspace>, RemoteError>;

    async fn get_workspace(&self, id: WorkspaceId) -> Result<Workspace, RemoteError>;

    async fn create_workspace(&self, draft: &WorkspaceDraft) -> Result<Workspace, RemoteError>;

    /// Apply a sparse update. A present `settings` replaces the whole bag,
    /// canvas snapshot included.
    async fn update_workspace(&self, id: WorkspaceId, patch: &WorkspacePatch) -> Result<Workspace, RemoteError>;

    /// Persist a new annotation on an element. The annotation id is chosen
    /// by the client.
    async fn create_annotation(&self, element_id: ElementId, annotation: &Annotation) -> Result<Annotation, RemoteError>;

    async fn update_annotation(&self, id: AnnotationId, patch: &AnnotationPatch) -> Result<Annotation, RemoteError>;
}
