//! HTTP/JSON remote store.
//!
//! Thin `reqwest` wrapper over the backend's REST surface. Request and
//! connect timeouts come from [`RemoteConfig`]; a timeout surfaces as
//! `RemoteError::Transport`, which the sync layer treats as a failed write.
//! Response parsing is kept in pure functions for testability.

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{RemoteError, RemoteStore};
use crate::annotation::{Annotation, AnnotationId, AnnotationPatch};
use crate::config::RemoteConfig;
use crate::doc::ElementId;
use crate::workspace::{ProjectId, Workspace, WorkspaceDraft, WorkspaceId, WorkspacePatch};

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpRemoteStore {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpRemoteStore {
    /// Build a client from typed config.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the underlying client cannot be built.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RemoteError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.clone(), api_token: config.api_token.clone() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, RemoteError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = join_url(&self.base_url, path);
        let mut request = self.http.request(method, &url);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        parse_response(status, &text, path)
    }
}

// =============================================================================
// PATHS & PARSING
// =============================================================================

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn parse_response<T: DeserializeOwned>(status: u16, body: &str, path: &str) -> Result<T, RemoteError> {
    match status {
        200..=299 => serde_json::from_str(body).map_err(|e| RemoteError::Parse(e.to_string())),
        404 => Err(RemoteError::NotFound(path.to_string())),
        409 | 422 => Err(RemoteError::Rejected(body.to_string())),
        _ => Err(RemoteError::Status { status, body: body.to_string() }),
    }
}

#[async_trait::async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list_workspaces(&self, project_id: ProjectId) -> Result<Vec<Workspace>, RemoteError> {
        self.send::<(), _>(Method::GET, &format!("projects/{project_id}/workspaces"), None)
            .await
    }

    async fn get_workspace(&self, id: WorkspaceId) -> Result<Workspace, RemoteError> {
        self.send::<(), _>(Method::GET, &format!("workspaces/{id}"), None)
            .await
    }

    async fn create_workspace(&self, draft: &WorkspaceDraft) -> Result<Workspace, RemoteError> {
        self.send(Method::POST, "workspaces", Some(draft)).await
    }

    async fn update_workspace(&self, id: WorkspaceId, patch: &WorkspacePatch) -> Result<Workspace, RemoteError> {
        self.send(Method::PATCH, &format!("workspaces/{id}"), Some(patch))
            .await
    }

    async fn create_annotation(&self, element_id: ElementId, annotation: &Annotation) -> Result<Annotation, RemoteError> {
        self.send(Method::POST, &format!("elements/{element_id}/annotations"), Some(annotation))
            .await
    }

    async fn update_annotation(&self, id: AnnotationId, patch: &AnnotationPatch) -> Result<Annotation, RemoteError> {
        self.send(Method::PATCH, &format!("annotations/{id}"), Some(patch))
            .await
    }
}
