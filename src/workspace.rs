//! Workspace records as exchanged with the remote store.
//!
//! A workspace is the project-scoped container for one visual-collaboration
//! type. Its canvas is not a resource of its own: the full `CanvasDocument`
//! rides inside `settings`, and every canvas write replaces it whole.

#[cfg(test)]
#[path = "workspace_test.rs"]
mod workspace_test;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::doc::{CanvasDocument, UserId};

/// Unique identifier for a workspace.
pub type WorkspaceId = Uuid;

/// Unique identifier for the project a workspace belongs to.
pub type ProjectId = Uuid;

/// The collaboration type of a workspace. At most one live workspace per
/// `(project, type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceType {
    Moodboard,
    Whiteboard,
    Workflow,
    Timeline,
}

impl WorkspaceType {
    pub const ALL: [WorkspaceType; 4] = [Self::Moodboard, Self::Whiteboard, Self::Workflow, Self::Timeline];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Moodboard => "moodboard",
            Self::Whiteboard => "whiteboard",
            Self::Workflow => "workflow",
            Self::Timeline => "timeline",
        }
    }

    /// Whether workspaces of this type carry a spatial canvas.
    #[must_use]
    pub fn has_canvas(self) -> bool {
        matches!(self, Self::Moodboard | Self::Whiteboard)
    }

    fn default_name(self) -> &'static str {
        match self {
            Self::Moodboard => "Moodboard",
            Self::Whiteboard => "Whiteboard",
            Self::Workflow => "Workflow",
            Self::Timeline => "Timeline",
        }
    }
}

impl fmt::Display for WorkspaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings bag. Holds the behavior flags and the embedded canvas snapshot.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSettings {
    #[serde(rename = "public", default)]
    pub is_public: bool,
    #[serde(default = "yes")]
    pub commentable: bool,
    #[serde(default = "yes")]
    pub editable: bool,
    #[serde(default = "yes")]
    pub autosave: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasDocument>,
}

fn yes() -> bool {
    true
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self { is_public: false, commentable: true, editable: true, autosave: true, canvas: None }
    }
}

impl WorkspaceSettings {
    /// Copy of the flags with the canvas replaced.
    #[must_use]
    pub fn with_canvas(&self, canvas: Option<CanvasDocument>) -> Self {
        Self { canvas, ..self.clone() }
    }
}

/// A workspace as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub project_id: ProjectId,
    #[serde(rename = "type")]
    pub kind: WorkspaceType,
    #[serde(default)]
    pub name: String,
    pub created_by: Option<UserId>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub collaborators: BTreeSet<UserId>,
    #[serde(default)]
    pub settings: WorkspaceSettings,
    #[serde(default)]
    pub archived: bool,
}

impl Workspace {
    /// The embedded canvas, or a default empty one when none was saved yet.
    #[must_use]
    pub fn canvas_document(&self) -> CanvasDocument {
        self.settings.canvas.clone().unwrap_or_default()
    }
}

/// Input for creating a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDraft {
    pub project_id: ProjectId,
    #[serde(rename = "type")]
    pub kind: WorkspaceType,
    pub name: String,
    pub created_by: Option<UserId>,
    pub collaborators: BTreeSet<UserId>,
    pub settings: WorkspaceSettings,
}

impl WorkspaceDraft {
    /// Draft with default name and settings. Canvas-bearing types start with
    /// an empty default canvas.
    #[must_use]
    pub fn new(project_id: ProjectId, kind: WorkspaceType) -> Self {
        let canvas = kind.has_canvas().then(CanvasDocument::default);
        Self {
            project_id,
            kind,
            name: kind.default_name().to_string(),
            created_by: None,
            collaborators: BTreeSet::new(),
            settings: WorkspaceSettings { canvas, ..WorkspaceSettings::default() },
        }
    }

    #[must_use]
    pub fn created_by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self.collaborators.insert(user);
        self
    }
}

/// Sparse workspace update. `settings`, when present, is a whole-bag replace
/// and so always carries the full canvas snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<BTreeSet<UserId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<WorkspaceSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

/// Sparse change to the settings flags. The canvas is never part of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(rename = "public", skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autosave: Option<bool>,
}

impl SettingsPatch {
    /// Apply the present flags. Returns whether any flag changed.
    pub fn apply_to(&self, settings: &mut WorkspaceSettings) -> bool {
        let before = (settings.is_public, settings.commentable, settings.editable, settings.autosave);
        if let Some(v) = self.is_public {
            settings.is_public = v;
        }
        if let Some(v) = self.commentable {
            settings.commentable = v;
        }
        if let Some(v) = self.editable {
            settings.editable = v;
        }
        if let Some(v) = self.autosave {
            settings.autosave = v;
        }
        before != (settings.is_public, settings.commentable, settings.editable, settings.autosave)
    }
}
