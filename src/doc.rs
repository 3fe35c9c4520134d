//! Document model: canvas elements, their content, and the canvas snapshot.
//!
//! This module defines what sits on a canvas (`Element`, `ElementContent`),
//! the inputs used to create and edit elements (`ElementDraft`,
//! `ElementPatch`), and the whole-canvas snapshot that is persisted inside a
//! workspace (`CanvasDocument`).
//!
//! Data flows into this layer from the remote store (JSON deserialization)
//! and from the drag/edit paths (mutations through `ElementStore`).

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::annotation::Annotation;
use crate::consts::{DEFAULT_CANVAS_BACKGROUND, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH};
use crate::spatial::{Bounds, Point, Position, Size, within_bounds};

/// Unique identifier for a canvas element.
pub type ElementId = Uuid;

/// Unique identifier for a user (element creator, annotation author, collaborator).
pub type UserId = Uuid;

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// The kind of a canvas element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Image,
    Text,
    ColorSwatch,
    Link,
}

/// Type-tagged element payload. The tag doubles as the element's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ElementContent {
    /// Image referenced by an opaque blob URL.
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
    /// Free text block.
    Text {
        text: String,
        #[serde(default, rename = "fontSize", skip_serializing_if = "Option::is_none")]
        font_size: Option<f64>,
    },
    /// Single color chip, e.g. for a palette on a moodboard.
    ColorSwatch {
        hex: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// External link card.
    Link {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl ElementContent {
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Image { .. } => ElementKind::Image,
            Self::Text { .. } => ElementKind::Text,
            Self::ColorSwatch { .. } => ElementKind::ColorSwatch,
            Self::Link { .. } => ElementKind::Link,
        }
    }
}

/// A single visual item on a canvas, as stored locally and on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: ElementId,
    pub position: Position,
    pub size: Size,
    pub content: ElementContent,
    /// Threaded comments anchored to this element. Owned: removed with it.
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    pub created_by: Option<UserId>,
    pub created_at: i64,
}

impl Element {
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.content.kind()
    }

    /// Whether the element lies fully within a canvas of the given dimensions.
    #[must_use]
    pub fn within(&self, canvas: Bounds) -> bool {
        within_bounds(canvas, self.position, self.size)
    }
}

/// Input for creating an element. The store assigns z and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDraft {
    /// Client-minted id; the store re-mints it only on collision.
    pub id: ElementId,
    /// Requested top-left corner; clamped on insert.
    pub position: Point,
    pub size: Size,
    pub content: ElementContent,
    pub created_by: Option<UserId>,
}

impl ElementDraft {
    #[must_use]
    pub fn new(content: ElementContent, position: Point, size: Size) -> Self {
        Self { id: Uuid::new_v4(), position, size, content, created_by: None }
    }

    #[must_use]
    pub fn created_by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }
}

/// Sparse update for an element. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ElementContent>,
}

impl ElementPatch {
    #[must_use]
    pub fn position(point: Point) -> Self {
        Self { position: Some(point), ..Self::default() }
    }

    /// Whether applying this patch requires re-clamping the position.
    #[must_use]
    pub fn touches_geometry(&self) -> bool {
        self.position.is_some() || self.size.is_some()
    }
}

/// Whole-canvas snapshot persisted inside a workspace's settings bag.
///
/// Writes always replace the full document; `version` increases by one per
/// local write so the remote side can reject stale replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    #[serde(default)]
    pub version: u64,
    pub width: f64,
    pub height: f64,
    pub background: String,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl CanvasDocument {
    /// Empty canvas with explicit dimensions.
    #[must_use]
    pub fn empty(width: f64, height: f64) -> Self {
        Self { version: 0, width, height, background: DEFAULT_CANVAS_BACKGROUND.to_string(), elements: Vec::new() }
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.width, self.height)
    }

    #[must_use]
    pub fn element(&self, id: &ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == *id)
    }
}

impl Default for CanvasDocument {
    fn default() -> Self {
        Self::empty(DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT)
    }
}
