//! Annotation subsystem: threaded comments anchored to canvas elements.
//!
//! DESIGN
//! ======
//! Annotations live inside their element (`Element::annotations`) so the
//! whole thread travels with the canvas snapshot. The store keeps an
//! annotation-id -> element-id index for O(1) lookups; this module extends
//! `ElementStore` with the annotation operations.
//!
//! Lifecycle: created unresolved, resolved or reopened only by explicit
//! calls (both idempotent, and silent when nothing changes), replies may be
//! appended in either state.

#[cfg(test)]
#[path = "annotation_test.rs"]
mod annotation_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::doc::{ElementId, UserId, now_ms};
use crate::event::CanvasEvent;
use crate::spatial::Point;
use crate::store::{ElementStore, StoreError};

/// Unique identifier for an annotation or a reply.
pub type AnnotationId = Uuid;

/// Who wrote an annotation or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
}

impl Author {
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// A reply in an annotation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationReply {
    pub id: AnnotationId,
    pub content: String,
    pub author_id: UserId,
    pub author_name: String,
    pub created_at: i64,
}

/// A comment pinned to a point inside an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: AnnotationId,
    /// Anchor relative to the element's top-left corner.
    pub position: Point,
    pub content: String,
    pub author_id: UserId,
    pub author_name: String,
    pub created_at: i64,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    #[serde(default)]
    pub replies: Vec<AnnotationReply>,
}

/// Input for a new annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDraft {
    /// Client-minted id, also used by the remote store.
    pub id: AnnotationId,
    pub content: String,
    pub position: Point,
    pub author: Author,
}

impl AnnotationDraft {
    #[must_use]
    pub fn new(content: impl Into<String>, author: Author) -> Self {
        Self { id: Uuid::new_v4(), content: content.into(), position: Point::default(), author }
    }

    #[must_use]
    pub fn at(mut self, position: Point) -> Self {
        self.position = position;
        self
    }
}

/// Sparse annotation update sent to the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
    /// Full reply list; threads are replaced, not appended, on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<AnnotationReply>>,
}

/// Which annotations a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnotationFilter {
    #[default]
    All,
    Unresolved,
}

impl AnnotationFilter {
    fn admits(self, annotation: &Annotation) -> bool {
        match self {
            Self::All => true,
            Self::Unresolved => !annotation.resolved,
        }
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl ElementStore {
    /// Attach a new, unresolved annotation to an element. The anchor is
    /// clamped into the element's box.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is absent.
    pub fn add_annotation(&mut self, element_id: &ElementId, draft: AnnotationDraft) -> Result<Annotation, StoreError> {
        let size = self
            .elements
            .get(element_id)
            .ok_or(StoreError::ElementNotFound(*element_id))?
            .size;
        let anchor = Point::new(
            clamp_anchor(draft.position.x, size.width),
            clamp_anchor(draft.position.y, size.height),
        );
        let id = if self.annotation_index.contains_key(&draft.id) { Uuid::new_v4() } else { draft.id };
        let element = self
            .elements
            .get_mut(element_id)
            .ok_or(StoreError::ElementNotFound(*element_id))?;
        let annotation = Annotation {
            id,
            position: anchor,
            content: draft.content,
            author_id: draft.author.id,
            author_name: draft.author.name,
            created_at: now_ms(),
            resolved: false,
            resolved_at: None,
            replies: Vec::new(),
        };
        element.annotations.push(annotation.clone());
        self.annotation_index.insert(annotation.id, *element_id);

        self.events.emit(CanvasEvent::AnnotationAdded { element_id: *element_id, annotation: annotation.clone() });
        Ok(annotation)
    }

    /// Append a reply to an annotation thread. Leaves `resolved` untouched.
    ///
    /// # Errors
    ///
    /// Returns `AnnotationNotFound` if the annotation is absent.
    pub fn reply(
        &mut self,
        annotation_id: &AnnotationId,
        content: impl Into<String>,
        author: Author,
    ) -> Result<AnnotationReply, StoreError> {
        let annotation = self.annotation_mut(annotation_id)?;
        let reply = AnnotationReply {
            id: Uuid::new_v4(),
            content: content.into(),
            author_id: author.id,
            author_name: author.name,
            created_at: now_ms(),
        };
        annotation.replies.push(reply.clone());

        self.events.emit(CanvasEvent::AnnotationReplied { annotation_id: *annotation_id, reply: reply.clone() });
        Ok(reply)
    }

    /// Mark an annotation resolved. Returns whether anything changed; an
    /// already-resolved annotation is left as is and emits nothing.
    ///
    /// # Errors
    ///
    /// Returns `AnnotationNotFound` if the annotation is absent.
    pub fn resolve(&mut self, annotation_id: &AnnotationId) -> Result<bool, StoreError> {
        let annotation = self.annotation_mut(annotation_id)?;
        if annotation.resolved {
            return Ok(false);
        }
        annotation.resolved = true;
        annotation.resolved_at = Some(now_ms());
        self.events.emit(CanvasEvent::AnnotationResolved { annotation_id: *annotation_id });
        Ok(true)
    }

    /// Mark an annotation unresolved. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns `AnnotationNotFound` if the annotation is absent.
    pub fn reopen(&mut self, annotation_id: &AnnotationId) -> Result<bool, StoreError> {
        let annotation = self.annotation_mut(annotation_id)?;
        if !annotation.resolved {
            return Ok(false);
        }
        annotation.resolved = false;
        annotation.resolved_at = None;
        self.events.emit(CanvasEvent::AnnotationReopened { annotation_id: *annotation_id });
        Ok(true)
    }

    /// Annotations on an element that pass `filter`, in creation order.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is absent.
    pub fn visible_annotations(
        &self,
        element_id: &ElementId,
        filter: AnnotationFilter,
    ) -> Result<Vec<&Annotation>, StoreError> {
        let element = self
            .elements
            .get(element_id)
            .ok_or(StoreError::ElementNotFound(*element_id))?;
        Ok(element
            .annotations
            .iter()
            .filter(|a| filter.admits(a))
            .collect())
    }

    /// Put an annotation back to an earlier snapshot. `None` removes it. A
    /// missing owner element makes this a no-op. Emits `ElementUpdated` for
    /// the owner when anything changed.
    pub fn restore_annotation(&mut self, element_id: &ElementId, annotation_id: &AnnotationId, snapshot: Option<Annotation>) {
        let Some(element) = self.elements.get_mut(element_id) else {
            return;
        };
        let slot = element.annotations.iter().position(|a| a.id == *annotation_id);
        match (slot, snapshot) {
            (Some(index), Some(annotation)) => {
                if let Some(current) = element.annotations.get_mut(index) {
                    *current = annotation;
                }
            }
            (None, Some(annotation)) => {
                element.annotations.push(annotation);
                self.annotation_index.insert(*annotation_id, *element_id);
            }
            (Some(index), None) => {
                element.annotations.remove(index);
                self.annotation_index.remove(annotation_id);
            }
            (None, None) => return,
        }
        let updated = element.clone();
        self.events.emit(CanvasEvent::ElementUpdated(updated));
    }

    /// Look up an annotation by id.
    #[must_use]
    pub fn annotation(&self, annotation_id: &AnnotationId) -> Option<&Annotation> {
        let element_id = self.annotation_index.get(annotation_id)?;
        self.elements
            .get(element_id)?
            .annotations
            .iter()
            .find(|a| a.id == *annotation_id)
    }

    /// The element that owns an annotation.
    #[must_use]
    pub fn annotation_owner(&self, annotation_id: &AnnotationId) -> Option<ElementId> {
        self.annotation_index.get(annotation_id).copied()
    }

    fn annotation_mut(&mut self, annotation_id: &AnnotationId) -> Result<&mut Annotation, StoreError> {
        let element_id = *self
            .annotation_index
            .get(annotation_id)
            .ok_or(StoreError::AnnotationNotFound(*annotation_id))?;
        self.elements
            .get_mut(&element_id)
            .and_then(|e| e.annotations.iter_mut().find(|a| a.id == *annotation_id))
            .ok_or(StoreError::AnnotationNotFound(*annotation_id))
    }
}

fn clamp_anchor(value: f64, extent: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, extent.max(0.0)) } else { 0.0 }
}
