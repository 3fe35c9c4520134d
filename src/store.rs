//! Element store: the in-memory element collection for one canvas.
//!
//! DESIGN
//! ======
//! Elements are keyed by id in a `HashMap`; render order comes from
//! `position.z`, never from insertion order. Every geometry change is clamped
//! against the canvas bounds, and new or promoted elements take
//! `next_z` over the current set, so z values stay unique.
//!
//! Documents loaded from the remote store are normalized to the same rules.
//! A duplicate id keeps its first copy in draw order. Positions and sizes
//! are clamped. A z already held by an earlier element moves to the top.
//! A document whose z values have reached `i64::MAX` is renumbered densely
//! from 1, keeping draw order.
//!
//! Removing an element removes its annotations with it, including their
//! entries in the annotation index. All operations are synchronous; pushing
//! changes to the remote store is the sync layer's job.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::HashMap;

use uuid::Uuid;

use crate::annotation::AnnotationId;
use crate::doc::{CanvasDocument, Element, ElementDraft, ElementId, ElementPatch, now_ms};
use crate::event::{CanvasEvent, EventBus};
use crate::spatial::{Bounds, Position, clamp_position, next_z};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("element not found: {0}")]
    ElementNotFound(ElementId),
    #[error("annotation not found: {0}")]
    AnnotationNotFound(AnnotationId),
    #[error("z-order {z} already taken by element {holder}")]
    ZOrderTaken { z: i64, holder: ElementId },
}

impl crate::error::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ElementNotFound(_) => "E_ELEMENT_NOT_FOUND",
            Self::AnnotationNotFound(_) => "E_ANNOTATION_NOT_FOUND",
            Self::ZOrderTaken { .. } => "E_Z_ORDER_TAKEN",
        }
    }
}

/// In-memory store of the elements on one canvas.
#[derive(Debug)]
pub struct ElementStore {
    bounds: Bounds,
    background: String,
    version: u64,
    pub(crate) elements: HashMap<ElementId, Element>,
    /// Annotation id -> owning element id.
    pub(crate) annotation_index: HashMap<AnnotationId, ElementId>,
    pub(crate) events: EventBus,
}

impl ElementStore {
    /// Build a store hydrated from a canvas document.
    #[must_use]
    pub fn new(document: CanvasDocument, events: EventBus) -> Self {
        let mut store = Self {
            bounds: document.bounds(),
            background: String::new(),
            version: 0,
            elements: HashMap::new(),
            annotation_index: HashMap::new(),
            events,
        };
        store.load_document(document);
        store
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Insert a new element from a draft. Keeps the draft's id unless it is
    /// taken, assigns the next z, and clamps the requested position onto the
    /// canvas.
    pub fn add(&mut self, draft: ElementDraft) -> Element {
        let id = if self.elements.contains_key(&draft.id) { Uuid::new_v4() } else { draft.id };
        let size = draft.size.normalized();
        let at = clamp_position(self.bounds, size, draft.position);
        let element = Element {
            id,
            position: Position::new(at.x, at.y, self.next_z()),
            size,
            content: draft.content,
            annotations: Vec::new(),
            created_by: draft.created_by,
            created_at: now_ms(),
        };
        self.elements.insert(element.id, element.clone());
        self.events.emit(CanvasEvent::ElementAdded(element.clone()));
        element
    }

    /// Merge a sparse patch into an element. Position and size are re-clamped
    /// whenever either one is present.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if `id` is absent, or `ZOrderTaken` if the
    /// patch asks for a z held by another element.
    pub fn update(&mut self, id: &ElementId, patch: &ElementPatch) -> Result<Element, StoreError> {
        if !self.elements.contains_key(id) {
            return Err(StoreError::ElementNotFound(*id));
        }
        if let Some(z) = patch.z {
            if let Some(holder) = self.z_holder(z, id) {
                return Err(StoreError::ZOrderTaken { z, holder });
            }
        }
        let bounds = self.bounds;
        let element = self
            .elements
            .get_mut(id)
            .ok_or(StoreError::ElementNotFound(*id))?;

        if let Some(size) = patch.size {
            element.size = size.normalized();
        }
        if let Some(content) = &patch.content {
            element.content = content.clone();
        }
        if let Some(z) = patch.z {
            element.position.z = z;
        }
        if patch.touches_geometry() {
            let requested = patch.position.unwrap_or(element.position.point());
            let at = clamp_position(bounds, element.size, requested);
            element.position.x = at.x;
            element.position.y = at.y;
        }

        let updated = element.clone();
        self.events.emit(CanvasEvent::ElementUpdated(updated.clone()));
        Ok(updated)
    }

    /// Remove an element and, with it, every annotation it owns.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if `id` is absent. Idempotent callers should
    /// match on it and carry on.
    pub fn remove(&mut self, id: &ElementId) -> Result<Element, StoreError> {
        let removed = self
            .elements
            .remove(id)
            .ok_or(StoreError::ElementNotFound(*id))?;
        for annotation in &removed.annotations {
            self.annotation_index.remove(&annotation.id);
        }
        self.events.emit(CanvasEvent::ElementRemoved { id: *id });
        Ok(removed)
    }

    /// Give an element the next z so it renders above every sibling.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if `id` is absent.
    pub fn reorder_to_front(&mut self, id: &ElementId) -> Result<Element, StoreError> {
        let z = self.next_z();
        self.update(id, &ElementPatch { z: Some(z), ..ElementPatch::default() })
    }

    /// Put an element back to an earlier snapshot. `None` means the element did
    /// not exist at snapshot time and is removed if present now.
    ///
    /// When the element still exists, only its geometry and content are
    /// restored; the annotation thread is left as it is now, since annotation
    /// changes are tracked separately.
    pub fn restore_element(&mut self, id: &ElementId, snapshot: Option<Element>) {
        let Some(mut element) = snapshot else {
            if self.elements.contains_key(id) {
                if let Err(e) = self.remove(id) {
                    tracing::warn!(error = %e, "restore could not remove element");
                }
            }
            return;
        };

        if let Some(current) = self.elements.get(id) {
            element.annotations.clone_from(&current.annotations);
            if let Some(holder) = self.z_holder(element.position.z, id) {
                tracing::debug!(%id, %holder, "restored z is taken; keeping current z");
                element.position.z = current.position.z;
            }
            self.elements.insert(*id, element.clone());
            self.events.emit(CanvasEvent::ElementUpdated(element));
            return;
        }

        if self.z_holder(element.position.z, id).is_some() {
            element.position.z = self.next_z();
        }
        for annotation in &element.annotations {
            self.annotation_index.insert(annotation.id, element.id);
        }
        self.elements.insert(element.id, element.clone());
        self.events.emit(CanvasEvent::ElementAdded(element));
    }

    /// Change the canvas background.
    pub fn set_background(&mut self, background: impl Into<String>) {
        self.background = background.into();
    }

    /// Replace the whole canvas with a document, normalizing it onto the
    /// store's rules. Emits no per-element events.
    pub fn load_document(&mut self, document: CanvasDocument) {
        self.bounds = document.bounds();
        self.background = document.background;
        self.version = document.version;
        self.elements.clear();
        self.annotation_index.clear();

        let mut incoming = document.elements;
        incoming.sort_by(|a, b| a.position.z.cmp(&b.position.z).then_with(|| a.id.cmp(&b.id)));
        if incoming.last().is_some_and(|e| e.position.z == i64::MAX) {
            tracing::warn!(count = incoming.len(), "z values exhausted; renumbering canvas");
            for (z, element) in (1..).zip(incoming.iter_mut()) {
                element.position.z = z;
            }
        }

        let mut collided = Vec::new();
        for mut element in incoming {
            if self.elements.contains_key(&element.id) {
                tracing::warn!(id = %element.id, "duplicate element id in document; keeping first copy");
                continue;
            }
            element.size = element.size.normalized();
            let at = clamp_position(self.bounds, element.size, element.position.point());
            element.position.x = at.x;
            element.position.y = at.y;
            if self.z_holder(element.position.z, &element.id).is_some() {
                collided.push(element);
                continue;
            }
            self.insert_loaded(element);
        }
        for mut element in collided {
            tracing::debug!(id = %element.id, z = element.position.z, "z taken in document; moving to front");
            element.position.z = self.next_z();
            self.insert_loaded(element);
        }
    }

    fn insert_loaded(&mut self, element: Element) {
        for annotation in &element.annotations {
            self.annotation_index.insert(annotation.id, element.id);
        }
        self.elements.insert(element.id, element);
    }

    /// Load an authoritative document, keeping the local geometry of
    /// `preserve` (an element mid-drag) when it is still present remotely.
    pub fn reconcile(&mut self, document: CanvasDocument, preserve: Option<ElementId>) {
        let kept = preserve.and_then(|id| self.elements.get(&id).map(|e| (id, e.position)));
        self.load_document(document);
        if let Some((id, position)) = kept {
            if let Some(z_holder) = self.z_holder(position.z, &id) {
                tracing::debug!(%id, %z_holder, "dragged element keeps remote z after reconcile");
                if let Some(element) = self.elements.get_mut(&id) {
                    element.position.x = position.x;
                    element.position.y = position.y;
                }
            } else if let Some(element) = self.elements.get_mut(&id) {
                element.position = position;
            }
        }
    }

    /// Record that the remote store accepted the document at `version`.
    /// Never moves the version backwards.
    pub fn commit_version(&mut self, version: u64) {
        self.version = self.version.max(version);
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ElementId) -> bool {
        self.elements.contains_key(id)
    }

    /// All elements sorted by `(z, id)` for draw order.
    #[must_use]
    pub fn sorted_elements(&self) -> Vec<&Element> {
        let mut out: Vec<&Element> = self.elements.values().collect();
        out.sort_by(|a, b| a.position.z.cmp(&b.position.z).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Snapshot of the canvas in draw order, at the current version.
    #[must_use]
    pub fn to_document(&self) -> CanvasDocument {
        CanvasDocument {
            version: self.version,
            width: self.bounds.width,
            height: self.bounds.height,
            background: self.background.clone(),
            elements: self.sorted_elements().into_iter().cloned().collect(),
        }
    }

    /// The z a newly added or promoted element would receive.
    #[must_use]
    pub fn next_z(&self) -> i64 {
        next_z(self.elements.values().map(|e| e.position.z))
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[must_use]
    pub fn background(&self) -> &str {
        &self.background
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn z_holder(&self, z: i64, except: &ElementId) -> Option<ElementId> {
        self.elements
            .values()
            .find(|e| e.position.z == z && e.id != *except)
            .map(|e| e.id)
    }
}
