//! Drag gesture state machine.
//!
//! Pointer events drive `DragController` from `Idle` into `Dragging` and back.
//! While dragging, every move is clamped and written straight into the
//! `ElementStore` (one map lookup, no network). Pointer-up yields a
//! `DragCommit` for the sync layer to persist; cancel or pointer-leave puts
//! the element back to where, and how high, it was at pointer-down.
//!
//! One drag per canvas: a pointer-down while already dragging is ignored.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use tracing::{debug, warn};

use crate::doc::{Element, ElementId, ElementPatch};
use crate::spatial::{Point, Position};
use crate::store::{ElementStore, StoreError};

/// Gesture currently being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    /// No gesture in progress; waiting for the next pointer-down.
    #[default]
    Idle,
    /// An element follows the pointer.
    Dragging {
        /// Element being dragged.
        element_id: ElementId,
        /// Pointer position minus element position at pointer-down.
        offset: Point,
        /// Position and z at pointer-down; restored on cancel.
        origin: Position,
    },
}

/// Result of a completed (pointer-up) drag, handed to the sync layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragCommit {
    pub element_id: ElementId,
    /// Position and z before the drag started.
    pub origin: Position,
    /// Final clamped position, including the promoted z.
    pub position: Position,
}

/// Per-canvas drag controller.
#[derive(Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> DragState {
        self.state
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Id of the element being dragged, if any.
    #[must_use]
    pub fn dragging_element(&self) -> Option<ElementId> {
        match self.state {
            DragState::Dragging { element_id, .. } => Some(element_id),
            DragState::Idle => None,
        }
    }

    /// Pointer-down on an element. Captures the grab offset and rollback
    /// snapshot, then promotes the element to the front.
    ///
    /// Returns `Ok(None)` when another drag is already active.
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if the element is absent; the controller
    /// stays `Idle`.
    pub fn begin(
        &mut self,
        store: &mut ElementStore,
        element_id: &ElementId,
        pointer: Point,
    ) -> Result<Option<Element>, StoreError> {
        if let DragState::Dragging { element_id: active, .. } = self.state {
            debug!(%active, ignored = %element_id, "pointer-down ignored: drag already active");
            return Ok(None);
        }
        let origin = store
            .get(element_id)
            .ok_or(StoreError::ElementNotFound(*element_id))?
            .position;
        let front = store.reorder_to_front(element_id)?;

        self.state = DragState::Dragging { element_id: *element_id, offset: pointer.sub(origin.point()), origin };
        Ok(Some(front))
    }

    /// Pointer-move. Applies the clamped candidate position optimistically.
    ///
    /// Returns the updated element, or `None` when idle. If the element was
    /// removed underneath the drag, the gesture is abandoned.
    pub fn update(&mut self, store: &mut ElementStore, pointer: Point) -> Option<Element> {
        let DragState::Dragging { element_id, offset, .. } = self.state else {
            return None;
        };
        match store.update(&element_id, &ElementPatch::position(pointer.sub(offset))) {
            Ok(element) => Some(element),
            Err(e) => {
                debug!(error = %e, %element_id, "drag target vanished; returning to idle");
                self.state = DragState::Idle;
                None
            }
        }
    }

    /// Pointer-up. Returns the commit for write-through and goes `Idle`.
    pub fn end(&mut self, store: &ElementStore) -> Option<DragCommit> {
        let DragState::Dragging { element_id, origin, .. } = std::mem::take(&mut self.state) else {
            return None;
        };
        let Some(element) = store.get(&element_id) else {
            debug!(%element_id, "drag target vanished before pointer-up");
            return None;
        };
        Some(DragCommit { element_id, origin, position: element.position })
    }

    /// Escape key or explicit cancel. Restores the pre-drag position and z.
    pub fn cancel(&mut self, store: &mut ElementStore) -> Option<Element> {
        let DragState::Dragging { element_id, origin, .. } = std::mem::take(&mut self.state) else {
            return None;
        };
        let restore = ElementPatch { position: Some(origin.point()), z: Some(origin.z), ..ElementPatch::default() };
        let restored = match store.update(&element_id, &restore) {
            // Origin z went to another element mid-drag: put the element back
            // in place and leave it on top.
            Err(StoreError::ZOrderTaken { z, holder }) => {
                debug!(%element_id, z, %holder, "origin z taken; restoring position only");
                store.update(&element_id, &ElementPatch::position(origin.point()))
            }
            other => other,
        };
        match restored {
            Ok(element) => Some(element),
            Err(e) => {
                warn!(error = %e, %element_id, "drag cancel could not restore snapshot");
                None
            }
        }
    }

    /// Pointer left the interactive surface without a pointer-up.
    pub fn pointer_leave(&mut self, store: &mut ElementStore) -> Option<Element> {
        self.cancel(store)
    }
}
