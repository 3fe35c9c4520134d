//! Change events for the UI layer and the bus that fans them out.
//!
//! DESIGN
//! ======
//! Every local mutation (optimistic or reconciled) emits a `CanvasEvent` on a
//! `tokio::sync::broadcast` channel. Emission never blocks and never fails the
//! mutation: with no subscribers the event is dropped, and a subscriber that
//! falls more than `capacity` events behind sees `Lagged` on its receiver.

#[cfg(test)]
#[path = "event_test.rs"]
mod event_test;

use tokio::sync::broadcast;
use tracing::trace;

use crate::annotation::{Annotation, AnnotationId, AnnotationReply};
use crate::doc::{Element, ElementId};
use crate::sync::PendingMutation;
use crate::workspace::WorkspaceId;

/// A change to the local model, in the order it was applied.
#[derive(Debug, Clone)]
pub enum CanvasEvent {
    ElementAdded(Element),
    ElementUpdated(Element),
    ElementRemoved { id: ElementId },
    AnnotationAdded { element_id: ElementId, annotation: Annotation },
    AnnotationReplied { annotation_id: AnnotationId, reply: AnnotationReply },
    AnnotationResolved { annotation_id: AnnotationId },
    AnnotationReopened { annotation_id: AnnotationId },
    /// Local state was replaced with the authoritative copy after a write.
    Reconciled { workspace_id: WorkspaceId, version: u64 },
    /// A write-through failed and its mutation was rolled back.
    SyncFailed { mutation: Box<PendingMutation>, error: String, code: &'static str },
}

/// Cloneable handle for emitting and subscribing to [`CanvasEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CanvasEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: CanvasEvent) {
        if self.tx.send(event).is_err() {
            trace!("canvas event dropped: no subscribers");
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::consts::DEFAULT_EVENT_CAPACITY)
    }
}
