use tokio::sync::broadcast::error::TryRecvError;
use uuid::Uuid;

use super::*;

// =============================================================
// EventBus
// =============================================================

#[test]
fn emit_without_subscribers_is_silent() {
    let bus = EventBus::new(4);
    bus.emit(CanvasEvent::ElementRemoved { id: Uuid::new_v4() });
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn subscribers_receive_in_emit_order() {
    let bus = EventBus::new(8);
    let mut rx = bus.subscribe();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    bus.emit(CanvasEvent::ElementRemoved { id: first });
    bus.emit(CanvasEvent::AnnotationResolved { annotation_id: second });

    assert!(matches!(rx.try_recv().unwrap(), CanvasEvent::ElementRemoved { id } if id == first));
    assert!(matches!(rx.try_recv().unwrap(), CanvasEvent::AnnotationResolved { annotation_id } if annotation_id == second));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn late_subscriber_misses_earlier_events() {
    let bus = EventBus::new(8);
    bus.emit(CanvasEvent::ElementRemoved { id: Uuid::new_v4() });
    let mut rx = bus.subscribe();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn clones_share_one_channel() {
    let bus = EventBus::new(8);
    let other = bus.clone();
    let mut rx = bus.subscribe();
    other.emit(CanvasEvent::Reconciled { workspace_id: Uuid::new_v4(), version: 3 });
    assert!(matches!(rx.try_recv().unwrap(), CanvasEvent::Reconciled { version: 3, .. }));
    assert_eq!(other.subscriber_count(), 1);
}

#[test]
fn slow_subscriber_sees_lag() {
    let bus = EventBus::new(2);
    let mut rx = bus.subscribe();
    for _ in 0..5 {
        bus.emit(CanvasEvent::ElementRemoved { id: Uuid::new_v4() });
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(3))));
}

#[test]
fn zero_capacity_is_raised_to_one() {
    let bus = EventBus::new(0);
    let mut rx = bus.subscribe();
    bus.emit(CanvasEvent::ElementRemoved { id: Uuid::new_v4() });
    assert!(rx.try_recv().is_ok());
}
