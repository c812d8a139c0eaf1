use super::*;
use crate::config::{
    AlertConfig, CameraProfile, CameraSettings, CameraThresholdConfig, DetectionConfig,
    NotificationConfig,
};
use crate::detection::{ConfidenceBreakdown, LightingCondition, ParameterSelector};
use crate::error::PersistenceError;
use crate::events::{EventBus, OwlwatchEvent};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, notification: &Notification) -> DeliveryResult {
        self.sent.lock().push(notification.clone());
        DeliveryResult {
            recipient_count: 2,
            errors: vec![],
        }
    }
}

struct SlowTransport;

#[async_trait]
impl NotificationTransport for SlowTransport {
    fn name(&self) -> &str {
        "slow"
    }

    async fn deliver(&self, _notification: &Notification) -> DeliveryResult {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        DeliveryResult::default()
    }
}

/// Holds every delivery until the test adds a permit
struct GatedTransport {
    gate: tokio::sync::Semaphore,
}

impl GatedTransport {
    fn new() -> Self {
        Self {
            gate: tokio::sync::Semaphore::new(0),
        }
    }
}

#[async_trait]
impl NotificationTransport for GatedTransport {
    fn name(&self) -> &str {
        "gated"
    }

    async fn deliver(&self, _notification: &Notification) -> DeliveryResult {
        self.gate.acquire().await.unwrap().forget();
        DeliveryResult {
            recipient_count: 2,
            errors: vec![],
        }
    }
}

struct FailingStore;

#[async_trait]
impl AlertStore for FailingStore {
    async fn create_alert_record(
        &self,
        _alert_type: AlertType,
        _camera_id: &str,
        _confidence: &ConfidenceBreakdown,
        _is_test: bool,
    ) -> Result<AlertId, PersistenceError> {
        Err(PersistenceError::WriteFailed {
            details: "disk full".to_string(),
        })
    }

    async fn update_alert_record(
        &self,
        alert_id: AlertId,
        _delivery: &DeliveryResult,
    ) -> Result<(), PersistenceError> {
        Err(PersistenceError::NotFound {
            alert_id: alert_id.to_string(),
        })
    }
}

fn selector() -> Arc<ParameterSelector> {
    let mut cameras = HashMap::new();
    cameras.insert(
        "box".to_string(),
        CameraSettings {
            profile: CameraProfile::Enclosure,
            base_alert_type: AlertType::OwlInBox,
            day: Some(CameraThresholdConfig::new(60.0, 1)),
            night: Some(CameraThresholdConfig::new(60.0, 1)),
        },
    );
    cameras.insert(
        "yard".to_string(),
        CameraSettings {
            profile: CameraProfile::Outdoor,
            base_alert_type: AlertType::OwlInArea,
            day: Some(CameraThresholdConfig::new(60.0, 2)),
            night: Some(CameraThresholdConfig::new(50.0, 3)),
        },
    );
    Arc::new(ParameterSelector::new(
        cameras,
        CameraThresholdConfig::default(),
        DetectionConfig::default(),
    ))
}

struct Harness {
    coordinator: AlertCoordinator,
    transport: Arc<RecordingTransport>,
    store: Arc<MemoryAlertStore>,
    event_bus: Arc<EventBus>,
}

fn harness() -> Harness {
    let transport = Arc::new(RecordingTransport::default());
    let store = Arc::new(MemoryAlertStore::new());
    let event_bus = Arc::new(EventBus::new(32));
    let coordinator = AlertCoordinator::new(
        &AlertConfig::default(),
        &NotificationConfig::default(),
        selector(),
        vec![transport.clone() as Arc<dyn NotificationTransport>],
        store.clone(),
        Arc::clone(&event_bus),
    );
    Harness {
        coordinator,
        transport,
        store,
        event_bus,
    }
}

fn strong() -> ConfidenceBreakdown {
    ConfidenceBreakdown {
        shape: 35.0,
        motion: 25.0,
        temporal: 15.0,
        camera_specific: 5.0,
        total: 80.0,
        consecutive_frames: 3,
    }
}

fn request(camera: &str, alert_type: AlertType) -> AlertRequest {
    AlertRequest::presence(camera, alert_type, strong(), LightingCondition::Day)
}

#[tokio::test]
async fn test_absent_request_changes_nothing() {
    let h = harness();
    let now = Utc::now();
    let mut req = request("box", AlertType::OwlInBox);
    req.presence = false;

    let before = h.coordinator.book();
    assert!(!h.coordinator.process_at(req, now));
    let after = h.coordinator.book();
    for alert_type in AlertType::ALL {
        assert_eq!(before.state(alert_type), after.state(alert_type));
    }
}

#[tokio::test]
async fn test_confidence_recheck_suppresses() {
    let h = harness();
    let now = Utc::now();

    let mut weak = request("box", AlertType::OwlInBox);
    weak.breakdown.total = 45.0;
    assert!(!h.coordinator.process_at(weak, now));

    // Night thresholds for the yard need three frames
    let mut short_run = request("yard", AlertType::OwlInArea);
    short_run.lighting = LightingCondition::Night;
    short_run.breakdown.consecutive_frames = 2;
    assert!(!h.coordinator.process_at(short_run, now));

    let mut dusk = request("yard", AlertType::OwlInArea);
    dusk.lighting = LightingCondition::Transition;
    assert!(!h.coordinator.process_at(dusk, now));

    let book = h.coordinator.book();
    assert_eq!(book.state(AlertType::OwlInBox).suppressed_count, 1);
    assert_eq!(book.state(AlertType::OwlInArea).suppressed_count, 2);
    assert!(book.state(AlertType::OwlInBox).last_sent_at.is_none());
}

#[tokio::test]
async fn test_higher_priority_blocks_across_cameras() {
    let h = harness();
    let start = Utc::now();

    assert!(h
        .coordinator
        .process_at(request("yard", AlertType::EggsOrBabies), start));
    assert!(!h
        .coordinator
        .process_at(request("box", AlertType::OwlInBox), start + Duration::minutes(2)));

    // Suppression window has passed
    assert!(h
        .coordinator
        .process_at(request("box", AlertType::OwlInBox), start + Duration::minutes(6)));
}

#[tokio::test]
async fn test_cooldown_round_trip() {
    let h = harness();
    let start = Utc::now();

    assert!(h
        .coordinator
        .process_at(request("yard", AlertType::OwlInArea), start));
    assert!(!h
        .coordinator
        .process_at(request("yard", AlertType::OwlInArea), start + Duration::minutes(10)));
    assert!(h
        .coordinator
        .process_at(request("yard", AlertType::OwlInArea), start + Duration::minutes(31)));

    let stats = h.coordinator.get_alert_statistics_at(start + Duration::minutes(31));
    assert_eq!(stats.get(AlertType::OwlInArea).unwrap().count, 2);
}

#[tokio::test]
async fn test_set_alert_delay_shortens_cooldown() {
    let h = harness();
    let start = Utc::now();
    h.coordinator.set_alert_delay(10);
    assert_eq!(h.coordinator.alert_delay_minutes(), 10);

    assert!(h
        .coordinator
        .process_at(request("yard", AlertType::OwlInArea), start));
    assert!(h
        .coordinator
        .process_at(request("yard", AlertType::OwlInArea), start + Duration::minutes(11)));
}

#[tokio::test]
async fn test_test_alert_bypasses_gates_without_counting() {
    let h = harness();
    let start = Utc::now();

    assert!(h
        .coordinator
        .process_at(request("box", AlertType::OwlInBox), start));
    assert!(h.coordinator.process_at(
        AlertRequest::test("box", AlertType::OwlInBox),
        start + Duration::minutes(1)
    ));

    let book = h.coordinator.book();
    assert_eq!(book.state(AlertType::OwlInBox).total_count, 1);
    assert_eq!(
        book.state(AlertType::OwlInBox).last_sent_at,
        Some(start + Duration::minutes(1))
    );

    h.coordinator.flush().await;
    let sent = h.transport.sent.lock();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].subject(), "TEST: Owl In Box");
    assert!(sent.iter().all(|n| n.alert_id.is_some()));
}

#[tokio::test]
async fn test_send_test_alert_uses_camera_base_type() {
    let h = harness();
    assert!(h.coordinator.send_test_alert("box"));
    h.coordinator.flush().await;

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].alert_type, AlertType::OwlInBox);
    assert!(records[0].is_test);
    assert_eq!(records[0].delivery.as_ref().unwrap().recipient_count, 2);
}

#[tokio::test]
async fn test_reset_zeroes_statistics() {
    let h = harness();
    let start = Utc::now();
    h.coordinator
        .process_at(request("yard", AlertType::TwoOwls), start);
    h.coordinator
        .process_at(request("yard", AlertType::TwoOwls), start + Duration::minutes(3));
    h.coordinator.flush().await;

    let later = start + Duration::minutes(4);
    h.coordinator.reset_at(later);
    let stats = h.coordinator.get_alert_statistics_at(later);
    assert_eq!(stats.session_start, later);
    for entry in &stats.alerts {
        assert_eq!(entry.count, 0);
        assert_eq!(entry.duration_seconds, 0);
        assert_eq!(entry.suppressed_count, 0);
        assert_eq!(entry.delivered_recipients, 0);
    }
}

#[tokio::test]
async fn test_delivery_credits_recipients() {
    let h = harness();
    h.coordinator
        .process_at(request("box", AlertType::OwlInBox), Utc::now());
    h.coordinator.flush().await;

    let stats = h.coordinator.get_alert_statistics();
    assert_eq!(stats.get(AlertType::OwlInBox).unwrap().delivered_recipients, 2);
    assert_eq!(h.coordinator.pending_dispatches(), 0);
}

#[tokio::test]
async fn test_failing_store_does_not_reverse_send() {
    let transport = Arc::new(RecordingTransport::default());
    let coordinator = AlertCoordinator::new(
        &AlertConfig::default(),
        &NotificationConfig::default(),
        selector(),
        vec![transport.clone() as Arc<dyn NotificationTransport>],
        Arc::new(FailingStore),
        Arc::new(EventBus::new(8)),
    );
    let now = Utc::now();

    assert!(coordinator.process_at(request("box", AlertType::OwlInBox), now));
    coordinator.flush().await;

    // Delivered without an id, and the send still stands
    let sent = transport.sent.lock();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].alert_id.is_none());
    drop(sent);

    let book = coordinator.book();
    assert_eq!(book.state(AlertType::OwlInBox).total_count, 1);
    assert_eq!(book.state(AlertType::OwlInBox).last_sent_at, Some(now));
    assert!(!coordinator.process_at(request("box", AlertType::OwlInBox), now + Duration::minutes(1)));
}

#[tokio::test]
async fn test_decisions_are_published() {
    let h = harness();
    let mut receiver = h.event_bus.subscribe();
    let start = Utc::now();

    h.coordinator
        .process_at(request("yard", AlertType::OwlInArea), start);
    h.coordinator
        .process_at(request("yard", AlertType::OwlInArea), start + Duration::minutes(1));

    match receiver.recv().await.unwrap() {
        OwlwatchEvent::AlertSent { alert_type, is_test, .. } => {
            assert_eq!(alert_type, AlertType::OwlInArea);
            assert!(!is_test);
        }
        other => panic!("expected AlertSent, got {:?}", other),
    }
    match receiver.recv().await.unwrap() {
        OwlwatchEvent::AlertSuppressed { reason, .. } => assert!(reason.contains("cooldown")),
        other => panic!("expected AlertSuppressed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_shutdown_abandons_slow_dispatch() {
    let coordinator = AlertCoordinator::new(
        &AlertConfig::default(),
        &NotificationConfig::default(),
        selector(),
        vec![Arc::new(SlowTransport) as Arc<dyn NotificationTransport>],
        Arc::new(MemoryAlertStore::new()),
        Arc::new(EventBus::new(8)),
    );

    assert!(coordinator.send_test_alert("yard"));
    let completed = coordinator
        .shutdown(std::time::Duration::from_millis(50))
        .await;
    assert!(!completed);
}

#[tokio::test]
async fn test_session_duration_through_coordinator() {
    let h = harness();
    let start = Utc::now();

    h.coordinator
        .process_at(request("box", AlertType::OwlInBox), start);
    for minute in 1..=3 {
        h.coordinator.process_at(
            request("box", AlertType::OwlInBox),
            start + Duration::minutes(minute),
        );
    }

    let finalized = h.coordinator.sweep_at(start + Duration::minutes(9));
    assert_eq!(finalized, vec![AlertType::OwlInBox]);

    let stats = h.coordinator.get_alert_statistics_at(start + Duration::minutes(9));
    let entry = stats.get(AlertType::OwlInBox).unwrap();
    assert_eq!(entry.duration_seconds, 180);
    assert_eq!(entry.count, 1);
    assert_eq!(entry.suppressed_count, 3);
}

#[tokio::test]
async fn test_test_alert_ignores_active_hierarchy() {
    let h = harness();
    let start = Utc::now();

    assert!(h
        .coordinator
        .process_at(request("box", AlertType::EggsOrBabies), start));
    assert!(h.coordinator.process_at(
        AlertRequest::test("yard", AlertType::OwlInArea),
        start + Duration::minutes(1)
    ));
    assert_eq!(h.coordinator.book().state(AlertType::OwlInArea).total_count, 0);
}

#[tokio::test]
async fn test_delivery_after_reset_not_credited() {
    let transport = Arc::new(GatedTransport::new());
    let coordinator = AlertCoordinator::new(
        &AlertConfig::default(),
        &NotificationConfig::default(),
        selector(),
        vec![transport.clone() as Arc<dyn NotificationTransport>],
        Arc::new(MemoryAlertStore::new()),
        Arc::new(EventBus::new(8)),
    );
    let start = Utc::now();

    assert!(coordinator.process_at(request("box", AlertType::OwlInBox), start));
    coordinator.reset_at(start + Duration::minutes(1));
    transport.gate.add_permits(1);
    coordinator.flush().await;

    let stats = coordinator.get_alert_statistics_at(start + Duration::minutes(1));
    assert_eq!(stats.get(AlertType::OwlInBox).unwrap().delivered_recipients, 0);

    // Sends made in the new session are still credited
    let later = start + Duration::minutes(2);
    assert!(coordinator.process_at(request("box", AlertType::EggsOrBabies), later));
    transport.gate.add_permits(1);
    coordinator.flush().await;

    let stats = coordinator.get_alert_statistics_at(later);
    assert_eq!(stats.get(AlertType::EggsOrBabies).unwrap().delivered_recipients, 2);
}

#[tokio::test]
async fn test_coordinator_logs_outside_book_lock() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    struct HeldLockCounter {
        coordinator: Arc<AlertCoordinator>,
        events: Arc<AtomicUsize>,
        under_lock: Arc<AtomicUsize>,
    }

    impl<S: tracing::Subscriber> Layer<S> for HeldLockCounter {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.events.fetch_add(1, Ordering::SeqCst);
            if self.coordinator.is_book_locked() {
                self.under_lock.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    let h = harness();
    let coordinator = Arc::new(h.coordinator);
    let events = Arc::new(AtomicUsize::new(0));
    let under_lock = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(HeldLockCounter {
        coordinator: Arc::clone(&coordinator),
        events: Arc::clone(&events),
        under_lock: Arc::clone(&under_lock),
    });

    let start = Utc::now();
    tracing::subscriber::with_default(subscriber, || {
        coordinator.set_alert_delay(10);
        assert!(coordinator.process_at(request("box", AlertType::OwlInBox), start));
        assert!(!coordinator.process_at(
            request("box", AlertType::OwlInBox),
            start + Duration::minutes(1)
        ));
        // Unknown camera: the selector warns about the legacy fallback
        coordinator.process_at(
            request("attic", AlertType::OwlInArea),
            start + Duration::minutes(2),
        );
        coordinator.sweep_at(start + Duration::minutes(10));
        coordinator.reset_at(start + Duration::minutes(11));
    });

    assert!(events.load(Ordering::SeqCst) >= 6);
    assert_eq!(under_lock.load(Ordering::SeqCst), 0);
}
