use crate::alerts::dispatch::{Dispatcher, Notification, NotificationTransport};
use crate::alerts::state::{AlertBook, AlertStatistics, AlertStatus, SuppressionReason};
use crate::alerts::store::AlertStore;
use crate::alerts::types::AlertType;
use crate::config::{AlertConfig, NotificationConfig};
use crate::detection::{is_present, ConfidenceBreakdown, LightingCondition, ParameterSelector, Selection};
use crate::events::{EventBus, OwlwatchEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One request to alert, built from a scored sample or an operator action
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRequest {
    pub camera_id: String,
    pub alert_type: AlertType,
    pub presence: bool,
    pub breakdown: ConfidenceBreakdown,
    pub lighting: LightingCondition,
    pub is_test: bool,
    pub image_url: Option<String>,
}

impl AlertRequest {
    pub fn presence<S: Into<String>>(
        camera_id: S,
        alert_type: AlertType,
        breakdown: ConfidenceBreakdown,
        lighting: LightingCondition,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            alert_type,
            presence: true,
            breakdown,
            lighting,
            is_test: false,
            image_url: None,
        }
    }

    pub fn test<S: Into<String>>(camera_id: S, alert_type: AlertType) -> Self {
        Self {
            camera_id: camera_id.into(),
            alert_type,
            presence: false,
            breakdown: ConfidenceBreakdown::default(),
            lighting: LightingCondition::Day,
            is_test: true,
            image_url: None,
        }
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }
}

/// Decides which presence decisions become alerts.
///
/// The hierarchy and cooldown gates and the state update for one request
/// happen under a single acquisition of the alert book lock. Delivery
/// happens afterwards on a spawned task and never feeds back into the
/// decision.
pub struct AlertCoordinator {
    book: Arc<Mutex<AlertBook>>,
    selector: Arc<ParameterSelector>,
    dispatcher: Dispatcher,
    event_bus: Arc<EventBus>,
    test_prefix: String,
}

impl AlertCoordinator {
    pub fn new(
        alerts: &AlertConfig,
        notification: &NotificationConfig,
        selector: Arc<ParameterSelector>,
        transports: Vec<Arc<dyn NotificationTransport>>,
        store: Arc<dyn AlertStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new_at(alerts, notification, selector, transports, store, event_bus, Utc::now())
    }

    pub fn new_at(
        alerts: &AlertConfig,
        notification: &NotificationConfig,
        selector: Arc<ParameterSelector>,
        transports: Vec<Arc<dyn NotificationTransport>>,
        store: Arc<dyn AlertStore>,
        event_bus: Arc<EventBus>,
        now: DateTime<Utc>,
    ) -> Self {
        let book = Arc::new(Mutex::new(AlertBook::new(alerts, now)));
        let dispatcher = Dispatcher::new(
            transports,
            store,
            Arc::clone(&book),
            Arc::clone(&event_bus),
        );

        info!(
            "Alert coordinator ready (delay {} min, suppression window {} min)",
            alerts.alert_delay_minutes, alerts.suppression_window_minutes
        );

        Self {
            book,
            selector,
            dispatcher,
            event_bus,
            test_prefix: notification.test_prefix.clone(),
        }
    }

    pub fn process(&self, request: AlertRequest) -> bool {
        self.process_at(request, Utc::now())
    }

    /// Run one request through the gates. Returns true when the alert was
    /// sent; delivery continues in the background.
    pub fn process_at(&self, request: AlertRequest, now: DateTime<Utc>) -> bool {
        if !request.presence && !request.is_test {
            return false;
        }

        // Reads only the selector, so it runs before the book is locked
        let confident = request.is_test || self.passes_confidence(&request);

        let (verdict, session) = {
            let mut book = self.book.lock();
            let verdict = if request.is_test {
                book.record_send(request.alert_type, now, true);
                Ok(())
            } else if !confident {
                book.record_rejected(request.alert_type);
                Err(SuppressionReason::Confidence)
            } else {
                book.try_send(request.alert_type, now)
            };
            (verdict, book.session_start())
        };

        match verdict {
            Ok(()) => {
                info!(
                    "{}alert '{}' sent for camera '{}'",
                    if request.is_test { "Test " } else { "" },
                    request.alert_type,
                    request.camera_id
                );
                self.event_bus.emit(OwlwatchEvent::AlertSent {
                    camera_id: request.camera_id.clone(),
                    alert_type: request.alert_type,
                    is_test: request.is_test,
                    timestamp: now,
                });
                self.dispatcher.dispatch(
                    Notification {
                        alert_id: None,
                        camera_id: request.camera_id,
                        alert_type: request.alert_type,
                        is_test: request.is_test,
                        test_prefix: self.test_prefix.clone(),
                        image_url: request.image_url,
                        confidence: request.breakdown,
                    },
                    session,
                );
                true
            }
            Err(reason) => {
                debug!(
                    "Alert '{}' for camera '{}' suppressed: {}",
                    request.alert_type, request.camera_id, reason
                );
                self.event_bus.emit(OwlwatchEvent::AlertSuppressed {
                    camera_id: request.camera_id,
                    alert_type: request.alert_type,
                    reason: reason.to_string(),
                    timestamp: now,
                });
                false
            }
        }
    }

    fn passes_confidence(&self, request: &AlertRequest) -> bool {
        match self.selector.select(&request.camera_id, request.lighting) {
            Selection::Use(bundle) => is_present(&request.breakdown, &bundle.thresholds),
            Selection::Skip => false,
        }
    }

    /// Operator test alert using the camera's base type
    pub fn send_test_alert(&self, camera_id: &str) -> bool {
        let alert_type = self.selector.base_alert_type(camera_id);
        self.process(AlertRequest::test(camera_id, alert_type))
    }

    pub fn set_alert_delay(&self, minutes: u32) {
        let previous = self.book.lock().set_alert_delay(minutes);
        info!("Alert delay changed from {} to {} minutes", previous, minutes);
    }

    pub fn alert_delay_minutes(&self) -> u32 {
        self.book.lock().alert_delay_minutes()
    }

    pub fn status_at(&self, alert_type: AlertType, now: DateTime<Utc>) -> AlertStatus {
        self.book.lock().status(alert_type, now)
    }

    /// Finalize idle alert sessions
    pub fn sweep(&self) -> Vec<AlertType> {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> Vec<AlertType> {
        let finalized = self.book.lock().sweep(now);
        for alert_type in &finalized {
            debug!("Finalized idle '{}' session", alert_type);
        }
        finalized
    }

    pub fn get_alert_statistics(&self) -> AlertStatistics {
        self.get_alert_statistics_at(Utc::now())
    }

    pub fn get_alert_statistics_at(&self, now: DateTime<Utc>) -> AlertStatistics {
        self.book.lock().statistics(now)
    }

    pub fn reset(&self) {
        self.reset_at(Utc::now());
    }

    pub fn reset_at(&self, now: DateTime<Utc>) {
        self.book.lock().reset(now);
        info!("Alert statistics reset, new session started at {}", now);
    }

    /// Snapshot of the whole alert book
    pub fn book(&self) -> AlertBook {
        self.book.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn is_book_locked(&self) -> bool {
        self.book.is_locked()
    }

    pub fn pending_dispatches(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Wait for every dispatch spawned so far
    pub async fn flush(&self) {
        self.dispatcher.flush().await;
    }

    /// Stop accepting work and wait up to `grace` for in-flight deliveries
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.dispatcher.shutdown(grace).await
    }
}
