use crate::alerts::state::AlertBook;
use crate::alerts::store::{AlertId, AlertStore};
use crate::alerts::types::AlertType;
use crate::detection::ConfidenceBreakdown;
use crate::error::{OwlwatchError, Result};
use crate::events::{EventBus, OwlwatchEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Owned snapshot of everything a transport needs to deliver one alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub alert_id: Option<AlertId>,
    pub camera_id: String,
    pub alert_type: AlertType,
    pub is_test: bool,
    pub test_prefix: String,
    pub image_url: Option<String>,
    pub confidence: ConfidenceBreakdown,
}

impl Notification {
    pub fn subject(&self) -> String {
        if self.is_test {
            format!("{}{}", self.test_prefix, self.alert_type.name())
        } else {
            self.alert_type.name().to_string()
        }
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "{} detected on camera '{}' (confidence {:.1}%, {} frames)",
            self.alert_type.name(),
            self.camera_id,
            self.confidence.total,
            self.confidence.consecutive_frames
        );
        if let Some(url) = &self.image_url {
            body.push_str(&format!("\nImage: {}", url));
        }
        body
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub recipient_count: u32,
    pub errors: Vec<String>,
}

impl DeliveryResult {
    pub fn merge(&mut self, other: DeliveryResult) {
        self.recipient_count += other.recipient_count;
        self.errors.extend(other.errors);
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A way of getting an alert to people. Failures for one recipient are
/// reported in the result, never raised.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, notification: &Notification) -> DeliveryResult;
}

/// Writes each notification to the log, once per recipient
pub struct LogTransport {
    recipients: Vec<String>,
}

impl LogTransport {
    pub fn new(recipients: Vec<String>) -> Self {
        Self { recipients }
    }

    fn deliver_to(&self, recipient: &str, notification: &Notification) -> Result<()> {
        if recipient.trim().is_empty() {
            return Err(OwlwatchError::Notification {
                message: "empty recipient address".to_string(),
            });
        }
        info!(
            recipient = %recipient,
            camera = %notification.camera_id,
            "{}: {}",
            notification.subject(),
            notification.body()
        );
        Ok(())
    }
}

#[async_trait]
impl NotificationTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> DeliveryResult {
        let mut result = DeliveryResult::default();
        for recipient in &self.recipients {
            match self.deliver_to(recipient, notification) {
                Ok(()) => result.recipient_count += 1,
                Err(e) => {
                    warn!("Delivery to '{}' failed: {}", recipient, e);
                    result.errors.push(format!("{}: {}", recipient, e));
                }
            }
        }
        result
    }
}

/// Runs persistence and delivery off the decision path.
///
/// Each dispatch is a spawned task: create record, deliver through every
/// transport, update record, then credit delivered recipients back to the
/// alert book (tests, and sends from before a reset, are not credited).
/// Nothing here can reverse a send decision.
pub struct Dispatcher {
    transports: Vec<Arc<dyn NotificationTransport>>,
    store: Arc<dyn AlertStore>,
    book: Arc<Mutex<AlertBook>>,
    event_bus: Arc<EventBus>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        transports: Vec<Arc<dyn NotificationTransport>>,
        store: Arc<dyn AlertStore>,
        book: Arc<Mutex<AlertBook>>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            transports,
            store,
            book,
            event_bus,
            tracker: TaskTracker::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Spawn the delivery task for one sent alert. `session` is the
    /// reporting session the send was counted in.
    pub fn dispatch(&self, notification: Notification, session: DateTime<Utc>) {
        let transports = self.transports.clone();
        let store = Arc::clone(&self.store);
        let book = Arc::clone(&self.book);
        let event_bus = Arc::clone(&self.event_bus);

        self.tracker.spawn(async move {
            run_dispatch(notification, session, transports, store, book, event_bus).await;
        });
    }

    /// Wait for queued dispatches, giving up after `grace`
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!("Waiting up to {:?} for {} pending dispatches", grace, pending);
        }

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                debug!("All dispatches completed");
                true
            }
            Err(_) => {
                warn!(
                    "Abandoning {} dispatches after {:?} grace period",
                    self.tracker.len(),
                    grace
                );
                false
            }
        }
    }

    /// Wait for every dispatch spawned so far without closing the tracker
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

async fn run_dispatch(
    mut notification: Notification,
    session: DateTime<Utc>,
    transports: Vec<Arc<dyn NotificationTransport>>,
    store: Arc<dyn AlertStore>,
    book: Arc<Mutex<AlertBook>>,
    event_bus: Arc<EventBus>,
) {
    let alert_type = notification.alert_type;

    match store
        .create_alert_record(
            alert_type,
            &notification.camera_id,
            &notification.confidence,
            notification.is_test,
        )
        .await
    {
        Ok(alert_id) => notification.alert_id = Some(alert_id),
        Err(e) => error!("Failed to record '{}' alert: {}", alert_type, e),
    }

    let mut delivery = DeliveryResult::default();
    for transport in &transports {
        let result = transport.deliver(&notification).await;
        debug!(
            "Transport '{}' delivered '{}' to {} recipients",
            transport.name(),
            alert_type,
            result.recipient_count
        );
        delivery.merge(result);
    }

    if let Some(alert_id) = notification.alert_id {
        if let Err(e) = store.update_alert_record(alert_id, &delivery).await {
            error!("Failed to update alert record {}: {}", alert_id, e);
        }
    }

    if !notification.is_test {
        let credited = book
            .lock()
            .record_delivery(alert_type, delivery.recipient_count as u64, session);
        if !credited {
            debug!(
                "'{}' delivery belongs to a reset session, not credited",
                alert_type
            );
        }
    }

    if !delivery.is_clean() {
        warn!(
            "'{}' alert delivered with {} errors",
            alert_type,
            delivery.errors.len()
        );
    }

    event_bus.emit(OwlwatchEvent::NotificationDelivered {
        alert_type,
        recipient_count: delivery.recipient_count,
        error_count: delivery.errors.len(),
    });
}
