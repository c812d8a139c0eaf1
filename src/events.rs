use crate::alerts::AlertType;
use crate::detection::LightingCondition;
use crate::error::EventBusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the owlwatch system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OwlwatchEvent {
    /// A detection cycle finished for every configured camera
    CycleCompleted {
        cycle: u64,
        cameras: usize,
        timestamp: DateTime<Utc>,
    },
    /// A camera's sample was skipped (transition lighting)
    CycleSkipped {
        camera_id: String,
        lighting: LightingCondition,
        timestamp: DateTime<Utc>,
    },
    /// Presence decided for a camera
    PresenceDetected {
        camera_id: String,
        alert_type: AlertType,
        confidence: f64,
        consecutive_frames: u32,
        timestamp: DateTime<Utc>,
    },
    /// An alert passed every gate and was handed to dispatch
    AlertSent {
        camera_id: String,
        alert_type: AlertType,
        is_test: bool,
        timestamp: DateTime<Utc>,
    },
    /// An alert was refused
    AlertSuppressed {
        camera_id: String,
        alert_type: AlertType,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Transports finished delivering an alert
    NotificationDelivered {
        alert_type: AlertType,
        recipient_count: u32,
        error_count: usize,
    },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: DateTime<Utc>,
        reason: String,
    },
}

impl OwlwatchEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            OwlwatchEvent::CycleCompleted { cycle, cameras, .. } => {
                format!("Cycle {} completed ({} cameras)", cycle, cameras)
            }
            OwlwatchEvent::CycleSkipped {
                camera_id, lighting, ..
            } => {
                format!("Camera '{}' skipped ({} lighting)", camera_id, lighting)
            }
            OwlwatchEvent::PresenceDetected {
                camera_id,
                alert_type,
                confidence,
                consecutive_frames,
                ..
            } => format!(
                "{} on camera '{}' ({:.1}%, {} frames)",
                alert_type, camera_id, confidence, consecutive_frames
            ),
            OwlwatchEvent::AlertSent {
                camera_id,
                alert_type,
                is_test,
                ..
            } => format!(
                "{}alert '{}' sent for camera '{}'",
                if *is_test { "Test " } else { "" },
                alert_type,
                camera_id
            ),
            OwlwatchEvent::AlertSuppressed {
                camera_id,
                alert_type,
                reason,
                ..
            } => format!(
                "Alert '{}' for camera '{}' suppressed: {}",
                alert_type, camera_id, reason
            ),
            OwlwatchEvent::NotificationDelivered {
                alert_type,
                recipient_count,
                error_count,
            } => format!(
                "'{}' delivered to {} recipients ({} errors)",
                alert_type, recipient_count, error_count
            ),
            OwlwatchEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            OwlwatchEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            OwlwatchEvent::CycleCompleted { .. } => "cycle_completed",
            OwlwatchEvent::CycleSkipped { .. } => "cycle_skipped",
            OwlwatchEvent::PresenceDetected { .. } => "presence_detected",
            OwlwatchEvent::AlertSent { .. } => "alert_sent",
            OwlwatchEvent::AlertSuppressed { .. } => "alert_suppressed",
            OwlwatchEvent::NotificationDelivered { .. } => "notification_delivered",
            OwlwatchEvent::SystemError { .. } => "system_error",
            OwlwatchEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }

    pub fn camera_id(&self) -> Option<&str> {
        match self {
            OwlwatchEvent::CycleSkipped { camera_id, .. }
            | OwlwatchEvent::PresenceDetected { camera_id, .. }
            | OwlwatchEvent::AlertSent { camera_id, .. }
            | OwlwatchEvent::AlertSuppressed { camera_id, .. } => Some(camera_id),
            _ => None,
        }
    }
}

/// Event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<OwlwatchEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OwlwatchEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter and a name used in log lines
    pub fn subscribe_filtered<S: Into<String>>(&self, filter: EventFilter, name: S) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an event to all subscribers. Never blocks.
    pub fn publish(&self, event: OwlwatchEvent) -> Result<usize, EventBusError> {
        match &event {
            OwlwatchEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            OwlwatchEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish, treating "no subscribers" as a non-event
    pub fn emit(&self, event: OwlwatchEvent) {
        if self.has_subscribers() {
            if let Err(e) = self.publish(event) {
                debug!("Event dropped: {}", e);
            }
        } else if self.debug_logging {
            debug!("No subscribers for event: {}", event.description());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    /// Events tied to one of these cameras
    Cameras(Vec<String>),
    Custom(fn(&OwlwatchEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &OwlwatchEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Cameras(cameras) => event
                .camera_id()
                .map_or(false, |camera| cameras.iter().any(|c| c == camera)),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<OwlwatchEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<OwlwatchEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<OwlwatchEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!("Receiver '{}' received event: {}", self.name, event.description());
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<OwlwatchEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
