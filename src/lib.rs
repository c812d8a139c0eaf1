pub mod alerts;
pub mod app;
pub mod config;
pub mod detection;
pub mod error;
pub mod events;

pub use alerts::{
    AlertCoordinator, AlertRequest, AlertStatistics, AlertStore, AlertType, DeliveryResult,
    JsonLinesAlertStore, LogTransport, MemoryAlertStore, Notification, NotificationTransport,
};
pub use app::{
    Component, ComponentState, CycleReport, JsonLinesSampleSource, OwlwatchOrchestrator, SampleSource,
    ShutdownReason, StaticSampleSource,
};
pub use config::OwlwatchConfig;
pub use detection::{
    ConfidenceBreakdown, DetectionEngine, DetectionSample, FrameHistoryStore, LightingCondition,
    ParameterSelector,
};
pub use error::{OwlwatchError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, OwlwatchEvent};
