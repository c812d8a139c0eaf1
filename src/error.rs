use thiserror::Error;

#[derive(Error, Debug)]
pub enum OwlwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Threshold error: {0}")]
    Threshold(#[from] ThresholdError),

    #[error("Sample error: {0}")]
    Sample(#[from] SampleError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Notification error: {message}")]
    Notification { message: String },

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl OwlwatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Rejected threshold overrides. Nothing is mutated when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("confidence threshold {value} for camera '{camera}' is outside 0-100")]
    ConfidenceOutOfRange { camera: String, value: f64 },

    #[error("consecutive frames threshold for camera '{camera}' must be at least 1 (got {value})")]
    FramesOutOfRange { camera: String, value: u32 },

    #[error("thresholds cannot be set for lighting condition '{lighting}'")]
    UnsupportedLighting { lighting: String },
}

/// Degenerate detection samples rejected at construction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("sample is missing a camera id")]
    MissingCamera,

    #[error("sample from '{camera}' has invalid {field}: {value}")]
    InvalidMetric {
        camera: String,
        field: &'static str,
        value: f64,
    },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to write alert record: {details}")]
    WriteFailed { details: String },

    #[error("alert record {alert_id} not found")]
    NotFound { alert_id: String },
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("event receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, OwlwatchError>;
