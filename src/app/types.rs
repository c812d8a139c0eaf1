use serde::Serialize;
use std::fmt;

/// Long-running parts of the process whose lifecycle is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// The detection cycle loop
    Detection,
    /// Background alert persistence and delivery
    Dispatch,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Detection => f.write_str("detection"),
            Component::Dispatch => f.write_str("dispatch"),
        }
    }
}

/// Component lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    /// The sample source has no more cycles
    SourceExhausted,
    UserRequest,
}

/// What happened to one detection cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub cameras: usize,
    pub skipped: usize,
    pub present: usize,
    pub alerts_sent: usize,
    pub errors: usize,
}
