mod engine;
mod history;
mod lighting;
mod presence;
mod scorer;
mod types;
#[cfg(test)]
mod tests;

pub use engine::{DetectionEngine, Evaluation, ScoredSample};
pub use history::{
    FrameHistoryEntry, FrameHistoryStatsSnapshot, FrameHistoryStore, HISTORY_CAPACITY,
};
pub use lighting::{ParameterSelector, Selection, SettingsBundle};
pub use presence::is_present;
pub use scorer::{
    camera_confidence, motion_confidence, shape_confidence, temporal_confidence,
    ConfidenceScorer, CAMERA_CAP, MOTION_CAP, PERSISTENCE_FLOOR, SHAPE_CAP, TEMPORAL_CAP,
};
pub use types::{
    ConfidenceBreakdown, DetectionSample, LightingCondition, RegionLuminance, ShapeCandidate,
};
