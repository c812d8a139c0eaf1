use crate::config::{CameraProfile, DetectionSettings};
use crate::detection::history::{FrameHistoryEntry, FrameHistoryStore};
use crate::detection::lighting::SettingsBundle;
use crate::detection::types::{
    ConfidenceBreakdown, DetectionSample, LightingCondition, ShapeCandidate,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

pub const SHAPE_CAP: f64 = 40.0;
pub const MOTION_CAP: f64 = 30.0;
pub const TEMPORAL_CAP: f64 = 20.0;
pub const CAMERA_CAP: f64 = 10.0;

/// Primary confidence a prior cycle needs to count towards a persistence run
pub const PERSISTENCE_FLOOR: f64 = 40.0;

/// Run length at which temporal confidence saturates
pub const TEMPORAL_FULL_RUN: u32 = 5;

const IDEAL_CIRCULARITY: f64 = 0.8;
const IDEAL_ASPECT_RATIO: f64 = 1.2;
const IDEAL_AREA_RATIO: f64 = 0.2;
const SMALL_AREA_PENALTY: f64 = 0.5;
const MAX_PRIMARY: f64 = SHAPE_CAP + MOTION_CAP;

const ENCLOSURE_CONTRAST_FULL: f64 = 30.0;
const OUTDOOR_MIN_BRIGHTNESS: f64 = 15.0;
const OUTDOOR_FULL_BRIGHTNESS: f64 = 50.0;
const OUTDOOR_NIGHT_TIGHTENING: f64 = 0.1;

/// Turns one sample plus that camera's recent history into a weighted
/// confidence breakdown, then records the sample in the history.
pub struct ConfidenceScorer {
    history: Arc<FrameHistoryStore>,
}

impl ConfidenceScorer {
    pub fn new(history: Arc<FrameHistoryStore>) -> Self {
        Self { history }
    }

    pub fn history(&self) -> Arc<FrameHistoryStore> {
        Arc::clone(&self.history)
    }

    pub fn score(&self, sample: &DetectionSample, bundle: &SettingsBundle) -> ConfidenceBreakdown {
        self.score_at(sample, bundle, Utc::now())
    }

    /// Score against the history as it stood before this sample, then
    /// append `{now, primary, total}`.
    pub fn score_at(
        &self,
        sample: &DetectionSample,
        bundle: &SettingsBundle,
        now: DateTime<Utc>,
    ) -> ConfidenceBreakdown {
        let history = self.history.snapshot(&sample.camera_id);

        let shape = shape_confidence(sample.best_candidate(), &bundle.detection);
        let motion = motion_confidence(sample, &bundle.detection);
        let (temporal, consecutive_frames) = temporal_confidence(&history);

        // Camera heuristics only refine an existing detection
        let camera_specific = if shape + motion > 0.0 {
            camera_confidence(sample, bundle)
        } else {
            0.0
        };

        let total = (shape + motion + temporal + camera_specific).clamp(0.0, 100.0);

        let breakdown = ConfidenceBreakdown {
            shape,
            motion,
            temporal,
            camera_specific,
            total,
            consecutive_frames,
        };

        self.history.append(
            &sample.camera_id,
            FrameHistoryEntry {
                timestamp: now,
                primary_confidence: breakdown.primary(),
                total_confidence: total,
            },
        );

        debug!("Camera '{}' scored: {}", sample.camera_id, breakdown);
        breakdown
    }
}

/// 1.0 at the ideal, falling linearly to 0.0 one ideal-width away
fn closeness(value: f64, ideal: f64) -> f64 {
    1.0 - ((value - ideal).abs() / ideal).min(1.0)
}

/// Quadratic ramp from `min` (0.0) to `ideal` (1.0). Zero below `min`.
fn ramp(value: f64, min: f64, ideal: f64) -> f64 {
    if value < min {
        return 0.0;
    }
    if ideal <= min {
        return 1.0;
    }
    let fraction = ((value - min) / (ideal - min)).clamp(0.0, 1.0);
    fraction * fraction
}

/// Shape score from the largest candidate; 0 without candidates
pub fn shape_confidence(candidate: Option<&ShapeCandidate>, settings: &DetectionSettings) -> f64 {
    let Some(candidate) = candidate else {
        return 0.0;
    };

    let circularity = if candidate.circularity >= settings.min_circularity {
        10.0 * closeness(candidate.circularity, IDEAL_CIRCULARITY)
    } else {
        0.0
    };

    let aspect = if (settings.min_aspect_ratio..=settings.max_aspect_ratio)
        .contains(&candidate.aspect_ratio)
    {
        let span = (IDEAL_ASPECT_RATIO - settings.min_aspect_ratio)
            .max(settings.max_aspect_ratio - IDEAL_ASPECT_RATIO);
        if span > 0.0 {
            10.0 * (1.0 - ((candidate.aspect_ratio - IDEAL_ASPECT_RATIO).abs() / span).min(1.0))
        } else {
            10.0
        }
    } else {
        0.0
    };

    let area = if candidate.area_ratio >= settings.min_area_ratio {
        let scale = if candidate.area_ratio <= IDEAL_AREA_RATIO {
            candidate.area_ratio / IDEAL_AREA_RATIO
        } else {
            IDEAL_AREA_RATIO / candidate.area_ratio
        };
        let penalty = if candidate.area_ratio < 2.0 * settings.min_area_ratio {
            SMALL_AREA_PENALTY
        } else {
            1.0
        };
        20.0 * scale * penalty
    } else {
        0.0
    };

    (circularity + aspect + area).min(SHAPE_CAP)
}

/// Motion score from pixel change and luminance change
pub fn motion_confidence(sample: &DetectionSample, settings: &DetectionSettings) -> f64 {
    let pixel = 15.0
        * ramp(
            sample.pixel_change_ratio,
            settings.min_pixel_change,
            settings.ideal_pixel_change,
        );
    let luminance = 15.0
        * ramp(
            sample.luminance_change,
            settings.min_luminance_change,
            settings.ideal_luminance_change,
        );

    (pixel + luminance).min(MOTION_CAP)
}

/// Temporal score and run length over prior history (most recent first)
pub fn temporal_confidence(history: &[FrameHistoryEntry]) -> (f64, u32) {
    let run: Vec<f64> = history
        .iter()
        .rev()
        .map(|entry| entry.primary_confidence)
        .take_while(|primary| *primary >= PERSISTENCE_FLOOR)
        .collect();

    if run.is_empty() {
        return (0.0, 0);
    }

    let count = run.len() as u32;
    let quality =
        run.iter().map(|primary| (primary / MAX_PRIMARY).min(1.0)).sum::<f64>() / run.len() as f64;
    let persistence = (count as f64 / TEMPORAL_FULL_RUN as f64).min(1.0);

    ((TEMPORAL_CAP * persistence * quality).min(TEMPORAL_CAP), count)
}

/// Small per-camera bonus
pub fn camera_confidence(sample: &DetectionSample, bundle: &SettingsBundle) -> f64 {
    let bonus = match bundle.profile {
        CameraProfile::Generic => 0.0,
        CameraProfile::Enclosure => match sample.regions {
            Some(regions) => {
                let contrast = regions.middle - (regions.top + regions.bottom) / 2.0;
                CAMERA_CAP * (contrast / ENCLOSURE_CONTRAST_FULL).clamp(0.0, 1.0)
            }
            None => 0.0,
        },
        CameraProfile::Outdoor => match sample.best_candidate() {
            Some(candidate) => {
                let tightening = if bundle.lighting == LightingCondition::Night {
                    OUTDOOR_NIGHT_TIGHTENING
                } else {
                    0.0
                };
                let brightness = candidate.brightness_delta.abs();
                if candidate.circularity >= bundle.detection.min_circularity + tightening
                    && brightness >= OUTDOOR_MIN_BRIGHTNESS
                {
                    CAMERA_CAP * (brightness / OUTDOOR_FULL_BRIGHTNESS).min(1.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        },
    };

    bonus.clamp(0.0, CAMERA_CAP)
}
