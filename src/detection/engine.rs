use crate::alerts::{resolve, AlertType, AuxFlags};
use crate::detection::history::FrameHistoryStore;
use crate::detection::lighting::{ParameterSelector, Selection, SettingsBundle};
use crate::detection::presence::is_present;
use crate::detection::scorer::ConfidenceScorer;
use crate::detection::types::{ConfidenceBreakdown, DetectionSample};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of running one sample through selection, scoring and the presence gate
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Transition lighting; nothing was scored or recorded
    Skipped,
    Scored(ScoredSample),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSample {
    pub bundle: SettingsBundle,
    pub breakdown: ConfidenceBreakdown,
    pub present: bool,
    pub alert_type: AlertType,
}

/// Per-camera decision pipeline up to, but not including, alerting
pub struct DetectionEngine {
    selector: Arc<ParameterSelector>,
    scorer: ConfidenceScorer,
}

impl DetectionEngine {
    pub fn new(selector: Arc<ParameterSelector>, history: Arc<FrameHistoryStore>) -> Self {
        Self {
            selector,
            scorer: ConfidenceScorer::new(history),
        }
    }

    pub fn selector(&self) -> Arc<ParameterSelector> {
        Arc::clone(&self.selector)
    }

    pub fn history(&self) -> Arc<FrameHistoryStore> {
        self.scorer.history()
    }

    pub fn evaluate(&self, sample: &DetectionSample) -> Result<Evaluation> {
        self.evaluate_at(sample, Utc::now())
    }

    /// Validate, select, score, decide and resolve one sample
    pub fn evaluate_at(&self, sample: &DetectionSample, now: DateTime<Utc>) -> Result<Evaluation> {
        sample.validate()?;

        let bundle = match self.selector.select(&sample.camera_id, sample.lighting) {
            Selection::Use(bundle) => bundle,
            Selection::Skip => return Ok(Evaluation::Skipped),
        };

        let breakdown = self.scorer.score_at(sample, &bundle, now);
        let present = is_present(&breakdown, &bundle.thresholds);

        let base = self.selector.base_alert_type(&sample.camera_id);
        let alert_type = resolve(
            base,
            AuxFlags {
                multi_subject: sample.is_multi_subject(),
                subject_count: sample.subject_count.unwrap_or(0),
                special_condition: sample.special_condition,
            },
        );

        if present {
            info!(
                "Owl present on camera '{}' ({}): {}",
                sample.camera_id, alert_type, breakdown
            );
        } else {
            debug!(
                "No owl on camera '{}' ({} vs threshold {:.1}/{} frames)",
                sample.camera_id,
                breakdown,
                bundle.thresholds.confidence_threshold,
                bundle.thresholds.consecutive_frames_threshold
            );
        }

        Ok(Evaluation::Scored(ScoredSample {
            bundle,
            breakdown,
            present,
            alert_type,
        }))
    }
}
