use crate::error::SampleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lighting condition reported with a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingCondition {
    Day,
    Night,
    /// Dawn/dusk; samples taken now are skipped entirely
    Transition,
}

impl LightingCondition {
    /// Day or night, as opposed to transition
    pub fn is_pure(&self) -> bool {
        !matches!(self, LightingCondition::Transition)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LightingCondition::Day => "day",
            LightingCondition::Night => "night",
            LightingCondition::Transition => "transition",
        }
    }
}

impl fmt::Display for LightingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted contour measured against the reference image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeCandidate {
    pub circularity: f64,
    pub aspect_ratio: f64,
    /// Contour area as a fraction of the frame
    pub area_ratio: f64,
    pub brightness_delta: f64,
}

/// Mean luminance change per horizontal band of the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionLuminance {
    pub top: f64,
    pub middle: f64,
    pub bottom: f64,
}

/// One camera's measurements for one detection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSample {
    pub camera_id: String,
    pub lighting: LightingCondition,
    #[serde(default)]
    pub candidates: Vec<ShapeCandidate>,
    #[serde(default)]
    pub pixel_change_ratio: f64,
    #[serde(default)]
    pub luminance_change: f64,
    #[serde(default)]
    pub regions: Option<RegionLuminance>,
    /// Number of distinct subjects the vision stage counted, if it counts
    #[serde(default)]
    pub subject_count: Option<u32>,
    /// Vision stage flagged the highest-priority condition (eggs, chicks)
    #[serde(default)]
    pub special_condition: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

impl DetectionSample {
    pub fn new<S: Into<String>>(camera_id: S, lighting: LightingCondition) -> Self {
        Self {
            camera_id: camera_id.into(),
            lighting,
            candidates: Vec::new(),
            pixel_change_ratio: 0.0,
            luminance_change: 0.0,
            regions: None,
            subject_count: None,
            special_condition: false,
            image_url: None,
            captured_at: Utc::now(),
        }
    }

    pub fn with_candidate(mut self, candidate: ShapeCandidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn with_motion(mut self, pixel_change_ratio: f64, luminance_change: f64) -> Self {
        self.pixel_change_ratio = pixel_change_ratio;
        self.luminance_change = luminance_change;
        self
    }

    pub fn with_regions(mut self, regions: RegionLuminance) -> Self {
        self.regions = Some(regions);
        self
    }

    pub fn with_subject_count(mut self, count: u32) -> Self {
        self.subject_count = Some(count);
        self
    }

    pub fn with_special_condition(mut self, special: bool) -> Self {
        self.special_condition = special;
        self
    }

    /// Candidate with the largest area, which the shape score is taken from
    pub fn best_candidate(&self) -> Option<&ShapeCandidate> {
        self.candidates
            .iter()
            .max_by(|a, b| a.area_ratio.total_cmp(&b.area_ratio))
    }

    /// More than one subject was reported
    pub fn is_multi_subject(&self) -> bool {
        self.subject_count.map_or(false, |count| count > 1)
    }

    /// Reject samples whose metrics cannot be scored
    pub fn validate(&self) -> Result<(), SampleError> {
        if self.camera_id.trim().is_empty() {
            return Err(SampleError::MissingCamera);
        }

        let mut metrics = vec![
            ("pixel_change_ratio", self.pixel_change_ratio),
            ("luminance_change", self.luminance_change),
        ];
        for candidate in &self.candidates {
            metrics.push(("circularity", candidate.circularity));
            metrics.push(("aspect_ratio", candidate.aspect_ratio));
            metrics.push(("area_ratio", candidate.area_ratio));
        }

        for (field, value) in metrics {
            if !value.is_finite() || value < 0.0 {
                return Err(SampleError::InvalidMetric {
                    camera: self.camera_id.clone(),
                    field,
                    value,
                });
            }
        }

        // Signed metrics only need to be finite
        let mut signed: Vec<(&'static str, f64)> = self
            .candidates
            .iter()
            .map(|candidate| ("brightness_delta", candidate.brightness_delta))
            .collect();
        if let Some(regions) = &self.regions {
            signed.push(("region_top", regions.top));
            signed.push(("region_middle", regions.middle));
            signed.push(("region_bottom", regions.bottom));
        }

        for (field, value) in signed {
            if !value.is_finite() {
                return Err(SampleError::InvalidMetric {
                    camera: self.camera_id.clone(),
                    field,
                    value,
                });
            }
        }

        Ok(())
    }
}

/// Per-factor confidence for one sample. Never mutated after scoring.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub shape: f64,
    pub motion: f64,
    pub temporal: f64,
    pub camera_specific: f64,
    pub total: f64,
    /// Trailing run of prior cycles whose primary confidence cleared the persistence floor
    pub consecutive_frames: u32,
}

impl ConfidenceBreakdown {
    /// Shape plus motion, excluding temporal and camera bonuses
    pub fn primary(&self) -> f64 {
        self.shape + self.motion
    }
}

impl fmt::Display for ConfidenceBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total {:.1} (shape {:.1}, motion {:.1}, temporal {:.1}, camera {:.1}, frames {})",
            self.total,
            self.shape,
            self.motion,
            self.temporal,
            self.camera_specific,
            self.consecutive_frames
        )
    }
}
