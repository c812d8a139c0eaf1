use crate::alerts::AlertType;
use crate::config::{
    CameraProfile, CameraSettings, CameraThresholdConfig, DetectionConfig, DetectionSettings,
    OwlwatchConfig,
};
use crate::detection::types::LightingCondition;
use crate::error::ThresholdError;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Everything the scorer and decider need for one camera in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsBundle {
    pub lighting: LightingCondition,
    pub thresholds: CameraThresholdConfig,
    pub detection: DetectionSettings,
    pub profile: CameraProfile,
}

/// Why a selection used the legacy bundle
enum Fallback {
    UnknownCamera,
    MissingBundle,
}

/// Outcome of parameter selection
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Use(SettingsBundle),
    /// Transition lighting: no scoring, no decision, no history append
    Skip,
}

impl Selection {
    pub fn bundle(&self) -> Option<&SettingsBundle> {
        match self {
            Selection::Use(bundle) => Some(bundle),
            Selection::Skip => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Selection::Skip)
    }
}

/// Chooses the day or night bundle for a camera and owns the runtime
/// threshold overrides.
pub struct ParameterSelector {
    cameras: RwLock<HashMap<String, CameraSettings>>,
    legacy: CameraThresholdConfig,
    detection: DetectionConfig,
}

impl ParameterSelector {
    pub fn new(
        cameras: HashMap<String, CameraSettings>,
        legacy: CameraThresholdConfig,
        detection: DetectionConfig,
    ) -> Self {
        debug!(
            "Parameter selector created for {} cameras (legacy bundle: {:?})",
            cameras.len(),
            legacy
        );

        Self {
            cameras: RwLock::new(cameras),
            legacy,
            detection,
        }
    }

    pub fn from_config(config: &OwlwatchConfig) -> Self {
        Self::new(
            config.camera_settings(),
            config.thresholds,
            config.detection.clone(),
        )
    }

    /// Pick the settings bundle for this camera and lighting condition
    pub fn select(&self, camera_id: &str, lighting: LightingCondition) -> Selection {
        let detection = match lighting {
            LightingCondition::Day => self.detection.day.clone(),
            LightingCondition::Night => self.detection.night.clone(),
            LightingCondition::Transition => {
                debug!("Camera '{}' in transition lighting, skipping cycle", camera_id);
                return Selection::Skip;
            }
        };

        let (thresholds, profile, fallback) = {
            let cameras = self.cameras.read();
            match cameras.get(camera_id) {
                Some(settings) => {
                    let bundle = match lighting {
                        LightingCondition::Day => settings.day,
                        _ => settings.night,
                    };
                    match bundle {
                        Some(bundle) => (bundle, settings.profile, None),
                        None => (self.legacy, settings.profile, Some(Fallback::MissingBundle)),
                    }
                }
                None => (self.legacy, CameraProfile::Generic, Some(Fallback::UnknownCamera)),
            }
        };

        match fallback {
            Some(Fallback::MissingBundle) => warn!(
                "Camera '{}' has no {} bundle, falling back to legacy thresholds",
                camera_id, lighting
            ),
            Some(Fallback::UnknownCamera) => warn!(
                "Unknown camera '{}', falling back to legacy thresholds",
                camera_id
            ),
            None => {}
        }

        Selection::Use(SettingsBundle {
            lighting,
            thresholds,
            detection,
            profile,
        })
    }

    /// Configured thresholds for a camera, or the legacy bundle
    pub fn get_threshold(
        &self,
        camera_id: &str,
        lighting: LightingCondition,
    ) -> Option<CameraThresholdConfig> {
        self.select(camera_id, lighting)
            .bundle()
            .map(|bundle| bundle.thresholds)
    }

    /// Replace the confidence threshold for one camera and lighting condition.
    /// Out-of-range values are rejected and nothing changes.
    pub fn set_threshold(
        &self,
        camera_id: &str,
        lighting: LightingCondition,
        value: f64,
    ) -> Result<CameraThresholdConfig, ThresholdError> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(ThresholdError::ConfidenceOutOfRange {
                camera: camera_id.to_string(),
                value,
            });
        }

        self.update(camera_id, lighting, |bundle| {
            bundle.confidence_threshold = value;
        })
    }

    /// Replace the consecutive-frames requirement for one camera and lighting condition
    pub fn set_consecutive_frames(
        &self,
        camera_id: &str,
        lighting: LightingCondition,
        frames: u32,
    ) -> Result<CameraThresholdConfig, ThresholdError> {
        if frames == 0 {
            return Err(ThresholdError::FramesOutOfRange {
                camera: camera_id.to_string(),
                value: frames,
            });
        }

        self.update(camera_id, lighting, |bundle| {
            bundle.consecutive_frames_threshold = frames;
        })
    }

    fn update<F>(
        &self,
        camera_id: &str,
        lighting: LightingCondition,
        apply: F,
    ) -> Result<CameraThresholdConfig, ThresholdError>
    where
        F: FnOnce(&mut CameraThresholdConfig),
    {
        if !lighting.is_pure() {
            return Err(ThresholdError::UnsupportedLighting {
                lighting: lighting.to_string(),
            });
        }

        let updated = {
            let mut cameras = self.cameras.write();
            let legacy = self.legacy;
            let settings = cameras
                .entry(camera_id.to_string())
                .or_insert_with(|| CameraSettings {
                    profile: CameraProfile::Generic,
                    base_alert_type: AlertType::default(),
                    day: None,
                    night: None,
                });

            let slot = match lighting {
                LightingCondition::Day => &mut settings.day,
                _ => &mut settings.night,
            };
            let bundle = slot.get_or_insert(legacy);
            apply(bundle);
            *bundle
        };

        info!(
            "Thresholds for camera '{}' ({}) set to {:.1} / {} frames",
            camera_id, lighting, updated.confidence_threshold, updated.consecutive_frames_threshold
        );

        Ok(updated)
    }

    /// Base alert type configured for a camera
    pub fn base_alert_type(&self, camera_id: &str) -> AlertType {
        self.cameras
            .read()
            .get(camera_id)
            .map(|settings| settings.base_alert_type)
            .unwrap_or_default()
    }

    pub fn camera_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cameras.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
