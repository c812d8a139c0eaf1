use crate::alerts::AlertType;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Current camera table layout: separate `day` and `night` threshold bundles
pub const CAMERA_CONFIG_VERSION: u32 = 2;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OwlwatchConfig {
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Legacy single bundle, used when a camera or lighting bundle is missing
    #[serde(default)]
    pub thresholds: CameraThresholdConfig,

    /// Per-camera tables keyed by camera id
    #[serde(default)]
    pub cameras: HashMap<String, CameraConfig>,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Seconds between detection cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_seconds: u64,

    /// Shape and motion gates used in daylight
    #[serde(default = "DetectionSettings::day")]
    pub day: DetectionSettings,

    /// Shape and motion gates used at night (IR)
    #[serde(default = "DetectionSettings::night")]
    pub night: DetectionSettings,
}

/// Minimums and ideals the scorer measures a sample against
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectionSettings {
    pub min_circularity: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    /// Smallest candidate area as a fraction of the frame
    pub min_area_ratio: f64,
    /// Fraction of changed pixels below which motion scores zero
    pub min_pixel_change: f64,
    pub ideal_pixel_change: f64,
    /// Mean luminance delta (0-255) below which motion scores zero
    pub min_luminance_change: f64,
    pub ideal_luminance_change: f64,
}

/// Confidence and run-length gate for one camera under one lighting condition
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct CameraThresholdConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    #[serde(default = "default_consecutive_frames")]
    pub consecutive_frames_threshold: u32,
}

/// Which camera-specific heuristic contributes the bonus confidence
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraProfile {
    #[default]
    Generic,
    /// Interior box camera, compares region brightness
    Enclosure,
    /// Exterior camera, tighter shape gate at night
    Outdoor,
}

/// Camera table as written on disk. Version 1 tables carry a single
/// threshold pair at the top level and are migrated at load.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_camera_config_version")]
    pub version: u32,

    #[serde(default)]
    pub profile: CameraProfile,

    /// Alert type raised by this camera before multi-subject/special escalation
    #[serde(default)]
    pub base_alert_type: AlertType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<CameraThresholdConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night: Option<CameraThresholdConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_frames_threshold: Option<u32>,
}

/// Version 1 threshold pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyThresholds {
    pub confidence_threshold: f64,
    pub consecutive_frames_threshold: u32,
}

/// Camera settings after migration
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub profile: CameraProfile,
    pub base_alert_type: AlertType,
    pub day: Option<CameraThresholdConfig>,
    pub night: Option<CameraThresholdConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlertConfig {
    /// Base cooldown in minutes, scaled per alert type
    #[serde(default = "default_alert_delay")]
    pub alert_delay_minutes: u32,

    /// How long a sent alert blocks lower-priority types
    #[serde(default = "default_suppression_window")]
    pub suppression_window_minutes: u32,

    /// Idle time after which an alert session's duration is finalized
    #[serde(default = "default_inactivity_window")]
    pub inactivity_window_minutes: u32,

    /// How long shutdown waits for in-flight notifications
    #[serde(default = "default_dispatch_grace")]
    pub dispatch_grace_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    /// Subject prefix for operator test alerts
    #[serde(default = "default_test_prefix")]
    pub test_prefix: String,

    /// Recipients for the logging transport
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Append alert records to this JSON-lines file instead of memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_log_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

/// Split a version 1 threshold pair into independent day and night bundles.
/// Both start from the legacy values.
pub fn migrate_legacy(old: &LegacyThresholds) -> (CameraThresholdConfig, CameraThresholdConfig) {
    let bundle = CameraThresholdConfig {
        confidence_threshold: old.confidence_threshold,
        consecutive_frames_threshold: old.consecutive_frames_threshold,
    };
    (bundle, bundle)
}

impl CameraThresholdConfig {
    pub fn new(confidence_threshold: f64, consecutive_frames_threshold: u32) -> Self {
        Self {
            confidence_threshold,
            consecutive_frames_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.confidence_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.confidence_threshold)
        {
            return Err(ConfigError::Message(format!(
                "Confidence threshold must be within 0-100 (got {})",
                self.confidence_threshold
            )));
        }

        if self.consecutive_frames_threshold == 0 {
            return Err(ConfigError::Message(
                "Consecutive frames threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CameraThresholdConfig {
    fn default() -> Self {
        Self::new(default_confidence_threshold(), default_consecutive_frames())
    }
}

impl CameraConfig {
    /// Legacy threshold pair if this table carries one
    pub fn legacy(&self) -> Option<LegacyThresholds> {
        match (self.confidence_threshold, self.consecutive_frames_threshold) {
            (None, None) => None,
            (threshold, frames) => Some(LegacyThresholds {
                confidence_threshold: threshold.unwrap_or_else(default_confidence_threshold),
                consecutive_frames_threshold: frames.unwrap_or_else(default_consecutive_frames),
            }),
        }
    }

    /// Resolve the on-disk table into day/night bundles. Explicit bundles
    /// win over migrated ones.
    pub fn migrate(&self, camera_id: &str) -> CameraSettings {
        let needs_migration =
            self.version < CAMERA_CONFIG_VERSION || self.day.is_none() || self.night.is_none();

        let (day, night) = match (needs_migration, self.legacy()) {
            (true, Some(legacy)) => {
                let (day, night) = migrate_legacy(&legacy);
                info!(
                    "Migrated legacy thresholds for camera '{}' (v{} -> v{})",
                    camera_id, self.version, CAMERA_CONFIG_VERSION
                );
                (Some(self.day.unwrap_or(day)), Some(self.night.unwrap_or(night)))
            }
            _ => (self.day, self.night),
        };

        CameraSettings {
            profile: self.profile,
            base_alert_type: self.base_alert_type,
            day,
            night,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            version: CAMERA_CONFIG_VERSION,
            profile: CameraProfile::Generic,
            base_alert_type: AlertType::default(),
            day: Some(CameraThresholdConfig::default()),
            night: Some(CameraThresholdConfig::default()),
            confidence_threshold: None,
            consecutive_frames_threshold: None,
        }
    }
}

impl DetectionSettings {
    pub fn day() -> Self {
        Self {
            min_circularity: 0.5,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 2.5,
            min_area_ratio: 0.02,
            min_pixel_change: 0.02,
            ideal_pixel_change: 0.15,
            min_luminance_change: 8.0,
            ideal_luminance_change: 40.0,
        }
    }

    pub fn night() -> Self {
        Self {
            min_circularity: 0.55,
            min_aspect_ratio: 0.6,
            max_aspect_ratio: 2.2,
            min_area_ratio: 0.03,
            min_pixel_change: 0.03,
            ideal_pixel_change: 0.2,
            min_luminance_change: 12.0,
            ideal_luminance_change: 50.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_aspect_ratio >= self.max_aspect_ratio {
            return Err(ConfigError::Message(format!(
                "Aspect ratio band is empty ({} >= {})",
                self.min_aspect_ratio, self.max_aspect_ratio
            )));
        }

        let non_negative = [
            ("min_circularity", self.min_circularity),
            ("min_aspect_ratio", self.min_aspect_ratio),
            ("min_area_ratio", self.min_area_ratio),
            ("min_pixel_change", self.min_pixel_change),
            ("ideal_pixel_change", self.ideal_pixel_change),
            ("min_luminance_change", self.min_luminance_change),
            ("ideal_luminance_change", self.ideal_luminance_change),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Message(format!(
                    "Detection setting {} must be a non-negative number (got {})",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cycle_interval_seconds: default_cycle_interval(),
            day: DetectionSettings::day(),
            night: DetectionSettings::night(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alert_delay_minutes: default_alert_delay(),
            suppression_window_minutes: default_suppression_window(),
            inactivity_window_minutes: default_inactivity_window(),
            dispatch_grace_seconds: default_dispatch_grace(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            test_prefix: default_test_prefix(),
            recipients: Vec::new(),
            alert_log_path: None,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl OwlwatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("owlwatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "detection.cycle_interval_seconds",
                default_cycle_interval() as i64,
            )?
            .set_default(
                "thresholds.confidence_threshold",
                default_confidence_threshold(),
            )?
            .set_default(
                "thresholds.consecutive_frames_threshold",
                default_consecutive_frames(),
            )?
            .set_default("alerts.alert_delay_minutes", default_alert_delay())?
            .set_default(
                "alerts.suppression_window_minutes",
                default_suppression_window(),
            )?
            .set_default(
                "alerts.inactivity_window_minutes",
                default_inactivity_window(),
            )?
            .set_default("alerts.dispatch_grace_seconds", default_dispatch_grace() as i64)?
            .set_default("notification.test_prefix", default_test_prefix())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // OWLWATCH__ALERTS__ALERT_DELAY_MINUTES=10 style overrides
            .add_source(
                Environment::with_prefix("OWLWATCH")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: OwlwatchConfig = settings.try_deserialize()?;

        info!(
            "Configuration loaded successfully ({} cameras)",
            config.cameras.len()
        );
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Migrated settings for every configured camera
    pub fn camera_settings(&self) -> HashMap<String, CameraSettings> {
        self.cameras
            .iter()
            .map(|(id, camera)| (id.clone(), camera.migrate(id)))
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.cycle_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Detection cycle interval must be greater than 0".to_string(),
            ));
        }

        self.detection.day.validate()?;
        self.detection.night.validate()?;
        self.thresholds.validate()?;

        for (id, settings) in self.camera_settings() {
            for bundle in [settings.day, settings.night].iter().flatten() {
                bundle.validate().map_err(|e| {
                    ConfigError::Message(format!("Camera '{}': {}", id, e))
                })?;
            }
            if settings.day.is_none() || settings.night.is_none() {
                warn!(
                    "Camera '{}' is missing a day or night bundle, the [thresholds] bundle will be used",
                    id
                );
            }
        }

        if self.alerts.alert_delay_minutes == 0 {
            return Err(ConfigError::Message(
                "Alert delay must be greater than 0".to_string(),
            ));
        }

        if self.alerts.suppression_window_minutes == 0 {
            return Err(ConfigError::Message(
                "Suppression window must be greater than 0".to_string(),
            ));
        }

        if self.alerts.inactivity_window_minutes == 0 {
            return Err(ConfigError::Message(
                "Inactivity window must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for OwlwatchConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            thresholds: CameraThresholdConfig::default(),
            cameras: HashMap::new(),
            alerts: AlertConfig::default(),
            notification: NotificationConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

// Default value functions
fn default_cycle_interval() -> u64 {
    60
}

fn default_confidence_threshold() -> f64 {
    60.0
}
fn default_consecutive_frames() -> u32 {
    2
}
fn default_camera_config_version() -> u32 {
    1
}

fn default_alert_delay() -> u32 {
    30
}
fn default_suppression_window() -> u32 {
    5
}
fn default_inactivity_window() -> u32 {
    5
}
fn default_dispatch_grace() -> u64 {
    10
}

fn default_test_prefix() -> String {
    "TEST: ".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
