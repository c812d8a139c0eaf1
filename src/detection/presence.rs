use crate::config::CameraThresholdConfig;
use crate::detection::types::ConfidenceBreakdown;

/// Dual-threshold presence predicate.
///
/// Present only when the total confidence reaches the camera's threshold and
/// the run of prior plausible frames is long enough. Either condition alone
/// is not enough.
pub fn is_present(breakdown: &ConfidenceBreakdown, config: &CameraThresholdConfig) -> bool {
    breakdown.total >= config.confidence_threshold
        && breakdown.consecutive_frames >= config.consecutive_frames_threshold
}
