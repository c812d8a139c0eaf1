use super::*;
use crate::alerts::AlertType;
use crate::config::{CameraProfile, CameraSettings, CameraThresholdConfig, DetectionConfig};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

fn create_test_engine() -> DetectionEngine {
    let mut cameras = HashMap::new();
    cameras.insert(
        "A".to_string(),
        CameraSettings {
            profile: CameraProfile::Generic,
            base_alert_type: AlertType::OwlInArea,
            day: Some(CameraThresholdConfig::new(60.0, 2)),
            night: Some(CameraThresholdConfig::new(50.0, 3)),
        },
    );
    cameras.insert(
        "box".to_string(),
        CameraSettings {
            profile: CameraProfile::Enclosure,
            base_alert_type: AlertType::OwlInBox,
            day: Some(CameraThresholdConfig::new(60.0, 1)),
            night: Some(CameraThresholdConfig::new(60.0, 1)),
        },
    );

    let selector = Arc::new(ParameterSelector::new(
        cameras,
        CameraThresholdConfig::new(60.0, 2),
        DetectionConfig::default(),
    ));
    DetectionEngine::new(selector, Arc::new(FrameHistoryStore::new()))
}

/// Shape 20 (area below minimum) + motion 30 = primary 50
fn mediocre_sample(camera: &str) -> DetectionSample {
    DetectionSample::new(camera, LightingCondition::Day)
        .with_candidate(ShapeCandidate {
            circularity: 0.8,
            aspect_ratio: 1.2,
            area_ratio: 0.01,
            brightness_delta: 20.0,
        })
        .with_motion(0.15, 40.0)
}

/// Shape 40 + motion 30 = primary 70
fn strong_sample(camera: &str) -> DetectionSample {
    DetectionSample::new(camera, LightingCondition::Day)
        .with_candidate(ShapeCandidate {
            circularity: 0.8,
            aspect_ratio: 1.2,
            area_ratio: 0.2,
            brightness_delta: 20.0,
        })
        .with_motion(0.15, 40.0)
}

fn scored(evaluation: Evaluation) -> ScoredSample {
    match evaluation {
        Evaluation::Scored(scored) => scored,
        Evaluation::Skipped => panic!("expected a scored sample"),
    }
}

#[test]
fn test_run_builds_but_confidence_too_low_then_strong_frame_triggers() {
    let engine = create_test_engine();
    let start = Utc::now();

    let cycle1 = scored(engine.evaluate_at(&mediocre_sample("A"), start).unwrap());
    assert_eq!(cycle1.breakdown.consecutive_frames, 0);
    assert_eq!(cycle1.breakdown.temporal, 0.0);
    assert!(!cycle1.present);

    let cycle2 =
        scored(engine.evaluate_at(&mediocre_sample("A"), start + Duration::minutes(1)).unwrap());
    assert_eq!(cycle2.breakdown.consecutive_frames, 1);
    assert!(!cycle2.present);

    let cycle3 =
        scored(engine.evaluate_at(&mediocre_sample("A"), start + Duration::minutes(2)).unwrap());
    assert_eq!(cycle3.breakdown.consecutive_frames, 2);
    assert!((cycle3.breakdown.primary() - 50.0).abs() < 1e-9);
    assert!(cycle3.breakdown.temporal > 0.0);
    assert!(cycle3.breakdown.total < 60.0);
    assert!(!cycle3.present);

    let cycle4 =
        scored(engine.evaluate_at(&strong_sample("A"), start + Duration::minutes(3)).unwrap());
    assert_eq!(cycle4.breakdown.consecutive_frames, 3);
    assert!(cycle4.breakdown.total >= 60.0);
    assert!(cycle4.present);
    assert_eq!(cycle4.alert_type, AlertType::OwlInArea);
}

#[test]
fn test_single_perfect_frame_is_not_presence() {
    let engine = create_test_engine();

    let first = scored(engine.evaluate(&strong_sample("A")).unwrap());
    assert!(first.breakdown.total >= 60.0);
    assert_eq!(first.breakdown.consecutive_frames, 0);
    assert!(!first.present);
}

#[test]
fn test_transition_skips_without_touching_history() {
    let engine = create_test_engine();
    engine.evaluate(&strong_sample("A")).unwrap();
    assert_eq!(engine.history().len("A"), 1);

    let mut dusk = strong_sample("A");
    dusk.lighting = LightingCondition::Transition;
    assert_eq!(engine.evaluate(&dusk).unwrap(), Evaluation::Skipped);
    assert_eq!(engine.history().len("A"), 1);

    // Run continues across the skipped cycle
    let next = scored(engine.evaluate(&strong_sample("A")).unwrap());
    assert_eq!(next.breakdown.consecutive_frames, 1);
}

#[test]
fn test_zero_candidates_score_motion_only() {
    let engine = create_test_engine();

    for (pixel, luminance) in [(0.05, 10.0), (0.3, 60.0), (0.0, 0.0)] {
        let sample = DetectionSample::new("A", LightingCondition::Day).with_motion(pixel, luminance);
        let result = scored(engine.evaluate(&sample).unwrap());
        assert_eq!(result.breakdown.shape, 0.0);
    }

    let sample = DetectionSample::new("A", LightingCondition::Day).with_motion(0.3, 60.0);
    let result = scored(engine.evaluate(&sample).unwrap());
    assert!((result.breakdown.motion - 30.0).abs() < 1e-9);
}

#[test]
fn test_low_primary_history_never_earns_temporal() {
    let engine = create_test_engine();
    let weak = DetectionSample::new("A", LightingCondition::Day).with_motion(0.15, 40.0);

    for _ in 0..12 {
        let result = scored(engine.evaluate(&weak).unwrap());
        // Primary 30 stays under the persistence floor
        assert_eq!(result.breakdown.temporal, 0.0);
        assert_eq!(result.breakdown.consecutive_frames, 0);
    }
    assert_eq!(engine.history().len("A"), HISTORY_CAPACITY);
}

#[test]
fn test_night_uses_night_bundle() {
    let engine = create_test_engine();
    let mut sample = strong_sample("A");
    sample.lighting = LightingCondition::Night;

    let result = scored(engine.evaluate(&sample).unwrap());
    assert_eq!(result.bundle.thresholds, CameraThresholdConfig::new(50.0, 3));
    assert_eq!(result.bundle.lighting, LightingCondition::Night);
}

#[test]
fn test_multi_subject_and_special_resolution() {
    let engine = create_test_engine();
    let start = Utc::now();

    engine.evaluate_at(&strong_sample("box"), start).unwrap();
    let two = scored(
        engine
            .evaluate_at(
                &strong_sample("box").with_subject_count(2),
                start + Duration::minutes(1),
            )
            .unwrap(),
    );
    assert!(two.present);
    assert_eq!(two.alert_type, AlertType::TwoOwlsInBox);

    let special = scored(
        engine
            .evaluate_at(
                &strong_sample("box").with_special_condition(true),
                start + Duration::minutes(2),
            )
            .unwrap(),
    );
    assert_eq!(special.alert_type, AlertType::EggsOrBabies);
}

#[test]
fn test_invalid_sample_is_rejected_before_scoring() {
    let engine = create_test_engine();
    let sample = DetectionSample::new("A", LightingCondition::Day).with_motion(f64::INFINITY, 0.0);

    assert!(engine.evaluate(&sample).is_err());
    assert!(engine.history().is_empty("A"));
}
