//! Integration tests for facing switches and start sequencing.

mod common;

use std::time::Duration;

use geosnap_app::AppError;
use geosnap_capture::{CaptureError, CaptureState, StartOutcome, VideoConstraints};
use geosnap_core::FacingMode;

#[tokio::test]
async fn camera_switch_tests_double_switch_restores_facing() {
    let harness = common::harness(common::MOBILE_UA, None);
    harness.widget.mount().await;
    let original = harness.widget.facing();

    harness.widget.switch_camera().await.expect("first switch");
    assert_eq!(harness.widget.facing(), FacingMode::User);
    harness.widget.switch_camera().await.expect("second switch");
    assert_eq!(harness.widget.facing(), original);

    assert_eq!(
        harness.camera.requested_constraints(),
        vec![
            VideoConstraints {
                facing_mode: Some(FacingMode::Environment)
            },
            VideoConstraints {
                facing_mode: Some(FacingMode::User)
            },
            VideoConstraints {
                facing_mode: Some(FacingMode::Environment)
            },
        ]
    );
    assert_eq!(harness.camera.live_streams(), 1);
}

#[tokio::test]
async fn camera_switch_tests_desktop_is_unconstrained_without_switch() {
    let harness = common::harness(common::DESKTOP_UA, None);
    harness.widget.mount().await;

    assert_eq!(
        harness.camera.requested_constraints(),
        vec![VideoConstraints { facing_mode: None }]
    );
    assert!(!harness.widget.view().show_switch_camera);
    assert!(matches!(
        harness.widget.switch_camera().await,
        Err(AppError::Capture(CaptureError::SwitchUnavailable))
    ));
}

#[tokio::test]
async fn camera_switch_tests_slow_start_cannot_override_newer_switch() {
    let harness = common::harness(common::MOBILE_UA, None);
    harness
        .camera
        .set_latency(Some(FacingMode::Environment), Duration::from_millis(50));

    let (slow, fast) = tokio::join!(
        harness.widget.start_camera(FacingMode::Environment),
        harness.widget.switch_camera()
    );

    assert_eq!(slow.expect("slow start resolves"), StartOutcome::Superseded);
    assert_eq!(fast.expect("switch binds"), StartOutcome::Bound);
    assert_eq!(harness.widget.facing(), FacingMode::User);
    assert_eq!(harness.widget.capture_state(), CaptureState::Streaming);
    assert_eq!(harness.camera.live_streams(), 1);
}
