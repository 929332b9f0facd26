//! Integration tests for submissions without a device position.

mod common;

use geosnap_app::LocationStatus;
use geosnap_ui::StageStatus;

#[tokio::test]
async fn geolocation_fallback_tests_sends_empty_coordinates() {
    let harness = common::ready_to_submit(common::MOBILE_UA, None).await;
    assert!(matches!(
        harness.widget.location_status(),
        LocationStatus::Unavailable(_)
    ));
    assert_eq!(harness.widget.view().geolocation, StageStatus::Degraded);

    harness
        .widget
        .submit()
        .await
        .expect("submission should not depend on geolocation");

    let envelope = harness.transport.last().expect("envelope sent");
    assert_eq!(envelope.form.text_value("latitude"), Some(""));
    assert_eq!(envelope.form.text_value("longitude"), Some(""));
}

#[tokio::test]
async fn geolocation_fallback_tests_position_is_requested_at_mount() {
    let harness = common::harness(common::DESKTOP_UA, Some(common::HARBOUR));
    assert_eq!(harness.widget.location_status(), LocationStatus::Pending);

    harness.widget.mount().await;
    assert_eq!(
        harness.widget.location_status(),
        LocationStatus::Available(common::HARBOUR)
    );
}
