//! Shared fixtures for app integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use geosnap_app::{CameraCapture, WidgetDeps};
use geosnap_capture::{FixedLocationProvider, SyntheticCameraBackend};
use geosnap_core::Coordinates;
use geosnap_ui::{DeferredPrompt, InstallChoice, NoticeLog, PlatformEvents};
use geosnap_upload::{
    TransportResponse, UPLOAD_ENDPOINT, UploadClient, UploadEnvelope, UploadError,
    UploadTransport,
};

/// Android phone user agent.
#[allow(dead_code)]
pub const MOBILE_UA: &str =
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Mobile Safari/537.36";

/// Desktop browser user agent.
#[allow(dead_code)]
pub const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:130.0) Gecko/20100101";

/// Fixed position used by fixtures with geolocation.
#[allow(dead_code)]
pub const HARBOUR: Coordinates = Coordinates {
    latitude: 53.5461,
    longitude: 9.9661,
};

/// Transport that records envelopes and replays scripted outcomes.
///
/// Once the script is exhausted every call answers `200 OK`.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingTransport {
    script: Mutex<VecDeque<Result<TransportResponse, UploadError>>>,
    sent: Mutex<Vec<UploadEnvelope>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    /// Queues the outcome of the next call.
    pub fn push(&self, outcome: Result<TransportResponse, UploadError>) {
        self.script
            .lock()
            .expect("script lock should work")
            .push_back(outcome);
    }

    /// Queues a response with `status` and `body`.
    pub fn push_status(&self, status: u16, body: &str) {
        self.push(Ok(TransportResponse {
            status,
            body: body.to_string(),
        }));
    }

    /// Returns the number of transport calls so far.
    pub fn calls(&self) -> usize {
        self.sent.lock().expect("sent lock should work").len()
    }

    /// Returns the last envelope sent.
    pub fn last(&self) -> Option<UploadEnvelope> {
        self.sent.lock().expect("sent lock should work").last().cloned()
    }
}

#[async_trait]
impl UploadTransport for RecordingTransport {
    async fn send(&self, envelope: UploadEnvelope) -> Result<TransportResponse, UploadError> {
        self.sent
            .lock()
            .expect("sent lock should work")
            .push(envelope);
        self.script
            .lock()
            .expect("script lock should work")
            .pop_front()
            .unwrap_or_else(|| {
                Ok(TransportResponse {
                    status: 200,
                    body: "ok".to_string(),
                })
            })
    }
}

/// Deferred prompt answering with a fixed choice and counting replays.
#[allow(dead_code)]
pub struct ScriptedPrompt {
    choice: InstallChoice,
    replays: Mutex<u32>,
}

#[allow(dead_code)]
impl ScriptedPrompt {
    /// Creates a prompt answering `choice`.
    pub fn new(choice: InstallChoice) -> Arc<Self> {
        Arc::new(Self {
            choice,
            replays: Mutex::new(0),
        })
    }

    /// Returns how often the prompt was shown.
    pub fn replays(&self) -> u32 {
        *self.replays.lock().expect("replay lock should work")
    }
}

#[async_trait]
impl DeferredPrompt for ScriptedPrompt {
    async fn prompt(&self) -> InstallChoice {
        *self.replays.lock().expect("replay lock should work") += 1;
        self.choice
    }
}

/// Widget plus handles on every fake collaborator.
#[allow(dead_code)]
pub struct Harness {
    pub widget: CameraCapture,
    pub camera: Arc<SyntheticCameraBackend>,
    pub transport: Arc<RecordingTransport>,
    pub notices: Arc<NoticeLog>,
    pub platform: PlatformEvents,
}

/// Builds an unmounted widget with synthetic camera and recording transport.
#[allow(dead_code)]
pub fn harness(user_agent: &str, position: Option<Coordinates>) -> Harness {
    let camera = Arc::new(SyntheticCameraBackend::new());
    let transport = Arc::new(RecordingTransport::default());
    let notices = Arc::new(NoticeLog::new());
    let platform = PlatformEvents::new();
    let location = match position {
        Some(position) => FixedLocationProvider::new(position),
        None => FixedLocationProvider::unavailable(),
    };

    let widget = CameraCapture::new(
        WidgetDeps {
            camera: camera.clone(),
            location: Arc::new(location),
            uploader: UploadClient::new(UPLOAD_ENDPOINT, transport.clone())
                .expect("fixed endpoint should validate"),
            notifier: notices.clone(),
            platform: platform.clone(),
        },
        user_agent,
    );

    Harness {
        widget,
        camera,
        transport,
        notices,
        platform,
    }
}

/// Mounted widget with a captured photo and both fields filled.
#[allow(dead_code)]
pub async fn ready_to_submit(user_agent: &str, position: Option<Coordinates>) -> Harness {
    let harness = harness(user_agent, position);
    harness.widget.mount().await;
    harness
        .widget
        .capture_photo()
        .expect("synthetic camera should capture");
    harness.widget.set_location("Harbour crane 7");
    harness.widget.set_description("hydraulic leak");
    harness
}
