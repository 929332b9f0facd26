#![warn(missing_docs)]
//! # geosnap-capture
//!
//! ## Purpose
//! Provides camera stream acquisition, the capture controller state machine,
//! still encoding, and one-shot geolocation.
//!
//! ## Responsibilities
//! - Define backend-agnostic camera and location traits.
//! - Sequence `start` requests so the latest request always wins and stale
//!   streams are released.
//! - Freeze the live stream into a fixed-size lossless [`Snapshot`].
//! - Expose deterministic synthetic backends for CI and unit tests.
//!
//! ## Data flow
//! App requests a start -> [`CaptureController::begin_start`] releases the old
//! stream and issues a [`StartTicket`] -> backend acquires a [`MediaStream`]
//! -> [`CaptureController::complete_start`] binds it if the ticket is current
//! -> [`CaptureController::freeze`] turns the current frame into a snapshot.
//!
//! ## Ownership and lifetimes
//! The controller exclusively owns the bound stream. Acquisition runs without
//! borrowing the controller, so callers may drop their lock across `.await`.
//!
//! ## Error model
//! Permission, availability, and encoding failures are reported as
//! [`CaptureError`] and mirrored into [`CaptureState::Failed`] for display.
//!
//! ## Security and privacy notes
//! Frames never leave this crate except as an encoded snapshot requested by
//! the user. Streams are stopped as soon as they are superseded.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use geosnap_core::{
    Coordinates, DeviceClass, FacingMode, SNAPSHOT_HEIGHT, SNAPSHOT_MEDIA_TYPE, SNAPSHOT_WIDTH,
    Snapshot,
};
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use thiserror::Error;
use tracing::{debug, info, warn};

#[cfg(feature = "native-camera")]
mod native;

#[cfg(feature = "native-camera")]
pub use native::NativeCameraBackend;

/// Video constraints passed to media acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    /// Requested facing mode; `None` means any camera.
    pub facing_mode: Option<FacingMode>,
}

impl VideoConstraints {
    /// Builds constraints for a device class.
    ///
    /// Only mobile devices are constrained by facing mode.
    pub fn for_device(device: DeviceClass, facing: FacingMode) -> Self {
        Self {
            facing_mode: device.is_mobile().then_some(facing),
        }
    }
}

/// Live camera stream handle.
pub trait MediaStream: Send + Sync {
    /// Backend-assigned stream identifier for logs.
    fn id(&self) -> &str;

    /// Samples the frame currently shown by the stream.
    ///
    /// # Errors
    /// Returns [`CaptureError::StreamEnded`] once the stream is stopped, or a
    /// backend error when no frame is available yet.
    fn current_frame(&self) -> Result<RgbaImage, CaptureError>;

    /// Releases the underlying camera. Idempotent.
    fn stop(&self);
}

/// Trait implemented by concrete camera providers.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Acquires a live stream matching `constraints`.
    ///
    /// # Errors
    /// Returns [`CaptureError::PermissionDenied`], [`CaptureError::NoCamera`],
    /// or [`CaptureError::Overconstrained`] for the usual platform failures.
    async fn acquire(
        &self,
        constraints: VideoConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError>;
}

/// One-shot position source.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Requests the current device position once.
    ///
    /// # Errors
    /// Returns [`CaptureError::LocationUnavailable`] when denied or unknown.
    async fn current_position(&self) -> Result<Coordinates, CaptureError>;
}

/// Observable capture state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    /// Nothing acquired yet, or released at teardown.
    NoStream,
    /// A start request is in flight.
    Starting,
    /// Live view is bound.
    Streaming,
    /// Live view replaced by a snapshot.
    Frozen,
    /// Last start failed; calling start again retries.
    Failed {
        /// Display-safe failure reason.
        reason: String,
    },
}

/// Issued by [`CaptureController::begin_start`]; redeem with
/// [`CaptureController::complete_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartTicket {
    id: u64,
    /// Constraints to hand to the backend.
    pub constraints: VideoConstraints,
}

/// Result of redeeming a start ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Stream bound to the live view.
    Bound,
    /// A newer start was issued meanwhile; the acquired stream was stopped.
    Superseded,
}

/// Capture controller owning the live stream and facing preference.
pub struct CaptureController {
    device: DeviceClass,
    facing: FacingMode,
    state: CaptureState,
    stream: Option<Box<dyn MediaStream>>,
    latest_ticket: u64,
}

impl CaptureController {
    /// Creates an idle controller for a device class.
    pub fn new(device: DeviceClass) -> Self {
        Self {
            device,
            facing: FacingMode::default(),
            state: CaptureState::NoStream,
            stream: None,
            latest_ticket: 0,
        }
    }

    /// Returns the device class chosen at mount.
    pub fn device(&self) -> DeviceClass {
        self.device
    }

    /// Returns the current facing preference.
    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    /// Returns the observable capture state.
    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Returns `true` when the camera switch affordance should be shown.
    pub fn can_switch_facing(&self) -> bool {
        self.device.is_mobile()
    }

    /// Starts a new acquisition round.
    ///
    /// # Side effects
    /// Stops the currently bound stream before anything new is acquired and
    /// invalidates every previously issued ticket.
    pub fn begin_start(&mut self, facing: FacingMode) -> StartTicket {
        self.facing = facing;
        self.release_stream();
        self.latest_ticket += 1;
        self.state = CaptureState::Starting;

        let ticket = StartTicket {
            id: self.latest_ticket,
            constraints: VideoConstraints::for_device(self.device, facing),
        };
        debug!(target: "camera", ticket = ticket.id, facing = facing.as_str(), "start requested");
        ticket
    }

    /// Redeems a ticket with the acquisition result.
    ///
    /// # Errors
    /// Returns the acquisition error for the current ticket after recording it
    /// as [`CaptureState::Failed`]. Errors for stale tickets are dropped.
    pub fn complete_start(
        &mut self,
        ticket: StartTicket,
        result: Result<Box<dyn MediaStream>, CaptureError>,
    ) -> Result<StartOutcome, CaptureError> {
        if ticket.id != self.latest_ticket {
            if let Ok(stream) = result {
                stream.stop();
                debug!(target: "camera", ticket = ticket.id, stream = stream.id(), "stale stream released");
            }
            return Ok(StartOutcome::Superseded);
        }

        match result {
            Ok(stream) => {
                info!(target: "camera", stream = stream.id(), facing = self.facing.as_str(), "camera streaming");
                self.stream = Some(stream);
                self.state = CaptureState::Streaming;
                Ok(StartOutcome::Bound)
            }
            Err(error) => {
                warn!(target: "camera", error = %error, "error accessing the camera");
                self.state = CaptureState::Failed {
                    reason: error.to_string(),
                };
                Err(error)
            }
        }
    }

    /// Acquires and binds a stream in one step.
    ///
    /// Holds `&mut self` across the acquisition; callers sharing the
    /// controller should use the ticket API instead.
    ///
    /// # Errors
    /// See [`CaptureController::complete_start`].
    pub async fn start(
        &mut self,
        backend: &dyn CameraBackend,
        facing: FacingMode,
    ) -> Result<StartOutcome, CaptureError> {
        let ticket = self.begin_start(facing);
        let result = backend.acquire(ticket.constraints).await;
        self.complete_start(ticket, result)
    }

    /// Toggles facing preference and begins a restart with it.
    ///
    /// # Errors
    /// Returns [`CaptureError::SwitchUnavailable`] on non-mobile devices.
    pub fn switch_facing(&mut self) -> Result<StartTicket, CaptureError> {
        if !self.can_switch_facing() {
            return Err(CaptureError::SwitchUnavailable);
        }
        Ok(self.begin_start(self.facing.toggled()))
    }

    /// Samples the live stream into a snapshot and freezes the view.
    ///
    /// # Errors
    /// Returns [`CaptureError::NotStreaming`] unless the controller is
    /// streaming, or frame/encoding errors from the stream.
    pub fn freeze(&mut self) -> Result<Snapshot, CaptureError> {
        let stream = match (&self.state, &self.stream) {
            (CaptureState::Streaming, Some(stream)) => stream,
            _ => return Err(CaptureError::NotStreaming),
        };

        let frame = stream.current_frame()?;
        let snapshot = encode_snapshot(&frame)?;
        info!(target: "camera", stream = stream.id(), "frame frozen");
        self.state = CaptureState::Frozen;
        Ok(snapshot)
    }

    /// Releases the bound stream and voids in-flight starts.
    pub fn shutdown(&mut self) {
        self.release_stream();
        self.latest_ticket += 1;
        self.state = CaptureState::NoStream;
    }

    fn release_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
            debug!(target: "camera", stream = stream.id(), "stream released");
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.release_stream();
    }
}

/// Draws a frame onto the fixed snapshot raster and encodes it as PNG.
///
/// The frame is stretched to `SNAPSHOT_WIDTH x SNAPSHOT_HEIGHT` regardless of
/// its aspect ratio.
///
/// # Errors
/// Returns [`CaptureError::Encode`] when PNG encoding fails.
pub fn encode_snapshot(frame: &RgbaImage) -> Result<Snapshot, CaptureError> {
    let raster = if frame.dimensions() == (SNAPSHOT_WIDTH, SNAPSHOT_HEIGHT) {
        frame.clone()
    } else {
        imageops::resize(frame, SNAPSHOT_WIDTH, SNAPSHOT_HEIGHT, FilterType::Triangle)
    };

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(
            raster.as_raw(),
            SNAPSHOT_WIDTH,
            SNAPSHOT_HEIGHT,
            ExtendedColorType::Rgba8,
        )
        .map_err(|error| CaptureError::Encode(error.to_string()))?;

    Snapshot::from_bytes(SNAPSHOT_MEDIA_TYPE, &png)
        .map_err(|error| CaptureError::Encode(error.to_string()))
}

/// Deterministic synthetic camera for tests, CI and camera-less hosts.
///
/// Each facing mode renders a distinct solid colour so tests can tell which
/// stream was frozen.
#[derive(Debug)]
pub struct SyntheticCameraBackend {
    width: u32,
    height: u32,
    deny: AtomicBool,
    sequence: AtomicU64,
    latency: Mutex<Vec<(Option<FacingMode>, Duration)>>,
    requested: Mutex<Vec<VideoConstraints>>,
    live_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl SyntheticCameraBackend {
    /// Creates a synthetic camera producing 640x480 frames.
    pub fn new() -> Self {
        Self::with_resolution(640, 480)
    }

    /// Creates a synthetic camera with caller-provided frame size.
    pub fn with_resolution(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            deny: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            latency: Mutex::new(Vec::new()),
            requested: Mutex::new(Vec::new()),
            live_flags: Mutex::new(Vec::new()),
        }
    }

    /// Makes subsequent acquisitions fail with a permission error.
    pub fn set_permission_denied(&self, denied: bool) {
        self.deny.store(denied, Ordering::SeqCst);
    }

    /// Delays acquisitions requesting `facing` by `delay`.
    pub fn set_latency(&self, facing: Option<FacingMode>, delay: Duration) {
        if let Ok(mut latency) = self.latency.lock() {
            latency.retain(|(entry, _)| *entry != facing);
            latency.push((facing, delay));
        }
    }

    /// Returns every constraint set requested so far, in order.
    pub fn requested_constraints(&self) -> Vec<VideoConstraints> {
        self.requested
            .lock()
            .map(|requested| requested.clone())
            .unwrap_or_default()
    }

    /// Returns how many handed-out streams are still running.
    pub fn live_streams(&self) -> usize {
        self.live_flags
            .lock()
            .map(|flags| flags.iter().filter(|flag| flag.load(Ordering::SeqCst)).count())
            .unwrap_or_default()
    }

    fn latency_for(&self, facing: Option<FacingMode>) -> Option<Duration> {
        self.latency.lock().ok().and_then(|latency| {
            latency
                .iter()
                .find(|(entry, _)| *entry == facing)
                .map(|(_, delay)| *delay)
        })
    }
}

impl Default for SyntheticCameraBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraBackend for SyntheticCameraBackend {
    async fn acquire(
        &self,
        constraints: VideoConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(constraints);
        }

        if let Some(delay) = self.latency_for(constraints.facing_mode) {
            tokio::time::sleep(delay).await;
        }

        if self.deny.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied(
                "camera permission denied".to_string(),
            ));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let live = Arc::new(AtomicBool::new(true));
        self.live_flags
            .lock()
            .map_err(|_| CaptureError::Backend("synthetic stream registry poisoned".to_string()))?
            .push(Arc::clone(&live));

        Ok(Box::new(SyntheticStream {
            id: format!("synthetic-{sequence}"),
            fill: synthetic_fill(constraints.facing_mode),
            width: self.width,
            height: self.height,
            live,
        }))
    }
}

/// Solid colour rendered by [`SyntheticCameraBackend`] for a facing mode.
pub fn synthetic_fill(facing: Option<FacingMode>) -> Rgba<u8> {
    match facing {
        Some(FacingMode::Environment) => Rgba([32, 160, 64, 255]),
        Some(FacingMode::User) => Rgba([200, 48, 48, 255]),
        None => Rgba([48, 48, 200, 255]),
    }
}

struct SyntheticStream {
    id: String,
    fill: Rgba<u8>,
    width: u32,
    height: u32,
    live: Arc<AtomicBool>,
}

impl MediaStream for SyntheticStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn current_frame(&self) -> Result<RgbaImage, CaptureError> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(CaptureError::StreamEnded);
        }
        Ok(RgbaImage::from_pixel(self.width, self.height, self.fill))
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Location provider serving a fixed, optionally absent, position.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLocationProvider {
    position: Option<Coordinates>,
}

impl FixedLocationProvider {
    /// Creates a provider that always reports `position`.
    pub fn new(position: Coordinates) -> Self {
        Self {
            position: Some(position),
        }
    }

    /// Creates a provider that always fails, as when access is denied.
    pub fn unavailable() -> Self {
        Self { position: None }
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_position(&self) -> Result<Coordinates, CaptureError> {
        self.position.ok_or_else(|| {
            CaptureError::LocationUnavailable("no position source configured".to_string())
        })
    }
}

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// User or platform denied camera access.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    /// No camera is attached.
    #[error("no camera available")]
    NoCamera,
    /// No camera satisfies the requested constraints.
    #[error("camera constraints not satisfiable: {0}")]
    Overconstrained(String),
    /// Camera switching requested on a non-mobile device.
    #[error("camera switching is only available on mobile devices")]
    SwitchUnavailable,
    /// Freeze requested without a live stream.
    #[error("no live stream to capture from")]
    NotStreaming,
    /// Stream was stopped before a frame was read.
    #[error("stream has ended")]
    StreamEnded,
    /// Snapshot encoding failed.
    #[error("snapshot encoding failed: {0}")]
    Encode(String),
    /// Geolocation failed or was denied.
    #[error("location unavailable: {0}")]
    LocationUnavailable(String),
    /// Backend runtime failure.
    #[error("camera backend failure: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for controller transitions and synthetic capture.

    use super::*;

    fn mobile() -> CaptureController {
        CaptureController::new(DeviceClass::Mobile)
    }

    #[tokio::test]
    async fn start_binds_stream_and_freeze_produces_png() {
        let backend = SyntheticCameraBackend::new();
        let mut controller = mobile();

        let outcome = controller
            .start(&backend, FacingMode::Environment)
            .await
            .expect("start should succeed");
        assert_eq!(outcome, StartOutcome::Bound);
        assert_eq!(controller.state(), &CaptureState::Streaming);

        let snapshot = controller.freeze().expect("freeze should work");
        assert_eq!(controller.state(), &CaptureState::Frozen);
        assert_eq!(snapshot.media_type(), "image/png");

        let png = snapshot.decode().expect("decode").bytes;
        let image = image::load_from_memory(&png).expect("png should load");
        assert_eq!(image.width(), SNAPSHOT_WIDTH);
        assert_eq!(image.height(), SNAPSHOT_HEIGHT);
    }

    #[test]
    fn freeze_without_stream_is_rejected() {
        let mut controller = mobile();
        assert!(matches!(controller.freeze(), Err(CaptureError::NotStreaming)));
    }

    #[test]
    fn switch_facing_twice_restores_preference() {
        let mut controller = mobile();
        let original = controller.facing();
        controller.switch_facing().expect("mobile can switch");
        assert_eq!(controller.facing(), FacingMode::User);
        controller.switch_facing().expect("mobile can switch");
        assert_eq!(controller.facing(), original);
    }

    #[test]
    fn desktop_cannot_switch_and_is_unconstrained() {
        let mut controller = CaptureController::new(DeviceClass::Desktop);
        assert!(matches!(
            controller.switch_facing(),
            Err(CaptureError::SwitchUnavailable)
        ));
        let ticket = controller.begin_start(FacingMode::User);
        assert_eq!(ticket.constraints.facing_mode, None);
    }

    #[tokio::test]
    async fn stale_ticket_releases_its_stream() {
        let backend = SyntheticCameraBackend::new();
        let mut controller = mobile();

        let first = controller.begin_start(FacingMode::Environment);
        let second = controller.switch_facing().expect("mobile can switch");

        let newer = backend.acquire(second.constraints).await;
        let older = backend.acquire(first.constraints).await;

        assert_eq!(
            controller.complete_start(second, newer).expect("bind"),
            StartOutcome::Bound
        );
        assert_eq!(
            controller.complete_start(first, older).expect("stale"),
            StartOutcome::Superseded
        );
        assert_eq!(backend.live_streams(), 1);
        assert_eq!(controller.facing(), FacingMode::User);
    }

    #[tokio::test]
    async fn restart_stops_previous_stream_first() {
        let backend = SyntheticCameraBackend::new();
        let mut controller = mobile();
        controller
            .start(&backend, FacingMode::Environment)
            .await
            .expect("first start");
        controller
            .start(&backend, FacingMode::Environment)
            .await
            .expect("second start");
        assert_eq!(backend.live_streams(), 1);

        controller.shutdown();
        assert_eq!(backend.live_streams(), 0);
        assert_eq!(controller.state(), &CaptureState::NoStream);
    }

    #[tokio::test]
    async fn denied_start_is_an_observable_retryable_state() {
        let backend = SyntheticCameraBackend::new();
        backend.set_permission_denied(true);
        let mut controller = mobile();

        let error = controller
            .start(&backend, FacingMode::Environment)
            .await
            .expect_err("start should fail");
        assert!(matches!(error, CaptureError::PermissionDenied(_)));
        assert!(matches!(controller.state(), CaptureState::Failed { .. }));

        backend.set_permission_denied(false);
        controller
            .start(&backend, FacingMode::Environment)
            .await
            .expect("retry should succeed");
        assert_eq!(controller.state(), &CaptureState::Streaming);
    }

    #[tokio::test]
    async fn fixed_location_provider_reports_configuration() {
        let coords = Coordinates {
            latitude: 48.85,
            longitude: 2.35,
        };
        assert_eq!(
            FixedLocationProvider::new(coords)
                .current_position()
                .await
                .expect("position"),
            coords
        );
        assert!(
            FixedLocationProvider::unavailable()
                .current_position()
                .await
                .is_err()
        );
    }
}
