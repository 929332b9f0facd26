//! Native camera backend built on `nokhwa`.
//!
//! `nokhwa::Camera` is `!Send`, so each stream owns a dedicated thread that
//! opens the device, keeps the latest decoded frame, and closes the device
//! once the stream is stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use geosnap_core::FacingMode;
use image::RgbaImage;
use nokhwa::Camera;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{CameraBackend, CaptureError, MediaStream, VideoConstraints};

const FRAME_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Camera backend for attached webcams.
///
/// Desktop cameras do not report which way they face, so facing constraints
/// map onto device indices.
#[derive(Debug, Clone, Copy)]
pub struct NativeCameraBackend {
    rear_index: u32,
    front_index: u32,
}

impl NativeCameraBackend {
    /// Uses device 0 for rear/unconstrained requests and device 1 for front.
    pub fn new() -> Self {
        Self::with_indices(0, 1)
    }

    /// Uses caller-provided device indices.
    pub fn with_indices(rear_index: u32, front_index: u32) -> Self {
        Self {
            rear_index,
            front_index,
        }
    }

    fn index_for(&self, constraints: VideoConstraints) -> u32 {
        match constraints.facing_mode {
            Some(FacingMode::User) => self.front_index,
            Some(FacingMode::Environment) | None => self.rear_index,
        }
    }
}

impl Default for NativeCameraBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraBackend for NativeCameraBackend {
    async fn acquire(
        &self,
        constraints: VideoConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        let index = self.index_for(constraints);
        let live = Arc::new(AtomicBool::new(true));
        let latest = Arc::new(Mutex::new(None::<RgbaImage>));
        let (ready_tx, ready_rx) = oneshot::channel();

        let worker_live = Arc::clone(&live);
        let worker_latest = Arc::clone(&latest);
        std::thread::Builder::new()
            .name(format!("geosnap-camera-{index}"))
            .spawn(move || run_camera(index, worker_live, worker_latest, ready_tx))
            .map_err(|error| CaptureError::Backend(format!("camera thread spawn failed: {error}")))?;

        ready_rx
            .await
            .map_err(|_| CaptureError::Backend("camera thread exited during open".to_string()))??;

        Ok(Box::new(NativeStream {
            id: format!("native-{index}"),
            live,
            latest,
        }))
    }
}

fn run_camera(
    index: u32,
    live: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<RgbaImage>>>,
    ready: oneshot::Sender<Result<(), CaptureError>>,
) {
    let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
        Ok(camera) => camera,
        Err(error) => {
            let _ = ready.send(Err(CaptureError::NoCamera));
            error!(target: "camera", device = index, error = %error, "failed to open camera");
            return;
        }
    };

    if let Err(error) = camera.open_stream() {
        let _ = ready.send(Err(CaptureError::Backend(format!(
            "failed to open camera stream: {error}"
        ))));
        return;
    }

    let format = camera.camera_format();
    info!(
        target: "camera",
        device = index,
        width = format.resolution().width_x,
        height = format.resolution().height_y,
        "native camera opened"
    );
    let _ = ready.send(Ok(()));

    while live.load(Ordering::SeqCst) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbAFormat>());
        match decoded {
            Ok(frame) => {
                let (width, height) = (frame.width(), frame.height());
                if let Some(image) = RgbaImage::from_raw(width, height, frame.into_raw())
                    && let Ok(mut slot) = latest.lock()
                {
                    *slot = Some(image);
                }
            }
            Err(error) => {
                warn!(target: "camera", device = index, error = %error, "frame read failed");
                std::thread::sleep(FRAME_RETRY_DELAY);
            }
        }
    }

    if let Err(error) = camera.stop_stream() {
        warn!(target: "camera", device = index, error = %error, "camera close failed");
    }
    debug!(target: "camera", device = index, "native camera closed");
}

struct NativeStream {
    id: String,
    live: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<RgbaImage>>>,
}

impl MediaStream for NativeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn current_frame(&self) -> Result<RgbaImage, CaptureError> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(CaptureError::StreamEnded);
        }

        self.latest
            .lock()
            .map_err(|_| CaptureError::Backend("frame slot poisoned".to_string()))?
            .clone()
            .ok_or_else(|| CaptureError::Backend("no frame received yet".to_string()))
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}
