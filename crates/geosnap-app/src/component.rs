//! The capture-and-submit widget.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use geosnap_capture::{
    CameraBackend, CaptureController, CaptureState, LocationProvider, StartOutcome, StartTicket,
};
use geosnap_core::{Coordinates, DeviceClass, FacingMode};
use geosnap_ui::{
    FormState, InstallChoice, InstallPromptState, Notice, Notifier, PlatformEvent, PlatformEvents,
    StageStatus, Subscription, ViewState,
};
use geosnap_upload::{UploadClient, UploadError, UploadReport};
use tracing::{error, info, warn};

use crate::{APP_VERSION, AppError};

/// Observable geolocation state.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationStatus {
    /// Not requested yet, or request in flight.
    Pending,
    /// Position known.
    Available(Coordinates),
    /// Request failed or was denied; submissions carry empty coordinates.
    Unavailable(String),
}

impl LocationStatus {
    /// Returns coordinates when available.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            Self::Available(coordinates) => Some(*coordinates),
            _ => None,
        }
    }
}

/// External collaborators of the widget.
#[derive(Clone)]
pub struct WidgetDeps {
    /// Camera acquisition.
    pub camera: Arc<dyn CameraBackend>,
    /// One-shot geolocation.
    pub location: Arc<dyn LocationProvider>,
    /// Photo upload client.
    pub uploader: UploadClient,
    /// Notice surface.
    pub notifier: Arc<dyn Notifier>,
    /// Platform install events.
    pub platform: PlatformEvents,
}

struct WidgetState {
    capture: CaptureController,
    form: FormState,
    install: InstallPromptState,
    location: LocationStatus,
    upload: StageStatus,
}

/// Capture-and-submit widget instance.
pub struct CameraCapture {
    deps: WidgetDeps,
    state: Arc<Mutex<WidgetState>>,
    subscription: Mutex<Option<Subscription>>,
}

impl CameraCapture {
    /// Creates an unmounted widget; the user agent decides the device class.
    pub fn new(deps: WidgetDeps, user_agent: &str) -> Self {
        let device = DeviceClass::from_user_agent(user_agent);
        info!(target: "camera", device = ?device, "widget created");

        Self {
            deps,
            state: Arc::new(Mutex::new(WidgetState {
                capture: CaptureController::new(device),
                form: FormState::new(),
                install: InstallPromptState::new(),
                location: LocationStatus::Pending,
                upload: StageStatus::Idle,
            })),
            subscription: Mutex::new(None),
        }
    }

    /// Mounts the widget: subscribes to platform install events, starts the
    /// camera, and requests geolocation once.
    ///
    /// Camera and geolocation failures are recorded as state, not returned.
    pub async fn mount(&self) {
        self.subscribe_platform_events();

        let facing = self.lock().capture.facing();
        let (_, position) = tokio::join!(
            self.start_camera(facing),
            self.deps.location.current_position()
        );

        let status = match position {
            Ok(coordinates) => {
                info!(
                    target: "geolocation",
                    latitude = coordinates.latitude,
                    longitude = coordinates.longitude,
                    "position acquired"
                );
                LocationStatus::Available(coordinates)
            }
            Err(error) => {
                warn!(target: "geolocation", error = %error, "error fetching location");
                LocationStatus::Unavailable(error.to_string())
            }
        };
        self.lock().location = status;
    }

    /// Tears the widget down: deregisters platform listeners and releases the
    /// camera.
    pub fn unmount(&self) {
        if let Ok(mut subscription) = self.subscription.lock() {
            subscription.take();
        }
        self.lock().capture.shutdown();
        info!(target: "camera", "widget unmounted");
    }

    /// Starts (or restarts) the camera with `facing`.
    ///
    /// A later start supersedes this one if it completes first.
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] when acquisition fails; the failure is
    /// also visible as [`CaptureState::Failed`] and as a notice.
    pub async fn start_camera(&self, facing: FacingMode) -> Result<StartOutcome, AppError> {
        let ticket = self.lock().capture.begin_start(facing);
        self.acquire(ticket).await
    }

    /// Toggles front/rear camera and restarts the stream.
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] with
    /// [`geosnap_capture::CaptureError::SwitchUnavailable`]
    /// on non-mobile devices, or the acquisition error.
    pub async fn switch_camera(&self) -> Result<StartOutcome, AppError> {
        let ticket = self.lock().capture.switch_facing()?;
        self.acquire(ticket).await
    }

    async fn acquire(&self, ticket: StartTicket) -> Result<StartOutcome, AppError> {
        let result = self.deps.camera.acquire(ticket.constraints).await;
        let completed = self.lock().capture.complete_start(ticket, result);

        completed.map_err(|error| {
            self.deps
                .notifier
                .notify(Notice::CameraUnavailable(error.to_string()));
            AppError::Capture(error)
        })
    }

    /// Freezes the live view into the form's snapshot.
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] when no stream is live.
    pub fn capture_photo(&self) -> Result<(), AppError> {
        let mut state = self.lock();
        let snapshot = state.capture.freeze()?;
        state.form.set_snapshot(snapshot);
        Ok(())
    }

    /// Updates the location input.
    pub fn set_location(&self, value: impl Into<String>) {
        self.lock().form.set_location(value);
    }

    /// Updates the description input.
    pub fn set_description(&self, value: impl Into<String>) {
        self.lock().form.set_description(value);
    }

    /// Submits the form.
    ///
    /// Blank required fields and a missing photo are rejected locally with a
    /// notice and no network call. On success the form is reset and the
    /// camera restarted; on failure the form is left untouched for retry.
    ///
    /// # Errors
    /// - [`AppError::MissingField`] for a blank required field.
    /// - [`AppError::Upload`] with [`UploadError::MissingPhoto`] without a
    ///   snapshot, or the transport/server failure.
    pub async fn submit(&self) -> Result<UploadReport, AppError> {
        let record = {
            let mut state = self.lock();
            if let Some(field) = state.form.missing_required_field() {
                drop(state);
                self.deps.notifier.notify(Notice::MissingField(field));
                return Err(AppError::MissingField(field));
            }
            if !state.form.can_submit() {
                drop(state);
                self.deps.notifier.notify(Notice::MissingPhoto);
                return Err(AppError::Upload(UploadError::MissingPhoto));
            }
            state.upload = StageStatus::Running;
            state.form.to_record(state.location.coordinates())
        };

        match self.deps.uploader.submit(&record).await {
            Ok(report) => {
                let facing = {
                    let mut state = self.lock();
                    state.form.reset();
                    state.upload = StageStatus::Healthy;
                    state.capture.facing()
                };
                self.deps.notifier.notify(Notice::UploadSucceeded);

                if let Err(error) = self.start_camera(facing).await {
                    warn!(target: "camera", error = %error, "camera restart after upload failed");
                }
                Ok(report)
            }
            Err(upload_error) => {
                error!(
                    target: "upload",
                    detail = %upload_error.log_detail(),
                    "error uploading photo"
                );
                self.lock().upload = StageStatus::Degraded;
                self.deps.notifier.notify(Notice::UploadFailed);
                Err(AppError::Upload(upload_error))
            }
        }
    }

    /// Replays the deferred install prompt, if one is stored.
    ///
    /// Returns `None` when the platform never signalled installability.
    pub async fn accept_install(&self) -> Option<InstallChoice> {
        let prompt = self.lock().install.pending_prompt()?;
        let choice = prompt.prompt().await;
        match choice {
            InstallChoice::Accepted => info!(target: "install", "user accepted the install prompt"),
            InstallChoice::Dismissed => {
                info!(target: "install", "user dismissed the install prompt")
            }
        }
        self.lock().install.on_choice(choice);
        Some(choice)
    }

    /// Returns the current capture state.
    pub fn capture_state(&self) -> CaptureState {
        self.lock().capture.state().clone()
    }

    /// Returns the current facing preference.
    pub fn facing(&self) -> FacingMode {
        self.lock().capture.facing()
    }

    /// Returns a copy of the form.
    pub fn form(&self) -> FormState {
        self.lock().form.clone()
    }

    /// Returns the geolocation state.
    pub fn location_status(&self) -> LocationStatus {
        self.lock().location.clone()
    }

    /// Returns `true` when the install affordance is shown.
    pub fn install_visible(&self) -> bool {
        self.lock().install.is_visible()
    }

    /// Projects widget state for rendering.
    pub fn view(&self) -> ViewState {
        let state = self.lock();
        let preview = match state.capture.state() {
            CaptureState::Frozen => state
                .form
                .snapshot()
                .map(|snapshot| snapshot.as_data_url().to_string()),
            _ => None,
        };
        let camera = match state.capture.state() {
            CaptureState::NoStream => StageStatus::Idle,
            CaptureState::Starting => StageStatus::Running,
            CaptureState::Streaming | CaptureState::Frozen => StageStatus::Healthy,
            CaptureState::Failed { .. } => StageStatus::Degraded,
        };
        let geolocation = match state.location {
            LocationStatus::Pending => StageStatus::Running,
            LocationStatus::Available(_) => StageStatus::Healthy,
            LocationStatus::Unavailable(_) => StageStatus::Degraded,
        };

        ViewState {
            version: APP_VERSION.to_string(),
            show_live_view: preview.is_none(),
            show_switch_camera: preview.is_none() && state.capture.can_switch_facing(),
            preview,
            has_photo: state.form.snapshot().is_some(),
            show_install: state.install.is_visible(),
            location: state.form.location().to_string(),
            description: state.form.description().to_string(),
            camera,
            geolocation,
            upload: state.upload,
        }
    }

    fn subscribe_platform_events(&self) {
        let weak: Weak<Mutex<WidgetState>> = Arc::downgrade(&self.state);
        let subscription = self.deps.platform.subscribe(move |event| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let mut state = match state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            match event {
                PlatformEvent::BeforeInstallPrompt(prompt) => {
                    state.install.on_installable(Arc::clone(prompt));
                    info!(target: "install", "install prompt deferred");
                }
                PlatformEvent::AppInstalled => {
                    state.install.on_installed();
                    info!(target: "install", "app installed");
                }
            }
        });

        if let Ok(mut slot) = self.subscription.lock() {
            *slot = Some(subscription);
        }
    }

    fn lock(&self) -> MutexGuard<'_, WidgetState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.unmount();
    }
}
