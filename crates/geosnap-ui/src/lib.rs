#![warn(missing_docs)]
//! # geosnap-ui
//!
//! ## Purpose
//! Defines the UI-facing state of the capture widget: the submission form, the
//! install affordance, platform event subscriptions, and user notices.
//!
//! ## Responsibilities
//! - Hold the two required text fields and the captured snapshot.
//! - Track the deferred install prompt and its visibility.
//! - Deliver platform install events to scoped subscribers.
//! - Name the blocking notices shown to the user.
//!
//! ## Data flow
//! Input events mutate [`FormState`]; platform events flow through
//! [`PlatformEvents`] into [`InstallPromptState`]; the app projects all of it
//! into a [`ViewState`] for rendering.
//!
//! ## Ownership and lifetimes
//! [`Subscription`] holds only a weak reference to its hub, so dropping either
//! side never leaks the other. Dropping a subscription deregisters it.
//!
//! ## Error model
//! This crate favors explicit state over recoverable errors. Invalid
//! submissions are reported through guard methods and [`Notice`] values.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use geosnap_core::{Coordinates, Snapshot, SubmissionRecord};

/// Required text inputs of the submission form, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    /// Free-text location.
    Location,
    /// Free-text description.
    Description,
}

impl FormField {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Location => "Location",
            Self::Description => "Description",
        }
    }
}

/// Submission form contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    location: String,
    description: String,
    snapshot: Option<Snapshot>,
}

impl FormState {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the location text.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns the description text.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the captured snapshot, if any.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Replaces the location text.
    pub fn set_location(&mut self, value: impl Into<String>) {
        self.location = value.into();
    }

    /// Replaces the description text.
    pub fn set_description(&mut self, value: impl Into<String>) {
        self.description = value.into();
    }

    /// Stores a fresh snapshot, discarding any previous one.
    pub fn set_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshot = Some(snapshot);
    }

    /// Returns `true` iff a snapshot is present.
    pub fn can_submit(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Returns the first blank required field, as the input surface's
    /// `required` check would.
    pub fn missing_required_field(&self) -> Option<FormField> {
        if self.location.trim().is_empty() {
            Some(FormField::Location)
        } else if self.description.trim().is_empty() {
            Some(FormField::Description)
        } else {
            None
        }
    }

    /// Clears snapshot and both text fields.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Bundles the form with optional coordinates.
    pub fn to_record(&self, coordinates: Option<Coordinates>) -> SubmissionRecord {
        SubmissionRecord {
            location: self.location.clone(),
            description: self.description.clone(),
            snapshot: self.snapshot.clone(),
            coordinates,
        }
    }
}

/// User's answer to a replayed install prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallChoice {
    /// User installed the app.
    Accepted,
    /// User closed the prompt.
    Dismissed,
}

/// Platform install prompt whose native display was deferred.
#[async_trait]
pub trait DeferredPrompt: Send + Sync {
    /// Shows the native prompt and resolves with the user's choice.
    async fn prompt(&self) -> InstallChoice;
}

/// Install affordance state.
#[derive(Clone, Default)]
pub struct InstallPromptState {
    deferred: Option<Arc<dyn DeferredPrompt>>,
    visible: bool,
}

impl InstallPromptState {
    /// Creates hidden state with no stored prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the "Install" affordance is shown.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Returns `true` when a deferred prompt is stored.
    pub fn has_prompt(&self) -> bool {
        self.deferred.is_some()
    }

    /// Stores a deferred prompt and shows the affordance.
    pub fn on_installable(&mut self, prompt: Arc<dyn DeferredPrompt>) {
        self.deferred = Some(prompt);
        self.visible = true;
    }

    /// Hides the affordance once the app is installed.
    pub fn on_installed(&mut self) {
        self.deferred = None;
        self.visible = false;
    }

    /// Returns the stored prompt for replay without clearing it.
    pub fn pending_prompt(&self) -> Option<Arc<dyn DeferredPrompt>> {
        self.deferred.clone()
    }

    /// Clears the prompt and hides the affordance, whatever the choice was.
    pub fn on_choice(&mut self, _choice: InstallChoice) {
        self.deferred = None;
        self.visible = false;
    }
}

impl fmt::Debug for InstallPromptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallPromptState")
            .field("has_prompt", &self.deferred.is_some())
            .field("visible", &self.visible)
            .finish()
    }
}

/// Install-related platform signals.
#[derive(Clone)]
pub enum PlatformEvent {
    /// The page became installable; the native prompt was suppressed.
    BeforeInstallPrompt(Arc<dyn DeferredPrompt>),
    /// The app was installed.
    AppInstalled,
}

impl fmt::Debug for PlatformEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeInstallPrompt(_) => f.write_str("BeforeInstallPrompt"),
            Self::AppInstalled => f.write_str("AppInstalled"),
        }
    }
}

type Listener = Arc<dyn Fn(&PlatformEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Fan-out hub for platform events.
#[derive(Clone, Default)]
pub struct PlatformEvents {
    registry: Arc<Mutex<ListenerRegistry>>,
}

impl PlatformEvents {
    /// Creates a hub with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` until the returned subscription is dropped.
    pub fn subscribe(
        &self,
        listener: impl Fn(&PlatformEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = match self.registry.lock() {
            Ok(registry) => registry,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push((id, Arc::new(listener)));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    /// Delivers `event` to every current listener; returns how many ran.
    ///
    /// Listeners run outside the registry lock and may subscribe or drop
    /// subscriptions themselves.
    pub fn emit(&self, event: &PlatformEvent) -> usize {
        let listeners: Vec<Listener> = match self.registry.lock() {
            Ok(registry) => registry
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect(),
            Err(_) => return 0,
        };

        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry
            .lock()
            .map(|registry| registry.listeners.len())
            .unwrap_or_default()
    }
}

/// Scoped listener registration; dropping it deregisters the listener.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<ListenerRegistry>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade()
            && let Ok(mut registry) = registry.lock()
        {
            registry.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Blocking notices shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Submit pressed before a photo was captured.
    MissingPhoto,
    /// Submit pressed with a blank required field.
    MissingField(FormField),
    /// Upload accepted by the server.
    UploadSucceeded,
    /// Upload failed; form state kept for retry.
    UploadFailed,
    /// Camera could not be started.
    CameraUnavailable(String),
}

impl Notice {
    /// Returns the text shown to the user.
    pub fn message(&self) -> String {
        match self {
            Self::MissingPhoto => "Please capture a photo.".to_string(),
            Self::MissingField(field) => format!("Please fill in the {} field.", field.label()),
            Self::UploadSucceeded => "Photo uploaded successfully!".to_string(),
            Self::UploadFailed => "Failed to upload photo.".to_string(),
            Self::CameraUnavailable(reason) => format!("Camera unavailable: {reason}"),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Surface that displays notices.
pub trait Notifier: Send + Sync {
    /// Shows one notice.
    fn notify(&self, notice: Notice);
}

/// Notifier that queues notices for later display.
#[derive(Debug, Default)]
pub struct NoticeLog {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns queued notices without clearing them.
    pub fn snapshot(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }

    /// Removes and returns queued notices.
    pub fn drain(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|mut notices| std::mem::take(&mut *notices))
            .unwrap_or_default()
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

/// Generic stage status used for camera, location and upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage has not started.
    Idle,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Healthy,
    /// Stage encountered a non-fatal error.
    Degraded,
}

/// Flat projection of the widget for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    /// App version string sourced from root `VERSION`.
    pub version: String,
    /// `data:` URL of the frozen still; `None` shows the live view.
    pub preview: Option<String>,
    /// Whether the form holds a snapshot that the next submit uploads, even
    /// while the live view is shown again.
    pub has_photo: bool,
    /// Whether the live view (and capture button) is shown.
    pub show_live_view: bool,
    /// Whether the "Switch Camera" button is shown.
    pub show_switch_camera: bool,
    /// Whether the "Install App" button is shown.
    pub show_install: bool,
    /// Location input value.
    pub location: String,
    /// Description input value.
    pub description: String,
    /// Camera stage status.
    pub camera: StageStatus,
    /// Geolocation stage status.
    pub geolocation: StageStatus,
    /// Upload stage status.
    pub upload: StageStatus,
}
