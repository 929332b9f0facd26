#![warn(missing_docs)]
//! # geosnap-app
//!
//! ## Purpose
//! Orchestrates camera capture, the submission form, upload, and the install
//! affordance for the `geosnap` widget.
//!
//! ## Responsibilities
//! - Wire subsystems into one [`CameraCapture`] widget with mount/unmount
//!   lifecycle.
//! - Load runtime configuration from the environment.
//! - Initialise structured logging.
//!
//! ## Data flow
//! Mount -> camera start + one-shot geolocation + platform subscription ->
//! capture -> form input -> upload -> reset + camera restart.
//!
//! ## Ownership and lifetimes
//! Widget state lives behind one mutex that is never held across an `.await`,
//! so camera, geolocation and upload I/O never block state reads.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`]. Every failure path also
//! produces a user notice or an observable state; none is fatal.

mod component;

use std::time::Duration;

use geosnap_capture::CaptureError;
use geosnap_core::Coordinates;
use geosnap_ui::FormField;
use geosnap_upload::UploadError;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub use component::{CameraCapture, LocationStatus, WidgetDeps};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("GEOSNAP_VERSION");

/// User agent assumed when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) geosnap";

/// Default upload request timeout.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Default tracing filter directive.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// User agent used for device-class detection.
    pub user_agent: String,
    /// Position served by the location provider; `None` means unavailable.
    pub fixed_position: Option<Coordinates>,
    /// Tracing filter directive.
    pub log_filter: String,
    /// Upload request timeout.
    pub upload_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fixed_position: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

impl AppConfig {
    /// Reads configuration from process environment.
    ///
    /// Semantics:
    /// - `GEOSNAP_USER_AGENT`: device-class detection input.
    /// - `GEOSNAP_LATITUDE` + `GEOSNAP_LONGITUDE`: both must parse as finite
    ///   degrees in range, else geolocation is unavailable.
    /// - `GEOSNAP_LOG`: tracing filter.
    /// - `GEOSNAP_UPLOAD_TIMEOUT_SECS`: positive integer seconds.
    ///
    /// Unset or invalid values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_blank = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let latitude = non_blank("GEOSNAP_LATITUDE").and_then(|raw| parse_degrees(&raw, 90.0));
        let longitude = non_blank("GEOSNAP_LONGITUDE").and_then(|raw| parse_degrees(&raw, 180.0));
        let fixed_position = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        };

        let upload_timeout = non_blank("GEOSNAP_UPLOAD_TIMEOUT_SECS")
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.upload_timeout);

        Self {
            user_agent: non_blank("GEOSNAP_USER_AGENT").unwrap_or(defaults.user_agent),
            fixed_position,
            log_filter: non_blank("GEOSNAP_LOG").unwrap_or(defaults.log_filter),
            upload_timeout,
        }
    }
}

fn parse_degrees(raw: &str, limit: f64) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && value.abs() <= limit)
}

/// Installs the global `tracing` subscriber.
///
/// Invalid filter directives fall back to [`DEFAULT_LOG_FILTER`]. Calling this
/// twice is harmless; the first subscriber stays installed.
pub fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Camera or geolocation failure.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    /// Upload failure, including a missing photo.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    /// A required text field is blank.
    #[error("required field is empty: {}", .0.label())]
    MissingField(FormField),
}
