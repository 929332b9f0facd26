#![warn(missing_docs)]
//! # geosnap-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `geosnap` workspace.
//!
//! ## Responsibilities
//! - Represent camera facing preferences and device classes.
//! - Hold captured stills as displayable `data:` URLs and decode them back
//!   into binary payloads.
//! - Synthesize deterministic upload file names from a timestamp.
//! - Describe one submission (text fields, snapshot, optional coordinates).
//!
//! ## Data flow
//! Capture code encodes a frame into a [`Snapshot`]. Form state keeps it until
//! submit, when it is bundled into a [`SubmissionRecord`] and decoded via
//! [`Snapshot::decode`] for multipart assembly.
//!
//! ## Ownership and lifetimes
//! Snapshots own their encoded string so they can be moved between the form,
//! the upload task, and UI projections without borrowing the capture surface.
//!
//! ## Error model
//! Malformed data URLs, unsupported encodings and timestamp formatting
//! failures return [`CoreError`] variants.
//!
//! ## Example
//! ```rust
//! use geosnap_core::{FacingMode, Snapshot};
//!
//! assert_eq!(FacingMode::Environment.toggled().toggled(), FacingMode::Environment);
//!
//! let snapshot = Snapshot::from_bytes("image/png", &[1, 2, 3]).unwrap();
//! let decoded = snapshot.decode().unwrap();
//! assert_eq!(decoded.bytes, vec![1, 2, 3]);
//! assert_eq!(decoded.media_type, "image/png");
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Fixed width of the off-screen capture raster in pixels.
pub const SNAPSHOT_WIDTH: u32 = 300;

/// Fixed height of the off-screen capture raster in pixels.
pub const SNAPSHOT_HEIGHT: u32 = 200;

/// Media type produced by the lossless snapshot encoder.
pub const SNAPSHOT_MEDIA_TYPE: &str = "image/png";

const FILE_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[day]-[month]-[year] [hour]:[minute]");

/// Which physical camera a capture session targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera.
    #[default]
    Environment,
    /// Front camera.
    User,
}

impl FacingMode {
    /// Returns the opposite facing preference.
    pub fn toggled(self) -> Self {
        match self {
            Self::Environment => Self::User,
            Self::User => Self::Environment,
        }
    }

    /// Returns the constraint value used by media acquisition APIs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::User => "user",
        }
    }
}

/// Coarse device class; only mobile devices get facing constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Phone or tablet with selectable front/rear cameras.
    Mobile,
    /// Anything else.
    Desktop,
}

impl DeviceClass {
    /// Classifies a user-agent string.
    ///
    /// Mobile iff the agent mentions `Mobi` or `Android`, case-insensitively.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let lower = user_agent.to_ascii_lowercase();
        if lower.contains("mobi") || lower.contains("android") {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    /// Returns `true` for [`DeviceClass::Mobile`].
    pub fn is_mobile(self) -> bool {
        self == Self::Mobile
    }
}

/// Device position in floating-point degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Encoded still image held as a `data:<media type>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Snapshot {
    data_url: String,
    media_type_start: usize,
    media_type_end: usize,
}

impl Snapshot {
    /// Wraps already-encoded image bytes into a snapshot.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyMediaType`] when `media_type` is blank.
    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Result<Self, CoreError> {
        let media_type = media_type.trim();
        if media_type.is_empty() {
            return Err(CoreError::EmptyMediaType);
        }

        let data_url = format!("data:{media_type};base64,{}", BASE64.encode(bytes));
        Ok(Self {
            media_type_start: "data:".len(),
            media_type_end: "data:".len() + media_type.len(),
            data_url,
        })
    }

    /// Parses and validates a `data:` URL.
    ///
    /// # Errors
    /// - [`CoreError::MalformedDataUrl`] when the scheme or comma separator is
    ///   missing.
    /// - [`CoreError::UnsupportedEncoding`] when the header lacks `;base64`.
    /// - [`CoreError::EmptyMediaType`] when no media type is declared.
    pub fn from_data_url(data_url: impl Into<String>) -> Result<Self, CoreError> {
        let data_url = data_url.into();
        let (header, _) = data_url
            .split_once(',')
            .ok_or_else(|| CoreError::MalformedDataUrl("missing ',' separator".to_string()))?;
        let params = header
            .strip_prefix("data:")
            .ok_or_else(|| CoreError::MalformedDataUrl("missing 'data:' scheme".to_string()))?;

        if !params.split(';').skip(1).any(|param| param == "base64") {
            return Err(CoreError::UnsupportedEncoding);
        }

        let declared = params.split(';').next().unwrap_or_default();
        let media_type = declared.trim();
        if media_type.is_empty() {
            return Err(CoreError::EmptyMediaType);
        }

        // Offsets point at the trimmed media type inside the untouched URL.
        let media_type_start = "data:".len() + (declared.len() - declared.trim_start().len());
        Ok(Self {
            media_type_start,
            media_type_end: media_type_start + media_type.len(),
            data_url,
        })
    }

    /// Returns the full `data:` URL, suitable for display surfaces.
    pub fn as_data_url(&self) -> &str {
        &self.data_url
    }

    /// Returns the declared media type (for example `image/png`).
    pub fn media_type(&self) -> &str {
        &self.data_url[self.media_type_start..self.media_type_end]
    }

    /// Returns the file extension matching the declared media type.
    pub fn file_extension(&self) -> &'static str {
        extension_for_media_type(self.media_type())
    }

    /// Decodes the base64 payload into raw bytes, keeping the media type.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidBase64`] when the payload is not valid
    /// standard base64.
    pub fn decode(&self) -> Result<DecodedImage, CoreError> {
        let payload = self
            .data_url
            .split_once(',')
            .map(|(_, payload)| payload)
            .unwrap_or_default();
        let bytes = BASE64.decode(payload.trim())?;

        Ok(DecodedImage {
            media_type: self.media_type().to_string(),
            bytes,
        })
    }
}

impl TryFrom<String> for Snapshot {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_data_url(value)
    }
}

impl From<Snapshot> for String {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.data_url
    }
}

/// Binary image payload recovered from a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Declared media type, carried into the multipart part header.
    pub media_type: String,
    /// Raw encoded image bytes.
    pub bytes: Vec<u8>,
}

/// Maps a media type to the extension used in upload file names.
pub fn extension_for_media_type(media_type: &str) -> &'static str {
    match media_type.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// Builds the upload file name `img-DD-MM-YYYY HH:MM.<ext>`.
///
/// The timestamp is used as given; callers pass local wall-clock time.
///
/// # Errors
/// Returns [`CoreError::Timestamp`] when formatting fails.
pub fn snapshot_file_name(at: OffsetDateTime, extension: &str) -> Result<String, CoreError> {
    let stamp = at.format(FILE_STAMP)?;
    Ok(format!("img-{stamp}.{extension}"))
}

/// Formats an optional coordinate for a text form field.
///
/// Absent coordinates serialize as an empty string.
pub fn coordinate_field(value: Option<f64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

/// One ephemeral submission assembled at submit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Free-text location entered by the user.
    pub location: String,
    /// Free-text description, sent as `comment`.
    pub description: String,
    /// Captured still; `None` means submission must be rejected locally.
    pub snapshot: Option<Snapshot>,
    /// Device position, absent when geolocation failed or was denied.
    pub coordinates: Option<Coordinates>,
}

impl SubmissionRecord {
    /// Returns the latitude form value (empty when unknown).
    pub fn latitude_field(&self) -> String {
        coordinate_field(self.coordinates.map(|coords| coords.latitude))
    }

    /// Returns the longitude form value (empty when unknown).
    pub fn longitude_field(&self) -> String {
        coordinate_field(self.coordinates.map(|coords| coords.longitude))
    }
}

/// Error type for core model validation and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Data URL does not follow `data:<type>;base64,<payload>`.
    #[error("malformed data url: {0}")]
    MalformedDataUrl(String),
    /// Data URL payload is not base64 encoded.
    #[error("data url payload must be base64 encoded")]
    UnsupportedEncoding,
    /// No media type declared.
    #[error("media type is empty")]
    EmptyMediaType,
    /// Base64 payload failed to decode.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    /// Timestamp could not be rendered.
    #[error("timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),
}

#[cfg(test)]
mod tests {
    //! Unit tests for snapshot codec and naming rules.

    use super::*;
    use time::macros::datetime;

    #[test]
    fn file_name_is_zero_padded_day_month_year() {
        let name = snapshot_file_name(datetime!(2025-03-03 09:05 UTC), "png")
            .expect("formatting should succeed");
        assert_eq!(name, "img-03-03-2025 09:05.png");
    }

    #[test]
    fn file_name_uses_24_hour_clock() {
        let name = snapshot_file_name(datetime!(2024-12-31 23:59:58 +02:00), "jpg")
            .expect("formatting should succeed");
        assert_eq!(name, "img-31-12-2024 23:59.jpg");
    }

    #[test]
    fn parses_external_data_url() {
        let snapshot =
            Snapshot::from_data_url("data:image/jpeg;base64,AAEC").expect("data url should parse");
        assert_eq!(snapshot.media_type(), "image/jpeg");
        assert_eq!(snapshot.file_extension(), "jpg");
        assert_eq!(snapshot.decode().expect("decode").bytes, vec![0, 1, 2]);
    }

    #[test]
    fn padded_media_type_keeps_its_extension() {
        let snapshot = Snapshot::from_data_url("data: image/png ;base64,AAEC")
            .expect("padded media type should parse");
        assert_eq!(snapshot.media_type(), "image/png");
        assert_eq!(snapshot.file_extension(), "png");
        assert_eq!(snapshot.decode().expect("decode").media_type, "image/png");
        assert_eq!(snapshot.as_data_url(), "data: image/png ;base64,AAEC");
    }

    #[test]
    fn rejects_malformed_data_urls() {
        assert!(matches!(
            Snapshot::from_data_url("image/png;base64,AAEC"),
            Err(CoreError::MalformedDataUrl(_))
        ));
        assert!(matches!(
            Snapshot::from_data_url("data:image/png,AAEC"),
            Err(CoreError::UnsupportedEncoding)
        ));
        assert!(matches!(
            Snapshot::from_data_url("data:;base64,AAEC"),
            Err(CoreError::EmptyMediaType)
        ));
    }

    #[test]
    fn corrupt_payload_fails_on_decode() {
        let snapshot = Snapshot::from_data_url("data:image/png;base64,@@@").expect("header is fine");
        assert!(matches!(snapshot.decode(), Err(CoreError::InvalidBase64(_))));
    }

    #[test]
    fn detects_mobile_user_agents() {
        let android = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36";
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148";
        let desktop = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/130.0";
        assert_eq!(DeviceClass::from_user_agent(android), DeviceClass::Mobile);
        assert_eq!(DeviceClass::from_user_agent(iphone), DeviceClass::Mobile);
        assert_eq!(DeviceClass::from_user_agent(desktop), DeviceClass::Desktop);
    }

    #[test]
    fn missing_coordinates_serialize_empty() {
        let record = SubmissionRecord {
            location: "Dock 4".to_string(),
            description: "cracked pallet".to_string(),
            snapshot: None,
            coordinates: None,
        };
        assert_eq!(record.latitude_field(), "");
        assert_eq!(record.longitude_field(), "");
    }
}
