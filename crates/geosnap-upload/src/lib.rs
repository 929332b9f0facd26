#![warn(missing_docs)]
//! # geosnap-upload
//!
//! ## Purpose
//! Turns a [`SubmissionRecord`] into a `multipart/form-data` request and sends
//! it to the photo ingest endpoint.
//!
//! ## Responsibilities
//! - Validate the ingest endpoint policy (HTTPS, `/upload_image` path).
//! - Decode the snapshot and name the upload after the local capture time.
//! - Lay out the ingest fields in wire order as a [`MultipartForm`].
//! - Send through an injectable transport and classify the response.
//!
//! ## Data flow
//! [`UploadClient::submit`] -> [`build_upload_form`] -> [`UploadEnvelope`] ->
//! [`UploadTransport::send`] -> [`UploadReport`] or [`UploadError`].
//!
//! ## Ownership and lifetimes
//! Envelopes are handed to transports by value; [`HttpTransport`] moves the
//! photo bytes straight into a `reqwest` multipart part, which owns the
//! boundary and body framing.
//!
//! ## Error model
//! A missing photo fails before any transport call. Transport failures and
//! non-2xx responses are terminal for the attempt; there is no retry.
//!
//! ## Security and privacy notes
//! Image bytes are never logged. Reports carry a SHA-256 digest instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geosnap_core::{CoreError, SubmissionRecord, snapshot_file_name};
use reqwest::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};
use url::Url;

/// Fixed ingest endpoint receiving photo submissions.
pub const UPLOAD_ENDPOINT: &str = "https://axayp.pythonanywhere.com/upload_image";

/// Required ingest path suffix.
pub const REQUIRED_UPLOAD_PATH: &str = "/upload_image";

/// Payload of one multipart field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Plain text value.
    Text(String),
    /// Binary file part.
    File {
        /// File name announced in `Content-Disposition`.
        file_name: String,
        /// Part content type.
        content_type: String,
        /// Raw file bytes.
        bytes: Vec<u8>,
    },
}

impl FieldValue {
    /// Payload size in bytes, without multipart framing.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(value) => value.len(),
            Self::File { bytes, .. } => bytes.len(),
        }
    }

    /// Returns `true` for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named multipart field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    /// Form field name.
    pub name: String,
    /// Field payload.
    pub value: FieldValue,
}

/// Ordered multipart form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    fields: Vec<FormField>,
}

impl MultipartForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(FormField {
            name: name.into(),
            value: FieldValue::Text(value.into()),
        });
        self
    }

    /// Appends a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.fields.push(FormField {
            name: name.into(),
            value: FieldValue::File {
                file_name: file_name.into(),
                content_type: content_type.into(),
                bytes,
            },
        });
        self
    }

    /// Returns fields in insertion order.
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Consumes the form, yielding fields in insertion order.
    pub fn into_fields(self) -> Vec<FormField> {
        self.fields
    }

    /// Returns the first field named `name`.
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns the value of text field `name`.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        match self.field(name).map(|field| &field.value) {
            Some(FieldValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// Sum of field payload sizes in bytes.
    pub fn payload_len(&self) -> usize {
        self.fields.iter().map(|field| field.value.len()).sum()
    }

    /// Converts the form into a `reqwest` multipart body, keeping field order.
    ///
    /// # Errors
    /// Returns [`UploadError::Transport`] when a file part carries an
    /// unparsable content type.
    pub fn into_multipart(self) -> Result<Form, UploadError> {
        let mut form = Form::new();
        for field in self.fields {
            form = match field.value {
                FieldValue::Text(value) => form.text(field.name, value),
                FieldValue::File {
                    file_name,
                    content_type,
                    bytes,
                } => {
                    let part = Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str(&content_type)
                        .map_err(|error| {
                            UploadError::Transport(format!(
                                "invalid content type '{content_type}': {error}"
                            ))
                        })?;
                    form.part(field.name, part)
                }
            };
        }
        Ok(form)
    }
}

/// Request handed to a transport.
#[derive(Debug, Clone)]
pub struct UploadEnvelope {
    /// Target URL.
    pub endpoint: String,
    /// Ingest fields in wire order.
    pub form: MultipartForm,
}

/// Raw response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

/// Abstract transport used by the upload client.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Sends one request.
    ///
    /// # Errors
    /// Returns [`UploadError::Timeout`] or [`UploadError::Transport`] when no
    /// response was received. Non-2xx responses are returned as `Ok`.
    async fn send(&self, envelope: UploadEnvelope) -> Result<TransportResponse, UploadError>;
}

/// `reqwest` based HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a whole-request timeout.
    ///
    /// # Errors
    /// Returns [`UploadError::Transport`] when the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("geosnap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| UploadError::Transport(format!("http client setup failed: {error}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send(&self, envelope: UploadEnvelope) -> Result<TransportResponse, UploadError> {
        let UploadEnvelope { endpoint, form } = envelope;
        let multipart = form.into_multipart()?;
        debug!(target: "upload", boundary = multipart.boundary(), "multipart body prepared");

        let response = self
            .client
            .post(&endpoint)
            .multipart(multipart)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> UploadError {
    if error.is_timeout() {
        UploadError::Timeout
    } else {
        UploadError::Transport(error.to_string())
    }
}

/// Outcome of an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// HTTP status returned by the ingest endpoint.
    pub status: u16,
    /// File name given to the photo part.
    pub file_name: String,
    /// Field payload size in bytes, excluding multipart framing.
    pub payload_bytes: usize,
    /// Lowercase hex SHA-256 of the photo bytes.
    pub photo_sha256: String,
}

/// Upload client bound to a validated endpoint.
#[derive(Clone)]
pub struct UploadClient {
    endpoint: String,
    transport: Arc<dyn UploadTransport>,
}

impl UploadClient {
    /// Creates a validated upload client.
    ///
    /// # Errors
    /// Returns [`UploadError::InvalidEndpoint`] when the URL is not HTTPS or
    /// does not end with `/upload_image`.
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn UploadTransport>,
    ) -> Result<Self, UploadError> {
        let endpoint = endpoint.into();
        validate_upload_endpoint(&endpoint)?;
        Ok(Self {
            endpoint,
            transport,
        })
    }

    /// Returns configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submits a record, naming the photo after the current local time.
    ///
    /// # Errors
    /// See [`UploadClient::submit_at`].
    pub async fn submit(&self, record: &SubmissionRecord) -> Result<UploadReport, UploadError> {
        self.submit_at(record, local_now()).await
    }

    /// Submits a record, naming the photo after `captured_at`.
    ///
    /// # Errors
    /// - [`UploadError::MissingPhoto`] without any transport call when the
    ///   record has no snapshot.
    /// - [`UploadError::Snapshot`] when the snapshot cannot be decoded.
    /// - [`UploadError::Timeout`] / [`UploadError::Transport`] on network
    ///   failure, [`UploadError::Rejected`] on non-2xx status.
    pub async fn submit_at(
        &self,
        record: &SubmissionRecord,
        captured_at: OffsetDateTime,
    ) -> Result<UploadReport, UploadError> {
        let prepared = build_upload_form(record, captured_at)?;
        let payload_bytes = prepared.form.payload_len();
        debug!(
            target: "upload",
            file_name = %prepared.file_name,
            bytes = payload_bytes,
            "sending photo"
        );

        let envelope = UploadEnvelope {
            endpoint: self.endpoint.clone(),
            form: prepared.form,
        };
        let response = self.transport.send(envelope).await?;
        if !(200..300).contains(&response.status) {
            return Err(UploadError::Rejected {
                status: response.status,
                detail: extract_server_detail(&response.body),
            });
        }

        info!(
            target: "upload",
            status = response.status,
            file_name = %prepared.file_name,
            photo_sha256 = %prepared.photo_sha256,
            "photo uploaded"
        );
        Ok(UploadReport {
            status: response.status,
            file_name: prepared.file_name,
            payload_bytes,
            photo_sha256: prepared.photo_sha256,
        })
    }
}

/// Multipart form plus derived naming/digest metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpload {
    /// The form in wire order.
    pub form: MultipartForm,
    /// File name of the `photo` part.
    pub file_name: String,
    /// Lowercase hex SHA-256 of the photo bytes.
    pub photo_sha256: String,
}

/// Builds the ingest form for `record`.
///
/// Field order: `photo`, `location`, `comment`, `latitude`, `longitude`.
///
/// # Errors
/// Returns [`UploadError::MissingPhoto`] when no snapshot is present and
/// [`UploadError::Snapshot`] when it cannot be decoded or named.
pub fn build_upload_form(
    record: &SubmissionRecord,
    captured_at: OffsetDateTime,
) -> Result<PreparedUpload, UploadError> {
    let snapshot = record.snapshot.as_ref().ok_or(UploadError::MissingPhoto)?;
    let image = snapshot.decode()?;
    let file_name = snapshot_file_name(captured_at, snapshot.file_extension())?;
    let photo_sha256 = hex::encode(Sha256::digest(&image.bytes));

    let form = MultipartForm::new()
        .file("photo", file_name.clone(), image.media_type, image.bytes)
        .text("location", record.location.clone())
        .text("comment", record.description.clone())
        .text("latitude", record.latitude_field())
        .text("longitude", record.longitude_field());

    Ok(PreparedUpload {
        form,
        file_name,
        photo_sha256,
    })
}

/// Validates ingest endpoint constraints.
///
/// # Errors
/// Returns [`UploadError::InvalidEndpoint`] for non-HTTPS or path mismatch.
pub fn validate_upload_endpoint(endpoint: &str) -> Result<(), UploadError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| UploadError::InvalidEndpoint(format!("invalid upload url: {error}")))?;

    if parsed.scheme() != "https" {
        return Err(UploadError::InvalidEndpoint(
            "upload endpoint must use https".to_string(),
        ));
    }

    if !parsed.path().ends_with(REQUIRED_UPLOAD_PATH) {
        return Err(UploadError::InvalidEndpoint(format!(
            "upload endpoint path must end with {REQUIRED_UPLOAD_PATH}"
        )));
    }

    Ok(())
}

/// Extracts a human-readable error detail from a response body.
///
/// Prefers a JSON `error`, `message`, or `detail` string; otherwise returns
/// the trimmed body. Blank bodies yield `None`.
pub fn extract_server_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(serde_json::Value::Object(object)) = serde_json::from_str(trimmed) {
        for key in ["error", "message", "detail"] {
            if let Some(serde_json::Value::String(detail)) = object.get(key) {
                return Some(detail.clone());
            }
        }
    }

    Some(trimmed.to_string())
}

/// Current local wall-clock time.
///
/// Read through `chrono`, which resolves the zone from `TZ` or the system zone
/// file on any thread. Falls back to UTC only when the offset cannot be
/// represented.
pub fn local_now() -> OffsetDateTime {
    let now = chrono::Local::now();
    let local = UtcOffset::from_whole_seconds(now.offset().local_minus_utc())
        .ok()
        .zip(OffsetDateTime::from_unix_timestamp(now.timestamp()).ok())
        .map(|(offset, instant)| instant.to_offset(offset));

    local.unwrap_or_else(|| {
        warn!(target: "upload", "local offset unavailable, naming upload in UTC");
        OffsetDateTime::now_utc()
    })
}

/// Upload layer error type.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Submission attempted without a captured photo.
    #[error("no photo captured")]
    MissingPhoto,
    /// Endpoint violates ingest policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Snapshot could not be decoded or named.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] CoreError),
    /// Request timed out.
    #[error("upload timed out")]
    Timeout,
    /// Network-level failure.
    #[error("upload transport failure: {0}")]
    Transport(String),
    /// Server answered with a non-success status.
    #[error("upload rejected with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided error detail, when any.
        detail: Option<String>,
    },
}

impl UploadError {
    /// Returns the most specific detail for logs: the server-provided detail
    /// when present, else this error's message.
    pub fn log_detail(&self) -> String {
        match self {
            Self::Rejected {
                detail: Some(detail),
                ..
            } => detail.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for endpoint policy, form layout and multipart conversion.

    use super::*;
    use geosnap_core::{Coordinates, Snapshot};
    use time::macros::datetime;

    fn record(coordinates: Option<Coordinates>) -> SubmissionRecord {
        SubmissionRecord {
            location: "Gate B".to_string(),
            description: "loose cable".to_string(),
            snapshot: Some(Snapshot::from_bytes("image/png", &[1, 2, 3]).expect("snapshot")),
            coordinates,
        }
    }

    #[test]
    fn validates_expected_endpoint_policy() {
        validate_upload_endpoint(UPLOAD_ENDPOINT).expect("fixed endpoint should pass");
        assert!(validate_upload_endpoint("http://example.test/upload_image").is_err());
        assert!(validate_upload_endpoint("https://example.test/other").is_err());
        assert!(validate_upload_endpoint("not a url").is_err());
    }

    #[test]
    fn form_fields_follow_ingest_contract() {
        let prepared = build_upload_form(
            &record(Some(Coordinates {
                latitude: 40.5,
                longitude: -3.75,
            })),
            datetime!(2025-03-03 09:05 UTC),
        )
        .expect("form should build");

        let names: Vec<&str> = prepared
            .form
            .fields()
            .iter()
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(names, ["photo", "location", "comment", "latitude", "longitude"]);
        assert_eq!(prepared.file_name, "img-03-03-2025 09:05.png");
        assert_eq!(prepared.form.text_value("comment"), Some("loose cable"));
        assert_eq!(prepared.form.text_value("latitude"), Some("40.5"));
        assert_eq!(prepared.form.text_value("longitude"), Some("-3.75"));
        assert_eq!(
            prepared.photo_sha256,
            "039058c6f2c0cb492c533b0a4d14ef77cc0f78abccced5287d84a1a2011cfb81"
        );
    }

    #[test]
    fn missing_photo_is_rejected_before_encoding() {
        let mut without_photo = record(None);
        without_photo.snapshot = None;
        assert!(matches!(
            build_upload_form(&without_photo, datetime!(2025-03-03 09:05 UTC)),
            Err(UploadError::MissingPhoto)
        ));
    }

    #[test]
    fn payload_len_counts_field_bytes_only() {
        let form = MultipartForm::new()
            .file("photo", "a.png", "image/png", vec![0xff, 0x00])
            .text("location", "Gate B")
            .text("latitude", "");
        assert_eq!(form.payload_len(), 2 + 6);
        assert!(form.field("latitude").expect("field").value.is_empty());
    }

    #[test]
    fn multipart_conversion_keeps_parts_and_announces_boundary() {
        let form = MultipartForm::new()
            .file("photo", "img-03-03-2025 09:05.png", "image/png", vec![1, 2, 3])
            .text("location", "Gate B");
        let multipart = form.into_multipart().expect("valid content type");
        assert!(!multipart.boundary().is_empty());
    }

    #[test]
    fn multipart_conversion_rejects_bad_content_type() {
        let form = MultipartForm::new().file("photo", "a.bin", "not a mime", vec![1]);
        assert!(matches!(
            form.into_multipart(),
            Err(UploadError::Transport(detail)) if detail.contains("not a mime")
        ));
    }

    #[test]
    fn server_detail_prefers_json_error_field() {
        assert_eq!(
            extract_server_detail(r#"{"error": "file too large"}"#),
            Some("file too large".to_string())
        );
        assert_eq!(
            extract_server_detail("Internal Server Error"),
            Some("Internal Server Error".to_string())
        );
        assert_eq!(extract_server_detail("  "), None);
    }
}
