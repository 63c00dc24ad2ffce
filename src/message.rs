//! Response payloads and their rendering into the negotiated media type.
//!
//! A payload collects the outcome of a handler: either a status envelope
//! (`status`/`message`/`info`), a list of catalog entries, raw file bytes,
//! or an error envelope. `respond` renders it as JSON, plain text, binary
//! or an empty body according to the response's media type; errors are
//! always rendered as JSON.

use serde::Serialize;

use crate::catalog::FileEntry;
use crate::error::ServerError;
use crate::media::MediaType;
use crate::response::{Response, Status};

/// Envelope fields serialized for JSON responses. Entry lists are
/// serialized bare, without the surrounding envelope.
#[derive(Debug, Serialize)]
pub struct Payload {
    #[serde(skip)]
    outcome: Status,
    #[serde(skip)]
    is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip)]
    entries: Option<Vec<FileEntry>>,
    #[serde(skip)]
    file_data: Option<Vec<u8>>,
}

impl Payload {
    fn new(outcome: Status) -> Self {
        Self {
            outcome,
            is_error: false,
            error: None,
            status: None,
            message: None,
            info: None,
            reason: None,
            entries: None,
            file_data: None,
        }
    }

    /// A status envelope: numeric code plus a short message.
    pub fn status_message(outcome: Status, message: &str) -> Self {
        let mut payload = Self::new(outcome);
        payload.status = Some(outcome.code());
        payload.message = Some(message.to_string());
        payload
    }

    /// Attach the free-form `info` line.
    pub fn info(mut self, info: String) -> Self {
        self.info = Some(info);
        self
    }

    /// A bare list of catalog entries.
    pub fn entries(outcome: Status, entries: Vec<FileEntry>) -> Self {
        let mut payload = Self::new(outcome);
        payload.entries = Some(entries);
        payload
    }

    /// Raw file bytes for download responses.
    pub fn file_data(outcome: Status, bytes: Vec<u8>) -> Self {
        let mut payload = Self::new(outcome);
        payload.file_data = Some(bytes);
        payload
    }

    /// The error envelope: `status`, `error` (status description) and
    /// `reason` (the failure message).
    pub fn error_envelope(err: &ServerError) -> Self {
        let status = err.status();
        let mut payload = Self::new(status);
        payload.is_error = true;
        payload.status = Some(status.code());
        payload.error = Some(status.description().to_string());
        payload.reason = Some(err.reason());
        payload
    }

    fn to_json(&self) -> Vec<u8> {
        let rendered = match &self.entries {
            Some(entries) => serde_json::to_vec_pretty(entries),
            None => serde_json::to_vec_pretty(self),
        };
        rendered.unwrap_or_else(|_| b"{}".to_vec())
    }

    fn to_text(&self) -> Vec<u8> {
        let mut lines = Vec::new();
        if let Some(error) = &self.error {
            lines.push(format!("error: {error}"));
        }
        if let Some(status) = self.status {
            lines.push(format!("status: {status}"));
        }
        if let Some(message) = &self.message {
            lines.push(format!("message: {message}"));
        }
        if let Some(info) = &self.info {
            lines.push(format!("info: {info}"));
        }
        if let Some(reason) = &self.reason {
            lines.push(format!("reason: {reason}"));
        }
        if let Some(entries) = &self.entries {
            let rendered = serde_json::to_string_pretty(entries).unwrap_or_default();
            lines.push(format!("data:\n{rendered}"));
        }
        lines.join("\n").into_bytes()
    }
}

/// Render the payload into the response and finalize it. Error payloads
/// force the JSON media type regardless of what was negotiated.
pub fn respond(response: &mut Response, mut payload: Payload) {
    if payload.is_error {
        response.set_media_type(MediaType::Json);
    }
    let body = match response.media_type() {
        MediaType::Json => Some(payload.to_json()),
        MediaType::Text => Some(payload.to_text()),
        MediaType::OctetStream
        | MediaType::Jpeg
        | MediaType::Png
        | MediaType::Gif
        | MediaType::Mpeg
        | MediaType::Mp4 => payload.file_data.take(),
        MediaType::Any | MediaType::None => None,
    };
    response.finalize(payload.outcome, body);
}

/// Convert an error into its JSON envelope response.
pub fn respond_error(response: &mut Response, err: &ServerError) {
    respond(response, Payload::error_envelope(err));
}
