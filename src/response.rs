//! HTTP response record and byte-level serialization.

use crate::media::MediaType;

const CRLF: &str = "\r\n";

/// Response status codes the server can emit, with their reason phrases
/// and the short descriptions used in error envelopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    LengthRequired,
    UnsupportedMediaType,
    InternalServerError,
    VersionNotSupported,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::NotAcceptable => 406,
            Status::LengthRequired => 411,
            Status::UnsupportedMediaType => 415,
            Status::InternalServerError => 500,
            Status::VersionNotSupported => 505,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::NotAcceptable => "Not Acceptable",
            Status::LengthRequired => "Length Required",
            Status::UnsupportedMediaType => "Unsupported Media Type",
            Status::InternalServerError => "Internal Server Error",
            Status::VersionNotSupported => "HTTP Version Not Supported",
        }
    }

    /// Short explanation used as the `error` field of error envelopes.
    pub fn description(self) -> &'static str {
        match self {
            Status::Ok => "Request successful.",
            Status::Created => "A new resource was created.",
            Status::BadRequest => "Request failed.",
            Status::NotFound => "Requested resource not found.",
            Status::MethodNotAllowed => "Request method error.",
            Status::NotAcceptable => "Requested media type not supported.",
            Status::LengthRequired => "File size not established.",
            Status::UnsupportedMediaType => "Media type not supported.",
            Status::InternalServerError => "Server failed to handle request.",
            Status::VersionNotSupported => "Server and client HTTP version mismatch.",
        }
    }
}

/// The header names this server reads or emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderName {
    ContentType,
    ContentLength,
    Connection,
    Accept,
    Server,
    ContentDisposition,
}

impl HeaderName {
    pub fn as_str(self) -> &'static str {
        match self {
            HeaderName::ContentType => "Content-Type",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::Connection => "Connection",
            HeaderName::Accept => "Accept",
            HeaderName::Server => "Server",
            HeaderName::ContentDisposition => "Content-Disposition",
        }
    }
}

/// Whether the connection stays open after the current exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    KeepAlive,
    Close,
}

impl ConnectionStatus {
    /// Anything other than a literal `keep-alive` closes the connection.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("keep-alive") => ConnectionStatus::KeepAlive,
            _ => ConnectionStatus::Close,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::KeepAlive => "keep-alive",
            ConnectionStatus::Close => "close",
        }
    }
}

/// An HTTP response under construction.
///
/// Headers keep insertion order; `finalize` appends the `Connection`,
/// `Content-Type` and `Content-Length` headers according to the chosen
/// media type and body.
#[derive(Debug)]
pub struct Response {
    status: Status,
    headers: Vec<(HeaderName, String)>,
    body: Option<Vec<u8>>,
    media_type: MediaType,
    connection: ConnectionStatus,
}

impl Response {
    /// A fresh response carrying only the `Server` header. The connection
    /// intent defaults to `close`.
    pub fn new(server_name: &str) -> Self {
        Self {
            status: Status::Ok,
            headers: vec![(HeaderName::Server, server_name.to_string())],
            body: None,
            media_type: MediaType::None,
            connection: ConnectionStatus::Close,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn set_media_type(&mut self, media_type: MediaType) {
        self.media_type = media_type;
    }

    pub fn set_connection(&mut self, connection: ConnectionStatus) {
        self.connection = connection;
    }

    /// Insert or replace a header, keeping the position of an existing one.
    pub fn set_header(&mut self, name: HeaderName, value: String) {
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Fix the status and body and attach the standard trailing headers.
    /// An empty body is treated the same as no body at all.
    pub fn finalize(&mut self, status: Status, body: Option<Vec<u8>>) {
        self.status = status;
        self.set_header(HeaderName::Connection, self.connection.as_str().to_string());
        if self.media_type != MediaType::None {
            self.set_header(HeaderName::ContentType, self.media_type.as_str().to_string());
        }
        let length = body.as_ref().map_or(0, Vec::len);
        if length > 0 {
            self.set_header(HeaderName::ContentLength, length.to_string());
            self.body = body;
        }
    }

    /// Serialize the status line, headers in insertion order, a blank line,
    /// and the body.
    pub fn to_bytes(&self, http_version: &str) -> Vec<u8> {
        let mut head = format!(
            "{} {} {}{}",
            http_version,
            self.status.code(),
            self.status.reason(),
            CRLF
        );
        for (name, value) in &self.headers {
            head.push_str(name.as_str());
            head.push_str(": ");
            head.push_str(value);
            head.push_str(CRLF);
        }
        head.push_str(CRLF);

        let mut bytes = head.into_bytes();
        if let Some(body) = &self.body {
            bytes.extend_from_slice(body);
        }
        bytes
    }
}

/// Inspection helpers for unit tests across the crate.
#[cfg(test)]
impl Response {
    pub fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_status_line_headers_and_body() {
        let mut response = Response::new("testserver");
        response.set_media_type(MediaType::Text);
        response.finalize(Status::Ok, Some(b"hello".to_vec()));

        let raw = String::from_utf8(response.to_bytes("HTTP/1.1")).expect("utf8");
        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.contains("Server: testserver\r\n"));
        assert!(raw.contains("Connection: close\r\n"));
        assert!(raw.contains("Content-Type: text/plain\r\n"));
        assert!(raw.contains("Content-Length: 5\r\n"));
        assert!(raw.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn empty_body_omits_content_length() {
        let mut response = Response::new("testserver");
        response.finalize(Status::Ok, Some(Vec::new()));

        let raw = String::from_utf8(response.to_bytes("HTTP/1.1")).expect("utf8");
        assert!(!raw.contains("Content-Length"));
        assert!(!raw.contains("Content-Type"));
        assert!(raw.ends_with("\r\n\r\n"));
    }

    #[test]
    fn set_header_replaces_in_place() {
        let mut response = Response::new("testserver");
        response.set_header(HeaderName::ContentDisposition, "attachment; filename=\"a\"".into());
        response.set_header(HeaderName::ContentDisposition, "attachment; filename=\"b\"".into());

        let raw = String::from_utf8(response.to_bytes("HTTP/1.1")).expect("utf8");
        assert!(!raw.contains("filename=\"a\""));
        assert!(raw.contains("filename=\"b\""));
    }
}
