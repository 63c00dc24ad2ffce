//! HTTP request record and byte-level parsing.
//!
//! Requests are read straight off the connection one byte at a time: the
//! request line, CRLF-terminated headers, and a `Content-Length`-framed
//! body. No transfer encodings are supported.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ServerError;
use crate::response::{HeaderName, Status};

/// Request methods understood by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn from_token(token: &str) -> Result<Self, ServerError> {
        match token {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ServerError::parse(
                Status::BadRequest,
                format!("'{token}' is not supported by the server"),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Ordered request headers. Lookups are case-sensitive; duplicate names are
/// kept as-is and the last occurrence wins.
#[derive(Debug, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn push(&mut self, name: &str, value: &str) {
        self.0.push((name.to_string(), value.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A fully parsed request. Immutable once constructed.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub http_version: String,
    /// The raw request target, path and query included.
    pub full_url: String,
    /// First path segment, e.g. `/files`.
    pub root: String,
    /// Everything after the root, leading `/` kept. Empty when the URL is
    /// just the root.
    pub path: String,
    pub query: Option<String>,
    pub headers: Headers,
    /// Present iff the request carried a `Content-Length` header.
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Query string as key/value pairs. Keys outside the server's URL
    /// vocabulary are rejected.
    pub fn query_pairs(&self) -> Result<HashMap<String, String>, ServerError> {
        let Some(query) = self.query.as_deref() else {
            return Ok(HashMap::new());
        };
        let mut pairs = HashMap::new();
        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ServerError::url(
                    Status::BadRequest,
                    format!("URL malformed; '{pair}' is not a valid query pair"),
                )
            })?;
            if !matches!(key, "action" | "value") {
                return Err(ServerError::url(
                    Status::BadRequest,
                    format!("URL malformed; '{key}' is not part of a valid URL structure"),
                ));
            }
            pairs.insert(key.to_string(), value.to_string());
        }
        Ok(pairs)
    }
}

/// Parse one request from the stream.
///
/// Protocol violations come back as [`ServerError::Parse`] (or `Url` for a
/// target the server cannot place); socket failures and a closed connection
/// surface as [`ServerError::Io`].
pub async fn parse<R>(input: &mut R, expected_version: &str) -> Result<Request, ServerError>
where
    R: AsyncRead + Unpin,
{
    let (method, full_url, http_version) = parse_request_line(input, expected_version).await?;
    let (root, path, query) = split_target(&full_url)?;
    let headers = parse_headers(input).await?;
    let body = parse_body(input, &headers).await?;
    Ok(Request {
        method,
        http_version,
        full_url,
        root,
        path,
        query,
        headers,
        body,
    })
}

async fn parse_request_line<R>(
    input: &mut R,
    expected_version: &str,
) -> Result<(Method, String, String), ServerError>
where
    R: AsyncRead + Unpin,
{
    let line = read_line(input).await?;
    let tokens: Vec<&str> = line.split(' ').collect();
    if tokens.len() != 3 {
        return Err(ServerError::parse(
            Status::BadRequest,
            "malformed request line; expected method, target and version",
        ));
    }
    let method = Method::from_token(tokens[0])?;
    if tokens[2] != expected_version {
        return Err(ServerError::parse(
            Status::VersionNotSupported,
            "HTTP version mismatch",
        ));
    }
    Ok((method, tokens[1].to_string(), tokens[2].to_string()))
}

/// Split the request target into root, path remainder and query.
fn split_target(target: &str) -> Result<(String, String, Option<String>), ServerError> {
    let (path_part, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };
    if path_part.len() < 2 || !path_part.starts_with('/') {
        return Err(ServerError::url(
            Status::NotFound,
            "malformed URL; no target resource found",
        ));
    }
    let (root, path) = match path_part[1..].find('/') {
        Some(index) => (&path_part[..index + 1], &path_part[index + 1..]),
        None => (path_part, ""),
    };
    Ok((root.to_string(), path.to_string(), query))
}

async fn parse_headers<R>(input: &mut R) -> Result<Headers, ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut headers = Headers::default();
    loop {
        let line = read_line(input).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(": ").ok_or_else(|| {
            ServerError::parse(
                Status::BadRequest,
                "invalid header format; each header must be in the format 'Key: Value'",
            )
        })?;
        headers.push(name, value);
    }
    if headers.is_empty() {
        return Err(ServerError::parse(
            Status::BadRequest,
            "no headers found or headers are improperly formatted",
        ));
    }
    Ok(headers)
}

/// The body is read iff `Content-Length` is present, and exactly that many
/// bytes are consumed.
async fn parse_body<R>(input: &mut R, headers: &Headers) -> Result<Option<Vec<u8>>, ServerError>
where
    R: AsyncRead + Unpin,
{
    let Some(raw_length) = headers.get(HeaderName::ContentLength.as_str()) else {
        return Ok(None);
    };
    let length: usize = raw_length.trim().parse().map_err(|_| {
        ServerError::parse(
            Status::BadRequest,
            format!("'{raw_length}' is not a valid content length"),
        )
    })?;
    let mut body = vec![0u8; length];
    input.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Read bytes up to CRLF. A CR not followed by LF is a protocol error; end
/// of stream surfaces as an I/O error.
async fn read_line<R>(input: &mut R) -> Result<String, ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let byte = input.read_u8().await?;
        if byte == b'\r' {
            let next = input.read_u8().await?;
            if next != b'\n' {
                return Err(ServerError::parse(
                    Status::BadRequest,
                    "malformed header structure; expected CRLF but found incomplete sequence",
                ));
            }
            break;
        }
        line.push(byte);
    }
    String::from_utf8(line)
        .map_err(|_| ServerError::parse(Status::BadRequest, "request line is not valid UTF-8"))
}

/// A minimal request for unit tests in sibling modules.
#[cfg(test)]
pub fn test_request(headers: &[(&str, &str)]) -> Request {
    let mut parsed = Headers::default();
    for (name, value) in headers {
        parsed.push(name, value);
    }
    Request {
        method: Method::Get,
        http_version: "HTTP/1.1".to_string(),
        full_url: "/files/query/all?action=view".to_string(),
        root: "/files".to_string(),
        path: "/query/all".to_string(),
        query: Some("action=view".to_string()),
        headers: parsed,
        body: None,
    }
}
