//! Media types and request/response content negotiation.

use crate::error::ServerError;
use crate::request::Request;
use crate::response::{HeaderName, Response, Status};

/// Media types the server understands. `Any` is the `*/*` wildcard used in
/// allow-lists and `Accept` headers; `None` marks a bodyless response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaType {
    Json,
    Text,
    OctetStream,
    Jpeg,
    Png,
    Gif,
    Mpeg,
    Mp4,
    Any,
    None,
}

/// Request payload types accepted for uploads and overrides, and the
/// response types offered for downloads.
pub const BINARY_MEDIA: &[MediaType] = &[
    MediaType::OctetStream,
    MediaType::Jpeg,
    MediaType::Png,
    MediaType::Gif,
    MediaType::Mpeg,
    MediaType::Mp4,
];

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Json => "application/json",
            MediaType::Text => "text/plain",
            MediaType::OctetStream => "application/octet-stream",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Gif => "image/gif",
            MediaType::Mpeg => "audio/mpeg",
            MediaType::Mp4 => "video/mp4",
            MediaType::Any => "*/*",
            MediaType::None => "null",
        }
    }

    /// Parse a concrete media type string; unknown values yield `None` and
    /// are treated like a missing header during validation.
    pub fn parse(raw: &str) -> Option<MediaType> {
        match raw {
            "application/json" => Some(MediaType::Json),
            "text/plain" => Some(MediaType::Text),
            "application/octet-stream" => Some(MediaType::OctetStream),
            "image/jpeg" => Some(MediaType::Jpeg),
            "image/png" => Some(MediaType::Png),
            "image/gif" => Some(MediaType::Gif),
            "audio/mpeg" => Some(MediaType::Mpeg),
            "video/mp4" => Some(MediaType::Mp4),
            _ => None,
        }
    }
}

/// Validate the request `Content-Type` against the handler's allow-list and
/// pick the response type from the `Accept` header against its offer-list.
/// The chosen type is stored on the response.
pub fn negotiate(
    request: &Request,
    response: &mut Response,
    accepted: &[MediaType],
    offered: &[MediaType],
) -> Result<(), ServerError> {
    check_request_type(request, accepted)?;
    let chosen = select_response_type(request, offered)?;
    response.set_media_type(chosen);
    Ok(())
}

fn check_request_type(request: &Request, accepted: &[MediaType]) -> Result<(), ServerError> {
    if accepted.contains(&MediaType::Any) {
        return Ok(());
    }
    // A missing or unrecognized Content-Type passes; only a known type
    // outside the allow-list is rejected.
    match request
        .header(HeaderName::ContentType.as_str())
        .and_then(MediaType::parse)
    {
        Some(media_type) if !accepted.contains(&media_type) => Err(ServerError::media(
            Status::UnsupportedMediaType,
            "the request content type is missing or cannot be processed by the server",
        )),
        _ => Ok(()),
    }
}

/// `Accept` is split on `,` only; priority weights are ignored.
fn select_response_type(
    request: &Request,
    offered: &[MediaType],
) -> Result<MediaType, ServerError> {
    let Some(accept) = request.header(HeaderName::Accept.as_str()) else {
        return Ok(offered[0]);
    };
    let accept_list: Vec<&str> = accept.split(',').collect();
    if accept_list.contains(&MediaType::Any.as_str()) {
        return Ok(offered[0]);
    }
    for media_type in offered {
        if accept_list.contains(&media_type.as_str()) {
            return Ok(*media_type);
        }
    }
    let supported: Vec<&str> = offered.iter().map(|t| t.as_str()).collect();
    Err(ServerError::media(
        Status::NotAcceptable,
        format!("supported type(s): {}", supported.join(", ")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_request;

    #[test]
    fn wildcard_accept_selects_first_offered() {
        let request = test_request(&[("Accept", "*/*")]);
        let mut response = Response::new("test");
        negotiate(
            &request,
            &mut response,
            &[MediaType::Any],
            &[MediaType::Json, MediaType::Text],
        )
        .expect("negotiation");
        assert_eq!(response.media_type(), MediaType::Json);
    }

    #[test]
    fn missing_accept_selects_first_offered() {
        let request = test_request(&[("Host", "localhost")]);
        let mut response = Response::new("test");
        negotiate(&request, &mut response, &[MediaType::Any], &[MediaType::Text])
            .expect("negotiation");
        assert_eq!(response.media_type(), MediaType::Text);
    }

    #[test]
    fn offer_order_wins_over_accept_order() {
        let request = test_request(&[("Accept", "text/plain,application/json")]);
        let mut response = Response::new("test");
        negotiate(
            &request,
            &mut response,
            &[MediaType::Any],
            &[MediaType::Json, MediaType::Text],
        )
        .expect("negotiation");
        assert_eq!(response.media_type(), MediaType::Json);
    }

    #[test]
    fn no_overlap_is_not_acceptable() {
        let request = test_request(&[("Accept", "image/png")]);
        let mut response = Response::new("test");
        let err = negotiate(&request, &mut response, &[MediaType::Any], &[MediaType::Json])
            .expect_err("no acceptable type");
        assert_eq!(err.status(), Status::NotAcceptable);
    }

    #[test]
    fn known_type_outside_allow_list_is_rejected() {
        let request = test_request(&[("Content-Type", "text/plain"), ("Accept", "*/*")]);
        let mut response = Response::new("test");
        let err = negotiate(&request, &mut response, BINARY_MEDIA, &[MediaType::Json])
            .expect_err("unsupported media type");
        assert_eq!(err.status(), Status::UnsupportedMediaType);
    }

    #[test]
    fn missing_content_type_passes_validation() {
        let request = test_request(&[("Accept", "*/*")]);
        let mut response = Response::new("test");
        negotiate(&request, &mut response, BINARY_MEDIA, &[MediaType::Json])
            .expect("missing content type accepted");
    }
}
