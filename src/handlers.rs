//! One handler per file action: upload, download, view, rename, override
//! and delete. Each validates content types, reads its identifier from the
//! matched template's bindings, drives the store, and renders a payload.

use std::collections::HashMap;

use crate::catalog;
use crate::error::ServerError;
use crate::media::{self, MediaType, BINARY_MEDIA};
use crate::message::{self, Payload};
use crate::request::Request;
use crate::response::{HeaderName, Response, Status};
use crate::store::{FileStore, Identifier};

/// Placeholder values extracted from the matched URL template.
pub type Bindings = HashMap<String, String>;

const ANY_REQUEST: &[MediaType] = &[MediaType::Any];
const STATUS_RESPONSE: &[MediaType] = &[MediaType::Json, MediaType::Text, MediaType::None];
const VIEW_RESPONSE: &[MediaType] = &[MediaType::Json, MediaType::Text];

/// POST `/files/upload`: store the request body under the name announced
/// in `Content-Disposition` and answer with the assigned id.
pub async fn upload(
    request: &Request,
    response: &mut Response,
    store: &FileStore,
) -> Result<(), ServerError> {
    media::negotiate(request, response, BINARY_MEDIA, STATUS_RESPONSE)?;
    let file_name = content_disposition_name(request)?;
    let body = required_body(request)?;
    let id = store.add(&file_name, body).await?;

    let payload = Payload::status_message(Status::Created, "File saved on the server")
        .info(format!("'{file_name}' was given a unique identifier #{id}"));
    message::respond(response, payload);
    Ok(())
}

/// GET with `action=download`: stream the file bytes back as an attachment.
pub async fn download(
    request: &Request,
    response: &mut Response,
    bindings: &Bindings,
    store: &FileStore,
) -> Result<(), ServerError> {
    media::negotiate(request, response, ANY_REQUEST, BINARY_MEDIA)?;
    let identifier = identifier_from(bindings)?;
    let file_name = match &identifier {
        Identifier::Name(name) => name.clone(),
        Identifier::Id(_) => store.view(&identifier).await?.file_name,
    };
    response.set_header(
        HeaderName::ContentDisposition,
        format!("attachment; filename=\"{file_name}\""),
    );
    let bytes = store.get(&identifier).await?;
    message::respond(response, Payload::file_data(Status::Ok, bytes));
    Ok(())
}

/// GET with `action=view`: metadata for one file, or the filtered list for
/// `/query/{query}`. The body is the bare entry list.
pub async fn view(
    request: &Request,
    response: &mut Response,
    bindings: &Bindings,
    store: &FileStore,
) -> Result<(), ServerError> {
    media::negotiate(request, response, ANY_REQUEST, VIEW_RESPONSE)?;
    let entries = match bindings.get("query") {
        Some(keyword) => store.list(keyword).await,
        None => vec![store.view(&identifier_from(bindings)?).await?],
    };
    message::respond(response, Payload::entries(Status::Ok, entries));
    Ok(())
}

/// PUT with `action=update-name`: rename a file. The new name comes from
/// the `value` query parameter and must keep the original type tag.
pub async fn rename(
    request: &Request,
    response: &mut Response,
    bindings: &Bindings,
    store: &FileStore,
) -> Result<(), ServerError> {
    media::negotiate(request, response, ANY_REQUEST, STATUS_RESPONSE)?;
    let identifier = identifier_from(bindings)?;
    let new_name = bindings.get("value").ok_or_else(|| {
        ServerError::url(
            Status::BadRequest,
            "URL is malformed; missing the 'value' query parameter",
        )
    })?;

    let (current_name, info) = match &identifier {
        Identifier::Name(name) => (name.clone(), format!("New file name: {new_name}")),
        Identifier::Id(id) => {
            let current = store.view(&identifier).await?.file_name;
            (current, format!("File #{id} has a new name: {new_name}"))
        }
    };
    if !catalog::same_type(&current_name, new_name) {
        return Err(ServerError::parse(
            Status::BadRequest,
            "the file type of the updated file name does not match the original file type",
        ));
    }
    store.rename(&identifier, new_name).await?;

    let payload = Payload::status_message(Status::Ok, "File updated successfully").info(info);
    message::respond(response, payload);
    Ok(())
}

/// PUT with `action=override`: replace a file's contents with the request
/// body. Body framing rules match upload.
pub async fn override_contents(
    request: &Request,
    response: &mut Response,
    bindings: &Bindings,
    store: &FileStore,
) -> Result<(), ServerError> {
    media::negotiate(request, response, BINARY_MEDIA, STATUS_RESPONSE)?;
    let identifier = identifier_from(bindings)?;
    let info = match &identifier {
        Identifier::Name(name) => format!("The file '{name}' was overridden"),
        Identifier::Id(id) => {
            let file_name = store.view(&identifier).await?.file_name;
            format!("File #{id} ('{file_name}') was overridden")
        }
    };
    let body = required_body(request)?;
    store.override_contents(&identifier, body).await?;

    let payload = Payload::status_message(Status::Ok, "Override successful").info(info);
    message::respond(response, payload);
    Ok(())
}

/// DELETE: remove the file and its catalog entry.
pub async fn delete(
    request: &Request,
    response: &mut Response,
    bindings: &Bindings,
    store: &FileStore,
) -> Result<(), ServerError> {
    media::negotiate(request, response, ANY_REQUEST, STATUS_RESPONSE)?;
    let identifier = identifier_from(bindings)?;
    store.delete(&identifier).await?;

    let payload = Payload::status_message(
        Status::Ok,
        "The file was deleted successfully from the server.",
    );
    message::respond(response, payload);
    Ok(())
}

/// Build the store identifier from the `name` or `id` binding. A
/// non-numeric id resolves to nothing, hence 404.
fn identifier_from(bindings: &Bindings) -> Result<Identifier, ServerError> {
    if let Some(name) = bindings.get("name") {
        return Ok(Identifier::Name(name.clone()));
    }
    if let Some(raw_id) = bindings.get("id") {
        let id: i64 = raw_id.parse().map_err(|_| {
            ServerError::url(
                Status::NotFound,
                format!("malformed URL; '{raw_id}' is not a valid number"),
            )
        })?;
        return Ok(Identifier::Id(id));
    }
    Err(ServerError::url(
        Status::BadRequest,
        "URL is malformed; missing a file identifier",
    ))
}

/// Upload names come from `Content-Disposition: attachment;
/// filename="<name>"`; the URL path is informational only.
fn content_disposition_name(request: &Request) -> Result<String, ServerError> {
    let disposition = request
        .header(HeaderName::ContentDisposition.as_str())
        .ok_or_else(|| {
            ServerError::parse(
                Status::BadRequest,
                "failed to retrieve the file name because the Content-Disposition header is missing",
            )
        })?;
    let (_, value) = disposition.split_once('=').ok_or_else(|| {
        ServerError::parse(
            Status::BadRequest,
            "malformed Content-Disposition header; expected attachment; filename=\"<name>\"",
        )
    })?;
    Ok(value.trim_matches('"').to_string())
}

/// Uploads and overrides must carry a framed, non-empty body.
fn required_body(request: &Request) -> Result<&[u8], ServerError> {
    if request.header(HeaderName::ContentLength.as_str()).is_none() {
        return Err(ServerError::parse(
            Status::LengthRequired,
            "file size not established",
        ));
    }
    match request.body.as_deref() {
        Some(body) if !body.is_empty() => Ok(body),
        _ => Err(ServerError::parse(Status::BadRequest, "missing request body")),
    }
}
