//! Endpoint registry and request dispatch.
//!
//! Each endpoint root owns its template table and its file store. Dispatch
//! walks the method's templates in declaration order, binds the first
//! match, resolves the action, and runs the handler; every expected
//! failure is converted into the JSON error envelope here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{self, Settings};
use crate::error::ServerError;
use crate::handlers;
use crate::logging::LogStore;
use crate::matcher;
use crate::message;
use crate::request::{Method, Request};
use crate::response::{Response, Status};
use crate::store::FileStore;

/// The logical file operations reachable through the URL grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Download,
    View,
    Upload,
    Override,
    UpdateName,
    Delete,
}

impl Action {
    fn from_token(token: &str) -> Result<Self, ServerError> {
        match token {
            "download" => Ok(Action::Download),
            "view" => Ok(Action::View),
            "upload" => Ok(Action::Upload),
            "override" => Ok(Action::Override),
            "update-name" => Ok(Action::UpdateName),
            "delete" => Ok(Action::Delete),
            _ => Err(ServerError::url(
                Status::BadRequest,
                format!("URL is malformed; '{token}' is not a valid action"),
            )),
        }
    }
}

/// One endpoint root with its frozen template table and service.
pub struct Endpoint {
    root: String,
    templates: HashMap<Method, Vec<String>>,
    store: Arc<FileStore>,
}

impl Endpoint {
    /// Handle one request. Expected errors become the error envelope; the
    /// response is always ready to serialize afterwards.
    pub async fn dispatch(&self, request: &Request, response: &mut Response) {
        if let Err(err) = self.route(request, response).await {
            message::respond_error(response, &err);
        }
    }

    async fn route(&self, request: &Request, response: &mut Response) -> Result<(), ServerError> {
        let templates = self.templates.get(&request.method).ok_or_else(|| {
            ServerError::url(
                Status::MethodNotAllowed,
                format!(
                    "'{}' is not a valid method for the requested resource",
                    request.method.as_str()
                ),
            )
        })?;
        let template = templates
            .iter()
            .find(|template| matcher::matches(template, &request.full_url))
            .ok_or_else(|| {
                ServerError::url(
                    Status::NotFound,
                    "URL malformed; the requested path is not valid",
                )
            })?;
        let bindings = matcher::bindings(template, &request.full_url);

        match self.resolve_action(request)? {
            Action::Upload => handlers::upload(request, response, &self.store).await,
            Action::Download => {
                handlers::download(request, response, &bindings, &self.store).await
            }
            Action::View => handlers::view(request, response, &bindings, &self.store).await,
            Action::UpdateName => handlers::rename(request, response, &bindings, &self.store).await,
            Action::Override => {
                handlers::override_contents(request, response, &bindings, &self.store).await
            }
            Action::Delete => handlers::delete(request, response, &bindings, &self.store).await,
        }
    }

    /// GET and PUT carry the action in the query; POST derives it from the
    /// first path segment; DELETE has exactly one action.
    fn resolve_action(&self, request: &Request) -> Result<Action, ServerError> {
        match request.method {
            Method::Get | Method::Put => {
                let pairs = request.query_pairs()?;
                let token = pairs.get("action").ok_or_else(|| {
                    ServerError::url(
                        Status::BadRequest,
                        "URL is malformed; missing the 'action' query parameter",
                    )
                })?;
                Action::from_token(token)
            }
            Method::Post => {
                let token = request.path.trim_start_matches('/');
                Action::from_token(token.split('/').next().unwrap_or_default())
            }
            Method::Delete => Ok(Action::Delete),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }
}

/// All endpoints, keyed by their root path.
pub struct Registry {
    endpoints: HashMap<String, Endpoint>,
    log: Arc<LogStore>,
}

impl Registry {
    /// Build the registry from the template file. Every endpoint in the
    /// table is served by the given store.
    pub fn new(
        settings: &Settings,
        store: Arc<FileStore>,
        log: Arc<LogStore>,
    ) -> Result<Self, ServerError> {
        let table = config::load_templates(&settings.templates_path)?;
        let mut endpoints = HashMap::new();
        for (root, methods) in table {
            let mut templates = HashMap::new();
            for (method_name, urls) in methods {
                let method = Method::from_token(&method_name).map_err(|_| {
                    ServerError::config(format!(
                        "'{method_name}' in the template file is not a valid method"
                    ))
                })?;
                templates.insert(method, urls);
            }
            endpoints.insert(
                root.clone(),
                Endpoint {
                    root,
                    templates,
                    store: store.clone(),
                },
            );
        }
        Ok(Self { endpoints, log })
    }

    pub fn endpoint(&self, root: &str) -> Option<&Endpoint> {
        self.endpoints.get(root)
    }

    /// Flush every endpoint's store. Called once during shutdown.
    pub async fn close(&self) {
        for endpoint in self.endpoints.values() {
            match endpoint.store.flush().await {
                Ok(()) => self.log.info(
                    "registry",
                    format!(
                        "'{}' metadata saved successfully ({} entries, current id #{})",
                        endpoint.root(),
                        endpoint.store.entry_count().await,
                        endpoint.store.current_id().await
                    ),
                ),
                Err(err) => self.log.error(
                    "registry",
                    format!("failed to save '{}' metadata: {err}", endpoint.root()),
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Headers;
    use std::io::Write;
    use tempfile::tempdir;

    const TEMPLATES: &str = r#"{
  "/files": {
    "GET": [
      "/files/name/{name}?action=download",
      "/files/id/{id}?action=download",
      "/files/name/{name}?action=view",
      "/files/id/{id}?action=view",
      "/files/query/{query}?action=view"
    ],
    "POST": ["/files/upload"],
    "PUT": [
      "/files/name/{name}?action=override",
      "/files/id/{id}?action=override",
      "/files/name/{name}?action=update-name&value={value}",
      "/files/id/{id}?action=update-name&value={value}"
    ],
    "DELETE": ["/files/name/{name}", "/files/id/{id}"]
  }
}"#;

    async fn make_registry(temp: &tempfile::TempDir) -> Registry {
        make_registry_with(temp, TEMPLATES).await
    }

    async fn make_registry_with(temp: &tempfile::TempDir, templates: &str) -> Registry {
        let templates_path = temp.path().join("url_templates.json");
        let mut file = std::fs::File::create(&templates_path).expect("templates file");
        file.write_all(templates.as_bytes()).expect("write");

        let settings = Settings {
            http_version: "HTTP/1.1".to_string(),
            server_name: "filedepot".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            file_dir: temp.path().join("files").to_string_lossy().into_owned(),
            metadata_path: temp
                .path()
                .join("files_metadata.json")
                .to_string_lossy()
                .into_owned(),
            templates_path: templates_path.to_string_lossy().into_owned(),
            metadata_id_field: "currentId".to_string(),
            metadata_data_field: "data".to_string(),
        };
        let log = Arc::new(LogStore::new());
        let store = Arc::new(
            FileStore::open(&settings, log.clone())
                .await
                .expect("store"),
        );
        Registry::new(&settings, store, log).expect("registry")
    }

    fn request(method: Method, url: &str) -> Request {
        let mut headers = Headers::default();
        headers.push("Accept", "*/*");
        let (path_part, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (url, None),
        };
        let (root, path) = match path_part[1..].find('/') {
            Some(index) => (&path_part[..index + 1], &path_part[index + 1..]),
            None => (path_part, ""),
        };
        Request {
            method,
            http_version: "HTTP/1.1".to_string(),
            full_url: url.to_string(),
            root: root.to_string(),
            path: path.to_string(),
            query,
            headers,
            body: None,
        }
    }

    #[tokio::test]
    async fn method_without_templates_is_method_not_allowed() {
        let temp = tempdir().expect("tempdir");
        let registry = make_registry_with(
            &temp,
            r#"{ "/files": { "GET": ["/files/query/{query}?action=view"] } }"#,
        )
        .await;
        let endpoint = registry.endpoint("/files").expect("endpoint");

        let request = request(Method::Delete, "/files/id/1");
        let mut response = Response::new("filedepot");
        endpoint.dispatch(&request, &mut response).await;
        assert_eq!(response.status(), Status::MethodNotAllowed);
    }

    #[tokio::test]
    async fn unmatched_url_is_not_found() {
        let temp = tempdir().expect("tempdir");
        let registry = make_registry(&temp).await;
        let endpoint = registry.endpoint("/files").expect("endpoint");

        let request = request(Method::Get, "/files/name/a.txt");
        let mut response = Response::new("filedepot");
        endpoint.dispatch(&request, &mut response).await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[tokio::test]
    async fn unknown_action_fails_even_when_a_template_matches() {
        let temp = tempdir().expect("tempdir");
        // A placeholder action in the table lets the token reach the
        // action resolver, which rejects it.
        let registry = make_registry_with(
            &temp,
            r#"{ "/files": { "GET": ["/files/name/{name}?action={action}"] } }"#,
        )
        .await;
        let endpoint = registry.endpoint("/files").expect("endpoint");

        let request = request(Method::Get, "/files/name/a.txt?action=destroy");
        let mut response = Response::new("filedepot");
        endpoint.dispatch(&request, &mut response).await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[tokio::test]
    async fn view_dispatch_reaches_store() {
        let temp = tempdir().expect("tempdir");
        let registry = make_registry(&temp).await;
        let endpoint = registry.endpoint("/files").expect("endpoint");

        let request = request(Method::Get, "/files/query/all?action=view");
        let mut response = Response::new("filedepot");
        endpoint.dispatch(&request, &mut response).await;

        assert_eq!(response.status(), Status::Ok);
        let body = String::from_utf8(response.body().expect("body").to_vec()).expect("utf8");
        assert_eq!(body.trim(), "[]");
    }

    #[tokio::test]
    async fn missing_file_becomes_error_envelope() {
        let temp = tempdir().expect("tempdir");
        let registry = make_registry(&temp).await;
        let endpoint = registry.endpoint("/files").expect("endpoint");

        let request = request(Method::Get, "/files/id/5?action=view");
        let mut response = Response::new("filedepot");
        endpoint.dispatch(&request, &mut response).await;

        assert_eq!(response.status(), Status::NotFound);
        let body = String::from_utf8(response.body().expect("body").to_vec()).expect("utf8");
        assert!(body.contains("\"status\": 404"));
        assert!(body.contains("\"error\""));
        assert!(body.contains("\"reason\""));
    }

    #[tokio::test]
    async fn unknown_root_is_absent_from_registry() {
        let temp = tempdir().expect("tempdir");
        let registry = make_registry(&temp).await;
        assert!(registry.endpoint("/users").is_none());
    }
}
