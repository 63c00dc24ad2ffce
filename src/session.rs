//! Per-connection request loop.
//!
//! Requests on one connection are strictly serial: each response is fully
//! written before the next request is read. The loop ends when the client
//! asks for `Connection: close`, sends something unparsable, or the socket
//! fails.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::Settings;
use crate::error::ServerError;
use crate::logging::LogStore;
use crate::message;
use crate::request;
use crate::response::{ConnectionStatus, HeaderName, Response, Status};
use crate::router::Registry;

const LOG_SOURCE: &str = "session";

/// Serve one accepted connection until it closes.
pub async fn run(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
    settings: Arc<Settings>,
    log: Arc<LogStore>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let mut response = Response::new(&settings.server_name);
        let keep_alive = match request::parse(&mut reader, &settings.http_version).await {
            Ok(request) => {
                let connection =
                    ConnectionStatus::from_header(request.header(HeaderName::Connection.as_str()));
                response.set_connection(connection);
                match registry.endpoint(&request.root) {
                    Some(endpoint) => endpoint.dispatch(&request, &mut response).await,
                    None => message::respond_error(
                        &mut response,
                        &ServerError::url(
                            Status::NotFound,
                            format!("root directory '{}' is invalid", request.root),
                        ),
                    ),
                }
                connection == ConnectionStatus::KeepAlive
            }
            Err(ServerError::Io(err)) => {
                // A closed connection is the normal end of a session.
                if err.kind() != std::io::ErrorKind::UnexpectedEof {
                    log.error(LOG_SOURCE, format!("client {peer} connection error: {err}"));
                }
                break;
            }
            Err(err) => {
                message::respond_error(&mut response, &err);
                false
            }
        };

        if let Err(err) = write_half
            .write_all(&response.to_bytes(&settings.http_version))
            .await
        {
            log.error(LOG_SOURCE, format!("failed to answer client {peer}: {err}"));
            break;
        }
        if !keep_alive {
            break;
        }
    }

    log.info(LOG_SOURCE, format!("client {peer} disconnected"));
}
