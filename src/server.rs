//! Listener and worker-pool supervision.
//!
//! Connections are accepted one at a time and handed to session tasks; a
//! semaphore of fixed size bounds how many run at once, with further
//! connections queueing in the listen backlog. Shutdown stops the accept
//! loop, drains sessions against a deadline, cancels stragglers, and then
//! flushes every endpoint's store.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::config::Settings;
use crate::error::ServerError;
use crate::logging::LogStore;
use crate::router::Registry;
use crate::session;

/// Fixed number of sessions served concurrently.
const WORKER_POOL_SIZE: usize = 10;
/// How long shutdown waits for in-flight sessions.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

const LOG_SOURCE: &str = "server";

type SessionHandles = Arc<Mutex<Vec<(SocketAddr, JoinHandle<()>)>>>;

/// A running server instance. Dropping it without `shutdown` leaves
/// sessions unflushed; the admin console always shuts down explicitly.
pub struct Server {
    settings: Arc<Settings>,
    registry: Arc<Registry>,
    log: Arc<LogStore>,
    local_addr: SocketAddr,
    connections: Arc<Mutex<HashSet<SocketAddr>>>,
    workers: Arc<Semaphore>,
    sessions: SessionHandles,
    accept_task: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl Server {
    /// Bind the configured address and start accepting connections.
    pub async fn start(
        settings: Arc<Settings>,
        registry: Arc<Registry>,
        log: Arc<LogStore>,
    ) -> Result<Server, ServerError> {
        let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
        let local_addr = listener.local_addr()?;

        let connections = Arc::new(Mutex::new(HashSet::new()));
        let workers = Arc::new(Semaphore::new(WORKER_POOL_SIZE));
        let sessions: SessionHandles = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            settings.clone(),
            registry.clone(),
            log.clone(),
            connections.clone(),
            workers.clone(),
            sessions.clone(),
        ));
        log.info(
            LOG_SOURCE,
            format!("server is running on {local_addr}, waiting for clients to connect"),
        );

        Ok(Server {
            settings,
            registry,
            log,
            local_addr,
            connections,
            workers,
            sessions,
            accept_task,
            running,
        })
    }

    /// The bound address; differs from the settings when port 0 was used.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Human-readable server status for the admin console.
    pub fn status(&self) -> String {
        let clients = self.connections.lock().map(|set| set.len()).unwrap_or(0);
        let active = WORKER_POOL_SIZE - self.workers.available_permits();
        format!(
            "Server status:\n- Running: {}\n- Host: {}\n- Port: {}\n- Clients connected: {}\n- Active workers: {}",
            self.running.load(Ordering::SeqCst),
            self.settings.host,
            self.local_addr.port(),
            clients,
            active
        )
    }

    /// One line per connected client, or a placeholder when idle.
    pub fn connections(&self) -> String {
        let connections = match self.connections.lock() {
            Ok(set) => set,
            Err(_) => return String::from("No current active connections"),
        };
        if connections.is_empty() {
            return String::from("No current active connections");
        }
        connections
            .iter()
            .map(|peer| format!("- {peer}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Orderly shutdown: stop accepting, drain sessions for up to the
    /// deadline, cancel what remains, then flush the stores.
    pub async fn shutdown(self) {
        self.log.info(LOG_SOURCE, "shutting down server");
        self.running.store(false, Ordering::SeqCst);
        self.accept_task.abort();

        let deadline = Instant::now() + DRAIN_DEADLINE;
        let handles = match self.sessions.lock() {
            Ok(mut sessions) => sessions.drain(..).collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for (peer, handle) in handles {
            let abort = handle.abort_handle();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if timeout(remaining, handle).await.is_err() {
                abort.abort();
                self.log.warn(
                    LOG_SOURCE,
                    format!("client connection '{peer}' did not finish in time and was cancelled"),
                );
            }
        }

        if let Ok(mut connections) = self.connections.lock() {
            connections.clear();
        }
        self.registry.close().await;
        self.log.info(LOG_SOURCE, "server shut down successfully");
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    settings: Arc<Settings>,
    registry: Arc<Registry>,
    log: Arc<LogStore>,
    connections: Arc<Mutex<HashSet<SocketAddr>>>,
    workers: Arc<Semaphore>,
    sessions: SessionHandles,
) {
    loop {
        let permit = match workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        match listener.accept().await {
            Ok((stream, peer)) => {
                log.info(LOG_SOURCE, format!("client {peer} connected"));
                if let Ok(mut set) = connections.lock() {
                    set.insert(peer);
                }

                let registry = registry.clone();
                let settings = settings.clone();
                let session_log = log.clone();
                let connections = connections.clone();
                let handle = tokio::spawn(async move {
                    session::run(stream, peer, registry, settings, session_log).await;
                    if let Ok(mut set) = connections.lock() {
                        set.remove(&peer);
                    }
                    drop(permit);
                });

                if let Ok(mut sessions) = sessions.lock() {
                    sessions.retain(|(_, handle)| !handle.is_finished());
                    sessions.push((peer, handle));
                }
            }
            Err(err) => {
                log.error(LOG_SOURCE, format!("server accept error: {err}"));
            }
        }
    }
}
