//! Filedepot server binary.
//!
//! A standalone HTTP/1.1 file-management server: clients upload, download,
//! inspect, rename, overwrite and delete files under the `/files` endpoint,
//! while a metadata catalog tracks every stored file and is persisted
//! across restarts. The binary wires settings, the file store and the URL
//! registry together and hands control to the admin console.

mod admin;
mod catalog;
mod config;
mod error;
mod handlers;
mod logging;
mod matcher;
mod media;
mod message;
mod request;
mod response;
mod router;
mod server;
mod session;
mod store;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use crate::admin::Console;
use crate::config::{Args, Settings};
use crate::logging::LogStore;
use crate::router::Registry;
use crate::store::FileStore;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();
    let args = Args::parse();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => Arc::new(settings),
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let log = Arc::new(LogStore::new());

    let store = match FileStore::open(&settings, log.clone()).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let registry = match Registry::new(&settings, store, log.clone()) {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    Console::new(settings, registry, log).run().await;
    ExitCode::SUCCESS
}
