//! Administrator console: a line-based control surface on stdin.
//!
//! The console owns the server lifecycle. Commands are processed one at a
//! time, so a slow shutdown simply delays the next prompt instead of
//! racing it.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Settings;
use crate::logging::{LogLevel, LogStore};
use crate::router::Registry;
use crate::server::Server;

const LOG_FILE: &str = "logs.txt";
const SAVE_FLAG: &str = "--save";

const COMMAND_MENU: &str = "\
List of admin commands:

.start              Start server.
.restart            Restart server.
.shutdown           Shut down the server.
.status             List the server status.
.connections        List all the active client ip addresses.
.log                Print logs (enter '--info', '--error' or '--warn' for specific logs).
.clear              Clear text window.
.help               Print the command inputs.
.end                Shut down application (enter '--save' to save logs to local file).";

enum Flow {
    Continue,
    Exit,
}

/// The interactive console driving one server instance.
pub struct Console {
    settings: Arc<Settings>,
    registry: Arc<Registry>,
    log: Arc<LogStore>,
    server: Option<Server>,
}

impl Console {
    pub fn new(settings: Arc<Settings>, registry: Arc<Registry>, log: Arc<LogStore>) -> Self {
        Self {
            settings,
            registry,
            log,
            server: None,
        }
    }

    /// Read commands from stdin until `.end` or end of input.
    pub async fn run(&mut self) {
        println!("Enter '.help' for the list of admin commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Flow::Exit = self.handle(line.trim()).await {
                break;
            }
        }
    }

    async fn handle(&mut self, input: &str) -> Flow {
        let (command, argument) = match input.split_once(' ') {
            Some((command, argument)) => (command, Some(argument.trim())),
            None => (input, None),
        };
        match command {
            ".start" => self.start().await,
            ".restart" => self.restart().await,
            ".shutdown" => self.shutdown().await,
            ".status" => self.status(),
            ".connections" => self.connections(),
            ".log" => self.print_log(argument),
            ".clear" => {
                print!("\x1b[2J\x1b[1;1H");
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }
            ".help" => println!("{COMMAND_MENU}\n"),
            ".end" => return self.end(argument),
            _ => println!("'{input}' is not a valid command.\n"),
        }
        Flow::Continue
    }

    async fn start(&mut self) {
        if self.server.is_some() {
            println!("Server is already running.\n");
            return;
        }
        match Server::start(
            self.settings.clone(),
            self.registry.clone(),
            self.log.clone(),
        )
        .await
        {
            Ok(server) => {
                println!(
                    "Server host name '{}', running on port {}.\n",
                    self.settings.host,
                    server.local_addr().port()
                );
                self.server = Some(server);
            }
            Err(err) => {
                self.log
                    .error("admin", format!("failed to start server: {err}"));
                println!("Failed to start server: {err}\n");
            }
        }
    }

    async fn restart(&mut self) {
        match self.server.take() {
            Some(server) => {
                self.log.info("admin", "admin restarting server");
                println!("Server restart initiated.. this might take a moment.");
                server.shutdown().await;
                self.start().await;
                if self.server.is_some() {
                    println!("Server restarted successfully!\n");
                }
            }
            None => println!("The server is not running.. nothing to restart.\n"),
        }
    }

    async fn shutdown(&mut self) {
        match self.server.take() {
            Some(server) => {
                self.log.info("admin", "admin shutting down server");
                println!("Server shut down initiated.. this might take a moment.");
                server.shutdown().await;
                println!("Server shutdown complete.\n");
            }
            None => println!("The server is not running.. nothing to shut down.\n"),
        }
    }

    fn status(&self) {
        match &self.server {
            Some(server) => println!("{}\n", server.status()),
            None => println!("The server is not running.\n"),
        }
    }

    fn connections(&self) {
        match &self.server {
            Some(server) => println!("{}\n", server.connections()),
            None => println!("The server is not running.\n"),
        }
    }

    fn print_log(&self, argument: Option<&str>) {
        match argument {
            None => println!("{}\n", self.log.all()),
            Some(flag) => match LogLevel::parse_flag(flag) {
                Some(level) => println!("{}\n", self.log.by_level(level)),
                None => println!("'{flag}' is not a valid log type command.\n"),
            },
        }
    }

    /// `.end` refuses to exit while the server runs; `--save` persists
    /// the log buffer first.
    fn end(&mut self, argument: Option<&str>) -> Flow {
        if self.server.is_some() {
            println!("Shut down server manually before closing application.\n");
            return Flow::Continue;
        }
        if argument == Some(SAVE_FLAG) {
            match std::fs::write(LOG_FILE, self.log.all()) {
                Ok(()) => println!("Logs were saved to file '{LOG_FILE}'."),
                Err(err) => println!("Failed to write logs to file: {err}"),
            }
        }
        Flow::Exit
    }
}
