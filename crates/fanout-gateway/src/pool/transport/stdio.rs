//! STDIO transport for backends
//!
//! Spawns the backend as a child process speaking the protocol over
//! stdin/stdout. The child gets a cleared environment rebuilt from the
//! resolved map, so nothing leaks from the proxy besides the inherited
//! baseline.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::TransportType;
use super::{create_client_handler, Transport, TransportConnectResult};

/// STDIO transport for child process backends
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    backend: String,
    connect_timeout: Duration,
}

impl StdioTransport {
    pub fn new(
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        backend: String,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            command,
            args,
            env,
            backend,
            connect_timeout,
        }
    }

    /// Locate the program on the child's own PATH, not the proxy's.
    fn resolve_program(&self) -> Result<std::path::PathBuf, String> {
        let cwd = std::env::current_dir()
            .map_err(|e| format!("Failed to read working directory: {}", e))?;
        let path = self.env.get("PATH");
        which::which_in(&self.command, path, &cwd)
            .or_else(|_| which::which_in(format!("{}.exe", &self.command), path, &cwd))
            .map_err(|_| {
                format!(
                    "Command not found: {}. Ensure it's installed and in PATH.",
                    self.command
                )
            })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self) -> TransportConnectResult {
        info!(
            backend = %self.backend,
            command = %self.command,
            "Connecting to STDIO backend"
        );

        let command_path = match self.resolve_program() {
            Ok(path) => path,
            Err(err) => {
                error!(backend = %self.backend, "{}", err);
                return TransportConnectResult::Failed(err);
            }
        };

        debug!(backend = %self.backend, path = ?command_path, "Found command");

        let args = self.args.clone();
        let env = self.env.clone();

        let transport =
            match TokioChildProcess::new(Command::new(&command_path).configure(move |cmd| {
                cmd.args(&args)
                    .env_clear()
                    .envs(&env)
                    .stderr(Stdio::inherit())
                    .kill_on_drop(true);
            })) {
                Ok(t) => t,
                Err(e) => {
                    let err = format!("Failed to spawn process: {}", e);
                    error!(backend = %self.backend, "{}", err);
                    return TransportConnectResult::Failed(err);
                }
            };

        let client_handler = create_client_handler(&self.backend);

        let connect_future = client_handler.serve(transport);
        let client = match tokio::time::timeout(self.connect_timeout, connect_future).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                let err = format!("MCP handshake failed: {}", e);
                error!(backend = %self.backend, "{}", err);
                return TransportConnectResult::Failed(err);
            }
            Err(_) => {
                let err = format!("Connection timeout ({:?})", self.connect_timeout);
                error!(backend = %self.backend, "{}", err);
                return TransportConnectResult::Failed(err);
            }
        };

        info!(backend = %self.backend, "STDIO backend connected");
        TransportConnectResult::Connected(client)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn description(&self) -> String {
        format!("stdio:{}", self.command)
    }
}
