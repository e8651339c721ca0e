//! STDIO transports.
//!
//! The server variant reads requests from stdin and writes responses
//! to stdout; diagnostics go through `tracing` (stderr in a typical
//! subscriber setup), never the message stream. The client variant
//! spawns a peer as a child process with a scrubbed environment: only
//! an allowlist of inherited variables plus explicitly passed ones
//! reach the child.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use portico_mcp_core::protocol::JsonRpcMessage;

use crate::framing::LineFramed;
use crate::{Result, Transport, TransportError};

/// Inherited by default when spawning a peer process.
#[cfg(unix)]
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "USER", "LANG", "TERM", "SHELL"];
#[cfg(windows)]
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "USERNAME",
    "USERPROFILE",
    "SYSTEMROOT",
    "TEMP",
    "APPDATA",
];

/// Server-side STDIO transport over the process's own stdin/stdout.
pub struct StdioTransport {
    framed: Option<LineFramed<tokio::io::Stdin, tokio::io::Stdout>>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            framed: Some(LineFramed::new(tokio::io::stdin(), tokio::io::stdout())),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        match self.framed.as_mut() {
            Some(framed) => framed.send(&message).await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn receive(&mut self) -> Result<JsonRpcMessage> {
        match self.framed.as_mut() {
            Some(framed) => framed.receive().await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut framed) = self.framed.take() {
            let _ = framed.shutdown().await;
        }
        debug!("stdio transport closed");
        Ok(())
    }
}

/// Configuration for spawning a peer over STDIO.
#[derive(Debug, Clone)]
pub struct StdioClientConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Explicit environment for the child.
    pub env: HashMap<String, String>,
    /// Parent variables forwarded to the child. Defaults to
    /// [`DEFAULT_ENV_ALLOWLIST`]; nothing else is inherited.
    pub inherited_env: Vec<String>,
    /// How long to wait for the child to exit after stdin EOF before
    /// killing it.
    pub shutdown_grace: Duration,
}

impl StdioClientConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            inherited_env: DEFAULT_ENV_ALLOWLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            shutdown_grace: Duration::from_secs(5),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Client-side transport that owns a spawned child process.
pub struct StdioClientTransport {
    child: Option<Child>,
    framed: Option<LineFramed<ChildStdout, ChildStdin>>,
    shutdown_grace: Duration,
    exit_status: Option<std::process::ExitStatus>,
}

impl StdioClientTransport {
    /// Spawn the configured command with a scrubbed environment.
    pub fn spawn(config: StdioClientConfig) -> Result<Self> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for key in &config.inherited_env {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| TransportError::ConnectionFailed {
            message: format!("failed to spawn '{}': {e}", config.command),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed {
                message: "child stdin unavailable".to_string(),
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed {
                message: "child stdout unavailable".to_string(),
            })?;

        debug!(command = %config.command, "spawned stdio peer");
        Ok(Self {
            child: Some(child),
            framed: Some(LineFramed::new(stdout, stdin)),
            shutdown_grace: config.shutdown_grace,
            exit_status: None,
        })
    }

    /// Exit status of the child, available after `close`.
    pub fn exit_status(&self) -> Option<std::process::ExitStatus> {
        self.exit_status
    }
}

#[async_trait]
impl Transport for StdioClientTransport {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        match self.framed.as_mut() {
            Some(framed) => framed.send(&message).await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn receive(&mut self) -> Result<JsonRpcMessage> {
        match self.framed.as_mut() {
            Some(framed) => framed.receive().await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the framed pair closes the child's stdin (EOF).
        drop(self.framed.take());

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(%status, "stdio peer exited");
                    self.exit_status = Some(status);
                }
                Ok(Err(e)) => {
                    return Err(TransportError::ReceiveFailed {
                        message: format!("waiting for child: {e}"),
                    });
                }
                Err(_) => {
                    warn!("stdio peer did not exit in time, killing");
                    child.kill().await.map_err(|e| TransportError::SendFailed {
                        message: format!("killing child: {e}"),
                    })?;
                    if let Ok(status) = child.wait().await {
                        self.exit_status = Some(status);
                    }
                }
            }
        }
        Ok(())
    }
}
