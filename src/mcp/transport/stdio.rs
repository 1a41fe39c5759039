//! Stdio transport for MCP child-process servers
//!
//! This module implements [`StdioTransport`], which spawns a child process
//! and communicates with it over its stdin/stdout pipes using
//! newline-delimited JSON framing.
//!
//! # Protocol
//!
//! - Outbound messages are written to the child's stdin as a single JSON
//!   object followed by a newline (`\n`).
//! - Inbound messages are read from the child's stdout, one JSON object per
//!   line (newline stripped, blank lines skipped).
//! - The child's stderr is diagnostic only. It is always drained so the
//!   child never blocks on a full pipe, and each line is logged under the
//!   `mcp_testkit::server` target when [`LaunchOptions::debug`] is set.
//!
//! # Lifecycle
//!
//! Three background Tokio tasks are started by [`StdioTransport::spawn`]:
//! a stdin writer, a stdout reader, and a stderr drain. [`Transport::terminate`]
//! (and `Drop`) sends a best-effort SIGTERM (Unix) or `start_kill`
//! (non-Unix) to the child and returns immediately.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use crate::error::{Result, TestkitError};
use crate::mcp::transport::Transport;

/// Tracing target for output produced by the server process itself.
pub const SERVER_LOG_TARGET: &str = "mcp_testkit::server";

/// Everything needed to start a server process.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Program to execute.
    pub command: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Complete environment of the child; nothing else is inherited.
    pub env: BTreeMap<OsString, OsString>,
    /// Working directory; inherits the parent's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Surface server stderr and exit through `tracing`.
    pub debug: bool,
}

/// Stdio-based MCP transport that drives a child process.
#[derive(Debug)]
pub struct StdioTransport {
    /// Sender side of the stdin channel; `send()` writes here.
    stdin_tx: mpsc::UnboundedSender<String>,
    /// Shared receiver for stdout lines (one JSON message per line).
    stdout_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Handle to the spawned child process.
    child: std::sync::Mutex<Child>,
    /// OS process id, captured at spawn time.
    pid: Option<u32>,
    /// Set once a termination signal has been sent.
    terminated: AtomicBool,
}

impl StdioTransport {
    /// Spawn a child process and wire up stdio pipes.
    ///
    /// The child's environment is exactly `options.env`; callers merge the
    /// ambient environment in beforehand (see
    /// [`crate::config::SessionConfig::effective_environment`]).
    ///
    /// # Errors
    ///
    /// Returns [`TestkitError::Launch`] if the process cannot be spawned or
    /// if any stdio pipe is unavailable after spawn. In the latter case the
    /// child is killed before returning.
    pub fn spawn(options: &LaunchOptions) -> Result<Self> {
        let mut cmd = Command::new(&options.command);
        cmd.args(&options.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.env_clear().envs(&options.env);
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            TestkitError::Launch(format!(
                "failed to spawn MCP server `{}`: {}",
                options.command, e
            ))
        })?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.start_kill();
                return Err(TestkitError::Launch(format!(
                    "stdio pipes of `{}` unavailable after spawn",
                    options.command
                ))
                .into());
            }
        };

        let pid = child.id();
        let debug = options.debug;
        let command = options.command.clone();
        tracing::debug!(pid, command = %command, "spawned MCP server");

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel::<String>();

        // stdin_rx -> child stdin
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = stdin_rx.recv().await {
                let line = format!("{}\n", msg);
                if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err()
                {
                    break;
                }
            }
        });

        // child stdout -> stdout_tx
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if stdout_tx.send(trimmed.to_string()).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        if debug {
                            tracing::info!(target: SERVER_LOG_TARGET, pid, "server closed stdout");
                        }
                        break;
                    }
                    Err(e) => {
                        if debug {
                            tracing::info!(target: SERVER_LOG_TARGET, pid, "stdout read failed: {e}");
                        }
                        break;
                    }
                }
            }
        });

        // child stderr -> log sink
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if debug {
                    tracing::info!(target: SERVER_LOG_TARGET, pid, "{}", line);
                }
            }
        });

        Ok(Self {
            stdin_tx,
            stdout_rx: Arc::new(Mutex::new(stdout_rx)),
            child: std::sync::Mutex::new(child),
            pid,
            terminated: AtomicBool::new(false),
        })
    }

    /// Non-blocking check for process exit. Returns the exit code if known.
    pub fn try_exit_status(&self) -> Option<std::process::ExitStatus> {
        let mut child = self.child.lock().ok()?;
        child.try_wait().ok().flatten()
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    /// Enqueue a JSON-RPC message for the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`TestkitError::Transport`] if the writer task has exited.
    async fn send(&self, message: String) -> Result<()> {
        self.stdin_tx.send(message).map_err(|e| {
            TestkitError::Transport(format!("stdin channel closed: {}", e)).into()
        })
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.stdout_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    /// Send SIGTERM (Unix) or `start_kill` (elsewhere) once; never waits.
    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.try_exit_status().is_some() {
            return;
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                tracing::debug!(pid, "sending SIGTERM to MCP server");
                // SAFETY: pid was obtained from tokio::process::Child and the
                // child has not been reaped (try_wait above returned None).
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Ok(mut child) = self.child.lock() {
                let _ = child.start_kill();
            }
        }
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn cat_options() -> LaunchOptions {
        LaunchOptions {
            command: "cat".to_string(),
            env: std::env::vars_os().collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_executable_returns_launch_error() {
        let result = StdioTransport::spawn(&LaunchOptions {
            command: "/nonexistent/binary/that/does/not/exist".to_string(),
            ..Default::default()
        });
        let err = result.expect_err("expected error for missing executable");
        assert!(matches!(
            err.downcast_ref::<TestkitError>(),
            Some(TestkitError::Launch(_))
        ));
    }

    #[tokio::test]
    async fn test_cat_echoes_message_on_receive() {
        let transport = StdioTransport::spawn(&cat_options()).expect("failed to spawn cat");

        let msg = r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#.to_string();
        transport.send(msg.clone()).await.unwrap();

        let mut stream = transport.receive();
        let received = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended unexpectedly");

        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn test_terminate_ends_receive_stream() {
        let transport = StdioTransport::spawn(&cat_options()).expect("failed to spawn cat");

        transport.terminate();
        // Idempotent.
        transport.terminate();

        let mut stream = transport.receive();
        let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("stream did not end after terminate");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_child_sees_only_given_environment() {
        let mut env = BTreeMap::new();
        env.insert(OsString::from("TESTKIT_MARKER"), OsString::from("present"));
        if let Some(path) = std::env::var_os("PATH") {
            env.insert(OsString::from("PATH"), path);
        }
        let transport = StdioTransport::spawn(&LaunchOptions {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo \"$TESTKIT_MARKER:${HOME:-unset}\"".to_string(),
            ],
            env,
            ..Default::default()
        })
        .expect("failed to spawn sh");

        let mut stream = transport.receive();
        let line = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended");
        assert_eq!(line, "present:unset");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_receives_non_utf8_values_untouched() {
        use std::os::unix::ffi::OsStrExt;

        let mut env = BTreeMap::new();
        env.insert(
            OsString::from("TESTKIT_BINARY"),
            std::ffi::OsStr::from_bytes(b"\xff\xfe").to_os_string(),
        );
        if let Some(path) = std::env::var_os("PATH") {
            env.insert(OsString::from("PATH"), path);
        }
        let transport = StdioTransport::spawn(&LaunchOptions {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "printf '%s' \"$TESTKIT_BINARY\" | od -An -tx1".to_string(),
            ],
            env,
            ..Default::default()
        })
        .expect("failed to spawn sh");

        let mut stream = transport.receive();
        let line = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended");
        assert_eq!(line, "ff fe");
    }
}
