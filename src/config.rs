//! Session configuration
//!
//! [`SessionConfig`] describes how to launch and talk to one server under
//! test. It can be built in code with the builder methods or loaded from a
//! YAML file with [`SessionConfig::from_file`].

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TestkitError};

/// Default per-call deadline in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Transport used to reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process speaking newline-delimited JSON over stdin/stdout.
    #[default]
    Stdio,
    /// Streamable HTTP. Accepted by the parser, rejected by `connect`.
    Http,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Http => write!(f, "http"),
        }
    }
}

/// Launch parameters for one server under test.
///
/// # Examples
///
/// ```
/// use mcp_testkit::config::SessionConfig;
///
/// let config = SessionConfig::new("node")
///     .arg("server.js")
///     .env("LOG_LEVEL", "debug")
///     .timeout_ms(2000);
/// assert_eq!(config.args, vec!["server.js"]);
/// assert_eq!(config.timeout_ms, 2000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Program to launch
    pub command: String,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,

    /// Overrides merged over the ambient environment.
    ///
    /// A `null` value marks the entry as undefined; it is dropped before the
    /// merge and leaves any ambient value in place.
    #[serde(default)]
    pub env: BTreeMap<String, Option<String>>,

    /// Deadline for the handshake and for every call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Transport kind
    #[serde(default)]
    pub transport: TransportKind,

    /// Endpoint for non-stdio transports; unused for stdio
    #[serde(default)]
    pub server_url: Option<String>,

    /// Surface server stderr and exit through tracing
    #[serde(default)]
    pub debug: bool,

    /// Working directory of the server process
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Client name sent in the handshake
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Client version sent in the handshake
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_client_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl SessionConfig {
    /// Create a configuration that launches `command` with defaults for
    /// everything else.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout_ms: default_timeout_ms(),
            transport: TransportKind::default(),
            server_url: None,
            debug: false,
            working_dir: None,
            client_name: default_client_name(),
            client_version: default_client_version(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment override.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), Some(value.into()));
        self
    }

    /// Add an undefined environment entry; it never reaches the server.
    pub fn unset_env(mut self, key: impl Into<String>) -> Self {
        self.env.insert(key.into(), None);
        self
    }

    /// Set the per-call deadline.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the transport kind.
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Set the server URL for non-stdio transports.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Enable or disable server diagnostics.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the server's working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Load a configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`TestkitError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TestkitError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TestkitError::Config(format!("Failed to parse config: {}", e)).into())
    }

    /// Apply `MCP_TESTKIT_*` overrides from the process environment.
    ///
    /// Used by the command-line tool only; library sessions never read the
    /// environment for configuration.
    pub fn apply_env_vars(&mut self) {
        if let Ok(raw) = std::env::var("MCP_TESTKIT_TIMEOUT_MS") {
            if let Ok(value) = raw.parse() {
                self.timeout_ms = value;
            } else {
                tracing::warn!("Invalid MCP_TESTKIT_TIMEOUT_MS: {}", raw);
            }
        }

        if let Ok(raw) = std::env::var("MCP_TESTKIT_DEBUG") {
            match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.debug = true,
                "0" | "false" | "no" | "off" => self.debug = false,
                _ => tracing::warn!("Invalid MCP_TESTKIT_DEBUG: {}", raw),
            }
        }
    }

    /// Check the configuration for values that can never work.
    ///
    /// # Errors
    ///
    /// Returns [`TestkitError::Config`] for an empty command or a zero
    /// timeout.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(TestkitError::Config("command cannot be empty".to_string()).into());
        }

        if self.timeout_ms == 0 {
            return Err(
                TestkitError::Config("timeout_ms must be greater than 0".to_string()).into(),
            );
        }

        Ok(())
    }

    /// Merge the configured overrides over `ambient`.
    ///
    /// Undefined overrides are dropped first, so an ambient value for the
    /// same key survives. Defined overrides replace ambient values. Ambient
    /// entries are carried as `OsString`, so values that are not valid
    /// UTF-8 pass through untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::ffi::OsStr;
    /// use mcp_testkit::config::SessionConfig;
    ///
    /// let config = SessionConfig::new("srv").env("A", "override").unset_env("B");
    /// let merged = config.effective_environment([("A", "ambient"), ("B", "kept")]);
    /// assert_eq!(merged[OsStr::new("A")], "override");
    /// assert_eq!(merged[OsStr::new("B")], "kept");
    /// ```
    pub fn effective_environment<I, K, V>(&self, ambient: I) -> BTreeMap<OsString, OsString>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut merged: BTreeMap<OsString, OsString> = ambient
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        for (key, value) in &self.env {
            if let Some(value) = value {
                merged.insert(OsString::from(key), OsString::from(value));
            }
        }
        merged
    }
}
