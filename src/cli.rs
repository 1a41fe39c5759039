//! Command-line interface for mcp-testkit
//!
//! `mcp-testkit probe` connects to a server and prints what it exposes;
//! `mcp-testkit call` invokes one tool. Both print JSON on stdout and exit
//! non-zero on failure.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use crate::config::SessionConfig;
use crate::error::{Result, TestkitError};
use crate::mcp::protocol::ServerCapabilityFlag;
use crate::session::Session;

/// mcp-testkit - exercise an MCP server over stdio
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-testkit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Connect, print server info and every listing, then disconnect
    Probe {
        #[command(flatten)]
        server: ServerArgs,
    },

    /// Invoke one tool and print its result
    Call {
        /// Tool name
        #[arg(short, long)]
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        #[command(flatten)]
        server: ServerArgs,
    },
}

/// How to reach the server under test.
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// YAML session configuration; the trailing command is ignored when set
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Per-call deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Log server stderr and exit
    #[arg(short, long)]
    pub debug: bool,

    /// Extra environment for the server (KEY=VALUE, repeatable)
    #[arg(short, long = "env", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Server command line
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    if key.is_empty() {
        return Err(format!("empty key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl ServerArgs {
    /// Resolve a session configuration.
    ///
    /// Precedence, lowest first: config file (or trailing command),
    /// `MCP_TESTKIT_*` environment variables, command-line flags.
    ///
    /// # Errors
    ///
    /// [`TestkitError::Config`] when neither a config file nor a command is
    /// given, or when the result fails validation.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match (&self.config, self.command.split_first()) {
            (Some(path), _) => SessionConfig::from_file(path)?,
            (None, Some((program, args))) => SessionConfig::new(program.clone()).args(args.iter()),
            (None, None) => {
                return Err(TestkitError::Config(
                    "no server given: pass --config FILE or a command line".to_string(),
                )
                .into())
            }
        };

        config.apply_env_vars();

        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if self.debug {
            config.debug = true;
        }
        for (key, value) in &self.env {
            config.env.insert(key.clone(), Some(value.clone()));
        }

        config.validate()?;
        Ok(config)
    }
}

/// Execute the parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Probe { server } => probe(server.session_config()?).await,
        Commands::Call { tool, args, server } => {
            let arguments: serde_json::Value = serde_json::from_str(&args).map_err(|e| {
                TestkitError::Config(format!("--args is not valid JSON: {}", e))
            })?;
            call(server.session_config()?, &tool, arguments).await
        }
    }
}

async fn probe(config: SessionConfig) -> Result<()> {
    let session = Session::new(config);
    session.connect().await?;
    let outcome = probe_connected(&session).await;
    session.disconnect().await;

    println!("{}", serde_json::to_string_pretty(&outcome?)?);
    Ok(())
}

async fn probe_connected(session: &Session) -> Result<serde_json::Value> {
    let info = session.get_server_info().await?;

    let tools = if session.supports(ServerCapabilityFlag::Tools)? {
        session.list_tools().await?
    } else {
        Vec::new()
    };
    let resources = if session.supports(ServerCapabilityFlag::Resources)? {
        session.list_resources().await?
    } else {
        Vec::new()
    };
    let prompts = if session.supports(ServerCapabilityFlag::Prompts)? {
        session.list_prompts().await?
    } else {
        Vec::new()
    };

    tracing::debug!(
        tools = tools.len(),
        resources = resources.len(),
        prompts = prompts.len(),
        "probe complete"
    );

    Ok(json!({
        "serverInfo": info,
        "tools": tools,
        "resources": resources,
        "prompts": prompts,
    }))
}

async fn call(config: SessionConfig, tool: &str, arguments: serde_json::Value) -> Result<()> {
    let session = Session::new(config);
    session.connect().await?;
    let outcome = session.call_tool(tool, arguments).await;
    session.disconnect().await;

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.is_error == Some(true) {
        return Err(anyhow::anyhow!("tool `{}` reported an error", tool));
    }
    Ok(())
}
