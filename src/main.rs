//! mcp-testkit - exercise an MCP server from the command line
//!
#![doc = "Main entry point for the mcp-testkit command-line tool."]

use anyhow::Result;

use mcp_testkit::cli::{self, Cli};
use mcp_testkit::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse_args();
    cli::run(cli).await
}
