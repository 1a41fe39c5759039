//! Tracing setup
//!
//! The library only emits `tracing` events. Binaries call [`init_tracing`];
//! test suites call [`init_test_tracing`], which can be invoked from every
//! test without panicking on the second install.
//!
//! Output produced by the server process is logged under the
//! [`SERVER_LOG_TARGET`] target, so `RUST_LOG=mcp_testkit::server=info`
//! isolates it.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::mcp::transport::stdio::SERVER_LOG_TARGET;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "mcp_testkit=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber for command-line use.
///
/// Logs go to stderr so stdout stays free for JSON output.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Install a subscriber that writes through the test harness's capture.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
