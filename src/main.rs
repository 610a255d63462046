//! reuseportd — caches pre-bound, port-reuse-capable listening sockets
//! behind a local control socket.
//!
//! Run `reuseportd --help` for usage.

use anyhow::{Context, Result};
use clap::Parser;
use reuseportd_core::context::{install_signal_handlers, DaemonContext};
use reuseportd_core::event_loop;
use std::time::Duration;

mod cli;
mod endpoint;
mod logging;
mod privilege;

use cli::Cli;

/// Bounded per-client I/O deadline; not configurable via the CLI.
const CLIENT_IO_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.stderr)?;

    let listener = endpoint::bind(&cli.path, cli.umask_mode())
        .with_context(|| format!("failed to bind control endpoint at {}", cli.path.display()))?;

    let mut cleanup = endpoint::CleanupGuard::new(cli.path.clone());

    // Runs on every invocation, independent of `-d`: hardens the default
    // file-creation mask for the remainder of the process once the
    // endpoint itself (which manages its own umask) is already bound.
    privilege::harden_default_umask();

    if let Some(spec) = &cli.drop_to {
        let identity = privilege::parse_id_string(spec)?;
        privilege::drop_privilege(&identity)?;
        // The dropped process commonly can't unlink the endpoint anymore;
        // don't retry cleanup with elevated rights it no longer has.
        cleanup.disarm();
        tracing::info!(target = %spec, "dropped privileges");
    }

    install_signal_handlers();

    let capacity = cli.effective_cache_capacity();
    let keepalive_secs = cli.effective_keepalive_secs();
    let keepalive = Duration::from_secs_f64(keepalive_secs);
    let mut ctx = DaemonContext::new(listener, capacity, keepalive, CLIENT_IO_TIMEOUT);

    tracing::info!(
        path = %cli.path.display(),
        capacity,
        keepalive_secs,
        "reuseportd listening"
    );

    event_loop::run(&mut ctx)?;

    tracing::info!("terminated, shutting down");
    Ok(())
}
