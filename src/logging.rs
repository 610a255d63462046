//! Structured logging setup.
//!
//! `-v` raises the default filter from `warn` to `debug`. `-e`/`--stderr`
//! selects stderr as the sink instead of the default stdout, standing in
//! for the syslog-vs-stderr log transport selection a deployed instance
//! would otherwise make at the infrastructure layer.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool, stderr: bool) -> Result<()> {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::from_default_env().add_directive(default_directive.parse()?);
    if stderr {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
