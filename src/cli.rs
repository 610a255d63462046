//! CLI definitions for reuseportd.

use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Falls back to when `--cache-capacity` is absent or not positive.
const DEFAULT_CACHE_CAPACITY: usize = 512;
/// Falls back to when `--keepalive` is absent or not positive.
const DEFAULT_KEEPALIVE_SECS: f64 = 3600.0;

#[derive(Parser)]
#[clap(
    name = "reuseportd",
    version,
    about = "Caches pre-bound, port-reuse-capable listening sockets behind a local socket",
    long_about = None
)]
#[clap(group(
    ArgGroup::new("umask_mode")
        .args(["world_writable", "group_accessible", "user_only"])
        .multiple(false)
))]
pub struct Cli {
    /// Filesystem path for the local control endpoint
    pub path: PathBuf,

    /// Maximum number of cached listening sockets
    #[clap(short = 'c', long = "cache-capacity", default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// Seconds an idle cache entry survives before keepalive eviction
    #[clap(short = 'k', long = "keepalive", default_value_t = DEFAULT_KEEPALIVE_SECS)]
    pub keepalive_secs: f64,

    /// Drop privileges to `user:group` after binding the endpoint (requires root)
    #[clap(short = 'd', long = "drop", value_name = "USER:GROUP")]
    pub drop_to: Option<String>,

    /// Also log to stderr (in addition to the default sink)
    #[clap(short = 'e', long = "stderr")]
    pub stderr: bool,

    /// Increase log verbosity
    #[clap(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Create the endpoint world-writable (umask 0)
    #[clap(short = 'w', long = "world")]
    pub world_writable: bool,

    /// Create the endpoint group-accessible (umask 0007)
    #[clap(short = 'g', long = "group")]
    pub group_accessible: bool,

    /// Create the endpoint user-only (umask 0077)
    #[clap(short = 'u', long = "user")]
    pub user_only: bool,
}

/// The four umask policies named in the endpoint's external interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UmaskMode {
    Default,
    WorldWritable,
    GroupAccessible,
    UserOnly,
}

impl Cli {
    pub fn umask_mode(&self) -> UmaskMode {
        if self.world_writable {
            UmaskMode::WorldWritable
        } else if self.group_accessible {
            UmaskMode::GroupAccessible
        } else if self.user_only {
            UmaskMode::UserOnly
        } else {
            UmaskMode::Default
        }
    }

    /// Cache capacity to actually run with: a non-positive value (only
    /// reachable via `--cache-capacity 0`, since `usize` rejects negatives
    /// at parse time) silently keeps the default instead of disabling
    /// capacity eviction.
    pub fn effective_cache_capacity(&self) -> usize {
        if self.cache_capacity > 0 {
            self.cache_capacity
        } else {
            DEFAULT_CACHE_CAPACITY
        }
    }

    /// Keepalive duration to actually run with: a non-positive value
    /// silently keeps the default rather than reaching
    /// `Duration::from_secs_f64` with a negative or zero input.
    pub fn effective_keepalive_secs(&self) -> f64 {
        if self.keepalive_secs > 0.0 {
            self.keepalive_secs
        } else {
            DEFAULT_KEEPALIVE_SECS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn umask_flags_reject_conflicting_combinations() {
        let err = Cli::try_parse_from(["reuseportd", "/tmp/x.sock", "-w", "-g"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn default_umask_mode_when_no_flag_given() {
        let cli = Cli::try_parse_from(["reuseportd", "/tmp/x.sock"]).unwrap();
        assert_eq!(cli.umask_mode(), UmaskMode::Default);
    }

    #[test]
    fn user_only_flag_is_recognized() {
        let cli = Cli::try_parse_from(["reuseportd", "/tmp/x.sock", "-u"]).unwrap();
        assert_eq!(cli.umask_mode(), UmaskMode::UserOnly);
    }

    #[test]
    fn zero_cache_capacity_falls_back_to_default() {
        let cli = Cli::try_parse_from(["reuseportd", "/tmp/x.sock", "-c", "0"]).unwrap();
        assert_eq!(cli.effective_cache_capacity(), DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn positive_cache_capacity_is_honored() {
        let cli = Cli::try_parse_from(["reuseportd", "/tmp/x.sock", "-c", "10"]).unwrap();
        assert_eq!(cli.effective_cache_capacity(), 10);
    }

    #[test]
    fn negative_keepalive_falls_back_to_default() {
        let cli = Cli::try_parse_from(["reuseportd", "/tmp/x.sock", "--keepalive=-1"]).unwrap();
        assert_eq!(cli.effective_keepalive_secs(), DEFAULT_KEEPALIVE_SECS);
    }

    #[test]
    fn zero_keepalive_falls_back_to_default() {
        let cli = Cli::try_parse_from(["reuseportd", "/tmp/x.sock", "-k", "0"]).unwrap();
        assert_eq!(cli.effective_keepalive_secs(), DEFAULT_KEEPALIVE_SECS);
    }

    #[test]
    fn positive_keepalive_is_honored() {
        let cli = Cli::try_parse_from(["reuseportd", "/tmp/x.sock", "-k", "30"]).unwrap();
        assert_eq!(cli.effective_keepalive_secs(), 30.0);
    }
}
