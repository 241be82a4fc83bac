//! Configuration management
//!
//! Command-line and environment configuration for the host. There is no configuration file: the
//! only environment input is the module directory.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::common::{default_module_dir, module_extension, shadow_dir, HostResult};

/// When the reconciliation loop and the console loop stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ShutdownPolicy {
    /// Both loops run until the shared cancellation signal fires.
    #[default]
    OnCancel,
    /// Whichever loop finishes first cancels the other.
    FirstToFinish,
}

/// What a fault inside a capability's handler does to the dispatch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FaultPolicy {
    /// Catch and log per invocation; remaining matches still run.
    #[default]
    Isolate,
    /// Abort the dispatch and end the console loop with the fault.
    Propagate,
}

#[derive(Parser, Debug)]
#[command(name = "rehost", version, about = "Hot-reloadable plugin host")]
pub struct HostArgs {
    /// Directory scanned for modules [default: <executable dir>/modules]
    #[arg(long, env = "REHOST_MODULE_DIR")]
    pub module_dir: Option<PathBuf>,

    /// Backstop rescan interval, in seconds
    #[arg(long, default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Quiet period after a filesystem event before rescanning, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub debounce_ms: u64,

    #[arg(long, value_enum, default_value_t = ShutdownPolicy::OnCancel)]
    pub shutdown_policy: ShutdownPolicy,

    #[arg(long, value_enum, default_value_t = FaultPolicy::Isolate)]
    pub fault_policy: FaultPolicy,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub module_dir: PathBuf,
    /// Module files are the directory entries with this extension.
    pub module_extension: String,
    pub shadow_dir: PathBuf,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub shutdown_policy: ShutdownPolicy,
    pub fault_policy: FaultPolicy,
}

impl HostConfig {
    /// Defaults for a given module directory.
    pub fn for_dir(module_dir: impl Into<PathBuf>) -> Self {
        Self {
            module_dir: module_dir.into(),
            module_extension: module_extension().to_string(),
            shadow_dir: shadow_dir(),
            poll_interval: Duration::from_secs(5),
            debounce: Duration::from_millis(200),
            shutdown_policy: ShutdownPolicy::default(),
            fault_policy: FaultPolicy::default(),
        }
    }

    pub fn from_args(args: HostArgs) -> HostResult<Self> {
        let module_dir = match args.module_dir {
            Some(dir) => dir,
            None => default_module_dir()?,
        };

        Ok(Self {
            poll_interval: Duration::from_secs(args.poll_interval_secs.max(1)),
            debounce: Duration::from_millis(args.debounce_ms),
            shutdown_policy: args.shutdown_policy,
            fault_policy: args.fault_policy,
            ..Self::for_dir(module_dir)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = HostArgs::try_parse_from(["rehost", "--module-dir", "/tmp/mods"]).unwrap();
        let config = HostConfig::from_args(args).unwrap();

        assert_eq!(config.module_dir, PathBuf::from("/tmp/mods"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.debounce, Duration::from_millis(200));
        assert_eq!(config.shutdown_policy, ShutdownPolicy::OnCancel);
        assert_eq!(config.fault_policy, FaultPolicy::Isolate);
    }

    #[test]
    fn test_policies_parse_from_kebab_case() {
        let args = HostArgs::try_parse_from([
            "rehost",
            "--module-dir",
            "/tmp/mods",
            "--shutdown-policy",
            "first-to-finish",
            "--fault-policy",
            "propagate",
            "--poll-interval-secs",
            "0",
        ])
        .unwrap();
        let config = HostConfig::from_args(args).unwrap();

        assert_eq!(config.shutdown_policy, ShutdownPolicy::FirstToFinish);
        assert_eq!(config.fault_policy, FaultPolicy::Propagate);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }
}
