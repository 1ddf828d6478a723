//! CLI argument definitions for netward-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// netward container network isolation daemon.
///
/// Scans running containers for the security label and moves labelled
/// containers off the public network onto the isolated one.
#[derive(Parser, Debug)]
#[command(name = "netward-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to netward.toml configuration file.
    ///
    /// A missing file is not an error: defaults and environment variables apply.
    #[arg(short, long, default_value = "/etc/netward/netward.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without contacting Docker.
    #[arg(long)]
    pub validate: bool,

    /// Run a single bootstrap pass even if an interval is configured.
    #[arg(long)]
    pub once: bool,

    /// Enforce the policy on one container (ID or name) instead of all.
    #[arg(long, value_name = "ID_OR_NAME")]
    pub container: Option<String>,
}
