//! Configuration resolution for the daemon.
//!
//! Precedence: CLI flags, then environment variables, then `netward.toml`,
//! then built-in defaults. A missing config file falls back to defaults.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use netward_core::config::NetwardConfig;
use netward_core::error::{ConfigError, NetwardError};

use crate::cli::DaemonCli;

/// Marker file Docker creates in every container's root filesystem.
pub const DOCKERENV_PATH: &str = "/.dockerenv";

/// Load `netward.toml`, falling back to defaults (plus env overrides) when the
/// file does not exist.
pub async fn load_config(path: &Path) -> Result<NetwardConfig> {
    match NetwardConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(NetwardError::Config(ConfigError::FileNotFound { .. })) => {
            debug!(path = %path.display(), "config file not found, using defaults");
            let mut config = NetwardConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e).with_context(|| format!("failed to load {}", path.display())),
    }
}

/// Apply CLI overrides on top of a loaded config and re-validate.
pub fn apply_cli_overrides(config: &mut NetwardConfig, cli: &DaemonCli) -> Result<()> {
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    config
        .validate()
        .context("invalid configuration after CLI overrides")
}

/// Decide which container this process runs in.
///
/// An explicitly configured value wins; inside a container the hostname
/// (Docker sets it to the short container ID) is used.
pub fn detect_self_container(
    configured: &str,
    in_container: bool,
    hostname: Option<String>,
) -> Option<String> {
    let configured = configured.trim();
    if !configured.is_empty() {
        return Some(configured.to_owned());
    }
    if !in_container {
        return None;
    }
    hostname
        .map(|h| h.trim().to_owned())
        .filter(|h| !h.is_empty())
}

/// Fill `policy.self_container` from the environment when it is unset.
pub fn resolve_self_container(config: &mut NetwardConfig) {
    let in_container = Path::new(DOCKERENV_PATH).exists();
    if let Some(self_container) = detect_self_container(
        &config.policy.self_container,
        in_container,
        std::env::var("HOSTNAME").ok(),
    ) {
        config.policy.self_container = self_container;
    }
}
