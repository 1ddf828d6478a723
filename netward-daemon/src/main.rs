use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

use netward_core::error::NetwardError;
use netward_daemon::cli::DaemonCli;
use netward_daemon::logging::init_tracing;
use netward_daemon::runner::{Runner, Target};
use netward_daemon::settings::{apply_cli_overrides, load_config, resolve_self_container};
use netward_network_guard::{BollardConnector, GuardConfig, NetworkGuardBuilder};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = load_config(&cli.config).await?;
    apply_cli_overrides(&mut config, &cli)?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    resolve_self_container(&mut config);

    let guard_config = GuardConfig::from_core(&config);
    tracing::info!(
        public_network = guard_config.public_network.as_str(),
        isolated_network = guard_config.isolated_network.as_str(),
        self_container = guard_config.self_container.as_deref().unwrap_or(""),
        "netward-daemon starting"
    );

    let guard = NetworkGuardBuilder::new()
        .connector(BollardConnector::from_config(&guard_config))
        .config(guard_config)
        .build()
        .map_err(NetwardError::from)
        .context("failed to build network guard")?;

    let target = match cli.container {
        Some(container) => Target::Container(container),
        None => Target::All,
    };
    let interval = match config.policy.bootstrap_interval_secs {
        0 => None,
        _ if cli.once => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let runner = Runner::new(guard, target, interval);
    let summary = runner
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!(
        scanned = summary.scanned,
        remediated = summary.remediated,
        failed = summary.failed,
        "netward-daemon finished"
    );

    if summary.failed > 0 {
        bail!(
            "{} container(s) failed network policy enforcement",
            summary.failed
        );
    }
    Ok(())
}
