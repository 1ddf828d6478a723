//! Bootstrap pass scheduling.
//!
//! The [`Runner`] drives the network-policy bootstrapper: a single pass over
//! one container or all running containers, optionally repeated on an
//! interval until shutdown is requested.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use netward_network_guard::{DockerConnector, GuardError, NetworkGuard, Remediation};

/// What a pass targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every running container.
    All,
    /// One container by ID or name.
    Container(String),
}

/// Outcome of a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Containers inspected.
    pub scanned: usize,
    /// Containers rewired or recreated.
    pub remediated: usize,
    /// Containers that failed enforcement.
    pub failed: usize,
}

impl PassSummary {
    /// Summary of a single-container pass, counted the same way as a full pass.
    pub fn for_container(outcome: &Result<Remediation, GuardError>) -> Self {
        match outcome {
            Ok(remediation) => Self {
                scanned: 1,
                remediated: usize::from(*remediation != Remediation::Unchanged),
                failed: 0,
            },
            Err(_) => Self {
                scanned: 1,
                remediated: 0,
                failed: 1,
            },
        }
    }
}

/// Runs bootstrap passes against a [`NetworkGuard`].
pub struct Runner<C: DockerConnector> {
    guard: NetworkGuard<C>,
    target: Target,
    interval: Option<Duration>,
}

impl<C: DockerConnector> Runner<C> {
    /// Create a runner. `interval` of `None` means a single pass.
    pub fn new(guard: NetworkGuard<C>, target: Target, interval: Option<Duration>) -> Self {
        Self {
            guard,
            target,
            interval,
        }
    }

    /// The guard this runner drives.
    pub fn guard(&self) -> &NetworkGuard<C> {
        &self.guard
    }

    /// Run one pass over the configured target.
    pub async fn run_once(&self) -> PassSummary {
        let bootstrapper = self.guard.bootstrapper();
        match &self.target {
            Target::All => {
                let report = bootstrapper.run_pass().await;
                PassSummary {
                    scanned: report.scanned,
                    remediated: report.remediated,
                    failed: report.failed(),
                }
            }
            Target::Container(id) => {
                let outcome = bootstrapper.remediate_container(id).await;
                match &outcome {
                    Ok(Remediation::Recreated(new_id)) => {
                        info!(container_id = id.as_str(), new_id = new_id.as_str(), "container recreated");
                    }
                    Ok(Remediation::Rewired) => {
                        info!(container_id = id.as_str(), "container rewired");
                    }
                    Ok(Remediation::Unchanged) => {}
                    Err(e) => {
                        error!(container_id = id.as_str(), error = %e, "failed to enforce network policy");
                    }
                }
                PassSummary::for_container(&outcome)
            }
        }
    }

    /// Run passes until `shutdown` resolves, or a single pass without an interval.
    ///
    /// Returns the summary of the last completed pass.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> PassSummary {
        let Some(period) = self.interval else {
            return self.run_once().await;
        };

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut last = PassSummary::default();
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping bootstrap loop");
                    break;
                }
                _ = ticker.tick() => {
                    last = self.run_once().await;
                    if last.failed > 0 {
                        warn!(failed = last.failed, "bootstrap pass finished with failures");
                    }
                }
            }
        }
        last
    }
}
