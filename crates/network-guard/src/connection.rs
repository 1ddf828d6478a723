//! Docker daemon connection management.
//!
//! [`ConnectionManager`] owns the single client slot. Every operation calls
//! [`ConnectionManager::connect`], which reuses the cached client while it
//! still answers a ping and transparently establishes a new one otherwise.
//! There is no retry loop: a failed connect is reported and the next call
//! tries again.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use netward_core::metrics as m;

use crate::config::GuardConfig;
use crate::docker::{BollardDockerClient, DockerClient};
use crate::error::GuardError;

/// Establishes fresh Docker clients.
///
/// The seam between [`ConnectionManager`] and the transport, so tests can
/// hand out in-memory clients.
pub trait DockerConnector: Send + Sync + 'static {
    /// Client type produced by this connector.
    type Client: DockerClient;

    /// Builds a new client and negotiates the API version.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::DockerConnection` when no client can be built.
    fn connect(&self) -> impl Future<Output = Result<Self::Client, GuardError>> + Send;
}

/// Production connector backed by bollard.
///
/// Uses the configured socket when set, otherwise the ambient environment
/// (`DOCKER_HOST` or the platform default socket).
#[derive(Debug, Clone)]
pub struct BollardConnector {
    socket: Option<String>,
    timeout_secs: u64,
}

impl BollardConnector {
    /// Creates a connector from the guard configuration.
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            socket: Some(config.docker_socket.clone()).filter(|s| !s.is_empty()),
            timeout_secs: config.docker_timeout_secs,
        }
    }
}

impl DockerConnector for BollardConnector {
    type Client = BollardDockerClient;

    async fn connect(&self) -> Result<Self::Client, GuardError> {
        match &self.socket {
            Some(socket) => {
                debug!(socket = socket.as_str(), "connecting to docker socket");
                BollardDockerClient::connect_with_socket(socket, self.timeout_secs).await
            }
            None => {
                debug!("connecting to docker from environment");
                BollardDockerClient::connect_from_env().await
            }
        }
    }
}

/// Owns the cached Docker client.
///
/// Establishment is serialized by an async mutex on the slot, so concurrent
/// first-time callers share one client instead of racing to build two.
pub struct ConnectionManager<C: DockerConnector> {
    connector: C,
    slot: Mutex<Option<Arc<C::Client>>>,
    connected: AtomicBool,
}

impl<C: DockerConnector> ConnectionManager<C> {
    /// Creates a manager with an empty slot.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Whether the last connection attempt produced a live client.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Returns a live client, reconnecting when the cached one stopped answering.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::DockerConnection` when a new client cannot be
    /// built or the daemon does not answer a ping.
    pub async fn connect(&self) -> Result<Arc<C::Client>, GuardError> {
        let mut slot = self.slot.lock().await;

        let had_client = if let Some(client) = slot.as_ref() {
            match client.ping().await {
                Ok(_) => {
                    self.connected.store(true, Ordering::Release);
                    return Ok(Arc::clone(client));
                }
                Err(e) => {
                    warn!(error = %e, "docker client stopped responding, reconnecting");
                    *slot = None;
                    true
                }
            }
        } else {
            false
        };

        let client = match self.connector.connect().await {
            Ok(client) => client,
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                return Err(e);
            }
        };

        let api_version = match client.ping().await {
            Ok(version) => version,
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                return Err(GuardError::DockerConnection(format!(
                    "docker daemon unreachable: {e}"
                )));
            }
        };

        let client = Arc::new(client);
        *slot = Some(Arc::clone(&client));
        self.connected.store(true, Ordering::Release);

        if had_client {
            metrics::counter!(m::DOCKER_RECONNECTS_TOTAL).increment(1);
        }
        info!(api_version = api_version.as_str(), "connected to docker daemon");
        Ok(client)
    }
}
