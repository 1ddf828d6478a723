//! Docker API abstraction for testability.
//!
//! The [`DockerClient`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardDockerClient`] while tests use `MockDockerClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   ┌─────────────────┐
//! │ NetworkBootstrapper  │──>│ ContainerMutator│
//! └──────────┬───────────┘   └────────┬────────┘
//!            │                        │
//!            ▼                        ▼
//!        ┌───────────────────────────────┐
//!        │ ConnectionManager<Connector>  │
//!        └───────────────┬───────────────┘
//!                        ▼
//!                 ┌─────────────┐
//!                 │DockerClient │ (trait)
//!                 └─────────────┘
//!                    │       │
//!                    ▼       ▼
//!               ┌───────┐ ┌──────┐
//!               │Bollard│ │ Mock │
//!               └───┬───┘ └──────┘
//!                   ▼
//!             Docker Daemon
//! ```
//!
//! # Identifier Validation
//!
//! Every container ID, container name and network name is validated before it
//! reaches the daemon:
//! - Must be 1-128 characters
//! - Must start with an ASCII alphanumeric character
//! - May only contain ASCII alphanumerics, `_`, `.` and `-`

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerInspectResponse, EndpointSettings, HostConfig, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, InspectNetworkOptions,
};
use tracing::{debug, info};

use crate::descriptor::{
    ContainerDescriptor, ContainerSpec, ContainerSummary, HostSettings, NetworkAttachment,
    PortBinding, parse_port_key,
};
use crate::error::{GuardError, MutationStep};

const MAX_IDENTIFIER_LEN: usize = 128;

/// Validates a container ID, container name or network name.
///
/// Docker IDs are hex strings and names are `[a-zA-Z0-9][a-zA-Z0-9_.-]*`, so
/// one rule covers all three and keeps path separators and query syntax out
/// of the API URLs.
pub fn validate_identifier(value: &str) -> Result<(), GuardError> {
    if value.is_empty() || value.len() > MAX_IDENTIFIER_LEN {
        return Err(GuardError::InvalidIdentifier {
            value: value.to_owned(),
            reason: format!("length {} (must be 1-{MAX_IDENTIFIER_LEN})", value.len()),
        });
    }
    if !value.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(GuardError::InvalidIdentifier {
            value: value.to_owned(),
            reason: "must start with an alphanumeric character".to_owned(),
        });
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(GuardError::InvalidIdentifier {
            value: value.to_owned(),
            reason: "contains characters outside [A-Za-z0-9_.-]".to_owned(),
        });
    }
    Ok(())
}

/// Trait abstracting Docker API operations.
///
/// All Docker API calls go through this trait, enabling testability via mocking.
/// The trait is `Send + Sync + 'static`, allowing safe sharing across async contexts.
///
/// # Error Handling
///
/// - **404 on inspect**: `GuardError::ContainerNotFound`
/// - **Lifecycle failures** (stop/remove/create/start): `GuardError::MutationStep`
/// - **Network failures**: `GuardError::NetworkOperation`
/// - **Connectivity**: `GuardError::DockerConnection`
pub trait DockerClient: Send + Sync + 'static {
    /// Lists running containers.
    fn list_containers(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerSummary>, GuardError>> + Send;

    /// Inspects a container by ID or name.
    ///
    /// # Errors
    ///
    /// - `GuardError::ContainerNotFound`: the container does not exist (404)
    /// - `GuardError::DockerApi`: any other API error
    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerDescriptor, GuardError>> + Send;

    /// Stops a container, sending SIGKILL after `grace_secs`.
    fn stop_container(
        &self,
        id: &str,
        grace_secs: u32,
    ) -> impl Future<Output = Result<(), GuardError>> + Send;

    /// Removes a stopped container.
    fn remove_container(&self, id: &str) -> impl Future<Output = Result<(), GuardError>> + Send;

    /// Creates a container named `name` from the descriptor's spec and host
    /// settings, returning the new container ID.
    fn create_container(
        &self,
        name: &str,
        descriptor: &ContainerDescriptor,
    ) -> impl Future<Output = Result<String, GuardError>> + Send;

    /// Starts a created container.
    fn start_container(&self, id: &str) -> impl Future<Output = Result<(), GuardError>> + Send;

    /// Connects a container to a network.
    fn connect_network(
        &self,
        network: &str,
        container_id: &str,
    ) -> impl Future<Output = Result<(), GuardError>> + Send;

    /// Disconnects a container from a network.
    ///
    /// With `force`, the daemon drops the endpoint even if the container is running.
    fn disconnect_network(
        &self,
        network: &str,
        container_id: &str,
        force: bool,
    ) -> impl Future<Output = Result<(), GuardError>> + Send;

    /// Creates a bridge network named `name` if it does not exist yet.
    fn ensure_network(&self, name: &str) -> impl Future<Output = Result<(), GuardError>> + Send;

    /// Checks daemon liveness and returns the negotiated API version.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::DockerConnection` if the daemon is unreachable.
    fn ping(&self) -> impl Future<Output = Result<String, GuardError>> + Send;
}

/// Production Docker client implementation using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` for safe sharing across async tasks.
#[derive(Clone)]
pub struct BollardDockerClient {
    docker: Arc<bollard::Docker>,
}

impl BollardDockerClient {
    /// Connects using ambient configuration (`DOCKER_HOST`, or the platform
    /// default socket) and negotiates the API version with the daemon.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::DockerConnection` if the client cannot be built or
    /// version negotiation fails.
    pub async fn connect_from_env() -> Result<Self, GuardError> {
        let docker = bollard::Docker::connect_with_defaults().map_err(|e| {
            GuardError::DockerConnection(format!("failed to build docker client: {e}"))
        })?;
        Self::negotiate(docker).await
    }

    /// Connects using a specific socket path and negotiates the API version.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::DockerConnection` if the connection fails.
    pub async fn connect_with_socket(
        socket_path: &str,
        timeout_secs: u64,
    ) -> Result<Self, GuardError> {
        let docker = bollard::Docker::connect_with_socket(
            socket_path,
            timeout_secs,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            GuardError::DockerConnection(format!(
                "failed to connect to docker at {socket_path}: {e}"
            ))
        })?;
        Self::negotiate(docker).await
    }

    async fn negotiate(docker: bollard::Docker) -> Result<Self, GuardError> {
        let docker = docker.negotiate_version().await.map_err(|e| {
            GuardError::DockerConnection(format!("api version negotiation failed: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn step_error(step: MutationStep, container: &str, err: impl std::fmt::Display) -> GuardError {
    GuardError::MutationStep {
        step,
        container: container.to_owned(),
        reason: err.to_string(),
    }
}

fn network_error(network: &str, container: &str, err: impl std::fmt::Display) -> GuardError {
    GuardError::NetworkOperation {
        network: network.to_owned(),
        container: container.to_owned(),
        reason: err.to_string(),
    }
}

impl DockerClient for BollardDockerClient {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, GuardError> {
        let options = ListContainersOptions::<String> {
            all: false, // Only running containers carry live network state worth enforcing
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| GuardError::DockerApi(format!("list containers failed: {e}")))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor, GuardError> {
        validate_identifier(id)?;

        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    GuardError::ContainerNotFound(id.to_owned())
                } else {
                    GuardError::DockerApi(format!("inspect container failed: {e}"))
                }
            })?;

        Ok(descriptor_from_inspect(details))
    }

    async fn stop_container(&self, id: &str, grace_secs: u32) -> Result<(), GuardError> {
        validate_identifier(id)?;

        self.docker
            .stop_container(
                id,
                Some(StopContainerOptions {
                    t: i64::from(grace_secs),
                }),
            )
            .await
            .map_err(|e| step_error(MutationStep::Stop, id, e))
    }

    async fn remove_container(&self, id: &str) -> Result<(), GuardError> {
        validate_identifier(id)?;

        self.docker
            .remove_container(id, Some(RemoveContainerOptions::default()))
            .await
            .map_err(|e| step_error(MutationStep::Remove, id, e))
    }

    async fn create_container(
        &self,
        name: &str,
        descriptor: &ContainerDescriptor,
    ) -> Result<String, GuardError> {
        validate_identifier(name)?;

        let options = CreateContainerOptions {
            name: name.to_owned(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), create_config(descriptor))
            .await
            .map_err(|e| step_error(MutationStep::Create, name, e))?;

        for warning in &response.warnings {
            debug!(container = name, warning = warning.as_str(), "create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), GuardError> {
        validate_identifier(id)?;

        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| step_error(MutationStep::Start, id, e))
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<(), GuardError> {
        validate_identifier(network)?;
        validate_identifier(container_id)?;

        self.docker
            .connect_network(
                network,
                ConnectNetworkOptions {
                    container: container_id.to_owned(),
                    endpoint_config: EndpointSettings::default(),
                },
            )
            .await
            .map_err(|e| network_error(network, container_id, e))
    }

    async fn disconnect_network(
        &self,
        network: &str,
        container_id: &str,
        force: bool,
    ) -> Result<(), GuardError> {
        validate_identifier(network)?;
        validate_identifier(container_id)?;

        self.docker
            .disconnect_network(
                network,
                DisconnectNetworkOptions {
                    container: container_id.to_owned(),
                    force,
                },
            )
            .await
            .map_err(|e| network_error(network, container_id, e))
    }

    async fn ensure_network(&self, name: &str) -> Result<(), GuardError> {
        validate_identifier(name)?;

        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) if is_not_found(&e) => {}
            Err(e) => {
                return Err(GuardError::DockerApi(format!(
                    "inspect network '{name}' failed: {e}"
                )));
            }
        }

        self.docker
            .create_network(CreateNetworkOptions {
                name: name.to_owned(),
                driver: "bridge".to_owned(),
                attachable: true,
                ..Default::default()
            })
            .await
            .map_err(|e| GuardError::DockerApi(format!("create network '{name}' failed: {e}")))?;

        info!(network = name, "created isolated network");
        Ok(())
    }

    async fn ping(&self) -> Result<String, GuardError> {
        self.docker
            .ping()
            .await
            .map_err(|e| GuardError::DockerConnection(format!("ping failed: {e}")))?;
        let version = self.docker.client_version();
        Ok(format!(
            "{}.{}",
            version.major_version, version.minor_version
        ))
    }
}

fn restart_policy_name(policy: &RestartPolicy) -> Option<String> {
    let name = match policy.name.as_ref()? {
        RestartPolicyNameEnum::EMPTY => return None,
        RestartPolicyNameEnum::NO => "no",
        RestartPolicyNameEnum::ALWAYS => "always",
        RestartPolicyNameEnum::UNLESS_STOPPED => "unless-stopped",
        RestartPolicyNameEnum::ON_FAILURE => "on-failure",
    };
    Some(name.to_owned())
}

fn restart_policy_from_name(name: &str) -> Option<RestartPolicy> {
    let name = match name {
        "no" => RestartPolicyNameEnum::NO,
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => return None,
    };
    Some(RestartPolicy {
        name: Some(name),
        ..Default::default()
    })
}

/// Maps a bollard inspect response into a [`ContainerDescriptor`].
pub fn descriptor_from_inspect(details: ContainerInspectResponse) -> ContainerDescriptor {
    let config = details.config.unwrap_or_default();
    let spec = ContainerSpec {
        hostname: config.hostname,
        image: config.image.unwrap_or_default(),
        cmd: config.cmd.unwrap_or_default(),
        env: config.env.unwrap_or_default(),
        exposed_ports: config
            .exposed_ports
            .unwrap_or_default()
            .into_keys()
            .collect::<BTreeSet<_>>(),
        labels: config
            .labels
            .unwrap_or_default()
            .into_iter()
            .collect::<BTreeMap<_, _>>(),
    };

    let host_config = details.host_config.unwrap_or_default();
    let mut port_bindings = Vec::new();
    for (key, bindings) in host_config.port_bindings.unwrap_or_default() {
        let Some((container_port, protocol)) = parse_port_key(&key) else {
            debug!(port_key = key.as_str(), "skipping unparseable port key");
            continue;
        };
        for binding in bindings.unwrap_or_default() {
            port_bindings.push(PortBinding {
                host_ip: binding.host_ip.filter(|ip| !ip.is_empty()),
                // empty host port means "ephemeral", kept as 0
                host_port: binding
                    .host_port
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(0),
                protocol,
                container_port,
            });
        }
    }
    port_bindings.sort_by_key(|b| (b.container_port, b.protocol, b.host_port));

    let host = HostSettings {
        port_bindings,
        binds: host_config.binds.unwrap_or_default(),
        network_mode: host_config.network_mode.filter(|m| !m.is_empty()),
        restart_policy: host_config
            .restart_policy
            .as_ref()
            .and_then(restart_policy_name),
        privileged: host_config.privileged.unwrap_or(false),
        cap_add: host_config.cap_add.unwrap_or_default(),
        extra_hosts: host_config.extra_hosts.unwrap_or_default(),
    };

    let networks = details
        .network_settings
        .and_then(|ns| ns.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, endpoint)| {
            let attachment = NetworkAttachment {
                network_id: endpoint.network_id.unwrap_or_default(),
                ip_address: endpoint.ip_address.filter(|ip| !ip.is_empty()),
                aliases: endpoint.aliases.unwrap_or_default(),
            };
            (name, attachment)
        })
        .collect();

    ContainerDescriptor::new(
        details.id.unwrap_or_default(),
        details.name.unwrap_or_default(),
        spec,
        host,
        networks,
    )
}

/// Builds the bollard create request for a descriptor.
pub fn create_config(descriptor: &ContainerDescriptor) -> Config<String> {
    let spec = &descriptor.spec;
    let host = &descriptor.host;

    let mut port_bindings: HashMap<String, Option<Vec<bollard::models::PortBinding>>> =
        HashMap::new();
    for binding in &host.port_bindings {
        port_bindings
            .entry(binding.port_key())
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(bollard::models::PortBinding {
                host_ip: binding.host_ip.clone(),
                host_port: Some(if binding.host_port == 0 {
                    String::new()
                } else {
                    binding.host_port.to_string()
                }),
            });
    }

    let host_config = HostConfig {
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        binds: (!host.binds.is_empty()).then(|| host.binds.clone()),
        network_mode: host.network_mode.clone(),
        restart_policy: host
            .restart_policy
            .as_deref()
            .and_then(restart_policy_from_name),
        privileged: host.privileged.then_some(true),
        cap_add: (!host.cap_add.is_empty()).then(|| host.cap_add.clone()),
        extra_hosts: (!host.extra_hosts.is_empty()).then(|| host.extra_hosts.clone()),
        ..Default::default()
    };

    Config {
        hostname: spec.hostname.clone(),
        image: Some(spec.image.clone()),
        cmd: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        exposed_ports: (!spec.exposed_ports.is_empty()).then(|| {
            spec.exposed_ports
                .iter()
                .map(|key| (key.clone(), HashMap::new()))
                .collect()
        }),
        labels: Some(
            spec.labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// 테스트용 인메모리 Docker 데몬
///
/// 모든 호출을 순서대로 기록하고, 작업별 실패 횟수를 주입할 수 있습니다.
/// 클론은 같은 상태를 공유하므로 커넥터가 여러 번 클라이언트를 만들어도 동일한 데몬을 봅니다.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockDockerClient {
    state: Arc<std::sync::Mutex<MockState>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct MockState {
    containers: BTreeMap<String, ContainerDescriptor>,
    networks: BTreeSet<String>,
    /// 삭제 후 inspect가 아직 컨테이너를 돌려줄 횟수
    pending_removal: HashMap<String, usize>,
    removal_delay: usize,
    /// 작업 이름 -> 남은 실패 횟수
    failures: HashMap<&'static str, usize>,
    calls: Vec<String>,
    next_id: u64,
    connects: usize,
}

#[cfg(test)]
impl MockDockerClient {
    /// `bridge` 네트워크만 있는 빈 데몬을 생성합니다.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.lock().networks.insert("bridge".to_owned());
        mock.lock().next_id = 0xa000;
        mock
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// 컨테이너를 추가합니다.
    pub fn with_container(self, container: ContainerDescriptor) -> Self {
        {
            let mut state = self.lock();
            for network in container.networks.keys() {
                state.networks.insert(network.clone());
            }
            state.containers.insert(container.id.clone(), container);
        }
        self
    }

    /// 네트워크를 추가합니다.
    pub fn with_network(self, name: &str) -> Self {
        self.lock().networks.insert(name.to_owned());
        self
    }

    /// 삭제 후 `polls`번의 inspect 동안 컨테이너가 남아있도록 합니다.
    pub fn with_removal_delay(self, polls: usize) -> Self {
        self.lock().removal_delay = polls;
        self
    }

    /// `op` 작업이 `times`번 실패하도록 합니다.
    pub fn fail(self, op: &'static str, times: usize) -> Self {
        self.lock().failures.insert(op, times);
        self
    }

    /// 기록된 호출 목록 (`"stop:<id>"` 형식)
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// 특정 작업의 호출 목록
    pub fn calls_of(&self, op: &str) -> Vec<String> {
        let prefix = format!("{op}:");
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect()
    }

    /// 이름으로 현재 컨테이너를 찾습니다.
    pub fn container_by_name(&self, name: &str) -> Option<ContainerDescriptor> {
        self.lock()
            .containers
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    /// 현재 컨테이너 수
    pub fn container_count(&self) -> usize {
        self.lock().containers.len()
    }

    /// 커넥터가 클라이언트를 만든 횟수
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    fn record(&self, op: &'static str, target: &str) -> Result<(), String> {
        let mut state = self.lock();
        state.calls.push(format!("{op}:{target}"));
        match state.failures.get_mut(op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(format!("mock {op} failure"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
fn joins_network_on_create(mode: Option<&str>) -> Option<String> {
    match mode {
        None | Some("default") => Some("bridge".to_owned()),
        Some("host") | Some("none") => None,
        Some(m) if m.starts_with("container:") => None,
        Some(m) => Some(m.to_owned()),
    }
}

#[cfg(test)]
impl DockerClient for MockDockerClient {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, GuardError> {
        tokio::task::yield_now().await;
        self.record("list", "*").map_err(GuardError::DockerApi)?;
        Ok(self
            .lock()
            .containers
            .values()
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.spec.image.clone(),
                state: "running".to_owned(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor, GuardError> {
        tokio::task::yield_now().await;
        self.record("inspect", id).map_err(GuardError::DockerApi)?;
        let mut state = self.lock();
        let key = state
            .containers
            .values()
            .find(|c| c.id == id || c.name == id)
            .map(|c| c.id.clone())
            .ok_or_else(|| GuardError::ContainerNotFound(id.to_owned()))?;

        if let Some(remaining) = state.pending_removal.get_mut(&key) {
            if *remaining == 0 {
                state.pending_removal.remove(&key);
                state.containers.remove(&key);
                return Err(GuardError::ContainerNotFound(id.to_owned()));
            }
            *remaining -= 1;
        }
        state
            .containers
            .get(&key)
            .cloned()
            .ok_or_else(|| GuardError::ContainerNotFound(id.to_owned()))
    }

    async fn stop_container(&self, id: &str, _grace_secs: u32) -> Result<(), GuardError> {
        tokio::task::yield_now().await;
        self.record("stop", id)
            .map_err(|e| step_error(MutationStep::Stop, id, e))
    }

    async fn remove_container(&self, id: &str) -> Result<(), GuardError> {
        tokio::task::yield_now().await;
        self.record("remove", id)
            .map_err(|e| step_error(MutationStep::Remove, id, e))?;
        let mut state = self.lock();
        if !state.containers.contains_key(id) {
            return Err(step_error(MutationStep::Remove, id, "no such container"));
        }
        let delay = state.removal_delay;
        state.pending_removal.insert(id.to_owned(), delay);
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        descriptor: &ContainerDescriptor,
    ) -> Result<String, GuardError> {
        tokio::task::yield_now().await;
        self.record("create", name)
            .map_err(|e| step_error(MutationStep::Create, name, e))?;
        let mut state = self.lock();
        if state.containers.values().any(|c| c.name == name) {
            return Err(step_error(MutationStep::Create, name, "name already in use"));
        }
        let joins = joins_network_on_create(descriptor.host.network_mode.as_deref());
        if let Some(network) = &joins {
            if !state.networks.contains(network) {
                return Err(step_error(
                    MutationStep::Create,
                    name,
                    format!("network {network} not found"),
                ));
            }
        }
        let id = format!("{:012x}", state.next_id);
        state.next_id += 1;

        let mut networks = BTreeMap::new();
        if let Some(network) = joins {
            networks.insert(network, NetworkAttachment::default());
        }
        let created = ContainerDescriptor::new(
            id.clone(),
            name,
            descriptor.spec.clone(),
            descriptor.host.clone(),
            networks,
        );
        state.containers.insert(id.clone(), created);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), GuardError> {
        tokio::task::yield_now().await;
        self.record("start", id)
            .map_err(|e| step_error(MutationStep::Start, id, e))
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<(), GuardError> {
        tokio::task::yield_now().await;
        self.record("connect", &format!("{network}:{container_id}"))
            .map_err(|e| network_error(network, container_id, e))?;
        let mut state = self.lock();
        if !state.networks.contains(network) {
            return Err(network_error(network, container_id, "network not found"));
        }
        let container = state
            .containers
            .values_mut()
            .find(|c| c.id == container_id || c.name == container_id)
            .ok_or_else(|| network_error(network, container_id, "no such container"))?;
        if container.networks.contains_key(network) {
            return Err(network_error(network, container_id, "endpoint already exists"));
        }
        container
            .networks
            .insert(network.to_owned(), NetworkAttachment::default());
        Ok(())
    }

    async fn disconnect_network(
        &self,
        network: &str,
        container_id: &str,
        _force: bool,
    ) -> Result<(), GuardError> {
        tokio::task::yield_now().await;
        self.record("disconnect", &format!("{network}:{container_id}"))
            .map_err(|e| network_error(network, container_id, e))?;
        let mut state = self.lock();
        let container = state
            .containers
            .values_mut()
            .find(|c| c.id == container_id || c.name == container_id)
            .ok_or_else(|| network_error(network, container_id, "no such container"))?;
        container
            .networks
            .remove(network)
            .map(|_| ())
            .ok_or_else(|| network_error(network, container_id, "not connected"))
    }

    async fn ensure_network(&self, name: &str) -> Result<(), GuardError> {
        self.record("ensure_network", name)
            .map_err(GuardError::DockerApi)?;
        self.lock().networks.insert(name.to_owned());
        Ok(())
    }

    async fn ping(&self) -> Result<String, GuardError> {
        self.record("ping", "*")
            .map_err(GuardError::DockerConnection)?;
        Ok("1.45".to_owned())
    }
}

#[cfg(test)]
impl crate::connection::DockerConnector for MockDockerClient {
    type Client = MockDockerClient;

    async fn connect(&self) -> Result<Self::Client, GuardError> {
        self.record("connect_daemon", "*")
            .map_err(GuardError::DockerConnection)?;
        self.lock().connects += 1;
        Ok(self.clone())
    }
}
