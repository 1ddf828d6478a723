//! 네트워크 토폴로지 -- 컨테이너의 네트워크 연결과 포트 노출 조회/변경
//!
//! 포트 관련 함수([`list_exposed_ports`], [`strip_all_exposed_ports`])와
//! [`is_attached_to`]는 디스크립터만 보는 순수 함수입니다.
//! [`NetworkTopology`]는 공용/격리 네트워크 이름을 알고 있으며 데몬에
//! 연결/해제 요청을 보냅니다.

use std::sync::Arc;

use tracing::{debug, info, warn};

use netward_core::metrics as m;

use crate::config::GuardConfig;
use crate::connection::{ConnectionManager, DockerConnector};
use crate::descriptor::{ContainerDescriptor, NetworkAttachment, PortBinding};
use crate::docker::DockerClient;
use crate::error::GuardError;

/// 추가 엔드포인트를 받을 수 없는 네트워크 이름
const ENDPOINTLESS_NETWORKS: [&str; 2] = ["host", "none"];

/// 컨테이너의 공개 포트 바인딩을 반환합니다.
pub fn list_exposed_ports(container: &ContainerDescriptor) -> Vec<PortBinding> {
    container.host.port_bindings.clone()
}

/// 포트 바인딩과 노출 포트를 메모리에서만 제거합니다.
///
/// 실제 반영은 재생성([`ContainerMutator`](crate::mutator::ContainerMutator))이 합니다.
pub fn strip_all_exposed_ports(container: &mut ContainerDescriptor) {
    container.host.port_bindings.clear();
    container.spec.exposed_ports.clear();
}

/// 컨테이너가 해당 네트워크에 연결되어 있는지 확인합니다.
pub fn is_attached_to(container: &ContainerDescriptor, network: &str) -> bool {
    container.networks.contains_key(network)
}

/// 네트워크 모드가 추가 엔드포인트를 받을 수 없는지 확인합니다.
///
/// `host`, `none`, `container:<id>` 모드는 live connect가 불가능하므로
/// 재생성이 필요합니다.
pub fn network_mode_rejects_endpoints(mode: Option<&str>) -> bool {
    match mode {
        Some(mode) => ENDPOINTLESS_NETWORKS.contains(&mode) || mode.starts_with("container:"),
        None => false,
    }
}

/// 네트워크 재연결 결과
#[derive(Debug, Default)]
pub struct ReattachReport {
    /// 연결에 성공한 네트워크
    pub attached: Vec<String>,
    /// 건너뛴 네트워크 (공용, 생성 시 연결, host/none)
    pub skipped: Vec<String>,
    /// 연결에 실패한 네트워크와 에러
    pub failed: Vec<(String, GuardError)>,
}

impl ReattachReport {
    /// 실패한 네트워크가 없는지 확인합니다.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 공용/격리 네트워크를 아는 토폴로지 조작기
pub struct NetworkTopology<C: DockerConnector> {
    connection: Arc<ConnectionManager<C>>,
    public_network: String,
    isolated_network: String,
}

impl<C: DockerConnector> NetworkTopology<C> {
    /// 새 토폴로지 조작기를 생성합니다.
    pub fn new(connection: Arc<ConnectionManager<C>>, config: &GuardConfig) -> Self {
        Self {
            connection,
            public_network: config.public_network.clone(),
            isolated_network: config.isolated_network.clone(),
        }
    }

    /// 공용 네트워크 이름
    pub fn public_network(&self) -> &str {
        &self.public_network
    }

    /// 격리 네트워크 이름
    pub fn isolated_network(&self) -> &str {
        &self.isolated_network
    }

    /// 공용 네트워크에 연결되어 있는지 확인합니다.
    pub fn is_public(&self, container: &ContainerDescriptor) -> bool {
        is_attached_to(container, &self.public_network)
    }

    /// 공용 네트워크가 아닌 네트워크를 기준 컨테이너와 공유하는지 확인합니다.
    ///
    /// 기준 컨테이너가 없으면 (컨테이너 밖에서 실행 중) 격리 네트워크 연결 여부로 대체합니다.
    pub fn shares_isolated_network_with(
        &self,
        reference: Option<&ContainerDescriptor>,
        container: &ContainerDescriptor,
    ) -> bool {
        match reference {
            Some(reference) => container.networks.keys().any(|network| {
                network != &self.public_network
                    && !ENDPOINTLESS_NETWORKS.contains(&network.as_str())
                    && reference.networks.contains_key(network)
            }),
            None => is_attached_to(container, &self.isolated_network),
        }
    }

    /// 컨테이너를 격리 네트워크에 연결합니다.
    ///
    /// 반환값은 재생성 필요 여부입니다. 네트워크 모드가 live connect를 받을 수
    /// 없으면 메모리의 네트워크 모드를 격리 네트워크로 바꾸고 `true`를 반환합니다.
    /// 이미 연결되어 있으면 아무것도 하지 않습니다.
    ///
    /// 기준 컨테이너가 격리 네트워크에 없으면 함께 연결하고 `reference`에도 반영합니다
    /// (실패는 경고만).
    ///
    /// # Errors
    ///
    /// 격리 네트워크 생성 또는 대상 컨테이너 연결 실패
    pub async fn attach_to_isolated_network(
        &self,
        container: &mut ContainerDescriptor,
        reference: Option<&mut ContainerDescriptor>,
    ) -> Result<bool, GuardError> {
        let client = self.connection.connect().await?;
        client.ensure_network(&self.isolated_network).await?;

        let reference = reference.filter(|r| {
            !is_attached_to(r, &self.isolated_network)
                && !network_mode_rejects_endpoints(r.host.network_mode.as_deref())
        });
        if let Some(reference) = reference {
            match client
                .connect_network(&self.isolated_network, &reference.id)
                .await
            {
                Ok(()) => {
                    reference
                        .networks
                        .insert(self.isolated_network.clone(), NetworkAttachment::default());
                    info!(
                        container_id = reference.id.as_str(),
                        network = self.isolated_network.as_str(),
                        "attached self container to isolated network"
                    );
                }
                Err(e) => warn!(
                    container_id = reference.id.as_str(),
                    network = self.isolated_network.as_str(),
                    error = %e,
                    "failed to attach self container to isolated network"
                ),
            }
        }

        if network_mode_rejects_endpoints(container.host.network_mode.as_deref()) {
            debug!(
                container_id = container.id.as_str(),
                network_mode = container.host.network_mode.as_deref().unwrap_or(""),
                "network mode cannot take endpoints, switching to isolated network"
            );
            container.host.network_mode = Some(self.isolated_network.clone());
            return Ok(true);
        }

        if is_attached_to(container, &self.isolated_network) {
            return Ok(false);
        }

        client
            .connect_network(&self.isolated_network, &container.id)
            .await?;
        container
            .networks
            .insert(self.isolated_network.clone(), NetworkAttachment::default());
        info!(
            container_id = container.id.as_str(),
            network = self.isolated_network.as_str(),
            "attached container to isolated network"
        );
        Ok(false)
    }

    /// 컨테이너를 네트워크에서 강제로 분리합니다.
    pub async fn detach_from(
        &self,
        container: &ContainerDescriptor,
        network: &str,
    ) -> Result<(), GuardError> {
        let client = self.connection.connect().await?;
        client.disconnect_network(network, &container.id, true).await?;
        info!(
            container_id = container.id.as_str(),
            network,
            "detached container from network"
        );
        Ok(())
    }

    /// 기존 컨테이너의 네트워크에 새 컨테이너를 다시 연결합니다.
    ///
    /// 새 컨테이너가 생성 시 이미 연결된 네트워크와 `host`/`none`은 건너뛰고,
    /// `skip_public`이면 공용 네트워크도 건너뜁니다. 실패는 보고서에 모으며
    /// 중단하지 않습니다.
    pub async fn reattach_all(
        &self,
        old: &ContainerDescriptor,
        new_id: &str,
        skip_public: bool,
    ) -> ReattachReport {
        let mut report = ReattachReport::default();

        let client = match self.connection.connect().await {
            Ok(client) => client,
            Err(e) => {
                warn!(container_id = new_id, error = %e, "cannot reattach networks");
                report.failed.extend(old.networks.keys().map(|network| {
                    (
                        network.clone(),
                        GuardError::DockerConnection(e.to_string()),
                    )
                }));
                return report;
            }
        };

        let already_attached = match client.inspect_container(new_id).await {
            Ok(created) => created.networks,
            Err(e) => {
                debug!(container_id = new_id, error = %e, "inspect before reattach failed");
                Default::default()
            }
        };

        for network in old.networks.keys() {
            if already_attached.contains_key(network)
                || ENDPOINTLESS_NETWORKS.contains(&network.as_str())
                || (skip_public && network == &self.public_network)
            {
                report.skipped.push(network.clone());
                continue;
            }

            match client.connect_network(network, new_id).await {
                Ok(()) => report.attached.push(network.clone()),
                Err(e) => {
                    warn!(
                        container_id = new_id,
                        network = network.as_str(),
                        error = %e,
                        "failed to reattach network"
                    );
                    metrics::counter!(m::REATTACH_FAILURES_TOTAL).increment(1);
                    report.failed.push((network.clone(), e));
                }
            }
        }

        report
    }

    /// 이름으로 컨테이너 ID를 찾습니다.
    ///
    /// 실행 중인 컨테이너 목록에서 먼저 찾고, 없으면 inspect로 조회합니다.
    pub async fn find_container_by_name(&self, name: &str) -> Result<String, GuardError> {
        let name = name.trim_start_matches('/');
        let client = self.connection.connect().await?;

        if let Some(summary) = client
            .list_containers()
            .await?
            .into_iter()
            .find(|c| c.name == name)
        {
            return Ok(summary.id);
        }

        client.inspect_container(name).await.map(|c| c.id)
    }
}
