//! 네트워크 정책 부트스트랩
//!
//! 실행 중인 컨테이너를 훑으며 보안 라벨이 붙은 컨테이너를 공용 네트워크에서
//! 격리 네트워크로 옮기고 공개 포트를 제거합니다.
//!
//! # 컨테이너별 처리
//! 1. 조회 후 정책이 [`NetworkPolicy::NoPolicy`]면 아무것도 하지 않음
//! 2. 공용 네트워크에 있거나 격리 네트워크를 공유하지 않으면
//!    - 격리 네트워크 연결 (네트워크 모드 때문에 불가능하면 재생성 필요)
//!    - 재생성이 필요 없고 여전히 공용이면 공용 네트워크에서 강제 분리
//! 3. 포트 바인딩이 있으면 제거 후 재생성 필요
//! 4. 재생성이 필요하면 [`ContainerMutator::edit_container`] 호출
//!
//! [`NetworkPolicy::NoPolicy`]: crate::descriptor::NetworkPolicy::NoPolicy

use std::sync::Arc;

use tracing::{debug, info, warn};

use netward_core::metrics as m;

use crate::connection::{ConnectionManager, DockerConnector};
use crate::descriptor::{ContainerDescriptor, NetworkPolicy};
use crate::docker::DockerClient;
use crate::error::GuardError;
use crate::mutator::ContainerMutator;
use crate::topology::{NetworkTopology, list_exposed_ports, strip_all_exposed_ports};

/// 부트스트랩 패스 결과
#[derive(Debug, Default)]
pub struct BootstrapReport {
    /// 검사한 컨테이너 수
    pub scanned: usize,
    /// 조치(연결/분리/재생성)한 컨테이너 수
    pub remediated: usize,
    /// 실패한 컨테이너별 에러
    pub errors: Vec<GuardError>,
}

impl BootstrapReport {
    /// 실패한 컨테이너 수
    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

/// 단일 컨테이너 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remediation {
    /// 변경 없음
    Unchanged,
    /// 재생성 없이 네트워크만 변경
    Rewired,
    /// 새 ID로 재생성
    Recreated(String),
}

/// 네트워크 정책 부트스트래퍼
pub struct NetworkPolicyBootstrapper<C: DockerConnector> {
    connection: Arc<ConnectionManager<C>>,
    topology: Arc<NetworkTopology<C>>,
    mutator: Arc<ContainerMutator<C>>,
    self_container: Option<String>,
}

impl<C: DockerConnector> NetworkPolicyBootstrapper<C> {
    /// 새 부트스트래퍼를 생성합니다.
    ///
    /// `self_container`는 이 프로세스가 실행 중인 컨테이너입니다 (컨테이너 밖이면 `None`).
    pub fn new(
        connection: Arc<ConnectionManager<C>>,
        topology: Arc<NetworkTopology<C>>,
        mutator: Arc<ContainerMutator<C>>,
        self_container: Option<String>,
    ) -> Self {
        Self {
            connection,
            topology,
            mutator,
            self_container,
        }
    }

    /// 단일 컨테이너에 정책을 적용합니다.
    ///
    /// 재생성되었으면 새 컨테이너 ID를 반환합니다.
    pub async fn bootstrap_container(&self, id: &str) -> Result<Option<String>, GuardError> {
        match self.remediate_container(id).await? {
            Remediation::Recreated(new_id) => Ok(Some(new_id)),
            Remediation::Unchanged | Remediation::Rewired => Ok(None),
        }
    }

    /// 단일 컨테이너에 정책을 적용하고 어떤 조치를 했는지 반환합니다.
    pub async fn remediate_container(&self, id: &str) -> Result<Remediation, GuardError> {
        let mut reference = self.resolve_self().await?;
        self.enforce(id, reference.as_mut()).await
    }

    /// 실행 중인 모든 컨테이너에 정책을 적용하고 에러를 모아 반환합니다.
    pub async fn bootstrap_all(&self) -> Vec<GuardError> {
        self.run_pass().await.errors
    }

    /// 한 번의 부트스트랩 패스를 실행합니다.
    ///
    /// 컨테이너별 실패는 다음 컨테이너 처리를 막지 않습니다.
    pub async fn run_pass(&self) -> BootstrapReport {
        metrics::counter!(m::BOOTSTRAP_PASSES_TOTAL).increment(1);
        let mut report = BootstrapReport::default();

        let containers = match self.list_targets().await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "bootstrap pass aborted");
                metrics::counter!(m::BOOTSTRAP_ERRORS_TOTAL).increment(1);
                report.errors.push(e);
                return report;
            }
        };

        let mut reference = match self.resolve_self().await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(error = %e, "cannot inspect self container, bootstrap pass aborted");
                metrics::counter!(m::BOOTSTRAP_ERRORS_TOTAL).increment(1);
                report.errors.push(e);
                return report;
            }
        };

        for id in containers {
            report.scanned += 1;
            match self.enforce(&id, reference.as_mut()).await {
                Ok(Remediation::Unchanged) => {}
                Ok(_) => {
                    report.remediated += 1;
                    metrics::counter!(m::BOOTSTRAP_REMEDIATIONS_TOTAL).increment(1);
                }
                Err(e) => {
                    warn!(container_id = id.as_str(), error = %e, "failed to enforce network policy");
                    metrics::counter!(m::BOOTSTRAP_ERRORS_TOTAL).increment(1);
                    report.errors.push(e);
                }
            }
        }

        info!(
            scanned = report.scanned,
            remediated = report.remediated,
            failed = report.failed(),
            "bootstrap pass finished"
        );
        report
    }

    async fn list_targets(&self) -> Result<Vec<String>, GuardError> {
        let client = self.connection.connect().await?;
        Ok(client
            .list_containers()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    async fn resolve_self(&self) -> Result<Option<ContainerDescriptor>, GuardError> {
        let Some(self_container) = &self.self_container else {
            return Ok(None);
        };
        let client = self.connection.connect().await?;
        client.inspect_container(self_container).await.map(Some)
    }

    async fn enforce(
        &self,
        id: &str,
        reference: Option<&mut ContainerDescriptor>,
    ) -> Result<Remediation, GuardError> {
        let client = self.connection.connect().await?;
        let mut container = client.inspect_container(id).await?;

        if container.policy == NetworkPolicy::NoPolicy {
            return Ok(Remediation::Unchanged);
        }

        let public_network = self.topology.public_network().to_owned();
        let is_public = self.topology.is_public(&container);
        let is_isolated = self
            .topology
            .shares_isolated_network_with(reference.as_deref(), &container);
        debug!(
            container_id = id,
            is_public, is_isolated, "checking secured container"
        );

        let mut rewired = false;
        let mut needs_update = false;

        if is_public || !is_isolated {
            let mut needs_restart = false;
            if !is_isolated {
                needs_restart = self
                    .topology
                    .attach_to_isolated_network(&mut container, reference)
                    .await?;
                needs_update |= needs_restart;
                rewired = true;
            }
            if !needs_restart && is_public {
                self.topology
                    .detach_from(&container, &public_network)
                    .await?;
                container.networks.remove(&public_network);
                rewired = true;
            }
        }

        if !list_exposed_ports(&container).is_empty() {
            info!(container_id = id, "removing public port bindings");
            strip_all_exposed_ports(&mut container);
            needs_update = true;
        }

        if needs_update {
            let container_id = container.id.clone();
            let new_id = self
                .mutator
                .edit_container(&container_id, container)
                .await?;
            return Ok(Remediation::Recreated(new_id));
        }

        Ok(if rewired {
            Remediation::Rewired
        } else {
            Remediation::Unchanged
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::descriptor::{PortBinding, PortProtocol, test_descriptor};
    use crate::docker::MockDockerClient;
    use crate::mutator::MutationLock;
    use crate::topology::is_attached_to;

    fn bootstrapper(
        mock: &MockDockerClient,
        self_container: Option<&str>,
    ) -> NetworkPolicyBootstrapper<MockDockerClient> {
        let config = GuardConfig::default();
        let connection = Arc::new(ConnectionManager::new(mock.clone()));
        let topology = Arc::new(NetworkTopology::new(Arc::clone(&connection), &config));
        let mutator = Arc::new(ContainerMutator::new(
            Arc::clone(&connection),
            Arc::clone(&topology),
            MutationLock::new(),
            config,
        ));
        NetworkPolicyBootstrapper::new(
            connection,
            topology,
            mutator,
            self_container.map(str::to_owned),
        )
    }

    fn mutating_calls(mock: &MockDockerClient) -> Vec<String> {
        const READ_ONLY: [&str; 4] = ["inspect:", "ping:", "connect_daemon:", "list:"];
        mock.calls()
            .into_iter()
            .filter(|c| !READ_ONLY.iter().any(|p| c.starts_with(p)))
            .collect()
    }

    #[tokio::test]
    async fn unlabeled_container_is_left_alone() {
        let mut c = test_descriptor("aaa", "web", &["bridge"], false);
        c.host
            .port_bindings
            .push(PortBinding::new(8080, PortProtocol::Tcp, 80));
        let mock = MockDockerClient::new().with_container(c);
        let bootstrapper = bootstrapper(&mock, None);

        assert_eq!(bootstrapper.bootstrap_container("aaa").await.unwrap(), None);
        assert!(mutating_calls(&mock).is_empty());
    }

    #[tokio::test]
    async fn isolated_container_without_ports_is_left_alone() {
        let c = test_descriptor("aaa", "db", &["netward-secure"], true);
        let mock = MockDockerClient::new().with_container(c);
        let bootstrapper = bootstrapper(&mock, None);

        assert_eq!(bootstrapper.bootstrap_container("aaa").await.unwrap(), None);
        assert!(mutating_calls(&mock).is_empty());
    }

    #[tokio::test]
    async fn public_container_without_ports_is_rewired_live() {
        let c = test_descriptor("aaa", "web", &["bridge"], true);
        let mock = MockDockerClient::new().with_container(c);
        let bootstrapper = bootstrapper(&mock, None);

        assert_eq!(bootstrapper.bootstrap_container("aaa").await.unwrap(), None);

        let after = mock.container_by_name("web").unwrap();
        assert_eq!(after.id, "aaa");
        assert!(is_attached_to(&after, "netward-secure"));
        assert!(!is_attached_to(&after, "bridge"));
        assert!(mock.calls_of("create").is_empty());
    }

    #[tokio::test]
    async fn public_container_with_ports_is_recreated_isolated() {
        let mut c = test_descriptor("aaa", "web", &["bridge"], true);
        c.host
            .port_bindings
            .push(PortBinding::new(8080, PortProtocol::Tcp, 80));
        c.spec.exposed_ports.insert("80/tcp".to_owned());
        let mock = MockDockerClient::new().with_container(c);
        let bootstrapper = bootstrapper(&mock, None);

        let new_id = bootstrapper
            .bootstrap_container("aaa")
            .await
            .unwrap()
            .unwrap();

        let after = mock.container_by_name("web").unwrap();
        assert_eq!(after.id, new_id);
        assert!(is_attached_to(&after, "netward-secure"));
        assert!(!is_attached_to(&after, "bridge"));
        assert!(after.host.port_bindings.is_empty());
        assert!(after.spec.exposed_ports.is_empty());
    }

    #[tokio::test]
    async fn host_mode_container_is_recreated_on_isolated_network() {
        let c = test_descriptor("aaa", "web", &["host"], true);
        let mock = MockDockerClient::new().with_container(c);
        let bootstrapper = bootstrapper(&mock, None);

        let new_id = bootstrapper.bootstrap_container("aaa").await.unwrap();
        assert!(new_id.is_some());

        let after = mock.container_by_name("web").unwrap();
        assert_eq!(after.host.network_mode.as_deref(), Some("netward-secure"));
        assert!(mock.calls_of("disconnect").is_empty());
    }

    #[tokio::test]
    async fn self_container_shares_isolated_network() {
        let me = test_descriptor("self", "netward", &["bridge"], false);
        let c = test_descriptor("aaa", "web", &["bridge"], true);
        let mock = MockDockerClient::new()
            .with_container(me)
            .with_container(c);
        let bootstrapper = bootstrapper(&mock, Some("netward"));

        bootstrapper.bootstrap_container("aaa").await.unwrap();

        let me = mock.container_by_name("netward").unwrap();
        let web = mock.container_by_name("web").unwrap();
        assert!(is_attached_to(&me, "netward-secure"));
        assert!(is_attached_to(&web, "netward-secure"));
        assert!(!is_attached_to(&web, "bridge"));
    }

    #[tokio::test]
    async fn shared_network_container_with_ports_gets_isolated_network_created() {
        let me = test_descriptor("self", "netward", &["backend"], false);
        let mut c = test_descriptor("aaa", "web", &["bridge", "backend"], true);
        c.host
            .port_bindings
            .push(PortBinding::new(8080, PortProtocol::Tcp, 80));
        let mock = MockDockerClient::new()
            .with_container(me)
            .with_container(c);
        let bootstrapper = bootstrapper(&mock, Some("netward"));

        let new_id = bootstrapper
            .bootstrap_container("aaa")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            mock.calls_of("ensure_network"),
            vec!["ensure_network:netward-secure"]
        );
        let web = mock.container_by_name("web").unwrap();
        assert_eq!(web.id, new_id);
        assert_eq!(web.host.network_mode.as_deref(), Some("netward-secure"));
        assert!(is_attached_to(&web, "backend"));
        assert!(!is_attached_to(&web, "bridge"));
        assert!(web.host.port_bindings.is_empty());
    }

    #[tokio::test]
    async fn self_container_is_attached_once_per_pass() {
        let me = test_descriptor("self", "netward", &["bridge"], false);
        let web = test_descriptor("aaa", "web", &["bridge"], true);
        let api = test_descriptor("bbb", "api", &["bridge"], true);
        let mock = MockDockerClient::new()
            .with_container(me)
            .with_container(web)
            .with_container(api);
        let bootstrapper = bootstrapper(&mock, Some("netward"));

        let report = bootstrapper.run_pass().await;

        assert_eq!(report.failed(), 0);
        assert_eq!(report.remediated, 2);
        let self_connects = mock
            .calls_of("connect")
            .into_iter()
            .filter(|c| c.ends_with(":self"))
            .count();
        assert_eq!(self_connects, 1);
    }

    #[tokio::test]
    async fn remediate_container_reports_live_rewire() {
        let c = test_descriptor("aaa", "web", &["bridge"], true);
        let mock = MockDockerClient::new().with_container(c);
        let bootstrapper = bootstrapper(&mock, None);

        assert_eq!(
            bootstrapper.remediate_container("aaa").await.unwrap(),
            Remediation::Rewired
        );
        assert_eq!(
            bootstrapper.remediate_container("aaa").await.unwrap(),
            Remediation::Unchanged
        );
    }

    #[tokio::test]
    async fn missing_self_container_fails_the_pass() {
        let c = test_descriptor("aaa", "web", &["bridge"], true);
        let mock = MockDockerClient::new().with_container(c);
        let bootstrapper = bootstrapper(&mock, Some("gone"));

        let errors = bootstrapper.bootstrap_all().await;
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], GuardError::ContainerNotFound(_)));
        assert!(mutating_calls(&mock).is_empty());
    }

    #[tokio::test]
    async fn run_pass_collects_errors_and_continues() {
        let broken = test_descriptor("aaa", "broken", &["bridge"], true);
        let fine = test_descriptor("bbb", "fine", &["bridge"], true);
        let plain = test_descriptor("ccc", "plain", &["bridge"], false);
        let mock = MockDockerClient::new()
            .with_container(broken)
            .with_container(fine)
            .with_container(plain)
            .fail("disconnect", 1);
        let bootstrapper = bootstrapper(&mock, None);

        let report = bootstrapper.run_pass().await;

        assert_eq!(report.scanned, 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.remediated, 1);
        assert!(matches!(
            report.errors[0],
            GuardError::NetworkOperation { .. }
        ));
        let fine = mock.container_by_name("fine").unwrap();
        assert!(!is_attached_to(&fine, "bridge"));
    }

    #[tokio::test]
    async fn mutation_failure_surfaces_as_guard_error() {
        let mut c = test_descriptor("aaa", "web", &["bridge"], true);
        c.host
            .port_bindings
            .push(PortBinding::new(443, PortProtocol::Tcp, 443));
        let mock = MockDockerClient::new().with_container(c).fail("stop", 1);
        let bootstrapper = bootstrapper(&mock, None);

        let err = bootstrapper.bootstrap_container("aaa").await.unwrap_err();
        assert!(matches!(err, GuardError::Mutation(_)));
    }
}
