//! 네트워크 가드 -- 연결 관리자, 토폴로지, 재생성기, 부트스트래퍼 묶음
//!
//! [`NetworkGuard`]는 모든 구성요소가 같은 [`ConnectionManager`]와
//! [`MutationLock`]을 공유하도록 한 번에 조립합니다.
//!
//! # 사용 예시
//! ```ignore
//! use netward_network_guard::{BollardConnector, GuardConfig, NetworkGuardBuilder};
//!
//! let config = GuardConfig::default();
//! let guard = NetworkGuardBuilder::new()
//!     .config(config.clone())
//!     .connector(BollardConnector::from_config(&config))
//!     .build()?;
//!
//! let errors = guard.bootstrapper().bootstrap_all().await;
//! ```

use std::sync::Arc;

use crate::bootstrap::NetworkPolicyBootstrapper;
use crate::config::GuardConfig;
use crate::connection::{ConnectionManager, DockerConnector};
use crate::error::GuardError;
use crate::mutator::{ContainerMutator, MutationLock};
use crate::topology::NetworkTopology;

/// 조립된 네트워크 가드
pub struct NetworkGuard<C: DockerConnector> {
    config: GuardConfig,
    connection: Arc<ConnectionManager<C>>,
    topology: Arc<NetworkTopology<C>>,
    mutator: Arc<ContainerMutator<C>>,
    bootstrapper: NetworkPolicyBootstrapper<C>,
}

impl<C: DockerConnector> NetworkGuard<C> {
    /// 가드 설정
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// 공유 연결 관리자
    pub fn connection(&self) -> &Arc<ConnectionManager<C>> {
        &self.connection
    }

    /// 네트워크 토폴로지
    pub fn topology(&self) -> &Arc<NetworkTopology<C>> {
        &self.topology
    }

    /// 컨테이너 재생성기
    pub fn mutator(&self) -> &Arc<ContainerMutator<C>> {
        &self.mutator
    }

    /// 네트워크 정책 부트스트래퍼
    pub fn bootstrapper(&self) -> &NetworkPolicyBootstrapper<C> {
        &self.bootstrapper
    }
}

/// 네트워크 가드 빌더
pub struct NetworkGuardBuilder<C: DockerConnector> {
    config: GuardConfig,
    connector: Option<C>,
    lock: Option<MutationLock>,
}

impl<C: DockerConnector> NetworkGuardBuilder<C> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: GuardConfig::default(),
            connector: None,
            lock: None,
        }
    }

    /// 가드 설정을 지정합니다.
    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Docker 커넥터를 설정합니다.
    pub fn connector(mut self, connector: C) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 외부에서 공유하는 재생성 락을 설정합니다.
    ///
    /// 설정하지 않으면 새 락을 생성합니다.
    pub fn mutation_lock(mut self, lock: MutationLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// 가드를 빌드합니다.
    pub fn build(self) -> Result<NetworkGuard<C>, GuardError> {
        self.config.validate()?;

        let connector = self.connector.ok_or_else(|| GuardError::Config {
            field: "connector".to_owned(),
            reason: "docker connector must be provided".to_owned(),
        })?;

        let connection = Arc::new(ConnectionManager::new(connector));
        let topology = Arc::new(NetworkTopology::new(Arc::clone(&connection), &self.config));
        let mutator = Arc::new(ContainerMutator::new(
            Arc::clone(&connection),
            Arc::clone(&topology),
            self.lock.unwrap_or_default(),
            self.config.clone(),
        ));
        let bootstrapper = NetworkPolicyBootstrapper::new(
            Arc::clone(&connection),
            Arc::clone(&topology),
            Arc::clone(&mutator),
            self.config.self_container.clone(),
        );

        Ok(NetworkGuard {
            config: self.config,
            connection,
            topology,
            mutator,
            bootstrapper,
        })
    }
}

impl<C: DockerConnector> Default for NetworkGuardBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
