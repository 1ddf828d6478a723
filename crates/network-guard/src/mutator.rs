//! 컨테이너 재생성 엔진
//!
//! [`ContainerMutator::edit_container`]는 실행 중인 컨테이너를 새 스펙으로 교체합니다.
//!
//! # 재생성 시퀀스
//! 1. 기존 컨테이너 조회 (실패 시 중단)
//! 2. 이름 고정 -- 새 스펙의 hostname과 생성 이름을 기존 이름으로.
//!    격리 정책이면 격리 네트워크를 보장하고 생성 네트워크로 지정
//! 3. 정지 (실패 시 중단, 컨테이너 변경 없음)
//! 4. 삭제 (실패 시 중단)
//! 5. 삭제 완료 대기 (지수 백오프, 상한 초과 시 타임아웃)
//! 6. 새 스펙으로 생성 (실패 시 롤백)
//! 7. 기존 네트워크 재연결 (실패는 경고만)
//! 8. 시작 (실패 시 롤백)
//!
//! 롤백은 실패한 새 컨테이너를 지우고 기존 디스크립터로 다시 생성/연결/시작합니다.
//! 롤백 실패는 [`MutationError::rollback`]에 담기며 원래 에러를 덮어쓰지 않습니다.
//!
//! # 동시성
//! 모든 시퀀스는 [`MutationLock`]을 잡고 실행되므로 프로세스 전체에서 한 번에
//! 하나의 재생성만 진행됩니다. 퍼밋은 drop 시 해제되어 모든 에러 경로에서 풀립니다.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use netward_core::metrics as m;

use crate::config::GuardConfig;
use crate::connection::{ConnectionManager, DockerConnector};
use crate::descriptor::{ContainerDescriptor, NetworkPolicy};
use crate::docker::DockerClient;
use crate::error::{GuardError, MutationError};
use crate::topology::NetworkTopology;

/// 프로세스 전역 재생성 락 (퍼밋 1개짜리 세마포어)
///
/// 클론은 같은 세마포어를 공유합니다.
#[derive(Clone)]
pub struct MutationLock {
    semaphore: Arc<Semaphore>,
}

/// [`MutationLock`] 퍼밋 -- drop 시 해제
pub struct MutationPermit {
    _permit: OwnedSemaphorePermit,
}

impl MutationLock {
    /// 새 락을 생성합니다.
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// 퍼밋을 얻을 때까지 대기합니다.
    pub async fn acquire(&self) -> Result<MutationPermit, GuardError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GuardError::DockerApi("mutation lock closed".to_owned()))?;
        Ok(MutationPermit { _permit: permit })
    }

    /// 대기 없이 퍼밋을 시도합니다.
    pub fn try_acquire(&self) -> Option<MutationPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| MutationPermit { _permit: permit })
    }

    /// 진행 중인 재생성이 없는지 확인합니다.
    pub fn is_idle(&self) -> bool {
        self.semaphore.available_permits() == 1
    }
}

impl Default for MutationLock {
    fn default() -> Self {
        Self::new()
    }
}

/// 메트릭/로그용 실패 단계 이름
fn failed_step(err: &GuardError) -> &'static str {
    match err {
        GuardError::MutationStep { step, .. } => step.as_str(),
        GuardError::Timeout { .. } => "wait",
        GuardError::DockerConnection(_) => "connect",
        _ => "inspect",
    }
}

/// 컨테이너 재생성기
pub struct ContainerMutator<C: DockerConnector> {
    connection: Arc<ConnectionManager<C>>,
    topology: Arc<NetworkTopology<C>>,
    lock: MutationLock,
    config: GuardConfig,
}

impl<C: DockerConnector> ContainerMutator<C> {
    /// 새 재생성기를 생성합니다.
    pub fn new(
        connection: Arc<ConnectionManager<C>>,
        topology: Arc<NetworkTopology<C>>,
        lock: MutationLock,
        config: GuardConfig,
    ) -> Self {
        Self {
            connection,
            topology,
            lock,
            config,
        }
    }

    /// 재생성 락을 반환합니다.
    pub fn lock(&self) -> &MutationLock {
        &self.lock
    }

    /// 컨테이너를 새 스펙으로 재생성하고 새 컨테이너 ID를 반환합니다.
    ///
    /// # Errors
    ///
    /// 시퀀스를 중단시킨 에러가 [`MutationError::primary`]에, 롤백 실패가 있으면
    /// [`MutationError::rollback`]에 담깁니다.
    pub async fn edit_container(
        &self,
        container_id: &str,
        new_spec: ContainerDescriptor,
    ) -> Result<String, MutationError> {
        let _permit = self.lock.acquire().await?;

        let result = self.recreate(container_id, new_spec).await;
        match &result {
            Ok(new_id) => {
                metrics::counter!(m::MUTATIONS_TOTAL, m::LABEL_RESULT => "success").increment(1);
                info!(container_id, new_id = new_id.as_str(), "container recreated");
            }
            Err(e) => {
                let step = failed_step(&e.primary);
                metrics::counter!(
                    m::MUTATIONS_TOTAL,
                    m::LABEL_RESULT => "failure",
                    m::LABEL_STEP => step
                )
                .increment(1);
                error!(container_id, step, error = %e, "container recreation failed");
            }
        }
        result
    }

    async fn recreate(
        &self,
        container_id: &str,
        mut new_spec: ContainerDescriptor,
    ) -> Result<String, MutationError> {
        let client = self.connection.connect().await?;
        let old = client.inspect_container(container_id).await?;

        // 같은 이름으로 다시 만들어 다른 컨테이너가 이름으로 계속 찾을 수 있게 함
        let name = old.name.clone();
        new_spec.spec.hostname = Some(name.clone());

        // 라벨이 정책의 기준. 필드를 직접 고친 스펙도 여기서 맞춤
        new_spec.policy = NetworkPolicy::from_labels(&new_spec.spec.labels);

        let skip_public = new_spec.policy.forbids_public_network();
        if skip_public {
            let lands_on_public = match new_spec.host.network_mode.as_deref() {
                None | Some("") | Some("default") => true,
                Some(mode) => mode == self.topology.public_network(),
            };
            if lands_on_public {
                let isolated = self.topology.isolated_network();
                client.ensure_network(isolated).await?;
                new_spec.host.network_mode = Some(isolated.to_owned());
            }
        }

        debug!(container_id = old.id.as_str(), name = name.as_str(), "stopping container");
        client
            .stop_container(&old.id, self.config.stop_timeout_secs)
            .await?;
        client.remove_container(&old.id).await?;
        self.wait_for_destruction(client.as_ref(), &old.id).await?;

        let new_id = match client.create_container(&name, &new_spec).await {
            Ok(id) => id,
            Err(e) => return Err(self.rollback(client.as_ref(), &old, None, e).await),
        };

        let report = self.topology.reattach_all(&old, &new_id, skip_public).await;
        if !report.is_complete() {
            warn!(
                container_id = new_id.as_str(),
                failed = report.failed.len(),
                "some networks were not reattached"
            );
        }

        if let Err(e) = client.start_container(&new_id).await {
            return Err(self
                .rollback(client.as_ref(), &old, Some(new_id.as_str()), e)
                .await);
        }

        Ok(new_id)
    }

    /// 컨테이너가 사라질 때까지 지수 백오프로 조회합니다.
    ///
    /// `ContainerNotFound`만 대기를 끝냅니다. 다른 조회 에러는 기록 후 다시 조회합니다.
    async fn wait_for_destruction(
        &self,
        client: &C::Client,
        container_id: &str,
    ) -> Result<(), GuardError> {
        let started = Instant::now();
        let deadline = started + self.config.destroy_timeout();
        let mut interval = self.config.destroy_poll_initial();

        loop {
            match client.inspect_container(container_id).await {
                Err(GuardError::ContainerNotFound(_)) => return Ok(()),
                Err(e) => warn!(container_id, error = %e, "inspect during destroy wait failed"),
                Ok(_) => debug!(container_id, "container still present"),
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                return Err(GuardError::Timeout {
                    container: container_id.to_owned(),
                    waited_ms,
                });
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
            interval = (interval * 2).min(self.config.destroy_poll_max());
        }
    }

    /// 기존 디스크립터로 컨테이너를 복구하고 결과를 원래 에러와 묶습니다.
    async fn rollback(
        &self,
        client: &C::Client,
        old: &ContainerDescriptor,
        failed_id: Option<&str>,
        primary: GuardError,
    ) -> MutationError {
        warn!(
            container_id = old.id.as_str(),
            name = old.name.as_str(),
            error = %primary,
            "rolling back container recreation"
        );

        let rollback = match self.restore(client, old, failed_id).await {
            Ok(restored_id) => {
                metrics::counter!(m::ROLLBACKS_TOTAL, m::LABEL_RESULT => "success").increment(1);
                info!(
                    name = old.name.as_str(),
                    restored_id = restored_id.as_str(),
                    "original container restored"
                );
                None
            }
            Err(e) => {
                metrics::counter!(m::ROLLBACKS_TOTAL, m::LABEL_RESULT => "failure").increment(1);
                error!(name = old.name.as_str(), error = %e, "rollback failed");
                Some(GuardError::Rollback {
                    container: old.name.clone(),
                    reason: e.to_string(),
                })
            }
        };

        MutationError::new(primary).with_rollback(rollback)
    }

    async fn restore(
        &self,
        client: &C::Client,
        old: &ContainerDescriptor,
        failed_id: Option<&str>,
    ) -> Result<String, GuardError> {
        if let Some(failed_id) = failed_id {
            client.remove_container(failed_id).await?;
            self.wait_for_destruction(client, failed_id).await?;
        }

        let restored_id = client.create_container(&old.name, old).await?;
        let report = self.topology.reattach_all(old, &restored_id, false).await;
        if !report.is_complete() {
            warn!(
                container_id = restored_id.as_str(),
                failed = report.failed.len(),
                "restored container is missing networks"
            );
        }
        client.start_container(&restored_id).await?;
        Ok(restored_id)
    }
}
