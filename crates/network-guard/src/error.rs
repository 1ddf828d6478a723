//! 네트워크 가드 에러 타입
//!
//! [`GuardError`]는 네트워크 가드 내부에서 발생하는 모든 에러를 표현합니다.
//! [`MutationError`]는 컨테이너 재생성 실패를 원인 에러와 롤백 에러로 나누어 담습니다.
//! `From<GuardError> for NetwardError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use std::fmt;

use netward_core::error::{GuardFailure, NetwardError};

/// 컨테이너 재생성 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStep {
    /// 기존 컨테이너 조회
    Inspect,
    /// 기존 컨테이너 정지
    Stop,
    /// 기존 컨테이너 삭제
    Remove,
    /// 삭제 완료 대기
    Wait,
    /// 새 컨테이너 생성
    Create,
    /// 새 컨테이너 시작
    Start,
}

impl MutationStep {
    /// 로그/메트릭 태그용 고정 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inspect => "inspect",
            Self::Stop => "stop",
            Self::Remove => "remove",
            Self::Wait => "wait",
            Self::Create => "create",
            Self::Start => "start",
        }
    }
}

impl fmt::Display for MutationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 네트워크 가드 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Docker 데몬 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// 컨테이너 ID/이름 형식 오류
    #[error("invalid identifier '{value}': {reason}")]
    InvalidIdentifier {
        /// 입력값
        value: String,
        /// 거부 사유
        reason: String,
    },

    /// 재생성 단계 실패
    #[error("{step} failed for container '{container}': {reason}")]
    MutationStep {
        /// 실패한 단계
        step: MutationStep,
        /// 대상 컨테이너 ID 또는 이름
        container: String,
        /// 실패 사유
        reason: String,
    },

    /// 네트워크 연결/해제 실패
    #[error("network '{network}' operation failed for container '{container}': {reason}")]
    NetworkOperation {
        /// 네트워크 이름
        network: String,
        /// 대상 컨테이너
        container: String,
        /// 실패 사유
        reason: String,
    },

    /// 롤백 실패
    #[error("rollback failed for container '{container}': {reason}")]
    Rollback {
        /// 복구하려던 컨테이너 이름
        container: String,
        /// 실패 사유
        reason: String,
    },

    /// 삭제 완료 대기 시간 초과
    #[error("container '{container}' was not destroyed within {waited_ms}ms")]
    Timeout {
        /// 대상 컨테이너 ID
        container: String,
        /// 대기한 시간 (밀리초)
        waited_ms: u64,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 재생성 실패 (롤백 결과 포함)
    #[error(transparent)]
    Mutation(Box<MutationError>),
}

/// 컨테이너 재생성 실패
///
/// `primary`는 시퀀스를 중단시킨 원래 에러이고, `rollback`은 복구 시도가
/// 실패한 경우에만 채워집니다. 롤백 실패가 원래 에러를 가리지 않습니다.
#[derive(Debug)]
pub struct MutationError {
    /// 시퀀스를 중단시킨 에러
    pub primary: GuardError,
    /// 롤백 실패 (롤백을 시도하지 않았거나 성공했으면 `None`)
    pub rollback: Option<GuardError>,
}

impl MutationError {
    /// 롤백 없이 실패한 경우의 에러를 생성합니다.
    pub fn new(primary: GuardError) -> Self {
        Self {
            primary,
            rollback: None,
        }
    }

    /// 롤백 결과를 덧붙입니다.
    pub fn with_rollback(mut self, rollback: Option<GuardError>) -> Self {
        self.rollback = rollback;
        self
    }
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if let Some(rollback) = &self.rollback {
            write!(f, " (additionally: {rollback})")?;
        }
        Ok(())
    }
}

impl std::error::Error for MutationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.primary)
    }
}

impl From<GuardError> for MutationError {
    fn from(err: GuardError) -> Self {
        Self::new(err)
    }
}

impl From<MutationError> for GuardError {
    fn from(err: MutationError) -> Self {
        GuardError::Mutation(Box::new(err))
    }
}

impl From<GuardError> for NetwardError {
    fn from(err: GuardError) -> Self {
        let failure = match &err {
            GuardError::DockerConnection(msg) => GuardFailure::Connection(msg.clone()),
            GuardError::ContainerNotFound(id) => GuardFailure::NotFound(id.clone()),
            GuardError::MutationStep { .. }
            | GuardError::Rollback { .. }
            | GuardError::Timeout { .. }
            | GuardError::Mutation(_) => GuardFailure::Mutation(err.to_string()),
            GuardError::NetworkOperation { .. } => GuardFailure::Network(err.to_string()),
            GuardError::DockerApi(_)
            | GuardError::InvalidIdentifier { .. }
            | GuardError::Config { .. } => GuardFailure::Api(err.to_string()),
        };
        NetwardError::Guard(failure)
    }
}
