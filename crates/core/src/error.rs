//! 에러 타입 — 도메인별 에러 정의

/// netward 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum NetwardError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 컨테이너 네트워크 정책 에러
    #[error("network guard error: {0}")]
    Guard(#[from] GuardFailure),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 네트워크 가드 실패 분류
///
/// 네트워크 가드 크레이트의 상세 에러를 상위 레이어가 분기할 수 있는 수준으로 요약합니다.
#[derive(Debug, thiserror::Error)]
pub enum GuardFailure {
    /// Docker 데몬 연결 불가
    #[error("docker daemon unreachable: {0}")]
    Connection(String),

    /// 컨테이너 조회 실패
    #[error("container not found: {0}")]
    NotFound(String),

    /// 컨테이너 재생성 단계 실패
    #[error("container mutation failed: {0}")]
    Mutation(String),

    /// 네트워크 연결/해제 실패
    #[error("network operation failed: {0}")]
    Network(String),

    /// 기타 Docker API 실패
    #[error("docker api error: {0}")]
    Api(String),
}
