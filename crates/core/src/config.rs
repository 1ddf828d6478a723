//! 설정 관리 — netward.toml 파싱 및 런타임 설정
//!
//! [`NetwardConfig`]는 데몬과 네트워크 가드가 사용하는 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`NETWARD_POLICY_ISOLATED_NETWORK=secure-net` 형식)
//! 3. 설정 파일 (`netward.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), netward_core::error::NetwardError> {
//! use netward_core::config::NetwardConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = NetwardConfig::load("netward.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = NetwardConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, NetwardError};

/// netward 통합 설정
///
/// `netward.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetwardConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Docker 데몬 연결 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// 네트워크 격리 정책 설정
    #[serde(default)]
    pub policy: PolicyConfig,
    /// 컨테이너 재생성 설정
    #[serde(default)]
    pub mutation: MutationConfig,
}

impl NetwardConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, NetwardError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, NetwardError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NetwardError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                NetwardError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, NetwardError> {
        toml::from_str(toml_str).map_err(|e| {
            NetwardError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `NETWARD_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "NETWARD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "NETWARD_GENERAL_LOG_FORMAT");

        // Docker
        override_string(&mut self.docker.socket, "NETWARD_DOCKER_SOCKET");
        override_u64(&mut self.docker.timeout_secs, "NETWARD_DOCKER_TIMEOUT_SECS");

        // Policy
        override_string(
            &mut self.policy.public_network,
            "NETWARD_POLICY_PUBLIC_NETWORK",
        );
        override_string(
            &mut self.policy.isolated_network,
            "NETWARD_POLICY_ISOLATED_NETWORK",
        );
        override_string(
            &mut self.policy.self_container,
            "NETWARD_POLICY_SELF_CONTAINER",
        );
        override_u64(
            &mut self.policy.bootstrap_interval_secs,
            "NETWARD_POLICY_BOOTSTRAP_INTERVAL_SECS",
        );

        // Mutation
        override_u32(
            &mut self.mutation.stop_timeout_secs,
            "NETWARD_MUTATION_STOP_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.mutation.destroy_poll_initial_ms,
            "NETWARD_MUTATION_DESTROY_POLL_INITIAL_MS",
        );
        override_u64(
            &mut self.mutation.destroy_poll_max_ms,
            "NETWARD_MUTATION_DESTROY_POLL_MAX_MS",
        );
        override_u64(
            &mut self.mutation.destroy_timeout_secs,
            "NETWARD_MUTATION_DESTROY_TIMEOUT_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), NetwardError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.docker.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "docker.timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.policy.public_network.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "policy.public_network".to_owned(),
                reason: "network name must not be empty".to_owned(),
            }
            .into());
        }

        if self.policy.isolated_network.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "policy.isolated_network".to_owned(),
                reason: "network name must not be empty".to_owned(),
            }
            .into());
        }

        // 격리 네트워크가 공용 네트워크와 같으면 격리가 성립하지 않음
        if self.policy.public_network == self.policy.isolated_network {
            return Err(ConfigError::InvalidValue {
                field: "policy.isolated_network".to_owned(),
                reason: "must differ from policy.public_network".to_owned(),
            }
            .into());
        }

        if self.mutation.destroy_poll_initial_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "mutation.destroy_poll_initial_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.mutation.destroy_poll_max_ms < self.mutation.destroy_poll_initial_ms {
            return Err(ConfigError::InvalidValue {
                field: "mutation.destroy_poll_max_ms".to_owned(),
                reason: "must be >= mutation.destroy_poll_initial_ms".to_owned(),
            }
            .into());
        }

        if self.mutation.destroy_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "mutation.destroy_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// Docker 데몬 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker 소켓 경로 (비어있으면 `DOCKER_HOST` 또는 플랫폼 기본값 사용)
    pub socket: String,
    /// API 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: String::new(),
            timeout_secs: 120,
        }
    }
}

/// 네트워크 격리 정책 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// 공용(bridge) 네트워크 이름
    pub public_network: String,
    /// 격리 네트워크 이름
    pub isolated_network: String,
    /// 자기 자신의 컨테이너 ID 또는 이름 (비어있으면 컨테이너 밖에서 실행 중)
    pub self_container: String,
    /// 부트스트랩 반복 주기 (초, 0이면 한 번만 실행)
    pub bootstrap_interval_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            public_network: "bridge".to_owned(),
            isolated_network: "netward-secure".to_owned(),
            self_container: String::new(),
            bootstrap_interval_secs: 0,
        }
    }
}

/// 컨테이너 재생성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// 정지 요청 시 SIGKILL 전 대기 시간 (초)
    pub stop_timeout_secs: u32,
    /// 삭제 완료 폴링 초기 간격 (밀리초)
    pub destroy_poll_initial_ms: u64,
    /// 삭제 완료 폴링 최대 간격 (밀리초)
    pub destroy_poll_max_ms: u64,
    /// 삭제 완료 대기 상한 (초)
    pub destroy_timeout_secs: u64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 10,
            destroy_poll_initial_ms: 250,
            destroy_poll_max_ms: 2_000,
            destroy_timeout_secs: 60,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = NetwardConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.policy.public_network, "bridge");
        assert_eq!(config.policy.isolated_network, "netward-secure");
        assert!(config.policy.self_container.is_empty());
        assert_eq!(config.mutation.destroy_timeout_secs, 60);
    }

    #[test]
    fn default_config_passes_validation() {
        NetwardConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = NetwardConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.docker.timeout_secs, 120);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[policy]
isolated_network = "private-net"
"#;
        let config = NetwardConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.policy.isolated_network, "private-net");
        assert_eq!(config.policy.public_network, "bridge");
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let err = NetwardConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            NetwardError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = NetwardConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("general.log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = NetwardConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("general.log_format"));
    }

    #[test]
    fn validate_rejects_identical_networks() {
        let mut config = NetwardConfig::default();
        config.policy.isolated_network = "bridge".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("policy.isolated_network"));
    }

    #[test]
    fn validate_rejects_empty_public_network() {
        let mut config = NetwardConfig::default();
        config.policy.public_network.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_poll_bounds() {
        let mut config = NetwardConfig::default();
        config.mutation.destroy_poll_initial_ms = 5_000;
        config.mutation.destroy_poll_max_ms = 1_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("destroy_poll_max_ms"));
    }

    #[test]
    fn validate_rejects_zero_destroy_timeout() {
        let mut config = NetwardConfig::default();
        config.mutation.destroy_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_NETWARD_STR", "overridden") };
        override_string(&mut val, "TEST_NETWARD_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_NETWARD_STR") };
    }

    #[test]
    #[serial]
    fn env_override_u64_invalid_keeps_original() {
        let mut val = 42_u64;
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_NETWARD_U64_BAD", "not-a-number") };
        override_u64(&mut val, "TEST_NETWARD_U64_BAD");
        assert_eq!(val, 42);
        unsafe { std::env::remove_var("TEST_NETWARD_U64_BAD") };
    }

    #[test]
    #[serial]
    fn apply_env_overrides_updates_policy_section() {
        let mut config = NetwardConfig::default();
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe {
            std::env::set_var("NETWARD_POLICY_ISOLATED_NETWORK", "vault-net");
            std::env::set_var("NETWARD_MUTATION_STOP_TIMEOUT_SECS", "3");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("NETWARD_POLICY_ISOLATED_NETWORK");
            std::env::remove_var("NETWARD_MUTATION_STOP_TIMEOUT_SECS");
        }
        assert_eq!(config.policy.isolated_network, "vault-net");
        assert_eq!(config.mutation.stop_timeout_secs, 3);
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_NETWARD_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = NetwardConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = NetwardConfig::parse(&toml_str).unwrap();
        assert_eq!(config.policy.isolated_network, parsed.policy.isolated_network);
        assert_eq!(
            config.mutation.destroy_poll_max_ms,
            parsed.mutation.destroy_poll_max_ms
        );
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = NetwardConfig::from_file("/nonexistent/path/netward.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NetwardError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
