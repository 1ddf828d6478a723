//! 네트워크 가드 설정
//!
//! [`GuardConfig`]는 core의 [`NetwardConfig`](netward_core::config::NetwardConfig)에서
//! 네트워크 가드가 사용하는 필드만 모아 평탄화한 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use netward_core::config::NetwardConfig;
//! use netward_network_guard::config::GuardConfig;
//!
//! let core_config = NetwardConfig::default();
//! let config = GuardConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use netward_core::config::NetwardConfig;

use crate::docker::validate_identifier;
use crate::error::GuardError;

/// 네트워크 가드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Docker 소켓 경로 (비어있으면 `DOCKER_HOST` 또는 플랫폼 기본값)
    pub docker_socket: String,
    /// Docker API 타임아웃 (초)
    pub docker_timeout_secs: u64,
    /// 공용 네트워크 이름
    pub public_network: String,
    /// 격리 네트워크 이름
    pub isolated_network: String,
    /// 자기 자신의 컨테이너 ID 또는 이름
    pub self_container: Option<String>,
    /// 정지 시 SIGKILL 전 대기 시간 (초)
    pub stop_timeout_secs: u32,
    /// 삭제 완료 폴링 초기 간격 (밀리초)
    pub destroy_poll_initial_ms: u64,
    /// 삭제 완료 폴링 최대 간격 (밀리초)
    pub destroy_poll_max_ms: u64,
    /// 삭제 완료 대기 상한 (초)
    pub destroy_timeout_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            docker_socket: String::new(),
            docker_timeout_secs: 120,
            public_network: "bridge".to_owned(),
            isolated_network: "netward-secure".to_owned(),
            self_container: None,
            stop_timeout_secs: 10,
            destroy_poll_initial_ms: 250,
            destroy_poll_max_ms: 2_000,
            destroy_timeout_secs: 60,
        }
    }
}

/// 설정 상한값 상수
const MAX_DOCKER_TIMEOUT_SECS: u64 = 600;
const MAX_STOP_TIMEOUT_SECS: u32 = 300;
const MAX_DESTROY_POLL_MS: u64 = 60_000;
const MAX_DESTROY_TIMEOUT_SECS: u64 = 3600;

impl GuardConfig {
    /// core 설정에서 가드 설정을 생성합니다.
    ///
    /// 빈 `self_container`는 `None`으로 변환됩니다.
    pub fn from_core(core: &NetwardConfig) -> Self {
        let self_container = Some(core.policy.self_container.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        Self {
            docker_socket: core.docker.socket.clone(),
            docker_timeout_secs: core.docker.timeout_secs,
            public_network: core.policy.public_network.clone(),
            isolated_network: core.policy.isolated_network.clone(),
            self_container,
            stop_timeout_secs: core.mutation.stop_timeout_secs,
            destroy_poll_initial_ms: core.mutation.destroy_poll_initial_ms,
            destroy_poll_max_ms: core.mutation.destroy_poll_max_ms,
            destroy_timeout_secs: core.mutation.destroy_timeout_secs,
        }
    }

    /// 삭제 완료 폴링 초기 간격
    pub fn destroy_poll_initial(&self) -> Duration {
        Duration::from_millis(self.destroy_poll_initial_ms)
    }

    /// 삭제 완료 폴링 최대 간격
    pub fn destroy_poll_max(&self) -> Duration {
        Duration::from_millis(self.destroy_poll_max_ms)
    }

    /// 삭제 완료 대기 상한
    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_secs(self.destroy_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.docker_timeout_secs == 0 || self.docker_timeout_secs > MAX_DOCKER_TIMEOUT_SECS {
            return Err(GuardError::Config {
                field: "docker_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_DOCKER_TIMEOUT_SECS}"),
            });
        }

        for (field, name) in [
            ("public_network", &self.public_network),
            ("isolated_network", &self.isolated_network),
        ] {
            validate_identifier(name).map_err(|e| GuardError::Config {
                field: field.to_owned(),
                reason: e.to_string(),
            })?;
        }

        if self.public_network == self.isolated_network {
            return Err(GuardError::Config {
                field: "isolated_network".to_owned(),
                reason: "must differ from public_network".to_owned(),
            });
        }

        if let Some(self_container) = &self.self_container {
            validate_identifier(self_container).map_err(|e| GuardError::Config {
                field: "self_container".to_owned(),
                reason: e.to_string(),
            })?;
        }

        if self.stop_timeout_secs > MAX_STOP_TIMEOUT_SECS {
            return Err(GuardError::Config {
                field: "stop_timeout_secs".to_owned(),
                reason: format!("must be 0-{MAX_STOP_TIMEOUT_SECS}"),
            });
        }

        if self.destroy_poll_initial_ms == 0 || self.destroy_poll_initial_ms > MAX_DESTROY_POLL_MS {
            return Err(GuardError::Config {
                field: "destroy_poll_initial_ms".to_owned(),
                reason: format!("must be 1-{MAX_DESTROY_POLL_MS}"),
            });
        }

        if self.destroy_poll_max_ms < self.destroy_poll_initial_ms
            || self.destroy_poll_max_ms > MAX_DESTROY_POLL_MS
        {
            return Err(GuardError::Config {
                field: "destroy_poll_max_ms".to_owned(),
                reason: format!("must be destroy_poll_initial_ms-{MAX_DESTROY_POLL_MS}"),
            });
        }

        if self.destroy_timeout_secs == 0 || self.destroy_timeout_secs > MAX_DESTROY_TIMEOUT_SECS {
            return Err(GuardError::Config {
                field: "destroy_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_DESTROY_TIMEOUT_SECS}"),
            });
        }

        Ok(())
    }
}

/// 네트워크 가드 설정 빌더
#[derive(Default)]
pub struct GuardConfigBuilder {
    config: GuardConfig,
}

impl GuardConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// Docker 소켓 경로를 설정합니다.
    pub fn docker_socket(mut self, socket: impl Into<String>) -> Self {
        self.config.docker_socket = socket.into();
        self
    }

    /// Docker API 타임아웃(초)을 설정합니다.
    pub fn docker_timeout_secs(mut self, secs: u64) -> Self {
        self.config.docker_timeout_secs = secs;
        self
    }

    /// 공용 네트워크 이름을 설정합니다.
    pub fn public_network(mut self, name: impl Into<String>) -> Self {
        self.config.public_network = name.into();
        self
    }

    /// 격리 네트워크 이름을 설정합니다.
    pub fn isolated_network(mut self, name: impl Into<String>) -> Self {
        self.config.isolated_network = name.into();
        self
    }

    /// 자기 자신의 컨테이너를 설정합니다.
    pub fn self_container(mut self, id_or_name: impl Into<String>) -> Self {
        self.config.self_container = Some(id_or_name.into());
        self
    }

    /// 정지 대기 시간(초)을 설정합니다.
    pub fn stop_timeout_secs(mut self, secs: u32) -> Self {
        self.config.stop_timeout_secs = secs;
        self
    }

    /// 삭제 완료 폴링 간격(밀리초)을 설정합니다.
    pub fn destroy_poll_ms(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.config.destroy_poll_initial_ms = initial_ms;
        self.config.destroy_poll_max_ms = max_ms;
        self
    }

    /// 삭제 완료 대기 상한(초)을 설정합니다.
    pub fn destroy_timeout_secs(mut self, secs: u64) -> Self {
        self.config.destroy_timeout_secs = secs;
        self
    }

    /// 설정을 검증하고 `GuardConfig`를 생성합니다.
    pub fn build(self) -> Result<GuardConfig, GuardError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
