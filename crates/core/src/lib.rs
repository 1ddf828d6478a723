//! netward 공통 크레이트
//!
//! 데몬과 네트워크 가드가 공유하는 에러 타입, 설정, 메트릭 이름을 제공합니다.
//!
//! - [`config`]: `netward.toml` 파싱, 환경변수 오버라이드, 검증
//! - [`error`]: 최상위 에러 타입 (`NetwardError`)
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;

// --- 주요 타입 re-export ---

pub use config::NetwardConfig;
pub use error::{ConfigError, GuardFailure, NetwardError};
