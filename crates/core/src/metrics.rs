//! 메트릭 상수
//!
//! 모든 메트릭의 이름을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `netward_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(netward_core::metrics::MUTATIONS_TOTAL, "result" => "success").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 재생성 단계 레이블 키 (inspect, stop, remove, wait, create, start)
pub const LABEL_STEP: &str = "step";

// ─── Network Guard 메트릭 ──────────────────────────────────────────

/// 컨테이너 재생성 시도 수 (counter, label: result, step)
pub const MUTATIONS_TOTAL: &str = "netward_mutations_total";

/// 롤백 시도 수 (counter, label: result)
pub const ROLLBACKS_TOTAL: &str = "netward_rollbacks_total";

/// 재연결 실패한 네트워크 수 (counter)
pub const REATTACH_FAILURES_TOTAL: &str = "netward_reattach_failures_total";

/// 부트스트랩 패스 실행 수 (counter)
pub const BOOTSTRAP_PASSES_TOTAL: &str = "netward_bootstrap_passes_total";

/// 정책 위반으로 조치된 컨테이너 수 (counter)
pub const BOOTSTRAP_REMEDIATIONS_TOTAL: &str = "netward_bootstrap_remediations_total";

/// 부트스트랩 중 실패한 컨테이너 수 (counter)
pub const BOOTSTRAP_ERRORS_TOTAL: &str = "netward_bootstrap_errors_total";

/// Docker 데몬 재연결 수 (counter)
pub const DOCKER_RECONNECTS_TOTAL: &str = "netward_docker_reconnects_total";
