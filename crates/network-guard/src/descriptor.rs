//! 컨테이너 디스크립터 -- Docker 데몬에서 읽어온 컨테이너 상태의 일회성 사본
//!
//! [`ContainerDescriptor`]는 작업마다 새로 조회하고 작업이 끝나면 버립니다.
//! 재생성은 컨테이너 ID를 바꾸므로 디스크립터를 캐시하지 않습니다.
//!
//! 보안 라벨([`SECURITY_LABEL`])은 조회 시점에 [`NetworkPolicy`]로 한 번 해석되어
//! 디스크립터에 붙습니다. 라벨 변경 헬퍼는 정책을 다시 계산하므로
//! 라벨 맵과 정책이 어긋나지 않습니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 컨테이너를 보안 네트워크로 강제하는 라벨 키
pub const SECURITY_LABEL: &str = "netward.force-network-secured";

/// 컨테이너 네트워크 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPolicy {
    /// 정책 없음 -- 부트스트랩 대상 아님
    #[default]
    NoPolicy,
    /// 격리 네트워크 강제, 공용 네트워크와 공개 포트 금지
    ForceIsolated,
}

impl NetworkPolicy {
    /// 라벨 맵에서 정책을 해석합니다.
    ///
    /// 값이 정확히 `"true"`일 때만 [`NetworkPolicy::ForceIsolated`]입니다.
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        match labels.get(SECURITY_LABEL).map(String::as_str) {
            Some("true") => Self::ForceIsolated,
            _ => Self::NoPolicy,
        }
    }

    /// 공용 네트워크 연결을 금지하는지 여부
    pub fn forbids_public_network(&self) -> bool {
        matches!(self, Self::ForceIsolated)
    }
}

/// 포트 프로토콜
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
            Self::Sctp => f.write_str("sctp"),
        }
    }
}

impl FromStr for PortProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            other => Err(format!("unknown port protocol '{other}'")),
        }
    }
}

/// 호스트 포트 바인딩 (host port, protocol, container port)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// 바인딩할 호스트 IP (없으면 모든 인터페이스)
    pub host_ip: Option<String>,
    /// 호스트 포트
    pub host_port: u16,
    /// 프로토콜
    pub protocol: PortProtocol,
    /// 컨테이너 포트
    pub container_port: u16,
}

impl PortBinding {
    /// 모든 인터페이스에 바인딩하는 포트를 생성합니다.
    pub fn new(host_port: u16, protocol: PortProtocol, container_port: u16) -> Self {
        Self {
            host_ip: None,
            host_port,
            protocol,
            container_port,
        }
    }

    /// Docker API의 포트 키 (`"80/tcp"`)
    pub fn port_key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

/// `"80/tcp"` 형식의 포트 키를 (포트, 프로토콜)로 나눕니다.
///
/// 프로토콜이 생략되면 tcp로 간주합니다.
pub fn parse_port_key(key: &str) -> Option<(u16, PortProtocol)> {
    let (port, protocol) = match key.split_once('/') {
        Some((port, proto)) => (port, proto.parse().ok()?),
        None => (key, PortProtocol::Tcp),
    };
    Some((port.parse().ok()?, protocol))
}

/// 컨테이너 런타임 스펙
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub hostname: Option<String>,
    pub image: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    /// 노출 포트 키 (`"80/tcp"`)
    pub exposed_ports: BTreeSet<String>,
    pub labels: BTreeMap<String, String>,
}

/// 호스트 수준 설정
///
/// 재생성 후에도 유지되어야 하는 호스트 설정만 담습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    pub port_bindings: Vec<PortBinding>,
    pub binds: Vec<String>,
    /// 네트워크 모드 (`bridge`, `host`, `none`, `container:<id>`, 사용자 네트워크 이름)
    pub network_mode: Option<String>,
    pub restart_policy: Option<String>,
    pub privileged: bool,
    pub cap_add: Vec<String>,
    pub extra_hosts: Vec<String>,
}

/// 네트워크 연결 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub network_id: String,
    pub ip_address: Option<String>,
    pub aliases: Vec<String>,
}

/// 컨테이너 디스크립터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    /// 컨테이너 ID
    pub id: String,
    /// 컨테이너 이름 (앞의 `/` 제거)
    pub name: String,
    /// 런타임 스펙
    pub spec: ContainerSpec,
    /// 호스트 설정
    pub host: HostSettings,
    /// 현재 네트워크 연결 (네트워크 이름 -> 연결 정보)
    pub networks: BTreeMap<String, NetworkAttachment>,
    /// 조회 시점에 해석된 네트워크 정책
    pub policy: NetworkPolicy,
}

impl ContainerDescriptor {
    /// 디스크립터를 생성하고 라벨에서 정책을 해석합니다.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        spec: ContainerSpec,
        host: HostSettings,
        networks: BTreeMap<String, NetworkAttachment>,
    ) -> Self {
        let policy = NetworkPolicy::from_labels(&spec.labels);
        Self {
            id: id.into(),
            name: name.into().trim_start_matches('/').to_owned(),
            spec,
            host,
            networks,
            policy,
        }
    }

    /// 라벨 값이 `"true"`인지 확인합니다.
    pub fn is_label(&self, key: &str) -> bool {
        self.get_label(key) == Some("true")
    }

    /// 라벨이 비어있지 않은 값으로 존재하는지 확인합니다.
    pub fn has_label(&self, key: &str) -> bool {
        self.get_label(key).is_some_and(|v| !v.is_empty())
    }

    /// 라벨 값을 반환합니다.
    pub fn get_label(&self, key: &str) -> Option<&str> {
        self.spec.labels.get(key).map(String::as_str)
    }

    /// 라벨을 추가하거나 덮어씁니다.
    pub fn add_labels<K, V>(&mut self, labels: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in labels {
            self.spec.labels.insert(key.into(), value.into());
        }
        self.policy = NetworkPolicy::from_labels(&self.spec.labels);
    }

    /// 라벨을 삭제합니다. 없는 키는 무시합니다.
    pub fn remove_labels<K: AsRef<str>>(&mut self, keys: impl IntoIterator<Item = K>) {
        for key in keys {
            self.spec.labels.remove(key.as_ref());
        }
        self.policy = NetworkPolicy::from_labels(&self.spec.labels);
    }
}

/// 컨테이너 목록 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
}

/// 테스트용 디스크립터를 생성합니다.
///
/// 첫 번째 네트워크가 네트워크 모드가 되고, `secured`이면 보안 라벨이 붙습니다.
#[cfg(test)]
pub(crate) fn test_descriptor(
    id: &str,
    name: &str,
    networks: &[&str],
    secured: bool,
) -> ContainerDescriptor {
    let mut spec = ContainerSpec {
        image: "nginx:latest".to_owned(),
        ..Default::default()
    };
    if secured {
        spec.labels
            .insert(SECURITY_LABEL.to_owned(), "true".to_owned());
    }
    let host = HostSettings {
        network_mode: networks.first().map(|n| (*n).to_owned()),
        ..Default::default()
    };
    let networks = networks
        .iter()
        .map(|n| ((*n).to_owned(), NetworkAttachment::default()))
        .collect();
    ContainerDescriptor::new(id, name, spec, host, networks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ContainerDescriptor {
        ContainerDescriptor::new(
            "abc123def456",
            "/web",
            ContainerSpec {
                image: "nginx:latest".to_owned(),
                ..Default::default()
            },
            HostSettings::default(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn new_trims_leading_slash_from_name() {
        assert_eq!(descriptor().name, "web");
    }

    #[test]
    fn policy_defaults_to_no_policy() {
        assert_eq!(descriptor().policy, NetworkPolicy::NoPolicy);
    }

    #[test]
    fn policy_requires_exact_true() {
        let mut labels = BTreeMap::new();
        labels.insert(SECURITY_LABEL.to_owned(), "TRUE".to_owned());
        assert_eq!(NetworkPolicy::from_labels(&labels), NetworkPolicy::NoPolicy);

        labels.insert(SECURITY_LABEL.to_owned(), "true".to_owned());
        assert_eq!(
            NetworkPolicy::from_labels(&labels),
            NetworkPolicy::ForceIsolated
        );
    }

    #[test]
    fn add_labels_then_has_and_get() {
        let mut c = descriptor();
        c.add_labels([("app", "frontend")]);
        assert!(c.has_label("app"));
        assert_eq!(c.get_label("app"), Some("frontend"));
        assert!(!c.is_label("app"));
    }

    #[test]
    fn remove_labels_then_has_label_is_false() {
        let mut c = descriptor();
        c.add_labels([("app", "frontend"), ("tier", "web")]);
        c.remove_labels(["app", "missing"]);
        assert!(!c.has_label("app"));
        assert!(c.has_label("tier"));
    }

    #[test]
    fn empty_label_value_is_not_has_label() {
        let mut c = descriptor();
        c.add_labels([("flag", "")]);
        assert!(!c.has_label("flag"));
        assert_eq!(c.get_label("flag"), Some(""));
    }

    #[test]
    fn label_mutators_keep_policy_in_sync() {
        let mut c = descriptor();
        c.add_labels([(SECURITY_LABEL, "true")]);
        assert!(c.is_label(SECURITY_LABEL));
        assert_eq!(c.policy, NetworkPolicy::ForceIsolated);

        c.remove_labels([SECURITY_LABEL]);
        assert_eq!(c.policy, NetworkPolicy::NoPolicy);
    }

    #[test]
    fn parse_port_key_variants() {
        assert_eq!(parse_port_key("80/tcp"), Some((80, PortProtocol::Tcp)));
        assert_eq!(parse_port_key("53/udp"), Some((53, PortProtocol::Udp)));
        assert_eq!(parse_port_key("8080"), Some((8080, PortProtocol::Tcp)));
        assert_eq!(parse_port_key("http/tcp"), None);
        assert_eq!(parse_port_key("80/quic"), None);
    }

    #[test]
    fn port_binding_key() {
        let binding = PortBinding::new(8080, PortProtocol::Tcp, 80);
        assert_eq!(binding.port_key(), "80/tcp");
    }
}
