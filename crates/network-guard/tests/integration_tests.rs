//! 통합 테스트 -- 공개 API만으로 부트스트랩/재생성 시나리오 검증
//!
//! 인메모리 Docker 데몬을 커넥터로 주입하고, 라벨 해석 → 네트워크 이동 →
//! 포트 제거 → 재생성 → 롤백 흐름을 호출 기록으로 확인합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use netward_network_guard::topology::{is_attached_to, list_exposed_ports};
use netward_network_guard::{
    ContainerDescriptor, ContainerSpec, GuardConfig, GuardError, HostSettings, NetworkAttachment,
    NetworkGuard, NetworkGuardBuilder, NetworkPolicy, PortBinding, PortProtocol, SECURITY_LABEL,
};

mod fake {
    use super::*;
    use netward_network_guard::{ContainerSummary, DockerClient, DockerConnector, MutationStep};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct State {
        containers: Vec<ContainerDescriptor>,
        networks: BTreeSet<String>,
        log: Vec<(String, String)>,
        create_failures: usize,
        next_id: u64,
    }

    /// 호출을 `(작업, 컨테이너 이름)`으로 기록하는 인메모리 데몬
    #[derive(Clone, Default)]
    pub struct FakeDaemon {
        state: Arc<Mutex<State>>,
    }

    impl FakeDaemon {
        /// `bridge` 네트워크만 있는 데몬
        pub fn new() -> Self {
            let state = State {
                networks: BTreeSet::from(["bridge".to_owned()]),
                ..Default::default()
            };
            Self {
                state: Arc::new(Mutex::new(state)),
            }
        }

        pub async fn add(&self, container: ContainerDescriptor) {
            let mut state = self.state.lock().await;
            state.networks.extend(container.networks.keys().cloned());
            state.containers.push(container);
        }

        pub async fn has_network(&self, name: &str) -> bool {
            self.state.lock().await.networks.contains(name)
        }

        pub async fn fail_creates(&self, times: usize) {
            self.state.lock().await.create_failures = times;
        }

        pub async fn by_name(&self, name: &str) -> Option<ContainerDescriptor> {
            self.state
                .lock()
                .await
                .containers
                .iter()
                .find(|c| c.name == name)
                .cloned()
        }

        pub async fn inspect_by_id(&self, id: &str) -> ContainerDescriptor {
            self.state
                .lock()
                .await
                .containers
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .expect("container should exist")
        }

        pub async fn log(&self) -> Vec<(String, String)> {
            self.state.lock().await.log.clone()
        }

        /// stop/remove/create/start 기록만 반환합니다.
        pub async fn lifecycle(&self) -> Vec<(String, String)> {
            self.log()
                .await
                .into_iter()
                .filter(|(op, _)| matches!(op.as_str(), "stop" | "remove" | "create" | "start"))
                .collect()
        }

        async fn record(&self, op: &str, id_or_name: &str) {
            let mut state = self.state.lock().await;
            let name = state
                .containers
                .iter()
                .find(|c| c.id == id_or_name || c.name == id_or_name)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| id_or_name.to_owned());
            state.log.push((op.to_owned(), name));
        }

        fn step_error(step: MutationStep, container: &str, reason: &str) -> GuardError {
            GuardError::MutationStep {
                step,
                container: container.to_owned(),
                reason: reason.to_owned(),
            }
        }
    }

    impl DockerClient for FakeDaemon {
        async fn list_containers(&self) -> Result<Vec<ContainerSummary>, GuardError> {
            Ok(self
                .state
                .lock()
                .await
                .containers
                .iter()
                .map(|c| ContainerSummary {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    image: c.spec.image.clone(),
                    state: "running".to_owned(),
                })
                .collect())
        }

        async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor, GuardError> {
            tokio::task::yield_now().await;
            self.state
                .lock()
                .await
                .containers
                .iter()
                .find(|c| c.id == id || c.name == id)
                .cloned()
                .ok_or_else(|| GuardError::ContainerNotFound(id.to_owned()))
        }

        async fn stop_container(&self, id: &str, _grace_secs: u32) -> Result<(), GuardError> {
            self.record("stop", id).await;
            tokio::task::yield_now().await;
            Ok(())
        }

        async fn remove_container(&self, id: &str) -> Result<(), GuardError> {
            self.record("remove", id).await;
            tokio::task::yield_now().await;
            let mut state = self.state.lock().await;
            let before = state.containers.len();
            state.containers.retain(|c| c.id != id);
            if state.containers.len() == before {
                return Err(Self::step_error(MutationStep::Remove, id, "no such container"));
            }
            Ok(())
        }

        async fn create_container(
            &self,
            name: &str,
            descriptor: &ContainerDescriptor,
        ) -> Result<String, GuardError> {
            self.record("create", name).await;
            tokio::task::yield_now().await;
            let mut state = self.state.lock().await;
            if state.create_failures > 0 {
                state.create_failures -= 1;
                return Err(Self::step_error(MutationStep::Create, name, "image not found"));
            }
            let mut networks = BTreeMap::new();
            if let Some(mode) = &descriptor.host.network_mode {
                let endpointless = matches!(mode.as_str(), "host" | "none")
                    || mode.starts_with("container:");
                if !endpointless && !state.networks.contains(mode) {
                    return Err(Self::step_error(
                        MutationStep::Create,
                        name,
                        "network not found",
                    ));
                }
                networks.insert(mode.clone(), NetworkAttachment::default());
            }
            state.next_id += 1;
            let id = format!("new{:04}", state.next_id);
            state.containers.push(ContainerDescriptor::new(
                id.clone(),
                name,
                descriptor.spec.clone(),
                descriptor.host.clone(),
                networks,
            ));
            Ok(id)
        }

        async fn start_container(&self, id: &str) -> Result<(), GuardError> {
            self.record("start", id).await;
            tokio::task::yield_now().await;
            Ok(())
        }

        async fn connect_network(&self, network: &str, container_id: &str) -> Result<(), GuardError> {
            self.record("connect", container_id).await;
            let mut state = self.state.lock().await;
            if !state.networks.contains(network) {
                return Err(GuardError::NetworkOperation {
                    network: network.to_owned(),
                    container: container_id.to_owned(),
                    reason: "network not found".to_owned(),
                });
            }
            let container = state
                .containers
                .iter_mut()
                .find(|c| c.id == container_id)
                .ok_or_else(|| GuardError::ContainerNotFound(container_id.to_owned()))?;
            container
                .networks
                .insert(network.to_owned(), NetworkAttachment::default());
            Ok(())
        }

        async fn disconnect_network(
            &self,
            network: &str,
            container_id: &str,
            _force: bool,
        ) -> Result<(), GuardError> {
            self.record("disconnect", container_id).await;
            let mut state = self.state.lock().await;
            if let Some(container) = state.containers.iter_mut().find(|c| c.id == container_id) {
                container.networks.remove(network);
            }
            Ok(())
        }

        async fn ensure_network(&self, name: &str) -> Result<(), GuardError> {
            self.record("ensure_network", name).await;
            self.state.lock().await.networks.insert(name.to_owned());
            Ok(())
        }

        async fn ping(&self) -> Result<String, GuardError> {
            Ok("1.45".to_owned())
        }
    }

    impl DockerConnector for FakeDaemon {
        type Client = FakeDaemon;

        async fn connect(&self) -> Result<Self::Client, GuardError> {
            Ok(self.clone())
        }
    }
}

use fake::FakeDaemon;

fn container(
    id: &str,
    name: &str,
    networks: &[&str],
    labels: &[(&str, &str)],
    ports: Vec<PortBinding>,
) -> ContainerDescriptor {
    let spec = ContainerSpec {
        image: "nginx:latest".to_owned(),
        labels: labels
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
        exposed_ports: ports.iter().map(PortBinding::port_key).collect(),
        ..Default::default()
    };
    let host = HostSettings {
        port_bindings: ports,
        network_mode: networks.first().map(|n| (*n).to_owned()),
        ..Default::default()
    };
    let networks = networks
        .iter()
        .map(|n| ((*n).to_owned(), NetworkAttachment::default()))
        .collect();
    ContainerDescriptor::new(id, name, spec, host, networks)
}

fn guard(daemon: &FakeDaemon) -> NetworkGuard<FakeDaemon> {
    let config = netward_network_guard::GuardConfigBuilder::new()
        .destroy_poll_ms(10, 50)
        .destroy_timeout_secs(5)
        .build()
        .unwrap();
    NetworkGuardBuilder::new()
        .config(config)
        .connector(daemon.clone())
        .build()
        .unwrap()
}

#[tokio::test]
async fn unlabeled_container_is_never_touched() {
    let daemon = FakeDaemon::new();
    daemon
        .add(container(
            "aaa",
            "web",
            &["bridge"],
            &[],
            vec![PortBinding::new(8080, PortProtocol::Tcp, 80)],
        ))
        .await;
    let guard = guard(&daemon);

    let errors = guard.bootstrapper().bootstrap_all().await;

    assert!(errors.is_empty());
    assert!(daemon.lifecycle().await.is_empty());
    let web = daemon.by_name("web").await.unwrap();
    assert_eq!(web.policy, NetworkPolicy::NoPolicy);
    assert!(is_attached_to(&web, "bridge"));
}

#[tokio::test]
async fn isolated_container_without_ports_is_never_touched() {
    let daemon = FakeDaemon::new();
    daemon
        .add(container(
            "aaa",
            "db",
            &["netward-secure"],
            &[(SECURITY_LABEL, "true")],
            Vec::new(),
        ))
        .await;
    let guard = guard(&daemon);

    assert_eq!(
        guard.bootstrapper().bootstrap_container("aaa").await.unwrap(),
        None
    );
    assert!(daemon.log().await.is_empty());
}

#[tokio::test]
async fn public_container_moves_to_isolated_network_without_ports() {
    let daemon = FakeDaemon::new();
    daemon
        .add(container(
            "aaa",
            "web",
            &["bridge"],
            &[(SECURITY_LABEL, "true")],
            vec![PortBinding::new(8080, PortProtocol::Tcp, 80)],
        ))
        .await;
    let guard = guard(&daemon);

    let report = guard.bootstrapper().run_pass().await;
    assert_eq!(report.scanned, 1);
    assert_eq!(report.remediated, 1);
    assert_eq!(report.failed(), 0);

    let web = daemon.by_name("web").await.unwrap();
    assert_ne!(web.id, "aaa");
    assert!(is_attached_to(&web, "netward-secure"));
    assert!(!is_attached_to(&web, "bridge"));
    assert!(list_exposed_ports(&web).is_empty());
    assert_eq!(web.spec.hostname.as_deref(), Some("web"));
}

#[tokio::test]
async fn create_failure_restores_original_and_reports_create_error() {
    let daemon = FakeDaemon::new();
    daemon
        .add(container("aaa", "web", &["bridge"], &[], Vec::new()))
        .await;
    daemon.fail_creates(1).await;
    let guard = guard(&daemon);

    let mut new_spec = daemon.by_name("web").await.unwrap();
    new_spec.spec.image = "nginx:missing".to_owned();
    let err = guard
        .mutator()
        .edit_container("aaa", new_spec)
        .await
        .unwrap_err();

    assert!(err.primary.to_string().contains("image not found"));
    assert!(err.rollback.is_none());

    let creates: Vec<_> = daemon
        .lifecycle()
        .await
        .into_iter()
        .filter(|(op, _)| op == "create")
        .collect();
    assert_eq!(creates.len(), 2);

    let restored = daemon.by_name("web").await.unwrap();
    assert_eq!(restored.spec.image, "nginx:latest");
}

#[tokio::test]
async fn failed_rollback_keeps_both_errors() {
    let daemon = FakeDaemon::new();
    daemon
        .add(container("aaa", "web", &["bridge"], &[], Vec::new()))
        .await;
    daemon.fail_creates(2).await;
    let guard = guard(&daemon);

    let spec = daemon.by_name("web").await.unwrap();
    let err = guard.mutator().edit_container("aaa", spec).await.unwrap_err();

    assert!(err.primary.to_string().contains("create failed"));
    assert!(matches!(err.rollback, Some(GuardError::Rollback { .. })));
    assert!(guard.mutator().lock().is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_edits_never_interleave() {
    let daemon = FakeDaemon::new();
    for (id, name) in [("aaa", "alpha"), ("bbb", "beta"), ("ccc", "gamma")] {
        daemon
            .add(container(id, name, &["bridge"], &[], Vec::new()))
            .await;
    }
    let guard = Arc::new(guard(&daemon));

    let mut handles = Vec::new();
    for id in ["aaa", "bbb", "ccc"] {
        let guard = Arc::clone(&guard);
        let daemon = daemon.clone();
        handles.push(tokio::spawn(async move {
            let spec = daemon.inspect_by_id(id).await;
            guard.mutator().edit_container(id, spec).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let lifecycle = daemon.lifecycle().await;
    assert_eq!(lifecycle.len(), 12);
    for sequence in lifecycle.chunks(4) {
        let ops: Vec<_> = sequence.iter().map(|(op, _)| op.as_str()).collect();
        assert_eq!(ops, ["stop", "remove", "create", "start"]);
        assert!(sequence.iter().all(|(_, name)| name == &sequence[0].1));
    }
}

#[tokio::test]
async fn port_bindings_survive_unrelated_recreation() {
    let daemon = FakeDaemon::new();
    daemon
        .add(container(
            "aaa",
            "web",
            &["bridge"],
            &[],
            vec![PortBinding::new(8080, PortProtocol::Tcp, 80)],
        ))
        .await;
    let guard = guard(&daemon);

    let mut spec = daemon.by_name("web").await.unwrap();
    spec.add_labels([("tier", "frontend")]);
    guard.mutator().edit_container("aaa", spec).await.unwrap();

    let web = daemon.by_name("web").await.unwrap();
    assert_eq!(
        list_exposed_ports(&web),
        vec![PortBinding::new(8080, PortProtocol::Tcp, 80)]
    );
    assert_eq!(web.get_label("tier"), Some("frontend"));
    assert!(is_attached_to(&web, "bridge"));
}

#[tokio::test]
async fn labelling_through_recreation_enables_isolation() {
    let daemon = FakeDaemon::new();
    daemon
        .add(container("aaa", "web", &["bridge"], &[], Vec::new()))
        .await;
    let guard = guard(&daemon);

    assert!(!daemon.has_network("netward-secure").await);

    let mut spec = daemon.by_name("web").await.unwrap();
    spec.add_labels([(SECURITY_LABEL, "true")]);
    assert_eq!(spec.policy, NetworkPolicy::ForceIsolated);
    let new_id = guard.mutator().edit_container("aaa", spec).await.unwrap();

    let log = daemon.log().await;
    let ensured = log
        .iter()
        .position(|(op, _)| op == "ensure_network")
        .expect("isolated network should be ensured");
    let stopped = log.iter().position(|(op, _)| op == "stop").unwrap();
    assert!(ensured < stopped);

    let web = daemon.by_name("web").await.unwrap();
    assert_eq!(web.id, new_id);
    assert!(web.is_label(SECURITY_LABEL));
    assert!(is_attached_to(&web, "netward-secure"));
    assert!(!is_attached_to(&web, "bridge"));
}

#[tokio::test]
async fn container_sharing_network_with_self_is_recreated_without_ports() {
    let daemon = FakeDaemon::new();
    daemon
        .add(container("self", "netward", &["backend"], &[], Vec::new()))
        .await;
    daemon
        .add(container(
            "aaa",
            "web",
            &["bridge", "backend"],
            &[(SECURITY_LABEL, "true")],
            vec![PortBinding::new(8080, PortProtocol::Tcp, 80)],
        ))
        .await;
    let config = netward_network_guard::GuardConfigBuilder::new()
        .self_container("netward")
        .destroy_poll_ms(10, 50)
        .build()
        .unwrap();
    let guard = NetworkGuardBuilder::new()
        .config(config)
        .connector(daemon.clone())
        .build()
        .unwrap();

    let report = guard.bootstrapper().run_pass().await;
    assert_eq!(report.failed(), 0, "errors: {:?}", report.errors);
    assert_eq!(report.remediated, 1);

    let web = daemon.by_name("web").await.unwrap();
    assert_ne!(web.id, "aaa");
    assert!(is_attached_to(&web, "netward-secure"));
    assert!(is_attached_to(&web, "backend"));
    assert!(!is_attached_to(&web, "bridge"));
    assert!(list_exposed_ports(&web).is_empty());
}

#[tokio::test]
async fn unknown_container_reports_not_found() {
    let daemon = FakeDaemon::new();
    let guard = guard(&daemon);

    let err = guard
        .bootstrapper()
        .bootstrap_container("missing")
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::ContainerNotFound(_)));
}

#[test]
fn default_guard_config_is_valid() {
    GuardConfig::default().validate().unwrap();
}
