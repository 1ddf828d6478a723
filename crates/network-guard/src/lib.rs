//! netward network guard: container recreation and network isolation policy.
//!
//! Containers carrying the `netward.force-network-secured=true` label are moved
//! off the public network onto an isolated one and lose their public port
//! bindings. Changes that Docker cannot apply live are made by recreating the
//! container under its original name.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`GuardError`, `MutationError`)
//! - [`config`]: Guard configuration (`GuardConfig`, builder)
//! - [`descriptor`]: Container descriptors, labels and `NetworkPolicy`
//! - [`docker`]: Docker API abstraction (`DockerClient` trait, `BollardDockerClient`)
//! - [`connection`]: Cached daemon connection (`ConnectionManager`, `DockerConnector`)
//! - [`topology`]: Network attachment and port queries (`NetworkTopology`)
//! - [`mutator`]: Stop/remove/create/start with rollback (`ContainerMutator`, `MutationLock`)
//! - [`bootstrap`]: Label-driven policy enforcement (`NetworkPolicyBootstrapper`)
//! - [`guard`]: Wiring of the above (`NetworkGuard`, `NetworkGuardBuilder`)
//!
//! # Architecture
//!
//! ```text
//! NetworkPolicyBootstrapper
//!        |            \
//!        |        ContainerMutator (MutationLock)
//!        |            /
//!   NetworkTopology
//!        |
//!   ConnectionManager --> DockerClient --> Docker daemon
//! ```

pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod descriptor;
pub mod docker;
pub mod error;
pub mod guard;
pub mod mutator;
pub mod topology;

// --- Public API Re-exports ---

// Wiring
pub use guard::{NetworkGuard, NetworkGuardBuilder};

// Configuration
pub use config::{GuardConfig, GuardConfigBuilder};

// Error
pub use error::{GuardError, MutationError, MutationStep};

// Descriptors
pub use descriptor::{
    ContainerDescriptor, ContainerSpec, ContainerSummary, HostSettings, NetworkAttachment,
    NetworkPolicy, PortBinding, PortProtocol, SECURITY_LABEL,
};

// Docker API
pub use connection::{BollardConnector, ConnectionManager, DockerConnector};
pub use docker::{BollardDockerClient, DockerClient};

// Operations
pub use bootstrap::{BootstrapReport, NetworkPolicyBootstrapper, Remediation};
pub use mutator::{ContainerMutator, MutationLock, MutationPermit};
pub use topology::{NetworkTopology, ReattachReport};
