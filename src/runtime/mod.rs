//! Container runtime boundary.
//!
//! The orchestration core drives the container engine through the
//! [`ContainerRuntime`] trait: the exact set of operations it needs and
//! nothing more. `DockerRuntime` implements it over bollard; `StubRuntime`
//! is an in-memory fake for tests. Nothing outside `runtime::docker` imports
//! bollard types.

pub mod docker;
pub mod error;
pub mod testing;

pub use docker::{DockerRuntime, connect_docker};
pub use error::{Result, RuntimeError};
pub use testing::StubRuntime;

use async_trait::async_trait;

/// Resolved launch parameters for one container.
///
/// All config-level indirection (scale expansion, relative volume paths) is
/// resolved before a spec reaches the runtime.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Container name, unique per runtime.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Ports exposed inside the network only (no host binding).
    pub exposed_ports: Vec<u16>,
    /// Host-published ports as `(host_port, container_port)`.
    pub published_ports: Vec<(u16, u16)>,
    /// Environment variables.
    pub env: Vec<(String, String)>,
    /// Bind mounts as `(host_path, container_path, read_only)`.
    pub binds: Vec<(String, String, bool)>,
    /// Network to attach at creation, if any.
    pub network: Option<String>,
}

/// Runtime-observed container state, collapsed to what the core acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created or restarting, not yet serving.
    Starting,
    /// Up and running.
    Running,
    /// Exited, paused, or being removed.
    Stopped,
    /// Dead per the runtime.
    Failed,
}

impl ContainerStatus {
    /// True when the container is serving.
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

/// One running container as reported by the runtime.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Container name (without the runtime's leading slash).
    pub name: String,
    /// Truncated container id for display.
    pub short_id: String,
    /// Human-readable status string from the runtime.
    pub status: String,
    /// Published port mappings.
    pub ports: Vec<PortMapping>,
}

/// A container port and its host binding, if published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Host port, `None` when the port is exposed but not published.
    pub host_port: Option<u16>,
}

/// Handle to the shared network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    /// Network name.
    pub name: String,
}

/// Operations the orchestration core requires from the container engine.
///
/// All operations are synchronous from the caller's perspective (one await,
/// one result) and return typed errors: [`RuntimeError::NotFound`] for
/// absent resources, [`RuntimeError::Conflict`] for already-exists races,
/// [`RuntimeError::Api`] for everything else.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull or refresh an image.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create and start a container, returning its id.
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Stop a container by name.
    async fn stop_container(&self, name: &str) -> Result<()>;

    /// Remove a stopped container by name.
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Look up a container's current status by name.
    async fn container_status(&self, name: &str) -> Result<ContainerStatus>;

    /// List running containers.
    async fn list_running(&self) -> Result<Vec<ContainerInfo>>;

    /// Get or create a named bridge network.
    ///
    /// Idempotent and race-safe: a concurrent create by another process is
    /// treated as success.
    async fn ensure_network(&self, name: &str) -> Result<NetworkHandle>;

    /// Connect a container to a network.
    ///
    /// Returns [`RuntimeError::Conflict`] when the container is already
    /// attached; callers decide whether that counts as success.
    async fn connect_network(&self, network: &str, container: &str) -> Result<()>;
}
