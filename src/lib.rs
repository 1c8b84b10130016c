//! Convoy — declarative container-service orchestration with load balancing.
//!
//! Convoy reads a YAML file declaring logical services (image, replica
//! scale, ports, environment, volumes) and reverse-proxy load balancers,
//! and drives a container runtime to realize that state: a shared private
//! network, one container per replica, and an nginx proxy per load balancer
//! with a rendered config artifact.
//!
//! The crate is organized around a small set of components:
//! - [`config`] — the declarative model, validated at load time
//! - [`naming`] — deterministic replica naming
//! - [`runtime`] — the typed boundary to the container engine
//! - [`orchestrator`] — service launch/stop sequencing and readiness gating
//! - [`lb`] — load balancer lifecycle, upstream sets, nginx rendering
//! - [`inventory`] — running-container reporting
//! - [`cli`] — the command surface

pub mod cli;
pub mod config;
pub mod inventory;
pub mod lb;
pub mod naming;
pub mod orchestrator;
pub mod runtime;

pub use config::{Algorithm, ConfigError, ConvoyConfig, LoadBalancerSpec, ServiceSpec};
pub use inventory::Inventory;
pub use lb::{ConfigStore, LbState, LoadBalancerManager};
pub use orchestrator::{Orchestrator, OrchestratorError, ReadinessGate, SHARED_NETWORK};
pub use runtime::{ContainerRuntime, DockerRuntime, RuntimeError, StubRuntime};
