//! Top-level orchestration.
//!
//! The [`Orchestrator`] is an explicit per-invocation context: the loaded
//! configuration, a runtime handle, a config store, and a readiness gate.
//! It is constructed fresh for every CLI invocation; the container runtime
//! itself is the only source of truth for what exists between invocations.
//!
//! Sequencing:
//! - `up`: ensure shared network → launch every service (scale expansion)
//!   → create load balancers in declared order, each gated on its backends.
//! - `down`: remove every load balancer first, then stop services — a live
//!   proxy never outlives all its backends mid-teardown.
//! - Targeting a single service skips load balancers entirely, on both `up`
//!   and `down`.

pub mod launcher;
pub mod readiness;

pub use launcher::{InstanceLauncher, LaunchOutcome, LaunchResult, StopOutcome, StopResult};
pub use readiness::ReadinessGate;

use std::sync::Arc;

use thiserror::Error;

use crate::config::ConvoyConfig;
use crate::inventory::{Inventory, collect_inventory};
use crate::lb::{ConfigStore, LbCreateReport, LbRemoveReport, LbState, LoadBalancerManager};
use crate::runtime::{ContainerRuntime, RuntimeError};

/// Name of the shared private network all orchestrated containers join.
pub const SHARED_NETWORK: &str = "convoy_network";

/// Errors that abort an orchestrator operation outright.
///
/// Per-item failures never surface here; they live in the batch reports.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A `--service` target is not declared in the configuration.
    #[error("Unknown service '{service}'")]
    UnknownService {
        /// The undeclared name.
        service: String,
    },

    /// The runtime failed an operation nothing can proceed without.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Launch results for one service.
#[derive(Debug, Clone)]
pub struct ServiceLaunchReport {
    /// Service name.
    pub service: String,
    /// Per-instance results.
    pub results: Vec<LaunchResult>,
}

/// Stop results for one service.
#[derive(Debug, Clone)]
pub struct ServiceStopReport {
    /// Service name.
    pub service: String,
    /// Per-instance results.
    pub results: Vec<StopResult>,
}

/// Everything that happened during an `up`.
#[derive(Debug, Clone, Default)]
pub struct UpReport {
    /// Per-service launch batches, in declared order.
    pub services: Vec<ServiceLaunchReport>,
    /// Per-load-balancer outcomes, in declared order.
    pub load_balancers: Vec<LbCreateReport>,
}

impl UpReport {
    /// True when every instance started and every load balancer is active.
    pub fn all_succeeded(&self) -> bool {
        self.services
            .iter()
            .all(|s| s.results.iter().all(LaunchResult::succeeded))
            && self
                .load_balancers
                .iter()
                .all(|lb| lb.state == LbState::Active)
    }
}

/// Everything that happened during a `down`.
#[derive(Debug, Clone, Default)]
pub struct DownReport {
    /// Load balancer removals, processed before any service stop.
    pub load_balancers: Vec<LbRemoveReport>,
    /// Per-service stop batches.
    pub services: Vec<ServiceStopReport>,
}

impl DownReport {
    /// True when nothing errored. Absent containers count as success.
    pub fn all_succeeded(&self) -> bool {
        self.load_balancers.iter().all(|lb| lb.outcome.succeeded())
            && self
                .services
                .iter()
                .all(|s| s.results.iter().all(StopResult::succeeded))
    }
}

/// Per-invocation orchestration context.
pub struct Orchestrator {
    config: ConvoyConfig,
    runtime: Arc<dyn ContainerRuntime>,
    store: ConfigStore,
    gate: ReadinessGate,
}

impl Orchestrator {
    /// Build a context from a loaded configuration and a runtime handle.
    pub fn new(config: ConvoyConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config,
            runtime,
            store: ConfigStore::new(ConfigStore::default_dir()),
            gate: ReadinessGate::default(),
        }
    }

    /// Override the config store location (tests, `--config-dir`).
    pub fn with_store(mut self, store: ConfigStore) -> Self {
        self.store = store;
        self
    }

    /// Override the readiness gate bounds.
    pub fn with_gate(mut self, gate: ReadinessGate) -> Self {
        self.gate = gate;
        self
    }

    /// The loaded configuration.
    pub fn config(&self) -> &ConvoyConfig {
        &self.config
    }

    fn lb_manager(&self) -> LoadBalancerManager {
        LoadBalancerManager::new(
            self.runtime.clone(),
            self.store.clone(),
            self.gate,
            SHARED_NETWORK,
        )
    }

    /// Start services and provision load balancers.
    ///
    /// With a `target` service only that service's instances are launched
    /// and load balancers are skipped entirely.
    pub async fn up(
        &self,
        target: Option<&str>,
        refresh_images: bool,
    ) -> Result<UpReport, OrchestratorError> {
        if let Some(service) = target
            && !self.config.services.contains_key(service)
        {
            return Err(OrchestratorError::UnknownService {
                service: service.to_string(),
            });
        }

        self.runtime.ensure_network(SHARED_NETWORK).await?;

        let launcher = InstanceLauncher::new(self.runtime.clone(), SHARED_NETWORK);
        let mut report = UpReport::default();

        for (name, spec) in &self.config.services {
            if let Some(only) = target
                && only != name
            {
                continue;
            }
            let results = launcher.start_service(name, spec, refresh_images).await;
            report.services.push(ServiceLaunchReport {
                service: name.clone(),
                results,
            });
        }

        if target.is_none() && !self.config.load_balancers.is_empty() {
            let manager = self.lb_manager();
            for (name, lb) in &self.config.load_balancers {
                let lb_report = manager.create(name, lb, &self.config.services).await;
                report.load_balancers.push(lb_report);
            }
        }

        Ok(report)
    }

    /// Stop services, removing load balancers first.
    ///
    /// With a `target` service only that service's instances are stopped and
    /// load balancers are left untouched, mirroring `up`.
    pub async fn down(&self, target: Option<&str>) -> Result<DownReport, OrchestratorError> {
        if let Some(service) = target
            && !self.config.services.contains_key(service)
        {
            return Err(OrchestratorError::UnknownService {
                service: service.to_string(),
            });
        }

        let mut report = DownReport::default();

        if target.is_none() && !self.config.load_balancers.is_empty() {
            let manager = self.lb_manager();
            for name in self.config.load_balancers.keys() {
                report.load_balancers.push(manager.remove(name).await);
            }
        }

        let launcher = InstanceLauncher::new(self.runtime.clone(), SHARED_NETWORK);
        for (name, spec) in &self.config.services {
            if let Some(only) = target
                && only != name
            {
                continue;
            }
            let results = launcher.stop_service(name, spec).await;
            report.services.push(ServiceStopReport {
                service: name.clone(),
                results,
            });
        }

        Ok(report)
    }

    /// Inventory of running containers grouped into services and load
    /// balancers.
    pub async fn ps(&self) -> Result<Inventory, OrchestratorError> {
        Ok(collect_inventory(self.runtime.as_ref(), &self.config).await?)
    }
}
