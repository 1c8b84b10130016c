//! Load balancer lifecycle.
//!
//! Each load balancer moves through an explicit state machine:
//!
//! ```text
//! Pending ──▶ WaitingForBackends ──▶ Provisioning ──▶ Active
//!                    │                    │
//!                    └──────▶ Failed ◀────┘
//!
//! Active ──▶ Removing ──▶ Removed
//! ```
//!
//! `create` gates on backend readiness, attaches backends to the shared
//! network, renders and persists the nginx config, and launches the proxy
//! container. `remove` tears the proxy down and deletes the artifact, in
//! that order, tolerating an absent container. A failure confines itself to
//! its own load balancer; the caller keeps processing the rest.

pub mod nginx;
pub mod upstream;

pub use nginx::{ConfigStore, ConfigStoreError, render};
pub use upstream::{BACKEND_PORT, UpstreamServer, build_upstreams};

use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::{LoadBalancerSpec, ServiceSpec};
use crate::orchestrator::readiness::ReadinessGate;
use crate::runtime::{ContainerRuntime, ContainerSpec, RuntimeError};

/// Image used for every proxy container.
pub const PROXY_IMAGE: &str = "nginx:latest";

/// Lifecycle state of one load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbState {
    /// Not yet processed.
    Pending,
    /// Gating on backend readiness.
    WaitingForBackends,
    /// Rendering config and launching the proxy.
    Provisioning,
    /// Proxy running.
    Active,
    /// Unrecoverable error during create; skipped, others proceed.
    Failed,
    /// Teardown in progress.
    Removing,
    /// Proxy gone and artifact deleted.
    Removed,
}

/// Outcome of creating one load balancer.
#[derive(Debug, Clone)]
pub struct LbCreateReport {
    /// Load balancer name.
    pub name: String,
    /// Terminal state: `Active` or `Failed`.
    pub state: LbState,
    /// Per-backend readiness results from the gate.
    pub backends: Vec<(String, bool)>,
    /// Failure reason when `Failed`.
    pub detail: Option<String>,
}

/// Outcome of removing one load balancer.
#[derive(Debug, Clone)]
pub struct LbRemoveReport {
    /// Load balancer name.
    pub name: String,
    /// What happened.
    pub outcome: RemoveOutcome,
}

/// Per-item removal outcome.
#[derive(Debug, Clone)]
pub enum RemoveOutcome {
    /// Teardown completed. `container_found` is false when the proxy was
    /// already gone; the artifact is cleaned up either way.
    Removed {
        /// Whether a proxy container existed.
        container_found: bool,
        /// Whether an artifact was deleted.
        artifact_deleted: bool,
    },
    /// The runtime or config store errored mid-teardown.
    Failed {
        /// Failure reason.
        reason: String,
    },
}

impl RemoveOutcome {
    /// True unless the removal failed.
    pub fn succeeded(&self) -> bool {
        matches!(self, RemoveOutcome::Removed { .. })
    }
}

/// Orchestrates proxy containers and their config artifacts.
pub struct LoadBalancerManager {
    runtime: Arc<dyn ContainerRuntime>,
    store: ConfigStore,
    gate: ReadinessGate,
    network: String,
}

impl LoadBalancerManager {
    /// Create a manager bound to a runtime, config store, and shared network.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: ConfigStore,
        gate: ReadinessGate,
        network: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            store,
            gate,
            network: network.into(),
        }
    }

    /// Create and start one load balancer.
    ///
    /// Backend readiness failures are non-fatal: the proxy is provisioned
    /// with whatever backends exist, on the theory that a proxy with a
    /// temporarily unreachable backend beats no proxy at all.
    pub async fn create(
        &self,
        name: &str,
        lb: &LoadBalancerSpec,
        services: &IndexMap<String, ServiceSpec>,
    ) -> LbCreateReport {
        tracing::info!("Creating load balancer: {}", name);
        tracing::debug!(
            "Load balancer '{}': {:?} -> {:?}",
            name,
            LbState::Pending,
            LbState::WaitingForBackends
        );

        // Gate every instance of every target service.
        let mut backends = Vec::new();
        for target in &lb.services {
            let Some(service) = services.get(&target.name) else {
                // Validation rejects this at load time; belt and braces.
                continue;
            };
            let results = self
                .gate
                .await_service(self.runtime.as_ref(), &target.name, service.scale)
                .await;
            backends.extend(results);
        }
        for (instance, ready) in &backends {
            if !ready {
                tracing::warn!(
                    "Backend '{}' for load balancer '{}' not confirmed running",
                    instance,
                    name
                );
            }
        }

        tracing::debug!(
            "Load balancer '{}': {:?} -> {:?}",
            name,
            LbState::WaitingForBackends,
            LbState::Provisioning
        );
        match self.provision(name, lb, services).await {
            Ok(id) => {
                tracing::info!("Started load balancer {} ({})", name, &id[..id.len().min(12)]);
                LbCreateReport {
                    name: name.to_string(),
                    state: LbState::Active,
                    backends,
                    detail: None,
                }
            }
            Err(reason) => {
                tracing::error!("Error starting load balancer {}: {}", name, reason);
                // The artifact exists only while the load balancer is active;
                // drop anything rendered before the failure.
                let _ = self.store.delete(name);
                LbCreateReport {
                    name: name.to_string(),
                    state: LbState::Failed,
                    backends,
                    detail: Some(reason),
                }
            }
        }
    }

    async fn provision(
        &self,
        name: &str,
        lb: &LoadBalancerSpec,
        services: &IndexMap<String, ServiceSpec>,
    ) -> Result<String, String> {
        let network = self
            .runtime
            .ensure_network(&self.network)
            .await
            .map_err(|e| e.to_string())?;

        // Attach every target instance; tolerate already-attached and absent
        // containers (the latter was reported by the readiness gate).
        if let Some(target) = lb.primary_target()
            && let Some(service) = services.get(&target.name)
        {
            for instance in crate::naming::instance_ids(&target.name, service.scale) {
                match self
                    .runtime
                    .connect_network(&network.name, &instance)
                    .await
                {
                    Ok(()) => {}
                    Err(RuntimeError::Conflict { .. }) => {}
                    Err(RuntimeError::NotFound { .. }) => {
                        tracing::warn!("Service container {} not found", instance);
                    }
                    Err(e) => return Err(e.to_string()),
                }
            }
        }

        let upstreams = build_upstreams(lb, services);
        let config_text = render(name, lb.algorithm, &upstreams);
        let config_path = self
            .store
            .persist(name, &config_text)
            .map_err(|e| e.to_string())?;

        let spec = ContainerSpec {
            name: name.to_string(),
            image: PROXY_IMAGE.to_string(),
            exposed_ports: Vec::new(),
            published_ports: vec![(lb.port, 80)],
            env: Vec::new(),
            binds: vec![(
                config_path.display().to_string(),
                "/etc/nginx/nginx.conf".to_string(),
                true,
            )],
            network: Some(network.name),
        };

        self.runtime
            .run_container(&spec)
            .await
            .map_err(|e| e.to_string())
    }

    /// Stop and remove one load balancer and its config artifact.
    pub async fn remove(&self, name: &str) -> LbRemoveReport {
        tracing::info!("Removing load balancer: {}", name);
        tracing::debug!("Load balancer '{}': {:?}", name, LbState::Removing);

        let container_found = match self.runtime.stop_container(name).await {
            Ok(()) => match self.runtime.remove_container(name).await {
                Ok(()) => true,
                Err(e) => {
                    return self.remove_failed(name, e.to_string());
                }
            },
            Err(RuntimeError::NotFound { .. }) => {
                tracing::info!("Load balancer {} not found", name);
                false
            }
            Err(e) => {
                return self.remove_failed(name, e.to_string());
            }
        };

        match self.store.delete(name) {
            Ok(artifact_deleted) => LbRemoveReport {
                name: name.to_string(),
                outcome: RemoveOutcome::Removed {
                    container_found,
                    artifact_deleted,
                },
            },
            Err(e) => self.remove_failed(name, e.to_string()),
        }
    }

    fn remove_failed(&self, name: &str, reason: String) -> LbRemoveReport {
        tracing::error!("Error removing load balancer {}: {}", name, reason);
        // Cleanup of the artifact is still attempted; a stale config file
        // must not survive a partially failed teardown if avoidable.
        let _ = self.store.delete(name);
        LbRemoveReport {
            name: name.to_string(),
            outcome: RemoveOutcome::Failed { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Algorithm, LbTarget};
    use crate::runtime::StubRuntime;
    use std::time::Duration;

    fn lb_spec(port: u16) -> LoadBalancerSpec {
        LoadBalancerSpec {
            services: vec![LbTarget {
                name: "web".to_string(),
                weight: 1,
            }],
            algorithm: Algorithm::LeastConn,
            port,
            health_check: None,
        }
    }

    fn web_services(scale: u32) -> IndexMap<String, ServiceSpec> {
        let mut services = IndexMap::new();
        services.insert(
            "web".to_string(),
            ServiceSpec {
                image: "myapp:latest".to_string(),
                scale,
                expose: vec![80],
                environment: IndexMap::new(),
                volumes: Vec::new(),
            },
        );
        services
    }

    fn manager(runtime: Arc<StubRuntime>, store: ConfigStore) -> LoadBalancerManager {
        LoadBalancerManager::new(
            runtime,
            store,
            ReadinessGate::new(2, Duration::from_millis(1)),
            "convoy_network",
        )
    }

    async fn launch_backends(runtime: &StubRuntime, scale: u32) {
        runtime.ensure_network("convoy_network").await.unwrap();
        for instance in crate::naming::instance_ids("web", scale) {
            runtime
                .run_container(&ContainerSpec {
                    name: instance,
                    image: "myapp:latest".to_string(),
                    network: Some("convoy_network".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn create_provisions_proxy_and_artifact() {
        let runtime = Arc::new(StubRuntime::new());
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        launch_backends(&runtime, 3).await;

        let report = manager(runtime.clone(), store.clone())
            .create("lb1", &lb_spec(8080), &web_services(3))
            .await;

        assert_eq!(report.state, LbState::Active);
        assert!(report.backends.iter().all(|(_, ready)| *ready));
        assert!(store.exists("lb1"));

        let text = std::fs::read_to_string(store.artifact_path("lb1")).unwrap();
        assert!(text.contains("server web_1:80 weight=1;"));
        assert!(text.contains("server web_3:80 weight=1;"));
        assert!(text.contains("least_conn;"));

        let proxy = runtime.spec_of("lb1").unwrap();
        assert_eq!(proxy.image, PROXY_IMAGE);
        assert_eq!(proxy.published_ports, vec![(8080, 80)]);
        assert!(proxy.binds[0].2, "config mount must be read-only");
    }

    #[tokio::test]
    async fn create_tolerates_unready_backend() {
        let runtime = Arc::new(StubRuntime::new());
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        // Only two of three backends exist.
        launch_backends(&runtime, 2).await;

        let report = manager(runtime.clone(), store.clone())
            .create("lb1", &lb_spec(8080), &web_services(3))
            .await;

        assert_eq!(report.state, LbState::Active);
        let unready: Vec<&str> = report
            .backends
            .iter()
            .filter(|(_, ready)| !ready)
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(unready, vec!["web_3"]);
        // The config still lists all expected backends.
        let text = std::fs::read_to_string(store.artifact_path("lb1")).unwrap();
        assert!(text.contains("web_3:80"));
    }

    #[tokio::test]
    async fn create_failure_is_confined() {
        let runtime = Arc::new(StubRuntime::new());
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        launch_backends(&runtime, 1).await;
        runtime.fail_launch_of("lb1", "port already allocated");

        let report = manager(runtime.clone(), store.clone())
            .create("lb1", &lb_spec(8080), &web_services(1))
            .await;

        assert_eq!(report.state, LbState::Failed);
        assert!(report.detail.unwrap().contains("port already allocated"));
        assert!(!store.exists("lb1"));
    }

    #[tokio::test]
    async fn remove_missing_lb_reports_not_found() {
        let runtime = Arc::new(StubRuntime::new());
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());

        let report = manager(runtime, store).remove("ghost").await;
        match report.outcome {
            RemoveOutcome::Removed {
                container_found,
                artifact_deleted,
            } => {
                assert!(!container_found);
                assert!(!artifact_deleted);
            }
            RemoveOutcome::Failed { reason } => panic!("unexpected failure: {reason}"),
        }
    }

    #[tokio::test]
    async fn remove_deletes_container_and_artifact() {
        let runtime = Arc::new(StubRuntime::new());
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        launch_backends(&runtime, 1).await;

        let mgr = manager(runtime.clone(), store.clone());
        let created = mgr.create("lb1", &lb_spec(8080), &web_services(1)).await;
        assert_eq!(created.state, LbState::Active);

        let removed = mgr.remove("lb1").await;
        match removed.outcome {
            RemoveOutcome::Removed {
                container_found,
                artifact_deleted,
            } => {
                assert!(container_found);
                assert!(artifact_deleted);
            }
            RemoveOutcome::Failed { reason } => panic!("unexpected failure: {reason}"),
        }
        assert!(!store.exists("lb1"));
        assert!(!runtime.container_names().contains(&"lb1".to_string()));
    }

    #[tokio::test]
    async fn backends_are_attached_to_shared_network() {
        let runtime = Arc::new(StubRuntime::new());
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        launch_backends(&runtime, 2).await;

        let report = manager(runtime.clone(), store)
            .create("lb1", &lb_spec(8080), &web_services(2))
            .await;
        assert_eq!(report.state, LbState::Active);

        // Backends were attached at launch; re-attachment during create is
        // tolerated as a conflict, and the proxy itself joins the network.
        assert_eq!(runtime.attachments_of("web_1"), vec!["convoy_network"]);
        assert_eq!(runtime.attachments_of("lb1"), vec!["convoy_network"]);
    }
}
