//! Per-service instance launch and stop.
//!
//! Instances are independent: one replica failing to start or stop is
//! recorded in the batch report and never aborts the rest. 'up' is
//! best-effort partial success by design.

use std::sync::Arc;

use crate::config::ServiceSpec;
use crate::naming::{instance_id, instance_ids};
use crate::runtime::{ContainerRuntime, ContainerSpec, RuntimeError};

/// What happened to one instance during launch.
#[derive(Debug, Clone)]
pub enum LaunchOutcome {
    /// Created and started.
    Started {
        /// Runtime container id.
        id: String,
    },
    /// The runtime rejected the launch.
    Failed {
        /// Failure reason.
        reason: String,
    },
}

/// Per-instance launch result.
#[derive(Debug, Clone)]
pub struct LaunchResult {
    /// Instance (container) name.
    pub instance: String,
    /// Outcome.
    pub outcome: LaunchOutcome,
}

impl LaunchResult {
    /// True when the instance started.
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, LaunchOutcome::Started { .. })
    }
}

/// What happened to one instance during stop.
#[derive(Debug, Clone)]
pub enum StopOutcome {
    /// Stopped and removed.
    Stopped,
    /// No such container; non-fatal for teardown.
    NotFound,
    /// The runtime rejected the stop or remove.
    Failed {
        /// Failure reason.
        reason: String,
    },
}

/// Per-instance stop result.
#[derive(Debug, Clone)]
pub struct StopResult {
    /// Instance (container) name.
    pub instance: String,
    /// Outcome.
    pub outcome: StopOutcome,
}

impl StopResult {
    /// True unless the runtime errored. Absence counts as success: stopping
    /// an already-gone instance is an idempotent teardown.
    pub fn succeeded(&self) -> bool {
        !matches!(self.outcome, StopOutcome::Failed { .. })
    }
}

/// Starts and stops the replica instances of one service at a time.
pub struct InstanceLauncher {
    runtime: Arc<dyn ContainerRuntime>,
    network: String,
}

impl InstanceLauncher {
    /// Launcher attaching instances to the given shared network.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, network: impl Into<String>) -> Self {
        Self {
            runtime,
            network: network.into(),
        }
    }

    /// Start every replica of a service.
    ///
    /// With `refresh_image` the image is pulled once, before any instance
    /// starts. A pull failure is logged and launching proceeds — a locally
    /// cached image may still work.
    pub async fn start_service(
        &self,
        name: &str,
        spec: &ServiceSpec,
        refresh_image: bool,
    ) -> Vec<LaunchResult> {
        if refresh_image {
            tracing::info!("Pulling latest image for {}: {}", name, spec.image);
            if let Err(e) = self.runtime.pull_image(&spec.image).await {
                tracing::warn!("Image refresh for {} failed: {}", name, e);
            }
        }

        let binds: Vec<(String, String, bool)> = spec
            .volume_binds()
            .into_iter()
            .map(|bind| {
                let host = std::path::absolute(&bind.host)
                    .map(|p| p.display().to_string())
                    .unwrap_or(bind.host);
                (host, bind.container, bind.read_only)
            })
            .collect();

        let env: Vec<(String, String)> = spec
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut results = Vec::with_capacity(spec.scale as usize);
        for index in 0..spec.scale {
            let instance = instance_id(name, index, spec.scale);
            let container = ContainerSpec {
                name: instance.clone(),
                image: spec.image.clone(),
                exposed_ports: spec.expose.clone(),
                published_ports: Vec::new(),
                env: env.clone(),
                binds: binds.clone(),
                network: Some(self.network.clone()),
            };

            let outcome = match self.runtime.run_container(&container).await {
                Ok(id) => {
                    tracing::info!("Started {} ({})", instance, &id[..id.len().min(12)]);
                    LaunchOutcome::Started { id }
                }
                Err(e) => {
                    tracing::error!("Error starting {}: {}", instance, e);
                    LaunchOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            results.push(LaunchResult { instance, outcome });
        }
        results
    }

    /// Stop and remove every expected replica of a service.
    pub async fn stop_service(&self, name: &str, spec: &ServiceSpec) -> Vec<StopResult> {
        let mut results = Vec::with_capacity(spec.scale as usize);
        for instance in instance_ids(name, spec.scale) {
            let outcome = match self.runtime.stop_container(&instance).await {
                Ok(()) => match self.runtime.remove_container(&instance).await {
                    Ok(()) => {
                        tracing::info!("Stopped {}", instance);
                        StopOutcome::Stopped
                    }
                    Err(e) => {
                        tracing::error!("Error removing {}: {}", instance, e);
                        StopOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                },
                Err(RuntimeError::NotFound { .. }) => {
                    tracing::info!("Container {} not found", instance);
                    StopOutcome::NotFound
                }
                Err(e) => {
                    tracing::error!("Error stopping {}: {}", instance, e);
                    StopOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            results.push(StopResult { instance, outcome });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::StubRuntime;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn service(scale: u32) -> ServiceSpec {
        let mut environment = IndexMap::new();
        environment.insert("RUST_LOG".to_string(), "info".to_string());
        ServiceSpec {
            image: "myapp:latest".to_string(),
            scale,
            expose: vec![80, 9090],
            environment,
            volumes: vec!["/srv/data:/var/data:ro".to_string()],
        }
    }

    async fn ready_runtime() -> Arc<StubRuntime> {
        let runtime = Arc::new(StubRuntime::new());
        runtime.ensure_network("convoy_network").await.unwrap();
        runtime
    }

    #[tokio::test]
    async fn starts_all_replicas_with_resolved_spec() {
        let runtime = ready_runtime().await;
        let launcher = InstanceLauncher::new(runtime.clone(), "convoy_network");

        let results = launcher.start_service("web", &service(3), false).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(LaunchResult::succeeded));
        assert_eq!(
            runtime.container_names(),
            vec!["web_1", "web_2", "web_3"]
        );

        let spec = runtime.spec_of("web_1").unwrap();
        assert_eq!(spec.image, "myapp:latest");
        assert_eq!(spec.exposed_ports, vec![80, 9090]);
        assert!(spec.published_ports.is_empty(), "internal-only exposure");
        assert_eq!(
            spec.env,
            vec![("RUST_LOG".to_string(), "info".to_string())]
        );
        assert_eq!(
            spec.binds,
            vec![("/srv/data".to_string(), "/var/data".to_string(), true)]
        );
        assert_eq!(spec.network.as_deref(), Some("convoy_network"));
    }

    #[tokio::test]
    async fn image_refresh_happens_once_per_service() {
        let runtime = ready_runtime().await;
        let launcher = InstanceLauncher::new(runtime.clone(), "convoy_network");

        launcher.start_service("web", &service(3), true).await;
        assert_eq!(runtime.pulled_images(), vec!["myapp:latest"]);

        launcher.stop_service("web", &service(3)).await;
        launcher.start_service("web", &service(3), false).await;
        assert_eq!(runtime.pulled_images(), vec!["myapp:latest"]);
    }

    #[tokio::test]
    async fn one_failed_replica_does_not_abort_the_rest() {
        let runtime = ready_runtime().await;
        runtime.fail_launch_of("web_2", "disk full");
        let launcher = InstanceLauncher::new(runtime.clone(), "convoy_network");

        let results = launcher.start_service("web", &service(3), false).await;
        let succeeded: Vec<&str> = results
            .iter()
            .filter(|r| r.succeeded())
            .map(|r| r.instance.as_str())
            .collect();
        assert_eq!(succeeded, vec!["web_1", "web_3"]);
        assert_eq!(runtime.container_names(), vec!["web_1", "web_3"]);
    }

    #[tokio::test]
    async fn stop_reports_absent_instances_without_failing() {
        let runtime = ready_runtime().await;
        let launcher = InstanceLauncher::new(runtime.clone(), "convoy_network");

        launcher.start_service("web", &service(3), false).await;
        runtime.remove_container("web_2").await.unwrap();

        let results = launcher.stop_service("web", &service(3)).await;
        assert!(results.iter().all(StopResult::succeeded));
        assert!(matches!(results[1].outcome, StopOutcome::NotFound));
        assert!(runtime.container_names().is_empty());
    }
}
