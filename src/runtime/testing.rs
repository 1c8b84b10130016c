//! In-memory [`ContainerRuntime`] stub for tests.
//!
//! Models just enough engine behavior for the orchestration core: named
//! containers with statuses, named networks with attachments, and pull
//! bookkeeping. Failure knobs let tests script per-container launch errors
//! and delayed readiness.
//!
//! ```rust,no_run
//! use convoy::runtime::{ContainerRuntime, StubRuntime};
//!
//! # async fn example() {
//! let runtime = StubRuntime::new();
//! runtime.fail_launch_of("web_2", "boom");
//! runtime.delay_running("web_1", 3); // running after 3 status polls
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::runtime::error::{Result, RuntimeError};
use crate::runtime::{
    ContainerInfo, ContainerRuntime, ContainerSpec, ContainerStatus, NetworkHandle, PortMapping,
};

#[derive(Debug, Clone)]
struct StubContainer {
    spec: ContainerSpec,
    status: ContainerStatus,
    id: String,
}

#[derive(Debug, Default)]
struct StubState {
    containers: HashMap<String, StubContainer>,
    networks: HashSet<String>,
    attachments: HashMap<String, HashSet<String>>,
    pulled: Vec<String>,
    next_id: u64,
    network_creates: u32,
    launch_failures: HashMap<String, String>,
    readiness_delays: HashMap<String, u32>,
}

/// Scriptable in-memory container runtime.
#[derive(Debug, Default)]
pub struct StubRuntime {
    state: Mutex<StubState>,
}

impl StubRuntime {
    /// Create an empty stub runtime.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `run_container` fail for the named container.
    pub fn fail_launch_of(&self, name: &str, reason: &str) {
        self.lock()
            .launch_failures
            .insert(name.to_string(), reason.to_string());
    }

    /// Report the named container as starting for the next `polls` status
    /// lookups, then running.
    pub fn delay_running(&self, name: &str, polls: u32) {
        self.lock()
            .readiness_delays
            .insert(name.to_string(), polls);
    }

    /// Names of containers currently present, sorted.
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().containers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Images pulled, in order.
    pub fn pulled_images(&self) -> Vec<String> {
        self.lock().pulled.clone()
    }

    /// How many times a network was actually created (not just ensured).
    pub fn network_create_count(&self) -> u32 {
        self.lock().network_creates
    }

    /// Networks the named container is attached to, sorted.
    pub fn attachments_of(&self, container: &str) -> Vec<String> {
        let mut nets: Vec<String> = self
            .lock()
            .attachments
            .get(container)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        nets.sort();
        nets
    }

    /// The spec a container was launched with.
    pub fn spec_of(&self, name: &str) -> Option<ContainerSpec> {
        self.lock().containers.get(name).map(|c| c.spec.clone())
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn pull_image(&self, image: &str) -> Result<()> {
        self.lock().pulled.push(image.to_string());
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.lock();

        if let Some(reason) = state.launch_failures.get(&spec.name) {
            return Err(RuntimeError::Api {
                message: reason.clone(),
            });
        }
        if state.containers.contains_key(&spec.name) {
            return Err(RuntimeError::Conflict {
                message: format!("container name '{}' is already in use", spec.name),
            });
        }

        state.next_id += 1;
        let id = format!("{:012x}", state.next_id);

        let status = if state.readiness_delays.contains_key(&spec.name) {
            ContainerStatus::Starting
        } else {
            ContainerStatus::Running
        };

        if let Some(network) = &spec.network {
            state
                .attachments
                .entry(spec.name.clone())
                .or_default()
                .insert(network.clone());
        }

        state.containers.insert(
            spec.name.clone(),
            StubContainer {
                spec: spec.clone(),
                status,
                id: id.clone(),
            },
        );

        Ok(id)
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        match state.containers.get_mut(name) {
            Some(container) => {
                container.status = ContainerStatus::Stopped;
                Ok(())
            }
            None => Err(RuntimeError::NotFound {
                message: format!("no such container: {name}"),
            }),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.containers.remove(name).is_none() {
            return Err(RuntimeError::NotFound {
                message: format!("no such container: {name}"),
            });
        }
        state.attachments.remove(name);
        Ok(())
    }

    async fn container_status(&self, name: &str) -> Result<ContainerStatus> {
        let mut state = self.lock();

        let mut still_delayed = false;
        if let Some(polls) = state.readiness_delays.get_mut(name) {
            if *polls > 0 {
                *polls -= 1;
                still_delayed = true;
            }
        }

        if !state.containers.contains_key(name) {
            return Err(RuntimeError::NotFound {
                message: format!("no such container: {name}"),
            });
        }
        if still_delayed {
            return Ok(ContainerStatus::Starting);
        }

        if state.readiness_delays.get(name) == Some(&0)
            && let Some(container) = state.containers.get_mut(name)
        {
            container.status = ContainerStatus::Running;
        }

        Ok(state.containers[name].status)
    }

    async fn list_running(&self) -> Result<Vec<ContainerInfo>> {
        let state = self.lock();
        let mut infos: Vec<ContainerInfo> = state
            .containers
            .values()
            .filter(|c| c.status.is_running())
            .map(|c| ContainerInfo {
                name: c.spec.name.clone(),
                short_id: c.id.clone(),
                status: "Up 1 second".to_string(),
                ports: c
                    .spec
                    .exposed_ports
                    .iter()
                    .map(|p| PortMapping {
                        container_port: *p,
                        host_port: None,
                    })
                    .chain(c.spec.published_ports.iter().map(|(h, cp)| PortMapping {
                        container_port: *cp,
                        host_port: Some(*h),
                    }))
                    .collect(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn ensure_network(&self, name: &str) -> Result<NetworkHandle> {
        let mut state = self.lock();
        if state.networks.insert(name.to_string()) {
            state.network_creates += 1;
        }
        Ok(NetworkHandle {
            name: name.to_string(),
        })
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.networks.contains(network) {
            return Err(RuntimeError::NotFound {
                message: format!("network {network} not found"),
            });
        }
        if !state.containers.contains_key(container) {
            return Err(RuntimeError::NotFound {
                message: format!("no such container: {container}"),
            });
        }
        let attached = state
            .attachments
            .entry(container.to_string())
            .or_default()
            .insert(network.to_string());
        if !attached {
            return Err(RuntimeError::Conflict {
                message: format!(
                    "endpoint with name {container} already exists in network {network}"
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn launch_then_stop_then_remove() {
        let runtime = StubRuntime::new();
        let spec = ContainerSpec {
            name: "web".to_string(),
            image: "nginx:latest".to_string(),
            ..Default::default()
        };

        runtime.run_container(&spec).await.unwrap();
        assert!(
            runtime
                .container_status("web")
                .await
                .unwrap()
                .is_running()
        );

        runtime.stop_container("web").await.unwrap();
        assert_eq!(
            runtime.container_status("web").await.unwrap(),
            ContainerStatus::Stopped
        );

        runtime.remove_container("web").await.unwrap();
        assert!(
            runtime
                .container_status("web")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn double_ensure_creates_one_network() {
        let runtime = StubRuntime::new();
        let a = runtime.ensure_network("convoy_network").await.unwrap();
        let b = runtime.ensure_network("convoy_network").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(runtime.network_create_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_ensure_creates_one_network() {
        let runtime = Arc::new(StubRuntime::new());
        let ensures = (0..8).map(|_| {
            let runtime = runtime.clone();
            async move { runtime.ensure_network("convoy_network").await }
        });
        for handle in futures::future::join_all(ensures).await {
            handle.unwrap();
        }
        assert_eq!(runtime.network_create_count(), 1);
    }

    #[tokio::test]
    async fn second_attach_is_a_conflict() {
        let runtime = StubRuntime::new();
        runtime.ensure_network("net").await.unwrap();
        runtime
            .run_container(&ContainerSpec {
                name: "web".to_string(),
                image: "a".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        runtime.connect_network("net", "web").await.unwrap();
        let err = runtime.connect_network("net", "web").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Conflict { .. }));
    }

    #[tokio::test]
    async fn delayed_readiness_counts_polls() {
        let runtime = StubRuntime::new();
        runtime.delay_running("web", 2);
        runtime
            .run_container(&ContainerSpec {
                name: "web".to_string(),
                image: "a".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!runtime.container_status("web").await.unwrap().is_running());
        assert!(!runtime.container_status("web").await.unwrap().is_running());
        assert!(runtime.container_status("web").await.unwrap().is_running());
    }
}
