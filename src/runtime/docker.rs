//! Docker implementation of the runtime boundary, built on bollard.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, EndpointSettings, HostConfig, PortBinding};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions};
use futures::StreamExt;

use crate::runtime::error::{Result, RuntimeError};
use crate::runtime::{
    ContainerInfo, ContainerRuntime, ContainerSpec, ContainerStatus, NetworkHandle, PortMapping,
};

/// Connect to the Docker daemon and verify it responds.
///
/// Tries bollard's platform defaults first (honors `DOCKER_HOST`), then the
/// rootless unix socket on Linux.
pub async fn connect_docker() -> Result<Docker> {
    let mut last_err = String::new();

    match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => last_err = e.to_string(),
        },
        Err(e) => last_err = e.to_string(),
    }

    #[cfg(unix)]
    {
        let mut candidates = Vec::new();
        if let Ok(home) = std::env::var("HOME") {
            candidates.push(format!("{home}/.docker/run/docker.sock"));
        }
        if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
            candidates.push(format!("{dir}/docker.sock"));
        }
        for path in candidates {
            if !std::path::Path::new(&path).exists() {
                continue;
            }
            if let Ok(docker) =
                Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION)
                && docker.ping().await.is_ok()
            {
                return Ok(docker);
            }
        }
    }

    Err(RuntimeError::Unavailable { reason: last_err })
}

fn map_bollard_error(e: bollard::errors::Error) -> RuntimeError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound { message },
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message,
        } => RuntimeError::Conflict { message },
        // The engine reports "already connected" attach races as 403/500
        // depending on version; classify by message.
        bollard::errors::Error::DockerResponseServerError { message, .. }
            if message.contains("already exists") =>
        {
            RuntimeError::Conflict { message }
        }
        other => RuntimeError::Api {
            message: other.to_string(),
        },
    }
}

/// [`ContainerRuntime`] backed by a local Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Wrap an established Docker connection.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local daemon.
    pub async fn connect() -> Result<Self> {
        Ok(Self::new(connect_docker().await?))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, image: &str) -> Result<()> {
        tracing::info!("Pulling image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => return Err(map_bollard_error(e)),
            }
        }

        tracing::info!("Pulled image: {}", image);
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        // Internal-only exposures plus the container side of published ports.
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .exposed_ports
            .iter()
            .copied()
            .chain(spec.published_ports.iter().map(|(_, c)| *c))
            .map(|port| (format!("{port}/tcp"), HashMap::new()))
            .collect();

        let mut port_bindings = HashMap::new();
        for (host_port, container_port) in &spec.published_ports {
            port_bindings.insert(
                format!("{container_port}/tcp"),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(host_port.to_string()),
                }]),
            );
        }

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let binds: Vec<String> = spec
            .binds
            .iter()
            .map(|(host, container, read_only)| {
                let mode = if *read_only { "ro" } else { "rw" };
                format!("{host}:{container}:{mode}")
            })
            .collect();

        let host_config = HostConfig {
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            binds: if binds.is_empty() { None } else { Some(binds) },
            network_mode: spec.network.clone(),
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: if env.is_empty() { None } else { Some(env) },
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(map_bollard_error)?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_bollard_error)?;

        Ok(response.id)
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        self.docker
            .stop_container(name, None::<StopContainerOptions>)
            .await
            .map_err(map_bollard_error)
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.docker
            .remove_container(name, None::<RemoveContainerOptions>)
            .await
            .map_err(map_bollard_error)
    }

    async fn container_status(&self, name: &str) -> Result<ContainerStatus> {
        let info = self
            .docker
            .inspect_container(name, None)
            .await
            .map_err(map_bollard_error)?;

        let status = info
            .state
            .and_then(|s| s.status)
            .unwrap_or(ContainerStateStatusEnum::EMPTY);

        Ok(match status {
            ContainerStateStatusEnum::RUNNING => ContainerStatus::Running,
            ContainerStateStatusEnum::CREATED | ContainerStateStatusEnum::RESTARTING => {
                ContainerStatus::Starting
            }
            ContainerStateStatusEnum::DEAD => ContainerStatus::Failed,
            _ => ContainerStatus::Stopped,
        })
    }

    async fn list_running(&self) -> Result<Vec<ContainerInfo>> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(map_bollard_error)?;

        let mut infos = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let name = summary
                .names
                .as_ref()
                .and_then(|names| names.first())
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default();
            if name.is_empty() {
                continue;
            }

            let short_id = summary
                .id
                .as_deref()
                .map(|id| id.chars().take(12).collect())
                .unwrap_or_default();

            let ports = summary
                .ports
                .unwrap_or_default()
                .into_iter()
                .map(|p| PortMapping {
                    container_port: p.private_port,
                    host_port: p.public_port,
                })
                .collect();

            infos.push(ContainerInfo {
                name,
                short_id,
                status: summary.status.unwrap_or_default(),
                ports,
            });
        }

        Ok(infos)
    }

    async fn ensure_network(&self, name: &str) -> Result<NetworkHandle> {
        if self.docker.inspect_network::<String>(name, None).await.is_ok() {
            return Ok(NetworkHandle {
                name: name.to_string(),
            });
        }

        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            attachable: true,
            ..Default::default()
        };

        match self.docker.create_network(options).await {
            Ok(_) => {
                tracing::info!("Created network: {}", name);
                Ok(NetworkHandle {
                    name: name.to_string(),
                })
            }
            // Lost a create race to another process; the network exists.
            Err(e) => match map_bollard_error(e) {
                RuntimeError::Conflict { .. } => Ok(NetworkHandle {
                    name: name.to_string(),
                }),
                other => Err(other),
            },
        }
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: EndpointSettings::default(),
        };

        self.docker
            .connect_network(network, options)
            .await
            .map_err(map_bollard_error)
    }
}
