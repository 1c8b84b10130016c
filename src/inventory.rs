//! Inventory of running containers, grouped for display.
//!
//! Containers whose names match a declared load balancer are listed as load
//! balancers; everything else is grouped into services by stripping the
//! trailing `_N` replica suffix. The replica count reported per service is
//! observed (running containers), not declared scale.

use indexmap::IndexMap;

use crate::config::ConvoyConfig;
use crate::naming::service_of;
use crate::runtime::{ContainerInfo, ContainerRuntime, PortMapping, Result};

/// Running containers partitioned into services and load balancers.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Service name → running instances, grouped in discovery order.
    pub services: IndexMap<String, Vec<ContainerInfo>>,
    /// Load balancer containers.
    pub load_balancers: Vec<ContainerInfo>,
}

impl Inventory {
    /// True when nothing is running.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.load_balancers.is_empty()
    }
}

/// Query the runtime and partition running containers.
pub async fn collect_inventory(
    runtime: &dyn ContainerRuntime,
    config: &ConvoyConfig,
) -> Result<Inventory> {
    let mut inventory = Inventory::default();

    for container in runtime.list_running().await? {
        if config.load_balancers.contains_key(&container.name) {
            inventory.load_balancers.push(container);
        } else {
            let service = service_of(&container.name).to_string();
            inventory.services.entry(service).or_default().push(container);
        }
    }

    Ok(inventory)
}

/// Render port mappings as `host->container` pairs, published ports only.
pub fn format_ports(ports: &[PortMapping]) -> String {
    ports
        .iter()
        .filter_map(|p| {
            p.host_port
                .map(|host| format!("{}->{}", host, p.container_port))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
