//! Upstream set derivation.
//!
//! The upstream set for a load balancer is derived from the current scale of
//! its target service on every create. The builder is deterministic (index
//! order, fixed weight) so the rendered proxy config is byte-reproducible
//! for identical inputs.

use crate::config::{LoadBalancerSpec, ServiceSpec};
use crate::naming::instance_id;

/// Container port the proxy forwards to on every backend.
pub const BACKEND_PORT: u16 = 80;

/// One weighted backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamServer {
    /// Backend container name, resolvable via the shared network's DNS.
    pub instance: String,
    /// Port on the backend container.
    pub port: u16,
    /// Relative selection weight.
    pub weight: u32,
}

/// Derive the ordered upstream set for a load balancer.
///
/// Uses the first target only; validation guarantees it exists in the
/// service map.
pub fn build_upstreams(
    lb: &LoadBalancerSpec,
    services: &indexmap::IndexMap<String, ServiceSpec>,
) -> Vec<UpstreamServer> {
    let Some(target) = lb.primary_target() else {
        return Vec::new();
    };
    let Some(service) = services.get(&target.name) else {
        return Vec::new();
    };

    (0..service.scale)
        .map(|i| UpstreamServer {
            instance: instance_id(&target.name, i, service.scale),
            port: BACKEND_PORT,
            weight: target.weight,
        })
        .collect()
}
