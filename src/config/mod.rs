//! Configuration model for a convoy deployment.
//!
//! A convoy file has two top-level mappings:
//!
//! ```yaml
//! services:
//!   web:
//!     image: myapp:latest
//!     scale: 3
//!     expose: [80]
//!     environment:
//!       RUST_LOG: info
//!     volumes:
//!       - ./static:/usr/share/app/static
//!
//! load_balancers:
//!   lb1:
//!     services:
//!       - name: web
//!         weight: 2
//!     algorithm: least_conn
//!     port: 8080
//!     health_check:
//!       path: /health
//!       interval: 5s
//!       retries: 3
//! ```
//!
//! Maps are order-preserving: services start and load balancers provision in
//! declared order. All cross-references are validated at load time so the
//! orchestrator never hits an undeclared service at runtime.

mod error;

pub use error::ConfigError;

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

/// A parsed and validated convoy configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvoyConfig {
    /// Logical services, keyed by name, in declared order.
    #[serde(default)]
    pub services: IndexMap<String, ServiceSpec>,
    /// Load balancers, keyed by name, in declared order.
    #[serde(default)]
    pub load_balancers: IndexMap<String, LoadBalancerSpec>,
}

/// One logical service: an image plus how many replicas to run and how to
/// wire them up.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    /// Image reference to run.
    pub image: String,
    /// Replica count, default 1.
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// Container ports to expose inside the shared network (no host binding).
    #[serde(default)]
    pub expose: Vec<u16>,
    /// Environment variables passed through verbatim.
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    /// Volume bindings as `hostPath:containerPath` entries.
    #[serde(default)]
    pub volumes: Vec<String>,
}

impl ServiceSpec {
    /// Parse the raw `host:container` volume entries.
    ///
    /// Entries are validated at load time, so this does not fail after
    /// [`ConvoyConfig::load`]; malformed entries are skipped here.
    pub fn volume_binds(&self) -> Vec<VolumeBind> {
        self.volumes
            .iter()
            .filter_map(|entry| VolumeBind::parse(entry))
            .collect()
    }
}

/// A single host-path to container-path binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBind {
    /// Host path as written in the config (relative paths allowed).
    pub host: String,
    /// Absolute path inside the container.
    pub container: String,
    /// Mount mode, `rw` unless the entry carries an explicit `:ro`.
    pub read_only: bool,
}

impl VolumeBind {
    fn parse(entry: &str) -> Option<Self> {
        let (host, rest) = entry.split_once(':')?;
        if host.is_empty() || rest.is_empty() {
            return None;
        }
        let (container, read_only) = match rest.split_once(':') {
            Some((container, "ro")) => (container, true),
            Some((container, "rw")) => (container, false),
            Some(_) => return None,
            None => (rest, false),
        };
        if container.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            container: container.to_string(),
            read_only,
        })
    }
}

/// One reverse-proxy load balancer in front of a scaled service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerSpec {
    /// Target services. Only the first entry is honored when routing; every
    /// entry is still validated against the service map.
    pub services: Vec<LbTarget>,
    /// Backend selection algorithm, default round-robin.
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Host port the proxy publishes.
    pub port: u16,
    /// Health-check parameters. Parsed and validated but not yet wired into
    /// the rendered proxy config.
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
}

impl LoadBalancerSpec {
    /// The single target this load balancer routes to.
    ///
    /// Validation guarantees at least one target exists after load.
    pub fn primary_target(&self) -> Option<&LbTarget> {
        self.services.first()
    }
}

/// A weighted reference to a backend service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LbTarget {
    /// Service name; must exist in the `services` map.
    pub name: String,
    /// Relative weight for backend selection, default 1.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Backend selection algorithm for a load balancer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// nginx default behavior; renders no directive.
    #[default]
    RoundRobin,
    /// Route to the backend with the fewest active connections.
    LeastConn,
    /// Stick clients to backends by source address hash.
    IpHash,
}

impl Algorithm {
    /// The nginx upstream directive for this algorithm.
    pub fn directive(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "",
            Algorithm::LeastConn => "least_conn;",
            Algorithm::IpHash => "ip_hash;",
        }
    }
}

/// Health-check parameters for a load balancer's backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckConfig {
    /// Path to probe, default `/`.
    #[serde(default = "default_health_path")]
    pub path: String,
    /// Interval between probes, default `5s`.
    #[serde(default = "default_health_interval")]
    pub interval: String,
    /// Consecutive failures before a backend is considered down, default 3.
    #[serde(default = "default_health_retries")]
    pub retries: u32,
}

fn default_scale() -> u32 {
    1
}

fn default_weight() -> u32 {
    1
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_health_interval() -> String {
    "5s".to_string()
}

fn default_health_retries() -> u32 {
    3
}

impl ConvoyConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&text, path)
    }

    /// Parse and validate configuration text.
    pub fn from_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: ConvoyConfig =
            serde_yml::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-references and value constraints.
    ///
    /// Checked here rather than at runtime so that a bad file fails the whole
    /// invocation before any container is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, service) in &self.services {
            if service.scale == 0 {
                return Err(ConfigError::ZeroScale {
                    service: name.clone(),
                });
            }
            for entry in &service.volumes {
                if VolumeBind::parse(entry).is_none() {
                    return Err(ConfigError::InvalidVolume {
                        service: name.clone(),
                        entry: entry.clone(),
                    });
                }
            }
        }

        for (name, lb) in &self.load_balancers {
            // Service and load-balancer names share the container namespace.
            if self.services.contains_key(name) {
                return Err(ConfigError::NameCollision { name: name.clone() });
            }
            if lb.services.is_empty() {
                return Err(ConfigError::NoTargets {
                    load_balancer: name.clone(),
                });
            }
            for target in &lb.services {
                if !self.services.contains_key(&target.name) {
                    return Err(ConfigError::UnknownService {
                        load_balancer: name.clone(),
                        service: target.name.clone(),
                    });
                }
            }
            if lb.services.len() > 1 {
                let ignored: Vec<&str> = lb.services[1..]
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect();
                tracing::warn!(
                    "Load balancer '{}' lists multiple targets; only '{}' is routed, ignoring: {}",
                    name,
                    lb.services[0].name,
                    ignored.join(", ")
                );
            }
        }

        Ok(())
    }
}
