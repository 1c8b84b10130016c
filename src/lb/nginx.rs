//! nginx config rendering and the on-disk config store.
//!
//! Rendering is pure: identical inputs produce byte-identical output, which
//! the round-trip tests rely on. Persistence is overwrite-safe — re-creating
//! a load balancer replaces its artifact in place.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Algorithm;
use crate::lb::upstream::UpstreamServer;

/// Render the full nginx config for one load balancer.
///
/// The upstream block is named after the load balancer; the server block
/// listens on container port 80 (the published host port is a container
/// port mapping, not part of the config), preserves client-identifying
/// headers, fails over on errors/timeouts/5xx with bounded retries, and
/// serves a fixed 200 on `/health`.
pub fn render(name: &str, algorithm: Algorithm, upstreams: &[UpstreamServer]) -> String {
    let servers = upstreams
        .iter()
        .map(|u| format!("        server {}:{} weight={};", u.instance, u.port, u.weight))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"events {{
    worker_connections 1024;
}}

http {{
    include       /etc/nginx/mime.types;
    default_type  application/octet-stream;
    sendfile        on;
    keepalive_timeout  65;

    upstream {name} {{
        {directive}
{servers}
    }}

    server {{
        listen 80 default_server;
        server_name _;
        root /usr/share/nginx/html;
        index index.html;

        location / {{
            proxy_pass http://{name};
            proxy_http_version 1.1;
            proxy_set_header Host $host;
            proxy_set_header X-Real-IP $remote_addr;
            proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
            proxy_set_header X-Forwarded-Proto $scheme;
            proxy_set_header Connection "";

            proxy_next_upstream error timeout invalid_header http_500 http_502 http_503 http_504;
            proxy_next_upstream_tries 3;
            proxy_next_upstream_timeout 10s;
            proxy_connect_timeout 5s;
            proxy_send_timeout 10s;
            proxy_read_timeout 10s;
        }}

        location /health {{
            access_log off;
            return 200 'OK';
            add_header Content-Type text/plain;
        }}

        error_page   500 502 503 504  /50x.html;
        location = /50x.html {{
            root   /usr/share/nginx/html;
        }}
    }}
}}
"#,
        name = name,
        directive = algorithm.directive(),
        servers = servers,
    )
}

/// Errors from the config store.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// Could not write or delete an artifact.
    #[error("Config store I/O error at '{path}': {source}")]
    Io {
        /// Artifact or directory path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Filesystem store for rendered proxy configs, one file per load balancer.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Store rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default store location under the platform temp dir.
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("convoy").join("nginx")
    }

    /// Path of the artifact for a load balancer.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.conf"))
    }

    /// Write (or overwrite) the artifact for a load balancer.
    pub fn persist(&self, name: &str, config_text: &str) -> Result<PathBuf, ConfigStoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ConfigStoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.artifact_path(name);
        std::fs::write(&path, config_text).map_err(|source| ConfigStoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Delete the artifact for a load balancer.
    ///
    /// Returns `Ok(false)` when no artifact exists — absence is not an error
    /// during teardown.
    pub fn delete(&self, name: &str) -> Result<bool, ConfigStoreError> {
        let path = self.artifact_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ConfigStoreError::Io { path, source }),
        }
    }

    /// True when an artifact exists for the load balancer.
    pub fn exists(&self, name: &str) -> bool {
        self.artifact_path(name).exists()
    }

    /// The store's root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
