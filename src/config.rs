//! Process-wide webhook configuration
//!
//! Built once at startup and handed to the mutation engine by value; nothing
//! here is read through global state.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Container, Volume};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::{Error, Result};

/// Containers, volumes and annotations merged into every matching Pod
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// Containers appended to `spec.containers`, in order
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Volumes appended to `spec.volumes`, in order
    #[serde(default)]
    pub volumes: Vec<Volume>,
    /// Annotations added to or replaced in `metadata.annotations`
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl SidecarConfig {
    /// Parse a YAML sidecar document
    pub fn from_yaml(data: &[u8]) -> Result<Self> {
        Ok(serde_yaml::from_slice(data)?)
    }

    /// Read and parse the sidecar file at `path`, logging its checksum
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;

        info!(
            path = %path.display(),
            sha256 = %checksum(&data),
            "Loaded sidecar configuration"
        );

        let config = Self::from_yaml(&data)?;
        info!(
            containers = config.containers.len(),
            volumes = config.volumes.len(),
            annotations = config.annotations.len(),
            "Parsed sidecar configuration"
        );
        Ok(config)
    }
}

/// Hex SHA-256 of a configuration document, logged for audit
pub fn checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Which mutation policies this process runs
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// Normalized DNS suffix; enables Ingress TLS host normalization
    pub dns_suffix: Option<String>,
    /// Sidecar set; enables Pod sidecar injection
    pub sidecar: Option<Arc<SidecarConfig>>,
    /// Run the single configured policy for every request regardless of kind
    pub unconditional: bool,
}

impl WebhookConfig {
    /// Build the configuration from raw process parameters
    ///
    /// Normalizes the DNS suffix and loads the sidecar file when given.
    pub fn load(
        dns_suffix: Option<&str>,
        sidecar_config: Option<&Path>,
        unconditional: bool,
    ) -> Result<Self> {
        let dns_suffix = dns_suffix.map(normalize_dns_suffix).transpose()?;
        let sidecar = sidecar_config
            .map(SidecarConfig::load)
            .transpose()?
            .map(Arc::new);

        if dns_suffix.is_none() && sidecar.is_none() {
            return Err(Error::config(
                "no mutation policy configured: set --dns-suffix or --sidecar-config",
            ));
        }

        Ok(Self {
            dns_suffix,
            sidecar,
            unconditional,
        })
    }
}

/// Trim whitespace and surrounding dots from a DNS suffix
///
/// `.example.com.` becomes `example.com`; an empty result is rejected.
pub fn normalize_dns_suffix(raw: &str) -> Result<String> {
    let suffix = raw.trim().trim_matches('.');
    if suffix.is_empty() {
        return Err(Error::config(format!("invalid DNS suffix {raw:?}")));
    }
    if suffix.split('.').any(str::is_empty) {
        return Err(Error::config(format!(
            "invalid DNS suffix {raw:?}: empty label"
        )));
    }
    Ok(suffix.to_string())
}
