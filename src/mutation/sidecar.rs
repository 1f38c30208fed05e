//! Pod sidecar injection
//!
//! Merges the statically configured containers, volumes and annotations into
//! a Pod. Operations are emitted in a fixed order: containers, volumes, then
//! annotations.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::object::decode_object;
use super::patch::{pointer, PatchBuilder};
use super::{MutationError, Mutator};
use crate::config::SidecarConfig;
use crate::webhook::review::ReviewRequest;

/// Kind name matched by the dispatcher
pub const POD_KIND: &str = "Pod";

/// Injects the configured sidecar set into every Pod it sees
#[derive(Debug, Clone)]
pub struct PodSidecarInjector {
    config: Arc<SidecarConfig>,
}

impl PodSidecarInjector {
    /// Create an injector sharing the process-wide sidecar configuration
    pub fn new(config: Arc<SidecarConfig>) -> Self {
        Self { config }
    }

    /// Compute the patch merging the sidecar set into `pod`
    pub fn inject(&self, pod: &Pod) -> Result<PatchBuilder, MutationError> {
        let (containers, volumes) = pod
            .spec
            .as_ref()
            .map(|spec| {
                (
                    spec.containers.len(),
                    spec.volumes.as_ref().map_or(0, Vec::len),
                )
            })
            .unwrap_or_default();

        let mut patch = append_items(containers, &self.config.containers, "containers")?;
        patch.extend(append_items(volumes, &self.config.volumes, "volumes")?);
        patch.extend(update_annotations(
            pod.metadata.annotations.as_ref(),
            &self.config.annotations,
        ));
        Ok(patch)
    }
}

impl Mutator for PodSidecarInjector {
    fn name(&self) -> &'static str {
        "pod-sidecar-injector"
    }

    fn mutate(
        &self,
        request: &ReviewRequest,
        object: &Value,
    ) -> Result<PatchBuilder, MutationError> {
        let pod: Pod = decode_object(object, POD_KIND)?;
        debug!(
            uid = %request.uid,
            pod = ?pod.metadata.name.as_deref().or(pod.metadata.generate_name.as_deref()),
            namespace = ?request.namespace,
            "Parsed pod"
        );
        self.inject(&pod)
    }
}

/// Append `added` to the list at `/spec/{field}` holding `target_len` items
///
/// An empty list cannot take a `-` append, so the first item then replaces
/// the list wholesale as a singleton.
fn append_items<T: Serialize>(
    target_len: usize,
    added: &[T],
    field: &str,
) -> Result<PatchBuilder, MutationError> {
    let mut patch = PatchBuilder::new();
    let mut first = target_len == 0;

    for item in added {
        let value = serde_json::to_value(item)?;
        if first {
            first = false;
            patch.add(pointer(["spec", field]), json!([value]));
        } else {
            patch.add(pointer(["spec", field, "-"]), value);
        }
    }

    Ok(patch)
}

/// Add or replace each configured annotation
///
/// Each missing key is added as its own single-entry map at
/// `/metadata/annotations`; keys with a non-empty value are replaced in place.
fn update_annotations(
    target: Option<&BTreeMap<String, String>>,
    added: &BTreeMap<String, String>,
) -> PatchBuilder {
    let mut patch = PatchBuilder::new();

    for (key, value) in added {
        let present = target
            .and_then(|annotations| annotations.get(key))
            .is_some_and(|current| !current.is_empty());

        if present {
            patch.replace(
                pointer(["metadata", "annotations", key.as_str()]),
                json!(value),
            );
        } else {
            patch.add(pointer(["metadata", "annotations"]), json!({ key: value }));
        }
    }

    patch
}
