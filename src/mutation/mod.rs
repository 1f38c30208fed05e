//! Mutation decision engine
//!
//! A [`MutationPolicy`] maps the resource kind declared by an admission
//! request to the [`Mutator`] responsible for it, runs it against the
//! embedded object and turns the resulting patch into an
//! [`AdmissionResponse`]. Every response it builds is "allowed": failures
//! degrade to "no patch" with a status message, never to a denial.
//!
//! New policies are added by implementing [`Mutator`] and registering it;
//! neither the webhook handler nor the review codec changes.

pub mod ingress;
pub mod object;
pub mod patch;
pub mod sidecar;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use kube::core::admission::AdmissionResponse;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::WebhookConfig;
use crate::webhook::review::ReviewRequest;
use crate::Error;

pub use ingress::{IngressHostNormalizer, INGRESS_KIND};
pub use patch::PatchBuilder;
pub use sidecar::{PodSidecarInjector, POD_KIND};

/// Errors raised while computing a patch for a single object
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// The embedded object does not match the shape expected for its kind
    #[error("failed to decode {kind}: {source}")]
    Decode {
        /// Kind the object was decoded as
        kind: String,
        /// Underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// A configured value could not be turned into patch JSON
    #[error("failed to serialize patch value: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A per-kind mutation policy
///
/// Implementations hold only read-only state and are shared by every
/// in-flight request.
pub trait Mutator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Compute the patch for `object`, the raw object embedded in `request`
    fn mutate(&self, request: &ReviewRequest, object: &Value) -> Result<PatchBuilder, MutationError>;
}

/// Kind and version a mutator is registered under
///
/// The API group is not part of the key: `Ingress` moved groups between
/// versions without changing the TLS block shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKind {
    /// API version, e.g. `v1`
    pub version: String,
    /// Kind, e.g. `Ingress`
    pub kind: String,
}

impl ResourceKind {
    /// Create a key from a version and kind
    pub fn new(version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// The kind declared by an admission request
    pub fn of(request: &ReviewRequest) -> Self {
        Self::new(&request.kind.version, &request.kind.kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.kind)
    }
}

/// Registry of mutators keyed by resource kind
#[derive(Clone, Default)]
pub struct MutationPolicy {
    registry: BTreeMap<ResourceKind, Arc<dyn Mutator>>,
    unconditional: Option<Arc<dyn Mutator>>,
}

impl MutationPolicy {
    /// Create an empty policy that allows everything unchanged
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mutator` for requests declaring `kind`
    pub fn register(mut self, kind: ResourceKind, mutator: Arc<dyn Mutator>) -> Self {
        self.registry.insert(kind, mutator);
        self
    }

    /// A single-purpose policy that runs `mutator` on every request
    pub fn unconditional(mutator: Arc<dyn Mutator>) -> Self {
        Self {
            registry: BTreeMap::new(),
            unconditional: Some(mutator),
        }
    }

    /// Build the policy described by the process configuration
    ///
    /// The Ingress normalizer is registered for `v1` and `v1beta1`, the Pod
    /// injector for `v1`. At least one of them must be configured.
    pub fn from_config(config: &WebhookConfig) -> Result<Self, Error> {
        let mut mutators: Vec<(Vec<ResourceKind>, Arc<dyn Mutator>)> = Vec::new();

        if let Some(suffix) = &config.dns_suffix {
            mutators.push((
                vec![
                    ResourceKind::new("v1", INGRESS_KIND),
                    ResourceKind::new("v1beta1", INGRESS_KIND),
                ],
                Arc::new(IngressHostNormalizer::new(suffix.clone())),
            ));
        }
        if let Some(sidecar) = &config.sidecar {
            mutators.push((
                vec![ResourceKind::new("v1", POD_KIND)],
                Arc::new(PodSidecarInjector::new(Arc::clone(sidecar))),
            ));
        }

        if config.unconditional {
            return match mutators.pop() {
                Some((_, mutator)) if mutators.is_empty() => {
                    info!(mutator = mutator.name(), "Running single policy for every request");
                    Ok(Self::unconditional(mutator))
                }
                Some(_) => Err(Error::config(
                    "unconditional mode requires exactly one mutation policy",
                )),
                None => Err(Error::config("no mutation policy configured")),
            };
        }

        if mutators.is_empty() {
            return Err(Error::config(
                "no mutation policy configured: set --dns-suffix or --sidecar-config",
            ));
        }

        let mut policy = Self::new();
        for (kinds, mutator) in mutators {
            for kind in kinds {
                info!(kind = %kind, mutator = mutator.name(), "Registered mutation policy");
                policy = policy.register(kind, Arc::clone(&mutator));
            }
        }
        Ok(policy)
    }

    /// The mutator that handles `kind`, if any
    pub fn mutator_for(&self, kind: &ResourceKind) -> Option<&Arc<dyn Mutator>> {
        self.unconditional
            .as_ref()
            .or_else(|| self.registry.get(kind))
    }

    /// Decide the admission response for a decoded request
    pub fn admit(&self, request: &ReviewRequest) -> AdmissionResponse {
        let response = request.allow();
        let kind = ResourceKind::of(request);
        let uid = &request.uid;

        let Some(mutator) = self.mutator_for(&kind) else {
            debug!(uid = %uid, kind = %kind, "No mutation policy for kind, allowing unchanged");
            return response;
        };

        let Some(object) = &request.object else {
            debug!(uid = %uid, kind = %kind, "No object in request, allowing unchanged");
            return response;
        };

        let patch = match mutator.mutate(request, object) {
            Ok(patch) => patch,
            Err(e) => {
                warn!(uid = %uid, kind = %kind, mutator = mutator.name(), error = %e, "Mutation failed, allowing without patch");
                return allowed_with_message(response, e.to_string());
            }
        };

        if patch.is_empty() {
            debug!(uid = %uid, kind = %kind, "Object needs no changes");
            return response;
        }

        if let Ok(bytes) = patch.to_json() {
            debug!(uid = %uid, patch = %String::from_utf8_lossy(&bytes), "Computed patch");
        }

        let patch_ops = patch.len();
        match response.clone().with_patch(patch.into_patch()) {
            Ok(response) => {
                info!(uid = %uid, kind = %kind, mutator = mutator.name(), patch_ops, "Patching object");
                response
            }
            Err(e) => {
                error!(uid = %uid, error = %e, "Failed to serialize patch");
                allowed_with_message(response, format!("patch serialization error: {e}"))
            }
        }
    }
}

/// Attach a status message to a response while keeping it allowed
fn allowed_with_message(response: AdmissionResponse, message: String) -> AdmissionResponse {
    let mut response = response.deny(message);
    response.allowed = true;
    response
}
