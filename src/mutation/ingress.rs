//! Ingress TLS host normalization
//!
//! Every TLS block of an Ingress must end up with a non-empty list of
//! fully-qualified host names. Missing hosts are synthesized as
//! `{ingress-name}.{dns-suffix}`; short names are qualified with the suffix.
//!
//! Only `metadata` and `spec.tls` are decoded, so the same normalizer serves
//! `extensions/v1beta1`, `networking.k8s.io/v1beta1` and `networking.k8s.io/v1`
//! Ingresses: the TLS block shape is identical across them.

use k8s_openapi::api::networking::v1::IngressTLS;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::object::decode_object;
use super::patch::{pointer, PatchBuilder};
use super::{MutationError, Mutator};
use crate::webhook::review::ReviewRequest;

/// Kind name matched by the dispatcher
pub const INGRESS_KIND: &str = "Ingress";

/// Maximum length of a single DNS label
const MAX_LABEL_LEN: usize = 63;

/// The subset of an Ingress the normalizer reads
#[derive(Debug, Default, Deserialize)]
pub struct IngressObject {
    /// Object metadata; `name` feeds host synthesis
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Ingress spec, reduced to its TLS blocks
    #[serde(default)]
    pub spec: Option<IngressTlsSpec>,
}

/// `spec` of an Ingress, reduced to the TLS blocks
#[derive(Debug, Default, Deserialize)]
pub struct IngressTlsSpec {
    /// TLS blocks in declaration order
    #[serde(default)]
    pub tls: Option<Vec<IngressTLS>>,
}

/// Rewrites missing or unqualified TLS hosts toward `{name}.{suffix}` form
#[derive(Debug, Clone)]
pub struct IngressHostNormalizer {
    dns_suffix: String,
}

impl IngressHostNormalizer {
    /// Create a normalizer for an already-normalized DNS suffix (no leading
    /// or trailing dot)
    pub fn new(dns_suffix: impl Into<String>) -> Self {
        Self {
            dns_suffix: dns_suffix.into(),
        }
    }

    /// The configured DNS suffix
    pub fn dns_suffix(&self) -> &str {
        &self.dns_suffix
    }

    /// Host used when a TLS block names no host at all
    pub fn synthesize_host(&self, ingress_name: &str) -> String {
        format!("{}.{}", ingress_name, self.dns_suffix)
    }

    /// Qualify a short host name with the DNS suffix
    pub fn qualify_host(&self, host: &str) -> String {
        let mut qualified = host.to_string();
        if !qualified.ends_with('.') {
            qualified.push('.');
        }
        qualified.push_str(&self.dns_suffix);
        qualified
    }

    /// True when `host` already ends in the configured suffix
    ///
    /// Catches hosts this normalizer qualified earlier whose leading labels
    /// still fail [`is_fqdn`], such as `foo_bar.example.com`.
    pub fn has_suffix(&self, host: &str) -> bool {
        host.strip_suffix('.')
            .unwrap_or(host)
            .strip_suffix(self.dns_suffix.as_str())
            .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.'))
    }

    /// Compute the patch for a set of TLS blocks
    ///
    /// Indices in every emitted path refer to the blocks and hosts exactly as
    /// given; nothing is reordered or removed.
    pub fn normalize(&self, ingress_name: Option<&str>, tls: &[IngressTLS]) -> PatchBuilder {
        let mut patch = PatchBuilder::new();
        let synthesized = ingress_name.map(|name| self.synthesize_host(name));

        for (tls_index, block) in tls.iter().enumerate() {
            let tls_index = tls_index.to_string();
            let secret = block.secret_name.as_deref().unwrap_or_default();

            let hosts = match &block.hosts {
                Some(hosts) if !hosts.is_empty() => hosts,
                missing => {
                    let Some(host) = &synthesized else {
                        warn!(secret = %secret, "TLS block has no hosts and the ingress has no name, leaving it unchanged");
                        continue;
                    };
                    debug!(secret = %secret, host = %host, "No hosts for TLS block");
                    let path = pointer(["spec", "tls", tls_index.as_str(), "hosts"]);
                    // replace needs an existing member; a missing key is added instead
                    if missing.is_some() {
                        patch.replace(path, json!([host]));
                    } else {
                        patch.add(path, json!([host]));
                    }
                    continue;
                }
            };

            for (host_index, host) in hosts.iter().enumerate() {
                let host_index = host_index.to_string();
                let path = pointer(["spec", "tls", tls_index.as_str(), "hosts", host_index.as_str()]);

                if host.is_empty() {
                    let Some(synthesized) = &synthesized else {
                        warn!(secret = %secret, "Empty TLS host and the ingress has no name, leaving it unchanged");
                        continue;
                    };
                    debug!(secret = %secret, host = %synthesized, "Replacing empty TLS host");
                    patch.replace(path, json!(synthesized));
                } else if is_fqdn(host) || self.has_suffix(host) {
                    debug!(host = %host, "TLS host is already fully qualified");
                } else {
                    let qualified = self.qualify_host(host);
                    info!(host = %host, qualified = %qualified, "Qualifying TLS host");
                    patch.replace(path, json!(qualified));
                }
            }
        }

        patch
    }
}

impl Mutator for IngressHostNormalizer {
    fn name(&self) -> &'static str {
        "ingress-host-normalizer"
    }

    fn mutate(
        &self,
        request: &ReviewRequest,
        object: &Value,
    ) -> Result<PatchBuilder, MutationError> {
        let ingress: IngressObject = decode_object(object, INGRESS_KIND)?;

        // metadata.name is unset for generateName creates; fall back to the request
        let name = ingress
            .metadata
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(Some(request.name.as_str()).filter(|name| !name.is_empty()));

        let tls = ingress.spec.and_then(|spec| spec.tls).unwrap_or_default();
        debug!(uid = %request.uid, ingress = ?name, tls_blocks = tls.len(), "Parsed ingress");

        Ok(self.normalize(name, &tls))
    }
}

/// Syntactic check for a fully-qualified domain name
///
/// At least two dot-separated labels; the last one must look like a TLD
/// (starts with a letter, alphanumeric). A single trailing root dot and a
/// leading `*.` wildcard label are accepted.
pub fn is_fqdn(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    let host = host.strip_prefix("*.").unwrap_or(host);

    let labels: Vec<&str> = host.split('.').collect();
    match labels.split_last() {
        Some((tld, rest)) if !rest.is_empty() => {
            rest.iter().all(|label| is_label(label)) && is_tld(tld)
        }
        _ => false,
    }
}

fn is_label(label: &str) -> bool {
    let mut chars = label.chars();
    label.len() <= MAX_LABEL_LEN
        && chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_tld(label: &str) -> bool {
    let mut chars = label.chars();
    label.len() <= MAX_LABEL_LEN
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}
