//! Admission mutator - mutating admission webhook for Kubernetes
//!
//! The API server calls the webhook synchronously on create/update of a
//! matching resource. The webhook never rejects anything: it answers
//! "allowed", optionally with a JSON Patch rewriting the object.
//!
//! # Policies
//!
//! - Ingress TLS host normalization: every TLS block ends with a non-empty
//!   list of fully-qualified hosts derived from the Ingress name and a DNS
//!   suffix.
//! - Pod sidecar injection: a static set of containers, volumes and
//!   annotations is merged into each Pod.
//!
//! # Modules
//!
//! - [`config`] - Process-wide configuration and sidecar file loading
//! - [`mutation`] - Mutation policies, dispatch and patch building
//! - [`webhook`] - HTTPS server, request handler and review codec
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod mutation;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default HTTPS port for the webhook server
pub const DEFAULT_WEBHOOK_PORT: u16 = 443;

/// Default time allowed for in-flight requests to drain on shutdown
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
