//! Webhook stories
//!
//! - `ingress`: TLS host normalization as seen through `POST /mutate`
//! - `sidecar`: Pod sidecar injection, including loading the sidecar file

mod ingress;
mod sidecar;

use std::sync::Arc;

use admission_mutator::config::WebhookConfig;
use admission_mutator::mutation::MutationPolicy;
use admission_mutator::webhook::{webhook_router, WebhookState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Build the router the binary would serve for `config`
pub fn router(config: &WebhookConfig) -> axum::Router {
    let policy = MutationPolicy::from_config(config).unwrap();
    webhook_router(Arc::new(WebhookState::new(policy)))
}

/// An AdmissionReview request body for `object`
pub fn review(uid: &str, kind: Value, resource: &str, object: Value) -> Vec<u8> {
    let name = object["metadata"]["name"].clone();
    serde_json::to_vec(&json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": uid,
            "kind": kind,
            "resource": {"group": kind["group"], "version": kind["version"], "resource": resource},
            "name": name,
            "namespace": "default",
            "operation": "CREATE",
            "userInfo": {"username": "system:serviceaccount:kube-system:replicaset-controller"},
            "object": object,
            "oldObject": null,
            "dryRun": false
        }
    }))
    .unwrap()
}

/// POST a review body and return the decoded AdmissionReview response
pub async fn mutate(router: axum::Router, body: Vec<u8>) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri("/mutate")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Raw JSON Patch bytes carried by a response review
pub fn patch_bytes(review: &Value) -> Vec<u8> {
    let encoded = review["response"]["patch"]
        .as_str()
        .expect("patch should be a base64 string");
    STANDARD.decode(encoded).unwrap()
}

/// JSON Patch carried by a response review
pub fn patch(review: &Value) -> Value {
    serde_json::from_slice(&patch_bytes(review)).unwrap()
}
