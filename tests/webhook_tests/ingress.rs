//! Stories about Ingress TLS host normalization

use admission_mutator::config::WebhookConfig;
use serde_json::{json, Value};

use super::{mutate, patch, patch_bytes, review, router};

fn config() -> WebhookConfig {
    WebhookConfig::load(Some("example.com"), None, false).unwrap()
}

fn ingress(api_version: &str, name: &str, tls: Value) -> Value {
    json!({
        "apiVersion": api_version,
        "kind": "Ingress",
        "metadata": {"name": name, "namespace": "default"},
        "spec": {"tls": tls}
    })
}

fn ingress_kind(group: &str, version: &str) -> Value {
    json!({"group": group, "version": version, "kind": "Ingress"})
}

/// Story: an empty host on the `cafe` ingress becomes `cafe.example.com`
#[tokio::test]
async fn story_empty_host_is_derived_from_ingress_name() {
    let body = review(
        "uid-cafe",
        ingress_kind("networking.k8s.io", "v1"),
        "ingresses",
        ingress(
            "networking.k8s.io/v1",
            "cafe",
            json!([{"secretName": "cafe-tls", "hosts": [""]}]),
        ),
    );

    let response = mutate(router(&config()), body).await;

    assert_eq!(response["response"]["uid"], "uid-cafe");
    assert_eq!(response["response"]["allowed"], true);
    assert_eq!(response["response"]["patchType"], "JSONPatch");
    assert_eq!(
        String::from_utf8(patch_bytes(&response)).unwrap(),
        r#"[{"op":"replace","path":"/spec/tls/0/hosts/0","value":"cafe.example.com"}]"#
    );
}

/// Story: legacy extensions/v1beta1 ingresses are normalized too
#[tokio::test]
async fn story_v1beta1_ingress_gets_hosts() {
    let mut object = ingress(
        "extensions/v1beta1",
        "tea",
        json!([{"secretName": "tea-tls", "hosts": []}, {"secretName": "other", "hosts": ["shop"]}]),
    );
    object["spec"]["rules"] = json!([{
        "http": {"paths": [{"path": "/", "backend": {"serviceName": "tea-svc", "servicePort": 80}}]}
    }]);

    let response = mutate(
        router(&config()),
        review("uid-tea", ingress_kind("extensions", "v1beta1"), "ingresses", object),
    )
    .await;

    assert_eq!(
        patch(&response),
        json!([
            {"op": "replace", "path": "/spec/tls/0/hosts", "value": ["tea.example.com"]},
            {"op": "replace", "path": "/spec/tls/1/hosts/0", "value": "shop.example.com"},
        ])
    );
}

/// Story: an ingress that is already fully qualified passes untouched
#[tokio::test]
async fn story_qualified_ingress_passes_untouched() {
    let body = review(
        "uid-ok",
        ingress_kind("networking.k8s.io", "v1"),
        "ingresses",
        ingress(
            "networking.k8s.io/v1",
            "cafe",
            json!([{"secretName": "cafe-tls", "hosts": ["cafe.example.com", "*.shop.example.org"]}]),
        ),
    );

    let response = mutate(router(&config()), body).await;

    assert_eq!(response["response"]["allowed"], true);
    assert!(response["response"]["patch"].is_null());
}

/// Story: a malformed ingress is still allowed, with the reason attached
#[tokio::test]
async fn story_malformed_ingress_allowed_with_message() {
    let body = review(
        "uid-bad",
        ingress_kind("networking.k8s.io", "v1"),
        "ingresses",
        ingress("networking.k8s.io/v1", "cafe", json!({"hosts": "nope"})),
    );

    let response = mutate(router(&config()), body).await;

    assert_eq!(response["response"]["uid"], "uid-bad");
    assert_eq!(response["response"]["allowed"], true);
    assert!(response["response"]["patch"].is_null());
    assert!(response["response"]["status"]["message"]
        .as_str()
        .unwrap()
        .contains("Ingress"));
}

/// Story: pods are not touched when only the ingress policy runs
#[tokio::test]
async fn story_other_kinds_pass_through() {
    let body = review(
        "uid-pod",
        json!({"group": "", "version": "v1", "kind": "Pod"}),
        "pods",
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web"},
            "spec": {"containers": []}
        }),
    );

    let response = mutate(router(&config()), body).await;

    assert_eq!(response["response"]["uid"], "uid-pod");
    assert_eq!(response["response"]["allowed"], true);
    assert!(response["response"]["patch"].is_null());
}

/// Story: the smallest envelope the API server contract allows still gets
/// its host
#[tokio::test]
async fn story_minimal_envelope_gets_host() {
    let body = serde_json::to_vec(&json!({
        "request": {
            "uid": "u1",
            "kind": {"group": "networking.k8s.io", "version": "v1", "kind": "Ingress"},
            "object": {"metadata": {"name": "cafe"}, "spec": {"tls": [{"hosts": [""]}]}}
        }
    }))
    .unwrap();

    let response = mutate(router(&config()), body).await;

    assert_eq!(response["response"]["uid"], "u1");
    assert_eq!(response["response"]["allowed"], true);
    assert_eq!(
        String::from_utf8(patch_bytes(&response)).unwrap(),
        r#"[{"op":"replace","path":"/spec/tls/0/hosts/0","value":"cafe.example.com"}]"#
    );
}
