//! Stories about Pod sidecar injection

use std::io::Write;

use admission_mutator::config::WebhookConfig;
use serde_json::{json, Value};

use super::{mutate, patch, review, router};

const SIDECARS: &str = r#"
containers:
  - name: a
    image: registry.example.com/a:1.0
  - name: b
    image: registry.example.com/b:1.0
    args: ["--verbose"]
volumes:
  - name: shared
    emptyDir: {}
annotations:
  sidecar-injector.example.com/status: injected
"#;

fn config_from(yaml: &str) -> (WebhookConfig, tempfile::NamedTempFile) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    let config = WebhookConfig::load(None, Some(file.path()), false).unwrap();
    (config, file)
}

fn pod_review(uid: &str, spec: Value, annotations: Option<Value>) -> Vec<u8> {
    let mut metadata = json!({"name": "web", "namespace": "default"});
    if let Some(annotations) = annotations {
        metadata["annotations"] = annotations;
    }
    review(
        uid,
        json!({"group": "", "version": "v1", "kind": "Pod"}),
        "pods",
        json!({"apiVersion": "v1", "kind": "Pod", "metadata": metadata, "spec": spec}),
    )
}

/// Story: a pod with no containers gets A as a singleton list, then B appended
#[tokio::test]
async fn story_bare_pod_gets_both_sidecars() {
    let (config, _file) = config_from(
        "containers:\n  - name: a\n    image: a:1\n  - name: b\n    image: b:1\n",
    );

    let response = mutate(
        router(&config),
        pod_review("uid-bare", json!({"containers": []}), None),
    )
    .await;

    assert_eq!(response["response"]["uid"], "uid-bare");
    assert_eq!(
        patch(&response),
        json!([
            {"op": "add", "path": "/spec/containers", "value": [{"name": "a", "image": "a:1"}]},
            {"op": "add", "path": "/spec/containers/-", "value": {"name": "b", "image": "b:1"}},
        ])
    );
}

/// Story: a running workload gets sidecars appended, volumes and status added
#[tokio::test]
async fn story_workload_pod_gets_full_sidecar_set() {
    let (config, _file) = config_from(SIDECARS);

    let response = mutate(
        router(&config),
        pod_review(
            "uid-app",
            json!({"containers": [{"name": "app", "image": "nginx:1.25"}]}),
            None,
        ),
    )
    .await;

    let ops = patch(&response);
    let paths: Vec<&str> = ops
        .as_array()
        .unwrap()
        .iter()
        .map(|op| op["path"].as_str().unwrap())
        .collect();

    assert_eq!(
        paths,
        vec![
            "/spec/containers/-",
            "/spec/containers/-",
            "/spec/volumes",
            "/metadata/annotations",
        ]
    );
    assert_eq!(ops[1]["value"]["args"], json!(["--verbose"]));
    assert_eq!(ops[2]["value"], json!([{"name": "shared", "emptyDir": {}}]));
    assert_eq!(
        ops[3]["value"],
        json!({"sidecar-injector.example.com/status": "injected"})
    );
}

/// Story: re-admitting an injected pod replaces the status annotation
#[tokio::test]
async fn story_existing_annotation_is_replaced() {
    let (config, _file) = config_from(
        "annotations:\n  sidecar-injector.example.com/status: injected\n",
    );

    let response = mutate(
        router(&config),
        pod_review(
            "uid-again",
            json!({"containers": [{"name": "app", "image": "nginx"}]}),
            Some(json!({"sidecar-injector.example.com/status": "pending"})),
        ),
    )
    .await;

    assert_eq!(
        patch(&response),
        json!([{
            "op": "replace",
            "path": "/metadata/annotations/sidecar-injector.example.com~1status",
            "value": "injected"
        }])
    );
}

/// Story: a single-purpose injector mutates whatever the API server sends
#[tokio::test]
async fn story_unconditional_injector_ignores_declared_kind() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"containers:\n  - name: a\n    image: a:1\n").unwrap();
    let config = WebhookConfig::load(None, Some(file.path()), true).unwrap();

    let body = review(
        "uid-any",
        json!({"group": "", "version": "v1beta1", "kind": "PodLike"}),
        "pods",
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web"},
            "spec": {"containers": [{"name": "app", "image": "nginx"}]}
        }),
    );

    let response = mutate(router(&config), body).await;
    assert_eq!(
        patch(&response),
        json!([{"op": "add", "path": "/spec/containers/-", "value": {"name": "a", "image": "a:1"}}])
    );
}

/// Story: a pod with unreadable labels is admitted unchanged, with the reason
#[tokio::test]
async fn story_pod_with_bad_labels_is_admitted() {
    let (config, _file) = config_from(SIDECARS);

    let body = review(
        "uid-labels",
        json!({"group": "", "version": "v1", "kind": "Pod"}),
        "pods",
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web", "labels": {"a": 1}},
            "spec": {"containers": [{"name": "app", "image": "nginx"}]}
        }),
    );

    let response = mutate(router(&config), body).await;

    assert_eq!(response["apiVersion"], "admission.k8s.io/v1");
    assert_eq!(response["response"]["uid"], "uid-labels");
    assert_eq!(response["response"]["allowed"], true);
    assert!(response["response"]["patch"].is_null());
    assert!(response["response"]["status"]["message"]
        .as_str()
        .unwrap()
        .contains("failed to decode Pod"));
}
