use crate::{channel, Controller, ControllerMetrics, StatusCache, Update, VsMetadata};
use chrono::{DateTime, Utc};
use http::{Method, Request, Response, StatusCode};
use kube::client::Body;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle, time::Duration};
use tower_test::mock;
use vsync_controller_core::ResourceId;
use vsync_controller_k8s_api::{self as k8s, HostRuleSpec, RuleStatus, VirtualHost};

const TEST_HOSTNAME: &str = "test";

type Handle = mock::Handle<Request<Body>, Response<Body>>;

struct Harness {
    updates: crate::Sender,
    api: Handle,
    cache: Arc<StatusCache>,
    metrics: ControllerMetrics,
    task: JoinHandle<()>,
    _claims: watch::Sender<Arc<kubert::lease::Claim>>,
}

impl Harness {
    fn spawn(holder: &str, patch_timeout: Duration) -> Self {
        let claim = kubert::lease::Claim {
            holder: holder.to_string(),
            expiry: DateTime::<Utc>::MAX_UTC,
        };
        let (claims_tx, claims_rx) = watch::channel(Arc::new(claim));
        let (service, api) = mock::pair::<Request<Body>, Response<Body>>();
        let client = k8s::Client::new(service, "default");
        let (updates, updates_rx) = channel(8);
        let cache = StatusCache::shared();
        let metrics = ControllerMetrics::default();

        let controller = Controller::new(
            claims_rx,
            client,
            TEST_HOSTNAME,
            updates_rx,
            patch_timeout,
            cache.clone(),
            metrics.clone(),
        )
        .with_retry_backoff(Duration::from_millis(10));

        Self {
            updates,
            api,
            cache,
            metrics,
            task: tokio::spawn(controller.run()),
            _claims: claims_tx,
        }
    }

    async fn send(&self, update: Update) {
        self.updates.send(update).await.expect("controller must be running");
    }

    async fn next_request(&mut self) -> (Request<Body>, mock::SendResponse<Response<Body>>) {
        tokio::time::timeout(Duration::from_secs(5), self.api.next_request())
            .await
            .expect("request must be issued")
            .expect("client must be alive")
    }

    /// Closes the update queue and waits for the controller to finish, returning whether any
    /// further request was issued.
    async fn finish(self) -> bool {
        let Self {
            updates,
            mut api,
            task,
            ..
        } = self;
        drop(updates);
        task.await.expect("controller must not panic");
        api.next_request().await.is_some()
    }
}

fn json_response(status: StatusCode, body: &impl Serialize) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("must serialize")))
        .expect("valid response")
}

fn error_response(code: u16) -> Response<Body> {
    json_response(
        StatusCode::from_u16(code).expect("valid status"),
        &json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "test failure",
            "reason": "Test",
            "code": code,
        }),
    )
}

fn mk_ingress(resource_version: &str) -> k8s::Ingress {
    serde_json::from_value(json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": {
            "namespace": "ns-0",
            "name": "ing-0",
            "resourceVersion": resource_version,
        },
        "spec": {
            "rules": [{ "host": "a.com" }],
        },
    }))
    .expect("valid Ingress")
}

fn mk_host_rule() -> k8s::HostRule {
    let mut rule = k8s::HostRule::new(
        "hr1",
        HostRuleSpec {
            virtual_host: VirtualHost {
                fqdn: "a.com".to_string(),
            },
        },
    );
    rule.metadata.namespace = Some("ns-0".to_string());
    rule
}

fn ingress_update() -> (ResourceId, VsMetadata, Update) {
    let id = ResourceId::new("ns-0", "ing-0");
    let metadata = VsMetadata {
        vip: "10.0.0.1".to_string(),
        hostnames: vec!["a.com".to_string()],
    };
    let update = Update::Ingress {
        id: id.clone(),
        vip: metadata.vip.clone(),
        hostnames: metadata.hostnames.clone(),
    };
    (id, metadata, update)
}

fn host_rule_update(status: RuleStatus) -> Update {
    Update::HostRule {
        id: ResourceId::new("ns-0", "hr1"),
        status,
    }
}

const INGRESS_PATH: &str = "/apis/networking.k8s.io/v1/namespaces/ns-0/ingresses/ing-0";
const HOST_RULE_STATUS_PATH: &str = "/apis/vsync.io/v1alpha1/namespaces/ns-0/hostrules/hr1/status";

#[tokio::test]
async fn ingress_status_is_written_then_cached() {
    let mut h = Harness::spawn(TEST_HOSTNAME, Duration::from_secs(5));
    let (id, metadata, update) = ingress_update();
    h.send(update).await;

    let (req, rsp) = h.next_request().await;
    assert_eq!(req.method(), Method::GET);
    assert_eq!(req.uri().path(), INGRESS_PATH);
    rsp.send_response(json_response(StatusCode::OK, &mk_ingress("7")));

    let (req, rsp) = h.next_request().await;
    assert_eq!(req.method(), Method::PATCH);
    assert_eq!(req.uri().path(), format!("{INGRESS_PATH}/status"));
    let body = req
        .into_body()
        .collect_bytes()
        .await
        .expect("body must be readable");
    let patch: serde_json::Value = serde_json::from_slice(&body).expect("patch must be JSON");
    assert_eq!(
        patch,
        json!({
            "metadata": { "resourceVersion": "7" },
            "status": { "loadBalancer": { "ingress": [{ "ip": "10.0.0.1", "hostname": "a.com" }] } },
        })
    );
    assert_eq!(h.cache.get(&id), None, "cache must only be written after the patch");
    rsp.send_response(json_response(StatusCode::OK, &mk_ingress("8")));

    let cache = h.cache.clone();
    let metrics = h.metrics.clone();
    assert!(!h.finish().await);
    assert_eq!(cache.get(&id), Some(metadata));
    assert_eq!(metrics.patch_succeeded.get(), 1);
}

#[tokio::test]
async fn synced_ingress_status_is_skipped() {
    let h = Harness::spawn(TEST_HOSTNAME, Duration::from_secs(5));
    let (id, metadata, update) = ingress_update();
    h.cache.save(&id, metadata);
    h.send(update).await;

    let metrics = h.metrics.clone();
    assert!(!h.finish().await, "no request may be issued");
    assert_eq!(metrics.patch_skipped.get(), 1);
}

#[tokio::test]
async fn failed_write_is_not_cached() {
    let mut h = Harness::spawn(TEST_HOSTNAME, Duration::from_secs(5));
    let (id, _, update) = ingress_update();
    h.send(update).await;

    let (_, rsp) = h.next_request().await;
    rsp.send_response(json_response(StatusCode::OK, &mk_ingress("7")));
    let (_, rsp) = h.next_request().await;
    rsp.send_response(error_response(500));

    let cache = h.cache.clone();
    let metrics = h.metrics.clone();
    assert!(!h.finish().await, "server errors are not retried");
    assert_eq!(cache.get(&id), None);
    assert_eq!(metrics.patch_failed.get(), 1);
    assert_eq!(metrics.patch_retried.get(), 0);
}

#[tokio::test]
async fn updates_are_dropped_without_the_lease() {
    let h = Harness::spawn("other", Duration::from_secs(5));
    h.send(host_rule_update(RuleStatus::accepted())).await;

    let metrics = h.metrics.clone();
    assert!(!h.finish().await, "no request may be issued");
    assert_eq!(metrics.patch_dropped.get(), 1);
}

#[tokio::test]
async fn conflicting_rule_status_is_retried() {
    let mut h = Harness::spawn(TEST_HOSTNAME, Duration::from_secs(5));
    h.send(host_rule_update(RuleStatus::accepted())).await;

    let (req, rsp) = h.next_request().await;
    assert_eq!(req.method(), Method::PATCH);
    assert_eq!(req.uri().path(), HOST_RULE_STATUS_PATH);
    rsp.send_response(error_response(409));

    let (req, rsp) = h.next_request().await;
    assert_eq!(req.uri().path(), HOST_RULE_STATUS_PATH);
    rsp.send_response(json_response(StatusCode::OK, &mk_host_rule()));

    let metrics = h.metrics.clone();
    assert!(!h.finish().await);
    assert_eq!(metrics.patch_failed.get(), 1);
    assert_eq!(metrics.patch_retried.get(), 1);
    assert_eq!(metrics.patch_succeeded.get(), 1);
}

#[tokio::test]
async fn newer_update_supersedes_retry() {
    let mut h = Harness::spawn(TEST_HOSTNAME, Duration::from_secs(5));
    h.send(host_rule_update(RuleStatus::accepted())).await;
    let (_, rsp) = h.next_request().await;
    rsp.send_response(error_response(409));

    // The newer update may land before or after the first retry is issued, but once it has been
    // written the older status must never be written again.
    h.send(host_rule_update(RuleStatus::rejected("fqdn is taken")))
        .await;
    let mut wrote_rejection = false;
    while !wrote_rejection {
        let (req, rsp) = h.next_request().await;
        let body = req
            .into_body()
            .collect_bytes()
            .await
            .expect("body must be readable");
        let patch: serde_json::Value = serde_json::from_slice(&body).expect("patch must be JSON");
        wrote_rejection = patch["status"]["status"] == "Rejected";
        rsp.send_response(json_response(StatusCode::OK, &mk_host_rule()));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!h.finish().await, "the older status must not be retried");
}

#[tokio::test]
async fn slow_writes_time_out_and_are_retried() {
    let mut h = Harness::spawn(TEST_HOSTNAME, Duration::from_millis(50));
    h.send(host_rule_update(RuleStatus::accepted())).await;

    // Never answered.
    let (_, _stalled) = h.next_request().await;

    let (req, rsp) = h.next_request().await;
    assert_eq!(req.uri().path(), HOST_RULE_STATUS_PATH);
    rsp.send_response(json_response(StatusCode::OK, &mk_host_rule()));

    let metrics = h.metrics.clone();
    assert!(!h.finish().await);
    assert_eq!(metrics.patch_timeout.get(), 1);
    assert_eq!(metrics.patch_retried.get(), 1);
    assert_eq!(metrics.patch_succeeded.get(), 1);
}
