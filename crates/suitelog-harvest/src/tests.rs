//! Pipeline tests spanning the kube, bus, and slack boundaries via mocks.

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use suitelog_bus::{BusClient, BusConfig};
use suitelog_kube::{KubeClient, KubeConfig};
use suitelog_slack::{NotifierConfig, SlackClient, SlackConfig, ThreadNotifier};

use super::{run_harvest, run_notify_once, HarvestConfig};

fn kube_client(base_url: &str) -> KubeClient {
    KubeClient::new(KubeConfig {
        api_base: base_url.to_string(),
        bearer_token: "sa-token".to_string(),
        ca_cert_pem: None,
        request_timeout_ms: 2_000,
    })
    .expect("kube client")
}

fn bus_client(base_url: &str) -> BusClient {
    BusClient::new(BusConfig {
        api_base: base_url.to_string(),
        project_id: "proj-1".to_string(),
        access_token: "bus-token".to_string(),
        request_timeout_ms: 2_000,
    })
    .expect("bus client")
}

fn notifier(base_url: &str) -> ThreadNotifier {
    let client = SlackClient::new(SlackConfig {
        api_base: base_url.to_string(),
        bot_token: "xoxb-test".to_string(),
        request_timeout_ms: 2_000,
    })
    .expect("slack client");
    ThreadNotifier::new(
        client,
        NotifierConfig {
            channel_id: "C1".to_string(),
            history_limit: 100,
            settle_delay: Duration::ZERO,
        },
    )
}

fn mock_suite_runs(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/apis/testing.suitelog.dev/v1alpha1/suiteruns");
        then.status(200).json_body(json!({
            "items": [
                {
                    "metadata": {"name": "r0"},
                    "status": {"completionTime": "2026-08-27T09:00:00Z", "results": []}
                },
                {
                    "metadata": {"name": "r1"},
                    "status": {
                        "completionTime": "2026-08-28T10:00:00Z",
                        "results": [{"name": "d1", "status": "succeeded"}]
                    }
                },
                {
                    "metadata": {"name": "r2-running"},
                    "status": {}
                }
            ]
        }));
    });
}

fn mock_nodes(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/nodes");
        then.status(200).json_body(json!({
            "items": [{"spec": {"providerID": "gce://proj/zone/node-1"}}]
        }));
    });
}

#[tokio::test]
async fn harvest_publishes_one_annotated_message_per_pod() {
    let kube_server = MockServer::start();
    let bus_server = MockServer::start();
    mock_suite_runs(&kube_server);
    mock_nodes(&kube_server);
    kube_server.mock(|when, then| {
        when.method(GET).path("/api/v1/pods").query_param(
            "labelSelector",
            "suitelog.dev/created-by-runner=true,suitelog.dev/suite-name=r1",
        );
        then.status(200).json_body(json!({
            "items": [{
                "metadata": {
                    "name": "p1",
                    "namespace": "testing",
                    "labels": {"suitelog.dev/test-def-name": "d1"}
                },
                "spec": {"containers": [{"name": "istio-proxy"}, {"name": "runner"}]}
            }]
        }));
    });
    kube_server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/namespaces/testing/pods/p1/log")
            .query_param("container", "runner");
        then.status(200).body("PASS\n");
    });
    let publish = bus_server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/proj-1/topics/logs:publish")
            // "PASS\n" in base64, annotated with the full attribute set.
            .json_body(json!({
                "messages": [{
                    "data": "UEFTUwo=",
                    "attributes": {
                        "name": "d1",
                        "status": "succeeded",
                        "runName": "r1",
                        "completionTime": "2026-08-28T10:00:00+00:00",
                        "platform": "gcp"
                    }
                }]
            }));
        then.status(200).json_body(json!({"messageIds": ["m-1"]}));
    });

    let report = run_harvest(
        &kube_client(&kube_server.base_url()),
        &bus_client(&bus_server.base_url()),
        "logs",
        &HarvestConfig::default(),
    )
    .await
    .expect("harvest");

    publish.assert();
    assert_eq!(report.run_name, "r1");
    assert_eq!(report.published, 1);
    assert!(report.all_published());
}

#[tokio::test]
async fn harvest_collects_pod_failures_without_aborting_the_batch() {
    let kube_server = MockServer::start();
    let bus_server = MockServer::start();
    mock_suite_runs(&kube_server);
    mock_nodes(&kube_server);
    kube_server.mock(|when, then| {
        when.method(GET).path("/api/v1/pods");
        then.status(200).json_body(json!({
            "items": [
                {
                    "metadata": {"name": "p-unlabeled", "namespace": "testing"},
                    "spec": {"containers": [{"name": "runner"}]}
                },
                {
                    "metadata": {
                        "name": "p1",
                        "namespace": "testing",
                        "labels": {"suitelog.dev/test-def-name": "d1"}
                    },
                    "spec": {"containers": [{"name": "runner"}]}
                }
            ]
        }));
    });
    kube_server.mock(|when, then| {
        when.method(GET).path("/api/v1/namespaces/testing/pods/p1/log");
        then.status(200).body("PASS\n");
    });
    let publish = bus_server.mock(|when, then| {
        when.method(POST).path("/v1/projects/proj-1/topics/logs:publish");
        then.status(200).json_body(json!({"messageIds": ["m-1"]}));
    });

    let report = run_harvest(
        &kube_client(&kube_server.base_url()),
        &bus_client(&bus_server.base_url()),
        "logs",
        &HarvestConfig::default(),
    )
    .await
    .expect("harvest");

    assert_eq!(report.published, 1);
    assert_eq!(publish.hits(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].pod, "p-unlabeled");
    assert!(report.failures[0].error.contains("suitelog.dev/test-def-name"));
}

#[tokio::test]
async fn harvest_fails_when_no_run_has_completed() {
    let kube_server = MockServer::start();
    let bus_server = MockServer::start();
    kube_server.mock(|when, then| {
        when.method(GET)
            .path("/apis/testing.suitelog.dev/v1alpha1/suiteruns");
        then.status(200).json_body(json!({
            "items": [{"metadata": {"name": "r1"}, "status": {}}]
        }));
    });

    let error = run_harvest(
        &kube_client(&kube_server.base_url()),
        &bus_client(&bus_server.base_url()),
        "logs",
        &HarvestConfig::default(),
    )
    .await
    .expect_err("nothing completed");
    assert!(error.to_string().contains("no suite run has completed yet"));
}

#[tokio::test]
async fn notify_once_acks_only_delivered_messages() {
    let bus_server = MockServer::start();
    let slack_server = MockServer::start();

    bus_server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/proj-1/subscriptions/logs-sub:pull");
        then.status(200).json_body(json!({
            "receivedMessages": [
                {
                    "ackId": "ack-good",
                    "message": {
                        "data": "UEFTUwo=",
                        "attributes": {
                            "name": "d1",
                            "status": "succeeded",
                            "runName": "r1",
                            "completionTime": "T",
                            "platform": "gcp"
                        },
                        "messageId": "m-1"
                    }
                },
                {
                    "ackId": "ack-bad",
                    "message": {"data": "UEFTUwo=", "messageId": "m-2"}
                }
            ]
        }));
    });
    let ack = bus_server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/proj-1/subscriptions/logs-sub:acknowledge")
            .json_body(json!({"ackIds": ["ack-good"]}));
        then.status(200).json_body(json!({}));
    });

    slack_server.mock(|when, then| {
        when.method(GET).path("/conversations.history");
        then.status(200).json_body(json!({"ok": true, "messages": []}));
    });
    slack_server.mock(|when, then| {
        when.method(POST).path("/chat.postMessage");
        then.status(200).json_body(json!({"ok": true, "ts": "50.0"}));
    });
    slack_server.mock(|when, then| {
        when.method(POST).path("/files.getUploadURLExternal");
        then.status(200).json_body(json!({
            "ok": true,
            "upload_url": slack_server.url("/upload-raw"),
            "file_id": "F1"
        }));
    });
    slack_server.mock(|when, then| {
        when.method(POST).path("/upload-raw");
        then.status(200).body("OK");
    });
    slack_server.mock(|when, then| {
        when.method(POST).path("/files.completeUploadExternal");
        then.status(200).json_body(json!({"ok": true}));
    });

    let report = run_notify_once(
        &bus_client(&bus_server.base_url()),
        "logs-sub",
        &notifier(&slack_server.base_url()),
        10,
    )
    .await
    .expect("notify once");

    ack.assert();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.notified, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn notify_once_skips_undecodable_payloads_without_losing_the_batch() {
    let bus_server = MockServer::start();
    let slack_server = MockServer::start();

    bus_server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/proj-1/subscriptions/logs-sub:pull");
        then.status(200).json_body(json!({
            "receivedMessages": [
                {
                    "ackId": "ack-poisoned",
                    "message": {
                        "data": "not//valid!!",
                        "attributes": {
                            "name": "d1",
                            "status": "succeeded",
                            "runName": "r1",
                            "completionTime": "T",
                            "platform": "gcp"
                        },
                        "messageId": "m-1"
                    }
                },
                {
                    "ackId": "ack-good",
                    "message": {
                        "data": "UEFTUwo=",
                        "attributes": {
                            "name": "d2",
                            "status": "succeeded",
                            "runName": "r1",
                            "completionTime": "T",
                            "platform": "gcp"
                        },
                        "messageId": "m-2"
                    }
                }
            ]
        }));
    });
    let ack = bus_server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/proj-1/subscriptions/logs-sub:acknowledge")
            .json_body(json!({"ackIds": ["ack-good"]}));
        then.status(200).json_body(json!({}));
    });

    let history = slack_server.mock(|when, then| {
        when.method(GET).path("/conversations.history");
        then.status(200).json_body(json!({"ok": true, "messages": []}));
    });
    slack_server.mock(|when, then| {
        when.method(POST).path("/chat.postMessage");
        then.status(200).json_body(json!({"ok": true, "ts": "50.0"}));
    });
    slack_server.mock(|when, then| {
        when.method(POST).path("/files.getUploadURLExternal");
        then.status(200).json_body(json!({
            "ok": true,
            "upload_url": slack_server.url("/upload-raw"),
            "file_id": "F1"
        }));
    });
    slack_server.mock(|when, then| {
        when.method(POST).path("/upload-raw");
        then.status(200).body("OK");
    });
    slack_server.mock(|when, then| {
        when.method(POST).path("/files.completeUploadExternal");
        then.status(200).json_body(json!({"ok": true}));
    });

    let report = run_notify_once(
        &bus_client(&bus_server.base_url()),
        "logs-sub",
        &notifier(&slack_server.base_url()),
        10,
    )
    .await
    .expect("notify once");

    // The valid message still reaches Slack and gets acknowledged; the
    // corrupt one stays on the subscription for redelivery.
    assert_eq!(history.hits(), 1);
    ack.assert();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.notified, 1);
    assert_eq!(report.failed, 1);
}
