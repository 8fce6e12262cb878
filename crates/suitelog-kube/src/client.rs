//! Typed reqwest client for the Kubernetes API server.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use suitelog_model::{SuiteRun, TestResult, TestStatus};
use tokio_util::io::StreamReader;

use crate::log_stream::consume_log_stream;
use crate::pod_target::{ObjectMeta, Pod, PodLogTarget};
use crate::{KubeError, LABEL_CREATED_BY_RUNNER, LABEL_SUITE_NAME};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const SUITE_RUN_LIST_PATH: &str = "/apis/testing.suitelog.dev/v1alpha1/suiteruns";

#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub api_base: String,
    pub bearer_token: String,
    pub ca_cert_pem: Option<Vec<u8>>,
    pub request_timeout_ms: u64,
}

impl KubeConfig {
    /// Builds configuration from the service-account mount inside a pod.
    pub fn in_cluster() -> Result<Self, KubeError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| KubeError::InClusterConfig("KUBERNETES_SERVICE_HOST is not set".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| KubeError::InClusterConfig("KUBERNETES_SERVICE_PORT is not set".into()))?;
        Self::from_service_account(std::path::Path::new(SERVICE_ACCOUNT_DIR), &host, &port)
    }

    pub(crate) fn from_service_account(
        dir: &std::path::Path,
        host: &str,
        port: &str,
    ) -> Result<Self, KubeError> {
        let token_path = dir.join("token");
        let ca_path = dir.join("ca.crt");
        let bearer_token = std::fs::read_to_string(&token_path)
            .map_err(|error| {
                KubeError::InClusterConfig(format!(
                    "failed to read {}: {error}",
                    token_path.display()
                ))
            })?
            .trim()
            .to_string();
        let ca_cert_pem = std::fs::read(&ca_path).map_err(|error| {
            KubeError::InClusterConfig(format!("failed to read {}: {error}", ca_path.display()))
        })?;

        Ok(Self {
            api_base: format!("https://{host}:{port}"),
            bearer_token,
            ca_cert_pem: Some(ca_cert_pem),
            request_timeout_ms: 30_000,
        })
    }
}

#[derive(Clone)]
pub struct KubeClient {
    http: reqwest::Client,
    api_base: String,
    bearer_token: String,
}

impl KubeClient {
    pub fn new(config: KubeConfig) -> Result<Self, KubeError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)));
        if let Some(pem) = &config.ca_cert_pem {
            let certificate = reqwest::Certificate::from_pem(pem)?;
            builder = builder.add_root_certificate(certificate);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token,
        })
    }

    /// Lists suite-run resources across the cluster as an immutable snapshot.
    pub async fn list_suite_runs(&self) -> Result<Vec<SuiteRun>, KubeError> {
        let list: SuiteRunList = self.get_json(SUITE_RUN_LIST_PATH, &[]).await?;
        Ok(list.items.into_iter().map(SuiteRunObject::into_run).collect())
    }

    /// Lists pods created by the suite runner for the named run, across all
    /// namespaces.
    pub async fn list_test_pods(&self, suite_name: &str) -> Result<Vec<Pod>, KubeError> {
        let selector =
            format!("{LABEL_CREATED_BY_RUNNER}=true,{LABEL_SUITE_NAME}={suite_name}");
        let list: PodList = self
            .get_json("/api/v1/pods", &[("labelSelector", selector.as_str())])
            .await?;
        Ok(list.items)
    }

    /// Opens the named container's log stream and consumes it line-safely
    /// into one buffer. The stream handle is dropped on every exit path.
    pub async fn fetch_container_log(
        &self,
        target: &PodLogTarget,
        container: &str,
    ) -> Result<Vec<u8>, KubeError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}/log",
            self.api_base, target.namespace, target.pod_name
        );
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(&[("container", container), ("follow", "false")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| KubeError::StreamOpen {
                pod: target.pod_name.clone(),
                namespace: target.namespace.clone(),
                container: container.to_string(),
                source,
            })?;

        let stream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        consume_log_stream(StreamReader::new(stream))
            .await
            .map_err(|source| KubeError::StreamRead {
                pod: target.pod_name.clone(),
                namespace: target.namespace.clone(),
                source,
            })
    }

    /// Infers the hosting platform from the first node's provider id.
    pub async fn detect_platform(&self) -> Result<String, KubeError> {
        let list: NodeList = self.get_json("/api/v1/nodes", &[]).await?;
        let provider_id = list
            .items
            .first()
            .map(|node| node.spec.provider_id.as_str())
            .unwrap_or_default();
        Ok(platform_from_provider_id(provider_id).to_string())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, KubeError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KubeError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|error| KubeError::InvalidResponse(format!("failed to decode GET {path}: {error}")))
    }
}

fn platform_from_provider_id(provider_id: &str) -> &'static str {
    if provider_id.starts_with("gce://") {
        "gcp"
    } else if provider_id.starts_with("aws://") {
        "aws"
    } else if provider_id.starts_with("azure://") {
        "azure"
    } else {
        "unknown"
    }
}

#[derive(Debug, Deserialize)]
struct SuiteRunList {
    #[serde(default)]
    items: Vec<SuiteRunObject>,
}

#[derive(Debug, Deserialize)]
struct SuiteRunObject {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    status: SuiteRunStatus,
}

impl SuiteRunObject {
    fn into_run(self) -> SuiteRun {
        SuiteRun {
            name: self.metadata.name,
            completion_time: self.status.completion_time,
            results: self
                .status
                .results
                .into_iter()
                .map(|result| TestResult {
                    name: result.name,
                    status: result.status,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuiteRunStatus {
    #[serde(default)]
    completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    results: Vec<SuiteRunResult>,
}

#[derive(Debug, Deserialize)]
struct SuiteRunResult {
    name: String,
    status: TestStatus,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    spec: NodeSpec,
}

#[derive(Debug, Default, Deserialize)]
struct NodeSpec {
    #[serde(default, rename = "providerID")]
    provider_id: String,
}
