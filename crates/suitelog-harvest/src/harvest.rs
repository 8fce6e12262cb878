//! Publisher-side pipeline: newest completed run to published log messages.

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use suitelog_bus::{BusClient, LogMessage, MessageAttributes};
use suitelog_kube::{KubeClient, Pod, PodLogTarget};
use suitelog_model::{select_newest_completed, SuiteRun};

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Container names excluded as infrastructure sidecars.
    pub infra_containers: Vec<String>,
    /// Upper bound on pods harvested concurrently.
    pub max_concurrency: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            infra_containers: vec!["istio-proxy".to_string()],
            max_concurrency: 4,
        }
    }
}

#[derive(Debug)]
pub struct PodFailure {
    pub pod: String,
    pub namespace: String,
    pub error: String,
}

#[derive(Debug)]
pub struct HarvestReport {
    pub run_name: String,
    pub published: usize,
    pub failures: Vec<PodFailure>,
}

impl HarvestReport {
    pub fn all_published(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Harvests every test pod of the newest completed suite run and publishes
/// one log message per pod.
///
/// Pod-level failures do not abort the batch: each is recorded in the report
/// and the remaining pods still publish. Nothing eligible to select is fatal.
pub async fn run_harvest(
    kube: &KubeClient,
    bus: &BusClient,
    topic_id: &str,
    config: &HarvestConfig,
) -> Result<HarvestReport> {
    let runs = kube
        .list_suite_runs()
        .await
        .context("while listing suite runs")?;
    let run = select_newest_completed(&runs)?;
    tracing::info!(run = %run.name, "selected newest completed suite run");

    let platform = kube
        .detect_platform()
        .await
        .context("while detecting hosting platform")?;
    let completion_time = run
        .completion_time
        .map(|time| time.to_rfc3339())
        .unwrap_or_default();

    let pods = kube
        .list_test_pods(&run.name)
        .await
        .with_context(|| format!("while listing test pods for run {}", run.name))?;
    tracing::info!(run = %run.name, pods = pods.len(), platform = %platform, "listing test pods");

    let mut outcomes = stream::iter(pods.iter())
        .map(|pod| {
            let platform = platform.as_str();
            let completion_time = completion_time.as_str();
            async move {
                let outcome =
                    harvest_pod(kube, bus, topic_id, config, run, platform, completion_time, pod)
                        .await;
                (pod, outcome)
            }
        })
        .buffer_unordered(config.max_concurrency.max(1));

    let mut published = 0;
    let mut failures = Vec::new();
    while let Some((pod, outcome)) = outcomes.next().await {
        match outcome {
            Ok(message_id) => {
                tracing::info!(
                    pod = %pod.metadata.name,
                    namespace = %pod.metadata.namespace,
                    message_id = %message_id,
                    "published pod log"
                );
                published += 1;
            }
            Err(error) => {
                tracing::error!(
                    pod = %pod.metadata.name,
                    namespace = %pod.metadata.namespace,
                    error = %format!("{error:#}"),
                    "failed to harvest pod"
                );
                failures.push(PodFailure {
                    pod: pod.metadata.name.clone(),
                    namespace: pod.metadata.namespace.clone(),
                    error: format!("{error:#}"),
                });
            }
        }
    }

    Ok(HarvestReport {
        run_name: run.name.clone(),
        published,
        failures,
    })
}

#[allow(clippy::too_many_arguments)]
async fn harvest_pod(
    kube: &KubeClient,
    bus: &BusClient,
    topic_id: &str,
    config: &HarvestConfig,
    run: &SuiteRun,
    platform: &str,
    completion_time: &str,
    pod: &Pod,
) -> Result<String> {
    let target = PodLogTarget::from_pod(pod)?;
    let container = target.resolve_test_container(&config.infra_containers)?;
    tracing::info!(
        container,
        pod = %target.pod_name,
        namespace = %target.namespace,
        "extracting container log"
    );

    let payload = kube
        .fetch_container_log(&target, container)
        .await
        .with_context(|| {
            format!(
                "while reading logs from container {} in pod {} in namespace {}",
                container, target.pod_name, target.namespace
            )
        })?;

    let status = run.result_status(&target.test_def_name)?;
    let attributes = MessageAttributes {
        name: target.test_def_name.clone(),
        status: status.as_str().to_string(),
        run_name: run.name.clone(),
        completion_time: completion_time.to_string(),
        platform: platform.to_string(),
    };

    let message = LogMessage::new(payload, &attributes);
    bus.publish(topic_id, &message).await.with_context(|| {
        format!(
            "while publishing log for pod {} in namespace {}",
            target.pod_name, target.namespace
        )
    })
}
