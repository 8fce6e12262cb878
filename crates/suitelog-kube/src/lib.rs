//! Kubernetes API boundary for the suite-log harvester.
//!
//! Provides a typed reqwest client for listing suite-run resources and test
//! pods, resolving the test workload container out of a pod, and consuming a
//! container log stream without splitting lines across reads.

use thiserror::Error;

mod client;
mod log_stream;
mod pod_target;

pub use client::{KubeClient, KubeConfig};
pub use log_stream::consume_log_stream;
pub use pod_target::{Container, ObjectMeta, Pod, PodLogTarget, PodSpec};

/// Label set on every pod created by the suite runner.
pub const LABEL_CREATED_BY_RUNNER: &str = "suitelog.dev/created-by-runner";
/// Label carrying the owning suite run's name.
pub const LABEL_SUITE_NAME: &str = "suitelog.dev/suite-name";
/// Label carrying the test definition the pod executed.
pub const LABEL_TEST_DEF_NAME: &str = "suitelog.dev/test-def-name";

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("kubernetes api returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("invalid kubernetes response: {0}")]
    InvalidResponse(String),
    #[error("in-cluster configuration unavailable: {0}")]
    InClusterConfig(String),
    #[error("failed to open log stream for container {container} in pod {pod} in namespace {namespace}: {source}")]
    StreamOpen {
        pod: String,
        namespace: String,
        container: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed reading log stream from pod {pod} in namespace {namespace}: {source}")]
    StreamRead {
        pod: String,
        namespace: String,
        #[source]
        source: std::io::Error,
    },
    #[error("found {count} non-infrastructure containers in pod {pod} in namespace {namespace}, expected exactly one")]
    AmbiguousContainer {
        pod: String,
        namespace: String,
        count: usize,
    },
    #[error("there is no `{label}` label on pod {pod} in namespace {namespace}")]
    MissingLabel {
        label: &'static str,
        pod: String,
        namespace: String,
    },
}
