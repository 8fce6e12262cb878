//! Typed extraction of harvestable targets out of raw pod objects.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{KubeError, LABEL_TEST_DEF_NAME};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Container {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
}

/// One pod's worth of harvest work: where the log lives and which test
/// definition it belongs to.
#[derive(Debug, Clone)]
pub struct PodLogTarget {
    pub pod_name: String,
    pub namespace: String,
    pub container_candidates: Vec<String>,
    pub test_def_name: String,
}

impl PodLogTarget {
    /// Performs the required-label extraction once, at ingestion time.
    pub fn from_pod(pod: &Pod) -> Result<Self, KubeError> {
        let test_def_name = pod
            .metadata
            .labels
            .get(LABEL_TEST_DEF_NAME)
            .cloned()
            .ok_or_else(|| KubeError::MissingLabel {
                label: LABEL_TEST_DEF_NAME,
                pod: pod.metadata.name.clone(),
                namespace: pod.metadata.namespace.clone(),
            })?;

        Ok(Self {
            pod_name: pod.metadata.name.clone(),
            namespace: pod.metadata.namespace.clone(),
            container_candidates: pod
                .spec
                .containers
                .iter()
                .map(|container| container.name.clone())
                .collect(),
            test_def_name,
        })
    }

    /// Returns the single container that ran the test workload.
    ///
    /// Infrastructure sidecars are excluded by name; anything other than
    /// exactly one survivor is ambiguous and halts processing for this pod.
    /// There is no first-match fallback.
    pub fn resolve_test_container(&self, infra_containers: &[String]) -> Result<&str, KubeError> {
        let candidates: Vec<&str> = self
            .container_candidates
            .iter()
            .map(String::as_str)
            .filter(|name| !infra_containers.iter().any(|infra| infra == name))
            .collect();

        match candidates.as_slice() {
            &[single] => Ok(single),
            _ => Err(KubeError::AmbiguousContainer {
                pod: self.pod_name.clone(),
                namespace: self.namespace.clone(),
                count: candidates.len(),
            }),
        }
    }
}
