use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Path value a file source uses to ask for container stdout instead of files.
pub const PATH_STDOUT: &str = "stdout";

/// How a LogConfig picks the objects it collects from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SelectorType {
    Pod,
    Node,
    Cluster,
    Workload,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(rename = "type", default)]
    pub type_: SelectorType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub label_selector: BTreeMap<String, String>,
}

/// Raw pipeline fragments as they are stored on the resource. Every fragment
/// is a YAML document that is only parsed when a pipeline gets assembled.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    #[serde(default)]
    pub sources: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interceptors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interceptor_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink_ref: Option<String>,
}

impl Pipeline {
    pub fn inline_interceptors(&self) -> Option<&str> {
        non_empty(self.interceptors.as_deref())
    }

    pub fn inline_sink(&self) -> Option<&str> {
        non_empty(self.sink.as_deref())
    }

    pub fn interceptor_ref(&self) -> Option<&str> {
        non_empty(self.interceptor_ref.as_deref())
    }

    pub fn sink_ref(&self) -> Option<&str> {
        non_empty(self.sink_ref.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "loggie.io", version = "v1beta1", kind = "LogConfig", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct LogConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Pipeline>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "loggie.io", version = "v1beta1", kind = "ClusterLogConfig")]
#[serde(rename_all = "camelCase")]
pub struct ClusterLogConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Pipeline>,
}

impl LogConfig {
    /// Pod label selector, or None when this config does not select Pods.
    pub fn pod_selector(&self) -> Option<&BTreeMap<String, String>> {
        pod_selector(self.spec.selector.as_ref())
    }

    pub fn pipeline(&self) -> Pipeline {
        self.spec.pipeline.clone().unwrap_or_default()
    }
}

impl ClusterLogConfig {
    pub fn pod_selector(&self) -> Option<&BTreeMap<String, String>> {
        pod_selector(self.spec.selector.as_ref())
    }

    /// View this cluster-scoped config as a LogConfig so both kinds flow
    /// through the same assembly and patching code.
    pub fn to_log_config(&self) -> LogConfig {
        let mut lgc = LogConfig::new(
            &self.name_any(),
            LogConfigSpec {
                selector: self.spec.selector.clone(),
                pipeline: self.spec.pipeline.clone(),
            },
        );
        lgc.metadata.labels = self.metadata.labels.clone();
        lgc.metadata.annotations = self.metadata.annotations.clone();
        lgc
    }
}

fn pod_selector(selector: Option<&Selector>) -> Option<&BTreeMap<String, String>> {
    selector
        .filter(|s| s.type_ == SelectorType::Pod)
        .map(|s| &s.label_selector)
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "loggie.io", version = "v1beta1", kind = "Interceptor")]
pub struct InterceptorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interceptors: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "loggie.io", version = "v1beta1", kind = "Sink")]
pub struct SinkSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum LogClusterType {
    DaemonSet,
    Deployment,
    Sidecar,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Volumes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_config_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet_root_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_root_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_paths: Vec<String>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operator.loggie.io",
    version = "v1beta1",
    kind = "LogCluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LogClusterSpec {
    #[serde(default)]
    pub image: String,
    #[serde(rename = "type", default)]
    pub type_: LogClusterType,
    /// Only used by Deployment clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Volumes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_config: Option<String>,
}
