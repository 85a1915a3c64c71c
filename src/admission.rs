use crate::config::SidecarConfig;
use crate::error::{Error, Result};
use crate::kubernetes::PipelineStore;
use crate::pipeline::log_config_to_pipeline;
use crate::sidecar::{SidecarPatcher, has_sidecar, retrieve_paths_from_sources};
use crate::types::LogConfig;
use crate::utils::{labels_subset, labels_to_string};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const INJECTOR_ANNOTATION_KEY: &str = "sidecar.loggie.io/inject";
pub const INJECTOR_ANNOTATION_VALUE_TRUE: &str = "true";

/// Turns the object carried by an admission request into a Pod.
pub type PodDecoder = Arc<dyn Fn(&AdmissionRequest<DynamicObject>) -> Result<Pod> + Send + Sync>;

/// Default decoder: round-trips the dynamic object through JSON.
pub fn decode_pod(req: &AdmissionRequest<DynamicObject>) -> Result<Pod> {
    let obj = req
        .object
        .as_ref()
        .ok_or_else(|| Error::Decode("admission request carries no object".to_string()))?;
    let value = serde_json::to_value(obj).map_err(|e| Error::Decode(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
}

/// Outcome of one admission request.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Admit the pod exactly as submitted.
    Allowed { reason: String },
    /// Admit the pod with this patch applied.
    Patched { patch: json_patch::Patch },
    /// Reject the request.
    Errored { code: u16, message: String },
}

impl Decision {
    fn allowed(reason: impl Into<String>) -> Self {
        Decision::Allowed {
            reason: reason.into(),
        }
    }

    fn not_injected(reason: &str) -> Self {
        Self::allowed(format!("allowed but would not inject Loggie sidecar, {}", reason))
    }

    fn injection_failed(err: Error) -> Self {
        Self::allowed(format!("allowed but Loggie sidecar injection failed: {}", err))
    }

    /// Label used when counting decisions.
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Allowed { .. } => "skipped",
            Decision::Patched { .. } => "injected",
            Decision::Errored { .. } => "errored",
        }
    }

    pub fn into_response(self, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let response = AdmissionResponse::from(req);
        match self {
            Decision::Allowed { .. } => response,
            Decision::Patched { patch } => match response.with_patch(patch) {
                Ok(response) => response,
                Err(e) => {
                    warn!("cannot serialize sidecar patch, admitting pod unmodified: {}", e);
                    AdmissionResponse::from(req)
                }
            },
            Decision::Errored { code, message } => {
                let mut response = response.deny(message);
                response.result.code = code;
                response
            }
        }
    }
}

/// Check the inject annotation and the namespace ignore list.
pub fn check_inject(meta: &ObjectMeta, namespace: &str, ignored_namespaces: &[String]) -> bool {
    let enabled = meta
        .annotations
        .as_ref()
        .and_then(|a| a.get(INJECTOR_ANNOTATION_KEY))
        .is_some_and(|v| v == INJECTOR_ANNOTATION_VALUE_TRUE);
    if !enabled {
        return false;
    }

    !ignored_namespaces.iter().any(|ns| ns == namespace)
}

/// Mutating webhook that injects the loggie sidecar into annotated pods.
pub struct SidecarInjection {
    config: SidecarConfig,
    store: Arc<dyn PipelineStore>,
    decoder: PodDecoder,
}

impl SidecarInjection {
    pub fn new(config: SidecarConfig, store: Arc<dyn PipelineStore>, decoder: PodDecoder) -> Self {
        Self {
            config,
            store,
            decoder,
        }
    }

    /// Injection failures never reject a pod. Only an undecodable object does.
    pub async fn handle(&self, req: &AdmissionRequest<DynamicObject>) -> Decision {
        let pod = match (self.decoder)(req) {
            Ok(pod) => pod,
            Err(e) => {
                warn!("cannot decode pod from admission request {}: {}", req.uid, e);
                return Decision::Errored {
                    code: 400,
                    message: e.to_string(),
                };
            }
        };

        // CREATE requests usually carry the namespace on the request only
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .or_else(|| req.namespace.clone())
            .unwrap_or_default();
        let pod_name = pod_display_name(&pod);

        if !check_inject(&pod.metadata, &namespace, &self.config.ignore_namespaces) {
            debug!("pod {}/{} is not marked for injection", namespace, pod_name);
            return Decision::allowed("allowed but would not inject Loggie sidecar");
        }

        if has_sidecar(&pod) {
            debug!("pod {}/{} already has a loggie sidecar", namespace, pod_name);
            return Decision::allowed("allowed, Loggie sidecar already injected");
        }

        let (lgc, paths) = match self.get_matched_log_config(&pod, &namespace).await {
            Ok(Some(matched)) => matched,
            Ok(None) => {
                let w = format!(
                    "Pod({}/{}) does not have a matching logconfig/clusterLogConfig",
                    namespace, pod_name
                );
                warn!("{}", w);
                return Decision::not_injected(&w);
            }
            Err(e) => {
                let w = format!(
                    "cannot get Pod({}/{}) matched LogConfig/ClusterLogConfig: {}",
                    namespace, pod_name, e
                );
                warn!("{}", w);
                return Decision::not_injected(&w);
            }
        };

        let mut mutate_pod = pod.clone();
        if let Err(e) = self.inject_sidecar(&mut mutate_pod, &lgc, &paths).await {
            warn!("inject pod {}/{} sidecar failed: {}", namespace, pod_name, e);
            return Decision::injection_failed(e);
        }

        let patch = match pod_patch(&pod, &mutate_pod) {
            Ok(patch) => patch,
            Err(e) => {
                error!("cannot build patch for pod {}/{}: {}", namespace, pod_name, e);
                return Decision::injection_failed(e);
            }
        };

        info!(
            "injecting pod, namespace: {}, name: {}, logConfig: {}",
            namespace,
            pod_name,
            lgc.name_any()
        );
        debug!("injecting pod patch: {:?}", patch);

        Decision::Patched { patch }
    }

    async fn inject_sidecar(&self, pod: &mut Pod, lgc: &LogConfig, paths: &[String]) -> Result<()> {
        let pipelines = log_config_to_pipeline(lgc, self.store.as_ref()).await?;
        SidecarPatcher::new(&self.config).patch(pod, &pipelines, paths)
    }

    /// Namespaced LogConfigs win over ClusterLogConfigs. Within a kind the
    /// candidates are tried in (namespace, name) order.
    async fn get_matched_log_config(
        &self,
        pod: &Pod,
        namespace: &str,
    ) -> Result<Option<(LogConfig, Vec<String>)>> {
        let lgc = match self.pod_matched_log_config(pod, namespace).await? {
            Some(lgc) => lgc,
            None => match self.pod_matched_cluster_log_config(pod).await? {
                Some(lgc) => lgc,
                None => return Ok(None),
            },
        };

        let paths = retrieve_paths_from_sources(&lgc.pipeline().sources)?;
        Ok(Some((lgc, paths)))
    }

    async fn pod_matched_log_config(&self, pod: &Pod, namespace: &str) -> Result<Option<LogConfig>> {
        let empty = BTreeMap::new();
        let pod_labels = pod.metadata.labels.as_ref().unwrap_or(&empty);

        let mut configs = self.store.list_log_configs().await?;
        configs.retain(|lgc| lgc.namespace().as_deref() == Some(namespace));
        configs.sort_by_key(|lgc| lgc.name_any());

        Ok(configs.into_iter().find(|lgc| {
            lgc.pod_selector().is_some_and(|selector| {
                let matched = labels_subset(selector, pod_labels);
                if matched {
                    debug!("logConfig {} matches labels {}", lgc.name_any(), labels_to_string(selector));
                }
                matched
            })
        }))
    }

    async fn pod_matched_cluster_log_config(&self, pod: &Pod) -> Result<Option<LogConfig>> {
        let empty = BTreeMap::new();
        let pod_labels = pod.metadata.labels.as_ref().unwrap_or(&empty);

        let mut configs = self.store.list_cluster_log_configs().await?;
        configs.sort_by_key(|clgc| clgc.name_any());

        Ok(configs
            .into_iter()
            .find(|clgc| {
                clgc.pod_selector()
                    .is_some_and(|selector| labels_subset(selector, pod_labels))
            })
            .map(|clgc| clgc.to_log_config()))
    }
}

fn pod_display_name(pod: &Pod) -> String {
    pod.metadata
        .name
        .clone()
        .or_else(|| pod.metadata.generate_name.clone())
        .unwrap_or_default()
}

fn pod_patch(original: &Pod, mutated: &Pod) -> Result<json_patch::Patch> {
    let original = serde_json::to_value(original).map_err(Error::serialize)?;
    let mutated = serde_json::to_value(mutated).map_err(Error::serialize)?;
    Ok(json_patch::diff(&original, &mutated))
}
