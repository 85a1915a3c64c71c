use super::{OPERATOR_LABEL, create_or_replace, requeue_on};
use crate::error::{Error, Result};
use crate::kubernetes::{Manifest, ManifestStore, PipelineStore};
use crate::metrics::Metrics;
use crate::pipeline::log_config_to_pipeline_yaml;
use crate::types::LogConfig;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ANNOTATION_AUTO_CREATE_KEY: &str = "loggie.io/create";
pub const ANNOTATION_AUTO_CREATE_CONFIGMAP: &str = "configmap";
pub const PIPELINES_DATA_KEY: &str = "pipelines.yml";

pub struct Context {
    pub pipelines: Arc<dyn PipelineStore>,
    pub manifests: Arc<dyn ManifestStore>,
}

fn wants_config_map(lgc: &LogConfig) -> bool {
    lgc.annotations()
        .get(ANNOTATION_AUTO_CREATE_KEY)
        .is_some_and(|v| v == ANNOTATION_AUTO_CREATE_CONFIGMAP)
}

/// ConfigMap named after the LogConfig carrying its assembled pipelines.
pub fn pipeline_config_map(lgc: &LogConfig, pipelines: String) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(lgc.name_any()),
            namespace: lgc.namespace(),
            labels: Some(BTreeMap::from([(
                OPERATOR_LABEL.to_string(),
                "true".to_string(),
            )])),
            owner_references: lgc.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(PIPELINES_DATA_KEY.to_string(), pipelines)])),
        ..Default::default()
    }
}

pub async fn reconcile(lgc: Arc<LogConfig>, ctx: Arc<Context>) -> Result<Action> {
    let name = lgc.name_any();
    let namespace = lgc.namespace().unwrap_or_default();
    debug!("Reconciling LogConfig {}/{}", namespace, name);

    if lgc.metadata.deletion_timestamp.is_some() || !wants_config_map(&lgc) {
        return Ok(Action::await_change());
    }

    let pipelines = match log_config_to_pipeline_yaml(&lgc, ctx.pipelines.as_ref()).await {
        Ok(pipelines) => pipelines,
        Err(e @ Error::ConfigParse { .. }) => {
            warn!("Skipping LogConfig {}/{}: {}", namespace, name, e);
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    };

    let manifest = Manifest::ConfigMap(pipeline_config_map(&lgc, pipelines));
    create_or_replace(ctx.manifests.as_ref(), &manifest).await?;
    info!("Pipeline ConfigMap for LogConfig {}/{} is up to date", namespace, name);

    Ok(Action::await_change())
}

pub fn error_policy(_lgc: Arc<LogConfig>, error: &Error, _ctx: Arc<Context>) -> Action {
    requeue_on(error)
}

pub async fn run(client: Client, ctx: Arc<Context>, metrics: Arc<Metrics>) {
    let configs = Api::<LogConfig>::all(client);
    Controller::new(configs, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            metrics.reconciled("logconfig", result.is_ok());
            async move {
                match result {
                    Ok((obj, _)) => debug!("Reconciled LogConfig {}", obj.name),
                    Err(e) => warn!("LogConfig controller error: {}", e),
                }
            }
        })
        .await;
}
