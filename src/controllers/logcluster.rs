use super::{create_if_absent, create_or_replace, requeue_on};
use crate::config::validate_system_config;
use crate::error::{Error, Result};
use crate::kubernetes::{Manifest, ManifestKind, ManifestStore};
use crate::metrics::Metrics;
use crate::templates::TemplateSet;
use crate::types::{LogCluster, LogClusterType};
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Context {
    pub store: Arc<dyn ManifestStore>,
    pub templates: Arc<TemplateSet>,
}

pub async fn reconcile(cluster: Arc<LogCluster>, ctx: Arc<Context>) -> Result<Action> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();
    info!("Reconciling LogCluster {}/{}", namespace, name);

    if cluster.metadata.deletion_timestamp.is_some() {
        debug!("LogCluster {}/{} is being deleted", namespace, name);
        return Ok(Action::await_change());
    }

    match cluster.spec.type_ {
        LogClusterType::DaemonSet => {
            ensure_system_config(&cluster, &ctx).await?;
            let manifest = render(&cluster, &ctx, ManifestKind::DaemonSet)?;
            create_or_replace(ctx.store.as_ref(), &manifest).await?;
        }
        LogClusterType::Deployment => {
            ensure_system_config(&cluster, &ctx).await?;
            let manifest = render(&cluster, &ctx, ManifestKind::Deployment)?;
            create_or_replace(ctx.store.as_ref(), &manifest).await?;
        }
        LogClusterType::Sidecar => {
            let raw = cluster.spec.system_config.as_deref().unwrap_or_default();
            if raw.trim().is_empty() {
                return Err(Error::UnsupportedConfig(format!(
                    "Sidecar LogCluster {}/{} has no systemConfig",
                    namespace, name
                )));
            }
            validate_system_config(raw)?;
            debug!("LogCluster {}/{} system config is valid", namespace, name);
        }
        LogClusterType::Unknown => {
            warn!("LogCluster {}/{} has an unknown type, skipping", namespace, name);
        }
    }

    Ok(Action::await_change())
}

pub fn error_policy(_cluster: Arc<LogCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    requeue_on(error)
}

/// The system ConfigMap is seeded once; later edits to it are left in place.
async fn ensure_system_config(cluster: &LogCluster, ctx: &Context) -> Result<()> {
    let manifest = render(cluster, ctx, ManifestKind::ConfigMap)?;
    create_if_absent(ctx.store.as_ref(), &manifest).await
}

fn render(cluster: &LogCluster, ctx: &Context, kind: ManifestKind) -> Result<Manifest> {
    let mut manifest = ctx.templates.render_manifest(kind, cluster)?;
    if manifest.namespace().is_none() {
        manifest.set_namespace(&cluster.namespace().unwrap_or_default());
    }
    if let Some(owner) = cluster.controller_owner_ref(&()) {
        manifest.add_owner(owner);
    }
    Ok(manifest)
}

pub async fn run(client: Client, ctx: Arc<Context>, metrics: Arc<Metrics>) {
    let clusters = Api::<LogCluster>::all(client);
    Controller::new(clusters, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            metrics.reconciled("logcluster", result.is_ok());
            async move {
                match result {
                    Ok((obj, _)) => debug!("Reconciled LogCluster {}", obj.name),
                    Err(e) => warn!("LogCluster controller error: {}", e),
                }
            }
        })
        .await;
}
