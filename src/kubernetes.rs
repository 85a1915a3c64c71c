use crate::error::Result;
use crate::types::{ClusterLogConfig, Interceptor, LogConfig, Sink};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{ListParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt, config};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{self, Debug};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

/// Read access to the resources a pipeline is assembled from.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn list_log_configs(&self) -> Result<Vec<LogConfig>>;

    async fn list_cluster_log_configs(&self) -> Result<Vec<ClusterLogConfig>>;

    /// Look up a cluster-scoped Interceptor, `None` when it does not exist.
    async fn get_interceptor(&self, name: &str) -> Result<Option<Interceptor>>;

    /// Look up a cluster-scoped Sink, `None` when it does not exist.
    async fn get_sink(&self, name: &str) -> Result<Option<Sink>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManifestKind {
    DaemonSet,
    Deployment,
    ConfigMap,
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManifestKind::DaemonSet => "DaemonSet",
            ManifestKind::Deployment => "Deployment",
            ManifestKind::ConfigMap => "ConfigMap",
        };
        f.write_str(name)
    }
}

/// A rendered object ready to be written to the cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    DaemonSet(DaemonSet),
    Deployment(Deployment),
    ConfigMap(ConfigMap),
}

impl Manifest {
    pub fn kind(&self) -> ManifestKind {
        match self {
            Manifest::DaemonSet(_) => ManifestKind::DaemonSet,
            Manifest::Deployment(_) => ManifestKind::Deployment,
            Manifest::ConfigMap(_) => ManifestKind::ConfigMap,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Manifest::DaemonSet(o) => o.name_any(),
            Manifest::Deployment(o) => o.name_any(),
            Manifest::ConfigMap(o) => o.name_any(),
        }
    }

    pub fn namespace(&self) -> Option<String> {
        match self {
            Manifest::DaemonSet(o) => o.namespace(),
            Manifest::Deployment(o) => o.namespace(),
            Manifest::ConfigMap(o) => o.namespace(),
        }
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Manifest::DaemonSet(o) => &mut o.metadata,
            Manifest::Deployment(o) => &mut o.metadata,
            Manifest::ConfigMap(o) => &mut o.metadata,
        }
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.meta_mut().namespace = Some(namespace.to_string());
    }

    /// Append an owner so the object is garbage collected with its parent.
    pub fn add_owner(&mut self, owner: OwnerReference) {
        let owners = self.meta_mut().owner_references.get_or_insert_with(Vec::new);
        if !owners.iter().any(|o| o.uid == owner.uid) {
            owners.push(owner);
        }
    }
}

/// Create / replace access for the objects the operator owns.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestStore: Send + Sync {
    async fn exists(&self, kind: ManifestKind, namespace: &str, name: &str) -> Result<bool>;

    async fn create(&self, manifest: &Manifest) -> Result<()>;

    /// Full-document replace of an existing object.
    async fn replace(&self, manifest: &Manifest) -> Result<()>;
}

/// Store backed by the Kubernetes API server. Every call is one round trip,
/// nothing is cached.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn exists_in<K>(&self, namespace: &str, name: &str) -> Result<bool>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + DeserializeOwned
            + Clone
            + Debug
            + Send
            + Sync
            + 'static,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn create_in<K>(&self, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + DeserializeOwned
            + Serialize
            + Clone
            + Debug
            + Send
            + Sync
            + 'static,
    {
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&PostParams::default(), obj).await?;
        info!("created {}/{}", namespace, obj.name_any());
        Ok(())
    }

    async fn replace_in<K>(&self, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + DeserializeOwned
            + Serialize
            + Clone
            + Debug
            + Send
            + Sync
            + 'static,
    {
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let name = obj.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &PostParams::default(), obj).await?;
        info!("replaced {}/{}", namespace, name);
        Ok(())
    }
}

#[async_trait]
impl PipelineStore for KubeStore {
    async fn list_log_configs(&self) -> Result<Vec<LogConfig>> {
        let api: Api<LogConfig> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_cluster_log_configs(&self) -> Result<Vec<ClusterLogConfig>> {
        let api: Api<ClusterLogConfig> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_interceptor(&self, name: &str) -> Result<Option<Interceptor>> {
        let api: Api<Interceptor> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn get_sink(&self, name: &str) -> Result<Option<Sink>> {
        let api: Api<Sink> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }
}

#[async_trait]
impl ManifestStore for KubeStore {
    async fn exists(&self, kind: ManifestKind, namespace: &str, name: &str) -> Result<bool> {
        debug!("looking up {} {}/{}", kind, namespace, name);
        match kind {
            ManifestKind::DaemonSet => self.exists_in::<DaemonSet>(namespace, name).await,
            ManifestKind::Deployment => self.exists_in::<Deployment>(namespace, name).await,
            ManifestKind::ConfigMap => self.exists_in::<ConfigMap>(namespace, name).await,
        }
    }

    async fn create(&self, manifest: &Manifest) -> Result<()> {
        match manifest {
            Manifest::DaemonSet(o) => self.create_in(o).await,
            Manifest::Deployment(o) => self.create_in(o).await,
            Manifest::ConfigMap(o) => self.create_in(o).await,
        }
    }

    async fn replace(&self, manifest: &Manifest) -> Result<()> {
        match manifest {
            Manifest::DaemonSet(o) => self.replace_in(o).await,
            Manifest::Deployment(o) => self.replace_in(o).await,
            Manifest::ConfigMap(o) => self.replace_in(o).await,
        }
    }
}

/// Build a client for the named kubeconfig context, or infer one (in-cluster
/// service account first, then the current kubeconfig context).
pub async fn initialize_client(context: Option<&str>) -> anyhow::Result<Client> {
    let config = match context {
        Some(ctx) => config::Config::from_kubeconfig(&config::KubeConfigOptions {
            context: Some(ctx.to_string()),
            ..Default::default()
        })
        .await
        .map_err(|e| anyhow::anyhow!("Context '{}' not found in kubeconfig: {}", ctx, e))?,
        None => config::Config::infer().await?,
    };
    let client = Client::try_from(config)?;
    info!(
        "Initialized client for context: {}",
        context.unwrap_or("<inferred>")
    );
    Ok(client)
}
