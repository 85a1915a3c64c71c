use crate::error::{Error, Result};
use crate::kubernetes::{Manifest, ManifestKind};
use crate::types::LogCluster;
use anyhow::Context as _;
use kube::ResourceExt;
use minijinja::{Environment, context};
use std::path::Path;
use tracing::{debug, info};

const DAEMONSET_TEMPLATE: &str = include_str!("../templates/daemonset.yaml.j2");
const DEPLOYMENT_TEMPLATE: &str = include_str!("../templates/deployment.yaml.j2");
const CONFIGMAP_TEMPLATE: &str = include_str!("../templates/configmap.yaml.j2");

/// System config written to a cluster's ConfigMap when the LogCluster
/// does not carry its own.
pub const DEFAULT_SYSTEM_CONFIG: &str = r#"loggie:
  reload:
    enabled: true
    period: 10s
  monitor:
    logger:
      period: 30s
      enabled: true
    listeners:
      filesource: ~
      filewatcher: ~
      reload: ~
      sink: ~
  discovery:
    enabled: true
  http:
    enabled: true
    port: 9196
"#;

/// Override files for the built-in manifest templates.
#[derive(Debug, Default, Clone)]
pub struct TemplatePaths<'a> {
    pub daemonset: Option<&'a Path>,
    pub deployment: Option<&'a Path>,
    pub configmap: Option<&'a Path>,
}

/// Manifest templates keyed by the kind they produce. Built once at startup
/// and shared read-only with the reconcilers.
pub struct TemplateSet {
    env: Environment<'static>,
}

impl TemplateSet {
    pub fn builtin() -> Result<Self> {
        Self::from_sources([
            (ManifestKind::DaemonSet, DAEMONSET_TEMPLATE.to_string()),
            (ManifestKind::Deployment, DEPLOYMENT_TEMPLATE.to_string()),
            (ManifestKind::ConfigMap, CONFIGMAP_TEMPLATE.to_string()),
        ])
    }

    /// Built-in templates, with any kind that has a path replaced by the
    /// file's contents.
    pub fn load(paths: &TemplatePaths<'_>) -> anyhow::Result<Self> {
        if paths.daemonset.is_none() && paths.deployment.is_none() && paths.configmap.is_none() {
            return Ok(Self::builtin()?);
        }
        let pick = |path: Option<&Path>, fallback: &str| -> anyhow::Result<String> {
            match path {
                Some(path) => {
                    info!("Loading manifest template from {}", path.display());
                    std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read template {}", path.display()))
                }
                None => Ok(fallback.to_string()),
            }
        };
        let set = Self::from_sources([
            (ManifestKind::DaemonSet, pick(paths.daemonset, DAEMONSET_TEMPLATE)?),
            (ManifestKind::Deployment, pick(paths.deployment, DEPLOYMENT_TEMPLATE)?),
            (ManifestKind::ConfigMap, pick(paths.configmap, CONFIGMAP_TEMPLATE)?),
        ])?;
        Ok(set)
    }

    pub fn from_sources(sources: impl IntoIterator<Item = (ManifestKind, String)>) -> Result<Self> {
        let mut env = Environment::new();
        for (kind, source) in sources {
            env.add_template_owned(kind.to_string(), source)?;
        }
        Ok(Self { env })
    }

    /// Render the template for `kind` against a LogCluster. The context
    /// exposes `name`, `namespace`, `spec` and `default_system_config`.
    pub fn render(&self, kind: ManifestKind, cluster: &LogCluster) -> Result<String> {
        let name = kind.to_string();
        let template = self.env.get_template(&name).map_err(|_| Error::NotFound {
            kind: "template",
            name: name.clone(),
        })?;
        let rendered = template.render(context! {
            name => cluster.name_any(),
            namespace => cluster.namespace().unwrap_or_default(),
            spec => &cluster.spec,
            default_system_config => DEFAULT_SYSTEM_CONFIG,
        })?;
        debug!("Rendered {} for {}:\n{}", kind, cluster.name_any(), rendered);
        Ok(rendered)
    }

    /// Render and decode into the typed object for `kind`.
    pub fn render_manifest(&self, kind: ManifestKind, cluster: &LogCluster) -> Result<Manifest> {
        let rendered = self.render(kind, cluster)?;
        let what = "rendered manifest";
        let manifest = match kind {
            ManifestKind::DaemonSet => Manifest::DaemonSet(
                serde_yaml::from_str(&rendered).map_err(|e| Error::config_parse(what, e))?,
            ),
            ManifestKind::Deployment => Manifest::Deployment(
                serde_yaml::from_str(&rendered).map_err(|e| Error::config_parse(what, e))?,
            ),
            ManifestKind::ConfigMap => Manifest::ConfigMap(
                serde_yaml::from_str(&rendered).map_err(|e| Error::config_parse(what, e))?,
            ),
        };
        Ok(manifest)
    }
}
