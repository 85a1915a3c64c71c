use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Operator configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<SidecarConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub ignore_namespaces: Vec<String>,
    #[serde(default)]
    pub ignore_container_names: Vec<String>,
    /// loggie system configuration handed verbatim to every injected sidecar
    #[serde(default)]
    pub system_config: String,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_yaml(&contents).with_context(|| format!("invalid config:\n{}", contents))
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let Some(sidecar) = self.enabled_sidecar() else {
            return Ok(());
        };
        if sidecar.image.trim().is_empty() {
            anyhow::bail!("sidecar.image is required when sidecar injection is enabled");
        }
        if sidecar.system_config.trim().is_empty() {
            anyhow::bail!("sidecar.systemConfig is required when sidecar injection is enabled");
        }
        validate_system_config(&sidecar.system_config)
            .context("sidecar.systemConfig is not a valid loggie system config")?;
        Ok(())
    }

    /// The sidecar settings, only when injection is switched on.
    pub fn enabled_sidecar(&self) -> Option<&SidecarConfig> {
        self.sidecar.as_ref().filter(|s| s.enabled)
    }
}

/// A loggie system config has to be a YAML mapping.
pub fn validate_system_config(raw: &str) -> Result<(), crate::error::Error> {
    serde_yaml::from_str::<serde_yaml::Mapping>(raw)
        .map(|_| ())
        .map_err(|e| crate::error::Error::config_parse("system config", e))
}
