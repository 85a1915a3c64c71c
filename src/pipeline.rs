use crate::error::{Error, Result};
use crate::kubernetes::PipelineStore;
use crate::types::LogConfig;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use tracing::{debug, error};

/// The document loggie reads its pipelines from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pipelines: Vec<PipelineEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interceptors: Option<Vec<Mapping>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<Mapping>,
}

impl PipelineConfig {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            error!("marshal pipeline error: {}", e);
            Error::serialize(e)
        })
    }
}

/// Turn a LogConfig into a single-pipeline document. Inline interceptors and
/// sink take precedence over references; a reference to a missing resource
/// leaves that stage out instead of failing.
pub async fn log_config_to_pipeline<S>(lgc: &LogConfig, store: &S) -> Result<PipelineConfig>
where
    S: PipelineStore + ?Sized,
{
    let pipeline = lgc.pipeline();

    let entry = PipelineEntry {
        name: lgc.name_any(),
        sources: parse_sources(&pipeline.sources)?,
        interceptors: to_pipeline_interceptors(
            pipeline.inline_interceptors(),
            pipeline.interceptor_ref(),
            store,
        )
        .await?,
        sink: to_pipeline_sink(pipeline.inline_sink(), pipeline.sink_ref(), store).await?,
    };

    Ok(PipelineConfig {
        pipelines: vec![entry],
    })
}

pub async fn log_config_to_pipeline_yaml<S>(lgc: &LogConfig, store: &S) -> Result<String>
where
    S: PipelineStore + ?Sized,
{
    log_config_to_pipeline(lgc, store).await?.to_yaml()
}

pub fn parse_sources(raw: &str) -> Result<Vec<Mapping>> {
    serde_yaml::from_str(raw).map_err(|e| Error::config_parse("sources", e))
}

async fn to_pipeline_interceptors<S>(
    inline: Option<&str>,
    reference: Option<&str>,
    store: &S,
) -> Result<Option<Vec<Mapping>>>
where
    S: PipelineStore + ?Sized,
{
    let raw = match (inline, reference) {
        (Some(raw), _) => raw.to_string(),
        (None, Some(name)) => match store.get_interceptor(name).await? {
            Some(interceptor) => match interceptor.spec.interceptors {
                Some(raw) if !raw.trim().is_empty() => raw,
                _ => return Ok(None),
            },
            None => {
                debug!("interceptor {} referenced but not found, skipping", name);
                return Ok(None);
            }
        },
        (None, None) => return Ok(None),
    };

    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::config_parse("interceptors", e))
}

async fn to_pipeline_sink<S>(
    inline: Option<&str>,
    reference: Option<&str>,
    store: &S,
) -> Result<Option<Mapping>>
where
    S: PipelineStore + ?Sized,
{
    let raw = match (inline, reference) {
        (Some(raw), _) => raw.to_string(),
        (None, Some(name)) => match store.get_sink(name).await? {
            Some(sink) => match sink.spec.sink {
                Some(raw) if !raw.trim().is_empty() => raw,
                _ => return Ok(None),
            },
            None => {
                debug!("sink {} referenced but not found, skipping", name);
                return Ok(None);
            }
        },
        (None, None) => return Ok(None),
    };

    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::config_parse("sink", e))
}
