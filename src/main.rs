mod admission;
mod cli;
mod config;
mod controllers;
mod error;
mod kubernetes;
mod metrics;
mod paths;
mod pipeline;
mod sidecar;
mod templates;
#[cfg(test)]
mod tests;
mod types;
mod utils;
mod webhook;

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use admission::{SidecarInjection, decode_pod};
use cli::Cli;
use config::Config;
use controllers::{logcluster, logconfig};
use kubernetes::{KubeStore, initialize_client};
use metrics::Metrics;
use templates::{TemplatePaths, TemplateSet};

fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install the rustls crypto provider"))?;

    let config = Config::from_file(&cli.config_path)?;
    info!("Loaded config from {}", cli.config_path.display());

    let templates = Arc::new(TemplateSet::load(&TemplatePaths {
        daemonset: cli.daemonset_template.as_deref(),
        deployment: cli.deployment_template.as_deref(),
        configmap: cli.configmap_template.as_deref(),
    })?);

    let metrics = Arc::new(Metrics::new()?);

    let client = initialize_client(cli.context.as_deref()).await?;
    let store = Arc::new(KubeStore::new(client.clone()));

    tokio::spawn(logcluster::run(
        client.clone(),
        Arc::new(logcluster::Context {
            store: store.clone(),
            templates,
        }),
        metrics.clone(),
    ));
    tokio::spawn(logconfig::run(
        client.clone(),
        Arc::new(logconfig::Context {
            pipelines: store.clone(),
            manifests: store.clone(),
        }),
        metrics.clone(),
    ));

    let probe_addr = cli.health_probe_bind_address;
    tokio::spawn(async move {
        let probes = webhook::probe_router();
        if let Err(e) = webhook::serve_http(probes, probe_addr, "Health probes").await {
            error!("Health probe server error: {:#}", e);
        }
    });

    let metrics_addr = cli.metrics_bind_address;
    let metrics_router = metrics::metrics_router(metrics.clone());
    tokio::spawn(async move {
        if let Err(e) = webhook::serve_http(metrics_router, metrics_addr, "Metrics").await {
            error!("Metrics server error: {:#}", e);
        }
    });

    let Some(sidecar) = config.enabled_sidecar() else {
        info!("Sidecar injection is disabled");
        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        return Ok(());
    };

    let injection = Arc::new(SidecarInjection::new(
        sidecar.clone(),
        store,
        Arc::new(decode_pod),
    ));
    let router = webhook::webhook_router(injection, metrics);

    tokio::select! {
        result = webhook::serve_webhook(router, cli.webhook_addr(), cli.tls_dir()) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
