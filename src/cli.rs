use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "loggie-operator")]
#[command(about = "Inject Loggie sidecars and manage Loggie agents on Kubernetes")]
pub struct Cli {
    /// Operator configuration file
    #[arg(long, default_value = "config.yml")]
    pub config_path: PathBuf,

    /// Port the admission webhook listens on
    #[arg(long, default_value_t = 9443)]
    pub port: u16,

    /// Directory holding tls.crt and tls.key for the webhook
    #[arg(long, default_value = "/tmp/cert")]
    pub cert_dir: PathBuf,

    /// Serve the webhook over plain HTTP
    #[arg(long)]
    pub insecure: bool,

    /// Address the health probes bind to
    #[arg(long, default_value = "0.0.0.0:9297")]
    pub health_probe_bind_address: SocketAddr,

    /// Address the metrics endpoint binds to
    #[arg(long, default_value = "0.0.0.0:9296")]
    pub metrics_bind_address: SocketAddr,

    /// Kubeconfig context
    #[arg(long)]
    pub context: Option<String>,

    /// Replace the built-in DaemonSet template
    #[arg(long)]
    pub daemonset_template: Option<PathBuf>,

    /// Replace the built-in Deployment template
    #[arg(long)]
    pub deployment_template: Option<PathBuf>,

    /// Replace the built-in ConfigMap template
    #[arg(long)]
    pub configmap_template: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    pub fn webhook_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// `None` when the webhook should run without TLS.
    pub fn tls_dir(&self) -> Option<&std::path::Path> {
        (!self.insecure).then_some(self.cert_dir.as_path())
    }
}
