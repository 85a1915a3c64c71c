use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Operator metrics, exposed in the Prometheus text format on `/metrics`.
pub struct Metrics {
    registry: Registry,

    /// Admission decisions by outcome: injected, skipped, errored.
    pub admission_decisions: CounterVec,
    /// Reconcile runs by controller and outcome: success, error.
    pub reconciles: CounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let admission_decisions = CounterVec::new(
            Opts::new(
                "loggie_operator_admission_decisions_total",
                "Sidecar admission decisions",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(admission_decisions.clone()))?;

        let reconciles = CounterVec::new(
            Opts::new("loggie_operator_reconciles_total", "Reconcile runs"),
            &["controller", "outcome"],
        )?;
        registry.register(Box::new(reconciles.clone()))?;

        Ok(Self {
            registry,
            admission_decisions,
            reconciles,
        })
    }

    pub fn admission(&self, outcome: &str) {
        self.admission_decisions.with_label_values(&[outcome]).inc();
    }

    pub fn reconciled(&self, controller: &str, ok: bool) {
        let outcome = if ok { "success" } else { "error" };
        self.reconciles.with_label_values(&[controller, outcome]).inc();
    }

    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .with_state(metrics)
}

async fn serve_metrics(State(metrics): State<Arc<Metrics>>) -> (StatusCode, String) {
    match metrics.encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
