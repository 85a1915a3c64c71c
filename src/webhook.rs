use crate::admission::SidecarInjection;
use crate::metrics::Metrics;
use anyhow::Context;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const MUTATE_INJECT_SIDECAR_PATH: &str = "/mutate-inject-sidecar";

const CERT_FILE: &str = "tls.crt";
const KEY_FILE: &str = "tls.key";

#[derive(Clone)]
struct WebhookState {
    injection: Arc<SidecarInjection>,
    metrics: Arc<Metrics>,
}

pub fn webhook_router(injection: Arc<SidecarInjection>, metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route(MUTATE_INJECT_SIDECAR_PATH, post(mutate_inject_sidecar))
        .with_state(WebhookState { injection, metrics })
}

pub fn probe_router() -> Router {
    Router::new()
        .route("/healthz", get(ok))
        .route("/readyz", get(ok))
}

async fn ok() -> &'static str {
    "ok"
}

async fn mutate_inject_sidecar(
    State(state): State<WebhookState>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!("invalid admission review: {}", e);
            state.metrics.admission("errored");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let decision = state.injection.handle(&req).await;
    state.metrics.admission(decision.outcome());
    Json(decision.into_response(&req).into_review())
}

/// Serve the webhook over TLS using `tls.crt` / `tls.key` from `cert_dir`,
/// or plain HTTP when `cert_dir` is `None`.
pub async fn serve_webhook(
    router: Router,
    addr: SocketAddr,
    cert_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let Some(cert_dir) = cert_dir else {
        warn!("Serving admission webhook without TLS on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind webhook address {}", addr))?;
        axum::serve(listener, router).await?;
        return Ok(());
    };

    let tls = RustlsConfig::from_pem_file(cert_dir.join(CERT_FILE), cert_dir.join(KEY_FILE))
        .await
        .with_context(|| format!("cannot load webhook certificate from {}", cert_dir.display()))?;
    info!("Admission webhook listening on {}", addr);
    axum_server::bind_rustls(addr, tls)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

/// Serve a plain HTTP router, used for the probe and metrics endpoints.
pub async fn serve_http(router: Router, addr: SocketAddr, what: &str) -> anyhow::Result<()> {
    info!("{} listening on {}", what, addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {} address {}", what, addr))?;
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::decode_pod;
    use crate::config::SidecarConfig;
    use crate::kubernetes::MockPipelineStore;
    use serde_json::json;

    fn state(store: MockPipelineStore) -> WebhookState {
        let injection = Arc::new(SidecarInjection::new(
            SidecarConfig {
                enabled: true,
                image: "loggie/loggie:v1.4.0".to_string(),
                system_config: "loggie: {}\n".to_string(),
                ..Default::default()
            },
            Arc::new(store),
            Arc::new(decode_pod),
        ));
        WebhookState {
            injection,
            metrics: Arc::new(Metrics::new().unwrap()),
        }
    }

    fn decisions(state: &WebhookState, outcome: &str) -> u64 {
        state
            .metrics
            .admission_decisions
            .with_label_values(&[outcome])
            .get() as u64
    }

    #[tokio::test]
    async fn unannotated_pod_is_allowed() {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "0df28fbd-5f5f-11e8-bc74-36e6bb280816",
                "kind": { "group": "", "version": "v1", "kind": "Pod" },
                "resource": { "group": "", "version": "v1", "resource": "pods" },
                "namespace": "default",
                "operation": "CREATE",
                "userInfo": { "username": "admin" },
                "object": {
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": { "name": "web" },
                    "spec": { "containers": [{ "name": "web", "image": "nginx" }] }
                }
            }
        }))
        .unwrap();

        let state = state(MockPipelineStore::new());
        let Json(out) = mutate_inject_sidecar(State(state.clone()), Json(review)).await;
        let out = serde_json::to_value(out).unwrap();

        assert_eq!(out["response"]["uid"], "0df28fbd-5f5f-11e8-bc74-36e6bb280816");
        assert_eq!(out["response"]["allowed"], true);
        assert!(out["response"].get("patch").is_none());
        assert_eq!(decisions(&state, "skipped"), 1);
        assert_eq!(decisions(&state, "injected"), 0);
    }

    #[tokio::test]
    async fn review_without_request_is_rejected() {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview"
        }))
        .unwrap();

        let state = state(MockPipelineStore::new());
        let Json(out) = mutate_inject_sidecar(State(state.clone()), Json(review)).await;
        let out = serde_json::to_value(out).unwrap();

        assert_eq!(out["response"]["allowed"], false);
        assert_eq!(decisions(&state, "errored"), 1);
    }

    #[tokio::test]
    async fn probes_answer_ok() {
        assert_eq!(ok().await, "ok");
    }
}
