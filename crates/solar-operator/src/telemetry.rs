use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use once_cell::sync::Lazy;
use prometheus::{opts, Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use serde::Serialize;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn register<C: prometheus::core::Collector + Clone + 'static>(c: C) -> C {
    REGISTRY.register(Box::new(c.clone())).ok();
    c
}

pub static RECONCILE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register(IntCounterVec::new(opts!("solar_reconcile_total", "Reconcile cycles by outcome"), &["outcome"]).expect("valid metric opts"))
});
pub static STATUS_UPDATES: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::with_opts(opts!("solar_status_updates_total", "Star status writes")).expect("valid metric opts"))
});
pub static CHILDREN_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    register(IntCounterVec::new(opts!("solar_children_created_total", "Child objects created"), &["kind"]).expect("valid metric opts"))
});
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register(IntGauge::with_opts(opts!("solar_queue_depth", "Keys waiting in the work queue")).expect("valid metric opts"))
});

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&metric_families, &mut buf).is_err() { return StatusCode::INTERNAL_SERVER_ERROR.into_response(); }
    ([("Content-Type", "text/plain; version=0.0.4")], buf).into_response()
}

#[derive(Serialize)]
pub struct HealthResponse { pub status: &'static str }

pub async fn health() -> Json<HealthResponse> { Json(HealthResponse { status: "ok" }) }

pub fn router() -> Router {
    Router::new().route("/health", get(health)).route("/metrics", get(metrics_handler))
}
