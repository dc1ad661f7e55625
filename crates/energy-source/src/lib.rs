use axum::{extract::State, routing::get, Router};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_SOURCE: &str = "Sun";
pub const DEFAULT_PORT: &str = "8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings { pub source: String, pub port: String }

impl Settings {
    /// `SOURCE` and `PORT`, falling back to the defaults when unset or empty.
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string());
        Self { source: var("SOURCE", DEFAULT_SOURCE), port: var("PORT", DEFAULT_PORT) }
    }
}

pub fn greeting(source: &str) -> String {
    format!("Hello! This is the source of energy for the {source}, providing heat and light.\n")
}

async fn hello(State(source): State<Arc<str>>) -> String {
    info!("Source of energy: received a request");
    greeting(&source)
}

pub fn router(source: &str) -> Router {
    Router::new().route("/", get(hello)).with_state(Arc::<str>::from(source))
}
