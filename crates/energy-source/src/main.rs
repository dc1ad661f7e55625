use energy_source::{greeting, router, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();
    info!("Source of energy: starting...");
    let settings = Settings::from_env();
    info!("{}", greeting(&settings.source).trim_end());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    info!(port = %settings.port, "Source of energy: listening");
    axum::serve(listener, router(&settings.source)).await?;
    Ok(())
}
