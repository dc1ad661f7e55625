use kube::Client;
use solar_operator::{config::ControllerConfig, controller, logging::init_logging, telemetry};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ControllerConfig::load()?;
    init_logging(&cfg.log_level, cfg.log_format)?;
    info!(namespace = cfg.namespace.as_deref().unwrap_or("*"), workers = cfg.workers, image = %cfg.image, "operator starting");
    let client = Client::try_default().await?;

    let listener = tokio::net::TcpListener::bind(cfg.metrics_addr).await?;
    info!(addr = %cfg.metrics_addr, "metrics listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, telemetry::router()).await { warn!(error=%e, "metrics server stopped"); }
    });

    let controller = controller::build(client, &cfg).await?;
    controller.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error=%e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
        info!(target: "shutdown.signal", "received Ctrl+C");
    }).await;
    Ok(())
}
