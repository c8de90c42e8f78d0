use std::sync::Arc;

use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fleetmeter_control_plane::config::ControlPlaneConfig;
use fleetmeter_control_plane::server::admin_router;
use fleetmeter_control_plane::ClusterStack;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fleetmeter_control_plane=info,info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ControlPlaneConfig::from_env()?;
    let admin_addr = config.admin_addr;

    info!(
        %admin_addr,
        interval_secs = config.reconcile_interval.as_secs(),
        image = %config.workload_image,
        "Starting Fleetmeter Control Plane"
    );

    let stack = Arc::new(ClusterStack::bootstrap(config).await?);
    stack.start().await?;

    let listener = tokio::net::TcpListener::bind(admin_addr).await?;
    info!(%admin_addr, "Admin API listening");

    axum::serve(listener, admin_router(stack.clone()))
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(error = %error, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        })
        .await?;

    stack.shutdown().await?;
    Ok(())
}
