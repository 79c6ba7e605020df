pub mod config;
pub mod errors;
pub mod export;
pub mod metrics_defs;
pub mod params;
pub mod relay;
pub mod service;
pub mod upstream;

#[cfg(test)]
mod testutils;

use errors::GatewayError;
use service::{Gateway, GatewayService};
use shared::admin_service::AdminService;
use shared::http::run_http_service;

/// Serves the public API and the admin endpoints until either listener fails.
pub async fn run(config: config::Config) -> Result<(), GatewayError> {
    tracing::info!(sonarqube = ?config.sonarqube, "Starting measures gateway");

    let gateway = Gateway::new(config.sonarqube)?;
    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        GatewayService::new(gateway),
    );

    // Config is loaded before either listener starts; ready once listening.
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<_, GatewayError>::new(|| true),
    );

    tokio::try_join!(gateway_task, admin_task)?;
    Ok(())
}
