//! The external HTTP surface, MQTT fan-out, and `/metrics` endpoint
//! (spec §6). Wires the scheduler endpoints onto a `DecisionController`
//! shared with the reconciliation controllers in the same process.

pub mod http;
pub mod mqtt;

pub use http::{router, AppState};
pub use mqtt::MqttPublisher;

/// Runs the axum server until the process is terminated.
pub async fn serve(addr: std::net::SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    log::info!("cortex-server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
