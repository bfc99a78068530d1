//! Footfall - Standalone Web Server
//!
//! Runs the automation controller behind a web API.
//!
//! Environment variables:
//! - `FOOTFALL_PORT` - Server port (default: 3000)

use std::sync::Arc;

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = footfall::init_logging();

    info!("Starting Footfall (server mode)");

    if let Some(dir) = footfall::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let port: u16 = std::env::var("FOOTFALL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let state = Arc::new(footfall::AppState::new());
    info!("Application state initialized");

    footfall::web::start_server(state, port)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Ok(())
}
