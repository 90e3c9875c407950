//! COREP assistant HTTP server.
//!
//! ```bash
//! GITHUB_TOKEN=... PORT=8000 RUST_LOG=info cargo run --bin corep_server
//!
//! curl http://localhost:8000/health
//! curl -X POST http://localhost:8000/analyze \
//!   -H "Content-Type: application/json" \
//!   -d '{"scenario": "Share capital of £500m and RWA of £4,000m", "template": "CA1"}'
//! ```

use corep_assistant::server::serve;
use corep_assistant::AssistantConfig;
use dotenv::dotenv;
use log::info;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let config = AssistantConfig::from_env();
    info!(
        "Starting COREP assistant on port {} (model {}: {})",
        config.port,
        config.model_name,
        if config.model_configured() {
            "enabled"
        } else {
            "disabled"
        }
    );

    serve(config).await?;
    Ok(())
}
