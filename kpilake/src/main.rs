use std::sync::Arc;

use anyhow::Result;
use kpilake::engine::AthenaEngine;
use kpilake::telemetry::init_tracing;
use kpilake::{Server, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServiceConfig::load_default()?;
    config.validate()?;
    let engine = AthenaEngine::from_config(&config.athena).await?;

    Server::new(config, Arc::new(engine))?.run().await
}
