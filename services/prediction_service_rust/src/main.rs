use std::sync::Arc;

use anyhow::Result;
use dotenv::dotenv;
use hoopcast_core::clients::EspnClient;
use hoopcast_core::injury::InjuryAdjustmentCache;
use prediction_service_rust::{PredictionService, ServiceConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Prediction Service...");

    let config = ServiceConfig::from_env();
    config.log_config();

    let espn = Arc::new(EspnClient::new());
    let injuries = Arc::new(InjuryAdjustmentCache::new(
        espn.clone(),
        config.pipeline.injury.clone(),
    ));

    let service = PredictionService::new(config, espn, injuries)?;
    service.run().await
}
