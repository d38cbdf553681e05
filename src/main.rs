// SPDX-License-Identifier: MIT
use anyhow::Result;
use otel_fanout::config::TelemetryConfig;
use otel_fanout::telemetry::init_telemetry;
use tracing::{info, instrument, warn};

#[instrument]
async fn simulated_work(job: u64) {
    info!(task = "simulated_work", "starting task");
    // Placeholder for actual business logic
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    info!(task = "simulated_work", "completed task");
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = init_telemetry(TelemetryConfig::from_env()?)?;
    if telemetry.is_exporting() {
        info!("application started");
    } else {
        warn!("application started without a collector");
    }

    simulated_work(1).await;

    info!("shutting down");
    telemetry.shutdown()?;
    Ok(())
}
