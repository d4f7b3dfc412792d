use anyhow::{Context, Result};
use tracing::info;

use noitlink_core::{metrics, Config, IngestOrchestrator};

/// Run one ingestion pass and print its summary as JSON.
pub async fn execute(config: &Config, print_metrics: bool) -> Result<()> {
    info!(
        "Ingesting journals from {}:{}{} into {:?}",
        config.ingest.host, config.ingest.port, config.ingest.path, config.store.path
    );

    let orchestrator =
        IngestOrchestrator::from_config(config).context("Failed to set up ingestion")?;
    let summary = orchestrator.run().await.context("Ingestion aborted")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if print_metrics {
        print!("{}", metrics::render().context("Failed to render metrics")?);
    }
    Ok(())
}
