use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;
use uuid::Uuid;

use noitlink_core::{Config, LivestreamClient};

/// Print each frame on its own line until interrupted or the daemon hangs up.
pub async fn execute(config: &Config, uuid: Uuid, period_ms: u32) -> Result<()> {
    let client = LivestreamClient::new(&config.daemon, config.livestream.max_frame_bytes)
        .context("Failed to create livestream client")?;

    let mut handle = client
        .subscribe(uuid, period_ms, |frame| println!("{}", frame))
        .await
        .with_context(|| format!("Failed to open livestream for {}", uuid))?;

    let interrupted = tokio::select! {
        _ = signal::ctrl_c() => true,
        result = handle.wait() => {
            result.with_context(|| format!("Livestream for {} terminated", uuid))?;
            false
        }
    };

    if interrupted {
        info!(uuid = %uuid, "Interrupted, closing livestream");
        handle.close();
        handle.wait().await?;
    }
    Ok(())
}
