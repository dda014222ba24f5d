//! Watch mode — re-evaluates on a fixed interval until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::member::Member;

pub async fn run_watch(member: Member, interval: Duration) -> anyhow::Result<()> {
    info!(interval_secs = interval.as_secs(), "watching for upgrade signals");
    let member = Arc::new(member);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Hooks and the store block; keep them off the runtime threads.
                    let member = Arc::clone(&member);
                    match tokio::task::spawn_blocking(move || member.evaluate()).await {
                        Ok(Ok(Some(evaluation))) => debug!(
                            phase = ?evaluation.phase,
                            upgraded = evaluation.upgraded,
                            "tick evaluated"
                        ),
                        Ok(Ok(None)) => {}
                        Ok(Err(e)) => warn!(error = %format!("{e:#}"), "evaluation failed"),
                        Err(e) => error!(error = %e, "evaluation task panicked"),
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    info!("watch stopped");
    Ok(())
}
