use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, instrument, warn};

use super::clock::RoundClock;
use super::coordinator::{RolloverOutcome, RoundRolloverCoordinator};
use crate::shared::ArenaError;
use crate::shutdown::ShutdownSignal;

/// Starts the background task that prepares each round's successor before it goes live.
///
/// Runs until `shutdown` fires.
#[instrument(skip(coordinator, clock, shutdown))]
pub async fn start_rollover_task(
    coordinator: Arc<RoundRolloverCoordinator>,
    clock: Arc<dyn RoundClock>,
    poll_interval: Duration,
    mut shutdown: ShutdownSignal,
) {
    info!(
        poll_interval_secs = poll_interval.as_secs(),
        "Starting round rollover background task"
    );

    let mut poll = interval(poll_interval);

    loop {
        tokio::select! {
            _ = poll.tick() => {}
            _ = shutdown.cancelled() => {
                info!("Round rollover task stopping");
                return;
            }
        }

        match run_pending_rollovers(&coordinator, clock.as_ref(), &shutdown).await {
            Ok(0) => {}
            Ok(completed) => info!(completed, "Round rollovers completed"),
            Err(ArenaError::Cancelled) => {
                info!("Round rollover task stopping mid-run");
                return;
            }
            Err(e) => error!(error = %e, "Round rollover task failed"),
        }
    }
}

/// Runs every due rollover in order, stopping at the first failure so later
/// rounds are never prepared from a stale source
pub(crate) async fn run_pending_rollovers(
    coordinator: &RoundRolloverCoordinator,
    clock: &dyn RoundClock,
    shutdown: &ShutdownSignal,
) -> Result<usize, ArenaError> {
    let pending = clock.pending_rollovers().await?;
    let mut completed = 0;

    for rollover in &pending {
        match coordinator
            .prepare_next_round(&rollover.season, rollover.source_round, shutdown)
            .await
        {
            Ok(RolloverOutcome::Skipped) => {}
            Ok(RolloverOutcome::Completed(_)) => completed += 1,
            Err(e) => {
                warn!(
                    season_id = rollover.season.id,
                    source_round = rollover.source_round,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Rollover failed, will retry on next poll"
                );
                return Err(e);
            }
        }
        clock.complete(rollover).await?;
    }

    Ok(completed)
}
