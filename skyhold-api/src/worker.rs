use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::reservations::publish_expired;
use crate::state::AppState;

/// Runs the expiration sweep every `period` until the runtime shuts down.
pub fn spawn_sweep_worker(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_seconds = period.as_secs(), "Sweep worker started");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            sweep_once(&state).await;
        }
    })
}

/// One sweep. Failures are logged and the next tick tries again.
pub async fn sweep_once(state: &AppState) -> usize {
    match state.reservations.expire_sweep().await {
        Ok(report) => {
            publish_expired(state, &report);
            report.expired_count()
        }
        Err(e) => {
            error!(error = ?e, "Expiration sweep failed");
            0
        }
    }
}
