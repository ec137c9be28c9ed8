//! Periodic expiry sweep.
//!
//! Optional: deployments that schedule `POST /api/v1/seals/expire` or the admin
//! `expire-sweep` command externally leave this disabled.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use super::SealService;

/// Runs [`SealService::process_expired_seals`] on a fixed interval
pub struct ExpirySweeper {
    service: Arc<SealService>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(service: Arc<SealService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Read `SEAL_EXPIRY_SWEEP_INTERVAL_SECS`; unset or `0` disables the sweeper
    pub fn interval_from_env() -> Option<Duration> {
        std::env::var("SEAL_EXPIRY_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Sweep forever. Errors are logged and the next tick tries again.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.service.process_expired_seals().await {
                Ok(count) => debug!(count, "Expiry sweep tick"),
                Err(e) => error!(error = %e, "Expiry sweep failed"),
            }
        }
    }
}
