use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::services::subscription::SubscriptionService;

/// Background loop that walks the ledger on a fixed interval, expiring
/// finished periods and promoting confirmed renewals whose start date has
/// arrived. Runs are spawned off the ticker; an overlap guard keeps a
/// slow sweep from stacking up behind the next tick.
pub fn spawn_expiry_task(service: SubscriptionService, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let running = Arc::new(AtomicBool::new(false));
        log::info!("expiry sweep scheduled every {}s", interval_secs);

        loop {
            interval.tick().await;

            if running.swap(true, Ordering::SeqCst) {
                log::warn!("previous expiry sweep still running, skipping this tick");
                continue;
            }

            let service = service.clone();
            let running = running.clone();
            tokio::spawn(async move {
                match service.run_expiry_sweep().await {
                    Ok(outcome) => {
                        log::debug!(
                            "expiry sweep finished: {} expired, {} promoted",
                            outcome.expired,
                            outcome.promoted
                        );
                    }
                    Err(err) => log::error!("expiry sweep failed: {:#}", err),
                }
                running.store(false, Ordering::SeqCst);
            });
        }
    });
}
