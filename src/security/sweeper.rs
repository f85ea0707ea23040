//! Background cleanup bound to the server lifecycle.
//!
//! Drops expired rate limit windows and expired lockout records on a fixed
//! period. Started by the server action and shut down with it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, warn};

use super::{RateLimiter, SecurityService};

const MIN_PERIOD: Duration = Duration::from_millis(10);

pub struct Sweeper {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the cleanup loop on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        limiter: Arc<RateLimiter>,
        service: Arc<SecurityService>,
        period: Duration,
    ) -> Self {
        let (shutdown, mut stop) = oneshot::channel::<()>();
        let period = period.max(MIN_PERIOD);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => sweep(&limiter, &service).await,
                }
            }
            debug!("sweeper stopped");
        });

        Self {
            shutdown: Some(shutdown),
            handle,
        }
    }

    /// Stop the loop and wait for the in-flight sweep, if any, to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = self.handle.await {
            error!("Sweeper task failed: {err}");
        }
    }
}

async fn sweep(limiter: &RateLimiter, service: &SecurityService) {
    let windows = limiter.cleanup();
    match service.purge_expired().await {
        Ok(lockouts) => debug!(windows, lockouts, "sweep complete"),
        Err(err) => warn!(windows, "Failed to purge expired lockouts: {err}"),
    }
}
