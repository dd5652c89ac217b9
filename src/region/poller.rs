//! Region Poller
//!
//! Background task that re-probes every region on a fixed interval.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::manager::ManagerShared;

/// Poll loop for one connection manager
pub(crate) struct Poller {
    shared: Arc<ManagerShared>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl Poller {
    pub(crate) fn new(shared: Arc<ManagerShared>, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            shared,
            interval,
            shutdown,
        }
    }

    /// Run until cancelled.
    ///
    /// A panic inside one cycle is logged and the loop goes on with the
    /// next tick.
    pub(crate) async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; regions were just probed at start
        ticker.tick().await;

        info!("Region poller started, interval: {:?}", self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cycle = AssertUnwindSafe(self.shared.poll_once()).catch_unwind();
            match cycle.await {
                Ok(true) => debug!("Poll cycle rebuilt regional connections"),
                Ok(false) => {}
                Err(panic) => {
                    self.shared.metrics().record_poll_panic();
                    error!(panic = %panic_message(&*panic), "Poll cycle panicked");
                }
            }
        }

        info!("Region poller stopped");
    }

    /// Spawn the poller as a background task
    pub(crate) fn spawn(
        shared: Arc<ManagerShared>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(Self::new(shared, interval, shutdown).run())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
