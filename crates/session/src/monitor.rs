//! Background expiry monitor
//!
//! Polls the stored token on a fixed interval, raises the expiry warning and
//! schedules the delayed refresh trigger.

use crate::manager::{SessionManager, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Spawns the monitor task for a session manager
#[derive(Debug)]
pub struct ExpiryMonitor;

impl ExpiryMonitor {
    /// Start polling on the manager's configured interval
    ///
    /// Must be called from within a tokio runtime. The first check runs
    /// immediately.
    pub fn start(manager: Arc<SessionManager>) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let interval = manager.settings().monitor_interval();
        let delay = manager.settings().refresh_delay();

        info!(
            interval_ms = interval.as_millis(),
            refresh_delay_ms = delay.as_millis(),
            "Starting expiry monitor"
        );
        let task = tokio::spawn(run(manager, interval, delay, cancel.clone()));

        MonitorHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Controls a running monitor; dropping it stops the monitor
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop polling and cancel a scheduled refresh trigger
    ///
    /// A refresh call already in flight is left to finish.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop and wait for the monitor task to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Expiry monitor task ended abnormally");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    manager: Arc<SessionManager>,
    interval: Duration,
    delay: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if pending.as_ref().is_some_and(JoinHandle::is_finished) {
            pending = None;
        }

        let outcome = manager.check_expiry().await;
        trace!(?outcome, "Expiry check");

        if outcome == TickOutcome::Warned && pending.is_none() {
            debug!(delay_ms = delay.as_millis(), "Scheduling token refresh");
            pending = Some(tokio::spawn(scheduled_refresh(
                manager.clone(),
                delay,
                cancel.child_token(),
            )));
        }
    }

    info!("Expiry monitor stopped");
}

async fn scheduled_refresh(manager: Arc<SessionManager>, delay: Duration, cancel: CancellationToken) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("Scheduled refresh cancelled");
            return;
        }
        () = tokio::time::sleep(delay) => {}
    }
    manager.run_scheduled_refresh().await;
}
