//! Periodic reconciliation with at most one pass in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use convoy_state::{Clock, Event};

use crate::reconciler::{PassSummary, Reconciler};

/// What happened to a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(PassSummary),
    /// Another pass was still running; this tick was dropped.
    Skipped,
    Failed(String),
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives a `Reconciler` on a fixed period.
#[derive(Clone)]
pub struct Controller {
    reconciler: Arc<Reconciler>,
    in_flight: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Run one pass unless one is already running.
    ///
    /// Pass errors are logged and, best-effort, recorded as an ERROR event.
    pub async fn try_tick(&self) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("reconcile pass still running, tick skipped");
            return TickOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        match self.reconciler.reconcile_once().await {
            Ok(summary) => TickOutcome::Completed(summary),
            Err(e) => {
                error!(error = %e, "reconcile pass failed");
                let now = self.reconciler.clock().now_ms();
                let event = Event::error(now, "Reconcile pass failed").explain(e.to_string());
                if let Err(record_err) = self.reconciler.store().record_event(event).await {
                    debug!(error = %record_err, "could not record pass failure");
                }
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    /// Tick every `interval` until `shutdown` flips.
    ///
    /// Each pass runs on its own task so the ticker keeps its cadence; ticks
    /// that land on a running pass are skipped. Outstanding passes are
    /// awaited before returning.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "controller started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut passes: Vec<JoinHandle<TickOutcome>> = Vec::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (done, pending) = std::mem::take(&mut passes)
                        .into_iter()
                        .partition(|h| h.is_finished());
                    passes = pending;
                    reap(done).await;
                    let controller = self.clone();
                    passes.push(tokio::spawn(async move { controller.try_tick().await }));
                }
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    break;
                }
            }
        }

        reap(passes).await;
    }
}

/// Await pass tasks, logging any that panicked or were cancelled.
/// Returns how many did not complete normally.
async fn reap(handles: Vec<JoinHandle<TickOutcome>>) -> usize {
    let mut aborted = 0;
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "reconcile pass aborted");
            aborted += 1;
        }
    }
    aborted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reap_counts_panicked_passes() {
        let ok = tokio::spawn(async { TickOutcome::Skipped });
        let panicked = tokio::spawn(async {
            if true {
                panic!("pass exploded");
            }
            TickOutcome::Skipped
        });
        assert_eq!(reap(vec![ok, panicked]).await, 1);
    }

    #[tokio::test]
    async fn reap_of_clean_passes_is_quiet() {
        let handles = (0..3).map(|_| tokio::spawn(async { TickOutcome::Skipped })).collect();
        assert_eq!(reap(handles).await, 0);
    }
}
