//! Fan-out coordinator: starts a batch of runners and resolves once the
//! batch is complete.
//!
//! The batch is complete when every runner is accounted for (finished or
//! abandoned), a configured success quorum is reached, or the batch's
//! cancellation group fires. Runner completions arrive over a single mpsc
//! channel consumed by one evaluation task; the single consumer is the
//! mutually-exclusive evaluation step, so double-resolution races cannot
//! occur. The coordinator never blocks the caller; completion is observed
//! through [`FanOutCoordinator::wait`].

use crate::cancel::CancellationGroup;
use crate::error::Error;
use crate::runner::{EventKind, InvocationRunner, RunnerEvent};
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

pub struct FanOutCoordinator {
    runners: Vec<Arc<InvocationRunner>>,
    limit: Option<NonZeroUsize>,
    events_tx: mpsc::UnboundedSender<RunnerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<RunnerEvent>>>,
    done_tx: Mutex<Option<watch::Sender<bool>>>,
    done_rx: watch::Receiver<bool>,
    started: AtomicBool,
}

impl FanOutCoordinator {
    pub fn new(runners: Vec<Arc<InvocationRunner>>, limit: Option<NonZeroUsize>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            runners,
            limit,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
            started: AtomicBool::new(false),
        }
    }

    /// Sender side of the runner event channel, for supervisors that
    /// account runners on the batch's behalf (abandonment at a deadline).
    pub fn events_sender(&self) -> mpsc::UnboundedSender<RunnerEvent> {
        self.events_tx.clone()
    }

    /// Start every runner and the evaluation task. Idempotent: a second
    /// call is a no-op. An empty runner list resolves immediately.
    pub fn start(&self, group: &CancellationGroup) -> Result<(), Error> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let done_tx = match self.done_tx.lock().take() {
            Some(tx) => tx,
            None => return Ok(()),
        };
        if self.runners.is_empty() {
            let _ = done_tx.send(true);
            return Ok(());
        }
        let mut rx = match self.events_rx.lock().take() {
            Some(rx) => rx,
            None => return Ok(()),
        };

        for (index, runner) in self.runners.iter().enumerate() {
            // The per-runner completion signal is observed through the
            // shared event channel here, not individually.
            let _ = runner.start(self.events_tx.clone(), index)?;
        }

        let group_token = group.token();
        let total = self.runners.len();
        let limit = self.limit;
        tokio::spawn(async move {
            let mut accounted = vec![false; total];
            let mut accounted_count = 0usize;
            let mut successes = 0usize;
            loop {
                tokio::select! {
                    _ = group_token.cancelled() => {
                        debug!(accounted = accounted_count, total, "batch cancelled");
                        break;
                    }
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if accounted.get(event.index).copied().unwrap_or(true) {
                            // Late completion of an already-abandoned runner.
                            continue;
                        }
                        accounted[event.index] = true;
                        accounted_count += 1;
                        if matches!(event.kind, EventKind::Completed { success: true }) {
                            successes += 1;
                            if limit.is_some_and(|limit| successes >= limit.get()) {
                                debug!(successes, "success quorum reached - cancelling remainder");
                                group_token.cancel();
                                break;
                            }
                        }
                        if accounted_count == total {
                            debug!(total, successes, "all runners accounted");
                            break;
                        }
                    }
                }
            }
            let _ = done_tx.send(true);
        });
        Ok(())
    }

    /// Resolves once the batch is complete. Resolves immediately if it
    /// already is.
    pub async fn wait(&self) {
        let mut rx = self.done_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}
