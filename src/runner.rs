//! Invocation runner: drives one prepared invocation to completion.
//!
//! State machine: `NotStarted → Running → {Succeeded, Faulted}`. A runner
//! that is abandoned before reaching a terminal state is never forced
//! terminal: the underlying work may keep running in the background after
//! the batch gives up on it, and a completion arriving after abandonment is
//! discarded so the batch snapshot stays consistent.

use crate::error::{effective_cause, panic_message, Error, HandlerPanic};
use crate::handler::AnyValue;
use crate::invocation::PreparedInvocation;
use crate::recipient::RecipientIdentity;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Posted into the fan-out coordinator's event channel whenever a runner is
/// accounted for: it finished, or the batch stopped protecting it.
#[derive(Debug)]
pub struct RunnerEvent {
    pub index: usize,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Completed { success: bool },
    Abandoned,
}

/// Terminal outcome of one invocation.
#[derive(Debug)]
pub enum Outcome {
    Succeeded(AnyValue),
    Faulted(anyhow::Error),
}

#[derive(Default)]
struct RunState {
    started: bool,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    outcome: Option<Outcome>,
    abandoned: bool,
}

/// Final per-runner state packaged into the aggregated response.
pub(crate) struct RunnerRecord {
    pub identity: RecipientIdentity,
    pub duration: Duration,
    pub outcome: Option<Outcome>,
}

/// Resolves when the run ends, successfully or not. Never propagates the
/// invocation's own failure.
#[derive(Debug)]
pub struct CompletionSignal(oneshot::Receiver<bool>);

impl CompletionSignal {
    /// `true` when the invocation succeeded, `false` when it faulted (or the
    /// runner task was torn down before reporting).
    pub async fn wait(self) -> bool {
        self.0.await.unwrap_or(false)
    }
}

pub struct InvocationRunner {
    identity: RecipientIdentity,
    operation: &'static str,
    accepts_cancellation: bool,
    token: CancellationToken,
    invocation: Mutex<Option<PreparedInvocation>>,
    state: Mutex<RunState>,
}

impl InvocationRunner {
    /// Wrap one prepared invocation. `token` is the cancellation signal
    /// handed to the invocation when it declared cancellation awareness.
    pub fn new(invocation: PreparedInvocation, token: CancellationToken) -> Self {
        Self {
            identity: invocation.identity().clone(),
            operation: invocation.operation_name(),
            accepts_cancellation: invocation.accepts_cancellation(),
            token,
            invocation: Mutex::new(Some(invocation)),
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn identity(&self) -> &RecipientIdentity {
        &self.identity
    }

    pub fn accepts_cancellation(&self) -> bool {
        self.accepts_cancellation
    }

    /// Launch the invocation on the parallel execution substrate.
    ///
    /// Records the start timestamp, reports completion into `events` and
    /// returns a signal that resolves to a success bool.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if called twice.
    pub fn start(
        self: &Arc<Self>,
        events: mpsc::UnboundedSender<RunnerEvent>,
        index: usize,
    ) -> Result<CompletionSignal, Error> {
        {
            let mut state = self.state.lock();
            if state.started {
                return Err(Error::InvalidOperation(
                    "invocation runner started twice".to_string(),
                ));
            }
            state.started = true;
            state.started_at = Some(Instant::now());
        }
        let invocation = match self.invocation.lock().take() {
            Some(invocation) => invocation,
            None => {
                return Err(Error::InvalidOperation(
                    "invocation already consumed".to_string(),
                ))
            }
        };

        let runner = Arc::clone(self);
        let token = self.token.clone();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            debug!(
                recipient = %runner.identity.display_name(),
                operation = runner.operation,
                "invocation start"
            );
            let start = Instant::now();
            let result = AssertUnwindSafe(async move { invocation.execute(token).await })
                .catch_unwind()
                .await;
            let outcome = match result {
                Ok(Ok(value)) => Outcome::Succeeded(value),
                Ok(Err(cause)) => Outcome::Faulted(effective_cause(cause)),
                Err(panic) => {
                    let message = panic_message(panic);
                    error!(
                        recipient = %runner.identity.display_name(),
                        operation = runner.operation,
                        panic_message = %message,
                        "invocation panicked"
                    );
                    Outcome::Faulted(HandlerPanic { message }.into())
                }
            };
            let success = matches!(outcome, Outcome::Succeeded(_));
            let recorded = runner.record(outcome);
            if recorded {
                info!(
                    recipient = %runner.identity.display_name(),
                    operation = runner.operation,
                    latency_ms = start.elapsed().as_millis() as u64,
                    success,
                    "invocation complete"
                );
            } else {
                debug!(
                    recipient = %runner.identity.display_name(),
                    operation = runner.operation,
                    "completion after abandonment discarded"
                );
            }
            let _ = events.send(RunnerEvent {
                index,
                kind: EventKind::Completed { success },
            });
            let _ = done_tx.send(success);
        });
        Ok(CompletionSignal(done_rx))
    }

    fn record(&self, outcome: Outcome) -> bool {
        let mut state = self.state.lock();
        if state.abandoned {
            return false;
        }
        state.finished_at = Some(Instant::now());
        state.outcome = Some(outcome);
        true
    }

    /// Stop protecting this runner: a later completion will be discarded.
    /// Returns `false` when the runner already reached a terminal state (or
    /// was abandoned before).
    pub(crate) fn abandon(&self) -> bool {
        let mut state = self.state.lock();
        if state.outcome.is_some() || state.abandoned {
            return false;
        }
        state.abandoned = true;
        true
    }

    /// Finish minus start once both are set; zero while pending.
    pub fn duration(&self) -> Duration {
        let state = self.state.lock();
        match (state.started_at, state.finished_at) {
            (Some(started), Some(finished)) => finished.duration_since(started),
            _ => Duration::ZERO,
        }
    }

    pub(crate) fn snapshot(&self) -> RunnerRecord {
        let mut state = self.state.lock();
        let duration = match (state.started_at, state.finished_at) {
            (Some(started), Some(finished)) => finished.duration_since(started),
            _ => Duration::ZERO,
        };
        RunnerRecord {
            identity: self.identity.clone(),
            duration,
            outcome: state.outcome.take(),
        }
    }
}
