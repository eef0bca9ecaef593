//! Aggregator: the scatter-gather entry point.
//!
//! One `send` resolves the eligible recipients for the request type, prepares
//! an invocation per matched operation, fans them out through a
//! [`FanOutCoordinator`] and returns the partitioned [`AggregatedResponse`].
//! Deadline handling is two-phase: when the primary deadline fires, runners
//! that never declared cancellation awareness are abandoned on the spot,
//! cooperative runners get the configured cancellation window, and the batch
//! is force-resolved when the window elapses.

use crate::cancel::CancellationGroup;
use crate::collection::RecipientsCollection;
use crate::coordinator::FanOutCoordinator;
use crate::error::Error;
use crate::handler::AnyValue;
use crate::invocation::Envelope;
use crate::matcher::TypeToken;
use crate::options::{Deadline, ScatterGatherOptions};
use crate::response::AggregatedResponse;
use crate::runner::{EventKind, InvocationRunner, RunnerEvent, RunnerRecord};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Aggregator {
    recipients: Arc<RecipientsCollection>,
}

impl Aggregator {
    pub fn new(recipients: Arc<RecipientsCollection>) -> Self {
        Self { recipients }
    }

    pub fn recipients(&self) -> &Arc<RecipientsCollection> {
        &self.recipients
    }

    /// Scatter `request` to every recipient able to accept it and gather
    /// whatever each produced, untyped.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when an eligible recipient fails invocation
    /// preparation; resolution and preparation use the same matcher, so this
    /// indicates recipient state changed mid-call.
    pub async fn send<Req>(
        &self,
        request: Req,
        deadline: Deadline,
        options: ScatterGatherOptions,
    ) -> Result<AggregatedResponse<AnyValue>, Error>
    where
        Req: Clone + Send + Sync + 'static,
    {
        let envelope = Envelope::new(request);
        let records = self.dispatch(envelope, None, deadline, options).await?;
        Ok(AggregatedResponse::untyped(records))
    }

    /// Scatter `request` to every recipient able to accept it and reply with
    /// `Resp`, gathering typed results.
    pub async fn send_expecting<Req, Resp>(
        &self,
        request: Req,
        deadline: Deadline,
        options: ScatterGatherOptions,
    ) -> Result<AggregatedResponse<Resp>, Error>
    where
        Req: Clone + Send + Sync + 'static,
        Resp: 'static,
    {
        let envelope = Envelope::new(request);
        let wanted = TypeToken::of::<Resp>();
        let records = self
            .dispatch(envelope, Some(wanted), deadline, options)
            .await?;
        Ok(AggregatedResponse::typed(records))
    }

    async fn dispatch(
        &self,
        envelope: Envelope,
        response: Option<TypeToken>,
        deadline: Deadline,
        options: ScatterGatherOptions,
    ) -> Result<Vec<RunnerRecord>, Error> {
        let started = Instant::now();
        let resolution = self.recipients.resolve(envelope.token(), response.as_ref());
        for skipped in resolution.skipped() {
            warn!(
                recipient = %skipped.recipient.display_name(),
                handler_type = skipped.notice.handler_type,
                request_type = skipped.notice.request_type,
                matching_operations = skipped.notice.matching_operations,
                "recipient skipped: ambiguous capability match"
            );
        }

        // Batch-wide cancellation topology. `primary` is the caller's
        // deadline, `batch` resolves the coordinator, and every invocation
        // observes the union of the two.
        let mut primary = CancellationGroup::new();
        match &deadline {
            Deadline::None => {}
            Deadline::After(after) => primary.link_timeout(*after),
            Deadline::Signal(signal) => primary.link(signal.clone()),
        }
        let batch = CancellationGroup::new();
        let invoke = CancellationGroup::from_sources([primary.token(), batch.token()]);

        let mut runners: Vec<Arc<InvocationRunner>> = Vec::new();
        for recipient in resolution.eligible() {
            // Scoped lifetimes share one instance within this call only.
            let scoped = recipient.clone_for_scope();
            for invocation in scoped.prepare_invocations(&envelope, response.as_ref())? {
                runners.push(Arc::new(InvocationRunner::new(invocation, invoke.token())));
            }
        }
        info!(
            request_type = envelope.token().name(),
            response_type = response.as_ref().map(|t| t.name()),
            recipients = resolution.eligible_count(),
            invocations = runners.len(),
            limit = options.limit.map(|limit| limit.get()),
            "scatter"
        );

        let coordinator = FanOutCoordinator::new(runners.clone(), options.limit);
        coordinator.start(&batch)?;

        if !matches!(deadline, Deadline::None) {
            spawn_deadline_supervisor(
                &primary,
                &batch,
                &coordinator,
                runners.clone(),
                &options,
            );
        }

        coordinator.wait().await;

        // Anything still running is now unprotected; a completion arriving
        // past this point is discarded rather than mutating the snapshot.
        for runner in &runners {
            runner.abandon();
        }
        batch.cancel();
        invoke.cancel();

        let records: Vec<RunnerRecord> = runners.iter().map(|runner| runner.snapshot()).collect();
        let completed = records
            .iter()
            .filter(|record| record.outcome.is_some())
            .count();
        debug!(
            invocations = records.len(),
            resolved = completed,
            incomplete = records.len() - completed,
            latency_ms = started.elapsed().as_millis() as u64,
            "gather"
        );
        Ok(records)
    }
}

/// Watches the primary deadline. When it fires, runners outside the
/// cancellation window's protection are abandoned immediately and the batch
/// is force-resolved once the window elapses.
fn spawn_deadline_supervisor(
    primary: &CancellationGroup,
    batch: &CancellationGroup,
    coordinator: &FanOutCoordinator,
    runners: Vec<Arc<InvocationRunner>>,
    options: &ScatterGatherOptions,
) {
    let primary_token = primary.token();
    let batch_token = batch.token();
    let events = coordinator.events_sender();
    let window = options.cancellation_window;
    let protect_all = options.allow_cancellation_window_on_all_recipients;
    tokio::spawn(async move {
        tokio::select! {
            _ = batch_token.cancelled() => return,
            _ = primary_token.cancelled() => {}
        }
        let mut abandoned = 0usize;
        for (index, runner) in runners.iter().enumerate() {
            if protect_all || runner.accepts_cancellation() {
                continue;
            }
            if runner.abandon() {
                abandoned += 1;
                let _ = events.send(RunnerEvent {
                    index,
                    kind: EventKind::Abandoned,
                });
            }
        }
        debug!(
            abandoned,
            window_ms = window.as_millis() as u64,
            "deadline reached - cancellation window open"
        );
        tokio::select! {
            _ = batch_token.cancelled() => {}
            _ = tokio::time::sleep(window) => {
                debug!("cancellation window elapsed - resolving batch");
                batch_token.cancel();
            }
        }
    });
}
