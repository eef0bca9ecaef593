//! Aggregated response: the partitioned outcome of one `send` call.
//!
//! Built once, after the fan-out coordinator reports completion. The three
//! partitions are disjoint and their sizes sum to the number of runners
//! started. Order within a partition reflects neither registration order nor
//! completion order; consumers needing determinism resort explicitly (see
//! [`AggregatedResponse::sort_completed_by_duration`]).

use crate::handler::AnyValue;
use crate::recipient::RecipientIdentity;
use crate::runner::{Outcome, RunnerRecord};
use anyhow::anyhow;
use std::time::Duration;

/// A recipient that produced a result before the batch ended.
#[derive(Debug)]
pub struct CompletedEntry<R> {
    pub recipient: RecipientIdentity,
    pub result: R,
    pub duration: Duration,
}

/// A recipient whose invocation raised or completed with a failure.
#[derive(Debug)]
pub struct FaultedEntry {
    pub recipient: RecipientIdentity,
    /// The effective cause, after aggregate-of-one unwrapping.
    pub cause: anyhow::Error,
    pub duration: Duration,
}

/// A recipient that never reached a terminal state before the batch ended.
/// No result, no duration; the invocation may still be running unobserved.
#[derive(Debug)]
pub struct IncompleteEntry {
    pub recipient: RecipientIdentity,
}

/// Immutable snapshot of one scatter-gather batch.
#[derive(Debug)]
pub struct AggregatedResponse<R> {
    completed: Vec<CompletedEntry<R>>,
    faulted: Vec<FaultedEntry>,
    incomplete: Vec<IncompleteEntry>,
}

impl<R> AggregatedResponse<R> {
    pub fn completed(&self) -> &[CompletedEntry<R>] {
        &self.completed
    }

    pub fn faulted(&self) -> &[FaultedEntry] {
        &self.faulted
    }

    pub fn incomplete(&self) -> &[IncompleteEntry] {
        &self.incomplete
    }

    /// Number of runners the batch started; always equals the sum of the
    /// three partition sizes.
    pub fn total_invocations_count(&self) -> usize {
        self.completed.len() + self.faulted.len() + self.incomplete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_invocations_count() == 0
    }

    /// Every recipient identity across all three partitions.
    pub fn iter_identities(&self) -> impl Iterator<Item = &RecipientIdentity> {
        self.completed
            .iter()
            .map(|entry| &entry.recipient)
            .chain(self.faulted.iter().map(|entry| &entry.recipient))
            .chain(self.incomplete.iter().map(|entry| &entry.recipient))
    }

    /// Deterministic ordering helper for consumers that need one.
    pub fn sort_completed_by_duration(&mut self) {
        self.completed.sort_by_key(|entry| entry.duration);
    }

    pub fn into_parts(self) -> (Vec<CompletedEntry<R>>, Vec<FaultedEntry>, Vec<IncompleteEntry>) {
        (self.completed, self.faulted, self.incomplete)
    }
}

impl AggregatedResponse<AnyValue> {
    pub(crate) fn untyped(records: Vec<RunnerRecord>) -> Self {
        let mut response = Self {
            completed: Vec::new(),
            faulted: Vec::new(),
            incomplete: Vec::new(),
        };
        for record in records {
            match record.outcome {
                Some(Outcome::Succeeded(value)) => response.completed.push(CompletedEntry {
                    recipient: record.identity,
                    result: value,
                    duration: record.duration,
                }),
                Some(Outcome::Faulted(cause)) => response.faulted.push(FaultedEntry {
                    recipient: record.identity,
                    cause,
                    duration: record.duration,
                }),
                None => response.incomplete.push(IncompleteEntry {
                    recipient: record.identity,
                }),
            }
        }
        response
    }
}

impl<R: 'static> AggregatedResponse<R> {
    pub(crate) fn typed(records: Vec<RunnerRecord>) -> Self {
        let mut response = Self {
            completed: Vec::new(),
            faulted: Vec::new(),
            incomplete: Vec::new(),
        };
        for record in records {
            match record.outcome {
                Some(Outcome::Succeeded(value)) => match extract_result::<R>(value) {
                    Ok(result) => response.completed.push(CompletedEntry {
                        recipient: record.identity,
                        result,
                        duration: record.duration,
                    }),
                    Err(cause) => response.faulted.push(FaultedEntry {
                        recipient: record.identity,
                        cause,
                        duration: record.duration,
                    }),
                },
                Some(Outcome::Faulted(cause)) => response.faulted.push(FaultedEntry {
                    recipient: record.identity,
                    cause,
                    duration: record.duration,
                }),
                None => response.incomplete.push(IncompleteEntry {
                    recipient: record.identity,
                }),
            }
        }
        response
    }
}

/// Move a produced value into the caller's requested response type,
/// honoring the matcher's nullable variance: an operation that declared
/// `Option<R>` satisfies a query for `R` when it produced `Some`, and
/// produces a fault (not a phantom value) when it produced `None`.
fn extract_result<R: 'static>(value: AnyValue) -> Result<R, anyhow::Error> {
    match value.downcast::<R>() {
        Ok(result) => Ok(*result),
        Err(value) => match value.downcast::<Option<R>>() {
            Ok(optional) => (*optional)
                .ok_or_else(|| anyhow!("operation produced no value for the requested response type")),
            Err(_) => Err(anyhow!(
                "operation result does not match the requested response type"
            )),
        },
    }
}
