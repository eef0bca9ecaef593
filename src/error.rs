//! Error taxonomy for the scatter-gather dispatcher.
//!
//! Two kinds of failure flow through this crate and they never mix:
//!
//! - [`Error`]: synchronous misuse surfaced to the caller (`InvalidArgument`,
//!   `InvalidOperation`). A `send` call only ever fails with these; per-recipient
//!   outcomes are always reported inside the aggregated response instead.
//! - Fault causes: whatever a handler operation raised, carried as
//!   [`anyhow::Error`] values inside `Faulted` entries. [`AggregateFault`] and
//!   [`HandlerPanic`] are the two framework-defined cause shapes.

use std::any::Any;
use thiserror::Error;

/// Synchronous, caller-facing errors. Always fatal to the specific call,
/// never retried by the framework.
#[derive(Debug, Error)]
pub enum Error {
    /// Null/invalid input at resolution time.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller or framework bug: starting a runner twice, preparing an
    /// invocation for a recipient that cannot accept it.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Multi-cause failure, typically raised by a handler's own internal fan-out.
///
/// An aggregate holding exactly one inner cause is unwrapped recursively to
/// that cause before it reaches a `Faulted` entry; an aggregate with several
/// causes is kept as-is so the caller sees all of them.
#[derive(Debug, Error)]
#[error("aggregate fault with {} inner cause(s)", .causes.len())]
pub struct AggregateFault {
    pub(crate) causes: Vec<anyhow::Error>,
}

impl AggregateFault {
    pub fn new(causes: Vec<anyhow::Error>) -> Self {
        Self { causes }
    }

    pub fn causes(&self) -> &[anyhow::Error] {
        &self.causes
    }

    pub fn into_causes(self) -> Vec<anyhow::Error> {
        self.causes
    }
}

/// A handler panicked while executing an invocation.
///
/// The panic is caught on the invocation's own task (it never takes sibling
/// invocations down) and surfaced as the effective cause of a `Faulted` entry.
#[derive(Debug, Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    pub message: String,
}

/// Best-effort extraction of a printable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

/// Reduce a raw invocation failure to its effective cause: an aggregate
/// holding exactly one inner cause collapses, recursively, to that cause.
pub(crate) fn effective_cause(mut cause: anyhow::Error) -> anyhow::Error {
    loop {
        match cause.downcast::<AggregateFault>() {
            Ok(AggregateFault { mut causes }) => match (causes.len(), causes.pop()) {
                (1, Some(inner)) => cause = inner,
                (_, Some(last)) => {
                    causes.push(last);
                    return AggregateFault { causes }.into();
                }
                (_, None) => return AggregateFault { causes }.into(),
            },
            Err(original) => return original,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_of_one_unwraps_recursively() {
        let leaf = anyhow::anyhow!("leaf failure");
        let wrapped: anyhow::Error =
            AggregateFault::new(vec![AggregateFault::new(vec![leaf]).into()]).into();
        let cause = effective_cause(wrapped);
        assert_eq!(cause.to_string(), "leaf failure");
    }

    #[test]
    fn aggregate_of_many_is_kept() {
        let wrapped: anyhow::Error =
            AggregateFault::new(vec![anyhow::anyhow!("a"), anyhow::anyhow!("b")]).into();
        let cause = effective_cause(wrapped);
        let agg = cause.downcast_ref::<AggregateFault>().unwrap();
        assert_eq!(agg.causes().len(), 2);
    }
}
