//! Tests for the scatter-gather aggregator
//!
//! # Test Coverage
//!
//! - Fan-out reaches every capable recipient, and only those
//! - Partition completeness: completed + faulted + incomplete accounts for
//!   every invocation, with no entry in two partitions
//! - Synchronous and asynchronous operations behave identically
//! - Typed (`send_expecting`) and untyped (`send`) result surfaces
//! - Zero-parameter dispatch through the `NoRequest` sentinel
//! - Nullable variance end to end, on both the request and response side
//! - Fault reporting: handler errors and handler panics

use brrtscatter::{
    Aggregator, CollisionPolicy, Deadline, HandlerPanic, NoRequest, Operations,
    RecipientsCollection, Registration, ScatterGatherOptions, ScatterHandler,
};
use anyhow::anyhow;
use std::collections::HashSet;
use std::sync::Arc;

mod tracing_util;
use tracing_util::TestTracing;

fn aggregator(recipients: RecipientsCollection) -> Aggregator {
    Aggregator::new(Arc::new(recipients))
}

async fn send_u32(aggregator: &Aggregator, request: u32) -> brrtscatter::AggregatedResponse<u32> {
    aggregator
        .send_expecting::<u32, u32>(request, Deadline::None, ScatterGatherOptions::default())
        .await
        .expect("send")
}

#[tokio::test]
async fn gathers_from_every_capable_recipient() {
    let _tracing = TestTracing::init();
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("double"), |n: u32| n * 2);
    recipients.add_async_fn(Some("async-triple"), |n: u32| async move { n * 3 });
    recipients.add_try_fn(Some("failing"), |_n: u32| -> anyhow::Result<u32> {
        Err(anyhow!("ledger unavailable"))
    });
    // Wrong request type; must not be invoked.
    recipients.add_fn(Some("stringly"), |s: String| s.len() as u32);

    let response = send_u32(&aggregator(recipients), 10).await;
    assert_eq!(response.total_invocations_count(), 3);
    assert_eq!(response.completed().len(), 2);
    assert_eq!(response.faulted().len(), 1);
    assert!(response.incomplete().is_empty());

    let mut results: Vec<u32> = response.completed().iter().map(|e| e.result).collect();
    results.sort_unstable();
    assert_eq!(results, vec![20, 30]);

    // Partition disjointness: every invocation appears exactly once.
    let ids: HashSet<_> = response.iter_identities().map(|identity| identity.id).collect();
    assert_eq!(ids.len(), response.total_invocations_count());
}

#[derive(Default)]
struct Mixed;

impl ScatterHandler for Mixed {
    fn operations(ops: &mut Operations<Self>) {
        ops.handle("sync", |_this, n: u32| n + 1);
        ops.handle_async("async", |_this, n: u32| async move { n + 1 });
    }
}

#[tokio::test]
async fn sync_and_async_operations_are_uniform() {
    let recipients = RecipientsCollection::new();
    recipients.add_with::<Mixed>(
        Registration::default().policy(CollisionPolicy::UseAllMatchingOperations),
    );
    let response = send_u32(&aggregator(recipients), 5).await;
    assert_eq!(response.completed().len(), 2);
    assert!(response.completed().iter().all(|entry| entry.result == 6));
}

#[tokio::test]
async fn untyped_send_gathers_heterogeneous_results() {
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("label"), |n: u8| format!("#{n}"));
    recipients.add_fn(Some("wide"), |n: u8| n as u64 * 100);

    let response = aggregator(recipients)
        .send(3u8, Deadline::None, ScatterGatherOptions::default())
        .await
        .expect("send");
    assert_eq!(response.completed().len(), 2);

    let (completed, faulted, incomplete) = response.into_parts();
    assert!(faulted.is_empty() && incomplete.is_empty());
    let mut labels = 0;
    let mut wides = 0;
    for entry in completed {
        if let Ok(label) = entry.result.downcast::<String>() {
            assert_eq!(*label, "#3");
            labels += 1;
        } else {
            wides += 1;
        }
    }
    assert_eq!((labels, wides), (1, 1));
}

#[tokio::test]
async fn no_request_sentinel_reaches_parameterless_operations() {
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("ping"), |_: NoRequest| "pong".to_string());
    recipients.add_fn(Some("unrelated"), |n: u32| n);

    let response = aggregator(recipients)
        .send_expecting::<NoRequest, String>(
            NoRequest,
            Deadline::None,
            ScatterGatherOptions::default(),
        )
        .await
        .expect("send");
    assert_eq!(response.completed().len(), 1);
    assert_eq!(response.completed()[0].result, "pong");
}

#[tokio::test]
async fn plain_request_feeds_optional_parameter() {
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("optional-intake"), |n: Option<u32>| n.unwrap_or(0) + 1);
    let response = send_u32(&aggregator(recipients), 41).await;
    assert_eq!(response.completed().len(), 1);
    assert_eq!(response.completed()[0].result, 42);
}

#[tokio::test]
async fn some_request_feeds_plain_parameter() {
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("plain-intake"), |n: u32| n + 1);
    let response = aggregator(recipients)
        .send_expecting::<Option<u32>, u32>(
            Some(4),
            Deadline::None,
            ScatterGatherOptions::default(),
        )
        .await
        .expect("send");
    assert_eq!(response.completed().len(), 1);
    assert_eq!(response.completed()[0].result, 5);
}

#[tokio::test]
async fn none_request_to_plain_parameter_faults() {
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("plain-intake"), |n: u32| n + 1);
    let response = aggregator(recipients)
        .send_expecting::<Option<u32>, u32>(None, Deadline::None, ScatterGatherOptions::default())
        .await
        .expect("send");
    assert!(response.completed().is_empty());
    assert_eq!(response.faulted().len(), 1);
}

#[tokio::test]
async fn optional_response_satisfies_plain_query_when_some() {
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("some"), |n: u32| Some(n * 2));
    recipients.add_fn(Some("none"), |_n: u32| None::<u32>);

    let response = send_u32(&aggregator(recipients), 6).await;
    assert_eq!(response.completed().len(), 1);
    assert_eq!(response.completed()[0].result, 12);
    // `None` is an absent value, not a phantom result.
    assert_eq!(response.faulted().len(), 1);
}

#[tokio::test]
async fn plain_response_satisfies_optional_query() {
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("plain"), |n: u32| n * 2);
    let response = aggregator(recipients)
        .send_expecting::<u32, Option<u32>>(8, Deadline::None, ScatterGatherOptions::default())
        .await
        .expect("send");
    assert_eq!(response.completed().len(), 1);
    assert_eq!(response.completed()[0].result, Some(16));
}

#[tokio::test]
async fn faulted_entry_carries_the_handler_error() {
    let recipients = RecipientsCollection::new();
    recipients.add_try_fn(Some("boom"), |_n: u32| -> anyhow::Result<u32> {
        Err(anyhow!("boom"))
    });
    let response = send_u32(&aggregator(recipients), 1).await;
    assert_eq!(response.faulted().len(), 1);
    assert!(response.faulted()[0].cause.to_string().contains("boom"));
}

#[tokio::test]
async fn panicking_handler_faults_instead_of_poisoning_the_batch() {
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("panicky"), |_n: u32| -> u32 { panic!("handler bug") });
    recipients.add_fn(Some("steady"), |n: u32| n);

    let response = send_u32(&aggregator(recipients), 9).await;
    assert_eq!(response.completed().len(), 1);
    assert_eq!(response.faulted().len(), 1);
    let panic = response.faulted()[0]
        .cause
        .downcast_ref::<HandlerPanic>()
        .expect("panic surfaced as HandlerPanic");
    assert!(panic.message.contains("handler bug"));
}

#[tokio::test]
async fn no_capable_recipients_yields_an_empty_response() {
    let recipients = RecipientsCollection::new();
    recipients.add_fn(Some("stringly"), |s: String| s);
    let response = aggregator(recipients)
        .send(1i128, Deadline::None, ScatterGatherOptions::default())
        .await
        .expect("send");
    assert!(response.is_empty());
    assert_eq!(response.total_invocations_count(), 0);
}

#[derive(Default)]
struct AmbiguousIntake;

impl ScatterHandler for AmbiguousIntake {
    fn operations(ops: &mut Operations<Self>) {
        ops.handle("a", |_this, n: u32| n);
        ops.handle("b", |_this, n: u32| n + 1);
    }
}

#[tokio::test]
async fn skipped_colliding_recipient_is_never_invoked() {
    let recipients = RecipientsCollection::new();
    recipients.add::<AmbiguousIntake>();
    recipients.add_fn(Some("delegate"), |n: u32| n * 10);

    let response = send_u32(&aggregator(recipients), 2).await;
    assert_eq!(response.total_invocations_count(), 1);
    assert_eq!(response.completed()[0].result, 20);
}

#[tokio::test]
async fn completed_entries_record_durations() {
    let recipients = RecipientsCollection::new();
    recipients.add_async_fn(Some("slow-ish"), |n: u32| async move {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        n
    });
    let mut response = send_u32(&aggregator(recipients), 1).await;
    response.sort_completed_by_duration();
    assert_eq!(response.completed().len(), 1);
    assert!(response.completed()[0].duration >= std::time::Duration::from_millis(5));
}
