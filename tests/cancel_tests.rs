//! Tests for cancellation groups and the fan-out coordinator
//!
//! # Test Coverage
//!
//! - Any linked source cancels the derived token
//! - Linked timeouts and manual cancellation
//! - Dropping a group releases its source subscriptions
//! - Coordinator resolution: empty batch, group cancellation, idempotent
//!   start

use brrtscatter::{
    CancellationGroup, Envelope, FanOutCoordinator, InvocationRunner, RecipientsCollection,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

mod tracing_util;
use tracing_util::TestTracing;

#[tokio::test]
async fn any_source_cancels_the_group() {
    let _tracing = TestTracing::init();
    let first = CancellationToken::new();
    let second = CancellationToken::new();
    let group = CancellationGroup::from_sources([first.clone(), second.clone()]);

    assert!(!group.is_cancelled());
    second.cancel();
    group.cancelled().await;
    assert!(group.is_cancelled());
    // The untriggered source stays untouched.
    assert!(!first.is_cancelled());
}

#[tokio::test]
async fn manual_cancel_is_idempotent() {
    let group = CancellationGroup::new();
    group.cancel();
    group.cancel();
    assert!(group.is_cancelled());
    group.cancelled().await;
}

#[tokio::test(start_paused = true)]
async fn linked_timeout_cancels_after_the_duration() {
    let mut group = CancellationGroup::new();
    group.link_timeout(Duration::from_millis(50));
    assert!(!group.is_cancelled());
    group.cancelled().await;
    assert!(group.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_group_releases_subscriptions() {
    let source = CancellationToken::new();
    let group = CancellationGroup::from_sources([source.clone()]);
    let derived = group.token();
    drop(group);

    source.cancel();
    sleep(Duration::from_millis(10)).await;
    assert!(!derived.is_cancelled());
}

#[tokio::test]
async fn child_token_cancels_independently() {
    let group = CancellationGroup::new();
    let child = group.child_token();
    child.cancel();
    assert!(!group.is_cancelled());

    let child = group.child_token();
    group.cancel();
    assert!(child.is_cancelled());
}

#[tokio::test]
async fn empty_batch_resolves_immediately() {
    let coordinator = FanOutCoordinator::new(Vec::new(), None);
    let group = CancellationGroup::new();
    coordinator.start(&group).expect("start");
    coordinator.wait().await;
}

#[tokio::test]
async fn start_is_idempotent() {
    let coordinator = FanOutCoordinator::new(Vec::new(), None);
    let group = CancellationGroup::new();
    coordinator.start(&group).expect("first start");
    coordinator.start(&group).expect("second start is a no-op");
    coordinator.wait().await;
}

#[tokio::test(start_paused = true)]
async fn group_cancellation_resolves_a_pending_batch() {
    let recipients = RecipientsCollection::new();
    recipients.add_async_fn(Some("never"), |n: u32| async move {
        sleep(Duration::from_secs(3600)).await;
        n
    });
    let resolution = recipients.resolve_for::<u32>();
    let invocations = resolution.eligible()[0]
        .prepare_invocations(&Envelope::new(1u32), None)
        .expect("prepare");
    let runners: Vec<_> = invocations
        .into_iter()
        .map(|invocation| Arc::new(InvocationRunner::new(invocation, CancellationToken::new())))
        .collect();

    let coordinator = FanOutCoordinator::new(runners, None);
    let group = CancellationGroup::new();
    coordinator.start(&group).expect("start");
    group.cancel();
    coordinator.wait().await;
}
