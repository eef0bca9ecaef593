//! # brrtscatter
//!
//! Scatter-gather dispatch over an in-process registry of recipients.
//!
//! One request is fanned out concurrently to every registered recipient able
//! to accept its type, and the results are gathered into a single response
//! partitioned into completed, faulted and incomplete sets. Capability is
//! decided by type matching alone (with `T` and `Option<T>` treated as
//! compatible), so callers and recipients stay fully decoupled: neither
//! names the other.
//!
//! ## Modules
//!
//! - [`collection`]: recipient registration (`add` family) and resolution
//! - [`aggregator`]: the `send` / `send_expecting` entry points
//! - [`handler`]: the [`ScatterHandler`] trait and operation builder
//! - [`recipient`]: type-backed, instance-backed and delegate recipients
//! - [`capability`]: the shared operation index and collision policy
//! - [`matcher`]: type tokens and the compatibility rules
//! - [`runner`] / [`coordinator`]: per-invocation and per-batch execution
//! - [`cancel`]: composed cancellation signals
//! - [`options`] / [`response`]: per-call policy and the gathered result
//!
//! ## Quick start
//!
//! ```no_run
//! use brrtscatter::{Aggregator, Deadline, RecipientsCollection, ScatterGatherOptions};
//! use std::sync::Arc;
//!
//! # #[derive(Clone)] struct Ping(u32);
//! # async fn run() -> Result<(), brrtscatter::Error> {
//! let recipients = Arc::new(RecipientsCollection::new());
//! recipients.add_fn(Some("echo"), |Ping(n): Ping| n * 2);
//!
//! let aggregator = Aggregator::new(recipients);
//! let response = aggregator
//!     .send_expecting::<Ping, u32>(Ping(21), Deadline::None, ScatterGatherOptions::default())
//!     .await?;
//! assert_eq!(response.completed().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod cancel;
pub mod capability;
pub mod collection;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod ids;
pub mod invocation;
pub mod matcher;
pub mod options;
pub mod recipient;
pub mod response;
pub mod runner;

pub use aggregator::Aggregator;
pub use cancel::CancellationGroup;
pub use capability::{CapabilityIndex, CapabilityQuery, CollisionNotice};
pub use collection::{RecipientsCollection, Registration, Resolution, SkippedRecipient};
pub use coordinator::FanOutCoordinator;
pub use error::{AggregateFault, Error, HandlerPanic};
pub use handler::{AnyValue, Operation, Operations, ScatterHandler};
pub use ids::RecipientId;
pub use invocation::{Envelope, PreparedInvocation};
pub use matcher::{NoRequest, TypeToken};
pub use options::{Deadline, ScatterGatherOptions, DEFAULT_CANCELLATION_WINDOW};
pub use recipient::{CollisionPolicy, Lifetime, Recipient, RecipientIdentity};
pub use response::{AggregatedResponse, CompletedEntry, FaultedEntry, IncompleteEntry};
pub use runner::{CompletionSignal, InvocationRunner};
