//! Per-call configuration for a scatter-gather `send`.

use std::num::NonZeroUsize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default grace period granted after the primary deadline fires.
pub const DEFAULT_CANCELLATION_WINDOW: Duration = Duration::from_millis(100);

/// Per-call scatter-gather policy.
///
/// `cancellation_window` is a grace period, not an extension of the deadline
/// contract: the caller-observed wait time is bounded by deadline + window.
/// `Duration` is unsigned and `NonZeroUsize` is positive by construction, so
/// the negative-window and zero-limit misuses are unrepresentable.
#[derive(Clone, Debug)]
pub struct ScatterGatherOptions {
    /// Grace period after the primary deadline during which cooperative
    /// recipients may still finish.
    pub cancellation_window: Duration,
    /// Extend the window to recipients that did not declare cancellation
    /// awareness; when unset those are abandoned at the primary deadline.
    pub allow_cancellation_window_on_all_recipients: bool,
    /// Success quorum: stop waiting once this many invocations succeed.
    pub limit: Option<NonZeroUsize>,
}

impl Default for ScatterGatherOptions {
    fn default() -> Self {
        Self {
            cancellation_window: DEFAULT_CANCELLATION_WINDOW,
            allow_cancellation_window_on_all_recipients: false,
            limit: None,
        }
    }
}

impl ScatterGatherOptions {
    pub fn with_limit(limit: NonZeroUsize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn with_window(cancellation_window: Duration) -> Self {
        Self {
            cancellation_window,
            ..Self::default()
        }
    }
}

/// When the batch stops waiting for recipients.
#[derive(Clone, Debug, Default)]
pub enum Deadline {
    /// Wait until every invocation finishes (or a quorum is reached).
    #[default]
    None,
    /// Primary deadline elapses after this duration.
    After(Duration),
    /// Primary deadline fires when an external signal cancels.
    Signal(CancellationToken),
}

impl From<Duration> for Deadline {
    fn from(after: Duration) -> Self {
        Deadline::After(after)
    }
}

impl From<CancellationToken> for Deadline {
    fn from(signal: CancellationToken) -> Self {
        Deadline::Signal(signal)
    }
}
