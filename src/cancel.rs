//! Cancellation group: N input signals composed into one derived token.
//!
//! The derived token becomes active the first time any input fires, a linked
//! timeout elapses, or [`CancellationGroup::cancel`] is called, whichever
//! comes first. Dropping the group aborts its listener tasks, releasing
//! every subscription; ownership makes use-after-drop unrepresentable.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct CancellationGroup {
    token: CancellationToken,
    listeners: Vec<JoinHandle<()>>,
}

impl Default for CancellationGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationGroup {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            listeners: Vec::new(),
        }
    }

    pub fn from_sources(sources: impl IntoIterator<Item = CancellationToken>) -> Self {
        let mut group = Self::new();
        for source in sources {
            group.link(source);
        }
        group
    }

    /// Propagate `source` into the derived token.
    ///
    /// Must be called within a tokio runtime.
    pub fn link(&mut self, source: CancellationToken) {
        let derived = self.token.clone();
        self.listeners.push(tokio::spawn(async move {
            source.cancelled().await;
            derived.cancel();
        }));
    }

    /// Cancel the derived token once `after` has elapsed.
    pub fn link_timeout(&mut self, after: Duration) {
        let derived = self.token.clone();
        self.listeners.push(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            derived.cancel();
        }));
    }

    /// Manual trigger. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves the first time the derived signal becomes active; resolves
    /// immediately if it already has.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// A clone of the derived token (shares cancellation state).
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A child token cancelled with the group but independently cancellable.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

impl Drop for CancellationGroup {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}
