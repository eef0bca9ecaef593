//! Recipients collection: the registration surface.
//!
//! Every `add` variant returns the generated [`RecipientId`]. Resolution is
//! a pure function of the collection's state: it returns both the eligible
//! recipients and the ones skipped because their capability match was
//! ambiguous, rather than reporting collisions through a subscribable event.

use crate::capability::{CapabilityIndex, CapabilityQuery, CollisionNotice};
use crate::handler::ScatterHandler;
use crate::ids::RecipientId;
use crate::matcher::TypeToken;
use crate::recipient::{
    CollisionPolicy, DelegateRecipient, Lifetime, Recipient, RecipientIdentity,
    TypeBackedRecipient,
};
use anyhow::Result;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Registration options for a type-backed recipient.
#[derive(Clone, Debug)]
pub struct Registration {
    pub name: Option<String>,
    pub lifetime: Lifetime,
    pub policy: CollisionPolicy,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            name: None,
            lifetime: Lifetime::Transient,
            policy: CollisionPolicy::IgnoreRecipient,
        }
    }
}

impl Registration {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// A recipient excluded from one resolution because its capability match
/// was ambiguous under `IgnoreRecipient`.
#[derive(Clone, Debug)]
pub struct SkippedRecipient {
    pub recipient: RecipientIdentity,
    pub notice: CollisionNotice,
}

/// Result of resolving a collection against a request (and optionally a
/// response) type.
pub struct Resolution {
    eligible: Vec<Arc<dyn Recipient>>,
    skipped: Vec<SkippedRecipient>,
}

impl Resolution {
    pub fn eligible(&self) -> &[Arc<dyn Recipient>] {
        &self.eligible
    }

    pub fn skipped(&self) -> &[SkippedRecipient] {
        &self.skipped
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty() && self.skipped.is_empty()
    }
}

/// Registry of recipients sharing one capability index.
pub struct RecipientsCollection {
    index: Arc<CapabilityIndex>,
    recipients: RwLock<Vec<Arc<dyn Recipient>>>,
}

impl Default for RecipientsCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl RecipientsCollection {
    pub fn new() -> Self {
        Self::with_index(Arc::new(CapabilityIndex::new()))
    }

    /// Share a capability index across collections (or inject an isolated
    /// one in tests).
    pub fn with_index(index: Arc<CapabilityIndex>) -> Self {
        Self {
            index,
            recipients: RwLock::new(Vec::new()),
        }
    }

    pub fn index(&self) -> &Arc<CapabilityIndex> {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.recipients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.read().is_empty()
    }

    /// Register a type-backed recipient constructed through `H::default`.
    pub fn add<H: ScatterHandler + Default>(&self) -> RecipientId {
        self.add_with::<H>(Registration::default())
    }

    /// Register a type-backed recipient with explicit options.
    pub fn add_with<H: ScatterHandler + Default>(&self, registration: Registration) -> RecipientId {
        self.add_factory(H::default, registration)
    }

    /// Register a type-backed recipient with an explicit factory.
    pub fn add_factory<H: ScatterHandler>(
        &self,
        factory: impl Fn() -> H + Send + Sync + 'static,
        registration: Registration,
    ) -> RecipientId {
        let recipient = TypeBackedRecipient::new(
            factory,
            registration.name,
            registration.lifetime,
            registration.policy,
            Arc::clone(&self.index),
        );
        self.push(Arc::new(recipient))
    }

    /// Register a fixed instance; always `Singleton` lifetime.
    pub fn add_instance<H: ScatterHandler>(
        &self,
        instance: H,
        name: Option<&str>,
        policy: CollisionPolicy,
    ) -> RecipientId {
        let recipient = TypeBackedRecipient::from_instance(
            instance,
            name.map(str::to_string),
            policy,
            Arc::clone(&self.index),
        );
        self.push(Arc::new(recipient))
    }

    /// Register a synchronous delegate.
    pub fn add_fn<Req, Resp, F>(&self, name: Option<&str>, f: F) -> RecipientId
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: Fn(Req) -> Resp + Send + Sync + 'static,
    {
        self.push(Arc::new(DelegateRecipient::from_sync(
            name.map(str::to_string),
            f,
        )))
    }

    /// Register a synchronous delegate returning `Result<Resp>`.
    pub fn add_try_fn<Req, Resp, F>(&self, name: Option<&str>, f: F) -> RecipientId
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: Fn(Req) -> Result<Resp> + Send + Sync + 'static,
    {
        self.push(Arc::new(DelegateRecipient::from_try_sync(
            name.map(str::to_string),
            f,
        )))
    }

    /// Register an asynchronous delegate.
    pub fn add_async_fn<Req, Resp, Fut, F>(&self, name: Option<&str>, f: F) -> RecipientId
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Resp> + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
    {
        self.push(Arc::new(DelegateRecipient::from_async(
            name.map(str::to_string),
            f,
        )))
    }

    /// Register an asynchronous delegate returning `Result<Resp>`.
    pub fn add_try_async_fn<Req, Resp, Fut, F>(&self, name: Option<&str>, f: F) -> RecipientId
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
    {
        self.push(Arc::new(DelegateRecipient::from_try_async(
            name.map(str::to_string),
            f,
        )))
    }

    /// Register a cancellation-aware asynchronous delegate.
    pub fn add_async_fn_with_cancel<Req, Resp, Fut, F>(
        &self,
        name: Option<&str>,
        f: F,
    ) -> RecipientId
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Resp> + Send + 'static,
        F: Fn(Req, CancellationToken) -> Fut + Send + Sync + 'static,
    {
        self.push(Arc::new(DelegateRecipient::from_async_with_cancel(
            name.map(str::to_string),
            f,
        )))
    }

    /// Register a cancellation-aware asynchronous delegate returning
    /// `Result<Resp>`.
    pub fn add_try_async_fn_with_cancel<Req, Resp, Fut, F>(
        &self,
        name: Option<&str>,
        f: F,
    ) -> RecipientId
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
        F: Fn(Req, CancellationToken) -> Fut + Send + Sync + 'static,
    {
        self.push(Arc::new(DelegateRecipient::from_try_async_with_cancel(
            name.map(str::to_string),
            f,
        )))
    }

    fn push(&self, recipient: Arc<dyn Recipient>) -> RecipientId {
        let identity = recipient.identity();
        let mut recipients = self.recipients.write();
        recipients.push(recipient);
        info!(
            recipient = %identity.display_name(),
            recipient_id = %identity.id,
            lifetime = %identity.lifetime,
            total_recipients = recipients.len(),
            "recipient registered"
        );
        identity.id
    }

    /// Recipients able to accept `Req`.
    pub fn resolve_for<Req: 'static>(&self) -> Resolution {
        self.resolve(&TypeToken::of::<Req>(), None)
    }

    /// Recipients able to accept `Req` and reply with `Resp`.
    pub fn resolve_replying<Req: 'static, Resp: 'static>(&self) -> Resolution {
        self.resolve(&TypeToken::of::<Req>(), Some(&TypeToken::of::<Resp>()))
    }

    pub(crate) fn resolve(
        &self,
        request: &TypeToken,
        response: Option<&TypeToken>,
    ) -> Resolution {
        let recipients = self.recipients.read();
        let mut eligible = Vec::new();
        let mut skipped = Vec::new();
        for recipient in recipients.iter() {
            match recipient.capabilities(request, response) {
                CapabilityQuery::Match(_) => eligible.push(Arc::clone(recipient)),
                CapabilityQuery::None => {}
                CapabilityQuery::Collision(notice) => skipped.push(SkippedRecipient {
                    recipient: recipient.identity(),
                    notice,
                }),
            }
        }
        debug!(
            request_type = request.name(),
            response_type = response.map(|t| t.name()),
            eligible = eligible.len(),
            skipped = skipped.len(),
            "recipients resolved"
        );
        Resolution { eligible, skipped }
    }
}
