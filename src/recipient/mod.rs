//! Recipient variants: the strategy seam between registration and dispatch.
//!
//! A [`Recipient`] is one registered handler viewed through a uniform
//! adapter: capability queries ("can this accept / reply with these types?")
//! and invocation preparation. Three variants exist: type-backed (a factory
//! plus a declared lifetime), instance-backed (a fixed singleton object) and
//! delegate-backed (one bound function). Only the type-backed variant ever
//! consults the capability index.

mod delegate;
mod type_backed;

pub(crate) use delegate::DelegateRecipient;
pub(crate) use type_backed::TypeBackedRecipient;

use crate::capability::CapabilityQuery;
use crate::error::Error;
use crate::ids::RecipientId;
use crate::invocation::{Envelope, PreparedInvocation};
use crate::matcher::TypeToken;
use std::fmt;
use std::sync::Arc;

/// Instance-reuse policy for a recipient's backing object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// A fresh instance per invocation.
    Transient,
    /// One instance per `send` call, shared by every runner in that call.
    Scoped,
    /// One instance for the registration's entire lifetime, created lazily.
    Singleton,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Transient => write!(f, "transient"),
            Lifetime::Scoped => write!(f, "scoped"),
            Lifetime::Singleton => write!(f, "singleton"),
        }
    }
}

/// What to do when more than one operation on a recipient matches a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollisionPolicy {
    /// Report a collision and drop the recipient from that resolution.
    IgnoreRecipient,
    /// Invoke the recipient once per matching operation.
    UseAllMatchingOperations,
}

/// Identity metadata carried into every result entry.
#[derive(Clone, Debug)]
pub struct RecipientIdentity {
    pub id: RecipientId,
    pub name: Option<String>,
    /// Declared handler type; absent for delegate recipients.
    pub type_name: Option<&'static str>,
    pub lifetime: Lifetime,
    pub policy: CollisionPolicy,
}

impl RecipientIdentity {
    /// Display name for logs: the registered name, else the type name, else
    /// the id.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            name.clone()
        } else if let Some(type_name) = self.type_name {
            type_name.to_string()
        } else {
            self.id.to_string()
        }
    }
}

/// Uniform adapter over one registered handler.
pub trait Recipient: Send + Sync {
    fn identity(&self) -> RecipientIdentity;

    /// Query the operations matching `request` (and `response`, when given),
    /// classified under this recipient's collision policy.
    fn capabilities(&self, request: &TypeToken, response: Option<&TypeToken>) -> CapabilityQuery;

    /// Build one prepared invocation per matched operation.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when the recipient cannot accept the request or
    /// reply with the requested response type. This is a resolution bug; the
    /// aggregator only prepares invocations for confirmed-eligible
    /// recipients.
    fn prepare_invocations(
        &self,
        envelope: &Envelope,
        response: Option<&TypeToken>,
    ) -> Result<Vec<PreparedInvocation>, Error>;

    /// Duplicate this recipient for one `send` call's scope. Only meaningful
    /// for `Scoped` lifetimes; other variants return a handle to the same
    /// state.
    fn clone_for_scope(&self) -> Arc<dyn Recipient>;

    fn can_accept(&self, request: &TypeToken) -> bool {
        matches!(self.capabilities(request, None), CapabilityQuery::Match(_))
    }

    fn can_reply_with(&self, request: &TypeToken, response: &TypeToken) -> bool {
        matches!(
            self.capabilities(request, Some(response)),
            CapabilityQuery::Match(_)
        )
    }
}
