//! Type-backed recipients: a declared handler type, a factory and a
//! lifetime.

use crate::capability::{CapabilityIndex, CapabilityQuery};
use crate::error::Error;
use crate::handler::{AnyInstance, ScatterHandler};
use crate::ids::RecipientId;
use crate::invocation::{Envelope, InstanceSupplier, PreparedInvocation};
use crate::matcher::TypeToken;
use crate::recipient::{CollisionPolicy, Lifetime, Recipient, RecipientIdentity};
use once_cell::sync::OnceCell;
use std::any::TypeId;
use std::sync::Arc;

/// A recipient backed by handler type `H`, constructed through a factory.
///
/// `Scoped` and `Singleton` lifetimes memoize the constructed instance in a
/// shared cell: thread-safe, computed at most once under concurrent first
/// access. `Transient` invokes the factory for every invocation.
pub(crate) struct TypeBackedRecipient<H: ScatterHandler> {
    id: RecipientId,
    name: Option<String>,
    lifetime: Lifetime,
    policy: CollisionPolicy,
    factory: Arc<dyn Fn() -> Arc<H> + Send + Sync>,
    cell: Arc<OnceCell<Arc<H>>>,
    index: Arc<CapabilityIndex>,
}

impl<H: ScatterHandler> TypeBackedRecipient<H> {
    pub(crate) fn new(
        factory: impl Fn() -> H + Send + Sync + 'static,
        name: Option<String>,
        lifetime: Lifetime,
        policy: CollisionPolicy,
        index: Arc<CapabilityIndex>,
    ) -> Self {
        index.register_type::<H>();
        Self {
            id: RecipientId::new(),
            name,
            lifetime,
            policy,
            factory: Arc::new(move || Arc::new(factory())),
            cell: Arc::new(OnceCell::new()),
            index,
        }
    }

    /// Instance-backed construction: a type-backed recipient fixed to
    /// `Singleton` lifetime wrapping one externally supplied object.
    pub(crate) fn from_instance(
        instance: H,
        name: Option<String>,
        policy: CollisionPolicy,
        index: Arc<CapabilityIndex>,
    ) -> Self {
        index.register_type::<H>();
        let instance = Arc::new(instance);
        Self {
            id: RecipientId::new(),
            name,
            lifetime: Lifetime::Singleton,
            policy,
            factory: Arc::new(move || Arc::clone(&instance)),
            cell: Arc::new(OnceCell::new()),
            index,
        }
    }

    fn supplier(&self) -> InstanceSupplier {
        match self.lifetime {
            Lifetime::Transient => {
                let factory = Arc::clone(&self.factory);
                Arc::new(move || {
                    let instance: AnyInstance = factory();
                    instance
                })
            }
            Lifetime::Scoped | Lifetime::Singleton => {
                let cell = Arc::clone(&self.cell);
                let factory = Arc::clone(&self.factory);
                Arc::new(move || {
                    let instance: AnyInstance = cell.get_or_init(|| factory()).clone();
                    instance
                })
            }
        }
    }
}

impl<H: ScatterHandler> Recipient for TypeBackedRecipient<H> {
    fn identity(&self) -> RecipientIdentity {
        RecipientIdentity {
            id: self.id,
            name: self.name.clone(),
            type_name: Some(std::any::type_name::<H>()),
            lifetime: self.lifetime,
            policy: self.policy,
        }
    }

    fn capabilities(&self, request: &TypeToken, response: Option<&TypeToken>) -> CapabilityQuery {
        self.index.query(
            TypeId::of::<H>(),
            std::any::type_name::<H>(),
            request,
            response,
            self.policy,
        )
    }

    fn prepare_invocations(
        &self,
        envelope: &Envelope,
        response: Option<&TypeToken>,
    ) -> Result<Vec<PreparedInvocation>, Error> {
        let ops = match self.capabilities(envelope.token(), response) {
            CapabilityQuery::Match(ops) => ops,
            CapabilityQuery::None => {
                return Err(Error::InvalidOperation(format!(
                    "recipient '{}' cannot accept request type {}",
                    self.identity().display_name(),
                    envelope.token().name()
                )))
            }
            CapabilityQuery::Collision(notice) => {
                return Err(Error::InvalidOperation(format!(
                    "ambiguous capability match on handler type {} ({} operations)",
                    notice.handler_type, notice.matching_operations
                )))
            }
        };

        let mut prepared = Vec::with_capacity(ops.len());
        for op in ops {
            let value = envelope.project(op.request()).ok_or_else(|| {
                Error::InvalidOperation(format!(
                    "request type {} cannot be projected into parameter type {}",
                    envelope.token().name(),
                    op.request().name()
                ))
            })?;
            let wrap_result = response.map_or(false, |wanted| {
                wanted.id() != op.response().id() && wanted.id() == op.response().wrapped()
            });
            prepared.push(PreparedInvocation::new(
                self.identity(),
                op,
                self.supplier(),
                value,
                wrap_result,
            ));
        }
        Ok(prepared)
    }

    fn clone_for_scope(&self) -> Arc<dyn Recipient> {
        let cell = match self.lifetime {
            // A scope gets its own lazily-filled cell; other lifetimes share
            // the registration's state.
            Lifetime::Scoped => Arc::new(OnceCell::new()),
            Lifetime::Transient | Lifetime::Singleton => Arc::clone(&self.cell),
        };
        Arc::new(Self {
            id: self.id,
            name: self.name.clone(),
            lifetime: self.lifetime,
            policy: self.policy,
            factory: Arc::clone(&self.factory),
            cell,
            index: Arc::clone(&self.index),
        })
    }
}
