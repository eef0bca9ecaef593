//! Prepared invocations and the request envelope.
//!
//! An [`Envelope`] carries one request value in a form that can be replicated
//! for every matched invocation (each invocation owns its copy) and projected
//! into an operation's parameter type, including the `T` and `Option<T>`
//! variance the matcher allows. A [`PreparedInvocation`] is the single
//! executable unit built from one matched operation, one (lazily resolved)
//! target instance and one projected request value; it is executed at most
//! once by its owning runner.

use crate::handler::{AnyInstance, AnyValue, Operation, OpFuture};
use crate::matcher::TypeToken;
use crate::recipient::RecipientIdentity;
use futures::FutureExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) type InstanceSupplier = Arc<dyn Fn() -> AnyInstance + Send + Sync>;

/// A request value plus the projections needed to hand it to operations.
pub struct Envelope {
    token: TypeToken,
    /// Produces a fresh boxed copy of the request, dynamic type `R`.
    replicate: Arc<dyn Fn() -> AnyValue + Send + Sync>,
    /// Produces `Some(request)` boxed as `Option<R>`, for operations whose
    /// parameter is the `Option` form of the request type.
    wrap_some: Arc<dyn Fn() -> AnyValue + Send + Sync>,
}

impl Envelope {
    pub fn new<R>(request: R) -> Self
    where
        R: Clone + Send + Sync + 'static,
    {
        let token = TypeToken::of::<R>();
        let for_replicate = request.clone();
        Self {
            token,
            replicate: Arc::new(move || Box::new(for_replicate.clone())),
            wrap_some: Arc::new(move || Box::new(Some(request.clone()))),
        }
    }

    pub fn token(&self) -> &TypeToken {
        &self.token
    }

    /// Project the request into `param`'s shape, or `None` when the types
    /// are incompatible. When the request itself is the `Option` form of the
    /// parameter, the value is delivered as-is and unwrapped by the
    /// operation's own adapter.
    pub(crate) fn project(&self, param: &TypeToken) -> Option<AnyValue> {
        if param.id() == self.token.id() || param.wrapped() == self.token.id() {
            Some((self.replicate)())
        } else if param.id() == self.token.wrapped() {
            Some((self.wrap_some)())
        } else {
            None
        }
    }
}

/// One executable unit bound to a matched operation, a target instance
/// supplier and a projected request value.
pub struct PreparedInvocation {
    identity: RecipientIdentity,
    operation: Operation,
    supplier: InstanceSupplier,
    value: AnyValue,
    /// Wrap the produced value into `Some(..)` because the caller queried
    /// for the `Option` form of the declared response type.
    wrap_result: bool,
}

impl std::fmt::Debug for PreparedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedInvocation")
            .field("identity", &self.identity)
            .field("operation", &self.operation.name())
            .field("wrap_result", &self.wrap_result)
            .finish_non_exhaustive()
    }
}

impl PreparedInvocation {
    pub(crate) fn new(
        identity: RecipientIdentity,
        operation: Operation,
        supplier: InstanceSupplier,
        value: AnyValue,
        wrap_result: bool,
    ) -> Self {
        Self {
            identity,
            operation,
            supplier,
            value,
            wrap_result,
        }
    }

    pub fn identity(&self) -> &RecipientIdentity {
        &self.identity
    }

    pub fn operation_name(&self) -> &'static str {
        self.operation.name()
    }

    pub fn accepts_cancellation(&self) -> bool {
        self.operation.accepts_cancellation()
    }

    /// Resolve the target instance and run the bound operation. Consumes the
    /// invocation: it executes at most once.
    pub(crate) fn execute(self, token: CancellationToken) -> OpFuture {
        let instance = (self.supplier)();
        let fut = (self.operation.invoke)(instance, self.value, token);
        if self.wrap_result {
            let wrap = Arc::clone(&self.operation.wrap_response);
            fut.map(move |result| result.and_then(|value| wrap(value))).boxed()
        } else {
            fut
        }
    }
}
