//! Delegate-backed recipients: one bound function, no backing type.
//!
//! A delegate compares its bound request/response types directly through the
//! signature matcher instead of consulting the capability index, is always
//! `Singleton` lifetime (there is no instance to construct) and always
//! `IgnoreRecipient` policy (a single bound function cannot collide with
//! itself).

use crate::capability::CapabilityQuery;
use crate::error::Error;
use crate::handler::{
    response_wrapper, take_request, AnyInstance, AnyValue, Invoker, Operation,
};
use crate::ids::RecipientId;
use crate::invocation::{Envelope, InstanceSupplier, PreparedInvocation};
use crate::matcher::{accepts, replies_with, TypeToken};
use crate::recipient::{CollisionPolicy, Lifetime, Recipient, RecipientIdentity};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub(crate) struct DelegateRecipient {
    id: RecipientId,
    name: Option<String>,
    operation: Operation,
}

type DelegateRun<Req, Resp> =
    Arc<dyn Fn(Req, CancellationToken) -> BoxFuture<'static, Result<Resp>> + Send + Sync>;

impl DelegateRecipient {
    fn from_parts<Req, Resp>(
        name: Option<String>,
        accepts_cancellation: bool,
        run: DelegateRun<Req, Resp>,
    ) -> Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let invoke: Invoker = Arc::new(move |_instance, value, token| {
            let run = Arc::clone(&run);
            match take_request::<Req>(value) {
                Ok(req) => async move {
                    run(req, token).await.map(|resp| Box::new(resp) as AnyValue)
                }
                .boxed(),
                Err(err) => futures::future::ready(Err(err)).boxed(),
            }
        });
        Self {
            id: RecipientId::new(),
            name,
            operation: Operation::new(
                "delegate",
                TypeToken::of::<Req>(),
                TypeToken::of::<Resp>(),
                accepts_cancellation,
                invoke,
                response_wrapper::<Resp>(),
            ),
        }
    }

    pub(crate) fn from_sync<Req, Resp, F>(name: Option<String>, f: F) -> Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: Fn(Req) -> Resp + Send + Sync + 'static,
    {
        Self::from_try_sync(name, move |req| Ok(f(req)))
    }

    pub(crate) fn from_try_sync<Req, Resp, F>(name: Option<String>, f: F) -> Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: Fn(Req) -> Result<Resp> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::from_parts::<Req, Resp>(
            name,
            false,
            Arc::new(move |req, _token| {
                let f = Arc::clone(&f);
                async move { f(req) }.boxed()
            }),
        )
    }

    pub(crate) fn from_async<Req, Resp, Fut, F>(name: Option<String>, f: F) -> Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Resp> + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
    {
        Self::from_try_async(name, move |req| {
            let fut = f(req);
            async move { Ok(fut.await) }
        })
    }

    pub(crate) fn from_try_async<Req, Resp, Fut, F>(name: Option<String>, f: F) -> Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::from_parts::<Req, Resp>(
            name,
            false,
            Arc::new(move |req, _token| {
                let f = Arc::clone(&f);
                async move { f(req).await }.boxed()
            }),
        )
    }

    pub(crate) fn from_async_with_cancel<Req, Resp, Fut, F>(name: Option<String>, f: F) -> Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Resp> + Send + 'static,
        F: Fn(Req, CancellationToken) -> Fut + Send + Sync + 'static,
    {
        Self::from_try_async_with_cancel(name, move |req, token| {
            let fut = f(req, token);
            async move { Ok(fut.await) }
        })
    }

    pub(crate) fn from_try_async_with_cancel<Req, Resp, Fut, F>(name: Option<String>, f: F) -> Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
        F: Fn(Req, CancellationToken) -> Fut + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::from_parts::<Req, Resp>(
            name,
            true,
            Arc::new(move |req, token| {
                let f = Arc::clone(&f);
                async move { f(req, token).await }.boxed()
            }),
        )
    }
}

impl Recipient for DelegateRecipient {
    fn identity(&self) -> RecipientIdentity {
        RecipientIdentity {
            id: self.id,
            name: self.name.clone(),
            type_name: None,
            lifetime: Lifetime::Singleton,
            policy: CollisionPolicy::IgnoreRecipient,
        }
    }

    fn capabilities(&self, request: &TypeToken, response: Option<&TypeToken>) -> CapabilityQuery {
        let op = &self.operation;
        let matched = accepts(op.request(), request)
            && response.map_or(true, |wanted| replies_with(op.response(), wanted));
        if matched {
            CapabilityQuery::Match(vec![op.clone()])
        } else {
            CapabilityQuery::None
        }
    }

    fn prepare_invocations(
        &self,
        envelope: &Envelope,
        response: Option<&TypeToken>,
    ) -> Result<Vec<PreparedInvocation>, Error> {
        let op = match self.capabilities(envelope.token(), response) {
            CapabilityQuery::Match(mut ops) => match ops.pop() {
                Some(op) => op,
                None => {
                    return Err(Error::InvalidOperation(
                        "delegate matched with an empty operation set".to_string(),
                    ))
                }
            },
            _ => {
                return Err(Error::InvalidOperation(format!(
                    "delegate '{}' cannot accept request type {}",
                    self.identity().display_name(),
                    envelope.token().name()
                )))
            }
        };
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
        let unit: AnyInstance = Arc::new(());
        let supplier: InstanceSupplier = Arc::new(move || Arc::clone(&unit));
        Ok(vec![PreparedInvocation::new(
            self.identity(),
            op,
            supplier,
            value,
            wrap_result,
        )])
    }

    fn clone_for_scope(&self) -> Arc<dyn Recipient> {
        Arc::new(self.clone())
    }
}
