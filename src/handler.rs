//! Handler trait and the operation registration builder.
//!
//! A [`ScatterHandler`] declares its operations once, through an
//! [`Operations`] builder, instead of being introspected at runtime. Every
//! registered closure (synchronous or asynchronous, infallible or fallible,
//! cancellation-aware or not) is normalized *at registration time* into the
//! same [`Operation`] shape: a callable from `(instance, request value,
//! cancellation token)` to a boxed future of a boxed result. The rest of the
//! crate never needs to know which flavor the handler author wrote.

use crate::matcher::TypeToken;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Boxed value produced by an operation (or supplied as a request).
pub type AnyValue = Box<dyn Any + Send>;

/// Type-erased target instance an operation executes against.
pub(crate) type AnyInstance = Arc<dyn Any + Send + Sync>;

/// Normalized future every operation resolves to.
pub(crate) type OpFuture = BoxFuture<'static, Result<AnyValue>>;

pub(crate) type Invoker =
    Arc<dyn Fn(AnyInstance, AnyValue, CancellationToken) -> OpFuture + Send + Sync>;

/// Wraps a produced `Resp` into `Some(resp)` boxed as `Option<Resp>`, used
/// when the caller queried for the `Option` form of an operation's declared
/// response type.
pub(crate) type ResponseWrapper = Arc<dyn Fn(AnyValue) -> Result<AnyValue> + Send + Sync>;

/// A handler type that can receive scatter-gather requests.
///
/// Implementors declare their operations explicitly; the set is enumerated
/// once per type and cached by the
/// [`CapabilityIndex`](crate::capability::CapabilityIndex).
///
/// ```ignore
/// struct Pricing;
///
/// impl ScatterHandler for Pricing {
///     fn operations(ops: &mut Operations<Self>) {
///         ops.handle("quote", |_this, amount: u64| format!("{amount} credits"));
///         ops.handle_async("audit", |_this, amount: u64| async move { amount * 2 });
///     }
/// }
/// ```
pub trait ScatterHandler: Send + Sync + 'static {
    fn operations(ops: &mut Operations<Self>)
    where
        Self: Sized;
}

/// One normalized operation on a handler type.
#[derive(Clone)]
pub struct Operation {
    name: &'static str,
    request: TypeToken,
    response: TypeToken,
    accepts_cancellation: bool,
    pub(crate) invoke: Invoker,
    pub(crate) wrap_response: ResponseWrapper,
}

impl Operation {
    pub(crate) fn new(
        name: &'static str,
        request: TypeToken,
        response: TypeToken,
        accepts_cancellation: bool,
        invoke: Invoker,
        wrap_response: ResponseWrapper,
    ) -> Self {
        Self {
            name,
            request,
            response,
            accepts_cancellation,
            invoke,
            wrap_response,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn request(&self) -> &TypeToken {
        &self.request
    }

    pub fn response(&self) -> &TypeToken {
        &self.response
    }

    pub fn accepts_cancellation(&self) -> bool {
        self.accepts_cancellation
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("request", &self.request.name())
            .field("response", &self.response.name())
            .field("accepts_cancellation", &self.accepts_cancellation)
            .finish()
    }
}

/// Move the boxed request value into the operation's parameter type.
///
/// Handles the nullable-variance projections the matcher allows: a value of
/// exactly `Req`, or a value of `Option<Req>` (unwrapped, where `None` is a
/// fault because there is nothing to pass to a non-optional parameter).
pub(crate) fn take_request<Req: 'static>(value: AnyValue) -> Result<Req> {
    match value.downcast::<Req>() {
        Ok(req) => Ok(*req),
        Err(value) => match value.downcast::<Option<Req>>() {
            Ok(opt) => {
                (*opt).ok_or_else(|| anyhow!("no value supplied for non-optional request parameter"))
            }
            Err(_) => Err(anyhow!("request value does not match operation parameter")),
        },
    }
}

pub(crate) fn response_wrapper<Resp: Send + 'static>() -> ResponseWrapper {
    Arc::new(|value: AnyValue| match value.downcast::<Resp>() {
        Ok(resp) => Ok(Box::new(Some(*resp)) as AnyValue),
        Err(_) => Err(anyhow!("operation result does not match its declared response type")),
    })
}

/// Registration builder handed to [`ScatterHandler::operations`].
pub struct Operations<H: ?Sized> {
    ops: Vec<Operation>,
    _marker: PhantomData<fn(&H)>,
}

impl<H: ScatterHandler> Operations<H> {
    pub(crate) fn new() -> Self {
        Self {
            ops: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_vec(self) -> Vec<Operation> {
        self.ops
    }

    /// Register a synchronous, infallible operation.
    pub fn handle<Req, Resp, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: Fn(Arc<H>, Req) -> Resp + Send + Sync + 'static,
    {
        self.try_handle(name, move |this, req| Ok(f(this, req)))
    }

    /// Register a synchronous operation returning `Result<Resp>`.
    pub fn try_handle<Req, Resp, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: Fn(Arc<H>, Req) -> Result<Resp> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.push::<Req, Resp>(
            name,
            false,
            Arc::new(move |this, req, _token| {
                let f = Arc::clone(&f);
                async move { f(this, req).map(|resp| Box::new(resp) as AnyValue) }.boxed()
            }),
        )
    }

    /// Register an asynchronous, infallible operation.
    pub fn handle_async<Req, Resp, Fut, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Resp> + Send + 'static,
        F: Fn(Arc<H>, Req) -> Fut + Send + Sync + 'static,
    {
        self.try_handle_async(name, move |this, req| {
            let fut = f(this, req);
            async move { Ok(fut.await) }
        })
    }

    /// Register an asynchronous operation returning `Result<Resp>`.
    pub fn try_handle_async<Req, Resp, Fut, F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
        F: Fn(Arc<H>, Req) -> Fut + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.push::<Req, Resp>(
            name,
            false,
            Arc::new(move |this, req, _token| {
                let f = Arc::clone(&f);
                async move { f(this, req).await.map(|resp| Box::new(resp) as AnyValue) }.boxed()
            }),
        )
    }

    /// Register an asynchronous, infallible operation that observes the
    /// invocation's cancellation token.
    pub fn handle_async_with_cancel<Req, Resp, Fut, F>(
        &mut self,
        name: &'static str,
        f: F,
    ) -> &mut Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Resp> + Send + 'static,
        F: Fn(Arc<H>, Req, CancellationToken) -> Fut + Send + Sync + 'static,
    {
        self.try_handle_async_with_cancel(name, move |this, req, token| {
            let fut = f(this, req, token);
            async move { Ok(fut.await) }
        })
    }

    /// Register an asynchronous, fallible operation that observes the
    /// invocation's cancellation token.
    pub fn try_handle_async_with_cancel<Req, Resp, Fut, F>(
        &mut self,
        name: &'static str,
        f: F,
    ) -> &mut Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
        F: Fn(Arc<H>, Req, CancellationToken) -> Fut + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.push::<Req, Resp>(
            name,
            true,
            Arc::new(move |this, req, token| {
                let f = Arc::clone(&f);
                async move { f(this, req, token).await.map(|resp| Box::new(resp) as AnyValue) }
                    .boxed()
            }),
        )
    }

    fn push<Req, Resp>(
        &mut self,
        name: &'static str,
        accepts_cancellation: bool,
        run: Arc<dyn Fn(Arc<H>, Req, CancellationToken) -> OpFuture + Send + Sync>,
    ) -> &mut Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let invoke: Invoker = Arc::new(move |instance, value, token| {
            let this = match instance.downcast::<H>() {
                Ok(this) => this,
                Err(_) => {
                    return futures::future::ready(Err(anyhow!(
                        "target instance does not match the operation's handler type"
                    )))
                    .boxed()
                }
            };
            match take_request::<Req>(value) {
                Ok(req) => run(this, req, token),
                Err(err) => futures::future::ready(Err(err)).boxed(),
            }
        });
        self.ops.push(Operation {
            name,
            request: TypeToken::of::<Req>(),
            response: TypeToken::of::<Resp>(),
            accepts_cancellation,
            invoke,
            wrap_response: response_wrapper::<Resp>(),
        });
        self
    }
}
