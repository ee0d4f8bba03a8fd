//! Asynchronous handlers.
//!
//! Mirrors [`handler`](crate::handler) for the async bus. Stateful handlers
//! implement [`AsyncHandler`]; plain handlers are closures taking an owned
//! message and an `Arc<Context>` and returning a future. Both can read the
//! per-call [`Extra`], through [`AsyncHandler::handle_with`] and
//! [`AsyncBoxedHandler::from_fn_with_extra`] respectively.
//!
//! ```rust,ignore
//! bus.set_event_handlers(vec![
//!     AsyncBoxedHandler::stateful(AsyncEventsLogger::default()),
//!     AsyncBoxedHandler::from_fn(|event: UserCreated, ctx: Arc<Context>| async move {
//!         let mailer: Arc<dyn Mailer> = ctx.require("mailer")?;
//!         mailer.send(&event.email, "Welcome", "...")?;
//!         Ok(())
//!     }),
//! ]);
//! ```

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tokio::sync::Mutex;

use crate::context::Context;
use crate::error::HandlerResult;
use crate::extra::Extra;
use crate::handler::{HandlerKind, Invocation, Output, Outbox, downcast_message};
use crate::message::Message;

/// An async handler with lifecycle hooks and the ability to emit messages.
///
/// The after hook runs whenever the core logic returns, successfully or not.
#[async_trait]
pub trait AsyncHandler<M>: Send + 'static
where
    M: Send + Sync + 'static,
{
    type Output: Send + Sync + 'static;

    async fn before_handle(&mut self, _ctx: &Context) -> HandlerResult<()> {
        Ok(())
    }

    async fn handle(
        &mut self,
        message: &M,
        ctx: &Context,
        outbox: &mut Outbox,
    ) -> HandlerResult<Self::Output>;

    /// The core logic, given the per-call [`Extra`]. Defaults to
    /// [`handle`](Self::handle).
    async fn handle_with(
        &mut self,
        message: &M,
        ctx: &Context,
        _extra: &Extra,
        outbox: &mut Outbox,
    ) -> HandlerResult<Self::Output> {
        self.handle(message, ctx, outbox).await
    }

    async fn after_handle(&mut self, _ctx: &Context) {}

    /// Runs the full lifecycle: before hook, core logic, after hook.
    async fn invoke(
        &mut self,
        message: &M,
        ctx: &Context,
        extra: &Extra,
        outbox: &mut Outbox,
    ) -> HandlerResult<Self::Output> {
        self.before_handle(ctx).await?;
        let result = self.handle_with(message, ctx, extra, outbox).await;
        self.after_handle(ctx).await;
        result
    }
}

// ============================================================================
// Type Erasure
// ============================================================================

trait AsyncStatefulInvoke: Send + Sync {
    fn invoke<'a>(
        &'a self,
        message: &'a Message,
        ctx: &'a Context,
        extra: &'a Extra,
        outbox: &'a mut Outbox,
    ) -> BoxFuture<'a, HandlerResult<Output>>;
}

struct AsyncStatefulCell<M, H> {
    handler: Mutex<H>,
    _message: PhantomData<fn(&M)>,
}

impl<M, H> AsyncStatefulInvoke for AsyncStatefulCell<M, H>
where
    M: Send + Sync + 'static,
    H: AsyncHandler<M>,
{
    fn invoke<'a>(
        &'a self,
        message: &'a Message,
        ctx: &'a Context,
        extra: &'a Extra,
        outbox: &'a mut Outbox,
    ) -> BoxFuture<'a, HandlerResult<Output>> {
        async move {
            let message = downcast_message::<M>(message)?;
            let mut handler = self.handler.lock().await;
            handler
                .invoke(message, ctx, extra, outbox)
                .await
                .map(Output::new)
        }
        .boxed()
    }
}

trait AsyncPlainInvoke: Send + Sync {
    fn invoke<'a>(
        &'a self,
        message: &'a Message,
        ctx: &'a Arc<Context>,
        extra: &'a Extra,
    ) -> BoxFuture<'a, HandlerResult<Output>>;
}

struct AsyncPlainFn<M, F, R> {
    func: F,
    _marker: PhantomData<fn(M) -> R>,
}

impl<M, F, Fut, R> AsyncPlainInvoke for AsyncPlainFn<M, F, R>
where
    M: Clone + Send + Sync + 'static,
    F: Fn(M, Arc<Context>, Extra) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    R: Send + Sync + 'static,
{
    fn invoke<'a>(
        &'a self,
        message: &'a Message,
        ctx: &'a Arc<Context>,
        extra: &'a Extra,
    ) -> BoxFuture<'a, HandlerResult<Output>> {
        match downcast_message::<M>(message) {
            Ok(message) => (self.func)(message.clone(), Arc::clone(ctx), extra.clone())
                .map(|result| result.map(Output::new))
                .boxed(),
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }
}

#[derive(Clone)]
enum Variant {
    Stateful(Arc<dyn AsyncStatefulInvoke>),
    Plain(Arc<dyn AsyncPlainInvoke>),
}

/// A registered async handler with its message type erased.
#[derive(Clone)]
pub struct AsyncErasedHandler {
    name: Arc<str>,
    variant: Variant,
}

impl AsyncErasedHandler {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> HandlerKind {
        match self.variant {
            Variant::Stateful(_) => HandlerKind::Stateful,
            Variant::Plain(_) => HandlerKind::Plain,
        }
    }

    pub(crate) async fn call(
        &self,
        message: &Message,
        ctx: &Arc<Context>,
        extra: &Extra,
    ) -> Invocation {
        match &self.variant {
            Variant::Stateful(handler) => {
                let mut outbox = Outbox::new();
                let result = handler.invoke(message, ctx, extra, &mut outbox).await;
                Invocation {
                    result,
                    emitted: outbox.drain(),
                }
            }
            Variant::Plain(handler) => Invocation {
                result: handler.invoke(message, ctx, extra).await,
                emitted: Vec::new(),
            },
        }
    }
}

impl fmt::Debug for AsyncErasedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncErasedHandler")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

/// An async handler for messages of type `M`, ready to be registered.
pub struct AsyncBoxedHandler<M> {
    erased: AsyncErasedHandler,
    _message: PhantomData<fn(&M)>,
}

impl<M> AsyncBoxedHandler<M>
where
    M: Send + Sync + 'static,
{
    /// Wraps a stateful async handler. Its identity defaults to the type name.
    pub fn stateful<H: AsyncHandler<M>>(handler: H) -> Self {
        let cell = AsyncStatefulCell {
            handler: Mutex::new(handler),
            _message: PhantomData::<fn(&M)>,
        };
        Self::from_variant(type_name::<H>(), Variant::Stateful(Arc::new(cell)))
    }

    /// Wraps an async function or closure. The message is cloned per call.
    pub fn from_fn<F, Fut, R>(func: F) -> Self
    where
        M: Clone,
        F: Fn(M, Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
        R: Send + Sync + 'static,
    {
        Self::from_fn_with_extra(move |message: M, ctx: Arc<Context>, _: Extra| func(message, ctx))
            .named(type_name::<F>())
    }

    /// Wraps an async function or closure that also takes a clone of the
    /// per-call [`Extra`].
    pub fn from_fn_with_extra<F, Fut, R>(func: F) -> Self
    where
        M: Clone,
        F: Fn(M, Arc<Context>, Extra) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
        R: Send + Sync + 'static,
    {
        let plain = AsyncPlainFn {
            func,
            _marker: PhantomData::<fn(M) -> R>,
        };
        Self::from_variant(type_name::<F>(), Variant::Plain(Arc::new(plain)))
    }

    fn from_variant(name: &str, variant: Variant) -> Self {
        Self {
            erased: AsyncErasedHandler {
                name: Arc::from(name),
                variant,
            },
            _message: PhantomData,
        }
    }

    /// Overrides the handler identity.
    pub fn named(mut self, name: impl AsRef<str>) -> Self {
        self.erased.name = Arc::from(name.as_ref());
        self
    }

    pub fn name(&self) -> &str {
        self.erased.name()
    }

    pub fn kind(&self) -> HandlerKind {
        self.erased.kind()
    }

    pub fn into_erased(self) -> AsyncErasedHandler {
        self.erased
    }
}

impl<M> Clone for AsyncBoxedHandler<M> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _message: PhantomData,
        }
    }
}

impl<M> fmt::Debug for AsyncBoxedHandler<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.erased.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize, herald_macros::Event)]
    struct Ping {
        n: u32,
    }

    #[derive(Debug, Clone, Serialize, herald_macros::Event)]
    struct Pong {
        n: u32,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl AsyncHandler<Ping> for Recorder {
        type Output = u32;

        async fn before_handle(&mut self, _ctx: &Context) -> HandlerResult<()> {
            self.calls.lock().push("before");
            Ok(())
        }

        async fn handle(
            &mut self,
            event: &Ping,
            _ctx: &Context,
            outbox: &mut Outbox,
        ) -> HandlerResult<u32> {
            self.calls.lock().push("handle");
            if self.fail {
                return Err(HandlerError::failed("nope"));
            }
            outbox.emit_event(Pong { n: event.n });
            Ok(event.n)
        }

        async fn after_handle(&mut self, _ctx: &Context) {
            self.calls.lock().push("after");
        }
    }

    #[tokio::test]
    async fn stateful_handler_runs_lifecycle_and_emits() {
        let recorder = Recorder::default();
        let calls = Arc::clone(&recorder.calls);
        let erased = AsyncBoxedHandler::<Ping>::stateful(recorder).into_erased();

        let ctx = Arc::new(Context::new());
        let invocation = erased
            .call(&Message::event(Ping { n: 3 }), &ctx, &Extra::new())
            .await;

        assert_eq!(invocation.result.unwrap().downcast_ref::<u32>(), Some(&3));
        assert_eq!(invocation.emitted.len(), 1);
        assert_eq!(*calls.lock(), vec!["before", "handle", "after"]);
    }

    #[tokio::test]
    async fn after_hook_runs_on_failure() {
        let recorder = Recorder {
            fail: true,
            ..Default::default()
        };
        let calls = Arc::clone(&recorder.calls);
        let erased = AsyncBoxedHandler::<Ping>::stateful(recorder).into_erased();

        let invocation = erased
            .call(
                &Message::event(Ping { n: 3 }),
                &Arc::new(Context::new()),
                &Extra::new(),
            )
            .await;

        assert!(invocation.result.is_err());
        assert_eq!(*calls.lock(), vec!["before", "handle", "after"]);
    }

    #[tokio::test]
    async fn plain_handler_reads_context() {
        let erased = AsyncBoxedHandler::from_fn(|event: Ping, ctx: Arc<Context>| async move {
            let base = ctx.require::<u32>("base")?;
            Ok::<_, HandlerError>(*base + event.n)
        })
        .named("add_base")
        .into_erased();

        let ctx = Arc::new(Context::new());
        ctx.insert_value("base", 10_u32);
        let invocation = erased
            .call(&Message::event(Ping { n: 1 }), &ctx, &Extra::new())
            .await;

        assert_eq!(erased.kind(), HandlerKind::Plain);
        assert_eq!(invocation.result.unwrap().downcast_ref::<u32>(), Some(&11));
        assert!(invocation.emitted.is_empty());
    }

    #[tokio::test]
    async fn plain_handler_rejects_wrong_message_type() {
        let erased =
            AsyncBoxedHandler::from_fn(|_: Ping, _: Arc<Context>| async {
                Ok::<_, HandlerError>(())
            })
            .into_erased();
        let invocation = erased
            .call(
                &Message::event(Pong { n: 1 }),
                &Arc::new(Context::new()),
                &Extra::new(),
            )
            .await;

        assert!(matches!(
            invocation.result,
            Err(HandlerError::MessageTypeMismatch { got: "Pong", .. })
        ));
    }

    struct Stamper;

    #[async_trait]
    impl AsyncHandler<Ping> for Stamper {
        type Output = Option<String>;

        async fn handle(
            &mut self,
            _: &Ping,
            _: &Context,
            _: &mut Outbox,
        ) -> HandlerResult<Self::Output> {
            Ok(None)
        }

        async fn handle_with(
            &mut self,
            _: &Ping,
            _: &Context,
            extra: &Extra,
            _: &mut Outbox,
        ) -> HandlerResult<Self::Output> {
            Ok(extra.get_string("user_id"))
        }
    }

    #[tokio::test]
    async fn handlers_receive_the_call_extra() {
        let stateful = AsyncBoxedHandler::<Ping>::stateful(Stamper).into_erased();
        let plain = AsyncBoxedHandler::from_fn_with_extra(
            |event: Ping, _: Arc<Context>, extra: Extra| async move {
                let offset = extra.get("offset").and_then(|v| v.as_u64()).unwrap_or(0);
                Ok::<_, HandlerError>(offset as u32 + event.n)
            },
        )
        .into_erased();

        let ctx = Arc::new(Context::new());
        let message = Message::event(Ping { n: 1 });
        let extra = Extra::new().with("user_id", "u1").with("offset", 9);

        let stamped = stateful.call(&message, &ctx, &extra).await.result.unwrap();
        let summed = plain.call(&message, &ctx, &extra).await.result.unwrap();

        assert_eq!(
            stamped.downcast_ref::<Option<String>>(),
            Some(&Some("u1".to_string()))
        );
        assert_eq!(summed.downcast_ref::<u32>(), Some(&10));
    }
}
