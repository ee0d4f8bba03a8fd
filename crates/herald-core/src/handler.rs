//! Synchronous handlers.
//!
//! Two handler variants are supported:
//!
//! - **Stateful** handlers implement [`Handler`]. They get a before hook, the
//!   core logic, and an after hook that runs on every exit path of the core
//!   logic. They can emit follow-up messages through an [`Outbox`].
//! - **Plain** handlers are closures `Fn(&M, &Context) -> HandlerResult<R>`.
//!   They have no hooks and cannot emit.
//!
//! Every invocation also receives the [`Extra`] the caller passed to
//! `handle_with`; stateful handlers read it by overriding
//! [`Handler::handle_with`], plain ones by registering through
//! [`BoxedHandler::from_fn_with_extra`].
//!
//! Both are registered as a [`BoxedHandler<M>`] and erased into an
//! [`ErasedHandler`] keyed by message type inside the registry.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Counter { seen: usize }
//!
//! impl Handler<FolderCreated> for Counter {
//!     type Output = usize;
//!
//!     fn handle(
//!         &mut self,
//!         event: &FolderCreated,
//!         _ctx: &Context,
//!         outbox: &mut Outbox,
//!     ) -> HandlerResult<usize> {
//!         self.seen += 1;
//!         outbox.emit_event(FolderIndexed { id: event.id.clone() });
//!         Ok(self.seen)
//!     }
//! }
//!
//! bus.set_event_handlers(vec![
//!     BoxedHandler::stateful(Counter { seen: 0 }),
//!     BoxedHandler::from_fn(|event: &FolderCreated, _ctx: &Context| Ok(event.id.clone())),
//! ]);
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Context;
use crate::error::{HandlerError, HandlerResult};
use crate::extra::Extra;
use crate::message::{Command, Event, Message};

// ============================================================================
// Outbox
// ============================================================================

/// Buffer of messages emitted by one stateful handler invocation.
///
/// The dispatcher drains it after the invocation returns and appends the
/// messages to its queue in emission order. Messages emitted by an
/// invocation that fails are discarded.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<Message>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits an already-wrapped message.
    pub fn emit(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Emits a follow-up event.
    pub fn emit_event<E: Event>(&mut self, event: E) {
        self.messages.push(Message::event(event));
    }

    /// Emits a follow-up command.
    pub fn emit_command<C: Command>(&mut self, command: C) {
        self.messages.push(Message::command(command));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Takes every buffered message, leaving the outbox empty.
    pub fn drain(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }
}

// ============================================================================
// Output
// ============================================================================

/// Type-erased return value of a handler.
#[derive(Clone)]
pub struct Output {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Output {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Attempts to downcast the output to `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Returns `true` if the handler returned `()`.
    pub fn is_unit(&self) -> bool {
        self.is::<()>()
    }

    /// The name of the concrete output type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Output").field(&self.type_name).finish()
    }
}

// ============================================================================
// Stateful Handler Trait
// ============================================================================

/// A handler with lifecycle hooks and the ability to emit messages.
///
/// The bus owns one instance per registration and never runs it concurrently
/// with itself, so hooks can keep per-invocation state in `self`.
pub trait Handler<M>: Send + 'static {
    /// The value returned by a successful invocation.
    type Output: Send + Sync + 'static;

    /// Runs before [`handle`](Self::handle). An error skips the core logic
    /// and the after hook.
    fn before_handle(&mut self, _ctx: &Context) -> HandlerResult<()> {
        Ok(())
    }

    /// The core logic.
    fn handle(
        &mut self,
        message: &M,
        ctx: &Context,
        outbox: &mut Outbox,
    ) -> HandlerResult<Self::Output>;

    /// The core logic, given the per-call [`Extra`]. Defaults to
    /// [`handle`](Self::handle).
    fn handle_with(
        &mut self,
        message: &M,
        ctx: &Context,
        _extra: &Extra,
        outbox: &mut Outbox,
    ) -> HandlerResult<Self::Output> {
        self.handle(message, ctx, outbox)
    }

    /// Runs after [`handle`](Self::handle) on every exit path, including
    /// errors and panics.
    fn after_handle(&mut self, _ctx: &Context) {}

    /// Runs the full lifecycle: before hook, core logic, after hook.
    fn invoke(
        &mut self,
        message: &M,
        ctx: &Context,
        extra: &Extra,
        outbox: &mut Outbox,
    ) -> HandlerResult<Self::Output>
    where
        Self: Sized,
    {
        self.before_handle(ctx)?;
        let mut guard = AfterHook {
            handler: self,
            ctx,
            _message: PhantomData,
        };
        let result = guard.handler.handle_with(message, ctx, extra, outbox);
        drop(guard);
        result
    }
}

/// Calls `after_handle` when dropped, so the hook also runs on unwind.
struct AfterHook<'a, M, H: Handler<M>> {
    handler: &'a mut H,
    ctx: &'a Context,
    _message: PhantomData<fn(&M)>,
}

impl<M, H: Handler<M>> Drop for AfterHook<'_, M, H> {
    fn drop(&mut self) {
        self.handler.after_handle(self.ctx);
    }
}

// ============================================================================
// Type Erasure
// ============================================================================

/// Which variant a registered handler is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Stateful,
    Plain,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stateful => f.write_str("stateful"),
            Self::Plain => f.write_str("plain"),
        }
    }
}

pub(crate) fn downcast_message<M: 'static>(message: &Message) -> HandlerResult<&M> {
    message
        .downcast_ref::<M>()
        .ok_or_else(|| HandlerError::MessageTypeMismatch {
            expected: type_name::<M>(),
            got: message.name(),
        })
}

trait StatefulInvoke: Send + Sync {
    fn invoke(
        &self,
        message: &Message,
        ctx: &Context,
        extra: &Extra,
        outbox: &mut Outbox,
    ) -> HandlerResult<Output>;
}

struct StatefulCell<M, H> {
    handler: Mutex<H>,
    _message: PhantomData<fn(&M)>,
}

impl<M, H> StatefulInvoke for StatefulCell<M, H>
where
    M: 'static,
    H: Handler<M>,
{
    fn invoke(
        &self,
        message: &Message,
        ctx: &Context,
        extra: &Extra,
        outbox: &mut Outbox,
    ) -> HandlerResult<Output> {
        let message = downcast_message::<M>(message)?;
        let mut handler = self.handler.lock();
        handler.invoke(message, ctx, extra, outbox).map(Output::new)
    }
}

trait PlainInvoke: Send + Sync {
    fn invoke(&self, message: &Message, ctx: &Context, extra: &Extra) -> HandlerResult<Output>;
}

struct PlainFn<M, F, R> {
    func: F,
    _marker: PhantomData<fn(&M) -> R>,
}

impl<M, F, R> PlainInvoke for PlainFn<M, F, R>
where
    M: 'static,
    F: Fn(&M, &Context, &Extra) -> HandlerResult<R> + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn invoke(&self, message: &Message, ctx: &Context, extra: &Extra) -> HandlerResult<Output> {
        let message = downcast_message::<M>(message)?;
        (self.func)(message, ctx, extra).map(Output::new)
    }
}

#[derive(Clone)]
enum Variant {
    Stateful(Arc<dyn StatefulInvoke>),
    Plain(Arc<dyn PlainInvoke>),
}

/// The outcome of one handler invocation, before the dispatcher acts on it.
pub(crate) struct Invocation {
    pub result: HandlerResult<Output>,
    pub emitted: Vec<Message>,
}

/// A registered handler with its message type erased.
#[derive(Clone)]
pub struct ErasedHandler {
    name: Arc<str>,
    variant: Variant,
}

impl ErasedHandler {
    /// The handler identity used in logs and results.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> HandlerKind {
        match self.variant {
            Variant::Stateful(_) => HandlerKind::Stateful,
            Variant::Plain(_) => HandlerKind::Plain,
        }
    }

    pub(crate) fn call(&self, message: &Message, ctx: &Context, extra: &Extra) -> Invocation {
        match &self.variant {
            Variant::Stateful(handler) => {
                let mut outbox = Outbox::new();
                let result = handler.invoke(message, ctx, extra, &mut outbox);
                Invocation {
                    result,
                    emitted: outbox.drain(),
                }
            }
            Variant::Plain(handler) => Invocation {
                result: handler.invoke(message, ctx, extra),
                emitted: Vec::new(),
            },
        }
    }
}

impl fmt::Debug for ErasedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedHandler")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

/// A handler for messages of type `M`, ready to be registered.
pub struct BoxedHandler<M> {
    erased: ErasedHandler,
    _message: PhantomData<fn(&M)>,
}

impl<M: 'static> BoxedHandler<M> {
    /// Wraps a stateful handler. Its identity defaults to the type name.
    pub fn stateful<H: Handler<M>>(handler: H) -> Self {
        let cell = StatefulCell {
            handler: Mutex::new(handler),
            _message: PhantomData::<fn(&M)>,
        };
        Self::from_variant(type_name::<H>(), Variant::Stateful(Arc::new(cell)))
    }

    /// Wraps a plain function or closure.
    pub fn from_fn<F, R>(func: F) -> Self
    where
        F: Fn(&M, &Context) -> HandlerResult<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        Self::from_fn_with_extra(move |message: &M, ctx: &Context, _: &Extra| func(message, ctx))
            .named(type_name::<F>())
    }

    /// Wraps a plain function or closure that also reads the per-call [`Extra`].
    pub fn from_fn_with_extra<F, R>(func: F) -> Self
    where
        F: Fn(&M, &Context, &Extra) -> HandlerResult<R> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        let plain = PlainFn {
            func,
            _marker: PhantomData::<fn(&M) -> R>,
        };
        Self::from_variant(type_name::<F>(), Variant::Plain(Arc::new(plain)))
    }

    fn from_variant(name: &str, variant: Variant) -> Self {
        Self {
            erased: ErasedHandler {
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

    pub fn into_erased(self) -> ErasedHandler {
        self.erased
    }
}

impl<M> Clone for BoxedHandler<M> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _message: PhantomData,
        }
    }
}

impl<M> fmt::Debug for BoxedHandler<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.erased.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::panic::{AssertUnwindSafe, catch_unwind};

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
        calls: Vec<&'static str>,
        fail_before: bool,
        fail_handle: bool,
        panic_handle: bool,
    }

    impl Handler<Ping> for Recorder {
        type Output = u32;

        fn before_handle(&mut self, _ctx: &Context) -> HandlerResult<()> {
            self.calls.push("before");
            if self.fail_before {
                return Err(HandlerError::failed("before"));
            }
            Ok(())
        }

        fn handle(
            &mut self,
            event: &Ping,
            _ctx: &Context,
            outbox: &mut Outbox,
        ) -> HandlerResult<u32> {
            self.calls.push("handle");
            if self.panic_handle {
                panic!("boom");
            }
            if self.fail_handle {
                return Err(HandlerError::failed("handle"));
            }
            outbox.emit_event(Pong { n: event.n + 1 });
            Ok(event.n * 2)
        }

        fn after_handle(&mut self, _ctx: &Context) {
            self.calls.push("after");
        }
    }

    #[test]
    fn invoke_runs_hooks_in_order() {
        let mut handler = Recorder::default();
        let mut outbox = Outbox::new();
        let out = handler
            .invoke(&Ping { n: 2 }, &Context::new(), &Extra::new(), &mut outbox)
            .unwrap();

        assert_eq!(out, 4);
        assert_eq!(handler.calls, vec!["before", "handle", "after"]);
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox.messages()[0].downcast_ref::<Pong>().unwrap().n, 3);
    }

    #[test]
    fn after_hook_runs_when_core_fails() {
        let mut handler = Recorder {
            fail_handle: true,
            ..Default::default()
        };
        let result = handler.invoke(
            &Ping { n: 1 },
            &Context::new(),
            &Extra::new(),
            &mut Outbox::new(),
        );

        assert!(result.is_err());
        assert_eq!(handler.calls, vec!["before", "handle", "after"]);
    }

    #[test]
    fn after_hook_runs_when_core_panics() {
        let mut handler = Recorder {
            panic_handle: true,
            ..Default::default()
        };
        let ctx = Context::new();
        let unwound = catch_unwind(AssertUnwindSafe(|| {
            let _ = handler.invoke(&Ping { n: 1 }, &ctx, &Extra::new(), &mut Outbox::new());
        }));

        assert!(unwound.is_err());
        assert_eq!(handler.calls, vec!["before", "handle", "after"]);
    }

    #[test]
    fn failed_before_hook_skips_core_and_after() {
        let mut handler = Recorder {
            fail_before: true,
            ..Default::default()
        };
        let result = handler.invoke(
            &Ping { n: 1 },
            &Context::new(),
            &Extra::new(),
            &mut Outbox::new(),
        );

        assert!(result.is_err());
        assert_eq!(handler.calls, vec!["before"]);
    }

    #[test]
    fn erased_stateful_handler_returns_output_and_emissions() {
        let erased = BoxedHandler::<Ping>::stateful(Recorder::default()).into_erased();
        assert_eq!(erased.kind(), HandlerKind::Stateful);

        let invocation = erased.call(
            &Message::event(Ping { n: 5 }),
            &Context::new(),
            &Extra::new(),
        );
        let output = invocation.result.unwrap();
        assert_eq!(output.downcast_ref::<u32>(), Some(&10));
        assert_eq!(invocation.emitted.len(), 1);
    }

    #[test]
    fn erased_plain_handler_cannot_emit() {
        let erased = BoxedHandler::from_fn(|event: &Ping, _ctx: &Context| Ok(event.n + 1))
            .named("plus_one")
            .into_erased();
        assert_eq!(erased.name(), "plus_one");
        assert_eq!(erased.kind(), HandlerKind::Plain);

        let invocation = erased.call(
            &Message::event(Ping { n: 1 }),
            &Context::new(),
            &Extra::new(),
        );
        assert_eq!(invocation.result.unwrap().downcast_ref::<u32>(), Some(&2));
        assert!(invocation.emitted.is_empty());
    }

    #[test]
    fn erased_handler_rejects_wrong_message_type() {
        let erased = BoxedHandler::from_fn(|_: &Ping, _: &Context| Ok(())).into_erased();
        let invocation = erased.call(
            &Message::event(Pong { n: 1 }),
            &Context::new(),
            &Extra::new(),
        );

        assert!(matches!(
            invocation.result,
            Err(HandlerError::MessageTypeMismatch { got: "Pong", .. })
        ));
    }

    struct Tagger;

    impl Handler<Ping> for Tagger {
        type Output = String;

        fn handle(&mut self, event: &Ping, _: &Context, _: &mut Outbox) -> HandlerResult<String> {
            Ok(format!("anonymous:{}", event.n))
        }

        fn handle_with(
            &mut self,
            event: &Ping,
            _: &Context,
            extra: &Extra,
            _: &mut Outbox,
        ) -> HandlerResult<String> {
            let user = extra.get_string("user_id").unwrap_or_else(|| "anonymous".into());
            Ok(format!("{user}:{}", event.n))
        }
    }

    #[test]
    fn stateful_handler_reads_extra_through_handle_with() {
        let erased = BoxedHandler::<Ping>::stateful(Tagger).into_erased();
        let message = Message::event(Ping { n: 3 });

        let with_user = erased.call(&message, &Context::new(), &Extra::new().with("user_id", "u1"));
        let without = erased.call(&message, &Context::new(), &Extra::new());

        assert_eq!(with_user.result.unwrap().downcast_ref::<String>().unwrap(), "u1:3");
        assert_eq!(without.result.unwrap().downcast_ref::<String>().unwrap(), "anonymous:3");
    }

    #[test]
    fn handle_with_defaults_to_handle() {
        let mut handler = Recorder::default();
        let extra = Extra::new().with("user_id", "u1");
        let out = handler
            .invoke(&Ping { n: 4 }, &Context::new(), &extra, &mut Outbox::new())
            .unwrap();

        assert_eq!(out, 8);
        assert_eq!(handler.calls, vec!["before", "handle", "after"]);
    }

    #[test]
    fn plain_handler_with_extra_receives_call_values() {
        let erased = BoxedHandler::from_fn_with_extra(|event: &Ping, _: &Context, extra: &Extra| {
            Ok(extra.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as u32 + event.n)
        })
        .into_erased();

        let invocation = erased.call(
            &Message::event(Ping { n: 1 }),
            &Context::new(),
            &Extra::new().with("offset", 41),
        );
        assert_eq!(invocation.result.unwrap().downcast_ref::<u32>(), Some(&42));
    }

    #[test]
    fn plain_name_defaults_to_closure_type_name() {
        let handler = BoxedHandler::from_fn(|_: &Ping, _: &Context| Ok(()));
        assert!(handler.name().contains("handler::tests"));
    }

    #[test]
    fn stateful_name_defaults_to_type_name() {
        let handler = BoxedHandler::<Ping>::stateful(Recorder::default());
        assert!(handler.name().ends_with("Recorder"));
    }
}
