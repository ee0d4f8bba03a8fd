use std::sync::Arc;

use tracing::{Level, debug, span};

use super::{DispatchState, Dispatched, MessageBus, missing_command, warn_unhandled};
use crate::context::Context;
use crate::error::DispatchResult;
use crate::extra::Extra;
use crate::handler::{BoxedHandler, ErasedHandler};
use crate::message::{BoxedCommand, BoxedEvent, Command, Event, Message, Named};
use crate::registry::HandlerRegistry;

/// The outcome of [`SyncBus::handle_step`].
#[derive(Debug, Default)]
pub struct DispatchStep {
    /// Outputs of the handlers of the stepped message.
    pub results: Vec<Dispatched>,
    /// Messages those handlers emitted, in queue order, not yet dispatched.
    pub emitted: Vec<Message>,
}

/// A bus that runs every handler inline on the calling thread.
///
/// Event handlers run one after another in registration order; each one's
/// emitted messages are queued as soon as it returns.
pub struct SyncBus {
    registry: HandlerRegistry<ErasedHandler>,
    context: Arc<Context>,
}

impl SyncBus {
    /// Creates a bus with no handlers and an empty context.
    pub fn new() -> Self {
        Self::from_registry(HandlerRegistry::new())
    }

    pub fn builder() -> SyncBusBuilder {
        SyncBusBuilder::default()
    }

    /// Creates a bus over an existing registry.
    pub fn from_registry(registry: HandlerRegistry<ErasedHandler>) -> Self {
        Self {
            registry,
            context: Arc::new(Context::new()),
        }
    }

    /// The context shared with every handler.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_arc(&self) -> Arc<Context> {
        Arc::clone(&self.context)
    }

    pub fn registry(&self) -> &HandlerRegistry<ErasedHandler> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry<ErasedHandler> {
        &mut self.registry
    }

    fn dispatch_event(
        &self,
        message: &Message,
        event: &BoxedEvent,
        extra: &Extra,
        state: &mut DispatchState,
    ) {
        let Ok(handlers) = self.registry.event_handlers(event) else {
            warn_unhandled(message);
            return;
        };

        for handler in handlers {
            debug!(
                event = event.event_name(),
                handler = handler.name(),
                "Handling event"
            );
            let invocation = handler.call(message, &self.context, extra);
            state.settle_event(message, handler.name(), invocation);
        }
    }

    fn dispatch_command(
        &self,
        message: &Message,
        command: &BoxedCommand,
        extra: &Extra,
        state: &mut DispatchState,
    ) -> DispatchResult<()> {
        let handler = self
            .registry
            .command_handler(command)
            .map_err(|_| missing_command(message))?;

        debug!(
            command = command.command_name(),
            handler = handler.name(),
            "Handling command"
        );
        let invocation = handler.call(message, &self.context, extra);
        state.settle_command(message, handler.name(), invocation)
    }

    fn dispatch(
        &self,
        message: &Message,
        extra: &Extra,
        state: &mut DispatchState,
    ) -> DispatchResult<()> {
        match message {
            Message::Event(event) => {
                self.dispatch_event(message, event, extra, state);
                Ok(())
            }
            Message::Command(command) => self.dispatch_command(message, command, extra, state),
        }
    }

    /// Dispatches `message` to its own handlers only. Whatever they emit is
    /// returned instead of being dispatched.
    pub fn handle_step(&self, message: Message, extra: &Extra) -> DispatchResult<DispatchStep> {
        let span = span!(Level::DEBUG, "handle_step", message = %message.name());
        let _enter = span.enter();

        let mut state = DispatchState::new(message);
        if let Some(message) = state.next() {
            self.dispatch(&message, extra, &mut state)?;
        }

        let (results, emitted) = state.into_parts();
        Ok(DispatchStep { results, emitted })
    }
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for SyncBus {
    fn set_event_handlers<E: Event + Named>(&mut self, handlers: Vec<BoxedHandler<E>>) {
        self.registry.set_event_handlers(handlers);
    }

    fn set_command_handler<C: Command + Named>(&mut self, handler: BoxedHandler<C>) {
        self.registry.set_command_handler(handler);
    }

    fn handle_with(&self, message: Message, extra: Extra) -> DispatchResult<Vec<Dispatched>> {
        let span = span!(Level::DEBUG, "handle", message = %message.name(), extra = extra.len());
        let _enter = span.enter();

        let mut state = DispatchState::new(message);
        while let Some(message) = state.next() {
            self.dispatch(&message, &extra, &mut state)?;
        }

        Ok(state.finish())
    }
}

impl std::fmt::Debug for SyncBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBus")
            .field("registry", &self.registry)
            .field("context", &self.context)
            .finish()
    }
}

/// Builder for [`SyncBus`].
#[derive(Default)]
pub struct SyncBusBuilder {
    registry: HandlerRegistry<ErasedHandler>,
    context: Option<Arc<Context>>,
}

impl SyncBusBuilder {
    /// Shares an existing context instead of creating a fresh one.
    pub fn context(mut self, context: Arc<Context>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn event_handlers<E: Event + Named>(mut self, handlers: Vec<BoxedHandler<E>>) -> Self {
        self.registry.set_event_handlers(handlers);
        self
    }

    pub fn command_handler<C: Command + Named>(mut self, handler: BoxedHandler<C>) -> Self {
        self.registry.set_command_handler(handler);
        self
    }

    pub fn build(self) -> SyncBus {
        SyncBus {
            registry: self.registry,
            context: self.context.unwrap_or_default(),
        }
    }
}
