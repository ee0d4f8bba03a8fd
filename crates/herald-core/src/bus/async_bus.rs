use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{Instrument, Level, debug, span};

use super::{AsyncMessageBus, DispatchState, Dispatched, missing_command, warn_unhandled};
use crate::async_handler::{AsyncBoxedHandler, AsyncErasedHandler};
use crate::context::Context;
use crate::error::DispatchResult;
use crate::extra::Extra;
use crate::message::{BoxedCommand, BoxedEvent, Command, Event, Message, Named};
use crate::registry::HandlerRegistry;

/// A bus that awaits handlers instead of blocking on them.
///
/// All handlers of one event run concurrently as a cohort on the calling
/// task. Once every member has settled, their outcomes are applied in
/// registration order: results recorded, emitted messages queued, failures
/// logged. Call-scoped context entries are then released; every event step
/// is a release point, including an event with no handlers. Commands are
/// awaited one at a time.
pub struct AsyncBus {
    registry: HandlerRegistry<AsyncErasedHandler>,
    context: Arc<Context>,
}

impl AsyncBus {
    pub fn new() -> Self {
        Self::from_registry(HandlerRegistry::new())
    }

    pub fn builder() -> AsyncBusBuilder {
        AsyncBusBuilder::default()
    }

    pub fn from_registry(registry: HandlerRegistry<AsyncErasedHandler>) -> Self {
        Self {
            registry,
            context: Arc::new(Context::new()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_arc(&self) -> Arc<Context> {
        Arc::clone(&self.context)
    }

    pub fn registry(&self) -> &HandlerRegistry<AsyncErasedHandler> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry<AsyncErasedHandler> {
        &mut self.registry
    }

    async fn dispatch_event(
        &self,
        message: &Message,
        event: &BoxedEvent,
        extra: &Extra,
        state: &mut DispatchState,
    ) {
        match self.registry.event_handlers(event) {
            Ok(handlers) => {
                debug!(
                    event = event.event_name(),
                    cohort = handlers.len(),
                    "Handling event"
                );
                let mut cohort = Vec::with_capacity(handlers.len());
                for handler in handlers {
                    cohort.push(handler.call(message, &self.context, extra));
                }
                let settled = join_all(cohort).await;

                for (handler, invocation) in handlers.iter().zip(settled) {
                    state.settle_event(message, handler.name(), invocation);
                }
            }
            Err(_) => warn_unhandled(message),
        }

        self.release_scoped();
    }

    fn release_scoped(&self) {
        let released = self.context.release_scoped();
        if !released.is_empty() {
            debug!(keys = ?released, "Released call-scoped context entries");
        }
    }

    async fn dispatch_command(
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
        let invocation = handler.call(message, &self.context, extra).await;
        state.settle_command(message, handler.name(), invocation)
    }

    async fn drain(&self, message: Message, extra: Extra) -> DispatchResult<Vec<Dispatched>> {
        let mut state = DispatchState::new(message);
        while let Some(message) = state.next() {
            match &message {
                Message::Event(event) => {
                    self.dispatch_event(&message, event, &extra, &mut state)
                        .await
                }
                Message::Command(command) => {
                    self.dispatch_command(&message, command, &extra, &mut state)
                        .await?
                }
            }
        }
        Ok(state.finish())
    }
}

impl Default for AsyncBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsyncMessageBus for AsyncBus {
    fn set_event_handlers<E: Event + Named>(&mut self, handlers: Vec<AsyncBoxedHandler<E>>) {
        self.registry.set_event_handlers(handlers);
    }

    fn set_command_handler<C: Command + Named>(&mut self, handler: AsyncBoxedHandler<C>) {
        self.registry.set_command_handler(handler);
    }

    async fn handle_with(&self, message: Message, extra: Extra) -> DispatchResult<Vec<Dispatched>> {
        let span = span!(Level::DEBUG, "handle", message = %message.name(), extra = extra.len());
        self.drain(message, extra).instrument(span).await
    }
}

impl std::fmt::Debug for AsyncBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBus")
            .field("registry", &self.registry)
            .field("context", &self.context)
            .finish()
    }
}

/// Builder for [`AsyncBus`].
#[derive(Default)]
pub struct AsyncBusBuilder {
    registry: HandlerRegistry<AsyncErasedHandler>,
    context: Option<Arc<Context>>,
}

impl AsyncBusBuilder {
    pub fn context(mut self, context: Arc<Context>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn event_handlers<E: Event + Named>(mut self, handlers: Vec<AsyncBoxedHandler<E>>) -> Self {
        self.registry.set_event_handlers(handlers);
        self
    }

    pub fn command_handler<C: Command + Named>(mut self, handler: AsyncBoxedHandler<C>) -> Self {
        self.registry.set_command_handler(handler);
        self
    }

    pub fn build(self) -> AsyncBus {
        AsyncBus {
            registry: self.registry,
            context: self.context.unwrap_or_default(),
        }
    }
}
