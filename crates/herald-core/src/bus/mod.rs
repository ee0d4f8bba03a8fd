//! Message buses.
//!
//! A bus accepts one [`Message`], dispatches it to the registered handlers,
//! and keeps draining a FIFO queue of follow-up messages emitted by stateful
//! handlers until the queue is empty:
//!
//! - **Events** go to every handler registered for their type. A failing
//!   event handler is logged and skipped; the rest still run.
//! - **Commands** go to their single handler. A missing handler or a failing
//!   command aborts the whole call.
//!
//! Emitted messages join the tail of the queue. When an event `E` is handled
//! while a sibling `E2` is already queued, anything `E`'s handlers emit runs
//! after `E2`: the queue is strictly first-in, first-out.
//!
//! [`handle_with`](MessageBus::handle_with) also takes an [`Extra`], which
//! every handler invoked during the call receives, including the handlers
//! of emitted messages. [`handle`](MessageBus::handle) passes an empty one.
//!
//! Three implementations are provided:
//!
//! - [`SyncBus`] - Runs every handler inline, in registration order
//! - [`AsyncBus`] - Runs the handlers of one event concurrently as a cohort
//! - [`DryRunBus`] - Records what would be dispatched without running anything
//!
//! # Example
//!
//! ```rust,ignore
//! let mut bus = SyncBus::new();
//! bus.set_event_handlers(vec![BoxedHandler::stateful(EventsLogger::default())]);
//! bus.set_command_handler(BoxedHandler::from_fn(create_folder));
//!
//! let results = bus.handle(Message::command(CreateFolder { title: "Inbox".into() }))?;
//! let folder_id = results[0].output::<String>();
//!
//! bus.handle_with(Message::event(folder_removed), Extra::new().with("user_id", "u1"))?;
//! ```

mod async_bus;
mod dry_run;
mod sync_bus;

pub use async_bus::{AsyncBus, AsyncBusBuilder};
pub use dry_run::{DryRunBus, Recorded};
pub use sync_bus::{DispatchStep, SyncBus, SyncBusBuilder};

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::{debug, error, trace, warn};

use crate::async_handler::AsyncBoxedHandler;
use crate::error::{DispatchError, DispatchResult};
use crate::extra::Extra;
use crate::handler::{BoxedHandler, Invocation, Output};
use crate::message::{Command, Event, Message, Named};

// ============================================================================
// Dispatch Results
// ============================================================================

/// The result of one successful handler invocation.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// The message the handler received.
    pub message: Message,
    /// The handler identity.
    pub handler: String,
    /// The value the handler returned.
    pub output: Output,
}

impl Dispatched {
    pub fn message_name(&self) -> &'static str {
        self.message.name()
    }

    /// Downcasts the handler output.
    pub fn output<T: 'static>(&self) -> Option<&T> {
        self.output.downcast_ref::<T>()
    }
}

// ============================================================================
// Dispatch State
// ============================================================================

/// Queue and accumulated results of one `handle` call.
pub(crate) struct DispatchState {
    queue: VecDeque<Message>,
    results: Vec<Dispatched>,
}

impl DispatchState {
    pub(crate) fn new(message: Message) -> Self {
        Self {
            queue: VecDeque::from([message]),
            results: Vec::new(),
        }
    }

    pub(crate) fn next(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }

    /// Appends to the tail, behind anything queued before.
    fn enqueue(&mut self, emitted: Vec<Message>) {
        if emitted.is_empty() {
            return;
        }
        trace!(emitted = emitted.len(), "Queueing emitted messages");
        self.queue.extend(emitted);
    }

    /// Applies an event handler outcome. Failures are logged and contained.
    pub(crate) fn settle_event(
        &mut self,
        message: &Message,
        handler: &str,
        invocation: Invocation,
    ) {
        let Invocation { result, emitted } = invocation;
        match result {
            Ok(output) => {
                self.enqueue(emitted);
                self.results.push(Dispatched {
                    message: message.clone(),
                    handler: handler.to_string(),
                    output,
                });
            }
            Err(err) => {
                if !emitted.is_empty() {
                    debug!(
                        event = message.name(),
                        handler,
                        discarded = emitted.len(),
                        "Discarding messages emitted by failed handler"
                    );
                }
                error!(
                    event = message.name(),
                    handler,
                    error = %err,
                    "Exception handling event"
                );
            }
        }
    }

    /// Applies a command handler outcome. Failures abort the call.
    pub(crate) fn settle_command(
        &mut self,
        message: &Message,
        handler: &str,
        invocation: Invocation,
    ) -> DispatchResult<()> {
        let Invocation { result, emitted } = invocation;
        match result {
            Ok(output) => {
                self.enqueue(emitted);
                self.results.push(Dispatched {
                    message: message.clone(),
                    handler: handler.to_string(),
                    output,
                });
                Ok(())
            }
            Err(source) => {
                error!(
                    command = message.name(),
                    handler,
                    error = %source,
                    "Exception handling command"
                );
                Err(DispatchError::CommandFailed {
                    command: message.name(),
                    handler: handler.to_string(),
                    source,
                })
            }
        }
    }

    pub(crate) fn finish(self) -> Vec<Dispatched> {
        self.results
    }

    /// The results so far and the messages still queued.
    pub(crate) fn into_parts(self) -> (Vec<Dispatched>, Vec<Message>) {
        (self.results, self.queue.into())
    }
}

/// Logs an event without registered handlers.
pub(crate) fn warn_unhandled(message: &Message) {
    warn!(event = message.name(), "No handlers registered for event");
}

/// Logs and builds the error for a command without a handler.
pub(crate) fn missing_command(message: &Message) -> DispatchError {
    error!(command = message.name(), "No handler registered for command");
    DispatchError::CommandHandlerMissing {
        command: message.name(),
    }
}

// ============================================================================
// Bus Traits
// ============================================================================

/// A synchronous message bus.
pub trait MessageBus {
    /// Registers the handlers for event type `E`, replacing any previous list.
    fn set_event_handlers<E: Event + Named>(&mut self, handlers: Vec<BoxedHandler<E>>);

    /// Registers the handler for command type `C`, replacing any previous one.
    fn set_command_handler<C: Command + Named>(&mut self, handler: BoxedHandler<C>);

    /// Dispatches a message and everything it transitively emits, handing
    /// `extra` to every handler on the way.
    ///
    /// Returns the outputs of successful handlers in processing order.
    fn handle_with(&self, message: Message, extra: Extra) -> DispatchResult<Vec<Dispatched>>;

    /// [`handle_with`](Self::handle_with) with an empty [`Extra`].
    fn handle(&self, message: Message) -> DispatchResult<Vec<Dispatched>> {
        self.handle_with(message, Extra::new())
    }

    /// Handles each message in turn with the same `extra`, concatenating the
    /// results.
    ///
    /// Stops at the first message whose call fails.
    fn batch_handle_with<I>(&self, messages: I, extra: Extra) -> DispatchResult<Vec<Dispatched>>
    where
        I: IntoIterator<Item = Message>,
    {
        let mut results = Vec::new();
        for message in messages {
            results.extend(self.handle_with(message, extra.clone())?);
        }
        Ok(results)
    }

    fn batch_handle<I>(&self, messages: I) -> DispatchResult<Vec<Dispatched>>
    where
        I: IntoIterator<Item = Message>,
    {
        self.batch_handle_with(messages, Extra::new())
    }
}

/// An asynchronous message bus.
#[async_trait]
pub trait AsyncMessageBus: Send + Sync {
    fn set_event_handlers<E: Event + Named>(&mut self, handlers: Vec<AsyncBoxedHandler<E>>);

    fn set_command_handler<C: Command + Named>(&mut self, handler: AsyncBoxedHandler<C>);

    async fn handle_with(&self, message: Message, extra: Extra) -> DispatchResult<Vec<Dispatched>>;

    async fn handle(&self, message: Message) -> DispatchResult<Vec<Dispatched>> {
        self.handle_with(message, Extra::new()).await
    }

    async fn batch_handle_with(
        &self,
        messages: Vec<Message>,
        extra: Extra,
    ) -> DispatchResult<Vec<Dispatched>> {
        let mut results = Vec::new();
        for message in messages {
            results.extend(self.handle_with(message, extra.clone()).await?);
        }
        Ok(results)
    }

    async fn batch_handle(&self, messages: Vec<Message>) -> DispatchResult<Vec<Dispatched>> {
        self.batch_handle_with(messages, Extra::new()).await
    }
}
