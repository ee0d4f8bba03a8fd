use parking_lot::Mutex;

use super::{Dispatched, MessageBus};
use crate::error::{DispatchError, DispatchResult};
use crate::extra::Extra;
use crate::handler::{BoxedHandler, ErasedHandler};
use crate::message::{Command, Event, Message, Named};
use crate::registry::HandlerRegistry;

/// One message seen by a [`DryRunBus`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub message: Message,
    /// The handlers that would have run, in order.
    pub handlers: Vec<String>,
    /// The values passed to `handle_with`.
    pub extra: Extra,
}

/// A bus that records what it is asked to dispatch and runs nothing.
///
/// Useful in tests of code that talks to a bus: register handlers as usual,
/// call `handle`, then inspect [`recorded`](Self::recorded). No handler is
/// invoked, so nothing is emitted and the result list is always empty.
/// Commands without a handler are still rejected.
#[derive(Default)]
pub struct DryRunBus {
    registry: HandlerRegistry<ErasedHandler>,
    recorded: Mutex<Vec<Recorded>>,
}

impl DryRunBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in call order.
    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().clone()
    }

    /// Names of the recorded messages, in call order.
    pub fn message_names(&self) -> Vec<&'static str> {
        self.recorded.lock().iter().map(|r| r.message.name()).collect()
    }

    pub fn clear(&self) {
        self.recorded.lock().clear();
    }

    fn handler_names(handlers: &[ErasedHandler]) -> Vec<String> {
        handlers.iter().map(|h| h.name().to_string()).collect()
    }
}

impl MessageBus for DryRunBus {
    fn set_event_handlers<E: Event + Named>(&mut self, handlers: Vec<BoxedHandler<E>>) {
        self.registry.set_event_handlers(handlers);
    }

    fn set_command_handler<C: Command + Named>(&mut self, handler: BoxedHandler<C>) {
        self.registry.set_command_handler(handler);
    }

    fn handle_with(&self, message: Message, extra: Extra) -> DispatchResult<Vec<Dispatched>> {
        let handlers = match &message {
            Message::Event(event) => self
                .registry
                .event_handlers(event)
                .map(Self::handler_names)
                .unwrap_or_default(),
            Message::Command(command) => {
                let handler = self.registry.command_handler(command).map_err(|_| {
                    DispatchError::CommandHandlerMissing {
                        command: command.command_name(),
                    }
                })?;
                vec![handler.name().to_string()]
            }
        };

        self.recorded.lock().push(Recorded {
            message,
            handlers,
            extra,
        });
        Ok(Vec::new())
    }
}

impl std::fmt::Debug for DryRunBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DryRunBus")
            .field("registry", &self.registry)
            .field("recorded", &self.recorded.lock().len())
            .finish()
    }
}
