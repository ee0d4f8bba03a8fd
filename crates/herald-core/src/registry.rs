//! Handler registry.
//!
//! [`HandlerRegistry`] maps each event type to an ordered list of handlers and
//! each command type to a single handler. It is generic over the erased
//! handler form so the sync and async buses share one implementation.
//!
//! Registration replaces by key: setting handlers for a type that already has
//! some discards the old ones.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::async_handler::{AsyncBoxedHandler, AsyncErasedHandler};
use crate::error::RegistryError;
use crate::handler::{BoxedHandler, ErasedHandler};
use crate::message::{BoxedCommand, BoxedEvent, Command, Event, Named};

struct Slot<T> {
    name: &'static str,
    value: T,
}

/// Routing table from message type to handlers.
pub struct HandlerRegistry<H> {
    events: HashMap<TypeId, Slot<Vec<H>>>,
    commands: HashMap<TypeId, Slot<H>>,
}

impl<H> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self {
            events: HashMap::new(),
            commands: HashMap::new(),
        }
    }
}

impl<H> HandlerRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the handler list for an event type. Returns the previous list.
    pub fn insert_event_handlers(
        &mut self,
        type_id: TypeId,
        name: &'static str,
        handlers: Vec<H>,
    ) -> Option<Vec<H>> {
        self.events
            .insert(
                type_id,
                Slot {
                    name,
                    value: handlers,
                },
            )
            .map(|slot| slot.value)
    }

    /// Replaces the handler for a command type. Returns the previous handler.
    pub fn insert_command_handler(
        &mut self,
        type_id: TypeId,
        name: &'static str,
        handler: H,
    ) -> Option<H> {
        self.commands
            .insert(
                type_id,
                Slot {
                    name,
                    value: handler,
                },
            )
            .map(|slot| slot.value)
    }

    /// Handlers for an event, in registration order.
    ///
    /// A registered but empty list is returned as `Ok(&[])`.
    pub fn event_handlers(&self, event: &BoxedEvent) -> Result<&[H], RegistryError> {
        self.events
            .get(&event.message_type())
            .map(|slot| slot.value.as_slice())
            .ok_or(RegistryError::EventHandlersMissing {
                event: event.event_name(),
            })
    }

    /// The handler for a command.
    pub fn command_handler(&self, command: &BoxedCommand) -> Result<&H, RegistryError> {
        self.commands
            .get(&command.message_type())
            .map(|slot| &slot.value)
            .ok_or(RegistryError::CommandHandlerMissing {
                command: command.command_name(),
            })
    }

    pub fn get_event_handlers<E: Event + Named>(&self) -> Result<&[H], RegistryError> {
        self.events
            .get(&TypeId::of::<E>())
            .map(|slot| slot.value.as_slice())
            .ok_or(RegistryError::EventHandlersMissing { event: E::NAME })
    }

    pub fn get_command_handler<C: Command + Named>(&self) -> Result<&H, RegistryError> {
        self.commands
            .get(&TypeId::of::<C>())
            .map(|slot| &slot.value)
            .ok_or(RegistryError::CommandHandlerMissing { command: C::NAME })
    }

    pub fn remove_event_handlers<E: Event>(&mut self) -> Option<Vec<H>> {
        self.events.remove(&TypeId::of::<E>()).map(|slot| slot.value)
    }

    pub fn remove_command_handler<C: Command>(&mut self) -> Option<H> {
        self.commands.remove(&TypeId::of::<C>()).map(|slot| slot.value)
    }

    /// Registered event names, sorted.
    pub fn event_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.events.values().map(|slot| slot.name).collect();
        names.sort_unstable();
        names
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.values().map(|slot| slot.name).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.commands.clear();
    }
}

impl HandlerRegistry<ErasedHandler> {
    /// Registers the handlers for event type `E`, replacing any previous list.
    pub fn set_event_handlers<E: Event + Named>(&mut self, handlers: Vec<BoxedHandler<E>>) {
        let handlers = handlers.into_iter().map(BoxedHandler::into_erased).collect();
        self.insert_event_handlers(TypeId::of::<E>(), E::NAME, handlers);
    }

    /// Registers the handler for command type `C`, replacing any previous one.
    pub fn set_command_handler<C: Command + Named>(&mut self, handler: BoxedHandler<C>) {
        self.insert_command_handler(TypeId::of::<C>(), C::NAME, handler.into_erased());
    }
}

impl HandlerRegistry<AsyncErasedHandler> {
    pub fn set_event_handlers<E: Event + Named>(&mut self, handlers: Vec<AsyncBoxedHandler<E>>) {
        let handlers = handlers
            .into_iter()
            .map(AsyncBoxedHandler::into_erased)
            .collect();
        self.insert_event_handlers(TypeId::of::<E>(), E::NAME, handlers);
    }

    pub fn set_command_handler<C: Command + Named>(&mut self, handler: AsyncBoxedHandler<C>) {
        self.insert_command_handler(TypeId::of::<C>(), C::NAME, handler.into_erased());
    }
}

impl<H> fmt::Debug for HandlerRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("events", &self.event_names())
            .field("commands", &self.command_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize, herald_macros::Event)]
    struct FolderCreated;

    #[derive(Debug, Clone, Serialize, herald_macros::Event)]
    struct FolderRemoved;

    #[derive(Debug, Clone, herald_macros::Command)]
    struct RenameFolder;

    fn named<E: 'static>(name: &str) -> BoxedHandler<E> {
        BoxedHandler::from_fn(|_: &E, _: &Context| Ok(())).named(name)
    }

    #[test]
    fn event_handlers_keep_registration_order() {
        let mut registry = HandlerRegistry::<ErasedHandler>::new();
        registry.set_event_handlers(vec![named::<FolderCreated>("a"), named("b")]);

        let handlers = registry
            .event_handlers(&BoxedEvent::new(FolderCreated))
            .unwrap();
        let names: Vec<_> = handlers.iter().map(ErasedHandler::name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn set_replaces_previous_registration() {
        let mut registry = HandlerRegistry::<ErasedHandler>::new();
        registry.set_event_handlers(vec![named::<FolderCreated>("old")]);
        registry.set_event_handlers(vec![named::<FolderCreated>("new")]);
        registry.set_command_handler(named::<RenameFolder>("first"));
        registry.set_command_handler(named::<RenameFolder>("second"));

        let events = registry.get_event_handlers::<FolderCreated>().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "new");
        assert_eq!(
            registry.get_command_handler::<RenameFolder>().unwrap().name(),
            "second"
        );
    }

    #[test]
    fn missing_registrations_are_reported_by_name() {
        let registry = HandlerRegistry::<ErasedHandler>::new();

        assert_eq!(
            registry
                .event_handlers(&BoxedEvent::new(FolderRemoved))
                .unwrap_err(),
            RegistryError::EventHandlersMissing {
                event: "FolderRemoved"
            }
        );
        assert_eq!(
            registry
                .command_handler(&BoxedCommand::new(RenameFolder))
                .unwrap_err(),
            RegistryError::CommandHandlerMissing {
                command: "RenameFolder"
            }
        );
    }

    #[test]
    fn empty_list_is_distinct_from_missing() {
        let mut registry = HandlerRegistry::<ErasedHandler>::new();
        registry.set_event_handlers::<FolderCreated>(Vec::new());

        assert!(
            registry
                .event_handlers(&BoxedEvent::new(FolderCreated))
                .unwrap()
                .is_empty()
        );
        assert_eq!(registry.event_names(), vec!["FolderCreated"]);
    }

    #[test]
    fn remove_and_clear() {
        let mut registry = HandlerRegistry::<ErasedHandler>::new();
        registry.set_event_handlers(vec![named::<FolderCreated>("a")]);
        registry.set_command_handler(named::<RenameFolder>("r"));

        assert!(registry.remove_event_handlers::<FolderCreated>().is_some());
        assert!(registry.remove_event_handlers::<FolderCreated>().is_none());
        registry.clear();
        assert!(registry.is_empty());
    }
}
