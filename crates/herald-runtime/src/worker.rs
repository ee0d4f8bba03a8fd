//! Background re-entry of events.
//!
//! Services that want an event handled out of band publish it to an
//! [`EventQueue`] as an [`EventEnvelope`]. An [`EventWorker`] drains the
//! queue, decodes each envelope with its codec and dispatches it on a fresh
//! bus, so no handler state or context leaks between envelopes.
//!
//! Only the decoded event's own handlers run in the worker. Events they emit
//! are published back to the queue and picked up by a later pass; commands
//! they emit are handled on the same bus right away.
//!
//! ```rust,ignore
//! let queue = InMemoryEventQueue::new();
//! publish_event(&queue, &BoxedEvent::new(FolderCreated { id, user_id }))?;
//!
//! let worker = EventWorker::new(config, || Arc::new(InMemoryEventLog::new()));
//! let report = worker.run_pending(&queue);
//! ```

use std::sync::Arc;

use herald_core::{
    BoxedEvent, DispatchError, Dispatched, EventCodec, EventEnvelope, Extra, Message, MessageBus,
    SyncBus,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{Level, debug, error, span};

use crate::config::HeraldConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::event_log::EventLogStore;
use crate::factory::{default_codec, make_message_bus};

// =============================================================================
// Queue
// =============================================================================

/// Outbound side of the worker boundary.
pub trait EventQueue: Send + Sync {
    fn publish(&self, envelope: EventEnvelope) -> RuntimeResult<()>;

    /// Takes every envelope published so far, oldest first.
    fn drain(&self) -> Vec<EventEnvelope>;
}

/// Queue backed by an unbounded in-process channel.
#[derive(Debug)]
pub struct InMemoryEventQueue {
    sender: UnboundedSender<EventEnvelope>,
    receiver: Mutex<UnboundedReceiver<EventEnvelope>>,
}

impl InMemoryEventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// A handle that publishes into this queue from other threads or tasks.
    pub fn sender(&self) -> UnboundedSender<EventEnvelope> {
        self.sender.clone()
    }
}

impl Default for InMemoryEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue for InMemoryEventQueue {
    fn publish(&self, envelope: EventEnvelope) -> RuntimeResult<()> {
        self.sender
            .send(envelope)
            .map_err(|e| RuntimeError::Queue(format!("event queue closed: {}", e.0.event_name)))
    }

    fn drain(&self) -> Vec<EventEnvelope> {
        let mut receiver = self.receiver.lock();
        let mut envelopes = Vec::new();
        while let Ok(envelope) = receiver.try_recv() {
            envelopes.push(envelope);
        }
        envelopes
    }
}

/// Serializes `event` and publishes it to `queue`.
pub fn publish_event(queue: &dyn EventQueue, event: &BoxedEvent) -> RuntimeResult<()> {
    let envelope = EventEnvelope::from_event(event)?;
    debug!(event = %envelope.event_name, "Publishing event");
    queue.publish(envelope)
}

// =============================================================================
// Worker
// =============================================================================

type BusFactory = dyn Fn() -> SyncBus + Send + Sync;

/// Outcome of one [`EventWorker::run_pending`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub processed: usize,
    pub failed: usize,
}

/// Decodes queued envelopes and dispatches them.
pub struct EventWorker {
    codec: EventCodec,
    bus_factory: Box<BusFactory>,
}

impl EventWorker {
    /// Creates a worker using [`default_codec`] and the default handler
    /// table. `store_factory` opens a store for each envelope.
    pub fn new<F>(config: HeraldConfig, store_factory: F) -> Self
    where
        F: Fn() -> Arc<dyn EventLogStore> + Send + Sync + 'static,
    {
        Self::with_bus_factory(move || make_message_bus(&config, store_factory()))
    }

    /// Creates a worker that builds each envelope's bus with `bus_factory`.
    pub fn with_bus_factory<F>(bus_factory: F) -> Self
    where
        F: Fn() -> SyncBus + Send + Sync + 'static,
    {
        Self {
            codec: default_codec(),
            bus_factory: Box::new(bus_factory),
        }
    }

    /// Replaces the codec.
    pub fn with_codec(mut self, codec: EventCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn codec(&self) -> &EventCodec {
        &self.codec
    }

    /// Decodes one envelope and runs its handlers on a fresh bus.
    ///
    /// Emitted events are published to `queue`; emitted commands are
    /// handled before this returns and their results are included.
    pub fn process(
        &self,
        envelope: &EventEnvelope,
        queue: &dyn EventQueue,
    ) -> RuntimeResult<Vec<Dispatched>> {
        let span = span!(Level::DEBUG, "process", event = %envelope.event_name);
        let _enter = span.enter();

        let event = self.codec.decode(envelope).map_err(|err| {
            error!(event = %envelope.event_name, error = %err, "Failed to decode envelope");
            DispatchError::from(err)
        })?;

        let bus = (self.bus_factory)();
        let step = bus.handle_step(Message::from(event), &Extra::new())?;

        let mut results = step.results;
        for message in step.emitted {
            match message {
                Message::Event(event) => publish_event(queue, &event)?,
                command @ Message::Command(_) => results.extend(bus.handle(command)?),
            }
        }
        Ok(results)
    }

    /// Processes everything currently in `queue`.
    ///
    /// A failing envelope is logged and counted; the rest are still processed.
    /// Events published back while processing wait for the next pass.
    pub fn run_pending(&self, queue: &dyn EventQueue) -> WorkerReport {
        let mut report = WorkerReport::default();
        for envelope in queue.drain() {
            match self.process(&envelope, queue) {
                Ok(_) => report.processed += 1,
                Err(err) => {
                    error!(event = %envelope.event_name, error = %err, "Envelope dropped");
                    report.failed += 1;
                }
            }
        }
        debug!(processed = report.processed, failed = report.failed, "Worker pass finished");
        report
    }
}
