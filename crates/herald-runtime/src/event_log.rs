//! Audit log of domain events.
//!
//! [`EventsLogger`] is a stateful handler that writes one [`EventLog`] row per
//! event it receives. It does not own its store: the before hook takes the
//! store from the bus context under [`EVENT_LOG_KEY`], the core logic adds a
//! row and commits, and the after hook closes the store and lets go of it.
//!
//! Fields named in the redaction list (`password` and `token` by default) are
//! masked before the event is stored.
//!
//! The acting user and the affected object come from the event's `user_id`
//! and `id` fields unless the caller passes them in the call's [`Extra`]
//! under [`USER_ID_KEY`] and [`OBJECT_ID_KEY`]. A value under [`META_KEY`]
//! becomes the row's `info`.
//!
//! ```rust,ignore
//! let store = Arc::new(InMemoryEventLog::new());
//! let bus = SyncBus::builder()
//!     .event_handlers(vec![BoxedHandler::stateful(EventsLogger::new(["password", "token"]))])
//!     .build();
//! bus.context().insert::<dyn EventLogStore>(EVENT_LOG_KEY, store.clone());
//!
//! bus.handle_with(Message::event(folder_removed), Extra::new().with(META_KEY, "bulk delete"))?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::{
    AsyncHandler, CodecError, Context, Event, Extra, Handler, HandlerError, HandlerResult, Outbox,
    redact,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Context key under which the bus exposes the audit log store.
pub const EVENT_LOG_KEY: &str = "event_log";

/// [`Extra`] key overriding the acting user.
pub const USER_ID_KEY: &str = "user_id";

/// [`Extra`] key overriding the affected object.
pub const OBJECT_ID_KEY: &str = "object_id";

/// [`Extra`] key whose value is stored as the row's `info`.
pub const META_KEY: &str = "meta";

// =============================================================================
// EventLog
// =============================================================================

/// One audit log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub id: Uuid,
    /// The acting user.
    pub user_id: Option<String>,
    /// The affected object.
    pub object_id: Option<String>,
    pub event_type: String,
    /// The event payload with sensitive fields masked.
    pub event: Value,
    /// Caller-supplied metadata.
    pub info: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}

impl EventLog {
    /// Builds a row from an event, masking `redacted_fields` in the stored
    /// payload. The user and object ids come from the payload's `user_id`
    /// and `id` fields.
    pub fn record<E, S>(event: &E, redacted_fields: &[S]) -> Result<Self, CodecError>
    where
        E: Event + ?Sized,
        S: AsRef<str>,
    {
        let mut payload = event.to_payload().map_err(|err| CodecError::Serialize {
            event: event.event_name().to_string(),
            reason: err.to_string(),
        })?;
        redact(&mut payload, redacted_fields);

        Ok(Self {
            id: Uuid::new_v4(),
            user_id: string_field(&payload, USER_ID_KEY),
            object_id: string_field(&payload, "id"),
            event_type: event.event_name().to_string(),
            event: payload,
            info: None,
            recorded_at: Utc::now(),
        })
    }

    pub fn with_info(mut self, info: impl Into<Value>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Applies the caller's overrides. Keys missing from `extra` leave the
    /// row as it is.
    pub fn with_extra(mut self, extra: &Extra) -> Self {
        if let Some(user_id) = extra.get_string(USER_ID_KEY) {
            self.user_id = Some(user_id);
        }
        if let Some(object_id) = extra.get_string(OBJECT_ID_KEY) {
            self.object_id = Some(object_id);
        }
        if let Some(meta) = extra.get(META_KEY) {
            self.info = Some(meta.clone());
        }
        self
    }
}

fn string_field(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

// =============================================================================
// Stores
// =============================================================================

/// Unit-of-work style sink for audit log rows.
pub trait EventLogStore: Send + Sync {
    /// Stages a row.
    fn add(&self, row: EventLog) -> HandlerResult<()>;

    /// Makes every staged row durable.
    fn commit(&self) -> HandlerResult<()>;

    /// Ends the unit of work. Uncommitted rows are discarded.
    fn close(&self);
}

/// Async counterpart of [`EventLogStore`].
#[async_trait]
pub trait AsyncEventLogStore: Send + Sync {
    async fn add(&self, row: EventLog) -> HandlerResult<()>;

    async fn commit(&self) -> HandlerResult<()>;

    async fn close(&self);
}

#[derive(Debug, Default)]
struct MemoryState {
    staged: Vec<EventLog>,
    committed: Vec<EventLog>,
    closes: usize,
}

/// Store that keeps rows in memory. Serves both the sync and async loggers.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    state: Mutex<MemoryState>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows, oldest first.
    pub fn rows(&self) -> Vec<EventLog> {
        self.state.lock().committed.clone()
    }

    /// Number of times the store was closed.
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}

impl EventLogStore for InMemoryEventLog {
    fn add(&self, row: EventLog) -> HandlerResult<()> {
        self.state.lock().staged.push(row);
        Ok(())
    }

    fn commit(&self) -> HandlerResult<()> {
        let mut state = self.state.lock();
        let staged = std::mem::take(&mut state.staged);
        state.committed.extend(staged);
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.staged.clear();
        state.closes += 1;
    }
}

#[async_trait]
impl AsyncEventLogStore for InMemoryEventLog {
    async fn add(&self, row: EventLog) -> HandlerResult<()> {
        EventLogStore::add(self, row)
    }

    async fn commit(&self) -> HandlerResult<()> {
        EventLogStore::commit(self)
    }

    async fn close(&self) {
        EventLogStore::close(self)
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn store_not_acquired() -> HandlerError {
    HandlerError::failed("event log store was not acquired")
}

/// Writes every event it handles to the audit log.
///
/// Registered per event type; the same logger type serves any [`Event`].
pub struct EventsLogger {
    redacted_fields: Vec<String>,
    store: Option<Arc<dyn EventLogStore>>,
}

impl EventsLogger {
    pub fn new<I, S>(redacted_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            redacted_fields: redacted_fields.into_iter().map(Into::into).collect(),
            store: None,
        }
    }

    fn write<E: Event>(&self, event: &E, extra: &Extra) -> HandlerResult<Uuid> {
        let store = self.store.as_ref().ok_or_else(store_not_acquired)?;

        let row = EventLog::record(event, &self.redacted_fields)?.with_extra(extra);
        let id = row.id;
        debug!(event = event.event_name(), row = %id, "Recording event");

        store.add(row)?;
        store.commit()?;
        Ok(id)
    }
}

impl<E: Event> Handler<E> for EventsLogger {
    /// Id of the written row.
    type Output = Uuid;

    fn before_handle(&mut self, ctx: &Context) -> HandlerResult<()> {
        self.store = Some(ctx.require::<dyn EventLogStore>(EVENT_LOG_KEY)?);
        Ok(())
    }

    fn handle(&mut self, event: &E, _ctx: &Context, _outbox: &mut Outbox) -> HandlerResult<Uuid> {
        self.write(event, &Extra::new())
    }

    fn handle_with(
        &mut self,
        event: &E,
        _ctx: &Context,
        extra: &Extra,
        _outbox: &mut Outbox,
    ) -> HandlerResult<Uuid> {
        self.write(event, extra)
    }

    fn after_handle(&mut self, _ctx: &Context) {
        if let Some(store) = self.store.take() {
            store.close();
        }
    }
}

/// Async mirror of [`EventsLogger`] over an [`AsyncEventLogStore`].
pub struct AsyncEventsLogger {
    redacted_fields: Vec<String>,
    store: Option<Arc<dyn AsyncEventLogStore>>,
}

impl AsyncEventsLogger {
    pub fn new<I, S>(redacted_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            redacted_fields: redacted_fields.into_iter().map(Into::into).collect(),
            store: None,
        }
    }

    async fn write<E: Event>(&self, event: &E, extra: &Extra) -> HandlerResult<Uuid> {
        let store = self.store.clone().ok_or_else(store_not_acquired)?;

        let row = EventLog::record(event, &self.redacted_fields)?.with_extra(extra);
        let id = row.id;
        debug!(event = event.event_name(), row = %id, "Recording event");

        store.add(row).await?;
        store.commit().await?;
        Ok(id)
    }
}

#[async_trait]
impl<E: Event> AsyncHandler<E> for AsyncEventsLogger {
    type Output = Uuid;

    async fn before_handle(&mut self, ctx: &Context) -> HandlerResult<()> {
        self.store = Some(ctx.require::<dyn AsyncEventLogStore>(EVENT_LOG_KEY)?);
        Ok(())
    }

    async fn handle(
        &mut self,
        event: &E,
        _ctx: &Context,
        _outbox: &mut Outbox,
    ) -> HandlerResult<Uuid> {
        self.write(event, &Extra::new()).await
    }

    async fn handle_with(
        &mut self,
        event: &E,
        _ctx: &Context,
        extra: &Extra,
        _outbox: &mut Outbox,
    ) -> HandlerResult<Uuid> {
        self.write(event, extra).await
    }

    async fn after_handle(&mut self, _ctx: &Context) {
        if let Some(store) = self.store.take() {
            store.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FolderCreated, PasswordChangeRequestCreated, UserCreated};
    use herald_core::{
        AsyncBoxedHandler, AsyncBus, AsyncMessageBus, BoxedHandler, Message, MessageBus, REDACTED,
        SyncBus,
    };
    use serde_json::json;

    fn reset_request() -> PasswordChangeRequestCreated {
        PasswordChangeRequestCreated {
            user_id: "u1".into(),
            token_id: "t1".into(),
            token: "secret".into(),
            email: "user@example.com".into(),
        }
    }

    #[test]
    fn record_masks_listed_fields_and_extracts_ids() {
        let row = EventLog::record(&reset_request(), &["password", "token"]).unwrap();

        assert_eq!(row.event_type, "PasswordChangeRequestCreated");
        assert_eq!(row.event["token"], REDACTED);
        assert_eq!(row.event["token_id"], "t1");
        assert_eq!(row.user_id.as_deref(), Some("u1"));
        assert_eq!(row.object_id, None);
    }

    #[test]
    fn record_uses_event_id_as_object() {
        let row = EventLog::record(&UserCreated { id: "u9".into() }, &["password"])
            .unwrap()
            .with_info("signup");
        assert_eq!(row.object_id.as_deref(), Some("u9"));
        assert_eq!(row.user_id, None);
        assert_eq!(row.info, Some(Value::from("signup")));
    }

    #[test]
    fn extra_overrides_payload_ids_and_sets_info() {
        let event = FolderCreated {
            id: "f1".into(),
            user_id: "u1".into(),
        };
        let row = EventLog::record(&event, &["token"])
            .unwrap()
            .with_extra(
                &Extra::new()
                    .with(USER_ID_KEY, "admin")
                    .with(OBJECT_ID_KEY, "folder-tree")
                    .with(META_KEY, json!({ "reason": "cleanup" })),
            );

        assert_eq!(row.user_id.as_deref(), Some("admin"));
        assert_eq!(row.object_id.as_deref(), Some("folder-tree"));
        assert_eq!(row.info, Some(json!({ "reason": "cleanup" })));

        let untouched = EventLog::record(&event, &["token"])
            .unwrap()
            .with_extra(&Extra::new().with(OBJECT_ID_KEY, Value::Null));
        assert_eq!(untouched.user_id.as_deref(), Some("u1"));
        assert_eq!(untouched.object_id.as_deref(), Some("f1"));
        assert_eq!(untouched.info, None);
    }

    #[test]
    fn close_discards_uncommitted_rows() {
        let store = InMemoryEventLog::new();
        let row = EventLog::record(&UserCreated { id: "u1".into() }, &["token"]).unwrap();
        EventLogStore::add(&store, row).unwrap();
        EventLogStore::close(&store);
        EventLogStore::commit(&store).unwrap();
        assert!(store.rows().is_empty());
        assert_eq!(store.close_count(), 1);
    }

    #[test]
    fn logger_writes_commits_and_closes() {
        let store = Arc::new(InMemoryEventLog::new());
        let mut bus = SyncBus::new();
        bus.set_event_handlers(vec![BoxedHandler::<PasswordChangeRequestCreated>::stateful(
            EventsLogger::new(["password", "token"]),
        )]);
        bus.context()
            .insert::<dyn EventLogStore>(EVENT_LOG_KEY, store.clone());

        let dispatched = bus.handle(Message::event(reset_request())).unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event["token"], REDACTED);
        assert_eq!(dispatched[0].output::<Uuid>(), Some(&rows[0].id));
        assert_eq!(store.close_count(), 1);
    }

    #[test]
    fn logger_prefers_call_extra_over_payload() {
        let store = Arc::new(InMemoryEventLog::new());
        let mut bus = SyncBus::new();
        bus.set_event_handlers(vec![BoxedHandler::<FolderCreated>::stateful(
            EventsLogger::new(["token"]),
        )]);
        bus.context()
            .insert::<dyn EventLogStore>(EVENT_LOG_KEY, store.clone());

        bus.handle_with(
            Message::event(FolderCreated {
                id: "f1".into(),
                user_id: "u1".into(),
            }),
            Extra::new().with(USER_ID_KEY, "admin").with(META_KEY, "import"),
        )
        .unwrap();

        let rows = store.rows();
        assert_eq!(rows[0].user_id.as_deref(), Some("admin"));
        assert_eq!(rows[0].object_id.as_deref(), Some("f1"));
        assert_eq!(rows[0].info, Some(Value::from("import")));
    }

    #[test]
    fn logger_without_store_fails_in_isolation() {
        let mut bus = SyncBus::new();
        bus.set_event_handlers(vec![BoxedHandler::<FolderCreated>::stateful(
            EventsLogger::new(["token"]),
        )]);

        let dispatched = bus
            .handle(Message::event(FolderCreated {
                id: "f1".into(),
                user_id: "u1".into(),
            }))
            .unwrap();
        assert!(dispatched.is_empty());
    }

    #[tokio::test]
    async fn async_logger_writes_and_closes() {
        let store = Arc::new(InMemoryEventLog::new());
        let mut bus = AsyncBus::new();
        bus.set_event_handlers(vec![AsyncBoxedHandler::<FolderCreated>::stateful(
            AsyncEventsLogger::new(["token"]),
        )]);
        bus.context()
            .insert::<dyn AsyncEventLogStore>(EVENT_LOG_KEY, store.clone());

        bus.handle(Message::event(FolderCreated {
            id: "f1".into(),
            user_id: "u1".into(),
        }))
        .await
        .unwrap();
        bus.handle_with(
            Message::event(FolderCreated {
                id: "f2".into(),
                user_id: "u1".into(),
            }),
            Extra::new().with(OBJECT_ID_KEY, "root").with(META_KEY, 7),
        )
        .await
        .unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].object_id.as_deref(), Some("f1"));
        assert_eq!(rows[0].user_id.as_deref(), Some("u1"));
        assert_eq!(rows[1].object_id.as_deref(), Some("root"));
        assert_eq!(rows[1].info, Some(Value::from(7)));
        assert_eq!(store.close_count(), 2);
    }
}
