//! # Event Handler Implementation
//!
//! The [`EventHandler`] is the in-process publish/subscribe hub of the bot. Every
//! subsystem registers its reactions here, and every platform notification is
//! relayed through it.
//!
//! ## Delivery Contract
//!
//! - **Concurrent fan-out**: all handlers registered for an event type run
//!   concurrently, each on its own task. Execution order across handlers is
//!   unspecified.
//! - **Fault isolation**: a handler returning an error (or panicking) is logged
//!   and counted, never propagated. Sibling handlers always run to completion.
//! - **Barrier per event**: [`EventHandler::emit`] returns once every handler for
//!   that event has finished.
//! - **Bounded history**: every emitted event is appended to a rolling history
//!   (capacity [`DEFAULT_HISTORY_CAPACITY`]) in emission order; the oldest entry
//!   is evicted first.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use tikbot::event::{Event, EventHandler, EventType};
//! # async fn example() {
//! let hub = EventHandler::new();
//! hub.subscribe(EventType::Gift, "thanks", |event| async move {
//!     println!("gift from {:?}", event.get_str("username"));
//!     Ok(())
//! });
//!
//! hub.emit(Event::gift("alice", "Alice", "Rose", 3, 5655)).await;
//! # }
//! ```

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, trace};

use super::event_registry::EventType;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
const OBSERVER_CAPACITY: usize = 1024;

/// Payload value carried in an [`Event`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::String(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value.into_iter().map(Value::String).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// # Event
///
/// An immutable record of something that happened: a type tag, a payload of
/// key/value pairs and the time it was created.
///
/// Events are built with [`Event::new`] and the [`Event::with`] builder before
/// emission; once handed to [`EventHandler::emit`] they are shared behind an
/// `Arc` and never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    event_type: EventType,
    data: HashMap<String, Value>,
    timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            data: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Builds an event from raw parts. A missing timestamp is set to now.
    pub fn from_parts(
        event_type: EventType,
        data: HashMap<String, Value>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            event_type,
            data,
            timestamp: timestamp.unwrap_or_else(Utc::now),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn comment(username: &str, nickname: &str, comment: &str, user_id: &str) -> Self {
        Event::new(EventType::Comment)
            .with("username", username)
            .with("nickname", nickname)
            .with("comment", comment)
            .with("user_id", user_id)
    }

    pub fn gift(username: &str, nickname: &str, gift_name: &str, gift_count: i64, gift_id: i64) -> Self {
        Event::new(EventType::Gift)
            .with("username", username)
            .with("nickname", nickname)
            .with("gift_name", gift_name)
            .with("gift_count", gift_count)
            .with("gift_id", gift_id)
    }

    pub fn follow(username: &str, nickname: &str, user_id: &str) -> Self {
        Event::new(EventType::Follow)
            .with("username", username)
            .with("nickname", nickname)
            .with("user_id", user_id)
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    pub fn get_list(&self, key: &str) -> Option<&[Value]> {
        match self.data.get(key) {
            Some(Value::List(items)) => Some(items),
            _ => None,
        }
    }

    /// Display name of the user the event is about: nickname, then username.
    pub fn display_name(&self) -> &str {
        self.get_str("nickname")
            .filter(|n| !n.is_empty())
            .or_else(|| self.get_str("username"))
            .unwrap_or("")
    }
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),
    #[error("Missing event field: {0}")]
    MissingField(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Observer lagged behind, {count} events skipped")]
    Lagged { count: u64 },
    #[error("Event receive failed: {message}")]
    ReceiveFailed { message: String },
}

pub type EventResult<T> = Result<T, EventError>;

type HandlerFn = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Identifies one registration, returned by [`EventHandler::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Clone)]
struct Subscription {
    id: HandlerId,
    name: String,
    handler: HandlerFn,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Outcome of one [`EventHandler::emit`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitSummary {
    pub handlers: usize,
    pub failed: usize,
}

/// # EventHandler
///
/// Registry of per-type handlers plus the bounded event history.
///
/// The registry is a [`DashMap`] so registration is synchronous and can happen
/// from any thread at initialization time. The history sits behind an async
/// mutex and is appended exactly once per emitted event.
pub struct EventHandler {
    handlers: DashMap<EventType, Vec<Subscription>>,
    history: Mutex<VecDeque<Arc<Event>>>,
    history_capacity: usize,
    next_id: AtomicU64,
    observer: broadcast::Sender<Arc<Event>>,
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("event_types", &self.handlers.len())
            .field("history_capacity", &self.history_capacity)
            .finish()
    }
}

impl EventHandler {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        let (observer, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            handlers: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(history_capacity.min(4096))),
            history_capacity: history_capacity.max(1),
            next_id: AtomicU64::new(1),
            observer,
        }
    }

    /// Registers `handler` for `event_type`.
    ///
    /// Registering the same callable twice is allowed; both registrations fire.
    /// The returned [`HandlerId`] is the key for [`EventHandler::unsubscribe`].
    pub fn subscribe<F, Fut>(&self, event_type: EventType, name: &str, handler: F) -> HandlerId
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: HandlerFn = Arc::new(move |event| handler(event).boxed());
        self.handlers.entry(event_type).or_default().push(Subscription {
            id,
            name: name.to_string(),
            handler,
        });
        debug!(target: "event_handler", event_type = %event_type, handler = name, "Handler subscribed");
        id
    }

    /// Registers a synchronous handler. It runs on the blocking pool so a slow
    /// callback cannot stall the runtime.
    pub fn subscribe_blocking<F>(&self, event_type: EventType, name: &str, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.subscribe(event_type, name, move |event| {
            let handler = handler.clone();
            async move {
                match tokio::task::spawn_blocking(move || handler(&event)).await {
                    Ok(result) => result,
                    Err(e) => Err(HandlerError::failed(format!("blocking handler aborted: {}", e))),
                }
            }
        })
    }

    /// Removes one registration. Unknown ids are ignored.
    pub fn unsubscribe(&self, event_type: EventType, id: HandlerId) -> bool {
        let Some(mut subscriptions) = self.handlers.get_mut(&event_type) else {
            return false;
        };
        match subscriptions.iter().position(|s| s.id == id) {
            Some(index) => {
                let removed = subscriptions.remove(index);
                debug!(target: "event_handler", event_type = %event_type, handler = %removed.name, "Handler unsubscribed");
                true
            }
            None => false,
        }
    }

    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.handlers.get(&event_type).map(|s| s.len()).unwrap_or(0)
    }

    /// Records `event` in the history and runs every handler registered for its
    /// type concurrently, waiting for all of them.
    ///
    /// Handler errors and panics are logged with the handler name and counted
    /// in the returned [`EmitSummary`]; they never reach the caller.
    pub async fn emit(&self, event: Event) -> EmitSummary {
        let event = Arc::new(event);
        trace!(target: "event_handler", event_type = %event.event_type(), "Emitting event");
        self.record(event.clone()).await;
        // No observers is the normal case.
        let _ = self.observer.send(event.clone());

        let subscriptions = self
            .handlers
            .get(&event.event_type())
            .map(|s| s.value().clone())
            .unwrap_or_default();
        if subscriptions.is_empty() {
            return EmitSummary::default();
        }

        let tasks = subscriptions.iter().map(|subscription| {
            let handler = subscription.handler.clone();
            let event = event.clone();
            tokio::spawn(async move { handler(event).await })
        });
        let results = join_all(tasks).await;

        let mut summary = EmitSummary {
            handlers: subscriptions.len(),
            failed: 0,
        };
        for (subscription, result) in subscriptions.iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    summary.failed += 1;
                    error!(
                        target: "event_handler",
                        event_type = %event.event_type(),
                        handler = %subscription.name,
                        "Handler failed: {}", e
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        target: "event_handler",
                        event_type = %event.event_type(),
                        handler = %subscription.name,
                        "Handler panicked: {}", e
                    );
                }
            }
        }
        summary
    }

    /// Builds an event from `fields` and emits it.
    pub async fn emit_simple<I, K, V>(&self, event_type: EventType, fields: I) -> EmitSummary
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let data = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<HashMap<String, Value>>();
        self.emit(Event::from_parts(event_type, data, None)).await
    }

    /// Returns the most recent `limit` events, optionally filtered by type,
    /// oldest first.
    pub async fn history(&self, event_type: Option<EventType>, limit: usize) -> Vec<Arc<Event>> {
        let history = self.history.lock().await;
        let mut recent: Vec<Arc<Event>> = history
            .iter()
            .rev()
            .filter(|e| event_type.map_or(true, |t| e.event_type() == t))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    /// Tap receiving every emitted event, for outer layers that want a stream
    /// rather than a per-type callback.
    pub fn observe(&self) -> EventReceiver {
        EventReceiver::new(self.observer.subscribe())
    }

    async fn record(&self, event: Arc<Event>) {
        let mut history = self.history.lock().await;
        while history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(event);
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<Event>>,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<Arc<Event>>) -> Self {
        Self { receiver }
    }

    /// Receives the next event. On lag the receiver resubscribes at the tail
    /// and reports how many events were skipped.
    pub async fn recv(&mut self) -> EventResult<Arc<Event>> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(count)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count })
            }
            Err(e) => Err(EventError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }
}
