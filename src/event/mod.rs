//! # Event-Driven Core
//!
//! Every reaction of the bot is wired through a single [`EventHandler`] owned by
//! the [`TikBot`](crate::bot::TikBot). Subsystems never call each other; they
//! subscribe to event types and emit their own events back into the hub.
//!
//! ```text
//! ┌────────────┐  notification  ┌──────────┐  emit   ┌──────────────┐
//! │  Platform  │───────────────▶│  TikBot  │────────▶│ EventHandler │
//! └────────────┘                └──────────┘         └──────┬───────┘
//!                                                           │ fan-out
//!                     ┌──────────┬──────────┬───────────┬───▼──────┐
//!                     │   TTS    │  Audio   │   Music   │  AI ...  │
//!                     └──────────┴──────────┴───────────┴──────────┘
//! ```
//!
//! - [`event_registry`]: the closed [`EventType`] set
//! - [`event_handler`]: [`Event`], [`Value`] and the hub itself

pub mod event_handler;
pub mod event_registry;

pub use event_handler::{
    EmitSummary, Event, EventError, EventHandler, EventReceiver, EventResult, HandlerError,
    HandlerId, HandlerResult, Value, DEFAULT_HISTORY_CAPACITY, DEFAULT_HISTORY_LIMIT,
};
pub use event_registry::EventType;
