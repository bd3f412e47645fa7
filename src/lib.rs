//! # TikBot: livestream chat bot core
//!
//! TikBot reacts to live-platform notifications (comments, gifts, follows...)
//! by fanning them out to independent subsystems over an in-process event hub.
//!
//! ## Layers
//!
//! - Event core: [`event`] (the [`EventHandler`](event::EventHandler) hub and
//!   the closed [`EventType`](event::EventType) set)
//! - Work queues: [`queue`] (admission control, priority/FIFO storage and the
//!   single-consumer drain loop shared by TTS, audio and music)
//! - Orchestration: [`bot`] (spam filter, commands, auto-responses, TTS
//!   submission, reconnect policy) and [`platform`] (the client boundary)
//! - Subsystems: [`tts`], [`audio`], [`music`], [`ai`], [`overlay`],
//!   [`analytics`]
//!
//! ## Pipeline
//!
//! ```text
//! Platform ─▶ TikBot ─▶ EventHandler::emit ─┬─▶ reaction pipeline ─▶ COMMAND / AUTO_RESPONSE / SPAM_DETECTED
//!                                           ├─▶ AudioManager ─▶ RequestQueue ─▶ AudioPlayer
//!                                           ├─▶ MusicManager ─▶ RequestQueue ─▶ MusicPlayer
//!                                           ├─▶ AiManager / OverlayManager / AnalyticsCollector
//!                                           └─▶ ...
//! ```

pub mod ai;
pub mod analytics;
pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod event;
pub mod music;
pub mod overlay;
pub mod platform;
pub mod queue;
pub mod tts;

pub use bot::{BotStats, TikBot};
pub use config::BotConfig;
pub use error::{TikBotError, TikBotResult};
pub use event::{Event, EventHandler, EventType, Value};
