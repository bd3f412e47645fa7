use thiserror::Error;

use crate::ai::AiError;
use crate::analytics::AnalyticsError;
use crate::audio::AudioError;
use crate::config::ConfigError;
use crate::event::{EventError, HandlerError};
use crate::music::MusicError;
use crate::platform::PlatformError;
use crate::queue::QueueError;
use crate::tts::TtsError;

#[derive(Error, Debug)]
pub enum TikBotError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("TTS error: {0}")]
    Tts(#[from] TtsError),
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("Music error: {0}")]
    Music(#[from] MusicError),
    #[error("AI error: {0}")]
    Ai(#[from] AiError),
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
    #[error("Bot is already running")]
    AlreadyRunning,
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type TikBotResult<T> = Result<T, TikBotError>;

impl TikBotError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        TikBotError::Internal(message.into())
    }
}

impl From<TikBotError> for HandlerError {
    fn from(error: TikBotError) -> Self {
        HandlerError::Failed(error.to_string())
    }
}
