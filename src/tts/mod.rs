//! Text-to-speech subsystem: pluggable voice backends behind [`TtsEngine`] and
//! the [`TtsManager`] queue in front of them.

pub mod engine;
pub mod manager;

use thiserror::Error;

pub use engine::{create_engine, CommandEngine, ConsoleEngine, TtsEngine};
pub use manager::{TtsAdmission, TtsManager, TtsStats};

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("TTS engine {engine} unavailable: {message}")]
    EngineUnavailable { engine: String, message: String },
}

pub type TtsResult<T> = Result<T, TtsError>;
