//! Sound alerts: the alert table with cooldowns ([`alerts`]), output backends
//! ([`player`]) and the event-driven [`AudioManager`].

pub mod alerts;
pub mod manager;
pub mod player;

use thiserror::Error;

pub use alerts::{AlertConditions, AlertType, SoundAlert, SoundAlerts};
pub use manager::{AudioManager, AudioStats};
pub use player::{create_player, AudioPlayer, CommandPlayer, SilentPlayer};

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio player {player} unavailable: {message}")]
    PlayerUnavailable { player: String, message: String },
    #[error("Sound directory error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
