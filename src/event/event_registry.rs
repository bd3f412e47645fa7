use serde::{Deserialize, Serialize};

/// Closed set of event kinds routed through the [`EventHandler`](super::EventHandler).
///
/// The string form is snake_case (`"music_request_added"`), which is also the
/// serialized form used when events are exported.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    // Platform
    Connect,
    Disconnect,
    #[default]
    Comment,
    Gift,
    Follow,
    Share,
    Like,
    Join,
    // Bot lifecycle and pipeline
    BotStart,
    BotStop,
    Command,
    AutoResponse,
    SpamDetected,
    // Subsystems
    TtsStart,
    TtsEnd,
    OverlayUpdate,
    MusicRequestAdded,
    MusicSongStarted,
}

impl EventType {
    /// Events delivered by the live platform client.
    pub fn is_platform(&self) -> bool {
        matches!(
            self,
            EventType::Connect
                | EventType::Disconnect
                | EventType::Comment
                | EventType::Gift
                | EventType::Follow
                | EventType::Share
                | EventType::Like
                | EventType::Join
        )
    }
}
