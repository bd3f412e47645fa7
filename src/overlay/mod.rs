//! Stream overlay state: recent chat, goals and the current song, published
//! as [`OverlayMessage`]s on a broadcast feed that a rendering layer can
//! subscribe to.

pub mod manager;

pub use manager::{
    ChatLine, Goal, NowPlaying, OverlayManager, OverlayMessage, OverlaySnapshot, OverlayStats,
};
