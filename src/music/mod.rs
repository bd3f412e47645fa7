//! Song requests: track lookup ([`resolver`]), queue admission and playback
//! ([`manager`]).

pub mod manager;
pub mod resolver;
pub mod track;

use thiserror::Error;

pub use manager::{HoldPlayer, MusicAdmission, MusicManager, MusicPlayer, MusicStats};
pub use resolver::{is_url, CatalogResolver, TrackResolver};
pub use track::{Platform, SongRequest, TrackInfo};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusicError {
    #[error("{platform} lookup failed: {message}")]
    Lookup { platform: Platform, message: String },
}

pub type MusicResult<T> = Result<T, MusicError>;
