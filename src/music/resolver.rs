use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::{
    track::{Platform, TrackInfo},
    MusicResult,
};

lazy_static! {
    static ref URL_PATTERN: Regex =
        Regex::new(r"(?i)https?://|spotify\.com|youtu\.be|youtube\.com").unwrap();
    static ref SPOTIFY_TRACK: Regex =
        Regex::new(r"(?:spotify:track:|spotify\.com/track/)([a-zA-Z0-9]{22})").unwrap();
    static ref YOUTUBE_VIDEO: Regex =
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/)([a-zA-Z0-9_-]{11})")
            .unwrap();
}

/// True when a request looks like a link rather than a search query.
pub fn is_url(text: &str) -> bool {
    URL_PATTERN.is_match(text)
}

/// Extracts the platform's track or video id from a link.
pub fn track_id(platform: Platform, url: &str) -> Option<String> {
    let pattern = match platform {
        Platform::Spotify => &*SPOTIFY_TRACK,
        Platform::Youtube => &*YOUTUBE_VIDEO,
    };
    pattern
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// A source of track metadata on one platform.
#[mockall::automock]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether `url` points at this resolver's platform.
    fn handles_url(&self, url: &str) -> bool {
        track_id(self.platform(), url).is_some()
    }

    async fn search(&self, query: &str, limit: usize) -> MusicResult<Vec<TrackInfo>>;

    async fn resolve_url(&self, url: &str) -> MusicResult<Option<TrackInfo>>;
}

/// Resolves requests against a fixed list of known tracks.
#[derive(Debug, Clone)]
pub struct CatalogResolver {
    platform: Platform,
    tracks: Vec<TrackInfo>,
}

impl CatalogResolver {
    /// Keeps the catalog entries that belong to `platform`.
    pub fn new(platform: Platform, catalog: &[TrackInfo]) -> Self {
        Self {
            platform,
            tracks: catalog
                .iter()
                .filter(|t| t.platform == platform)
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[async_trait]
impl TrackResolver for CatalogResolver {
    fn platform(&self) -> Platform {
        self.platform
    }

    /// Every query word must appear in `"title artist"`.
    async fn search(&self, query: &str, limit: usize) -> MusicResult<Vec<TrackInfo>> {
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let found: Vec<TrackInfo> = self
            .tracks
            .iter()
            .filter(|track| {
                let haystack = format!("{} {}", track.title, track.artist).to_lowercase();
                words.iter().all(|w| haystack.contains(w.as_str()))
            })
            .take(limit)
            .cloned()
            .collect();
        debug!(target: "music", platform = %self.platform, query, hits = found.len(), "Catalog search");
        Ok(found)
    }

    async fn resolve_url(&self, url: &str) -> MusicResult<Option<TrackInfo>> {
        let wanted = track_id(self.platform, url);
        Ok(self
            .tracks
            .iter()
            .find(|track| match (track.url.as_deref(), wanted.as_deref()) {
                (Some(known), Some(id)) => track_id(self.platform, known).as_deref() == Some(id),
                (Some(known), None) => known == url,
                (None, _) => false,
            })
            .cloned())
    }
}
