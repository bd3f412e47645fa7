use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_secs;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Spotify,
    Youtube,
}

/// Metadata of a playable track as returned by a resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    /// Length in whole seconds.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub explicit: bool,
}

impl TrackInfo {
    pub fn new(title: &str, artist: &str, duration: Duration, platform: Platform) -> Self {
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            duration,
            platform,
            url: None,
            album: None,
            thumbnail: None,
            explicit: false,
        }
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    /// Case- and whitespace-insensitive identity used for duplicate detection.
    pub fn normalized_key(&self) -> (String, String) {
        (normalize(&self.title), normalize(&self.artist))
    }

    /// `"title - artist"`
    pub fn label(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A track in the music queue together with who asked for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongRequest {
    pub track: TrackInfo,
    pub nickname: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_key_ignores_case_and_spacing() {
        let a = TrackInfo::new("Blinding  Lights", "The Weeknd", Duration::from_secs(200), Platform::Spotify);
        let b = TrackInfo::new(" blinding lights", "THE WEEKND ", Duration::from_secs(201), Platform::Youtube);
        assert_eq!(a.normalized_key(), b.normalized_key());
        assert_eq!(a.label(), "Blinding  Lights - The Weeknd");
    }

    #[test]
    fn test_track_json_uses_seconds() {
        let track: TrackInfo = serde_json::from_str(
            r#"{"title": "Song", "artist": "Band", "duration": 215, "platform": "youtube",
                "url": "https://youtu.be/abcdefghijk"}"#,
        )
        .unwrap();
        assert_eq!(track.duration, Duration::from_secs(215));
        assert_eq!(track.platform, Platform::Youtube);
        assert!(!track.explicit);
        assert_eq!(
            serde_json::to_value(&track).unwrap()["platform"],
            serde_json::json!("youtube")
        );
    }
}
