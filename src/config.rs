use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    audio::alerts::SoundAlert,
    music::track::{Platform, TrackInfo},
    queue::WorkerConfig,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub tiktok: TikTokConfig,

    #[serde(default)]
    pub features: FeatureFlags,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub music: MusicConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub overlay: OverlayConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Static command responses, looked up by the first word of a comment.
    #[serde(default = "default_commands")]
    pub commands: Vec<CommandEntry>,

    /// Keyword rules scanned in list order; the first matching keyword wins.
    #[serde(default = "default_auto_responses")]
    pub auto_responses: Vec<AutoResponseRule>,

    #[serde(default = "default_spam_keywords")]
    pub spam_keywords: Vec<String>,

    #[serde(default = "default_shutdown_timeout", with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub command: String,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoResponseRule {
    pub keyword: String,
    pub responses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TikTokConfig {
    #[serde(default)]
    pub username: String,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    #[serde(default = "default_reconnect_delay", with = "duration_ms")]
    pub reconnect_delay: Duration,
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            auto_reconnect: true,
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub auto_response: bool,
    #[serde(default = "default_true")]
    pub welcome_message: bool,
    #[serde(default)]
    pub tts: bool,
    #[serde(default = "default_true")]
    pub sound_alerts: bool,
    #[serde(default = "default_true")]
    pub music: bool,
    #[serde(default)]
    pub overlay: bool,
    #[serde(default)]
    pub ai: bool,
    #[serde(default = "default_true")]
    pub analytics: bool,
    #[serde(default = "default_true")]
    pub spam_filter: bool,
    #[serde(default = "default_true")]
    pub command_processing: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            auto_response: true,
            welcome_message: true,
            tts: false,
            sound_alerts: true,
            music: true,
            overlay: false,
            ai: false,
            analytics: true,
            spam_filter: true,
            command_processing: true,
        }
    }
}

/// External program invocation. `{placeholders}` in `args` are substituted per
/// call by the backend using it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn render_args(&self, values: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                values.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EngineKind {
    /// Writes utterances to the log.
    #[default]
    Console,
    /// Spawns [`TtsConfig::command`] per utterance.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub engine: EngineKind,

    #[serde(default = "default_tts_command")]
    pub command: CommandSpec,

    #[serde(default = "default_voice_rate")]
    pub voice_rate: u32,

    #[serde(default = "default_voice_volume")]
    pub voice_volume: f32,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_tts_max_length")]
    pub max_length: usize,

    #[serde(default = "default_tts_min_length")]
    pub min_length: usize,

    #[serde(default)]
    pub blocked_words: Vec<String>,

    #[serde(default)]
    pub vip_users: Vec<String>,

    /// Speak ordinary chat lines of 5 to 50 characters.
    #[serde(default)]
    pub auto_read_chat: bool,

    #[serde(default = "default_true")]
    pub filter_urls: bool,

    #[serde(default = "default_true")]
    pub filter_numbers: bool,

    #[serde(default = "default_tts_queue_size")]
    pub max_queue_size: usize,

    #[serde(default)]
    pub max_requests_per_user: Option<usize>,

    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            command: default_tts_command(),
            voice_rate: default_voice_rate(),
            voice_volume: default_voice_volume(),
            language: default_language(),
            max_length: default_tts_max_length(),
            min_length: default_tts_min_length(),
            blocked_words: Vec::new(),
            vip_users: Vec::new(),
            auto_read_chat: false,
            filter_urls: true,
            filter_numbers: true,
            max_queue_size: default_tts_queue_size(),
            max_requests_per_user: None,
            worker: WorkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlayerKind {
    /// Accepts every sound without producing output.
    #[default]
    Silent,
    /// Spawns [`AudioConfig::player_command`] per sound.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub player: PlayerKind,

    #[serde(default = "default_player_command")]
    pub player_command: CommandSpec,

    #[serde(default = "default_global_volume")]
    pub global_volume: f32,

    #[serde(default = "default_sounds_directory")]
    pub sounds_directory: PathBuf,

    #[serde(default)]
    pub comment_alerts: bool,

    #[serde(default)]
    pub like_alerts: bool,

    #[serde(default = "default_command_sounds")]
    pub command_sounds: Vec<String>,

    #[serde(default)]
    pub custom_alerts: Vec<SoundAlert>,

    #[serde(default = "default_audio_queue_size")]
    pub max_queue_size: usize,

    #[serde(default = "default_audio_worker")]
    pub worker: WorkerConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            player: PlayerKind::default(),
            player_command: default_player_command(),
            global_volume: default_global_volume(),
            sounds_directory: default_sounds_directory(),
            comment_alerts: false,
            like_alerts: false,
            command_sounds: default_command_sounds(),
            custom_alerts: Vec::new(),
            max_queue_size: default_audio_queue_size(),
            worker: default_audio_worker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicConfig {
    #[serde(default = "default_true")]
    pub auto_play: bool,

    #[serde(default)]
    pub allow_explicit: bool,

    #[serde(default = "default_music_queue_size")]
    pub max_queue_size: usize,

    #[serde(default = "default_max_duration", with = "duration_secs")]
    pub max_duration: Duration,

    #[serde(default = "default_max_requests_per_user")]
    pub max_requests_per_user: usize,

    #[serde(default)]
    pub admin_users: Vec<String>,

    #[serde(default)]
    pub blocked_keywords: Vec<String>,

    /// Platforms tried in order when resolving a request.
    #[serde(default = "default_platforms")]
    pub platforms: Vec<Platform>,

    /// Tracks known to the built-in catalog resolver.
    #[serde(default)]
    pub catalog: Vec<TrackInfo>,

    #[serde(default = "default_history_size")]
    pub history_size: usize,

    #[serde(default = "default_music_worker")]
    pub worker: WorkerConfig,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            auto_play: true,
            allow_explicit: false,
            max_queue_size: default_music_queue_size(),
            max_duration: default_max_duration(),
            max_requests_per_user: default_max_requests_per_user(),
            admin_users: Vec::new(),
            blocked_keywords: Vec::new(),
            platforms: default_platforms(),
            catalog: Vec::new(),
            history_size: default_history_size(),
            worker: default_music_worker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Base URL of the chat-completion service. Without it replies come from
    /// local heuristics.
    #[serde(default)]
    pub server_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_response_rate")]
    pub response_rate: f64,

    #[serde(default = "default_response_cooldown", with = "duration_ms")]
    pub response_cooldown: Duration,

    #[serde(default = "default_ai_max_history")]
    pub max_history: usize,

    #[serde(default = "default_context_window")]
    pub context_window: usize,

    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,

    #[serde(default = "default_true")]
    pub respond_to_gifts: bool,

    #[serde(default = "default_true")]
    pub respond_to_follows: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            response_rate: default_response_rate(),
            response_cooldown: default_response_cooldown(),
            max_history: default_ai_max_history(),
            context_window: default_context_window(),
            request_timeout: default_request_timeout(),
            respond_to_gifts: true,
            respond_to_follows: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GoalKind {
    Followers,
    Messages,
    Gifts,
    Likes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalConfig {
    pub id: String,
    pub label: String,
    pub kind: GoalKind,
    pub target: u64,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_max_recent_messages")]
    pub max_recent_messages: usize,

    #[serde(default = "default_goals")]
    pub goals: Vec<GoalConfig>,

    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            max_recent_messages: default_max_recent_messages(),
            goals: default_goals(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_export_directory")]
    pub export_directory: PathBuf,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            top_n: default_top_n(),
            export_directory: default_export_directory(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            tiktok: TikTokConfig::default(),
            features: FeatureFlags::default(),
            tts: TtsConfig::default(),
            audio: AudioConfig::default(),
            music: MusicConfig::default(),
            ai: AiConfig::default(),
            overlay: OverlayConfig::default(),
            analytics: AnalyticsConfig::default(),
            command_prefix: default_command_prefix(),
            commands: default_commands(),
            auto_responses: default_auto_responses(),
            spam_keywords: default_spam_keywords(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl BotConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BotConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(s: &str) -> ConfigResult<Self> {
        let config: BotConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let file = File::create(path).map_err(write_error)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Default config with a placeholder account, written for first runs.
    pub fn create_default() -> Self {
        let mut config = Self::default();
        config.tiktok.username = "your_tiktok_username".to_string();
        config
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.command_prefix.is_empty() {
            return Err(ConfigError::Invalid("command_prefix must not be empty".into()));
        }
        if let Some(entry) = self
            .commands
            .iter()
            .find(|c| !c.command.starts_with(&self.command_prefix))
        {
            return Err(ConfigError::Invalid(format!(
                "command {} does not start with {}",
                entry.command, self.command_prefix
            )));
        }
        if self.auto_responses.iter().any(|r| r.responses.is_empty()) {
            return Err(ConfigError::Invalid(
                "auto response rules need at least one response".into(),
            ));
        }
        if self.tts.min_length > self.tts.max_length {
            return Err(ConfigError::Invalid(
                "tts.min_length exceeds tts.max_length".into(),
            ));
        }
        for (name, volume) in [
            ("tts.voice_volume", self.tts.voice_volume),
            ("audio.global_volume", self.audio.global_volume),
        ] {
            if !(0.0..=1.0).contains(&volume) {
                return Err(ConfigError::Invalid(format!("{} must be within 0.0..=1.0", name)));
            }
        }
        if !(0.0..=1.0).contains(&self.ai.response_rate) {
            return Err(ConfigError::Invalid(
                "ai.response_rate must be within 0.0..=1.0".into(),
            ));
        }
        for (name, size) in [
            ("tts.max_queue_size", self.tts.max_queue_size),
            ("audio.max_queue_size", self.audio.max_queue_size),
            ("music.max_queue_size", self.music.max_queue_size),
        ] {
            if size == 0 {
                return Err(ConfigError::Invalid(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

/// Flat key/value overrides coming from an outer control surface.
pub type SettingsUpdate = serde_json::Map<String, serde_json::Value>;

/// Which keys of a [`SettingsUpdate`] were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettingsReport {
    pub applied: Vec<String>,
    pub ignored: Vec<String>,
}

impl SettingsReport {
    fn record(&mut self, key: &str, applied: bool) {
        if applied {
            self.applied.push(key.to_string());
        } else {
            self.ignored.push(key.to_string());
        }
    }
}

pub const MIN_VOICE_RATE: u32 = 50;
pub const MAX_VOICE_RATE: u32 = 400;

pub fn clamp_volume(volume: f64) -> f32 {
    volume.clamp(0.0, 1.0) as f32
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    value.as_f64()
}

fn as_size(value: &serde_json::Value) -> Option<usize> {
    value.as_u64().map(|v| usize::try_from(v).unwrap_or(usize::MAX).max(1))
}

fn as_strings(value: &serde_json::Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|i| i.as_str().map(str::to_string))
            .collect()
    })
}

impl TtsConfig {
    pub fn apply_settings(&mut self, update: &SettingsUpdate) -> SettingsReport {
        let mut report = SettingsReport::default();
        for (key, value) in update {
            let applied = match key.as_str() {
                "voice_rate" => value
                    .as_u64()
                    .map(|rate| {
                        let rate = u32::try_from(rate).unwrap_or(MAX_VOICE_RATE);
                        self.voice_rate = rate.clamp(MIN_VOICE_RATE, MAX_VOICE_RATE);
                    })
                    .is_some(),
                "voice_volume" => as_f64(value)
                    .map(|v| self.voice_volume = clamp_volume(v))
                    .is_some(),
                "max_length" => as_size(value).map(|v| self.max_length = v).is_some(),
                "min_length" => as_size(value).map(|v| self.min_length = v).is_some(),
                "blocked_words" => as_strings(value).map(|v| self.blocked_words = v).is_some(),
                "vip_users" => as_strings(value).map(|v| self.vip_users = v).is_some(),
                "auto_read_chat" => value.as_bool().map(|v| self.auto_read_chat = v).is_some(),
                "filter_urls" => value.as_bool().map(|v| self.filter_urls = v).is_some(),
                "filter_numbers" => value.as_bool().map(|v| self.filter_numbers = v).is_some(),
                "max_queue_size" => as_size(value).map(|v| self.max_queue_size = v).is_some(),
                "max_requests_per_user" => {
                    if value.is_null() {
                        self.max_requests_per_user = None;
                        true
                    } else {
                        as_size(value)
                            .map(|v| self.max_requests_per_user = Some(v))
                            .is_some()
                    }
                }
                _ => false,
            };
            report.record(key, applied);
        }
        if self.min_length > self.max_length {
            self.min_length = self.max_length;
        }
        report
    }
}

impl AudioConfig {
    pub fn apply_settings(&mut self, update: &SettingsUpdate) -> SettingsReport {
        let mut report = SettingsReport::default();
        for (key, value) in update {
            let applied = match key.as_str() {
                "global_volume" => as_f64(value)
                    .map(|v| self.global_volume = clamp_volume(v))
                    .is_some(),
                "comment_alerts" => value.as_bool().map(|v| self.comment_alerts = v).is_some(),
                "like_alerts" => value.as_bool().map(|v| self.like_alerts = v).is_some(),
                "command_sounds" => as_strings(value).map(|v| self.command_sounds = v).is_some(),
                _ => false,
            };
            report.record(key, applied);
        }
        report
    }
}

impl MusicConfig {
    pub fn apply_settings(&mut self, update: &SettingsUpdate) -> SettingsReport {
        let mut report = SettingsReport::default();
        for (key, value) in update {
            let applied = match key.as_str() {
                "auto_play" => value.as_bool().map(|v| self.auto_play = v).is_some(),
                "allow_explicit" => value.as_bool().map(|v| self.allow_explicit = v).is_some(),
                "max_queue_size" => as_size(value).map(|v| self.max_queue_size = v).is_some(),
                "max_duration" => value
                    .as_u64()
                    .map(|secs| self.max_duration = Duration::from_secs(secs.max(1)))
                    .is_some(),
                "max_requests_per_user" => as_size(value)
                    .map(|v| self.max_requests_per_user = v)
                    .is_some(),
                "admin_users" => as_strings(value).map(|v| self.admin_users = v).is_some(),
                "blocked_keywords" => as_strings(value).map(|v| self.blocked_keywords = v).is_some(),
                _ => false,
            };
            report.record(key, applied);
        }
        report
    }
}

impl AiConfig {
    pub fn apply_settings(&mut self, update: &SettingsUpdate) -> SettingsReport {
        let mut report = SettingsReport::default();
        for (key, value) in update {
            let applied = match key.as_str() {
                "response_rate" => as_f64(value)
                    .map(|v| self.response_rate = v.clamp(0.0, 1.0))
                    .is_some(),
                "response_cooldown" => value
                    .as_u64()
                    .map(|ms| self.response_cooldown = Duration::from_millis(ms))
                    .is_some(),
                "context_window" => as_size(value).map(|v| self.context_window = v).is_some(),
                "respond_to_gifts" => value.as_bool().map(|v| self.respond_to_gifts = v).is_some(),
                "respond_to_follows" => value
                    .as_bool()
                    .map(|v| self.respond_to_follows = v)
                    .is_some(),
                _ => false,
            };
            report.record(key, applied);
        }
        report
    }
}

pub(crate) fn default_true() -> bool {
    true
}
fn default_command_prefix() -> String {
    "!".to_string()
}
fn default_commands() -> Vec<CommandEntry> {
    [
        ("!help", "Check the available commands!"),
        ("!info", "This stream is automated by TikBot."),
        ("!time", "Check how long the stream has been running."),
    ]
    .into_iter()
    .map(|(command, response)| CommandEntry {
        command: command.to_string(),
        response: response.to_string(),
    })
    .collect()
}
fn default_auto_responses() -> Vec<AutoResponseRule> {
    [
        ("hello", ["Hello! 👋", "Nice to see you!", "Welcome! 🎉"]),
        ("thanks", ["You're welcome! 😊", "Glad to help!", "Anytime! ✨"]),
        ("bye", ["Goodbye! 👋", "See you next time!", "Thanks for watching! 🙏"]),
    ]
    .into_iter()
    .map(|(keyword, responses)| AutoResponseRule {
        keyword: keyword.to_string(),
        responses: responses.iter().map(|r| r.to_string()).collect(),
    })
    .collect()
}
fn default_spam_keywords() -> Vec<String> {
    vec!["spam".to_string(), "promo".to_string(), "advert".to_string()]
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}
fn default_tts_command() -> CommandSpec {
    CommandSpec {
        program: "espeak".to_string(),
        args: vec![
            "-s".to_string(),
            "{rate}".to_string(),
            "-a".to_string(),
            "{amplitude}".to_string(),
            "-v".to_string(),
            "{language}".to_string(),
            "{text}".to_string(),
        ],
    }
}
fn default_voice_rate() -> u32 {
    150
}
fn default_voice_volume() -> f32 {
    0.8
}
fn default_language() -> String {
    "en".to_string()
}
fn default_tts_max_length() -> usize {
    100
}
fn default_tts_min_length() -> usize {
    1
}
fn default_tts_queue_size() -> usize {
    50
}
fn default_player_command() -> CommandSpec {
    CommandSpec {
        program: "ffplay".to_string(),
        args: vec![
            "-nodisp".to_string(),
            "-autoexit".to_string(),
            "-loglevel".to_string(),
            "quiet".to_string(),
            "-volume".to_string(),
            "{volume_percent}".to_string(),
            "{path}".to_string(),
        ],
    }
}
fn default_global_volume() -> f32 {
    0.7
}
fn default_sounds_directory() -> PathBuf {
    PathBuf::from("static/sounds")
}
fn default_command_sounds() -> Vec<String> {
    vec!["!effect".to_string(), "!sound".to_string()]
}
fn default_audio_queue_size() -> usize {
    10
}
fn default_audio_worker() -> WorkerConfig {
    WorkerConfig {
        pause_between: Duration::from_millis(100),
        failure_pause: Duration::from_millis(500),
    }
}
fn default_music_queue_size() -> usize {
    50
}
fn default_max_duration() -> Duration {
    Duration::from_secs(600)
}
fn default_max_requests_per_user() -> usize {
    3
}
fn default_platforms() -> Vec<Platform> {
    vec![Platform::Spotify, Platform::Youtube]
}
fn default_history_size() -> usize {
    50
}
fn default_music_worker() -> WorkerConfig {
    WorkerConfig {
        pause_between: Duration::from_secs(1),
        failure_pause: Duration::from_secs(1),
    }
}
fn default_response_rate() -> f64 {
    0.3
}
fn default_response_cooldown() -> Duration {
    Duration::from_secs(10)
}
fn default_ai_max_history() -> usize {
    200
}
fn default_context_window() -> usize {
    15
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_max_recent_messages() -> usize {
    20
}
fn default_goals() -> Vec<GoalConfig> {
    vec![
        GoalConfig {
            id: "followers_100".to_string(),
            label: "100 new followers".to_string(),
            kind: GoalKind::Followers,
            target: 100,
            active: true,
        },
        GoalConfig {
            id: "messages_500".to_string(),
            label: "500 chat messages".to_string(),
            kind: GoalKind::Messages,
            target: 500,
            active: false,
        },
        GoalConfig {
            id: "gifts_50".to_string(),
            label: "50 gifts".to_string(),
            kind: GoalKind::Gifts,
            target: 50,
            active: false,
        },
    ]
}
fn default_broadcast_capacity() -> usize {
    256
}
fn default_max_events() -> usize {
    5000
}
fn default_top_n() -> usize {
    10
}
fn default_export_directory() -> PathBuf {
    PathBuf::from("exports")
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_empty_json_yields_defaults() {
        let config = BotConfig::from_json("{}").unwrap();
        assert!(config.tiktok.auto_reconnect);
        assert_eq!(config.tiktok.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.tts.max_queue_size, 50);
        assert_eq!(config.music.max_requests_per_user, 3);
        assert_eq!(config.music.max_duration, Duration::from_secs(600));
        assert_eq!(config.commands.len(), 3);
        assert_eq!(config.auto_responses[0].keyword, "hello");
        assert!(!config.features.tts);
    }

    #[test]
    fn test_partial_override() {
        let config = BotConfig::from_json(
            r#"{
                "tiktok": {"username": "streamer", "reconnect_delay": 250},
                "features": {"tts": true},
                "music": {"max_duration": 300}
            }"#,
        )
        .unwrap();
        assert_eq!(config.tiktok.username, "streamer");
        assert_eq!(config.tiktok.reconnect_delay, Duration::from_millis(250));
        assert!(config.features.tts);
        assert!(config.features.spam_filter);
        assert_eq!(config.music.max_duration, Duration::from_secs(300));
    }

    #[test]
    fn test_validation_errors() {
        let bad_volume = BotConfig::from_json(r#"{"audio": {"global_volume": 1.5}}"#);
        assert!(matches!(bad_volume, Err(ConfigError::Invalid(_))));

        let bad_command = BotConfig::from_json(r#"{"commands": [{"command": "help", "response": "x"}]}"#);
        assert!(matches!(bad_command, Err(ConfigError::Invalid(_))));

        assert!(matches!(BotConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = BotConfig::create_default();
        config.save(&path).unwrap();

        let loaded = BotConfig::load(&path).unwrap();
        assert_eq!(loaded.tiktok.username, "your_tiktok_username");
        assert_eq!(loaded.commands, config.commands);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            BotConfig::load("/nonexistent/tikbot.json"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_settings_clamping() {
        let mut audio = AudioConfig::default();
        let update = json!({"global_volume": 3.0, "unknown": 1}).as_object().cloned().unwrap();
        let report = audio.apply_settings(&update);
        assert_eq!(audio.global_volume, 1.0);
        assert_eq!(report.applied, vec!["global_volume"]);
        assert_eq!(report.ignored, vec!["unknown"]);

        let mut tts = TtsConfig::default();
        let update = json!({"voice_rate": 10, "voice_volume": -1.0, "min_length": 500})
            .as_object()
            .cloned()
            .unwrap();
        tts.apply_settings(&update);
        assert_eq!(tts.voice_rate, MIN_VOICE_RATE);
        assert_eq!(tts.voice_volume, 0.0);
        assert_eq!(tts.min_length, tts.max_length);
    }

    #[test]
    fn test_command_spec_render() {
        let spec = CommandSpec {
            program: "say".into(),
            args: vec!["-r".into(), "{rate}".into(), "{text}".into()],
        };
        assert_eq!(
            spec.render_args(&[("rate", "150"), ("text", "hi {there}")]),
            vec!["-r", "150", "hi {there}"]
        );
    }
}
