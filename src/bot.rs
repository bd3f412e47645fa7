//! # Bot Orchestrator
//!
//! [`TikBot`] owns the [`EventHandler`] and wires everything else to it:
//!
//! - the reaction pipeline on COMMENT: spam filter, then a command **or** an
//!   auto-response (never both), then TTS submission
//! - GIFT/FOLLOW counters, the reconnect policy on DISCONNECT
//! - the relay loop turning [`PlatformNotification`]s into events
//! - the enabled subsystems, started in order and stopped on shutdown
//!
//! Every reaction runs inside the hub's fan-out, so a failing step is logged
//! by the hub and never stops the next comment.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, PoisonError, RwLock as StdRwLock, Weak,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::{
    sync::{mpsc, Mutex, RwLock},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    ai::AiManager,
    analytics::AnalyticsCollector,
    audio::AudioManager,
    config::{AutoResponseRule, BotConfig, CommandEntry, SettingsReport, SettingsUpdate},
    error::{TikBotError, TikBotResult},
    event::{Event, EventHandler, EventType, HandlerResult},
    music::MusicManager,
    overlay::OverlayManager,
    platform::{PlatformClient, PlatformNotification},
    queue::Priority,
    tts::TtsManager,
};

const NOTIFICATION_CAPACITY: usize = 256;
const TTS_COMMAND: &str = "!tts ";
const AMBIENT_TTS_CHARS: std::ops::RangeInclusive<usize> = 5..=50;
const LISTED_COMMANDS: usize = 8;

/// Snapshot of the bot counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotStats {
    pub messages_received: u64,
    pub commands_processed: u64,
    pub auto_responses_sent: u64,
    pub gifts_received: u64,
    pub followers_gained: u64,
    pub spam_filtered: u64,
    pub uptime: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub is_running: bool,
}

#[derive(Debug, Default)]
struct Counters {
    messages_received: AtomicU64,
    commands_processed: AtomicU64,
    auto_responses_sent: AtomicU64,
    gifts_received: AtomicU64,
    followers_gained: AtomicU64,
    spam_filtered: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }
}

/// Subsystems enabled by the feature flags, present while the bot runs.
#[derive(Default)]
struct Subsystems {
    tts: Option<Arc<TtsManager>>,
    audio: Option<Arc<AudioManager>>,
    music: Option<Arc<MusicManager>>,
    ai: Option<Arc<AiManager>>,
    overlay: Option<Arc<OverlayManager>>,
    analytics: Option<Arc<AnalyticsCollector>>,
}

impl Subsystems {
    async fn shutdown(self, hub: &EventHandler, timeout: Duration) {
        if let Some(tts) = self.tts {
            tts.stop(timeout).await;
        }
        if let Some(audio) = self.audio {
            audio.unregister(hub).await;
            audio.stop(timeout).await;
        }
        if let Some(music) = self.music {
            music.unregister().await;
            music.stop(timeout).await;
        }
        if let Some(ai) = self.ai {
            ai.unregister().await;
        }
        if let Some(overlay) = self.overlay {
            overlay.unregister().await;
        }
        if let Some(analytics) = self.analytics {
            analytics.unregister().await;
            analytics.end_session().await;
        }
    }
}

pub struct TikBot {
    config: StdRwLock<BotConfig>,
    hub: Arc<EventHandler>,
    platform: Arc<dyn PlatformClient>,
    counters: Counters,
    running: AtomicBool,
    started: StdRwLock<Option<(DateTime<Utc>, Instant)>>,
    subsystems: RwLock<Subsystems>,
    notifications: Mutex<Option<mpsc::Sender<PlatformNotification>>>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

impl TikBot {
    /// Creates the bot and registers the reaction pipeline on a fresh hub.
    pub fn new(config: BotConfig, platform: Arc<dyn PlatformClient>) -> Arc<Self> {
        let bot = Arc::new(Self {
            config: StdRwLock::new(config),
            hub: Arc::new(EventHandler::new()),
            platform,
            counters: Counters::default(),
            running: AtomicBool::new(false),
            started: StdRwLock::new(None),
            subsystems: RwLock::new(Subsystems::default()),
            notifications: Mutex::new(None),
            relay: Mutex::new(None),
        });
        bot.register_internal_handlers();
        bot
    }

    fn register_internal_handlers(self: &Arc<Self>) {
        self.subscribe_internal(EventType::Comment, "bot_pipeline", |bot, event| async move {
            bot.on_comment(&event).await
        });
        self.subscribe_internal(EventType::Gift, "bot_gifts", |bot, event| async move {
            bot.on_gift(&event);
            Ok(())
        });
        self.subscribe_internal(EventType::Follow, "bot_follows", |bot, event| async move {
            bot.on_follow(&event);
            Ok(())
        });
        self.subscribe_internal(EventType::Disconnect, "bot_reconnect", |bot, _| async move {
            bot.on_disconnect().await;
            Ok(())
        });
    }

    fn subscribe_internal<F, Fut>(
        self: &Arc<Self>,
        event_type: EventType,
        name: &str,
        reaction: F,
    ) where
        F: Fn(Arc<TikBot>, Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let bot: Weak<Self> = Arc::downgrade(self);
        self.hub.subscribe(event_type, name, move |event| -> BoxFuture<'static, HandlerResult> {
            match bot.upgrade() {
                Some(bot) => reaction(bot, event).boxed(),
                None => async { Ok(()) }.boxed(),
            }
        });
    }

    pub fn hub(&self) -> &Arc<EventHandler> {
        &self.hub
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> BotConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read_config<R>(&self, f: impl FnOnce(&BotConfig) -> R) -> R {
        f(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write_config<R>(&self, f: impl FnOnce(&mut BotConfig) -> R) -> R {
        f(&mut self.config.write().unwrap_or_else(PoisonError::into_inner))
    }

    // Lifecycle

    /// Starts the enabled subsystems, announces BOT_START and connects.
    /// On failure everything started so far is stopped again.
    pub async fn start(self: &Arc<Self>) -> TikBotResult<()> {
        if self.is_running() {
            return Err(TikBotError::AlreadyRunning);
        }
        if let Err(e) = self.start_inner().await {
            error!(target: "bot", "❌ Failed to start: {}", e);
            self.shutdown().await;
            return Err(e);
        }
        Ok(())
    }

    async fn start_inner(self: &Arc<Self>) -> TikBotResult<()> {
        self.initialize_subsystems().await?;

        let (sender, receiver) = mpsc::channel(NOTIFICATION_CAPACITY);
        *self.notifications.lock().await = Some(sender.clone());
        *self.relay.lock().await = Some(tokio::spawn(relay_notifications(
            Arc::downgrade(self),
            receiver,
        )));

        self.hub.emit(Event::new(EventType::BotStart)).await;
        self.platform.connect(sender).await?;

        self.running.store(true, Ordering::SeqCst);
        *self.started.write().unwrap_or_else(PoisonError::into_inner) = Some((Utc::now(), Instant::now()));
        info!(target: "bot", "✅ TikBot connected to {}", self.platform.target());
        Ok(())
    }

    async fn initialize_subsystems(&self) -> TikBotResult<()> {
        let config = self.config();
        let features = &config.features;
        // Filled in place so a failure part-way leaves the started ones
        // reachable for shutdown.
        let mut subsystems = self.subsystems.write().await;

        if features.tts {
            let tts = Arc::new(TtsManager::initialize(config.tts.clone(), self.hub.clone()).await?);
            tts.start().await;
            subsystems.tts = Some(tts);
        }
        if features.sound_alerts {
            let audio = Arc::new(AudioManager::initialize(config.audio.clone()).await?);
            audio.register(&self.hub).await;
            audio.start().await;
            subsystems.audio = Some(audio);
        }
        if features.music {
            let music = Arc::new(MusicManager::from_config(config.music.clone(), self.hub.clone()));
            music.register().await;
            music.start().await;
            subsystems.music = Some(music);
        }
        if features.ai {
            let ai = Arc::new(AiManager::initialize(config.ai.clone(), self.hub.clone()).await);
            ai.register().await;
            subsystems.ai = Some(ai);
        }
        if features.overlay {
            let overlay = Arc::new(OverlayManager::new(&config.overlay, self.hub.clone()));
            overlay.register().await;
            subsystems.overlay = Some(overlay);
        }
        if features.analytics {
            let analytics = Arc::new(AnalyticsCollector::new(config.analytics.clone(), self.hub.clone()));
            analytics.register().await;
            analytics.start_session(&config.tiktok.username).await;
            subsystems.analytics = Some(analytics);
        }
        Ok(())
    }

    /// Disconnects, stops the subsystems and announces BOT_STOP.
    pub async fn stop(&self) -> TikBotResult<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.platform.disconnect().await {
            warn!(target: "bot", "Failed to disconnect: {}", e);
        }

        let timeout = self.read_config(|c| c.shutdown_timeout);
        let subsystems = std::mem::take(&mut *self.subsystems.write().await);
        subsystems.shutdown(&self.hub, timeout).await;

        if let Some(relay) = self.relay.lock().await.take() {
            relay.abort();
        }
        self.notifications.lock().await.take();

        self.hub.emit(Event::new(EventType::BotStop)).await;

        let stats = self.get_stats();
        if let Some(uptime) = &stats.uptime {
            info!(
                target: "bot",
                uptime = %uptime,
                messages = stats.messages_received,
                gifts = stats.gifts_received,
                "📊 Session summary"
            );
        }
        info!(target: "bot", "🔴 TikBot stopped");
    }

    /// Platform notification relayed into the hub.
    async fn relay(&self, notification: PlatformNotification) {
        match &notification {
            PlatformNotification::Connected { .. } => {
                info!(target: "bot", "🟢 Connected to the live room")
            }
            PlatformNotification::Disconnected => {
                warn!(target: "bot", "🟡 Disconnected from the live room")
            }
            _ => {}
        }
        self.hub.emit(notification.into_event()).await;
    }

    /// Schedules one reconnect attempt after the configured delay. Nothing is
    /// scheduled unless auto-reconnect is on and the bot is running.
    async fn on_disconnect(self: &Arc<Self>) {
        let (auto_reconnect, delay) =
            self.read_config(|c| (c.tiktok.auto_reconnect, c.tiktok.reconnect_delay));
        if !auto_reconnect || !self.is_running() {
            return;
        }
        let Some(sender) = self.notifications.lock().await.clone() else {
            return;
        };
        info!(target: "bot", "Reconnecting in {:?}", delay);

        let bot: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(bot) = bot.upgrade().filter(|b| b.is_running()) else {
                return;
            };
            match bot.platform.connect(sender).await {
                Ok(()) => info!(target: "bot", "Reconnected to {}", bot.platform.target()),
                Err(e) => error!(target: "bot", "Reconnect failed: {}", e),
            }
        });
    }

    // Reaction pipeline

    async fn on_comment(&self, event: &Event) -> HandlerResult {
        Counters::bump(&self.counters.messages_received);
        let comment = event.get_str("comment").unwrap_or_default();
        let username = event.get_str("username").unwrap_or_default();
        let nickname = event.display_name();

        if self.is_spam(comment) {
            Counters::bump(&self.counters.spam_filtered);
            debug!(target: "bot", username, "Spam filtered");
            self.hub
                .emit_simple(
                    EventType::SpamDetected,
                    [("username", username), ("nickname", nickname), ("comment", comment)],
                )
                .await;
            return Ok(());
        }

        let (prefix, features) = self.read_config(|c| (c.command_prefix.clone(), c.features.clone()));
        if comment.starts_with(&prefix) && features.command_processing {
            self.process_command(username, nickname, comment).await;
        } else if features.auto_response {
            self.process_auto_response(username, nickname, comment).await;
        }

        self.process_tts(username, nickname, comment).await;
        Ok(())
    }

    fn is_spam(&self, comment: &str) -> bool {
        self.read_config(|c| {
            if !c.features.spam_filter {
                return false;
            }
            let comment = comment.to_lowercase();
            c.spam_keywords
                .iter()
                .any(|k| !k.is_empty() && comment.contains(&k.to_lowercase()))
        })
    }

    async fn process_command(&self, username: &str, nickname: &str, comment: &str) {
        let mut words = comment.split_whitespace();
        let Some(command) = words.next().map(str::to_lowercase) else {
            return;
        };
        let args: Vec<String> = words.map(str::to_string).collect();
        let response = self.resolve_command(&command);

        if let Some(response) = &response {
            Counters::bump(&self.counters.commands_processed);
            info!(target: "bot", command = %command, "🤖 [{}] {}", nickname, response);
        }
        let resolved = response.is_some();
        self.hub
            .emit(
                Event::new(EventType::Command)
                    .with("username", username)
                    .with("nickname", nickname)
                    .with("command", command)
                    .with("args", args)
                    .with("response", response)
                    .with("resolved", resolved),
            )
            .await;
    }

    /// Response for a command: the computed specials first, then the table.
    fn resolve_command(&self, command: &str) -> Option<String> {
        match command {
            "!time" => self
                .uptime()
                .map(|elapsed| format!("Stream time: {}", format_elapsed(elapsed))),
            "!stats" => Some(format!(
                "📊 Stats - messages: {}, gifts: {}, followers: {}",
                Counters::get(&self.counters.messages_received),
                Counters::get(&self.counters.gifts_received),
                Counters::get(&self.counters.followers_gained),
            )),
            "!commands" => self.read_config(|c| {
                let names: Vec<&str> = c
                    .commands
                    .iter()
                    .take(LISTED_COMMANDS)
                    .map(|e| e.command.as_str())
                    .collect();
                Some(format!("🤖 Available commands: {}", names.join(", ")))
            }),
            _ => None,
        }
        .or_else(|| {
            self.read_config(|c| {
                c.commands
                    .iter()
                    .find(|e| e.command.eq_ignore_ascii_case(command))
                    .map(|e| e.response.clone())
            })
        })
    }

    async fn process_auto_response(&self, username: &str, nickname: &str, comment: &str) {
        let comment = comment.to_lowercase();
        let matched = self.read_config(|c| {
            c.auto_responses
                .iter()
                .find(|rule| !rule.keyword.is_empty() && comment.contains(&rule.keyword.to_lowercase()))
                .and_then(|rule| {
                    rule.responses
                        .choose(&mut rand::thread_rng())
                        .map(|response| (rule.keyword.clone(), response.clone()))
                })
        });
        let Some((keyword, response)) = matched else {
            return;
        };

        Counters::bump(&self.counters.auto_responses_sent);
        info!(target: "bot", keyword = %keyword, "💬 [{}] {}", nickname, response);
        self.hub
            .emit_simple(
                EventType::AutoResponse,
                [
                    ("username", username),
                    ("nickname", nickname),
                    ("keyword", keyword.as_str()),
                    ("response", response.as_str()),
                    ("source", "rule"),
                ],
            )
            .await;
    }

    /// `!tts <text>` is read at high priority; other chat is read at normal
    /// priority when auto-read is on and it is 5 to 50 characters long.
    async fn process_tts(&self, username: &str, nickname: &str, comment: &str) {
        let Some(tts) = self.subsystems.read().await.tts.clone() else {
            return;
        };
        if let Some(text) = comment.strip_prefix(TTS_COMMAND) {
            let text = text.trim();
            if text.is_empty() {
                return;
            }
            let result = tts.submit(text, username, Priority::High).await;
            if result.success {
                info!(target: "bot", "🔊 TTS request by {}: {}", nickname, text);
            }
        } else if tts.auto_read_chat().await && AMBIENT_TTS_CHARS.contains(&comment.chars().count()) {
            tts.submit(comment, username, Priority::Normal).await;
        }
    }

    fn on_gift(&self, event: &Event) {
        Counters::bump(&self.counters.gifts_received);
        info!(
            target: "bot",
            "🎁 {} sent {} x{}",
            event.display_name(),
            event.get_str("gift_name").unwrap_or("a gift"),
            event.get_i64("gift_count").unwrap_or(1)
        );
    }

    fn on_follow(&self, event: &Event) {
        Counters::bump(&self.counters.followers_gained);
        if self.read_config(|c| c.features.welcome_message) {
            info!(target: "bot", "🎉 Thanks for the follow, {}!", event.display_name());
        }
    }

    // Inbound command surface

    /// Adds a command or replaces the response of an existing one.
    pub fn add_command(&self, command: &str, response: &str) {
        self.write_config(|c| {
            match c.commands.iter_mut().find(|e| e.command == command) {
                Some(entry) => entry.response = response.to_string(),
                None => c.commands.push(CommandEntry {
                    command: command.to_string(),
                    response: response.to_string(),
                }),
            }
        });
    }

    pub fn remove_command(&self, command: &str) -> bool {
        self.write_config(|c| {
            let before = c.commands.len();
            c.commands.retain(|e| e.command != command);
            c.commands.len() != before
        })
    }

    /// Adds a keyword rule at the end of the scan order, or replaces the
    /// responses of an existing keyword in place.
    pub fn add_auto_response(&self, keyword: &str, responses: Vec<String>) {
        self.write_config(|c| {
            match c.auto_responses.iter_mut().find(|r| r.keyword == keyword) {
                Some(rule) => rule.responses = responses,
                None => c.auto_responses.push(AutoResponseRule {
                    keyword: keyword.to_string(),
                    responses,
                }),
            }
        });
    }

    pub fn remove_auto_response(&self, keyword: &str) -> bool {
        self.write_config(|c| {
            let before = c.auto_responses.len();
            c.auto_responses.retain(|r| r.keyword != keyword);
            c.auto_responses.len() != before
        })
    }

    /// Applies overrides to one running subsystem (`tts`, `audio`, `music` or
    /// `ai`). Returns `None` when that subsystem is not running.
    pub async fn update_settings(&self, subsystem: &str, update: &SettingsUpdate) -> Option<SettingsReport> {
        let subsystems = self.subsystems.read().await;
        let report = match subsystem {
            "tts" => subsystems.tts.as_ref()?.update_settings(update).await,
            "audio" => subsystems.audio.as_ref()?.update_settings(update).await,
            "music" => subsystems.music.as_ref()?.update_settings(update).await,
            "ai" => subsystems.ai.as_ref()?.update_settings(update).await,
            _ => return None,
        };
        debug!(target: "bot", subsystem, applied = ?report.applied, ignored = ?report.ignored, "Settings updated");
        Some(report)
    }

    // Accessors

    pub async fn tts(&self) -> Option<Arc<TtsManager>> {
        self.subsystems.read().await.tts.clone()
    }

    pub async fn audio(&self) -> Option<Arc<AudioManager>> {
        self.subsystems.read().await.audio.clone()
    }

    pub async fn music(&self) -> Option<Arc<MusicManager>> {
        self.subsystems.read().await.music.clone()
    }

    pub async fn ai(&self) -> Option<Arc<AiManager>> {
        self.subsystems.read().await.ai.clone()
    }

    pub async fn overlay(&self) -> Option<Arc<OverlayManager>> {
        self.subsystems.read().await.overlay.clone()
    }

    pub async fn analytics(&self) -> Option<Arc<AnalyticsCollector>> {
        self.subsystems.read().await.analytics.clone()
    }

    fn uptime(&self) -> Option<Duration> {
        self.started
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|(_, since)| since.elapsed())
    }

    pub fn get_stats(&self) -> BotStats {
        let start_time = self
            .started
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|(at, _)| at);
        BotStats {
            messages_received: Counters::get(&self.counters.messages_received),
            commands_processed: Counters::get(&self.counters.commands_processed),
            auto_responses_sent: Counters::get(&self.counters.auto_responses_sent),
            gifts_received: Counters::get(&self.counters.gifts_received),
            followers_gained: Counters::get(&self.counters.followers_gained),
            spam_filtered: Counters::get(&self.counters.spam_filtered),
            uptime: self.uptime().map(format_elapsed),
            start_time,
            is_running: self.is_running(),
        }
    }
}

async fn relay_notifications(bot: Weak<TikBot>, mut receiver: mpsc::Receiver<PlatformNotification>) {
    while let Some(notification) = receiver.recv().await {
        let Some(bot) = bot.upgrade() else {
            break;
        };
        // Each notification gets its own fan-out; a slow subscriber never
        // holds back the next one.
        tokio::spawn(async move { bot.relay(notification).await });
    }
    debug!(target: "bot", "Notification relay finished");
}

/// `HH:MM:SS`, hours not wrapped.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{FeatureFlags, TtsConfig},
        event::Value,
        platform::{MockPlatformClient, PlatformError},
        tts::engine::ConsoleEngine,
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn quiet_config() -> BotConfig {
        let mut config = BotConfig::default();
        config.features = FeatureFlags {
            tts: false,
            sound_alerts: false,
            music: false,
            ai: false,
            overlay: false,
            analytics: false,
            ..FeatureFlags::default()
        };
        config.tiktok.reconnect_delay = Duration::from_secs(5);
        config
    }

    fn counting_platform(connects: Arc<AtomicUsize>) -> Arc<dyn PlatformClient> {
        let mut platform = MockPlatformClient::new();
        platform.expect_target().return_const("mock room".to_string());
        platform.expect_connect().returning(move |_| {
            connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        platform.expect_disconnect().returning(|| Ok(()));
        Arc::new(platform)
    }

    fn idle_platform() -> Arc<dyn PlatformClient> {
        counting_platform(Arc::new(AtomicUsize::new(0)))
    }

    fn rule(keyword: &str, responses: &[&str]) -> AutoResponseRule {
        AutoResponseRule {
            keyword: keyword.to_string(),
            responses: responses.iter().map(|r| r.to_string()).collect(),
        }
    }

    async fn comment(bot: &TikBot, text: &str) {
        bot.hub().emit(Event::comment("ann", "Ann", text, "1")).await;
    }

    async fn history(bot: &TikBot, event_type: EventType) -> Vec<Arc<Event>> {
        bot.hub().history(Some(event_type), 100).await
    }

    #[tokio::test]
    async fn test_stats_command_reports_counters() {
        let bot = TikBot::new(quiet_config(), idle_platform());
        bot.hub().emit(Event::gift("bob", "Bob", "Rose", 1, 5655)).await;
        comment(&bot, "!stats").await;

        let commands = history(&bot, EventType::Command).await;
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].get_str("response"),
            Some("📊 Stats - messages: 1, gifts: 1, followers: 0")
        );
        assert_eq!(commands[0].get_bool("resolved"), Some(true));
        assert_eq!(commands[0].get_str("nickname"), Some("Ann"));
        assert_eq!(bot.get_stats().commands_processed, 1);
    }

    #[tokio::test]
    async fn test_command_excludes_auto_response() {
        let bot = TikBot::new(quiet_config(), idle_platform());
        comment(&bot, "!help hello").await;

        let commands = history(&bot, EventType::Command).await;
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].get_str("response"), Some("Check the available commands!"));
        assert_eq!(
            commands[0].get_list("args"),
            Some(&[Value::String("hello".into())][..])
        );
        assert!(history(&bot, EventType::AutoResponse).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_is_forwarded_unresolved() {
        let bot = TikBot::new(quiet_config(), idle_platform());
        comment(&bot, "!play blinding lights").await;

        let commands = history(&bot, EventType::Command).await;
        assert_eq!(commands[0].get_str("command"), Some("!play"));
        assert_eq!(commands[0].get_bool("resolved"), Some(false));
        assert!(commands[0].get("response").is_some_and(|v| v.is_null()));
        assert_eq!(commands[0].get_list("args").map(|a| a.len()), Some(2));
        assert_eq!(bot.get_stats().commands_processed, 0);
    }

    #[tokio::test]
    async fn test_first_keyword_wins() {
        let mut config = quiet_config();
        config.auto_responses = vec![rule("hi", &["short"]), rule("hi there", &["long"])];
        let bot = TikBot::new(config, idle_platform());
        comment(&bot, "Oh HI there").await;

        let replies = history(&bot, EventType::AutoResponse).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].get_str("keyword"), Some("hi"));
        assert_eq!(replies[0].get_str("response"), Some("short"));
        assert_eq!(replies[0].get_str("source"), Some("rule"));
        assert_eq!(bot.get_stats().auto_responses_sent, 1);
    }

    #[tokio::test]
    async fn test_spam_stops_pipeline() {
        let bot = TikBot::new(quiet_config(), idle_platform());
        comment(&bot, "hello, PROMO code inside").await;

        assert_eq!(history(&bot, EventType::SpamDetected).await.len(), 1);
        assert!(history(&bot, EventType::AutoResponse).await.is_empty());
        let stats = bot.get_stats();
        assert_eq!((stats.messages_received, stats.spam_filtered), (1, 1));
    }

    #[tokio::test]
    async fn test_special_and_runtime_commands() {
        let bot = TikBot::new(quiet_config(), idle_platform());
        for i in 4..=10 {
            bot.add_command(&format!("!c{}", i), "custom");
        }
        comment(&bot, "!commands").await;
        comment(&bot, "!time").await;
        bot.add_command("!help", "Read the pinned message");
        comment(&bot, "!help").await;
        assert!(bot.remove_command("!c4"));
        assert!(!bot.remove_command("!missing"));

        let responses: Vec<Option<String>> = history(&bot, EventType::Command)
            .await
            .iter()
            .map(|e| e.get_str("response").map(str::to_string))
            .collect();
        assert_eq!(
            responses,
            vec![
                Some("🤖 Available commands: !help, !info, !time, !c4, !c5, !c6, !c7, !c8".into()),
                Some("Check how long the stream has been running.".into()),
                Some("Read the pinned message".into()),
            ]
        );
        assert_eq!(bot.config().commands.len(), 9);
    }

    #[tokio::test]
    async fn test_auto_response_management() {
        let bot = TikBot::new(quiet_config(), idle_platform());
        bot.add_auto_response("gg", vec!["Good game!".into()]);
        bot.add_auto_response("hello", vec!["Hey!".into()]);
        comment(&bot, "gg everyone").await;
        comment(&bot, "hello").await;
        assert!(bot.remove_auto_response("gg"));
        comment(&bot, "gg again").await;

        let events = history(&bot, EventType::AutoResponse).await;
        let replies: Vec<&str> = events.iter().filter_map(|e| e.get_str("response")).collect();
        assert_eq!(replies, vec!["Good game!", "Hey!"]);
        let keywords: Vec<String> = bot.config().auto_responses.into_iter().map(|r| r.keyword).collect();
        assert_eq!(keywords, vec!["hello", "thanks", "bye"]);
    }

    #[tokio::test]
    async fn test_gift_and_follow_counters() {
        let bot = TikBot::new(quiet_config(), idle_platform());
        bot.hub().emit(Event::gift("bob", "Bob", "Rose", 3, 5655)).await;
        bot.hub().emit(Event::follow("cid", "Cid", "7")).await;
        bot.hub().emit(Event::follow("dee", "Dee", "8")).await;
        let stats = bot.get_stats();
        assert_eq!((stats.gifts_received, stats.followers_gained), (1, 2));
        assert!(!stats.is_running);
        assert_eq!(stats.uptime, None);
    }

    #[tokio::test]
    async fn test_tts_submission_rules() {
        let bot = TikBot::new(quiet_config(), idle_platform());
        let tts = Arc::new(TtsManager::new(
            TtsConfig {
                auto_read_chat: true,
                ..TtsConfig::default()
            },
            Arc::new(ConsoleEngine::new(150, 1.0)),
            bot.hub().clone(),
        ));
        bot.subsystems.write().await.tts = Some(tts.clone());

        comment(&bot, "hey").await;
        comment(&bot, "nice stream today").await;
        comment(&bot, "!tts read this please").await;
        comment(&bot, "!tts    ").await;
        comment(&bot, &"x".repeat(51)).await;

        let pending: Vec<(String, Priority)> = tts
            .queue()
            .snapshot()
            .await
            .pending
            .iter()
            .map(|r| (r.payload().clone(), r.priority()))
            .collect();
        assert_eq!(
            pending,
            vec![
                ("read this please".to_string(), Priority::High),
                ("nice stream today".to_string(), Priority::Normal),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_once_after_delay() {
        let connects = Arc::new(AtomicUsize::new(0));
        let bot = TikBot::new(quiet_config(), counting_platform(connects.clone()));
        bot.start().await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(matches!(bot.start().await, Err(TikBotError::AlreadyRunning)));

        bot.hub().emit(Event::new(EventType::Disconnect)).await;
        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        bot.stop().await.unwrap();
        assert_eq!(history(&bot, EventType::BotStop).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reconnect_once_stopped() {
        let connects = Arc::new(AtomicUsize::new(0));
        let bot = TikBot::new(quiet_config(), counting_platform(connects.clone()));
        bot.start().await.unwrap();

        bot.hub().emit(Event::new(EventType::Disconnect)).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        bot.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        bot.hub().emit(Event::new(EventType::Disconnect)).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_disabled() {
        let connects = Arc::new(AtomicUsize::new(0));
        let mut config = quiet_config();
        config.tiktok.auto_reconnect = false;
        let bot = TikBot::new(config, counting_platform(connects.clone()));
        bot.start().await.unwrap();
        bot.hub().emit(Event::new(EventType::Disconnect)).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_start_cleans_up() {
        let mut platform = MockPlatformClient::new();
        platform.expect_target().return_const("mock room".to_string());
        platform.expect_connect().returning(|_| {
            Err(PlatformError::Connect {
                target: "mock room".into(),
                message: "offline".into(),
            })
        });
        platform.expect_disconnect().times(1).returning(|| Ok(()));

        let mut config = quiet_config();
        config.features.music = true;
        let bot = TikBot::new(config, Arc::new(platform));
        let error = bot.start().await.unwrap_err();
        assert!(matches!(error, TikBotError::Platform(_)));
        assert!(!bot.is_running());
        assert!(bot.music().await.is_none());
        assert_eq!(history(&bot, EventType::BotStart).await.len(), 1);
        assert_eq!(history(&bot, EventType::BotStop).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subscriber_does_not_hold_back_later_comments() {
        let channel: Arc<StdRwLock<Option<mpsc::Sender<PlatformNotification>>>> = Arc::default();
        let mut platform = MockPlatformClient::new();
        platform.expect_target().return_const("mock room".to_string());
        let captured = channel.clone();
        platform.expect_connect().returning(move |sender| {
            *captured.write().unwrap() = Some(sender);
            Ok(())
        });
        platform.expect_disconnect().returning(|| Ok(()));

        let bot = TikBot::new(quiet_config(), Arc::new(platform));
        bot.hub().subscribe(EventType::Comment, "slow_reader", |event| async move {
            if event.get_str("comment") == Some("hello there") {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            Ok(())
        });
        bot.start().await.unwrap();

        let sender = channel.read().unwrap().clone().unwrap();
        for comment in ["hello there", "!stats"] {
            sender
                .send(PlatformNotification::Comment {
                    username: "ann".into(),
                    nickname: "Ann".into(),
                    user_id: "1".into(),
                    comment: comment.into(),
                })
                .await
                .unwrap();
        }
        sender
            .send(PlatformNotification::Gift {
                username: "bob".into(),
                nickname: "Bob".into(),
                gift_name: "Rose".into(),
                gift_count: 1,
                gift_id: 5655,
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(history(&bot, EventType::Command).await.len(), 1);
        assert_eq!(bot.get_stats().gifts_received, 1);
        bot.stop().await.unwrap();
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(format_elapsed(Duration::from_secs(100 * 3600)), "100:00:00");
    }
}
