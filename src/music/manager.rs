use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, PoisonError, RwLock as StdRwLock, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::{MusicConfig, SettingsReport, SettingsUpdate},
    event::{Event, EventHandler, EventType, HandlerId, HandlerResult},
    queue::{
        Admission, ExecError, Executor, Priority, QueueLimits, QueueSnapshot, QueueStats,
        QueueWorker, Rejection, Request, RequestQueue, SubmitResult,
    },
};

use super::{
    resolver::{is_url, CatalogResolver, TrackResolver},
    track::{Platform, SongRequest, TrackInfo},
};

pub const REQUEST_COMMANDS: [&str; 3] = ["!music", "!song", "!play"];

#[derive(Debug, Clone)]
struct MusicRules {
    max_duration: Duration,
    platforms: Vec<Platform>,
    blocked_keywords: Vec<String>,
    allow_explicit: bool,
}

impl From<&MusicConfig> for MusicRules {
    fn from(config: &MusicConfig) -> Self {
        Self {
            max_duration: config.max_duration,
            platforms: config.platforms.clone(),
            blocked_keywords: config
                .blocked_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            allow_explicit: config.allow_explicit,
        }
    }
}

/// Song rules: duration ceiling, allowed platforms, blocked keywords,
/// explicit content and duplicates by normalized title and artist.
#[derive(Debug)]
pub struct MusicAdmission {
    rules: StdRwLock<MusicRules>,
}

impl MusicAdmission {
    pub fn new(config: &MusicConfig) -> Self {
        Self {
            rules: StdRwLock::new(MusicRules::from(config)),
        }
    }

    fn update(&self, config: &MusicConfig) {
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = MusicRules::from(config);
    }
}

impl Admission<SongRequest> for MusicAdmission {
    fn validate(&self, song: &SongRequest, _requester: &str) -> Result<(), Rejection> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let track = &song.track;
        if track.duration > rules.max_duration {
            return Err(Rejection::invalid(format!(
                "Song too long (max {} minutes)",
                rules.max_duration.as_secs() / 60
            )));
        }
        if !rules.platforms.contains(&track.platform) {
            return Err(Rejection::invalid(format!(
                "Unsupported platform: {}",
                track.platform
            )));
        }
        let text = format!("{} {}", track.title, track.artist).to_lowercase();
        if rules.blocked_keywords.iter().any(|k| text.contains(k.as_str())) {
            return Err(Rejection::invalid("Request contains blocked content"));
        }
        if track.explicit && !rules.allow_explicit {
            return Err(Rejection::invalid("Explicit content is not allowed"));
        }
        Ok(())
    }

    fn duplicate_of(&self, candidate: &SongRequest, queued: &SongRequest) -> Option<String> {
        (candidate.track.normalized_key() == queued.track.normalized_key())
            .then(|| queued.track.label())
    }
}

/// Output for the song currently at the head of the queue.
#[mockall::automock]
#[async_trait]
pub trait MusicPlayer: Send + Sync {
    fn name(&self) -> String;
    /// Returns once the track is over. Dropping the future stops playback.
    async fn play(&self, track: &TrackInfo) -> bool;
}

/// Holds the "now playing" slot for the length of the track. Actual audio is
/// produced by whatever the streamer plays alongside.
#[derive(Debug, Default)]
pub struct HoldPlayer;

#[async_trait]
impl MusicPlayer for HoldPlayer {
    fn name(&self) -> String {
        "hold".to_string()
    }

    async fn play(&self, track: &TrackInfo) -> bool {
        tokio::time::sleep(track.duration).await;
        true
    }
}

#[derive(Debug, Default)]
struct MusicCounters {
    total_requests: AtomicU64,
    spotify_requests: AtomicU64,
    youtube_requests: AtomicU64,
    songs_played: AtomicU64,
    songs_skipped: AtomicU64,
}

fn song_event(event_type: EventType, request: &Request<SongRequest>) -> Event {
    request_event(event_type, request.id(), request.requester(), request.payload())
}

fn request_event(event_type: EventType, request_id: Uuid, requester: &str, song: &SongRequest) -> Event {
    Event::new(event_type)
        .with("request_id", request_id.to_string())
        .with("title", song.track.title.as_str())
        .with("artist", song.track.artist.as_str())
        .with("duration", song.track.duration.as_secs())
        .with("platform", song.track.platform.to_string())
        .with("url", song.track.url.clone())
        .with("thumbnail", song.track.thumbnail.clone())
        .with("username", requester)
        .with("nickname", song.nickname.as_str())
}

/// Announces a song with MUSIC_SONG_STARTED and hands it to the player.
struct SongExecutor {
    hub: Arc<EventHandler>,
    player: Arc<dyn MusicPlayer>,
    counters: Arc<MusicCounters>,
}

#[async_trait]
impl Executor<SongRequest> for SongExecutor {
    async fn execute(&self, request: &Request<SongRequest>) -> Result<(), ExecError> {
        let track = &request.payload().track;
        self.counters.songs_played.fetch_add(1, Ordering::Relaxed);
        info!(target: "music", requester = request.requester(), "🎵 Now playing: {}", track.label());
        self.hub
            .emit(song_event(EventType::MusicSongStarted, request))
            .await;
        if self.player.play(track).await {
            Ok(())
        } else {
            Err(ExecError::Failed(format!("{} could not play {}", self.player.name(), track.label())))
        }
    }
}

fn limits(config: &MusicConfig) -> QueueLimits {
    QueueLimits {
        max_size: config.max_queue_size,
        max_per_requester: Some(config.max_requests_per_user),
        history_size: config.history_size,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MusicStats {
    pub enabled: bool,
    pub auto_play: bool,
    pub total_requests: u64,
    pub spotify_requests: u64,
    pub youtube_requests: u64,
    pub songs_played: u64,
    pub songs_skipped: u64,
    pub queue_size: usize,
    pub is_playing: bool,
    pub queue: QueueStats,
}

/// Viewer song requests: lookup through the configured resolvers, admission,
/// and one song at a time through a [`MusicPlayer`].
pub struct MusicManager {
    enabled: AtomicBool,
    started: AtomicBool,
    config: RwLock<MusicConfig>,
    hub: Arc<EventHandler>,
    resolvers: Vec<Arc<dyn TrackResolver>>,
    admission: Arc<MusicAdmission>,
    queue: Arc<RequestQueue<SongRequest>>,
    worker: QueueWorker<SongRequest>,
    counters: Arc<MusicCounters>,
    subscription: Mutex<Option<HandlerId>>,
}

impl MusicManager {
    /// `resolvers` are tried in order for searches.
    pub fn new(
        config: MusicConfig,
        resolvers: Vec<Arc<dyn TrackResolver>>,
        player: Arc<dyn MusicPlayer>,
        hub: Arc<EventHandler>,
    ) -> Self {
        let admission = Arc::new(MusicAdmission::new(&config));
        let queue = Arc::new(RequestQueue::new(
            "Music queue",
            limits(&config),
            admission.clone(),
        ));
        let counters = Arc::new(MusicCounters::default());
        let executor = Arc::new(SongExecutor {
            hub: hub.clone(),
            player,
            counters: counters.clone(),
        });
        let worker = QueueWorker::new("music", queue.clone(), executor, config.worker);
        Self {
            enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
            config: RwLock::new(config),
            hub,
            resolvers,
            admission,
            queue,
            worker,
            counters,
            subscription: Mutex::new(None),
        }
    }

    /// Catalog resolvers for each configured platform and the [`HoldPlayer`].
    pub fn from_config(config: MusicConfig, hub: Arc<EventHandler>) -> Self {
        let resolvers: Vec<Arc<dyn TrackResolver>> = config
            .platforms
            .iter()
            .map(|p| Arc::new(CatalogResolver::new(*p, &config.catalog)) as Arc<dyn TrackResolver>)
            .collect();
        info!(
            target: "music",
            platforms = ?config.platforms,
            catalog = config.catalog.len(),
            "🎵 Music system ready"
        );
        Self::new(config, resolvers, Arc::new(HoldPlayer), hub)
    }

    pub async fn register(self: &Arc<Self>) {
        let manager: Weak<Self> = Arc::downgrade(self);
        let id = self.hub.subscribe(EventType::Command, "music_commands", move |event| {
            let manager = manager.clone();
            async move {
                match manager.upgrade() {
                    Some(manager) => manager.on_command(&event).await,
                    None => Ok(()),
                }
            }
        });
        *self.subscription.lock().await = Some(id);
    }

    pub async fn unregister(&self) {
        if let Some(id) = self.subscription.lock().await.take() {
            self.hub.unsubscribe(EventType::Command, id);
        }
    }

    /// Starts playback when auto-play is on.
    pub async fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        if self.config.read().await.auto_play {
            self.worker.start().await;
        }
    }

    pub async fn stop(&self, timeout: Duration) {
        self.started.store(false, Ordering::SeqCst);
        self.worker.stop(timeout).await;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub async fn is_admin(&self, username: &str) -> bool {
        self.config.read().await.admin_users.iter().any(|u| u == username)
    }

    pub async fn add_admin_user(&self, username: &str) {
        let mut config = self.config.write().await;
        if !config.admin_users.iter().any(|u| u == username) {
            config.admin_users.push(username.to_string());
        }
    }

    pub async fn remove_admin_user(&self, username: &str) {
        self.config.write().await.admin_users.retain(|u| u != username);
    }

    async fn on_command(&self, event: &Event) -> HandlerResult {
        let Some(command) = event.get_str("command").map(str::to_lowercase) else {
            return Ok(());
        };
        let username = event.get_str("username").unwrap_or_default();
        let nickname = event.display_name();
        let args: Vec<&str> = event
            .get_list("args")
            .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        match command.as_str() {
            c if REQUEST_COMMANDS.contains(&c) => {
                if args.is_empty() {
                    return Ok(());
                }
                let result = self.request_song(&args.join(" "), username, nickname).await;
                match &result.error {
                    None => info!(target: "music", nickname, "🎵 Request queued at position {:?}", result.position),
                    Some(error) => warn!(target: "music", nickname, "🎵 Request refused: {}", error),
                }
            }
            "!queue" => {
                for line in self.queue_summary(3).await {
                    info!(target: "music", "🎵 {}", line);
                }
            }
            "!skip" => {
                let allowed = self.is_admin(username).await
                    || self
                        .queue
                        .current()
                        .await
                        .map(|current| current.requester() == username)
                        .unwrap_or(false);
                if allowed {
                    self.skip_current_song(&format!("skipped by {}", username)).await;
                } else {
                    debug!(target: "music", username, "Skip refused");
                }
            }
            "!clearqueue" => {
                if self.is_admin(username).await {
                    let cleared = self.clear_queue().await;
                    info!(target: "music", username, cleared, "🎵 Queue cleared");
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Resolves `query` (a link or search words) and queues the first
    /// acceptable track.
    pub async fn request_song(&self, query: &str, requester: &str, nickname: &str) -> SubmitResult {
        if !self.is_enabled() {
            return SubmitResult::rejected(Rejection::Disabled {
                label: "Music".to_string(),
            });
        }
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        let track = if is_url(query) {
            self.resolve_url(query.trim()).await
        } else {
            self.search_first(query).await
        };
        let track = match track {
            Ok(track) => track,
            Err(rejection) => return SubmitResult::rejected(rejection),
        };

        let platform = track.platform;
        let song = SongRequest {
            track,
            nickname: nickname.to_string(),
        };
        // The worker may pop the request before this returns, so the event is
        // built from the submitted song rather than looked up in the queue.
        let result = self.queue.submit(song.clone(), requester, Priority::Normal).await;
        if let (true, Some(request_id)) = (result.success, result.request_id) {
            match platform {
                Platform::Spotify => self.counters.spotify_requests.fetch_add(1, Ordering::Relaxed),
                Platform::Youtube => self.counters.youtube_requests.fetch_add(1, Ordering::Relaxed),
            };
            let event = request_event(EventType::MusicRequestAdded, request_id, requester, &song)
                .with("position", result.position);
            self.hub.emit(event).await;
        }
        result
    }

    async fn resolve_url(&self, url: &str) -> Result<TrackInfo, Rejection> {
        let Some(resolver) = self.resolvers.iter().find(|r| r.handles_url(url)) else {
            return Err(Rejection::invalid("Unsupported link"));
        };
        match resolver.resolve_url(url).await {
            Ok(Some(track)) => Ok(track),
            Ok(None) => Err(Rejection::invalid(format!(
                "{} track not found",
                resolver.platform()
            ))),
            Err(e) => {
                warn!(target: "music", "{}", e);
                Err(Rejection::invalid(format!(
                    "{} track not found",
                    resolver.platform()
                )))
            }
        }
    }

    /// First hit across resolvers. An explicit hit falls through to the next
    /// resolver when explicit content is not allowed.
    async fn search_first(&self, query: &str) -> Result<TrackInfo, Rejection> {
        let allow_explicit = self.config.read().await.allow_explicit;
        let mut saw_explicit = false;
        for resolver in &self.resolvers {
            let hit = match resolver.search(query, 1).await {
                Ok(tracks) => tracks.into_iter().next(),
                Err(e) => {
                    warn!(target: "music", "{}", e);
                    continue;
                }
            };
            match hit {
                Some(track) if track.explicit && !allow_explicit => saw_explicit = true,
                Some(track) => return Ok(track),
                None => {}
            }
        }
        if self.resolvers.is_empty() {
            Err(Rejection::invalid("No music platform available"))
        } else if saw_explicit {
            Err(Rejection::invalid("Explicit content is not allowed"))
        } else {
            Err(Rejection::invalid("No matching song found"))
        }
    }

    /// Search without queueing. `platform` restricts the lookup to one
    /// resolver.
    pub async fn search_music(&self, query: &str, platform: Option<Platform>, limit: usize) -> Vec<TrackInfo> {
        let mut found = Vec::new();
        for resolver in self
            .resolvers
            .iter()
            .filter(|r| platform.map_or(true, |p| r.platform() == p))
        {
            match resolver.search(query, limit).await {
                Ok(tracks) => found.extend(tracks),
                Err(e) => warn!(target: "music", "{}", e),
            }
        }
        found.truncate(limit);
        found
    }

    /// Ends the current song. With auto-play on, the next song starts
    /// immediately.
    pub async fn skip_current_song(&self, reason: &str) -> Option<Request<SongRequest>> {
        let skipped = self.queue.skip_current(reason).await?;
        self.counters.songs_skipped.fetch_add(1, Ordering::Relaxed);
        info!(target: "music", reason, "🎵 Skipped: {}", skipped.payload().track.label());
        Some(skipped)
    }

    /// Manual advance for when auto-play is off. Completes the current song,
    /// announces the next one and leaves it playing until the next call.
    pub async fn play_next(&self) -> Option<Request<SongRequest>> {
        if self.worker.is_running() {
            debug!(target: "music", "play_next ignored while auto-play is running");
            return None;
        }
        let dispatched = self.queue.try_next().await?;
        self.counters.songs_played.fetch_add(1, Ordering::Relaxed);
        self.hub
            .emit(song_event(EventType::MusicSongStarted, &dispatched.request))
            .await;
        Some(dispatched.request)
    }

    pub async fn clear_queue(&self) -> usize {
        self.queue.clear().await
    }

    pub async fn remove_request(&self, id: uuid::Uuid, requester: Option<&str>) -> bool {
        self.queue.remove(id, requester).await.is_ok()
    }

    pub async fn now_playing(&self) -> Option<Request<SongRequest>> {
        self.queue.current().await
    }

    pub async fn queue_info(&self) -> QueueSnapshot<SongRequest> {
        self.queue.snapshot().await
    }

    /// Now playing plus the next `upcoming` songs, one line each.
    pub async fn queue_summary(&self, upcoming: usize) -> Vec<String> {
        let snapshot = self.queue.snapshot().await;
        let mut lines = Vec::new();
        if let Some(current) = &snapshot.current {
            lines.push(format!("Now playing: {}", current.payload().track.label()));
        }
        lines.extend(
            snapshot
                .pending
                .iter()
                .take(upcoming)
                .enumerate()
                .map(|(i, r)| format!("{}. {}", i + 1, r.payload().track.label())),
        );
        if lines.is_empty() {
            lines.push("Queue is empty".to_string());
        }
        lines
    }

    pub async fn user_requests(&self, username: &str) -> Vec<Request<SongRequest>> {
        self.queue.requests_of(username).await
    }

    pub async fn history(&self, limit: usize) -> Vec<Request<SongRequest>> {
        self.queue.history(limit).await
    }

    pub fn queue(&self) -> &Arc<RequestQueue<SongRequest>> {
        &self.queue
    }

    /// Applies runtime overrides. Switching `auto_play` starts or stops the
    /// playback loop of a started manager.
    pub async fn update_settings(&self, update: &SettingsUpdate) -> SettingsReport {
        let (report, auto_play) = {
            let mut config = self.config.write().await;
            let report = config.apply_settings(update);
            self.admission.update(&config);
            self.queue.set_limits(limits(&config)).await;
            (report, config.auto_play)
        };
        if self.started.load(Ordering::SeqCst) && auto_play != self.worker.is_running() {
            if auto_play {
                self.worker.start().await;
            } else {
                self.worker.stop(Duration::from_secs(1)).await;
                self.queue.reopen().await;
            }
        }
        report
    }

    pub async fn stats(&self) -> MusicStats {
        MusicStats {
            enabled: self.is_enabled(),
            auto_play: self.config.read().await.auto_play,
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            spotify_requests: self.counters.spotify_requests.load(Ordering::Relaxed),
            youtube_requests: self.counters.youtube_requests.load(Ordering::Relaxed),
            songs_played: self.counters.songs_played.load(Ordering::Relaxed),
            songs_skipped: self.counters.songs_skipped.load(Ordering::Relaxed),
            queue_size: self.queue.len().await,
            is_playing: self.queue.current().await.is_some(),
            queue: self.queue.stats().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{music::resolver::MockTrackResolver, queue::RequestStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn track(title: &str, artist: &str, secs: u64, platform: Platform) -> TrackInfo {
        TrackInfo::new(title, artist, Duration::from_secs(secs), platform)
    }

    fn catalog() -> Vec<TrackInfo> {
        vec![
            track("Blinding Lights", "The Weeknd", 200, Platform::Spotify)
                .url("https://open.spotify.com/track/0VjIjW4GlUZAMYd2vXMi3b"),
            track("Dirty Song", "Rude Band", 180, Platform::Spotify).explicit(true),
            track("Dirty Song", "Rude Band (clean)", 180, Platform::Youtube),
            track("Epic Mix", "DJ Long", 3600, Platform::Youtube),
            track("Lofi Beats", "Chill Cat", 150, Platform::Youtube)
                .url("https://www.youtube.com/watch?v=abcdefghijk"),
        ]
    }

    fn manager_with(configure: impl FnOnce(&mut MusicConfig)) -> (Arc<EventHandler>, Arc<MusicManager>) {
        let mut config = MusicConfig {
            catalog: catalog(),
            ..Default::default()
        };
        config.worker.pause_between = Duration::from_millis(1);
        configure(&mut config);
        let hub = Arc::new(EventHandler::new());
        let manager = Arc::new(MusicManager::from_config(config, hub.clone()));
        (hub, manager)
    }

    #[tokio::test]
    async fn test_search_request_emits_added_event() {
        let (hub, manager) = manager_with(|_| {});
        let result = manager.request_song("blinding lights", "alice", "Alice").await;
        assert!(result.success);
        assert_eq!(result.position, Some(1));

        let added = hub.history(Some(EventType::MusicRequestAdded), 10).await;
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].get_str("title"), Some("Blinding Lights"));
        assert_eq!(added[0].get_str("platform"), Some("spotify"));
        assert_eq!(added[0].get_i64("position"), Some(1));
        assert_eq!(manager.stats().await.spotify_requests, 1);
    }

    #[tokio::test]
    async fn test_url_request() {
        let (_hub, manager) = manager_with(|_| {});
        let result = manager
            .request_song("https://youtu.be/abcdefghijk", "bob", "Bob")
            .await;
        assert!(result.success);
        let unknown = manager
            .request_song("https://youtu.be/zzzzzzzzzzz", "bob", "Bob")
            .await;
        assert_eq!(unknown.error.as_deref(), Some("youtube track not found"));
        let other = manager.request_song("https://example.com/x", "bob", "Bob").await;
        assert_eq!(other.error.as_deref(), Some("Unsupported link"));
    }

    #[tokio::test]
    async fn test_explicit_falls_back_to_next_platform() {
        let (_hub, manager) = manager_with(|_| {});
        assert!(manager.request_song("dirty song", "carol", "Carol").await.success);
        let queued = manager.queue_info().await.pending;
        assert_eq!(queued[0].payload().track.platform, Platform::Youtube);
        assert_eq!(queued[0].payload().track.artist, "Rude Band (clean)");
    }

    #[tokio::test]
    async fn test_admission_rules() {
        let (_hub, manager) = manager_with(|config| config.blocked_keywords = vec!["LOFI".into()]);
        let long = manager.request_song("epic mix", "dave", "Dave").await;
        assert_eq!(long.error.as_deref(), Some("Song too long (max 10 minutes)"));
        let blocked = manager.request_song("lofi beats", "dave", "Dave").await;
        assert_eq!(blocked.error.as_deref(), Some("Request contains blocked content"));
        let missing = manager.request_song("nothing like this", "dave", "Dave").await;
        assert_eq!(missing.error.as_deref(), Some("No matching song found"));
        assert_eq!(manager.queue().len().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected() {
        let (_hub, manager) = manager_with(|_| {});
        assert!(manager.request_song("blinding lights", "a", "A").await.success);
        let again = manager.request_song("weeknd", "b", "B").await;
        assert!(!again.success);
        assert_eq!(
            again.error.as_deref(),
            Some("Already in queue: Blinding Lights - The Weeknd")
        );
        assert_eq!(manager.queue().len().await, 1);
    }

    #[tokio::test]
    async fn test_commands_skip_and_clear() {
        let (hub, manager) = manager_with(|config| {
            config.auto_play = false;
            config.admin_users = vec!["mod".into()];
        });
        manager.register().await;

        let command = |user: &str, name: &str, args: Vec<String>| {
            Event::new(EventType::Command)
                .with("username", user)
                .with("command", name)
                .with("args", args)
        };
        hub.emit(command("alice", "!song", vec!["blinding".into(), "lights".into()])).await;
        hub.emit(command("bob", "!play", vec!["lofi".into()])).await;
        assert_eq!(manager.queue().len().await, 2);

        let playing = manager.play_next().await.unwrap();
        assert_eq!(playing.requester(), "alice");
        assert_eq!(hub.history(Some(EventType::MusicSongStarted), 10).await.len(), 1);

        hub.emit(command("bob", "!skip", vec![])).await;
        assert!(manager.now_playing().await.is_some());
        hub.emit(command("alice", "!skip", vec![])).await;
        assert!(manager.now_playing().await.is_none());
        assert_eq!(manager.history(10).await[0].status(), RequestStatus::Skipped);

        hub.emit(command("bob", "!clearqueue", vec![])).await;
        assert_eq!(manager.queue().len().await, 1);
        hub.emit(command("mod", "!clearqueue", vec![])).await;
        assert_eq!(manager.queue().len().await, 0);
        assert_eq!(manager.stats().await.songs_skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_play_holds_for_track_duration() {
        let (hub, manager) = manager_with(|_| {});
        manager.start().await;
        manager.request_song("lofi", "alice", "Alice").await;
        manager.request_song("blinding", "bob", "Bob").await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(manager.now_playing().await.unwrap().requester(), "alice");

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(manager.now_playing().await.unwrap().requester(), "bob");
        assert_eq!(hub.history(Some(EventType::MusicSongStarted), 10).await.len(), 2);

        manager.skip_current_song("test").await;
        manager.stop(Duration::from_secs(1)).await;
        let stats = manager.stats().await;
        assert_eq!(stats.songs_played, 2);
        assert_eq!(stats.queue.completed, 1);
        assert_eq!(stats.queue.skipped, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_added_event_survives_immediate_playback() {
        for _ in 0..20 {
            let (hub, manager) = manager_with(|_| {});
            manager.start().await;
            let result = manager.request_song("lofi", "alice", "Alice").await;
            assert!(result.success);

            let added = hub.history(Some(EventType::MusicRequestAdded), 10).await;
            assert_eq!(added.len(), 1);
            assert_eq!(
                added[0].get_str("request_id"),
                result.request_id.map(|id| id.to_string()).as_deref()
            );
            assert_eq!(added[0].get_str("username"), Some("alice"));
            assert_eq!(added[0].get_str("title"), Some("Lofi Beats"));
            manager.stop(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_resolver_errors_fall_through() {
        let mut broken = MockTrackResolver::new();
        broken.expect_platform().return_const(Platform::Spotify);
        broken.expect_search().returning(|_, _| {
            Err(crate::music::MusicError::Lookup {
                platform: Platform::Spotify,
                message: "offline".into(),
            })
        });
        let fallback = CatalogResolver::new(Platform::Youtube, &catalog());
        let manager = MusicManager::new(
            MusicConfig::default(),
            vec![Arc::new(broken), Arc::new(fallback)],
            Arc::new(HoldPlayer),
            Arc::new(EventHandler::new()),
        );
        let result = manager.request_song("lofi beats", "erin", "Erin").await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_settings_and_quota() {
        let (_hub, manager) = manager_with(|_| {});
        let report = manager
            .update_settings(json!({"max_requests_per_user": 1, "bogus": 1}).as_object().unwrap())
            .await;
        assert_eq!(report.applied, vec!["max_requests_per_user".to_string()]);
        assert_eq!(report.ignored, vec!["bogus".to_string()]);

        assert!(manager.request_song("blinding", "frank", "Frank").await.success);
        let second = manager.request_song("lofi", "frank", "Frank").await;
        assert_eq!(second.error.as_deref(), Some("frank already has 1 requests in queue"));

        manager.set_enabled(false);
        assert_eq!(
            manager.request_song("lofi", "gina", "Gina").await.error.as_deref(),
            Some("Music is disabled")
        );
    }
}
