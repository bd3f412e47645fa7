use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::{
    config::{GoalConfig, GoalKind, OverlayConfig},
    event::{Event, EventHandler, EventType, HandlerId, HandlerResult},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatLine {
    pub username: String,
    pub nickname: String,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Goal {
    pub id: String,
    pub label: String,
    pub kind: GoalKind,
    pub target: u64,
    pub current: u64,
    pub active: bool,
    pub completed: bool,
}

impl From<&GoalConfig> for Goal {
    fn from(config: &GoalConfig) -> Self {
        Self {
            id: config.id.clone(),
            label: config.label.clone(),
            kind: config.kind,
            target: config.target.max(1),
            current: 0,
            active: config.active,
            completed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub requester: String,
    pub duration_secs: i64,
}

/// One update on the overlay feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OverlayMessage {
    NewComment(ChatLine),
    NewGift {
        username: String,
        nickname: String,
        gift_name: String,
        gift_count: i64,
    },
    NewFollow {
        username: String,
        nickname: String,
    },
    GoalUpdate(Goal),
    GoalCompleted(Goal),
    NowPlaying(NowPlaying),
    StatsUpdate(serde_json::Value),
}

impl OverlayMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OverlayMessage::NewComment(_) => "new_comment",
            OverlayMessage::NewGift { .. } => "new_gift",
            OverlayMessage::NewFollow { .. } => "new_follow",
            OverlayMessage::GoalUpdate(_) => "goal_update",
            OverlayMessage::GoalCompleted(_) => "goal_completed",
            OverlayMessage::NowPlaying(_) => "now_playing",
            OverlayMessage::StatsUpdate(_) => "stats_update",
        }
    }
}

/// Everything a freshly connected overlay needs to draw itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlaySnapshot {
    pub recent_chat: Vec<ChatLine>,
    pub goals: Vec<Goal>,
    pub now_playing: Option<NowPlaying>,
    pub stats: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverlayStats {
    pub messages_published: u64,
    pub subscribers: usize,
    pub goals_created: u64,
    pub goals_completed: u64,
}

#[derive(Debug)]
struct OverlayState {
    recent_chat: VecDeque<ChatLine>,
    goals: Vec<Goal>,
    now_playing: Option<NowPlaying>,
    stats: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
struct OverlayCounters {
    messages_published: AtomicU64,
    goals_created: AtomicU64,
    goals_completed: AtomicU64,
}

const SUBSCRIBED: [EventType; 5] = [
    EventType::Comment,
    EventType::Gift,
    EventType::Follow,
    EventType::Like,
    EventType::MusicSongStarted,
];

pub struct OverlayManager {
    max_recent_messages: usize,
    state: Mutex<OverlayState>,
    feed: broadcast::Sender<OverlayMessage>,
    hub: Arc<EventHandler>,
    counters: OverlayCounters,
    subscriptions: Mutex<Vec<(EventType, HandlerId)>>,
}

impl OverlayManager {
    pub fn new(config: &OverlayConfig, hub: Arc<EventHandler>) -> Self {
        let (feed, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let goals: Vec<Goal> = config.goals.iter().map(Goal::from).collect();
        let counters = OverlayCounters::default();
        counters
            .goals_created
            .store(goals.len() as u64, Ordering::Relaxed);
        Self {
            max_recent_messages: config.max_recent_messages.max(1),
            state: Mutex::new(OverlayState {
                recent_chat: VecDeque::new(),
                goals,
                now_playing: None,
                stats: None,
            }),
            feed,
            hub,
            counters,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub async fn register(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock().await;
        for event_type in SUBSCRIBED {
            let manager: Weak<Self> = Arc::downgrade(self);
            let id = self.hub.subscribe(event_type, "overlay", move |event| {
                let manager = manager.clone();
                async move {
                    match manager.upgrade() {
                        Some(manager) => manager.on_event(&event).await,
                        None => Ok(()),
                    }
                }
            });
            subscriptions.push((event_type, id));
        }
        info!(target: "overlay", "Overlay handlers registered");
    }

    pub async fn unregister(&self) {
        for (event_type, id) in self.subscriptions.lock().await.drain(..) {
            self.hub.unsubscribe(event_type, id);
        }
    }

    /// Live feed of overlay updates. Slow readers see `Lagged` errors and
    /// should resync from [`OverlayManager::snapshot`].
    pub fn subscribe(&self) -> BroadcastStream<OverlayMessage> {
        BroadcastStream::new(self.feed.subscribe())
    }

    async fn on_event(&self, event: &Event) -> HandlerResult {
        let username = event.get_str("username").unwrap_or_default().to_string();
        let nickname = event.display_name().to_string();
        match event.event_type() {
            EventType::Comment => {
                let line = ChatLine {
                    username,
                    nickname,
                    comment: event.get_str("comment").unwrap_or_default().to_string(),
                    timestamp: event.timestamp(),
                };
                {
                    let mut state = self.state.lock().await;
                    while state.recent_chat.len() >= self.max_recent_messages {
                        state.recent_chat.pop_front();
                    }
                    state.recent_chat.push_back(line.clone());
                }
                self.publish(OverlayMessage::NewComment(line)).await;
                self.update_goal_progress(GoalKind::Messages, 1).await;
            }
            EventType::Gift => {
                let gift_count = event.get_i64("gift_count").unwrap_or(1).max(1);
                self.publish(OverlayMessage::NewGift {
                    username,
                    nickname,
                    gift_name: event.get_str("gift_name").unwrap_or_default().to_string(),
                    gift_count,
                })
                .await;
                self.update_goal_progress(GoalKind::Gifts, gift_count as u64).await;
            }
            EventType::Follow => {
                self.publish(OverlayMessage::NewFollow { username, nickname }).await;
                self.update_goal_progress(GoalKind::Followers, 1).await;
            }
            EventType::Like => {
                let likes = event.get_i64("like_count").unwrap_or(1).max(1);
                self.update_goal_progress(GoalKind::Likes, likes as u64).await;
            }
            EventType::MusicSongStarted => {
                let song = NowPlaying {
                    title: event.get_str("title").unwrap_or_default().to_string(),
                    artist: event.get_str("artist").unwrap_or_default().to_string(),
                    requester: nickname,
                    duration_secs: event.get_i64("duration").unwrap_or(0),
                };
                self.state.lock().await.now_playing = Some(song.clone());
                self.publish(OverlayMessage::NowPlaying(song)).await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Sends `message` to feed subscribers and announces it on the hub as
    /// OVERLAY_UPDATE.
    pub async fn publish(&self, message: OverlayMessage) {
        let kind = message.kind();
        let goal_id = match &message {
            OverlayMessage::GoalUpdate(goal) | OverlayMessage::GoalCompleted(goal) => Some(goal.id.clone()),
            _ => None,
        };
        // No subscribers is fine; the snapshot still has the state.
        let receivers = self.feed.send(message).unwrap_or(0);
        self.counters.messages_published.fetch_add(1, Ordering::Relaxed);
        debug!(target: "overlay", kind, receivers, "Overlay update");

        self.hub
            .emit(
                Event::new(EventType::OverlayUpdate)
                    .with("kind", kind)
                    .with("goal_id", goal_id),
            )
            .await;
    }

    /// Adds progress to the active goals of `kind`. A goal reaching its
    /// target is completed once and the next inactive goal of the same kind
    /// takes over.
    pub async fn update_goal_progress(&self, kind: GoalKind, increment: u64) {
        let mut messages = Vec::new();
        {
            let mut state = self.state.lock().await;
            let mut completed_any = false;
            for goal in state.goals.iter_mut().filter(|g| g.kind == kind && g.active) {
                goal.current = goal.current.saturating_add(increment);
                if goal.current >= goal.target {
                    goal.completed = true;
                    goal.active = false;
                    completed_any = true;
                    info!(target: "overlay", goal = %goal.label, "🎯 Goal reached");
                    messages.push(OverlayMessage::GoalCompleted(goal.clone()));
                }
                messages.push(OverlayMessage::GoalUpdate(goal.clone()));
            }
            if completed_any {
                if let Some(next) = state
                    .goals
                    .iter_mut()
                    .find(|g| g.kind == kind && !g.active && !g.completed)
                {
                    next.active = true;
                    next.current = 0;
                    info!(target: "overlay", goal = %next.label, "🎯 Next goal active");
                    messages.push(OverlayMessage::GoalUpdate(next.clone()));
                }
            }
        }
        for message in messages {
            if matches!(message, OverlayMessage::GoalCompleted(_)) {
                self.counters.goals_completed.fetch_add(1, Ordering::Relaxed);
            }
            self.publish(message).await;
        }
    }

    /// Adds an active goal and deactivates the other goals of its kind.
    pub async fn create_custom_goal(&self, label: &str, kind: GoalKind, target: u64, id: Option<&str>) -> String {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| format!("custom_{}_{}", kind, target));
        let goal = Goal {
            id: id.clone(),
            label: label.to_string(),
            kind,
            target: target.max(1),
            current: 0,
            active: true,
            completed: false,
        };
        {
            let mut state = self.state.lock().await;
            for existing in state.goals.iter_mut().filter(|g| g.kind == kind) {
                existing.active = false;
            }
            state.goals.retain(|g| g.id != id);
            state.goals.push(goal.clone());
        }
        self.counters.goals_created.fetch_add(1, Ordering::Relaxed);
        self.publish(OverlayMessage::GoalUpdate(goal)).await;
        id
    }

    /// Publishes bot statistics. An `uptime_seconds` field gains a formatted
    /// `uptime` (`HH:MM:SS`) next to it.
    pub async fn update_stats(&self, mut stats: serde_json::Value) {
        if let Some(secs) = stats.get("uptime_seconds").and_then(|v| v.as_u64()) {
            stats["uptime"] = serde_json::Value::String(format!(
                "{:02}:{:02}:{:02}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            ));
        }
        self.state.lock().await.stats = Some(stats.clone());
        self.publish(OverlayMessage::StatsUpdate(stats)).await;
    }

    pub async fn active_goals(&self) -> Vec<Goal> {
        self.state
            .lock()
            .await
            .goals
            .iter()
            .filter(|g| g.active)
            .cloned()
            .collect()
    }

    pub async fn completed_goals(&self) -> Vec<Goal> {
        self.state
            .lock()
            .await
            .goals
            .iter()
            .filter(|g| g.completed)
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> OverlaySnapshot {
        let state = self.state.lock().await;
        OverlaySnapshot {
            recent_chat: state.recent_chat.iter().cloned().collect(),
            goals: state.goals.clone(),
            now_playing: state.now_playing.clone(),
            stats: state.stats.clone(),
        }
    }

    pub fn stats(&self) -> OverlayStats {
        OverlayStats {
            messages_published: self.counters.messages_published.load(Ordering::Relaxed),
            subscribers: self.feed.receiver_count(),
            goals_created: self.counters.goals_created.load(Ordering::Relaxed),
            goals_completed: self.counters.goals_completed.load(Ordering::Relaxed),
        }
    }
}
