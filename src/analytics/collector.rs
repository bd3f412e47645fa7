use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    path::PathBuf,
    sync::{Arc, Weak},
};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AnalyticsConfig,
    event::{Event, EventHandler, EventType, HandlerId, HandlerResult},
};

use super::AnalyticsResult;

const BOT_USERNAME: &str = "tikbot";

/// One collected event, reduced to what the reports need.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub nickname: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSession {
    pub session_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerActivity {
    pub username: String,
    pub nickname: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub session: Option<StreamSession>,
    pub events_collected: u64,
    pub event_counts: BTreeMap<String, u64>,
    pub unique_viewers: usize,
    pub top_chatters: Vec<ViewerActivity>,
    pub gift_totals: BTreeMap<String, i64>,
    pub events_per_minute: f64,
    pub recent_events: usize,
}

#[derive(Debug, Default)]
struct AnalyticsState {
    session: Option<StreamSession>,
    events: VecDeque<StreamEvent>,
    events_collected: u64,
    event_counts: HashMap<EventType, u64>,
    viewers: HashSet<String>,
    chatters: HashMap<String, ViewerActivity>,
    gift_totals: HashMap<String, i64>,
}

const SUBSCRIBED: [EventType; 9] = [
    EventType::Comment,
    EventType::Gift,
    EventType::Follow,
    EventType::Like,
    EventType::Join,
    EventType::Share,
    EventType::AutoResponse,
    EventType::MusicRequestAdded,
    EventType::Command,
];

/// In-memory stream statistics for the current session.
pub struct AnalyticsCollector {
    config: AnalyticsConfig,
    state: Mutex<AnalyticsState>,
    hub: Arc<EventHandler>,
    subscriptions: Mutex<Vec<(EventType, HandlerId)>>,
}

impl AnalyticsCollector {
    pub fn new(config: AnalyticsConfig, hub: Arc<EventHandler>) -> Self {
        Self {
            config,
            state: Mutex::new(AnalyticsState::default()),
            hub,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub async fn register(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock().await;
        for event_type in SUBSCRIBED {
            let collector: Weak<Self> = Arc::downgrade(self);
            let id = self.hub.subscribe(event_type, "analytics", move |event| {
                let collector = collector.clone();
                async move {
                    if let Some(collector) = collector.upgrade() {
                        collector.collect(&event).await;
                    }
                    Ok(()) as HandlerResult
                }
            });
            subscriptions.push((event_type, id));
        }
    }

    pub async fn unregister(&self) {
        for (event_type, id) in self.subscriptions.lock().await.drain(..) {
            self.hub.unsubscribe(event_type, id);
        }
    }

    /// Starts a new session, ending the previous one. Counters start over.
    pub async fn start_session(&self, title: &str) -> String {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let session_id = format!("session_{}", now.format("%Y%m%d_%H%M%S"));
        *state = AnalyticsState::default();
        state.session = Some(StreamSession {
            session_id: session_id.clone(),
            title: title.to_string(),
            start_time: now,
            end_time: None,
        });
        info!(target: "analytics", session = %session_id, "📊 Session started");
        session_id
    }

    pub async fn end_session(&self) -> Option<StreamSession> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let session = state.session.as_mut()?;
        if session.end_time.is_none() {
            let end = Utc::now();
            session.end_time = Some(end);
            info!(
                target: "analytics",
                session = %session.session_id,
                seconds = (end - session.start_time).num_seconds(),
                events = state.events_collected,
                "📊 Session ended"
            );
        }
        state.session.clone()
    }

    /// Counts one event. A session is opened on the first event if none is
    /// running. Commands other than `!ai` are not counted.
    pub async fn collect(&self, event: &Event) {
        let event_type = event.event_type();
        if event_type == EventType::Command && event.get_str("command") != Some("!ai") {
            return;
        }
        let needs_session = self
            .state
            .lock()
            .await
            .session
            .as_ref()
            .map_or(true, |s| s.end_time.is_some());
        if needs_session {
            self.start_session("").await;
        }

        let (username, nickname) = match event_type {
            EventType::AutoResponse => (BOT_USERNAME.to_string(), "TikBot".to_string()),
            _ => (
                event.get_str("username").unwrap_or_default().to_string(),
                event.display_name().to_string(),
            ),
        };

        let mut state = self.state.lock().await;
        let session_id = state
            .session
            .as_ref()
            .map(|s| s.session_id.clone())
            .unwrap_or_default();
        state.events_collected += 1;
        *state.event_counts.entry(event_type).or_insert(0) += 1;

        if event_type.is_platform() && !username.is_empty() {
            state.viewers.insert(username.clone());
        }
        match event_type {
            EventType::Comment if !username.is_empty() => {
                let activity = state
                    .chatters
                    .entry(username.clone())
                    .or_insert_with(|| ViewerActivity {
                        username: username.clone(),
                        nickname: nickname.clone(),
                        count: 0,
                    });
                activity.count += 1;
                activity.nickname = nickname.clone();
            }
            EventType::Gift => {
                let name = event.get_str("gift_name").unwrap_or("unknown").to_string();
                let count = event.get_i64("gift_count").unwrap_or(1);
                *state.gift_totals.entry(name).or_insert(0) += count;
            }
            _ => {}
        }

        while state.events.len() >= self.config.max_events.max(1) {
            state.events.pop_front();
        }
        state.events.push_back(StreamEvent {
            id: Uuid::new_v4(),
            event_type,
            timestamp: event.timestamp(),
            username,
            nickname,
            session_id,
        });
    }

    /// Most recent `limit` events, oldest first, optionally of one type.
    pub async fn recent_events(&self, event_type: Option<EventType>, limit: usize) -> Vec<StreamEvent> {
        let state = self.state.lock().await;
        let mut events: Vec<StreamEvent> = state
            .events
            .iter()
            .rev()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .take(limit)
            .cloned()
            .collect();
        events.reverse();
        events
    }

    pub async fn snapshot(&self) -> AnalyticsSnapshot {
        let state = self.state.lock().await;
        let mut top_chatters: Vec<ViewerActivity> = state.chatters.values().cloned().collect();
        top_chatters.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.username.cmp(&b.username)));
        top_chatters.truncate(self.config.top_n);

        let window_start = Utc::now() - ChronoDuration::seconds(60);
        let last_minute = state
            .events
            .iter()
            .rev()
            .take_while(|e| e.timestamp >= window_start)
            .count();

        AnalyticsSnapshot {
            session: state.session.clone(),
            events_collected: state.events_collected,
            event_counts: state
                .event_counts
                .iter()
                .map(|(t, c)| (t.to_string(), *c))
                .collect(),
            unique_viewers: state.viewers.len(),
            top_chatters,
            gift_totals: state.gift_totals.clone().into_iter().collect(),
            events_per_minute: last_minute as f64,
            recent_events: state.events.len(),
        }
    }

    /// Writes the snapshot and the recent event log as pretty JSON into the
    /// export directory and returns the file path.
    pub async fn export(&self) -> AnalyticsResult<PathBuf> {
        let snapshot = self.snapshot().await;
        let events = self.recent_events(None, self.config.max_events).await;
        let now = Utc::now();
        let session = snapshot
            .session
            .as_ref()
            .map_or("all".to_string(), |s| s.session_id.clone());
        let document = serde_json::json!({
            "session_id": session,
            "export_time": now.to_rfc3339(),
            "statistics": snapshot,
            "events": events,
        });

        tokio::fs::create_dir_all(&self.config.export_directory).await?;
        let path = self
            .config
            .export_directory
            .join(format!("export_{}_{}.json", session, now.format("%Y%m%d_%H%M%S")));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;
        info!(target: "analytics", path = %path.display(), "📊 Analytics exported");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collector(max_events: usize, export_directory: PathBuf) -> (Arc<EventHandler>, Arc<AnalyticsCollector>) {
        let hub = Arc::new(EventHandler::new());
        let config = AnalyticsConfig {
            max_events,
            top_n: 2,
            export_directory,
        };
        (hub.clone(), Arc::new(AnalyticsCollector::new(config, hub)))
    }

    #[tokio::test]
    async fn test_counters_and_top_chatters() {
        let (hub, analytics) = collector(100, PathBuf::from("unused"));
        analytics.register().await;

        for (user, n) in [("ann", 3), ("bob", 1), ("cid", 2)] {
            for i in 0..n {
                hub.emit(Event::comment(user, &user.to_uppercase(), &format!("hi {}", i), "1")).await;
            }
        }
        hub.emit(Event::gift("dee", "DEE", "Rose", 5, 1)).await;
        hub.emit(Event::gift("ann", "ANN", "Rose", 2, 1)).await;
        hub.emit(Event::new(EventType::Command).with("command", "!help").with("username", "ann")).await;
        hub.emit(Event::new(EventType::AutoResponse).with("response", "hey")).await;

        let snapshot = analytics.snapshot().await;
        assert!(snapshot.session.is_some());
        assert_eq!(snapshot.events_collected, 9);
        assert_eq!(snapshot.event_counts["comment"], 6);
        assert_eq!(snapshot.event_counts["auto_response"], 1);
        assert!(!snapshot.event_counts.contains_key("command"));
        assert_eq!(snapshot.unique_viewers, 4);
        let top: Vec<(&str, u64)> = snapshot
            .top_chatters
            .iter()
            .map(|a| (a.username.as_str(), a.count))
            .collect();
        assert_eq!(top, vec![("ann", 3), ("cid", 2)]);
        assert_eq!(snapshot.gift_totals["Rose"], 7);
        assert_eq!(snapshot.events_per_minute, 9.0);
    }

    #[tokio::test]
    async fn test_event_log_is_bounded() {
        let (_hub, analytics) = collector(3, PathBuf::from("unused"));
        for i in 0..5 {
            analytics.collect(&Event::follow(&format!("f{}", i), "F", "1")).await;
        }
        let recent = analytics.recent_events(None, 10).await;
        let names: Vec<&str> = recent.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, vec!["f2", "f3", "f4"]);
        assert_eq!(analytics.snapshot().await.events_collected, 5);
    }

    #[tokio::test]
    async fn test_sessions_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let (_hub, analytics) = collector(10, dir.path().join("exports"));
        let id = analytics.start_session("evening").await;
        analytics.collect(&Event::comment("a", "A", "hello", "1")).await;

        let path = analytics.export().await.unwrap();
        assert!(path.starts_with(dir.path().join("exports")));
        let exported: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(exported["session_id"], id.as_str());
        assert_eq!(exported["statistics"]["session"]["title"], "evening");
        assert_eq!(exported["events"].as_array().unwrap().len(), 1);

        let ended = analytics.end_session().await.unwrap();
        assert!(ended.end_time.is_some());
        analytics.collect(&Event::comment("b", "B", "late", "2")).await;
        assert_eq!(analytics.snapshot().await.events_collected, 1);
    }
}
