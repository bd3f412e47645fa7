use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Weak,
};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    config::{AiConfig, SettingsReport, SettingsUpdate},
    event::{Event, EventHandler, EventType, HandlerId, HandlerResult},
    queue::CooldownGate,
};

use super::{
    client::{ChatClient, HttpChatClient},
    conversation::ConversationContext,
};

const REPLY_COOLDOWN_KEY: &str = "chat_reply";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReplyTrigger {
    Comment,
    Gift,
    Follow,
    Question,
}

/// Canned replies used when no chat service is available.
pub fn heuristic_reply(text: &str, nickname: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.iter().any(|w| matches!(*w, "hello" | "hi" | "hey")) {
        Some(format!("Hi {}! Welcome to the stream 👋", nickname))
    } else if lower.contains("thank") || words.contains(&"thx") {
        Some(format!("You're welcome, {}! 😊", nickname))
    } else if lower.contains('?') {
        Some(format!("Good question, {}! Let's see what chat thinks 🤔", nickname))
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct AiCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    heuristic: AtomicU64,
    context_updates: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiStats {
    pub enabled: bool,
    pub client_available: bool,
    pub total_responses: u64,
    pub successful_responses: u64,
    pub failed_responses: u64,
    pub heuristic_responses: u64,
    pub context_updates: u64,
    pub conversation_messages: usize,
    pub known_users: usize,
}

/// Chat replies from an external chat service, or from local heuristics when
/// the service is not configured.
pub struct AiManager {
    enabled: AtomicBool,
    config: RwLock<AiConfig>,
    client: Option<Arc<dyn ChatClient>>,
    conversation: Mutex<ConversationContext>,
    cooldown: CooldownGate,
    hub: Arc<EventHandler>,
    counters: AiCounters,
    subscriptions: Mutex<Vec<(EventType, HandlerId)>>,
}

impl AiManager {
    pub fn new(config: AiConfig, client: Option<Arc<dyn ChatClient>>, hub: Arc<EventHandler>) -> Self {
        let conversation = ConversationContext::new(config.max_history, config.context_window);
        Self {
            enabled: AtomicBool::new(true),
            config: RwLock::new(config),
            client,
            conversation: Mutex::new(conversation),
            cooldown: CooldownGate::new(),
            hub,
            counters: AiCounters::default(),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Connects to the configured service. An unreachable or missing service
    /// leaves the manager in heuristic mode.
    pub async fn initialize(config: AiConfig, hub: Arc<EventHandler>) -> Self {
        let client = match config.server_url.as_deref() {
            None => {
                info!(target: "ai", "🤖 No chat service configured, using local replies");
                None
            }
            Some(url) => {
                match HttpChatClient::new(url, config.api_key.clone(), config.request_timeout) {
                    Ok(client) => match client.probe().await {
                        Ok(()) => Some(Arc::new(client) as Arc<dyn ChatClient>),
                        Err(e) => {
                            warn!(target: "ai", "Chat service unavailable, using local replies: {}", e);
                            None
                        }
                    },
                    Err(e) => {
                        warn!(target: "ai", "Chat client setup failed, using local replies: {}", e);
                        None
                    }
                }
            }
        };
        Self::new(config, client, hub)
    }

    pub async fn register(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock().await;
        for event_type in [EventType::Comment, EventType::Gift, EventType::Follow, EventType::Command] {
            let manager: Weak<Self> = Arc::downgrade(self);
            let id = self.hub.subscribe(event_type, "ai_replies", move |event| {
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
    }

    pub async fn unregister(&self) {
        for (event_type, id) in self.subscriptions.lock().await.drain(..) {
            self.hub.unsubscribe(event_type, id);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    async fn on_event(&self, event: &Event) -> HandlerResult {
        let username = event.get_str("username").unwrap_or_default();
        let nickname = event.display_name();
        match event.event_type() {
            EventType::Comment => {
                let comment = event.get_str("comment").unwrap_or_default();
                self.handle_comment(username, nickname, comment).await;
            }
            EventType::Gift => {
                let gift_name = event.get_str("gift_name").unwrap_or("gift");
                let count = event.get_i64("gift_count").unwrap_or(1);
                self.handle_gift(username, nickname, gift_name, count).await;
            }
            EventType::Follow => {
                self.handle_follow(username, nickname).await;
            }
            EventType::Command if event.get_str("command") == Some("!ai") => {
                let question = event
                    .get_list("args")
                    .map(|args| {
                        args.iter()
                            .filter_map(|a| a.as_str())
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                if question.is_empty() {
                    debug!(target: "ai", username, "!ai without a question");
                } else {
                    self.answer_question(username, nickname, &question).await;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Records the comment and replies to a random share of them, at most
    /// once per cooldown.
    pub async fn handle_comment(&self, username: &str, nickname: &str, comment: &str) -> Option<String> {
        self.conversation
            .lock()
            .await
            .record_comment(username, nickname, comment);
        self.counters.context_updates.fetch_add(1, Ordering::Relaxed);

        if !self.is_enabled() || comment.trim_start().starts_with('!') {
            return None;
        }
        let (rate, cooldown) = {
            let config = self.config.read().await;
            (config.response_rate, config.response_cooldown)
        };
        if rand::random::<f64>() >= rate || !self.cooldown.try_acquire(REPLY_COOLDOWN_KEY, cooldown) {
            return None;
        }

        let reply = match &self.client {
            Some(_) => self.ask(comment, "chat_reply", username).await,
            None => heuristic_reply(comment, nickname).map(|r| {
                self.counters.heuristic.fetch_add(1, Ordering::Relaxed);
                r
            }),
        }?;
        self.publish(username, nickname, &reply, ReplyTrigger::Comment).await;
        Some(reply)
    }

    pub async fn handle_gift(&self, username: &str, nickname: &str, gift_name: &str, count: i64) -> Option<String> {
        self.conversation
            .lock()
            .await
            .record_gift(username, nickname, gift_name, count);
        self.counters.context_updates.fetch_add(1, Ordering::Relaxed);

        if !self.is_enabled() || !self.config.read().await.respond_to_gifts || self.client.is_none() {
            return None;
        }
        let prompt = format!("{} sent {} x{}. Thank them warmly.", nickname, gift_name, count);
        let reply = self.ask(&prompt, "gift_thanks", username).await?;
        self.publish(username, nickname, &reply, ReplyTrigger::Gift).await;
        Some(reply)
    }

    pub async fn handle_follow(&self, username: &str, nickname: &str) -> Option<String> {
        self.conversation.lock().await.record_follow(username, nickname);
        self.counters.context_updates.fetch_add(1, Ordering::Relaxed);

        if !self.is_enabled() || !self.config.read().await.respond_to_follows || self.client.is_none() {
            return None;
        }
        let prompt = format!("{} just followed the stream. Welcome them.", nickname);
        let reply = self.ask(&prompt, "welcome_new_follower", username).await?;
        self.publish(username, nickname, &reply, ReplyTrigger::Follow).await;
        Some(reply)
    }

    /// `!ai <question>`: answered directly, without rate or cooldown.
    pub async fn answer_question(&self, username: &str, nickname: &str, question: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let reply = match &self.client {
            Some(_) => self.ask(question, "direct_question", username).await?,
            None => {
                self.counters.heuristic.fetch_add(1, Ordering::Relaxed);
                heuristic_reply(question, nickname)
                    .unwrap_or_else(|| format!("Sorry {}, AI answers are offline right now", nickname))
            }
        };
        self.publish(username, nickname, &reply, ReplyTrigger::Question).await;
        Some(reply)
    }

    async fn ask(&self, message: &str, action: &str, username: &str) -> Option<String> {
        let client = self.client.as_ref()?;
        let context = self.conversation.lock().await.to_request_context(action, username);
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        match client.send_message(message, &context).await {
            Ok(reply) => {
                self.counters.successful.fetch_add(1, Ordering::Relaxed);
                Some(reply)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(target: "ai", action, "Chat request failed: {}", e);
                None
            }
        }
    }

    async fn publish(&self, username: &str, nickname: &str, reply: &str, trigger: ReplyTrigger) {
        self.conversation.lock().await.record_reply(reply);
        info!(target: "ai", %trigger, nickname, "🤖 {}", reply);
        self.hub
            .emit(
                Event::new(EventType::AutoResponse)
                    .with("username", username)
                    .with("nickname", nickname)
                    .with("response", reply)
                    .with("source", "ai")
                    .with("trigger", trigger.as_ref()),
            )
            .await;
    }

    /// Applies runtime overrides; `enabled` toggles replies.
    pub async fn update_settings(&self, update: &SettingsUpdate) -> SettingsReport {
        let mut update = update.clone();
        let enabled = update.remove("enabled");
        let mut config = self.config.write().await;
        let mut report = config.apply_settings(&update);
        if let Some(value) = enabled {
            match value.as_bool() {
                Some(enabled) => {
                    self.set_enabled(enabled);
                    report.applied.push("enabled".to_string());
                }
                None => report.ignored.push("enabled".to_string()),
            }
        }
        self.conversation
            .lock()
            .await
            .set_context_window(config.context_window);
        report
    }

    pub async fn stats(&self) -> AiStats {
        let conversation = self.conversation.lock().await;
        AiStats {
            enabled: self.is_enabled(),
            client_available: self.has_client(),
            total_responses: self.counters.total.load(Ordering::Relaxed),
            successful_responses: self.counters.successful.load(Ordering::Relaxed),
            failed_responses: self.counters.failed.load(Ordering::Relaxed),
            heuristic_responses: self.counters.heuristic.load(Ordering::Relaxed),
            context_updates: self.counters.context_updates.load(Ordering::Relaxed),
            conversation_messages: conversation.len(),
            known_users: conversation.user_count(),
        }
    }
}
