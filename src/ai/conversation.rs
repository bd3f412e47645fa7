use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    UserComment,
    SystemMessage,
    AiReply,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    pub kind: MessageKind,
    pub content: String,
    pub username: String,
    pub nickname: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub username: String,
    pub nickname: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub message_count: u64,
    pub total_gifts: i64,
    pub is_follower: bool,
}

impl UserProfile {
    fn new(username: &str, nickname: &str) -> Self {
        let now = Utc::now();
        Self {
            username: username.to_string(),
            nickname: nickname.to_string(),
            first_seen: now,
            last_seen: now,
            message_count: 0,
            total_gifts: 0,
            is_follower: false,
        }
    }
}

pub const BOT_USERNAME: &str = "tikbot_ai";

/// Rolling chat history plus per-viewer profiles, sent along with every
/// request to the chat service.
#[derive(Debug)]
pub struct ConversationContext {
    max_history: usize,
    context_window: usize,
    messages: VecDeque<ConversationMessage>,
    profiles: HashMap<String, UserProfile>,
}

impl ConversationContext {
    pub fn new(max_history: usize, context_window: usize) -> Self {
        Self {
            max_history: max_history.max(1),
            context_window,
            messages: VecDeque::new(),
            profiles: HashMap::new(),
        }
    }

    pub fn set_context_window(&mut self, context_window: usize) {
        self.context_window = context_window;
    }

    fn push(&mut self, kind: MessageKind, content: String, username: &str, nickname: &str) {
        while self.messages.len() >= self.max_history {
            self.messages.pop_front();
        }
        self.messages.push_back(ConversationMessage {
            kind,
            content,
            username: username.to_string(),
            nickname: nickname.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn profile(&mut self, username: &str, nickname: &str) -> &mut UserProfile {
        let profile = self
            .profiles
            .entry(username.to_string())
            .or_insert_with(|| UserProfile::new(username, nickname));
        profile.last_seen = Utc::now();
        profile.nickname = nickname.to_string();
        profile
    }

    pub fn record_comment(&mut self, username: &str, nickname: &str, comment: &str) {
        self.profile(username, nickname).message_count += 1;
        self.push(MessageKind::UserComment, comment.to_string(), username, nickname);
    }

    pub fn record_gift(&mut self, username: &str, nickname: &str, gift_name: &str, count: i64) {
        self.profile(username, nickname).total_gifts += count;
        self.push(
            MessageKind::SystemMessage,
            format!("{} sent {} x{}", nickname, gift_name, count),
            username,
            nickname,
        );
    }

    pub fn record_follow(&mut self, username: &str, nickname: &str) {
        self.profile(username, nickname).is_follower = true;
        self.push(
            MessageKind::SystemMessage,
            format!("{} followed", nickname),
            username,
            nickname,
        );
    }

    pub fn record_reply(&mut self, reply: &str) {
        self.push(MessageKind::AiReply, reply.to_string(), BOT_USERNAME, "TikBot AI");
    }

    /// The last `context_window` messages, oldest first.
    pub fn recent(&self) -> Vec<ConversationMessage> {
        let skip = self.messages.len().saturating_sub(self.context_window);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn user_profile(&self, username: &str) -> Option<&UserProfile> {
        self.profiles.get(username)
    }

    pub fn message_count(&self, username: &str) -> u64 {
        self.profiles.get(username).map_or(0, |p| p.message_count)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.profiles.len()
    }

    /// Context document for one request.
    pub fn to_request_context(&self, action: &str, username: &str) -> serde_json::Value {
        json!({
            "action": action,
            "user": self.user_profile(username),
            "recent": self.recent(),
        })
    }
}
