//! AI chat replies: the [`ChatClient`] seam, the rolling
//! [`ConversationContext`] and the event-driven [`AiManager`].

pub mod client;
pub mod conversation;
pub mod manager;

use thiserror::Error;

pub use client::{ChatClient, HttpChatClient};
pub use conversation::{ConversationContext, ConversationMessage, UserProfile};
pub use manager::{heuristic_reply, AiManager, AiStats, ReplyTrigger};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    #[error("Chat service request failed: {0}")]
    Http(String),
    #[error("Chat service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Chat service returned an empty reply")]
    EmptyReply,
}

pub type AiResult<T> = Result<T, AiError>;
