//! Live platform boundary.
//!
//! A [`PlatformClient`] pushes [`PlatformNotification`]s into the channel it is
//! given on [`PlatformClient::connect`]; the bot relays each one into the event
//! hub. The real live-streaming wire protocol is not implemented here; the
//! binary drives the bot from a [`ConsoleClient`] instead.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::event::{Event, EventType};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Failed to connect to {target}: {message}")]
    Connect { target: String, message: String },
    #[error("Failed to disconnect: {0}")]
    Disconnect(String),
    #[error("Notification channel closed")]
    ChannelClosed,
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Raw notification as delivered by the live platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformNotification {
    Connected {
        room_id: Option<String>,
    },
    Disconnected,
    Comment {
        username: String,
        nickname: String,
        user_id: String,
        comment: String,
    },
    Gift {
        username: String,
        nickname: String,
        gift_name: String,
        gift_count: i64,
        gift_id: i64,
    },
    Follow {
        username: String,
        nickname: String,
        user_id: String,
    },
    Share {
        username: String,
        nickname: String,
    },
    Like {
        username: String,
        nickname: String,
        like_count: i64,
    },
    Join {
        username: String,
        nickname: String,
    },
}

impl PlatformNotification {
    pub fn event_type(&self) -> EventType {
        match self {
            PlatformNotification::Connected { .. } => EventType::Connect,
            PlatformNotification::Disconnected => EventType::Disconnect,
            PlatformNotification::Comment { .. } => EventType::Comment,
            PlatformNotification::Gift { .. } => EventType::Gift,
            PlatformNotification::Follow { .. } => EventType::Follow,
            PlatformNotification::Share { .. } => EventType::Share,
            PlatformNotification::Like { .. } => EventType::Like,
            PlatformNotification::Join { .. } => EventType::Join,
        }
    }

    /// Normalizes the notification into a hub [`Event`].
    pub fn into_event(self) -> Event {
        match self {
            PlatformNotification::Connected { room_id } => {
                Event::new(EventType::Connect).with("room_id", room_id)
            }
            PlatformNotification::Disconnected => Event::new(EventType::Disconnect),
            PlatformNotification::Comment {
                username,
                nickname,
                user_id,
                comment,
            } => Event::comment(&username, &nickname, &comment, &user_id),
            PlatformNotification::Gift {
                username,
                nickname,
                gift_name,
                gift_count,
                gift_id,
            } => Event::gift(&username, &nickname, &gift_name, gift_count, gift_id),
            PlatformNotification::Follow {
                username,
                nickname,
                user_id,
            } => Event::follow(&username, &nickname, &user_id),
            PlatformNotification::Share { username, nickname } => Event::new(EventType::Share)
                .with("username", username)
                .with("nickname", nickname),
            PlatformNotification::Like {
                username,
                nickname,
                like_count,
            } => Event::new(EventType::Like)
                .with("username", username)
                .with("nickname", nickname)
                .with("like_count", like_count),
            PlatformNotification::Join { username, nickname } => Event::new(EventType::Join)
                .with("username", username)
                .with("nickname", nickname),
        }
    }
}

/// Connection to a live room.
///
/// `connect` may be called again after a disconnect; implementations keep
/// delivering into the sender they are handed.
#[mockall::automock]
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn target(&self) -> String;
    async fn connect(&self, notifications: mpsc::Sender<PlatformNotification>) -> PlatformResult<()>;
    async fn disconnect(&self) -> PlatformResult<()>;
}

type LineSource = Box<dyn AsyncBufRead + Send + Unpin>;

/// Platform stand-in that turns console lines into notifications.
///
/// ```text
/// alice: hello there        comment
/// /gift alice Rose 5        gift (count defaults to 1)
/// /follow alice             follow
/// /like alice               like
/// /join alice               join
/// /share alice              share
/// /disconnect               drop the connection
/// ```
pub struct ConsoleClient {
    target: String,
    source: Mutex<Option<LineSource>>,
    connected: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleClient {
    pub fn stdin(target: &str) -> Self {
        Self::from_reader(target, BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader<R>(target: &str, reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            target: target.to_string(),
            source: Mutex::new(Some(Box::new(reader))),
            connected: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformClient for ConsoleClient {
    fn target(&self) -> String {
        format!("console (@{})", self.target)
    }

    async fn connect(&self, notifications: mpsc::Sender<PlatformNotification>) -> PlatformResult<()> {
        let mut reader = self.reader.lock().await;
        let source = match reader.is_none() {
            true => Some(self.source.lock().await.take().ok_or_else(|| {
                PlatformError::Connect {
                    target: self.target(),
                    message: "console input already closed".to_string(),
                }
            })?),
            false => None,
        };
        self.connected.store(true, Ordering::SeqCst);
        notifications
            .send(PlatformNotification::Connected { room_id: None })
            .await
            .map_err(|_| PlatformError::ChannelClosed)?;
        if let Some(source) = source {
            *reader = Some(tokio::spawn(read_lines(
                source,
                notifications,
                self.connected.clone(),
            )));
        }
        Ok(())
    }

    async fn disconnect(&self) -> PlatformResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        Ok(())
    }
}

async fn read_lines(
    mut source: LineSource,
    notifications: mpsc::Sender<PlatformNotification>,
    connected: Arc<AtomicBool>,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match source.read_line(&mut line).await {
            Ok(0) => {
                info!(target: "platform", "Console input closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(target: "platform", "Failed to read console input: {}", e);
                break;
            }
        }
        let Some(notification) = parse_console_line(&line) else {
            continue;
        };
        if !connected.load(Ordering::SeqCst) {
            debug!(target: "platform", "Not connected, dropping {}", notification.event_type());
            continue;
        }
        if notification == PlatformNotification::Disconnected {
            connected.store(false, Ordering::SeqCst);
        }
        if notifications.send(notification).await.is_err() {
            break;
        }
    }
}

/// Parses one console line. Blank and malformed lines yield `None`.
pub fn parse_console_line(line: &str) -> Option<PlatformNotification> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(command) = line.strip_prefix('/') {
        let mut parts = command.split_whitespace();
        let verb = parts.next()?;
        if verb == "disconnect" {
            return Some(PlatformNotification::Disconnected);
        }
        let username = parts.next()?.to_string();
        let nickname = username.clone();
        return match verb {
            "gift" => {
                let gift_name = parts.next()?.to_string();
                let gift_count = parts.next().and_then(|c| c.parse().ok()).unwrap_or(1);
                Some(PlatformNotification::Gift {
                    username,
                    nickname,
                    gift_name,
                    gift_count,
                    gift_id: 0,
                })
            }
            "follow" => Some(PlatformNotification::Follow {
                user_id: username.clone(),
                username,
                nickname,
            }),
            "like" => Some(PlatformNotification::Like {
                username,
                nickname,
                like_count: 1,
            }),
            "join" => Some(PlatformNotification::Join { username, nickname }),
            "share" => Some(PlatformNotification::Share { username, nickname }),
            _ => None,
        };
    }
    let (username, comment) = line.split_once(':')?;
    let (username, comment) = (username.trim(), comment.trim());
    if username.is_empty() || username.contains(char::is_whitespace) || comment.is_empty() {
        return None;
    }
    Some(PlatformNotification::Comment {
        username: username.to_string(),
        nickname: username.to_string(),
        user_id: username.to_string(),
        comment: comment.to_string(),
    })
}
