use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::QueueError;

/// Service class of a request. `High` is served before `Normal`, `Normal`
/// before `Low`; within one class requests keep submission order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

/// Lifecycle of a request: `pending -> playing -> completed | skipped | failed`.
/// A pending request may also be skipped directly when it is removed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Playing,
    Completed,
    Skipped,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Skipped | RequestStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Playing) | (Pending, Skipped) | (Playing, Completed) | (Playing, Skipped) | (Playing, Failed)
        )
    }
}

/// One unit of work waiting for a scarce serial resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request<T> {
    id: Uuid,
    payload: T,
    requester: String,
    priority: Priority,
    status: RequestStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl<T> Request<T> {
    pub fn new(payload: T, requester: &str, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            requester: requester.to_string(),
            priority,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            note: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Skip reason or failure message, once the request is terminal.
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Moves the request forward in its lifecycle. Backward or sideways moves
    /// are rejected and leave the request untouched.
    pub fn advance(&mut self, next: RequestStatus) -> Result<(), QueueError> {
        if !self.status.can_transition_to(next) {
            return Err(QueueError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        match next {
            RequestStatus::Playing => self.started_at = Some(now),
            _ => self.finished_at = Some(now),
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn set_note(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
    }
}
