use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Why a submission was refused. Rejections are expected, user-facing
/// outcomes and are never treated as system errors.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    #[error("{label} full (max {capacity})")]
    QueueFull { label: String, capacity: usize },

    #[error("{requester} already has {limit} requests in queue")]
    QuotaExceeded { requester: String, limit: usize },

    #[error("{reason}")]
    Invalid { reason: String },

    #[error("Already in queue: {description}")]
    Duplicate { description: String },

    #[error("{label} is disabled")]
    Disabled { label: String },

    #[error("{label} is not accepting requests")]
    Closed { label: String },
}

impl Rejection {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Rejection::Invalid {
            reason: reason.into(),
        }
    }
}

/// Subsystem-specific content rules applied before a payload is queued.
pub trait Admission<T>: Send + Sync {
    /// Content validation: length bounds, blocked words, duration ceiling...
    fn validate(&self, payload: &T, requester: &str) -> Result<(), Rejection>;

    /// Returns a description of `queued` when it duplicates `candidate`.
    /// The default never reports duplicates.
    fn duplicate_of(&self, _candidate: &T, _queued: &T) -> Option<String> {
        None
    }
}

/// Accepts every payload. Used for queues whose inputs are pre-validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl<T> Admission<T> for AcceptAll {
    fn validate(&self, _payload: &T, _requester: &str) -> Result<(), Rejection> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLimits {
    pub max_size: usize,
    /// Outstanding (pending or playing) requests allowed per requester.
    pub max_per_requester: Option<usize>,
    pub history_size: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_size: 50,
            max_per_requester: None,
            history_size: 50,
        }
    }
}

/// Synchronous answer to a submission: `{success, request_id, position}` or
/// `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    /// 1-based position in the pending queue at admission time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub rejection: Option<Rejection>,
}

impl SubmitResult {
    pub fn accepted(request_id: Uuid, position: usize) -> Self {
        Self {
            success: true,
            request_id: Some(request_id),
            position: Some(position),
            error: None,
            rejection: None,
        }
    }

    pub fn rejected(rejection: Rejection) -> Self {
        Self {
            success: false,
            request_id: None,
            position: None,
            error: Some(rejection.to_string()),
            rejection: Some(rejection),
        }
    }
}
