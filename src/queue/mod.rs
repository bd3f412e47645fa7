//! # Bounded Priority Request Queue
//!
//! One queue implementation shared by every subsystem that feeds viewer input
//! into a scarce serial resource: the TTS voice, the audio output and the
//! "now playing" slot.
//!
//! ```text
//! submit ──▶ admission ──▶ pending (priority, then FIFO) ──▶ QueueWorker ──▶ Executor
//!              │                                               │
//!              └─▶ SubmitResult {success: false, error}        └─▶ history (bounded)
//! ```
//!
//! - [`admission`]: content rules, [`Rejection`] and [`SubmitResult`]
//! - [`request`]: [`Request`], [`Priority`] and the monotonic [`RequestStatus`]
//! - [`request_queue`]: storage, quotas and the single-consumer hand-off
//! - [`worker`]: the drain loop around an [`Executor`]
//! - [`cooldown`]: named cooldown clocks for alerts

pub mod admission;
pub mod cooldown;
pub mod request;
pub mod request_queue;
pub mod worker;

use thiserror::Error;
use uuid::Uuid;

pub use admission::{AcceptAll, Admission, QueueLimits, Rejection, SubmitResult};
pub use cooldown::CooldownGate;
pub use request::{Priority, Request, RequestStatus};
pub use request_queue::{Dispatched, Outcome, QueueSnapshot, QueueStats, RequestQueue};
pub use worker::{Executor, QueueWorker, WorkerConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("Request not found: {id}")]
    NotFound { id: Uuid },
    #[error("Request {id} does not belong to {requester}")]
    NotOwner { id: Uuid, requester: String },
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Failure reported by an [`Executor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("Execution failed: {0}")]
    Failed(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}
