//! Stream analytics: per-session counters, viewer activity and JSON export.

pub mod collector;

use thiserror::Error;

pub use collector::{AnalyticsCollector, AnalyticsSnapshot, StreamEvent, StreamSession, ViewerActivity};

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Export serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
