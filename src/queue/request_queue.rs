use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use serde::Serialize;
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    admission::{Admission, QueueLimits, Rejection, SubmitResult},
    request::{Priority, Request, RequestStatus},
    QueueError, QueueResult,
};

/// How the consumer reports the end of an active request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
}

/// A request handed to the consumer, together with the signal fired when
/// [`RequestQueue::skip_current`] interrupts it.
#[derive(Debug)]
pub struct Dispatched<T> {
    pub request: Request<T>,
    pub skipped: oneshot::Receiver<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub accepted: u64,
    pub rejected_full: u64,
    pub rejected_quota: u64,
    pub rejected_invalid: u64,
    pub rejected_duplicate: u64,
    /// Refused because the queue was disabled or closed.
    pub rejected_unavailable: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot<T> {
    pub current: Option<Request<T>>,
    pub pending: Vec<Request<T>>,
    pub size: usize,
    pub max_size: usize,
}

struct QueueState<T> {
    limits: QueueLimits,
    pending: VecDeque<Request<T>>,
    current: Option<Request<T>>,
    skip_signal: Option<oneshot::Sender<String>>,
    history: VecDeque<Request<T>>,
    outstanding: HashMap<String, usize>,
    stats: QueueStats,
    closed: bool,
}

impl<T> QueueState<T> {
    fn release(&mut self, requester: &str) {
        if let Some(count) = self.outstanding.get_mut(requester) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.outstanding.remove(requester);
            }
        }
    }

    fn archive(&mut self, request: Request<T>) {
        self.release(request.requester());
        while self.history.len() >= self.limits.history_size.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(request);
    }
}

/// Bounded, priority-aware queue in front of a serial external resource.
///
/// Submissions pass admission control (validation, duplicate check, capacity,
/// per-requester quota) synchronously. Accepted requests are drained by
/// exactly one consumer through [`RequestQueue::next`] and
/// [`RequestQueue::finish`].
pub struct RequestQueue<T> {
    label: String,
    admission: Arc<dyn Admission<T>>,
    state: Mutex<QueueState<T>>,
    available: Notify,
}

impl<T> RequestQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(label: &str, limits: QueueLimits, admission: Arc<dyn Admission<T>>) -> Self {
        Self {
            label: label.to_string(),
            admission,
            state: Mutex::new(QueueState {
                limits,
                pending: VecDeque::new(),
                current: None,
                skip_signal: None,
                history: VecDeque::new(),
                outstanding: HashMap::new(),
                stats: QueueStats::default(),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs admission control and, on success, inserts the request behind every
    /// pending request of the same or higher priority.
    pub async fn submit(&self, payload: T, requester: &str, priority: Priority) -> SubmitResult {
        let mut state = self.state.lock().await;
        state.stats.submitted += 1;

        if let Err(rejection) = self.admit(&state, &payload, requester) {
            match &rejection {
                Rejection::QueueFull { .. } => state.stats.rejected_full += 1,
                Rejection::QuotaExceeded { .. } => state.stats.rejected_quota += 1,
                Rejection::Duplicate { .. } => state.stats.rejected_duplicate += 1,
                Rejection::Invalid { .. } => state.stats.rejected_invalid += 1,
                Rejection::Disabled { .. } | Rejection::Closed { .. } => {
                    state.stats.rejected_unavailable += 1
                }
            }
            debug!(target: "queue", queue = %self.label, requester, "Request rejected: {}", rejection);
            return SubmitResult::rejected(rejection);
        }

        let request = Request::new(payload, requester, priority);
        let id = request.id();
        let index = state
            .pending
            .iter()
            .position(|queued| queued.priority() > priority)
            .unwrap_or(state.pending.len());
        state.pending.insert(index, request);
        *state.outstanding.entry(requester.to_string()).or_insert(0) += 1;
        state.stats.accepted += 1;
        drop(state);

        self.available.notify_one();
        debug!(target: "queue", queue = %self.label, requester, %priority, position = index + 1, "Request accepted");
        SubmitResult::accepted(id, index + 1)
    }

    fn admit(&self, state: &QueueState<T>, payload: &T, requester: &str) -> Result<(), Rejection> {
        if state.closed {
            return Err(Rejection::Closed {
                label: self.label.clone(),
            });
        }
        self.admission.validate(payload, requester)?;
        if let Some(description) = state
            .pending
            .iter()
            .find_map(|queued| self.admission.duplicate_of(payload, queued.payload()))
        {
            return Err(Rejection::Duplicate { description });
        }
        if state.pending.len() >= state.limits.max_size {
            return Err(Rejection::QueueFull {
                label: self.label.clone(),
                capacity: state.limits.max_size,
            });
        }
        if let Some(limit) = state.limits.max_per_requester {
            if state.outstanding.get(requester).copied().unwrap_or(0) >= limit {
                return Err(Rejection::QuotaExceeded {
                    requester: requester.to_string(),
                    limit,
                });
            }
        }
        Ok(())
    }

    /// Waits for the head of the queue, marks it playing and hands it out.
    /// Returns `None` once the queue is closed.
    ///
    /// A request still marked playing from the previous call is completed first.
    pub async fn next(&self) -> Option<Dispatched<T>> {
        loop {
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return None;
                }
                if let Some(dispatched) = self.dispatch(&mut state) {
                    return Some(dispatched);
                }
            }
            self.available.notified().await;
        }
    }

    /// Like [`RequestQueue::next`] but returns `None` instead of waiting when
    /// nothing is pending.
    pub async fn try_next(&self) -> Option<Dispatched<T>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return None;
        }
        self.dispatch(&mut state)
    }

    fn dispatch(&self, state: &mut QueueState<T>) -> Option<Dispatched<T>> {
        if let Some(mut previous) = state.current.take() {
            debug!(target: "queue", queue = %self.label, id = %previous.id(), "Completing previous request");
            if previous.advance(RequestStatus::Completed).is_ok() {
                state.stats.completed += 1;
            }
            state.skip_signal = None;
            state.archive(previous);
        }
        while let Some(mut request) = state.pending.pop_front() {
            if let Err(e) = request.advance(RequestStatus::Playing) {
                warn!(target: "queue", queue = %self.label, "Dropping request: {}", e);
                continue;
            }
            let (tx, rx) = oneshot::channel();
            state.current = Some(request.clone());
            state.skip_signal = Some(tx);
            return Some(Dispatched {
                request,
                skipped: rx,
            });
        }
        None
    }

    /// Ends the active request `id`. Returns `false` when it is no longer the
    /// active one, e.g. because it was skipped meanwhile.
    pub async fn finish(&self, id: Uuid, outcome: Outcome) -> bool {
        let mut state = self.state.lock().await;
        if state.current.as_ref().map(Request::id) != Some(id) {
            return false;
        }
        let Some(mut request) = state.current.take() else {
            return false;
        };
        state.skip_signal = None;
        let status = match &outcome {
            Outcome::Completed => RequestStatus::Completed,
            Outcome::Failed(message) => {
                request.set_note(message.clone());
                RequestStatus::Failed
            }
        };
        if let Err(e) = request.advance(status) {
            warn!(target: "queue", queue = %self.label, "Invalid finish: {}", e);
        }
        match status {
            RequestStatus::Failed => state.stats.failed += 1,
            _ => state.stats.completed += 1,
        }
        state.archive(request);
        true
    }

    /// Marks the active request skipped and interrupts its execution.
    pub async fn skip_current(&self, reason: &str) -> Option<Request<T>> {
        let mut state = self.state.lock().await;
        let mut request = state.current.take()?;
        request.set_note(reason);
        if let Err(e) = request.advance(RequestStatus::Skipped) {
            warn!(target: "queue", queue = %self.label, "Invalid skip: {}", e);
        }
        if let Some(signal) = state.skip_signal.take() {
            let _ = signal.send(reason.to_string());
        }
        state.stats.skipped += 1;
        state.archive(request.clone());
        debug!(target: "queue", queue = %self.label, id = %request.id(), reason, "Request skipped");
        Some(request)
    }

    /// Removes a pending request. With `requester` set, only that requester's
    /// own request can be removed.
    pub async fn remove(&self, id: Uuid, requester: Option<&str>) -> QueueResult<Request<T>> {
        let mut state = self.state.lock().await;
        let index = state
            .pending
            .iter()
            .position(|r| r.id() == id)
            .ok_or(QueueError::NotFound { id })?;
        if let Some(requester) = requester {
            if state.pending[index].requester() != requester {
                return Err(QueueError::NotOwner {
                    id,
                    requester: requester.to_string(),
                });
            }
        }
        let Some(mut request) = state.pending.remove(index) else {
            return Err(QueueError::NotFound { id });
        };
        request.set_note("removed");
        request.advance(RequestStatus::Skipped)?;
        state.stats.skipped += 1;
        state.archive(request.clone());
        Ok(request)
    }

    /// Drops every pending request. The active one keeps running.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let cleared = state.pending.len();
        state.pending.clear();
        state.outstanding.clear();
        if let Some(requester) = state.current.as_ref().map(|r| r.requester().to_string()) {
            state.outstanding.insert(requester, 1);
        }
        cleared
    }

    /// Stops handing out requests; [`RequestQueue::next`] returns `None`.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.available.notify_one();
    }

    pub async fn reopen(&self) {
        self.state.lock().await.closed = false;
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.pending.is_empty()
    }

    pub async fn current(&self) -> Option<Request<T>> {
        self.state.lock().await.current.clone()
    }

    pub async fn snapshot(&self) -> QueueSnapshot<T> {
        let state = self.state.lock().await;
        QueueSnapshot {
            current: state.current.clone(),
            pending: state.pending.iter().cloned().collect(),
            size: state.pending.len(),
            max_size: state.limits.max_size,
        }
    }

    /// Pending and active requests of one requester.
    pub async fn requests_of(&self, requester: &str) -> Vec<Request<T>> {
        let state = self.state.lock().await;
        state
            .current
            .iter()
            .chain(state.pending.iter())
            .filter(|r| r.requester() == requester)
            .cloned()
            .collect()
    }

    pub async fn outstanding(&self, requester: &str) -> usize {
        self.state
            .lock()
            .await
            .outstanding
            .get(requester)
            .copied()
            .unwrap_or(0)
    }

    /// Most recent `limit` finished requests, oldest first.
    pub async fn history(&self, limit: usize) -> Vec<Request<T>> {
        let state = self.state.lock().await;
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub async fn stats(&self) -> QueueStats {
        self.state.lock().await.stats
    }

    pub async fn limits(&self) -> QueueLimits {
        self.state.lock().await.limits
    }

    /// Applies new limits. Requests already queued are kept even when the new
    /// capacity is smaller.
    pub async fn set_limits(&self, limits: QueueLimits) {
        let mut state = self.state.lock().await;
        state.limits = limits;
        while state.history.len() > limits.history_size.max(1) {
            state.history.pop_front();
        }
    }
}
