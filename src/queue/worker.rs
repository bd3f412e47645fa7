use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::config::duration_ms;

use super::{
    request::Request,
    request_queue::{Dispatched, Outcome, RequestQueue},
    ExecError,
};

/// The external action a queue drains into: speak a line, play a sound,
/// announce a song. One call per request; no retries.
#[async_trait]
pub trait Executor<T>: Send + Sync {
    async fn execute(&self, request: &Request<T>) -> Result<(), ExecError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_pause_between", with = "duration_ms")]
    pub pause_between: Duration,
    #[serde(default = "default_failure_pause", with = "duration_ms")]
    pub failure_pause: Duration,
}

fn default_pause_between() -> Duration {
    Duration::from_millis(500)
}

fn default_failure_pause() -> Duration {
    Duration::from_secs(1)
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pause_between: default_pause_between(),
            failure_pause: default_failure_pause(),
        }
    }
}

/// Single consumer of a [`RequestQueue`].
pub struct QueueWorker<T> {
    name: String,
    queue: Arc<RequestQueue<T>>,
    executor: Arc<dyn Executor<T>>,
    config: WorkerConfig,
    running: Arc<AtomicBool>,
    processing: Arc<AtomicBool>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T> QueueWorker<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: &str,
        queue: Arc<RequestQueue<T>>,
        executor: Arc<dyn Executor<T>>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            queue,
            executor,
            config,
            running: Arc::new(AtomicBool::new(false)),
            processing: Arc::new(AtomicBool::new(false)),
            task_handle: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &Arc<RequestQueue<T>> {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True while an executor call is in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Spawns the drain loop. Starting a running worker is a no-op.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.queue.reopen().await;
        let handle = tokio::spawn(drain(
            self.name.clone(),
            self.queue.clone(),
            self.executor.clone(),
            self.config,
            self.running.clone(),
            self.processing.clone(),
        ));
        *self.task_handle.lock().await = Some(handle);
    }

    /// Closes the queue and waits up to `timeout` for the loop to exit. A loop
    /// stuck in its executor is aborted and its request marked skipped.
    pub async fn stop(&self, timeout: Duration) {
        self.running.store(false, Ordering::SeqCst);
        self.queue.close().await;
        let Some(mut handle) = self.task_handle.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            warn!(target: "queue", worker = %self.name, "Worker did not stop in {:?}, aborting", timeout);
            handle.abort();
            self.queue.skip_current("shutdown").await;
        }
        self.processing.store(false, Ordering::SeqCst);
    }
}

async fn drain<T>(
    name: String,
    queue: Arc<RequestQueue<T>>,
    executor: Arc<dyn Executor<T>>,
    config: WorkerConfig,
    running: Arc<AtomicBool>,
    processing: Arc<AtomicBool>,
) where
    T: Clone + Send + Sync + 'static,
{
    info!(target: "queue", worker = %name, "Worker started");
    while let Some(Dispatched { request, skipped }) = queue.next().await {
        let id = request.id();
        processing.store(true, Ordering::SeqCst);
        let result = tokio::select! {
            result = executor.execute(&request) => Some(result),
            _ = skipped => None,
        };
        processing.store(false, Ordering::SeqCst);

        match result {
            Some(Ok(())) => {
                queue.finish(id, Outcome::Completed).await;
            }
            Some(Err(e)) => {
                warn!(target: "queue", worker = %name, %id, "Request failed: {}", e);
                queue.finish(id, Outcome::Failed(e.to_string())).await;
                tokio::time::sleep(config.failure_pause).await;
            }
            None => debug!(target: "queue", worker = %name, %id, "Request interrupted by skip"),
        }

        if !config.pause_between.is_zero() {
            tokio::time::sleep(config.pause_between).await;
        }
    }
    running.store(false, Ordering::SeqCst);
    info!(target: "queue", worker = %name, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{
        admission::{AcceptAll, QueueLimits},
        request::{Priority, RequestStatus},
    };
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl Executor<String> for Recorder {
        async fn execute(&self, request: &Request<String>) -> Result<(), ExecError> {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().await.push(request.payload().clone());
            if request.payload().starts_with("bad") {
                return Err(ExecError::Failed("engine returned false".into()));
            }
            Ok(())
        }
    }

    fn fast() -> WorkerConfig {
        WorkerConfig {
            pause_between: Duration::from_millis(1),
            failure_pause: Duration::from_millis(1),
        }
    }

    fn new_queue() -> Arc<RequestQueue<String>> {
        Arc::new(RequestQueue::<String>::new(
            "worker test",
            QueueLimits::default(),
            Arc::new(AcceptAll),
        ))
    }

    async fn wait_for_history(queue: &RequestQueue<String>, count: usize) {
        for _ in 0..200 {
            if queue.history(100).await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("history never reached {}", count);
    }

    #[tokio::test]
    async fn test_drains_in_order_and_continues_after_failure() {
        let queue = new_queue();
        let recorder = Arc::new(Recorder::default());
        let worker = QueueWorker::new("test", queue.clone(), recorder.clone(), fast());

        for text in ["first", "bad one", "third"] {
            queue.submit(text.to_string(), "u", Priority::Normal).await;
        }
        worker.start().await;
        wait_for_history(&queue, 3).await;

        assert_eq!(*recorder.seen.lock().await, vec!["first", "bad one", "third"]);
        let statuses: Vec<RequestStatus> = queue.history(10).await.iter().map(|r| r.status()).collect();
        assert_eq!(
            statuses,
            vec![RequestStatus::Completed, RequestStatus::Failed, RequestStatus::Completed]
        );

        worker.stop(Duration::from_secs(1)).await;
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn test_skip_interrupts_execution() {
        let queue = new_queue();
        let recorder = Arc::new(Recorder {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let worker = QueueWorker::new("test", queue.clone(), recorder.clone(), fast());
        worker.start().await;

        queue.submit("long".to_string(), "u", Priority::Normal).await;
        for _ in 0..100 {
            if worker.is_processing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        queue.skip_current("admin skip").await.unwrap();
        wait_for_history(&queue, 1).await;

        let history = queue.history(1).await;
        assert_eq!(history[0].status(), RequestStatus::Skipped);
        assert!(recorder.seen.lock().await.is_empty());
        worker.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_stop_aborts_hung_executor() {
        let queue = new_queue();
        let recorder = Arc::new(Recorder {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let worker = QueueWorker::new("test", queue.clone(), recorder, fast());
        worker.start().await;
        queue.submit("hang".to_string(), "u", Priority::Normal).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        worker.stop(Duration::from_millis(50)).await;
        assert!(queue.current().await.is_none());
        assert_eq!(queue.history(1).await[0].status(), RequestStatus::Skipped);
    }
}
