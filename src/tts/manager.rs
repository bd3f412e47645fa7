use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock as StdRwLock,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    config::{SettingsReport, SettingsUpdate, TtsConfig},
    event::{Event, EventHandler, EventType},
    queue::{
        Admission, ExecError, Executor, Priority, QueueLimits, QueueWorker, Rejection, Request,
        RequestQueue, SubmitResult,
    },
};

use super::{engine::create_engine, TtsEngine, TtsResult};

#[derive(Debug, Clone)]
struct TtsRules {
    min_length: usize,
    max_length: usize,
    blocked_words: Vec<String>,
    filter_urls: bool,
    filter_numbers: bool,
}

impl From<&TtsConfig> for TtsRules {
    fn from(config: &TtsConfig) -> Self {
        Self {
            min_length: config.min_length,
            max_length: config.max_length,
            blocked_words: config.blocked_words.iter().map(|w| w.to_lowercase()).collect(),
            filter_urls: config.filter_urls,
            filter_numbers: config.filter_numbers,
        }
    }
}

/// Content rules for spoken text: length bounds, blocked words, links and
/// digit-only messages.
#[derive(Debug)]
pub struct TtsAdmission {
    rules: StdRwLock<TtsRules>,
}

impl TtsAdmission {
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            rules: StdRwLock::new(TtsRules::from(config)),
        }
    }

    fn update(&self, config: &TtsConfig) {
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = TtsRules::from(config);
    }
}

impl Admission<String> for TtsAdmission {
    fn validate(&self, text: &String, _requester: &str) -> Result<(), Rejection> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let length = text.chars().count();
        if length < rules.min_length {
            return Err(Rejection::invalid("Message too short"));
        }
        if length > rules.max_length {
            return Err(Rejection::invalid(format!(
                "Message too long (max {} characters)",
                rules.max_length
            )));
        }
        let lower = text.to_lowercase();
        if rules.blocked_words.iter().any(|w| lower.contains(w.as_str())) {
            return Err(Rejection::invalid("Message contains a blocked word"));
        }
        if rules.filter_urls && (lower.contains("http") || lower.contains("www.")) {
            return Err(Rejection::invalid("Links are not read aloud"));
        }
        if rules.filter_numbers {
            let compact: String = text.chars().filter(|c| *c != ' ').collect();
            if !compact.is_empty() && compact.chars().all(|c| c.is_ascii_digit()) {
                return Err(Rejection::invalid("Number-only messages are not read aloud"));
            }
        }
        Ok(())
    }
}

/// Speaks one request, bracketed by TTS_START and TTS_END.
struct SpeechExecutor {
    engine: Arc<dyn TtsEngine>,
    hub: Arc<EventHandler>,
}

#[async_trait]
impl Executor<String> for SpeechExecutor {
    async fn execute(&self, request: &Request<String>) -> Result<(), ExecError> {
        let text = request.payload();
        self.hub
            .emit(
                Event::new(EventType::TtsStart)
                    .with("text", text)
                    .with("username", request.requester())
                    .with("priority", request.priority().to_string()),
            )
            .await;

        let spoken = self.engine.speak(text).await;

        self.hub
            .emit(
                Event::new(EventType::TtsEnd)
                    .with("text", text)
                    .with("username", request.requester())
                    .with("success", spoken),
            )
            .await;

        if spoken {
            info!(target: "tts", username = request.requester(), "Spoke: {}", preview(text));
            Ok(())
        } else {
            Err(ExecError::Failed("TTS engine failed to speak".to_string()))
        }
    }
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(30).collect();
    if text.chars().count() > 30 {
        preview.push_str("...");
    }
    preview
}

fn limits(config: &TtsConfig) -> QueueLimits {
    QueueLimits {
        max_size: config.max_queue_size,
        max_per_requester: config.max_requests_per_user,
        history_size: 50,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TtsStats {
    pub enabled: bool,
    pub total_requests: u64,
    pub successful_plays: u64,
    pub failed_plays: u64,
    pub filtered_messages: u64,
    pub queue_full_drops: u64,
    pub quota_rejections: u64,
    pub queue_size: usize,
    pub is_processing: bool,
}

/// Text-to-speech subsystem: validated, prioritized requests drained into a
/// single voice.
pub struct TtsManager {
    enabled: AtomicBool,
    config: RwLock<TtsConfig>,
    engine: Arc<dyn TtsEngine>,
    admission: Arc<TtsAdmission>,
    queue: Arc<RequestQueue<String>>,
    worker: QueueWorker<String>,
}

impl TtsManager {
    pub fn new(config: TtsConfig, engine: Arc<dyn TtsEngine>, hub: Arc<EventHandler>) -> Self {
        let admission = Arc::new(TtsAdmission::new(&config));
        let queue = Arc::new(RequestQueue::new(
            "TTS queue",
            limits(&config),
            admission.clone(),
        ));
        let executor = Arc::new(SpeechExecutor {
            engine: engine.clone(),
            hub,
        });
        let worker = QueueWorker::new("tts", queue.clone(), executor, config.worker);
        Self {
            enabled: AtomicBool::new(true),
            config: RwLock::new(config),
            engine,
            admission,
            queue,
            worker,
        }
    }

    /// Builds the configured engine and applies the voice settings.
    pub async fn initialize(config: TtsConfig, hub: Arc<EventHandler>) -> TtsResult<Self> {
        let engine = create_engine(&config).await?;
        engine.set_voice_rate(config.voice_rate).await;
        engine.set_voice_volume(config.voice_volume).await;
        info!(target: "tts", engine = %engine.kind(), "TTS engine ready");
        Ok(Self::new(config, engine, hub))
    }

    pub async fn start(&self) {
        self.worker.start().await;
    }

    pub async fn stop(&self, timeout: Duration) {
        self.worker.stop(timeout).await;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub async fn auto_read_chat(&self) -> bool {
        self.config.read().await.auto_read_chat
    }

    /// Queues `text` for speech. VIP requesters are always served at high
    /// priority.
    pub async fn submit(&self, text: &str, username: &str, priority: Priority) -> SubmitResult {
        if !self.is_enabled() {
            return SubmitResult::rejected(Rejection::Disabled {
                label: "TTS".to_string(),
            });
        }
        let priority = if self.is_vip(username).await {
            Priority::High
        } else {
            priority
        };
        let result = self
            .queue
            .submit(text.trim().to_string(), username, priority)
            .await;
        if !result.success {
            debug!(target: "tts", username, "TTS request refused: {:?}", result.error);
        }
        result
    }

    pub async fn is_vip(&self, username: &str) -> bool {
        self.config.read().await.vip_users.iter().any(|u| u == username)
    }

    pub async fn add_vip(&self, username: &str) {
        let mut config = self.config.write().await;
        if !config.vip_users.iter().any(|u| u == username) {
            config.vip_users.push(username.to_string());
        }
    }

    pub async fn remove_vip(&self, username: &str) {
        self.config.write().await.vip_users.retain(|u| u != username);
    }

    pub async fn clear_queue(&self) -> usize {
        self.queue.clear().await
    }

    pub fn queue(&self) -> &Arc<RequestQueue<String>> {
        &self.queue
    }

    /// Applies runtime overrides. `enabled` toggles the subsystem; other keys
    /// follow [`TtsConfig::apply_settings`].
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

        self.admission.update(&config);
        self.queue.set_limits(limits(&config)).await;
        self.engine.set_voice_rate(config.voice_rate).await;
        self.engine.set_voice_volume(config.voice_volume).await;
        report
    }

    pub async fn stats(&self) -> TtsStats {
        let stats = self.queue.stats().await;
        TtsStats {
            enabled: self.is_enabled(),
            total_requests: stats.submitted,
            successful_plays: stats.completed,
            failed_plays: stats.failed,
            filtered_messages: stats.rejected_invalid,
            queue_full_drops: stats.rejected_full,
            quota_rejections: stats.rejected_quota,
            queue_size: self.queue.len().await,
            is_processing: self.worker.is_processing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineKind, queue::RequestStatus, tts::engine::MockTtsEngine};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mock_engine(spoken: bool) -> Arc<dyn TtsEngine> {
        let mut engine = MockTtsEngine::new();
        engine.expect_kind().return_const(EngineKind::Console);
        engine.expect_speak().returning(move |_| spoken);
        engine.expect_set_voice_rate().returning(|_| ());
        engine.expect_set_voice_volume().returning(|_| ());
        Arc::new(engine)
    }

    fn fast_config() -> TtsConfig {
        let mut config = TtsConfig::default();
        config.worker.pause_between = Duration::from_millis(1);
        config.worker.failure_pause = Duration::from_millis(1);
        config
    }

    #[tokio::test]
    async fn test_validation_rules() {
        let manager = TtsManager::new(
            TtsConfig {
                blocked_words: vec!["Badword".into()],
                max_length: 20,
                ..fast_config()
            },
            mock_engine(true),
            Arc::new(EventHandler::new()),
        );
        for text in [
            "",
            "this line is far longer than twenty",
            "you badword",
            "see www.example.com",
            "12 34 56",
        ] {
            let result = manager.submit(text, "viewer", Priority::Normal).await;
            assert!(!result.success, "{:?} should be filtered", text);
        }
        assert!(manager.submit("hello there", "viewer", Priority::Normal).await.success);
        assert_eq!(manager.stats().await.filtered_messages, 5);
    }

    #[tokio::test]
    async fn test_quota_positions() {
        let manager = TtsManager::new(
            TtsConfig {
                max_requests_per_user: Some(3),
                ..fast_config()
            },
            mock_engine(true),
            Arc::new(EventHandler::new()),
        );
        let mut positions = Vec::new();
        for i in 1..=3 {
            let result = manager
                .submit(&format!("message {}", i), "alice", Priority::Normal)
                .await;
            positions.push(result.position);
        }
        assert_eq!(positions, vec![Some(1), Some(2), Some(3)]);

        let fourth = manager.submit("message 4", "alice", Priority::Normal).await;
        assert!(!fourth.success);
        assert!(fourth.error.unwrap().contains("already has 3"));
    }

    #[tokio::test]
    async fn test_vip_promoted() {
        let manager = TtsManager::new(fast_config(), mock_engine(true), Arc::new(EventHandler::new()));
        manager.submit("first", "viewer", Priority::Normal).await;
        manager.add_vip("star").await;
        let vip = manager.submit("vip line", "star", Priority::Low).await;
        assert_eq!(vip.position, Some(1));
        manager.remove_vip("star").await;
        assert!(!manager.is_vip("star").await);
    }

    #[tokio::test]
    async fn test_speaks_and_emits_events() {
        let hub = Arc::new(EventHandler::new());
        let manager = TtsManager::new(fast_config(), mock_engine(true), hub.clone());
        manager.start().await;
        manager.submit("hello stream", "bob", Priority::High).await;

        for _ in 0..100 {
            if manager.stats().await.successful_plays == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        manager.stop(Duration::from_secs(1)).await;

        assert_eq!(hub.history(Some(EventType::TtsStart), 10).await.len(), 1);
        let end = hub.history(Some(EventType::TtsEnd), 10).await;
        assert_eq!(end[0].get_bool("success"), Some(true));
        assert_eq!(end[0].get_str("username"), Some("bob"));
    }

    #[tokio::test]
    async fn test_engine_failure_marks_failed() {
        let manager = TtsManager::new(fast_config(), mock_engine(false), Arc::new(EventHandler::new()));
        manager.start().await;
        manager.submit("will fail", "bob", Priority::Normal).await;
        for _ in 0..100 {
            if manager.stats().await.failed_plays == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        manager.stop(Duration::from_secs(1)).await;
        let history = manager.queue().history(1).await;
        assert_eq!(history[0].status(), RequestStatus::Failed);
    }

    #[tokio::test]
    async fn test_update_settings_and_disable() {
        let manager = TtsManager::new(fast_config(), mock_engine(true), Arc::new(EventHandler::new()));
        let update = json!({"enabled": false, "max_length": 5, "voice_volume": 7.0})
            .as_object()
            .cloned()
            .unwrap();
        let report = manager.update_settings(&update).await;
        assert_eq!(report.applied.len(), 3);
        assert_eq!(manager.config.read().await.voice_volume, 1.0);

        let result = manager.submit("hello", "bob", Priority::Normal).await;
        assert_eq!(result.error.as_deref(), Some("TTS is disabled"));

        manager.set_enabled(true);
        assert!(!manager.submit("too long now", "bob", Priority::Normal).await.success);
    }
}
