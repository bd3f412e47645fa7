use std::{
    path::Path,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::{
    config::{clamp_volume, AudioConfig, SettingsReport, SettingsUpdate},
    event::{Event, EventHandler, EventType, HandlerId, HandlerResult},
    queue::{
        AcceptAll, ExecError, Executor, Priority, QueueLimits, QueueStats, QueueWorker, Request,
        RequestQueue, SubmitResult,
    },
};

use super::{
    alerts::{AlertStats, AlertType, ResolvedAlert, SoundAlert, SoundAlerts, TriggerOutcome},
    player::{create_player, is_supported, AudioPlayer},
    AudioResult,
};

struct PlaybackExecutor {
    player: Arc<dyn AudioPlayer>,
}

#[async_trait]
impl Executor<ResolvedAlert> for PlaybackExecutor {
    async fn execute(&self, request: &Request<ResolvedAlert>) -> Result<(), ExecError> {
        let alert = request.payload();
        if self.player.play_sound(&alert.path, alert.volume).await {
            info!(target: "audio", alert = %alert.name, "🔊 Alert played");
            Ok(())
        } else {
            Err(ExecError::Failed(format!("could not play {}", alert.path.display())))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioStats {
    pub player_available: bool,
    pub global_volume: f32,
    pub alerts: AlertStats,
    pub playback: QueueStats,
    pub queue_size: usize,
}

const SUBSCRIBED: [EventType; 7] = [
    EventType::Follow,
    EventType::Gift,
    EventType::Join,
    EventType::Share,
    EventType::Comment,
    EventType::Like,
    EventType::Command,
];

/// Sound alerts: maps events to alerts, gates them by cooldown and plays them
/// one at a time.
pub struct AudioManager {
    config: RwLock<AudioConfig>,
    alerts: SoundAlerts,
    player: Arc<dyn AudioPlayer>,
    queue: Arc<RequestQueue<ResolvedAlert>>,
    worker: QueueWorker<ResolvedAlert>,
    subscriptions: Mutex<Vec<(EventType, HandlerId)>>,
}

impl AudioManager {
    pub fn new(config: AudioConfig, player: Arc<dyn AudioPlayer>) -> Self {
        let alerts = SoundAlerts::new(&config.sounds_directory, &config.custom_alerts);
        let queue = Arc::new(RequestQueue::new(
            "Audio queue",
            QueueLimits {
                max_size: config.max_queue_size,
                max_per_requester: None,
                history_size: 20,
            },
            Arc::new(AcceptAll),
        ));
        let worker = QueueWorker::new(
            "audio",
            queue.clone(),
            Arc::new(PlaybackExecutor {
                player: player.clone(),
            }),
            config.worker,
        );
        Self {
            config: RwLock::new(config),
            alerts,
            player,
            queue,
            worker,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Builds the configured player and makes sure the sounds directory exists.
    pub async fn initialize(config: AudioConfig) -> AudioResult<Self> {
        tokio::fs::create_dir_all(&config.sounds_directory).await?;
        let player = create_player(&config).await?;
        info!(target: "audio", player = %player.kind(), directory = %config.sounds_directory.display(), "Audio ready");
        Ok(Self::new(config, player))
    }

    /// Subscribes the alert handlers. Comment and like alerts are checked
    /// against the current settings on every event.
    pub async fn register(self: &Arc<Self>, hub: &EventHandler) {
        let mut subscriptions = self.subscriptions.lock().await;
        for event_type in SUBSCRIBED {
            let manager: Weak<Self> = Arc::downgrade(self);
            let id = hub.subscribe(event_type, "audio_alerts", move |event| {
                let manager = manager.clone();
                async move {
                    match manager.upgrade() {
                        Some(manager) => manager.on_event(&event).await,
                        None => Ok(()),
                    }
                }
            });
            subscriptions.push((event_type, id));
        }
    }

    pub async fn unregister(&self, hub: &EventHandler) {
        for (event_type, id) in self.subscriptions.lock().await.drain(..) {
            hub.unsubscribe(event_type, id);
        }
    }

    pub async fn start(&self) {
        self.worker.start().await;
    }

    pub async fn stop(&self, timeout: Duration) {
        self.worker.stop(timeout).await;
    }

    async fn on_event(&self, event: &Event) -> HandlerResult {
        let Some(alert_type) = AlertType::from_event(event.event_type()) else {
            return Ok(());
        };
        {
            let config = self.config.read().await;
            let wanted = match alert_type {
                AlertType::Comment => config.comment_alerts,
                AlertType::Like => config.like_alerts,
                AlertType::Command => event
                    .get_str("command")
                    .map(|c| config.command_sounds.iter().any(|s| s == c))
                    .unwrap_or(false),
                _ => true,
            };
            if !wanted {
                return Ok(());
            }
        }
        self.trigger_alert(alert_type, event).await;
        Ok(())
    }

    /// Runs one alert through the cooldown gate and queues it for playback.
    pub async fn trigger_alert(&self, alert_type: AlertType, event: &Event) -> Option<SubmitResult> {
        if !self.player.is_available() {
            return None;
        }
        match self.alerts.trigger(alert_type, event).await {
            TriggerOutcome::Accepted(mut alert) => {
                alert.volume = clamp_volume(f64::from(alert.volume * self.global_volume().await));
                let requester = event.get_str("username").unwrap_or("system");
                let name = alert.name.clone();
                let result = self.queue.submit(alert, requester, Priority::Normal).await;
                if !result.success {
                    self.alerts.release(&name);
                    debug!(target: "audio", alert = %name, "Alert dropped: {:?}", result.error);
                }
                Some(result)
            }
            outcome => {
                debug!(target: "audio", %alert_type, "Alert not played: {:?}", outcome);
                None
            }
        }
    }

    /// Plays an arbitrary sound file through the same queue.
    pub async fn play_sound(&self, file_path: &Path, volume: Option<f32>) -> SubmitResult {
        let global = self.global_volume().await;
        let alert = ResolvedAlert {
            name: file_path.display().to_string(),
            path: self.alerts.resolve_path(file_path),
            volume: clamp_volume(f64::from(volume.unwrap_or(1.0) * global)),
        };
        self.queue.submit(alert, "system", Priority::High).await
    }

    pub async fn global_volume(&self) -> f32 {
        self.config.read().await.global_volume
    }

    /// Sets the master volume, clamped to 0.0-1.0, and returns the value kept.
    pub async fn set_global_volume(&self, volume: f64) -> f32 {
        let volume = clamp_volume(volume);
        self.config.write().await.global_volume = volume;
        volume
    }

    pub async fn add_custom_alert(&self, alert: SoundAlert) {
        self.alerts.add_alert(alert).await;
    }

    pub async fn remove_alert(&self, alert_type: AlertType, name: &str) -> bool {
        self.alerts.remove_alert(alert_type, name).await
    }

    pub async fn set_alert_enabled(&self, alert_type: AlertType, name: &str, enabled: bool) -> bool {
        self.alerts.set_enabled(alert_type, name, enabled).await
    }

    pub async fn alerts(&self) -> Vec<SoundAlert> {
        self.alerts.list().await
    }

    /// Sound files in the sounds directory, sorted by name.
    pub async fn list_available_sounds(&self) -> AudioResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.alerts.sounds_directory()).await?;
        let mut sounds = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_supported(&path) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    sounds.push(name.to_string());
                }
            }
        }
        sounds.sort();
        Ok(sounds)
    }

    pub async fn update_settings(&self, update: &SettingsUpdate) -> SettingsReport {
        self.config.write().await.apply_settings(update)
    }

    pub fn queue(&self) -> &Arc<RequestQueue<ResolvedAlert>> {
        &self.queue
    }

    pub async fn stats(&self) -> AudioStats {
        AudioStats {
            player_available: self.player.is_available(),
            global_volume: self.global_volume().await,
            alerts: self.alerts.stats(),
            playback: self.queue.stats().await,
            queue_size: self.queue.len().await,
        }
    }
}
