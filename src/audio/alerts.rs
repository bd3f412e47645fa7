use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    config::{default_true, duration_secs},
    event::{Event, EventType},
    queue::CooldownGate,
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertType {
    Follow,
    Gift,
    Comment,
    Like,
    Share,
    Join,
    Command,
    Welcome,
    Milestone,
}

impl AlertType {
    pub fn from_event(event_type: EventType) -> Option<Self> {
        match event_type {
            EventType::Follow => Some(AlertType::Follow),
            EventType::Gift => Some(AlertType::Gift),
            EventType::Comment => Some(AlertType::Comment),
            EventType::Like => Some(AlertType::Like),
            EventType::Share => Some(AlertType::Share),
            EventType::Join => Some(AlertType::Join),
            EventType::Command => Some(AlertType::Command),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConditions {
    /// Minimum `gift_count` of the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<i64>,
    /// Minimum `coins` of the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_coins: Option<i64>,
    #[serde(default)]
    pub vip_only: bool,
}

impl AlertConditions {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(min_count) = self.min_count {
            if event.get_i64("gift_count").unwrap_or(0) < min_count {
                return false;
            }
        }
        if let Some(min_coins) = self.min_coins {
            if event.get_i64("coins").unwrap_or(0) < min_coins {
                return false;
            }
        }
        !self.vip_only || event.get_bool("is_vip").unwrap_or(false)
    }
}

/// A named sound bound to an alert type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundAlert {
    pub alert_type: AlertType,
    pub name: String,
    /// Relative paths are resolved against the sounds directory.
    pub file_path: PathBuf,
    #[serde(default = "default_alert_volume")]
    pub volume: f32,
    #[serde(default, with = "duration_secs")]
    pub cooldown: Duration,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: AlertConditions,
}

fn default_alert_volume() -> f32 {
    0.7
}

impl SoundAlert {
    pub fn new(alert_type: AlertType, name: &str, file_path: impl Into<PathBuf>) -> Self {
        Self {
            alert_type,
            name: name.to_string(),
            file_path: file_path.into(),
            volume: default_alert_volume(),
            cooldown: Duration::ZERO,
            enabled: true,
            conditions: AlertConditions::default(),
        }
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn conditions(mut self, conditions: AlertConditions) -> Self {
        self.conditions = conditions;
        self
    }
}

/// Built-in alerts. The bigger gift tier comes first so it wins over the
/// plain one when both match.
pub fn default_alerts() -> Vec<SoundAlert> {
    vec![
        SoundAlert::new(AlertType::Follow, "New follower", "follow.wav")
            .volume(0.8)
            .cooldown(Duration::from_secs(2)),
        SoundAlert::new(AlertType::Gift, "Big gift", "big_gift.wav")
            .volume(1.0)
            .cooldown(Duration::from_secs(3))
            .conditions(AlertConditions {
                min_count: Some(10),
                ..Default::default()
            }),
        SoundAlert::new(AlertType::Gift, "Gift received", "gift.wav")
            .volume(0.9)
            .cooldown(Duration::from_secs(1))
            .conditions(AlertConditions {
                min_count: Some(1),
                ..Default::default()
            }),
        SoundAlert::new(AlertType::Comment, "New comment", "comment.wav")
            .volume(0.5)
            .cooldown(Duration::from_secs(5)),
        SoundAlert::new(AlertType::Like, "Like", "like.wav")
            .volume(0.4)
            .cooldown(Duration::from_secs(10)),
        SoundAlert::new(AlertType::Join, "Viewer joined", "join.wav")
            .volume(0.6)
            .cooldown(Duration::from_secs(30)),
        SoundAlert::new(AlertType::Command, "Command", "command.wav")
            .volume(0.5)
            .cooldown(Duration::from_secs(1)),
    ]
}

/// An accepted alert, ready for the player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAlert {
    pub name: String,
    pub path: PathBuf,
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Accepted(ResolvedAlert),
    /// No alert is registered for the type.
    Unmapped,
    /// Alerts exist but none is enabled, present on disk and matching.
    NoSuitable,
    CoolingDown { name: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub total_alerts: u64,
    pub alerts_skipped: u64,
    pub cooldown_blocks: u64,
}

#[derive(Debug, Default)]
struct AlertCounters {
    total_alerts: AtomicU64,
    alerts_skipped: AtomicU64,
    cooldown_blocks: AtomicU64,
}

/// Alert table with per-alert cooldowns.
#[derive(Debug)]
pub struct SoundAlerts {
    sounds_directory: PathBuf,
    alerts: RwLock<Vec<SoundAlert>>,
    cooldowns: CooldownGate,
    counters: AlertCounters,
}

impl SoundAlerts {
    pub fn new(sounds_directory: &Path, custom_alerts: &[SoundAlert]) -> Self {
        let mut alerts = default_alerts();
        alerts.extend(custom_alerts.iter().cloned());
        Self {
            sounds_directory: sounds_directory.to_path_buf(),
            alerts: RwLock::new(alerts),
            cooldowns: CooldownGate::new(),
            counters: AlertCounters::default(),
        }
    }

    pub fn sounds_directory(&self) -> &Path {
        &self.sounds_directory
    }

    pub fn resolve_path(&self, file_path: &Path) -> PathBuf {
        if file_path.is_absolute() {
            file_path.to_path_buf()
        } else {
            self.sounds_directory.join(file_path)
        }
    }

    /// Picks the first suitable alert of `alert_type` for `event` and claims
    /// its cooldown. A blocked alert does not consume a queue slot.
    pub async fn trigger(&self, alert_type: AlertType, event: &Event) -> TriggerOutcome {
        let candidates: Vec<SoundAlert> = self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| a.alert_type == alert_type)
            .cloned()
            .collect();
        if candidates.is_empty() {
            return TriggerOutcome::Unmapped;
        }

        let mut chosen = None;
        for alert in candidates {
            if !alert.enabled || !alert.conditions.matches(event) {
                continue;
            }
            let path = self.resolve_path(&alert.file_path);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                chosen = Some((alert, path));
                break;
            }
        }
        let Some((alert, path)) = chosen else {
            self.counters.alerts_skipped.fetch_add(1, Ordering::Relaxed);
            return TriggerOutcome::NoSuitable;
        };

        if !alert.cooldown.is_zero() && !self.cooldowns.try_acquire(&alert.name, alert.cooldown) {
            self.counters.cooldown_blocks.fetch_add(1, Ordering::Relaxed);
            debug!(target: "audio", alert = %alert.name, "Alert cooling down");
            return TriggerOutcome::CoolingDown { name: alert.name };
        }

        self.counters.total_alerts.fetch_add(1, Ordering::Relaxed);
        TriggerOutcome::Accepted(ResolvedAlert {
            name: alert.name,
            path,
            volume: alert.volume,
        })
    }

    pub async fn add_alert(&self, alert: SoundAlert) {
        info!(target: "audio", alert = %alert.name, alert_type = %alert.alert_type, "Custom alert added");
        self.alerts.write().await.push(alert);
    }

    /// Gives back the cooldown of an accepted alert that never got queued.
    pub fn release(&self, name: &str) {
        self.cooldowns.reset(name);
        self.counters.total_alerts.fetch_sub(1, Ordering::Relaxed);
    }

    pub async fn remove_alert(&self, alert_type: AlertType, name: &str) -> bool {
        let mut alerts = self.alerts.write().await;
        match alerts
            .iter()
            .position(|a| a.alert_type == alert_type && a.name == name)
        {
            Some(index) => {
                alerts.remove(index);
                self.cooldowns.reset(name);
                true
            }
            None => false,
        }
    }

    pub async fn set_enabled(&self, alert_type: AlertType, name: &str, enabled: bool) -> bool {
        let mut alerts = self.alerts.write().await;
        match alerts
            .iter_mut()
            .find(|a| a.alert_type == alert_type && a.name == name)
        {
            Some(alert) => {
                alert.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn list(&self) -> Vec<SoundAlert> {
        self.alerts.read().await.clone()
    }

    pub fn stats(&self) -> AlertStats {
        AlertStats {
            total_alerts: self.counters.total_alerts.load(Ordering::Relaxed),
            alerts_skipped: self.counters.alerts_skipped.load(Ordering::Relaxed),
            cooldown_blocks: self.counters.cooldown_blocks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sounds_dir(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            std::fs::write(dir.path().join(file), b"RIFF").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_gift_tiers() {
        let dir = sounds_dir(&["gift.wav", "big_gift.wav"]);
        let alerts = SoundAlerts::new(dir.path(), &[]);

        let small = Event::gift("a", "A", "Rose", 2, 1);
        match alerts.trigger(AlertType::Gift, &small).await {
            TriggerOutcome::Accepted(alert) => assert_eq!(alert.name, "Gift received"),
            other => panic!("unexpected {:?}", other),
        }

        let big = Event::gift("b", "B", "Lion", 12, 2);
        match alerts.trigger(AlertType::Gift, &big).await {
            TriggerOutcome::Accepted(alert) => {
                assert_eq!(alert.name, "Big gift");
                assert_eq!(alert.path, dir.path().join("big_gift.wav"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_skipped() {
        let dir = sounds_dir(&[]);
        let alerts = SoundAlerts::new(dir.path(), &[]);
        let outcome = alerts.trigger(AlertType::Follow, &Event::follow("a", "A", "1")).await;
        assert_eq!(outcome, TriggerOutcome::NoSuitable);
        assert_eq!(alerts.stats().alerts_skipped, 1);
        assert_eq!(
            alerts.trigger(AlertType::Milestone, &Event::new(EventType::Follow)).await,
            TriggerOutcome::Unmapped
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_blocks_without_consuming() {
        let dir = sounds_dir(&["follow.wav"]);
        let alerts = SoundAlerts::new(dir.path(), &[]);
        let event = Event::follow("a", "A", "1");

        assert!(matches!(alerts.trigger(AlertType::Follow, &event).await, TriggerOutcome::Accepted(_)));
        assert!(matches!(
            alerts.trigger(AlertType::Follow, &event).await,
            TriggerOutcome::CoolingDown { .. }
        ));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(alerts.trigger(AlertType::Follow, &event).await, TriggerOutcome::Accepted(_)));

        let stats = alerts.stats();
        assert_eq!(stats.total_alerts, 2);
        assert_eq!(stats.cooldown_blocks, 1);
    }

    #[tokio::test]
    async fn test_vip_only_custom_alert() {
        let dir = sounds_dir(&["vip.wav"]);
        let custom = SoundAlert::new(AlertType::Share, "VIP share", "vip.wav").conditions(AlertConditions {
            vip_only: true,
            ..Default::default()
        });
        let alerts = SoundAlerts::new(dir.path(), &[custom]);

        let regular = Event::new(EventType::Share).with("username", "x");
        assert_eq!(alerts.trigger(AlertType::Share, &regular).await, TriggerOutcome::NoSuitable);
        let vip = regular.with("is_vip", true);
        assert!(matches!(alerts.trigger(AlertType::Share, &vip).await, TriggerOutcome::Accepted(_)));
    }

    #[tokio::test]
    async fn test_enable_and_remove() {
        let dir = sounds_dir(&["join.wav"]);
        let alerts = SoundAlerts::new(dir.path(), &[]);
        let join = Event::new(EventType::Join);

        assert!(alerts.set_enabled(AlertType::Join, "Viewer joined", false).await);
        assert_eq!(alerts.trigger(AlertType::Join, &join).await, TriggerOutcome::NoSuitable);
        assert!(alerts.remove_alert(AlertType::Join, "Viewer joined").await);
        assert!(!alerts.remove_alert(AlertType::Join, "Viewer joined").await);
        assert_eq!(alerts.trigger(AlertType::Join, &join).await, TriggerOutcome::Unmapped);
    }

    #[test]
    fn test_custom_alert_from_json() {
        let alert: SoundAlert = serde_json::from_str(
            r#"{"alert_type": "gift", "name": "Lion", "file_path": "lion.wav", "cooldown": 5,
                "conditions": {"min_coins": 500}}"#,
        )
        .unwrap();
        assert_eq!(alert.cooldown, Duration::from_secs(5));
        assert_eq!(alert.conditions.min_coins, Some(500));
        assert!(alert.enabled);
        assert_eq!(alert.volume, 0.7);
    }
}
