mod bot_scenarios_test;
mod hub_test;
mod music_scenarios_test;

use std::{future::Future, time::Duration};

use tikbot::config::{BotConfig, FeatureFlags};

/// Default config with every optional subsystem switched off.
pub fn quiet_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.features = FeatureFlags {
        tts: false,
        sound_alerts: false,
        music: false,
        ai: false,
        overlay: false,
        analytics: false,
        ..FeatureFlags::default()
    };
    config
}

/// Polls `check` until it holds, for about a second.
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
