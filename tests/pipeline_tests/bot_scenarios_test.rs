use std::{sync::Arc, time::Duration};

use tikbot::{
    platform::{ConsoleClient, PlatformClient},
    EventType, TikBot,
};

use super::{quiet_config, wait_for};

fn console(script: &'static str) -> Arc<dyn PlatformClient> {
    Arc::new(ConsoleClient::from_reader("streamer", script.as_bytes()))
}

#[tokio::test]
async fn test_stats_command_over_console() {
    let mut config = quiet_config();
    config.features.analytics = true;
    config.features.overlay = true;
    let bot = TikBot::new(
        config,
        console("ann: hello everyone\n/gift cid Rose 3\nbob: !stats\n"),
    );
    bot.start().await.unwrap();

    let hub = bot.hub().clone();
    assert!(
        wait_for(|| {
            let hub = hub.clone();
            async move { !hub.history(Some(EventType::Command), 1).await.is_empty() }
        })
        .await
    );
    // Notifications are handled concurrently; let the rest settle.
    assert!(
        wait_for(|| {
            let stats = bot.get_stats();
            async move { stats.messages_received == 2 && stats.gifts_received == 1 }
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let command = &hub.history(Some(EventType::Command), 1).await[0];
    assert_eq!(command.get_str("username"), Some("bob"));
    assert!(command
        .get_str("response")
        .is_some_and(|r| r.starts_with("📊 Stats - messages: ")));

    let reply = &hub.history(Some(EventType::AutoResponse), 1).await[0];
    assert_eq!(reply.get_str("keyword"), Some("hello"));

    let analytics = bot.analytics().await.unwrap().snapshot().await;
    assert_eq!(analytics.event_counts["comment"], 2);
    assert_eq!(analytics.gift_totals["Rose"], 3);
    let overlay = bot.overlay().await.unwrap().snapshot().await;
    assert_eq!(overlay.recent_chat.len(), 2);

    bot.stop().await.unwrap();
    assert!(!bot.get_stats().is_running);
    assert_eq!(hub.history(Some(EventType::BotStop), 5).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_console_disconnect_reconnects_after_delay() {
    let mut config = quiet_config();
    config.tiktok.reconnect_delay = Duration::from_secs(5);
    let bot = TikBot::new(config, console("/disconnect\n"));
    bot.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(4900)).await;
    let hub = bot.hub().clone();
    assert_eq!(hub.history(Some(EventType::Disconnect), 10).await.len(), 1);
    assert_eq!(hub.history(Some(EventType::Connect), 10).await.len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hub.history(Some(EventType::Connect), 10).await.len(), 2);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(hub.history(Some(EventType::Connect), 10).await.len(), 2);
    bot.stop().await.unwrap();
}
