use std::{sync::Arc, time::Duration};

use tikbot::{
    music::{Platform, TrackInfo},
    platform::ConsoleClient,
    Event, EventType, TikBot,
};

use super::quiet_config;

#[tokio::test]
async fn test_duplicate_song_request_rejected() {
    let mut config = quiet_config();
    config.features.music = true;
    config.music.auto_play = false;
    config.music.admin_users = vec!["mod".to_string()];
    config.music.catalog = vec![
        TrackInfo::new("Blinding Lights", "The Weeknd", Duration::from_secs(200), Platform::Spotify),
        TrackInfo::new("Levitating", "Dua Lipa", Duration::from_secs(203), Platform::Youtube),
    ];
    let bot = TikBot::new(
        config,
        Arc::new(ConsoleClient::from_reader("streamer", tokio::io::empty())),
    );
    bot.start().await.unwrap();
    let hub = bot.hub().clone();
    let music = bot.music().await.unwrap();

    hub.emit(Event::comment("ann", "Ann", "!play blinding lights", "1")).await;
    hub.emit(Event::comment("bob", "Bob", "!song Blinding  Lights", "2")).await;
    assert_eq!(music.queue().len().await, 1);
    assert_eq!(hub.history(Some(EventType::MusicRequestAdded), 10).await.len(), 1);

    let again = music.request_song("blinding lights", "cid", "Cid").await;
    assert!(!again.success);
    assert_eq!(
        again.error.as_deref(),
        Some("Already in queue: Blinding Lights - The Weeknd")
    );
    assert_eq!(music.queue().len().await, 1);

    hub.emit(Event::comment("bob", "Bob", "!play levitating", "2")).await;
    assert_eq!(music.queue().len().await, 2);

    // Only admins may clear the queue.
    hub.emit(Event::comment("bob", "Bob", "!clearqueue", "2")).await;
    assert_eq!(music.queue().len().await, 2);
    hub.emit(Event::comment("mod", "Mod", "!clearqueue", "3")).await;
    assert_eq!(music.queue().len().await, 0);

    bot.stop().await.unwrap();
}
