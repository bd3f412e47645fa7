use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tikbot::event::{Event, EventHandler, EventType, HandlerError, HandlerResult};
use tokio::time::Instant;

async fn explode(_event: Arc<Event>) -> HandlerResult {
    panic!("bug in handler")
}

#[tokio::test]
async fn test_failing_gift_handler_is_isolated() {
    let hub = EventHandler::new();
    let thanked = Arc::new(AtomicBool::new(false));

    hub.subscribe(EventType::Gift, "broken", |_| async {
        Err(HandlerError::failed("sound device gone"))
    });
    hub.subscribe(EventType::Gift, "panicking", explode);
    let flag = thanked.clone();
    hub.subscribe(EventType::Gift, "thanks", move |event| {
        let flag = flag.clone();
        async move {
            assert_eq!(event.get_str("gift_name"), Some("Rose"));
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }
    });

    let summary = hub.emit(Event::gift("alice", "Alice", "Rose", 1, 5655)).await;
    assert_eq!((summary.handlers, summary.failed), (3, 2));
    assert!(thanked.load(Ordering::SeqCst));

    // The hub keeps delivering afterwards.
    thanked.store(false, Ordering::SeqCst);
    hub.emit(Event::gift("bob", "Bob", "Rose", 2, 5655)).await;
    assert!(thanked.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_handlers_run_concurrently() {
    let hub = EventHandler::new();
    for name in ["slow_a", "slow_b", "slow_c"] {
        hub.subscribe(EventType::Comment, name, |_| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        });
    }

    let started = Instant::now();
    hub.emit(Event::comment("ann", "Ann", "hi", "1")).await;
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[tokio::test]
async fn test_history_keeps_latest_thousand() {
    let hub = EventHandler::new();
    for n in 0..1250_i64 {
        hub.emit(Event::new(EventType::Like).with("n", n)).await;
    }

    let history = hub.history(None, 5000).await;
    assert_eq!(history.len(), 1000);
    let numbers: Vec<i64> = history.iter().filter_map(|e| e.get_i64("n")).collect();
    assert_eq!(numbers, (250..1250).collect::<Vec<_>>());

    let latest = hub.history(Some(EventType::Like), 3).await;
    let latest: Vec<i64> = latest.iter().filter_map(|e| e.get_i64("n")).collect();
    assert_eq!(latest, vec![1247, 1248, 1249]);
}

#[tokio::test]
async fn test_observer_sees_emissions_in_order() {
    let hub = EventHandler::new();
    let mut observer = hub.observe();
    hub.emit(Event::follow("a", "A", "1")).await;
    hub.emit_simple(EventType::Share, [("username", "b")]).await;

    assert_eq!(observer.recv().await.unwrap().event_type(), EventType::Follow);
    let share = observer.recv().await.unwrap();
    assert_eq!(share.event_type(), EventType::Share);
    assert_eq!(share.get_str("username"), Some("b"));
}
