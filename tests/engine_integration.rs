//! End-to-end tests for the application context

use std::sync::Arc;
use std::time::Duration;

use clipstash::clipboard::{ClipboardSource, ContentType, MemoryClipboard};
use clipstash::history::{ClipboardItem, HistoryStore, StoreOptions};
use clipstash::markdown::MarkdownConverter;
use clipstash::{AppContext, Config};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn monitoring_config(max_items: usize) -> Config {
    Config {
        max_items,
        auto_monitor_enabled: true,
        polling_interval: 60.0,
        ..Config::default()
    }
}

fn build(config: Config) -> (AppContext, Arc<MemoryClipboard>) {
    let clipboard = Arc::new(MemoryClipboard::new());
    let store = Arc::new(HistoryStore::open_in_memory(StoreOptions::default()).unwrap());
    let context = AppContext::new(
        config,
        store,
        Arc::clone(&clipboard) as Arc<dyn ClipboardSource>,
        MarkdownConverter::html().unwrap(),
    );
    (context, clipboard)
}

/// Wait until a snapshot satisfies `done`
async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<Vec<ClipboardItem>>, done: F) -> Vec<ClipboardItem>
where
    F: Fn(&[ClipboardItem]) -> bool,
{
    loop {
        let items = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no snapshot in time")
            .expect("subscription closed");
        if done(&items) {
            return items;
        }
    }
}

#[tokio::test]
async fn test_captures_are_classified_and_saved() {
    let (context, clipboard) = build(monitoring_config(50));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = context.subscribe(move |items| {
        let _ = tx.send(items);
    });
    context.start();

    clipboard.set_text("https://example.com/path");
    assert!(context.detector().poll());
    clipboard.set_text("just some text");
    assert!(context.detector().poll());

    let items = wait_for(&mut rx, |items| items.len() == 2).await;
    assert_eq!(items[0].content, "just some text");
    assert_eq!(items[0].content_type, ContentType::Text);
    assert_eq!(items[1].content_type, ContentType::Url);
    assert!(items.iter().all(|item| !item.is_pinned));

    context.shutdown();
}

#[tokio::test]
async fn test_auto_save_evicts_beyond_max_items() {
    let (context, clipboard) = build(monitoring_config(2));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = context.subscribe(move |items| {
        let _ = tx.send(items);
    });

    for text in ["a", "b", "c"] {
        clipboard.set_text(text);
        context.detector().poll();
    }

    let items = wait_for(&mut rx, |items| {
        items.first().is_some_and(|item| item.content == "c")
    })
    .await;
    let contents: Vec<_> = items.iter().map(|i| i.content.as_str()).collect();
    assert_eq!(contents, vec!["c", "b"]);

    // Eviction runs right after the save that produced the snapshot.
    timeout(Duration::from_secs(5), async {
        while context.store().count().await.unwrap() != 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("capacity not enforced");
}

#[tokio::test]
async fn test_monitoring_disabled_saves_nothing() {
    let (context, clipboard) = build(Config {
        polling_interval: 60.0,
        ..Config::default()
    });
    context.start();

    clipboard.set_text("not saved");
    assert!(context.detector().poll());
    assert_eq!(
        context.detector().current_content().as_deref(),
        Some("not saved")
    );

    // Pinning still works with monitoring off.
    let item = context.pin_current_clipboard().await.unwrap().unwrap();
    assert_eq!(item.content, "not saved");

    tokio::task::yield_now().await;
    assert_eq!(context.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_pin_on_save_setting() {
    let (context, _) = build(Config {
        pin_on_save: true,
        ..monitoring_config(10)
    });

    let item = context
        .auto_save("remember me", ContentType::Text)
        .await
        .unwrap()
        .unwrap();
    assert!(item.is_pinned);
}

#[tokio::test]
async fn test_open_uses_configured_database() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        database_path: temp_dir.path().join("data").join("clipstash.db"),
        ..Config::default()
    };

    {
        let context = AppContext::open(config.clone(), Arc::new(MemoryClipboard::new())).unwrap();
        context.pin_text("persisted").await.unwrap();
    }

    let context = AppContext::open(config, Arc::new(MemoryClipboard::new())).unwrap();
    let items = context.search("PERSIST").await.unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].is_pinned);
}
