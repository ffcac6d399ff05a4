use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use console_client_core::{DispatchError, LocalBridge, NativeBridge};
use serde_json::json;

use super::*;
use crate::entry::RequestLogEntry;
use crate::feed::REQUEST_LOG_EVENT;

fn request_json(id: &str, timestamp: i64, status: u16) -> Value {
    json!({
        "id": id,
        "timestamp": timestamp,
        "method": "POST",
        "url": "/v1/messages",
        "status": status,
        "duration": 42,
        "model": "claude-sonnet"
    })
}

/// In-process proxy backend: a log store plus the commands the request feed
/// needs.
struct Backend {
    bridge: Arc<LocalBridge>,
    logs: Arc<Mutex<Vec<Value>>>,
    fail_pulls: Arc<AtomicBool>,
}

impl Backend {
    fn new() -> Self {
        let bridge = Arc::new(LocalBridge::new());
        let logs = Arc::new(Mutex::new(Vec::<Value>::new()));
        let fail_pulls = Arc::new(AtomicBool::new(false));

        let store = logs.clone();
        let failing = fail_pulls.clone();
        bridge.register("get_proxy_logs_filtered", move |_| {
            if failing.load(Ordering::SeqCst) {
                return Err(DispatchError::Http {
                    status: 500,
                    message: "database locked".to_string(),
                });
            }
            let mut rows = store.lock().expect("logs lock").clone();
            rows.sort_by_key(|row| std::cmp::Reverse(row["timestamp"].as_i64()));
            Ok(Value::Array(rows))
        });

        let store = logs.clone();
        bridge.register("get_proxy_logs_count_filtered", move |_| {
            Ok(json!(store.lock().expect("logs lock").len()))
        });

        let store = logs.clone();
        bridge.register("get_proxy_stats", move |_| {
            let rows = store.lock().expect("logs lock");
            let success = rows
                .iter()
                .filter(|row| {
                    row["status"]
                        .as_u64()
                        .is_some_and(|status| (200..400).contains(&status))
                })
                .count();
            Ok(json!({
                "total_requests": rows.len(),
                "success_count": success,
                "error_count": rows.len() - success,
            }))
        });

        let store = logs.clone();
        bridge.register("clear_proxy_logs", move |_| {
            store.lock().expect("logs lock").clear();
            Ok(Value::Null)
        });

        Self {
            bridge,
            logs,
            fail_pulls,
        }
    }

    fn store(&self, row: Value) {
        self.logs.lock().expect("logs lock").push(row);
    }

    fn feed(&self) -> LiveFeed<RequestLogEntry> {
        LiveFeed::new(
            FeedSpec::with_defaults(FeedKind::Requests),
            Dispatcher::native(self.bridge.clone()),
        )
    }
}

/// Native host whose calls take a while to answer.
struct SlowBridge {
    inner: Arc<LocalBridge>,
    delay: Duration,
}

#[async_trait]
impl NativeBridge for SlowBridge {
    fn is_available(&self) -> bool {
        true
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, DispatchError> {
        tokio::time::sleep(self.delay).await;
        self.inner.invoke(command, args).await
    }

    async fn listen(&self, event: &str) -> Result<EventReceiver, DispatchError> {
        tokio::time::sleep(self.delay).await;
        self.inner.listen(event).await
    }
}

fn ids(feed: &LiveFeed<RequestLogEntry>) -> Vec<String> {
    feed.view().into_iter().map(|entry| entry.id).collect()
}

fn slow_feed(backend: &Backend) -> Arc<LiveFeed<RequestLogEntry>> {
    let slow = Arc::new(SlowBridge {
        inner: backend.bridge.clone(),
        delay: Duration::from_secs(1),
    });
    Arc::new(LiveFeed::new(
        FeedSpec::with_defaults(FeedKind::Requests),
        Dispatcher::native(slow),
    ))
}

fn counter(feed: &LiveFeed<RequestLogEntry>) -> (Arc<AtomicUsize>, EntrySubscription) {
    let seen = Arc::new(AtomicUsize::new(0));
    let handle = seen.clone();
    let subscription = feed.on_entry(move |_| {
        handle.fetch_add(1, Ordering::SeqCst);
    });
    (seen, subscription)
}

async fn wait(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn native_pushes_are_debounced_then_counts_refresh() {
    let backend = Backend::new();
    backend.store(request_json("a", 100, 200));
    backend.store(request_json("b", 200, 502));
    let feed = backend.feed();
    let (seen, _entries) = counter(&feed);

    assert_eq!(feed.enable().await, EnableOutcome::Started(Mechanism::Native));
    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("a", 100, 200));
    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("b", 200, 502));
    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("a", 100, 200));

    wait(100).await;
    assert_eq!(feed.pending_len(), 2);
    assert!(feed.view().is_empty());

    wait(500).await;
    assert_eq!(ids(&feed), ["b", "a"]);
    assert_eq!(feed.pending_len(), 0);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(feed.total(), Some(2));
    assert_eq!(
        feed.stats(),
        Some(LogStats {
            total_requests: 2,
            success_count: 1,
            error_count: 1,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn view_stays_bounded_under_push_volume() {
    let backend = Backend::new();
    let feed = LiveFeed::<RequestLogEntry>::new(
        FeedSpec::new(
            FeedKind::Requests,
            console_client_core::FeedSettings {
                capacity: 2,
                ..console_client_core::FeedSettings::requests()
            },
        ),
        Dispatcher::native(backend.bridge.clone()),
    );
    feed.enable().await;

    for (id, timestamp) in [("one", 1), ("two", 2), ("three", 3)] {
        backend.bridge.emit(REQUEST_LOG_EVENT, request_json(id, timestamp, 200));
    }
    wait(600).await;

    let stamps = feed
        .view()
        .iter()
        .map(|entry| entry.timestamp)
        .collect::<Vec<_>>();
    assert_eq!(stamps, [3, 2]);
}

#[tokio::test(start_paused = true)]
async fn disabled_feed_ignores_late_pushes() {
    let backend = Backend::new();
    let feed = backend.feed();
    feed.enable().await;

    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("x", 10, 200));
    wait(600).await;
    assert_eq!(ids(&feed), ["x"]);

    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("y", 20, 200));
    assert!(feed.disable());
    assert!(!feed.disable());
    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("z", 30, 200));
    wait(5_000).await;

    assert_eq!(ids(&feed), ["x"]);
    assert_eq!(feed.pending_len(), 0);
    assert_eq!(feed.state(), SubscriptionState::Idle);

    let stale_generation = feed.shared.lock().generation - 1;
    let late = serde_json::from_value::<RequestLogEntry>(request_json("w", 40, 200))
        .expect("request log");
    assert!(!feed.shared.push(stale_generation, late));
    assert_eq!(ids(&feed), ["x"]);
}

#[tokio::test(start_paused = true)]
async fn second_enable_is_reported_not_duplicated() {
    let backend = Backend::new();
    let feed = backend.feed();

    assert_eq!(feed.enable().await, EnableOutcome::Started(Mechanism::Native));
    assert_eq!(
        feed.enable().await,
        EnableOutcome::AlreadyActive(Mechanism::Native)
    );
    assert_eq!(backend.bridge.listener_count(REQUEST_LOG_EVENT), 1);

    assert!(feed.disable());
    assert_eq!(feed.enable().await, EnableOutcome::Started(Mechanism::Native));
}

#[tokio::test(start_paused = true)]
async fn failed_native_registration_degrades_to_polling() {
    let backend = Backend::new();
    backend.bridge.set_events_enabled(false);
    backend.store(request_json("a", 100, 200));
    let feed = backend.feed();
    let (seen, _entries) = counter(&feed);

    assert_eq!(feed.enable().await, EnableOutcome::Started(Mechanism::Polling));
    assert_eq!(backend.bridge.listener_count(REQUEST_LOG_EVENT), 0);

    wait(3_600).await;
    assert_eq!(ids(&feed), ["a"]);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    backend.store(request_json("b", 200, 200));
    wait(3_000).await;
    assert_eq!(ids(&feed), ["b", "a"]);
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    wait(6_000).await;
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(feed.total(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn closed_native_channel_switches_to_polling() {
    let backend = Backend::new();
    let feed = backend.feed();
    feed.enable().await;

    backend.bridge.close_event(REQUEST_LOG_EVENT);
    wait(10).await;
    assert_eq!(feed.mechanism(), Some(Mechanism::Polling));

    backend.store(request_json("after-restart", 500, 200));
    wait(3_600).await;
    assert_eq!(ids(&feed), ["after-restart"]);
}

#[tokio::test(start_paused = true)]
async fn authoritative_pull_replaces_view_and_drops_pending() {
    let backend = Backend::new();
    let feed = backend.feed();
    feed.enable().await;

    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("pushed", 300, 200));
    wait(100).await;
    assert_eq!(feed.pending_len(), 1);

    backend.store(request_json("a", 100, 200));
    backend.store(request_json("b", 200, 404));
    let outcome = feed.refresh(&LogQuery::default()).await.expect("pull");
    assert_eq!(
        outcome,
        RefreshOutcome::Applied {
            entries: 2,
            total: Some(2)
        }
    );
    assert_eq!(feed.pending_len(), 0);
    assert_eq!(ids(&feed), ["b", "a"]);

    wait(600).await;
    assert_eq!(ids(&feed), ["b", "a"]);
}

#[tokio::test(start_paused = true)]
async fn empty_pull_clears_unflushed_entry() {
    let backend = Backend::new();
    let feed = backend.feed();
    let (seen, _entries) = counter(&feed);
    feed.enable().await;

    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("late", 5, 200));
    wait(100).await;
    assert_eq!(feed.pending_len(), 1);

    feed.refresh(&LogQuery::default()).await.expect("pull");
    assert_eq!(feed.pending_len(), 0);
    assert!(feed.view().is_empty());

    wait(600).await;
    assert!(feed.view().is_empty());
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_pull_leaves_view_counts_and_pending() {
    let backend = Backend::new();
    backend.store(request_json("a", 100, 200));
    let feed = backend.feed();
    feed.refresh(&LogQuery::default()).await.expect("first pull");
    feed.enable().await;

    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("p", 150, 200));
    wait(100).await;
    backend.fail_pulls.store(true, Ordering::SeqCst);

    let error = feed
        .refresh(&LogQuery::default())
        .await
        .expect_err("pull fails");
    assert_eq!(
        error,
        TelemetryError::Dispatch(DispatchError::Http {
            status: 500,
            message: "database locked".to_string(),
        })
    );
    assert_eq!(ids(&feed), ["a"]);
    assert_eq!(feed.pending_len(), 1);
    assert_eq!(feed.total(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn pull_in_flight_during_disable_is_discarded() {
    let backend = Backend::new();
    backend.store(request_json("a", 100, 200));
    let feed = slow_feed(&backend);
    assert_eq!(feed.enable().await, EnableOutcome::Started(Mechanism::Native));

    let pulling = feed.clone();
    let pull = tokio::spawn(async move { pulling.refresh(&LogQuery::default()).await });
    wait(100).await;
    assert!(feed.disable());

    let outcome = pull.await.expect("join").expect("pull");
    assert_eq!(outcome, RefreshOutcome::Discarded);
    assert!(feed.view().is_empty());
    assert_eq!(feed.total(), None);
}

#[tokio::test(start_paused = true)]
async fn pull_in_flight_during_clear_is_discarded() {
    let backend = Backend::new();
    backend.store(request_json("a", 100, 200));
    let feed = slow_feed(&backend);
    feed.refresh(&LogQuery::default()).await.expect("first pull");
    assert_eq!(ids(&feed), ["a"]);

    let pulling = feed.clone();
    let pull = tokio::spawn(async move { pulling.refresh(&LogQuery::default()).await });
    wait(1_050).await;
    feed.clear_remote().await.expect("clear");

    let outcome = pull.await.expect("join").expect("pull");
    assert_eq!(outcome, RefreshOutcome::Discarded);
    assert!(feed.view().is_empty());
    assert_eq!(feed.total(), Some(0));
    assert!(backend.logs.lock().expect("logs lock").is_empty());
}

#[tokio::test(start_paused = true)]
async fn count_refresh_in_flight_during_disable_is_discarded() {
    let backend = Backend::new();
    backend.store(request_json("a", 100, 200));
    let feed = slow_feed(&backend);
    assert_eq!(feed.enable().await, EnableOutcome::Started(Mechanism::Native));

    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("a", 100, 200));
    wait(600).await;
    assert_eq!(ids(&feed), ["a"]);
    assert_eq!(feed.total(), None);

    assert!(feed.disable());
    wait(3_000).await;
    assert_eq!(feed.total(), None);
    assert_eq!(feed.stats(), None);
}

#[tokio::test(start_paused = true)]
async fn dropped_entry_subscription_stops_delivery() {
    let backend = Backend::new();
    let feed = backend.feed();

    let mut unmounted = Vec::new();
    for _ in 0..3 {
        let (seen, entries) = counter(&feed);
        feed.enable().await;
        drop(entries);
        assert!(feed.disable());
        unmounted.push(seen);
    }
    assert!(feed.shared.lock().handlers.is_empty());

    let (seen, _entries) = counter(&feed);
    feed.enable().await;
    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("a", 1, 200));
    wait(600).await;

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(
        unmounted
            .iter()
            .all(|seen| seen.load(Ordering::SeqCst) == 0)
    );
}

#[tokio::test(start_paused = true)]
async fn disable_during_start_cancels_subscription() {
    let backend = Backend::new();
    let feed = slow_feed(&backend);

    let starting = feed.clone();
    let start = tokio::spawn(async move { starting.enable().await });
    wait(100).await;
    assert_eq!(feed.state(), SubscriptionState::Starting);
    assert_eq!(feed.enable().await, EnableOutcome::AlreadyStarting);
    assert!(feed.disable());

    assert_eq!(start.await.expect("join"), EnableOutcome::Cancelled);
    assert_eq!(feed.state(), SubscriptionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn undecodable_pushes_are_skipped() {
    let backend = Backend::new();
    let feed = backend.feed();
    feed.enable().await;

    backend.bridge.emit(REQUEST_LOG_EVENT, json!({ "unexpected": true }));
    backend.bridge.emit(REQUEST_LOG_EVENT, request_json("ok", 1, 200));
    wait(600).await;
    assert_eq!(ids(&feed), ["ok"]);
    assert_eq!(feed.mechanism(), Some(Mechanism::Native));
}

#[tokio::test(start_paused = true)]
async fn clear_remote_empties_store_and_view() {
    let backend = Backend::new();
    backend.store(request_json("a", 1, 200));
    let feed = backend.feed();
    feed.refresh(&LogQuery::default()).await.expect("pull");
    assert_eq!(ids(&feed), ["a"]);

    feed.clear_remote().await.expect("clear");
    assert!(feed.view().is_empty());
    assert_eq!(feed.total(), Some(0));
    assert_eq!(feed.stats(), Some(LogStats::default()));
    assert!(backend.logs.lock().expect("logs lock").is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_feed_stops_native_listener() {
    let backend = Backend::new();
    let feed = backend.feed();
    feed.enable().await;
    assert_eq!(backend.bridge.listener_count(REQUEST_LOG_EVENT), 1);

    drop(feed);
    wait(10).await;
    assert_eq!(backend.bridge.listener_count(REQUEST_LOG_EVENT), 0);
}
