//! Tests for the remote list controller
//!
//! These tests verify that:
//! - Overlapping fetches resolve last-request-wins
//! - Failures keep the previous rows and publish a notification
//! - Polling refreshes on its period and stops with the page
//! - Grid, search and date edits reach the remote source
//! - Concurrent edits and hung fetches leave the list consistent

use anyhow::Result;
use chrono::TimeZone;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use table_query::prelude::*;
use tokio::sync::oneshot;
use tokio_stream::StreamExt;

// =============================================================================
// Test Sources
// =============================================================================

/// Source whose fetches resolve only when the test releases them, keyed by page
#[derive(Default)]
struct GatedSource {
    gates: Mutex<HashMap<u64, oneshot::Receiver<Result<RemotePage, String>>>>,
}

impl GatedSource {
    fn gate(&self, page: u64) -> oneshot::Sender<Result<RemotePage, String>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(page, rx);
        tx
    }
}

#[async_trait]
impl RemoteSource for GatedSource {
    async fn fetch(&self, options: QueryOptions) -> Result<RemotePage> {
        let gate = self
            .gates
            .lock()
            .unwrap()
            .remove(&options.pagination.page)
            .ok_or_else(|| anyhow::anyhow!("no gate for page {}", options.pagination.page))?;
        match gate.await {
            Ok(Ok(page)) => Ok(page),
            Ok(Err(message)) => Err(anyhow::anyhow!(message)),
            Err(_) => Err(anyhow::anyhow!("gate dropped")),
        }
    }
}

/// In-memory source counting its fetches
struct CountingSource {
    inner: InMemorySource,
    fetches: AtomicUsize,
}

impl CountingSource {
    fn new(rows: Vec<Value>) -> Self {
        Self {
            inner: InMemorySource::with_rows(rows),
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for CountingSource {
    async fn fetch(&self, options: QueryOptions) -> Result<RemotePage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(options).await
    }
}

/// Source whose first fetch never resolves
struct StallingSource {
    inner: InMemorySource,
    fetches: AtomicUsize,
}

impl StallingSource {
    fn new(rows: Vec<Value>) -> Self {
        Self {
            inner: InMemorySource::with_rows(rows),
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for StallingSource {
    async fn fetch(&self, options: QueryOptions) -> Result<RemotePage> {
        if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        self.inner.fetch(options).await
    }
}

fn members() -> Vec<Value> {
    vec![
        json!({"id": 1, "userid": "alice01", "profiles": {"nickname": "Alice"}, "users": {"role": "user"},
               "level": 2, "status": "pending", "balance": 500, "point": 10, "deposit_total": 1000,
               "withdrawal_total": 200, "created_at": "2024-03-02T10:00:00.000Z"}),
        json!({"id": 2, "userid": "bob77", "profiles": {"nickname": "Bobby"}, "users": {"role": "user"},
               "level": 1, "status": "approved", "balance": 150, "point": 5, "deposit_total": 300,
               "withdrawal_total": 0, "created_at": "2024-03-15T08:30:00.000Z"}),
        json!({"id": 3, "userid": "carol", "profiles": {"nickname": "malice"}, "users": {"role": "partner"},
               "level": 2, "status": "approved", "balance": 900, "point": 0, "deposit_total": 0,
               "withdrawal_total": 0, "created_at": "2024-04-01T00:00:00.000Z"}),
        json!({"id": 4, "userid": "dave", "profiles": {"nickname": "Dave"}, "users": {"role": "user"},
               "level": 3, "status": "pending", "balance": 20, "point": 1, "deposit_total": 50,
               "withdrawal_total": 10, "created_at": "2024-05-20T12:00:00.000Z"}),
    ]
}

fn page_of(ids: &[i64], total: u64) -> RemotePage {
    RemotePage::new(ids.iter().map(|id| json!({"id": id})).collect(), total)
}

fn on_page(page: u64) -> QueryOptions {
    QueryOptions::default().with_pagination(Pagination::new(page, 25).unwrap())
}

fn keys(snapshot: &ListSnapshot) -> Vec<String> {
    snapshot.data_rows().map(|r| r.key.clone()).collect()
}

// =============================================================================
// Ordering Tests
// =============================================================================

mod ordering_tests {
    use super::*;

    #[tokio::test]
    async fn test_older_response_arriving_late_is_discarded() {
        let source = Arc::new(GatedSource::default());
        let controller = RemoteListController::builder("orders", source.clone()).build();

        let release_a = source.gate(1);
        let release_b = source.gate(2);
        let a = tokio::spawn(controller.replace_options(on_page(1)));
        let b = tokio::spawn(controller.replace_options(on_page(2)));

        release_b.send(Ok(page_of(&[20, 21], 2))).unwrap();
        let outcome_b = b.await.unwrap();
        assert_eq!(
            outcome_b,
            FetchOutcome::Applied {
                seq: 2,
                rows: 2,
                total: 2
            }
        );

        release_a.send(Ok(page_of(&[10], 1))).unwrap();
        let outcome_a = a.await.unwrap();
        assert_eq!(outcome_a, FetchOutcome::Discarded { seq: 1, latest: 2 });

        let state = controller.state();
        assert_eq!(state.status, LoadStatus::Ready);
        assert_eq!(keys(&state), vec!["20", "21"]);
        assert_eq!(state.applied_seq, 2);
        assert_eq!(state.options.pagination.page, 2);
    }

    #[tokio::test]
    async fn test_older_response_arriving_first_is_still_discarded() {
        let source = Arc::new(GatedSource::default());
        let controller = RemoteListController::builder("orders", source.clone()).build();

        let release_a = source.gate(1);
        let release_b = source.gate(2);
        let a = controller.replace_options(on_page(1));
        let b = controller.replace_options(on_page(2));

        release_a.send(Ok(page_of(&[10], 1))).unwrap();
        release_b.send(Ok(page_of(&[20], 1))).unwrap();
        let (outcome_a, outcome_b) = tokio::join!(a, b);

        assert!(matches!(outcome_a, FetchOutcome::Discarded { seq: 1, .. }));
        assert!(matches!(outcome_b, FetchOutcome::Applied { seq: 2, .. }));
        assert_eq!(keys(&controller.state()), vec!["20"]);
    }

    #[tokio::test]
    async fn test_stale_failure_does_not_flip_status() {
        let source = Arc::new(GatedSource::default());
        let controller = RemoteListController::builder("orders", source.clone()).build();

        let release_a = source.gate(1);
        let release_b = source.gate(2);
        let a = tokio::spawn(controller.replace_options(on_page(1)));
        let b = tokio::spawn(controller.replace_options(on_page(2)));

        release_b.send(Ok(page_of(&[20], 1))).unwrap();
        b.await.unwrap();
        release_a.send(Err("timeout".to_string())).unwrap();
        assert!(matches!(a.await.unwrap(), FetchOutcome::Discarded { .. }));

        let state = controller.state();
        assert_eq!(state.status, LoadStatus::Ready);
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_unmount_discards_in_flight_fetch() {
        let source = Arc::new(GatedSource::default());
        let controller = RemoteListController::builder("orders", source.clone()).build();

        let release = source.gate(1);
        let pending = tokio::spawn(controller.mount());
        controller.unmount();
        release.send(Ok(page_of(&[1], 1))).unwrap();

        assert_eq!(pending.await.unwrap(), FetchOutcome::Ignored);
        assert!(controller.state().rows.is_empty());
        assert_eq!(controller.refresh().await, FetchOutcome::Ignored);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_edits_are_not_lost() {
        let source = Arc::new(InMemorySource::with_rows(members()));
        let controller = Arc::new(RemoteListController::builder("edits", source).build());

        let mut tasks = Vec::new();
        for i in 0..32 {
            let controller = Arc::clone(&controller);
            tasks.push(tokio::spawn(async move {
                controller
                    .set_field(&format!("f{}", i), Some("x".into()), Op::Eq)
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let options = controller.options();
        for i in 0..32 {
            assert!(options.filters_on(&format!("f{}", i)), "edit f{} was lost", i);
        }
        let state = controller.state();
        assert_eq!(state.applied_seq, 32);
        assert_eq!(state.status, LoadStatus::Ready);
    }
}

// =============================================================================
// Failure Tests
// =============================================================================

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_keeps_previous_rows() {
        let source = Arc::new(InMemorySource::with_rows(members()));
        let controller = RemoteListController::builder("members", source.clone()).build();
        controller.mount().await;
        let loaded = controller.state();
        assert_eq!(loaded.total, 4);

        source.fail_next("connection reset").unwrap();
        let outcome = controller.refresh().await;
        assert!(matches!(outcome, FetchOutcome::Failed { seq: 2, .. }));

        let state = controller.state();
        assert_eq!(state.status, LoadStatus::Error);
        assert_eq!(state.rows, loaded.rows);
        assert_eq!(state.total, 4);
        assert_eq!(state.applied_seq, 1);
        assert_eq!(state.last_error.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn test_failure_publishes_notification() {
        let source = Arc::new(InMemorySource::with_rows(members()));
        let controller = RemoteListController::builder("members", source.clone()).build();
        let mut notifications = controller.notifications().subscribe();

        controller.mount().await;
        let loaded = notifications.recv().await.unwrap();
        assert_eq!(
            loaded.event,
            ListEvent::Loaded {
                list: "members".to_string(),
                seq: 1,
                rows: 4,
                total: 4
            }
        );

        source.fail_next("502 Bad Gateway").unwrap();
        controller.refresh().await;
        let failed = notifications.recv().await.unwrap();
        assert!(failed.event.is_failure());
        assert_eq!(failed.event.list(), "members");
        assert_eq!(failed.event.seq(), 2);
    }

    #[tokio::test]
    async fn test_recovery_clears_error() {
        let source = Arc::new(InMemorySource::with_rows(members()));
        let controller = RemoteListController::builder("members", source.clone()).build();

        source.fail_next("down").unwrap();
        controller.mount().await;
        assert_eq!(controller.status(), LoadStatus::Error);

        controller.refresh().await;
        let state = controller.state();
        assert_eq!(state.status, LoadStatus::Ready);
        assert!(state.last_error.is_none());
        assert_eq!(state.rows.len(), 4);
    }

    #[tokio::test]
    async fn test_shared_bus_across_lists() {
        let bus = NotificationBus::new(16);
        let mut rx = bus.subscribe();
        let source: Arc<dyn RemoteSource> = Arc::new(InMemorySource::new());
        let first = RemoteListController::builder("first", source.clone())
            .notifications(bus.clone())
            .build();
        let second = RemoteListController::builder("second", source)
            .notifications(bus)
            .build();

        first.mount().await;
        second.mount().await;
        assert_eq!(rx.recv().await.unwrap().event.list(), "first");
        assert_eq!(rx.recv().await.unwrap().event.list(), "second");
    }
}

// =============================================================================
// Polling Tests
// =============================================================================

mod polling_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_polling_refreshes_each_period() {
        let source = Arc::new(CountingSource::new(members()));
        let controller = RemoteListController::builder("live", source.clone()).build();
        controller.mount().await;

        controller.start_polling(Duration::from_secs(2)).unwrap();
        assert!(controller.is_polling());

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(source.fetches(), 3);
        assert_eq!(controller.state().applied_seq, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_stops_polling() {
        let source = Arc::new(CountingSource::new(members()));
        let controller = RemoteListController::builder("live", source.clone()).build();
        controller.mount().await;
        controller.start_polling(Duration::from_secs(1)).unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        controller.unmount();
        let fetched = source.fetches();
        assert!(!controller.is_polling());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.fetches(), fetched);
        assert!(controller.start_polling(Duration::from_secs(1)).is_ok());
        assert!(!controller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_controller_stops_polling() {
        let source = Arc::new(CountingSource::new(members()));
        let controller = RemoteListController::builder("live", source.clone()).build();
        controller.start_polling(Duration::from_secs(1)).unwrap();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(source.fetches(), 1);
        drop(controller);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fetch_does_not_stall_polling() {
        let source = Arc::new(StallingSource::new(members()));
        let controller = RemoteListController::builder("live", source.clone()).build();
        let hung = tokio::spawn(controller.mount());
        controller.start_polling(Duration::from_secs(2)).unwrap();

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        assert_eq!(source.fetches(), 31);
        let state = controller.state();
        assert_eq!(state.status, LoadStatus::Ready);
        assert_eq!(state.applied_seq, 31);
        assert_eq!(keys(&state).len(), 4);
        assert!(!hung.is_finished());

        controller.unmount();
        hung.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_loop() {
        let source = Arc::new(CountingSource::new(members()));
        let controller = RemoteListController::builder("live", source.clone()).build();
        controller.start_polling(Duration::from_secs(1)).unwrap();
        controller.start_polling(Duration::from_secs(10)).unwrap();

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        assert_eq!(source.fetches(), 0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.fetches(), 1);

        controller.stop_polling();
        assert!(!controller.is_polling());
    }
}

// =============================================================================
// Edit Tests
// =============================================================================

mod edit_tests {
    use super::*;

    fn direct_members(source: Arc<dyn RemoteSource>) -> RemoteListController {
        let config = ConsoleConfig::default_config();
        let list = config.find_list("direct_member_list").unwrap();
        RemoteListController::from_config(list, source)
    }

    #[tokio::test]
    async fn test_seeded_list_with_total_row() {
        let controller = direct_members(Arc::new(InMemorySource::with_rows(members())));
        controller.mount().await;

        let state = controller.state();
        // Partner row is excluded by the seed
        assert_eq!(keys(&state), vec!["1", "2", "4"]);
        let total = state.total_row().unwrap();
        assert_eq!(total.kind, RowKind::Total);
        assert!(!total.is_actionable());
        assert_eq!(total.data["balance"], json!(670));
        assert_eq!(total.data["deposit_total"], json!(1350));
        assert_eq!(state.rows[0].key, table_query::controller::TOTAL_ROW_KEY);
    }

    #[tokio::test]
    async fn test_quick_search_is_case_insensitive_by_default() {
        let controller = direct_members(Arc::new(InMemorySource::with_rows(members())));
        controller.mount().await;

        controller.quick_search("ali").await;
        assert_eq!(keys(&controller.state()), vec!["1"]);

        controller.set_case_sensitive(true);
        controller.quick_search("Ali").await;
        assert_eq!(keys(&controller.state()), vec!["1"]);
        controller.quick_search("ALI").await;
        assert!(keys(&controller.state()).is_empty());

        controller.quick_search("").await;
        assert_eq!(keys(&controller.state()).len(), 3);
    }

    #[tokio::test]
    async fn test_table_event_filters_and_sorts() {
        let controller = direct_members(Arc::new(InMemorySource::with_rows(members())));
        controller.mount().await;

        let mut filters = ColumnFilters::new();
        filters.insert("status".to_string(), Some(vec!["pending".into()]));
        let event = TableEvent {
            pagination: TablePagination::new(1, 25),
            filters,
            sorter: Sorter::Single(SorterResult::column("balance", SortOrder::Descend)),
            extra: TableExtra {
                action: TableAction::Filter,
            },
        };
        controller.on_table_event(&event).await;
        assert_eq!(keys(&controller.state()), vec!["1", "4"]);

        let mut cleared = event.clone();
        cleared.filters.insert("status".to_string(), None);
        controller.on_table_event(&cleared).await;
        assert_eq!(keys(&controller.state()), vec!["1", "2", "4"]);
    }

    #[tokio::test]
    async fn test_period_and_selector() {
        let controller = direct_members(Arc::new(InMemorySource::with_rows(members())));
        controller.mount().await;

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap();
        controller.set_period(Some(start), Some(end)).await;
        assert!(controller.options().filters_on("created_at"));

        controller
            .set_field("level", Some(2i64.into()), Op::Eq)
            .await;
        assert_eq!(keys(&controller.state()), vec!["1"]);

        controller.set_period(None, None).await;
        assert!(!controller.options().filters_on("created_at"));
        assert_eq!(keys(&controller.state()), vec!["1"]);
    }

    #[tokio::test]
    async fn test_unaddressable_page_does_not_panic() {
        let controller = direct_members(Arc::new(InMemorySource::with_rows(members())));
        controller.mount().await;
        let before = controller.options();

        let event = TableEvent {
            pagination: TablePagination::new(u64::MAX, 25),
            ..TableEvent::default()
        };
        controller.on_table_event(&event).await;
        let state = controller.state();
        assert_eq!(state.status, LoadStatus::Ready);
        assert_eq!(state.options, before);
        assert_eq!(keys(&state), vec!["1", "2", "4"]);

        let far = Pagination {
            page: u64::MAX,
            per_page: 25,
        };
        let outcome = controller.replace_options(before.clone().with_pagination(far)).await;
        assert!(matches!(outcome, FetchOutcome::Applied { rows: 0, total: 3, .. }));
        let state = controller.state();
        assert!(keys(&state).is_empty());
        assert_eq!(state.pagination.from, 0);
        assert!(!state.pagination.has_next);
        assert!(state.pagination.has_prev);
    }

    #[tokio::test]
    async fn test_updates_stream_reports_transitions() {
        let controller =
            RemoteListController::builder("stream", Arc::new(InMemorySource::with_rows(members())))
                .build();
        let mut updates = controller.updates();

        let first = updates.next().await.unwrap();
        assert_eq!(first.status, LoadStatus::Idle);

        controller.mount().await;
        let latest = updates.next().await.unwrap();
        assert_eq!(latest.status, LoadStatus::Ready);
        assert_eq!(latest.pagination.total, 4);
    }
}

