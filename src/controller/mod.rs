//! Per-page list orchestration
//!
//! A [`RemoteListController`] owns one page's [`QueryOptions`], issues a
//! fetch whenever they are replaced, and turns the remote page into row
//! view-models.
//!
//! ```text
//!            mount()                  fetch ok
//!   Idle ─────────────▶ Loading ─────────────────▶ Ready
//!                          ▲  │                      │
//!        replace_options() │  │ fetch failed         │ replace_options() / poll
//!                          │  ▼                      │
//!                        Error ◀─────────────────────┘
//! ```
//!
//! Ordering is last-request-wins: every issue takes the next sequence number
//! and a resolved fetch is applied only while its number is still the latest.
//! A slow older response can never overwrite a newer one.

pub mod polling;
pub mod rows;

pub use polling::PollingHandle;
pub use rows::{RowKind, RowMapper, RowView, TOTAL_ROW_KEY, TotalRowSpec};

use crate::config::ListConfig;
use crate::core::codec::{TableEvent, TableOptionsCodec};
use crate::core::error::{ConfigError, NetworkError, TableQueryError};
use crate::core::events::{ListEvent, NotificationBus};
use crate::core::predicate::{FilterValue, Op};
use crate::core::query::{PaginationMeta, QueryOptions};
use crate::core::source::RemoteSource;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Lifecycle state of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

/// What happened to one issued fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Rows are now displayed
    Applied { seq: u64, rows: usize, total: u64 },
    /// A newer request was issued before this one resolved
    Discarded { seq: u64, latest: u64 },
    /// The fetch failed; the previous rows stay displayed
    Failed { seq: u64, error: NetworkError },
    /// The controller was unmounted; nothing was issued or applied
    Ignored,
}

/// Point-in-time view of a list, published after every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListSnapshot {
    pub status: LoadStatus,
    pub options: QueryOptions,
    pub rows: Vec<RowView>,
    pub total: u64,
    pub pagination: PaginationMeta,
    /// Sequence number of the fetch whose rows are displayed (0 before any)
    pub applied_seq: u64,
    pub last_error: Option<String>,
}

impl ListSnapshot {
    /// Rows excluding the synthetic total row
    pub fn data_rows(&self) -> impl Iterator<Item = &RowView> {
        self.rows.iter().filter(|r| r.is_actionable())
    }

    pub fn total_row(&self) -> Option<&RowView> {
        self.rows.iter().find(|r| r.is_total())
    }
}

/// Search box wiring: which fields the box searches and its initial case mode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSpec {
    pub fields: Vec<String>,
    pub case_sensitive: bool,
}

struct ListState {
    options: QueryOptions,
    status: LoadStatus,
    rows: Vec<RowView>,
    total: u64,
    latest_seq: u64,
    applied_seq: u64,
    last_error: Option<NetworkError>,
    case_sensitive: bool,
    torn_down: bool,
}

impl ListState {
    fn snapshot(&self) -> ListSnapshot {
        ListSnapshot {
            status: self.status,
            options: self.options.clone(),
            rows: self.rows.clone(),
            total: self.total,
            pagination: PaginationMeta::from_options(&self.options, self.total),
            applied_seq: self.applied_seq,
            last_error: self.last_error.as_ref().map(|e| e.message().to_string()),
        }
    }
}

struct Shared {
    name: String,
    source: Arc<dyn RemoteSource>,
    codec: TableOptionsCodec,
    mapper: RowMapper,
    search: Option<SearchSpec>,
    date_field: Option<String>,
    notifications: NotificationBus,
    state: Mutex<ListState>,
    snapshots: watch::Sender<ListSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ListState> {
        // No code panics while holding the lock mid-update
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ListState) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Register `options` as the latest request and return the fetch to run
    fn issue(self: &Arc<Self>, options: QueryOptions) -> BoxFuture<'static, FetchOutcome> {
        self.issue_with(move |_| options)
    }

    /// Build the next options from the current state and register them
    ///
    /// Reading the current options and taking the sequence number happen
    /// under one lock, so concurrent edits never drop each other's changes.
    fn issue_with<F>(self: &Arc<Self>, build: F) -> BoxFuture<'static, FetchOutcome>
    where
        F: FnOnce(&ListState) -> QueryOptions,
    {
        let (seq, options) = {
            let mut state = self.lock();
            if state.torn_down {
                tracing::debug!(list = %self.name, "Ignoring request on unmounted list");
                return futures::future::ready(FetchOutcome::Ignored).boxed();
            }
            let options = build(&*state);
            state.latest_seq += 1;
            state.options = options.clone();
            state.status = LoadStatus::Loading;
            self.publish(&state);
            (state.latest_seq, options)
        };

        let shared = Arc::clone(self);
        async move { shared.run_fetch(seq, options).await }.boxed()
    }

    async fn run_fetch(&self, seq: u64, options: QueryOptions) -> FetchOutcome {
        let offset = options.pagination.offset();
        let result = self.source.fetch(options).await;

        let mut state = self.lock();
        if state.torn_down || seq != state.latest_seq {
            tracing::debug!(
                list = %self.name,
                seq,
                latest = state.latest_seq,
                "Discarding stale response"
            );
            if state.torn_down {
                return FetchOutcome::Ignored;
            }
            return FetchOutcome::Discarded {
                seq,
                latest: state.latest_seq,
            };
        }

        match result {
            Ok(page) => {
                let rows = self.mapper.map_page(&page, offset);
                let row_count = page.rows.len();
                state.rows = rows;
                state.total = page.total;
                state.status = LoadStatus::Ready;
                state.applied_seq = seq;
                state.last_error = None;
                self.publish(&state);
                drop(state);

                tracing::debug!(list = %self.name, seq, rows = row_count, total = page.total, "List loaded");
                self.notifications.publish(ListEvent::Loaded {
                    list: self.name.clone(),
                    seq,
                    rows: row_count,
                    total: page.total,
                });
                FetchOutcome::Applied {
                    seq,
                    rows: row_count,
                    total: page.total,
                }
            }
            Err(err) => {
                let error = NetworkError::from_source(&err);
                state.status = LoadStatus::Error;
                state.last_error = Some(error.clone());
                self.publish(&state);
                drop(state);

                tracing::warn!(list = %self.name, seq, error = %error, "List fetch failed");
                self.notifications.publish(ListEvent::FetchFailed {
                    list: self.name.clone(),
                    seq,
                    message: error.message().to_string(),
                });
                FetchOutcome::Failed { seq, error }
            }
        }
    }

    fn current_options(&self) -> QueryOptions {
        self.lock().options.clone()
    }
}

/// Builder for [`RemoteListController`]
pub struct ListControllerBuilder {
    name: String,
    source: Arc<dyn RemoteSource>,
    codec: TableOptionsCodec,
    mapper: RowMapper,
    search: Option<SearchSpec>,
    date_field: Option<String>,
    notifications: NotificationBus,
    initial_options: Option<QueryOptions>,
}

impl ListControllerBuilder {
    pub fn codec(mut self, codec: TableOptionsCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn rows(mut self, mapper: RowMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn search(mut self, search: SearchSpec) -> Self {
        self.search = Some(search);
        self
    }

    pub fn date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    pub fn notifications(mut self, bus: NotificationBus) -> Self {
        self.notifications = bus;
        self
    }

    /// Options to mount with instead of the codec's seed
    pub fn initial_options(mut self, options: QueryOptions) -> Self {
        self.initial_options = Some(options);
        self
    }

    pub fn build(self) -> RemoteListController {
        let options = self
            .initial_options
            .unwrap_or_else(|| self.codec.initial_options());
        let state = ListState {
            options,
            status: LoadStatus::Idle,
            rows: Vec::new(),
            total: 0,
            latest_seq: 0,
            applied_seq: 0,
            last_error: None,
            case_sensitive: self.search.as_ref().is_some_and(|s| s.case_sensitive),
            torn_down: false,
        };
        let (snapshots, _) = watch::channel(state.snapshot());

        RemoteListController {
            shared: Arc::new(Shared {
                name: self.name,
                source: self.source,
                codec: self.codec,
                mapper: self.mapper,
                search: self.search,
                date_field: self.date_field,
                notifications: self.notifications,
                state: Mutex::new(state),
                snapshots,
            }),
            polling: Mutex::new(None),
        }
    }
}

/// Stateful consumer of one list page's query options
///
/// Request methods register the request synchronously and return the fetch
/// as a future; the order in which methods are called decides which response
/// is displayed, whatever order the responses arrive in.
pub struct RemoteListController {
    shared: Arc<Shared>,
    polling: Mutex<Option<PollingHandle>>,
}

impl RemoteListController {
    pub fn builder(name: impl Into<String>, source: Arc<dyn RemoteSource>) -> ListControllerBuilder {
        ListControllerBuilder {
            name: name.into(),
            source,
            codec: TableOptionsCodec::default(),
            mapper: RowMapper::default(),
            search: None,
            date_field: None,
            notifications: NotificationBus::default(),
            initial_options: None,
        }
    }

    /// Controller wired from a list profile
    ///
    /// Polling is not started; pair with [`ListConfig::poll_interval`].
    pub fn from_config(list: &ListConfig, source: Arc<dyn RemoteSource>) -> Self {
        let mut builder = Self::builder(list.name.clone(), source)
            .codec(list.codec())
            .rows(list.row_mapper());
        if let Some(search) = list.search_spec() {
            builder = builder.search(search);
        }
        if let Some(field) = &list.date_field {
            builder = builder.date_field(field.clone());
        }
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn codec(&self) -> &TableOptionsCodec {
        &self.shared.codec
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.shared.notifications
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Issue the initial options
    pub fn mount(&self) -> BoxFuture<'static, FetchOutcome> {
        tracing::info!(list = %self.shared.name, "Mounting list");
        self.shared.issue_with(|state| state.options.clone())
    }

    /// Replace the options wholesale and fetch them
    pub fn replace_options(&self, options: QueryOptions) -> BoxFuture<'static, FetchOutcome> {
        self.shared.issue(options)
    }

    /// Re-issue the current options
    pub fn refresh(&self) -> BoxFuture<'static, FetchOutcome> {
        self.shared.issue_with(|state| state.options.clone())
    }

    /// Apply a grid event (page, column filters, sort)
    pub fn on_table_event(&self, event: &TableEvent) -> BoxFuture<'static, FetchOutcome> {
        let codec = &self.shared.codec;
        self.shared.issue_with(|state| {
            codec.apply_table_event(
                &state.options,
                &event.pagination,
                &event.filters,
                &event.sorter,
                &event.extra,
            )
        })
    }

    /// Replace the search bucket over `fields`
    pub fn search<S: AsRef<str>>(
        &self,
        fields: &[S],
        value: &str,
        case_sensitive: bool,
    ) -> BoxFuture<'static, FetchOutcome> {
        let codec = &self.shared.codec;
        self.shared
            .issue_with(|state| codec.apply_search(&state.options, fields, value, case_sensitive))
    }

    /// Search with the configured search box fields and current case mode
    ///
    /// Without a configured search box the current options are re-issued.
    pub fn quick_search(&self, value: &str) -> BoxFuture<'static, FetchOutcome> {
        let codec = &self.shared.codec;
        let search = self.shared.search.as_ref();
        self.shared.issue_with(|state| match search {
            Some(spec) => {
                codec.apply_search(&state.options, &spec.fields, value, state.case_sensitive)
            }
            None => state.options.clone(),
        })
    }

    /// Toggle of the search box's case-sensitivity button
    pub fn set_case_sensitive(&self, case_sensitive: bool) {
        self.shared.lock().case_sensitive = case_sensitive;
    }

    pub fn case_sensitive(&self) -> bool {
        self.shared.lock().case_sensitive
    }

    /// Replace the date bucket on `field`; a missing bound clears it
    pub fn set_date_range(
        &self,
        field: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> BoxFuture<'static, FetchOutcome> {
        let codec = &self.shared.codec;
        self.shared
            .issue_with(|state| codec.apply_date_range(&state.options, field, start, end))
    }

    /// Date range on the configured date field
    pub fn set_period(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> BoxFuture<'static, FetchOutcome> {
        match self.shared.date_field.clone() {
            Some(field) => self.set_date_range(&field, start, end),
            None => self.refresh(),
        }
    }

    /// Replace a selector leaf (level, status, type); `None` clears it
    pub fn set_field(
        &self,
        field: &str,
        value: Option<FilterValue>,
        op: Op,
    ) -> BoxFuture<'static, FetchOutcome> {
        let codec = &self.shared.codec;
        self.shared
            .issue_with(|state| codec.apply_field(&state.options, field, value, op))
    }

    // =========================================================================
    // Polling and teardown
    // =========================================================================

    /// Re-issue the current options every `period` until stopped or unmounted
    ///
    /// Replaces any running poll loop.
    pub fn start_polling(&self, period: Duration) -> Result<(), TableQueryError> {
        if period.is_zero() {
            return Err(ConfigError::Invalid {
                list: self.shared.name.clone(),
                message: "polling period must be greater than zero".to_string(),
            }
            .into());
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TableQueryError::Internal(
                "polling requires a tokio runtime".to_string(),
            ));
        }
        if self.shared.lock().torn_down {
            return Ok(());
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let handle = PollingHandle::spawn(period, move || {
            let shared = weak.upgrade()?;
            let fetch = shared.issue_with(|state| state.options.clone());
            Some(async move {
                fetch.await;
            })
        });

        tracing::info!(
            list = %self.shared.name,
            period_ms = period.as_millis() as u64,
            "Polling started"
        );
        *self.lock_polling() = Some(handle);
        Ok(())
    }

    pub fn stop_polling(&self) {
        if let Some(mut handle) = self.lock_polling().take() {
            handle.stop();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.lock_polling()
            .as_ref()
            .is_some_and(PollingHandle::is_running)
    }

    /// Tear the page down: stop polling and ignore every later response
    pub fn unmount(&self) {
        self.stop_polling();
        let mut state = self.shared.lock();
        if !state.torn_down {
            state.torn_down = true;
            tracing::info!(list = %self.shared.name, "List unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        !self.shared.lock().torn_down
    }

    fn lock_polling(&self) -> MutexGuard<'_, Option<PollingHandle>> {
        self.polling.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn state(&self) -> ListSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn status(&self) -> LoadStatus {
        self.shared.lock().status
    }

    pub fn options(&self) -> QueryOptions {
        self.shared.current_options()
    }

    /// Watch every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<ListSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Snapshots as a stream, starting with the current one
    pub fn updates(&self) -> WatchStream<ListSnapshot> {
        WatchStream::new(self.subscribe())
    }
}

impl Drop for RemoteListController {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
