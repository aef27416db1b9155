//! Server-paginated table state bound to the URL.
//!
//! Mutators only write the query string; fetches read it back. Whoever
//! owns the controller reacts to store changes by calling
//! [`TableController::fetch_data`], so the URL stays the single source of
//! truth and back/forward navigation behaves like any other change.
//!
//! Every fetch takes a generation number. A response that comes back after
//! a newer fetch was issued is dropped without touching the table.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use frameworks_shared::{
    FetchError, FetchResponse, Pagination, QueryDefaults, QueryParams, SortOrder, TableQuery,
    LIMIT_PARAM, PAGE_PARAM, SEARCH_PARAM, SORT_BY_PARAM, SORT_ORDER_PARAM,
};

use super::store::QueryStore;
use crate::realtime::{HandlerSet, Subscription};
use crate::runtime::{self, MaybeSendSync};

/// Loads one page of rows for the given query parameters.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait TableFetcher<T>: MaybeSendSync {
    async fn fetch(&self, params: QueryParams) -> Result<FetchResponse<T>, FetchError>;
}

/// Receives fetch failures when no `on_error` callback is configured.
pub trait Notifier: MaybeSendSync {
    fn notify_error(&self, message: &str);
}

/// Writes failures to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, message: &str) {
        crate::log_error!("Table fetch failed: {}", message);
    }
}

pub type ErrorCallback = Arc<dyn Fn(&FetchError) + Send + Sync>;

#[derive(Clone)]
pub struct TableConfig {
    pub default_limit: u32,
    pub default_sort_by: String,
    pub default_sort_order: SortOrder,
    /// Shown when a fetch returns no rows and nothing more specific applies.
    pub default_empty_message: String,
    pub fetch_timeout: Duration,
    /// Replaces the default notification on failure.
    pub on_error: Option<ErrorCallback>,
}

impl Default for TableConfig {
    fn default() -> Self {
        let defaults = QueryDefaults::default();
        Self {
            default_limit: defaults.limit,
            default_sort_by: defaults.sort_by,
            default_sort_order: defaults.sort_order,
            default_empty_message: "No data found".to_string(),
            fetch_timeout: Duration::from_secs(30),
            on_error: None,
        }
    }
}

impl fmt::Debug for TableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableConfig")
            .field("default_limit", &self.default_limit)
            .field("default_sort_by", &self.default_sort_by)
            .field("default_sort_order", &self.default_sort_order)
            .field("default_empty_message", &self.default_empty_message)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl TableConfig {
    pub fn with_sort(mut self, sort_by: impl Into<String>, order: SortOrder) -> Self {
        self.default_sort_by = sort_by.into();
        self.default_sort_order = order;
        self
    }

    pub fn with_empty_message(mut self, message: impl Into<String>) -> Self {
        self.default_empty_message = message.into();
        self
    }

    pub fn with_on_error(mut self, on_error: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn query_defaults(&self) -> QueryDefaults {
        QueryDefaults {
            limit: self.default_limit,
            sort_by: self.default_sort_by.clone(),
            sort_order: self.default_sort_order,
        }
    }
}

/// Everything a table view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot<T> {
    pub data: Vec<T>,
    pub loading: bool,
    pub empty_message: String,
    pub pagination: Pagination,
    /// Query the current data was requested with.
    pub query: TableQuery,
    pub error: Option<FetchError>,
}

/// How a single `fetch_data` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    Failed,
    /// A newer fetch was issued meanwhile; this response was dropped.
    Stale,
}

pub struct TableController<T: 'static, F> {
    fetcher: F,
    store: Arc<dyn QueryStore>,
    config: TableConfig,
    notifier: Arc<dyn Notifier>,
    generation: AtomicU64,
    state: Mutex<TableSnapshot<T>>,
    listeners: HandlerSet<TableSnapshot<T>>,
}

impl<T, F> TableController<T, F>
where
    T: Clone + 'static,
    F: TableFetcher<T>,
{
    pub fn new(fetcher: F, store: Arc<dyn QueryStore>, config: TableConfig) -> Self {
        let query = TableQuery::from_params(&store.query(), &config.query_defaults());
        let state = TableSnapshot {
            data: Vec::new(),
            loading: false,
            empty_message: config.default_empty_message.clone(),
            pagination: Pagination::initial(query.limit),
            query,
            error: None,
        };
        Self {
            fetcher,
            store,
            config,
            notifier: Arc::new(LogNotifier),
            generation: AtomicU64::new(0),
            state: Mutex::new(state),
            listeners: HandlerSet::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Query state decoded from the store right now.
    pub fn query(&self) -> TableQuery {
        TableQuery::from_params(&self.store.query(), &self.config.query_defaults())
    }

    pub fn snapshot(&self) -> TableSnapshot<T> {
        self.lock().clone()
    }

    /// Called with a fresh snapshot after every state change.
    pub fn on_change(
        &self,
        listener: impl Fn(&TableSnapshot<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(listener)
    }

    /// Called whenever the query string changes, from this controller or
    /// from outside.
    pub fn watch_query(&self, handler: impl Fn(&QueryParams) + Send + Sync + 'static) -> Subscription {
        self.store.watch(Box::new(handler))
    }

    /// Fetch the page the URL currently describes.
    ///
    /// Never fails: errors end up as an empty table whose empty message is
    /// the error text.
    pub async fn fetch_data(&self) -> FetchOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Read the URL itself rather than the last snapshot; mutators may
        // have run since.
        let url = self.store.query();
        let query = TableQuery::from_params(&url, &self.config.query_defaults());
        let params = query.fetch_params(&url);

        self.update(|state| {
            state.loading = true;
            state.query = query.clone();
        });
        crate::log_debug!("Table fetch #{}: {}", generation, params);

        let timeout = self.config.fetch_timeout;
        let result = match runtime::timeout(timeout, self.fetcher.fetch(params)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            crate::log_debug!("Dropping stale table response #{}", generation);
            return FetchOutcome::Stale;
        }

        match result {
            Ok(response) => {
                self.apply_response(&query, response);
                FetchOutcome::Applied
            }
            Err(error) => {
                self.apply_failure(error);
                FetchOutcome::Failed
            }
        }
    }

    /// Re-run the current query, e.g. after a row was edited elsewhere.
    pub async fn refetch(&self) -> FetchOutcome {
        self.fetch_data().await
    }

    /// Go to `page` (1-indexed). Out-of-range pages are the caller's concern.
    pub fn handle_page_change(&self, page: u32) {
        self.write_url(|params| params.set(PAGE_PARAM, page.to_string()));
    }

    /// Set the search term; an empty term removes it.
    pub fn handle_search(&self, term: &str) {
        self.write_url(|params| {
            params.set_or_delete(SEARCH_PARAM, term);
            params.set(PAGE_PARAM, "1");
        });
    }

    /// Sort by `key`, flipping the order when it is already the sort key.
    pub fn handle_sort(&self, key: &str) {
        let current = self.query();
        let order = if current.sort_by == key {
            current.sort_order.toggled()
        } else {
            SortOrder::Asc
        };
        self.write_url(|params| {
            params.set(SORT_BY_PARAM, key);
            params.set(SORT_ORDER_PARAM, order.as_str());
            params.set(PAGE_PARAM, "1");
        });
    }

    /// Set any other parameter (status, category, ...). Empty deletes.
    pub fn handle_filter_change(&self, key: &str, value: &str) {
        self.write_url(|params| {
            params.set_or_delete(key, value);
            params.set(PAGE_PARAM, "1");
        });
    }

    pub fn handle_limit_change(&self, limit: u32) {
        self.write_url(|params| {
            params.set(LIMIT_PARAM, limit.max(1).to_string());
            params.set(PAGE_PARAM, "1");
        });
    }

    fn write_url(&self, edit: impl FnOnce(&mut QueryParams)) {
        let mut params = self.store.query();
        edit(&mut params);
        self.store.replace(params);
    }

    fn apply_response(&self, query: &TableQuery, response: FetchResponse<T>) {
        let FetchResponse {
            data,
            pagination,
            message,
        } = response;

        let (total_pages, total_items) = match pagination {
            Some(info) => (info.total_pages, info.total_items),
            None => (1, data.len() as u64),
        };
        let empty_message = if data.is_empty() {
            empty_message(
                message.as_deref(),
                &query.search,
                &self.config.default_empty_message,
            )
        } else {
            self.config.default_empty_message.clone()
        };

        self.update(|state| {
            state.data = data;
            state.loading = false;
            state.empty_message = empty_message;
            state.pagination = Pagination::new(query.page, total_pages, total_items, query.limit);
            state.error = None;
        });
    }

    fn apply_failure(&self, error: FetchError) {
        let message = error.to_string();
        self.update(|state| {
            state.data.clear();
            state.loading = false;
            state.empty_message = message.clone();
            state.error = Some(error.clone());
        });

        match &self.config.on_error {
            Some(on_error) => on_error(&error),
            None => self.notifier.notify_error(&message),
        }
    }

    fn update(&self, mutate: impl FnOnce(&mut TableSnapshot<T>)) {
        let snapshot = {
            let mut state = self.lock();
            mutate(&mut state);
            state.clone()
        };
        self.listeners.emit(&snapshot);
    }

    fn lock(&self) -> MutexGuard<'_, TableSnapshot<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Server message, then a search-specific hint, then the default.
fn empty_message(server: Option<&str>, search: &str, default: &str) -> String {
    if let Some(message) = server.filter(|m| !m.trim().is_empty()) {
        return message.to_string();
    }
    if !search.is_empty() {
        return format!("No results found for \"{search}\"");
    }
    default.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MemoryQueryStore;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: String,
    }

    fn row(name: &str) -> Row {
        Row {
            name: name.to_string(),
        }
    }

    /// Answers every fetch with a fixed result and records the params.
    struct Fixed {
        result: Result<FetchResponse<Row>, FetchError>,
        seen: Mutex<Vec<QueryParams>>,
    }

    impl Fixed {
        fn new(result: Result<FetchResponse<Row>, FetchError>) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TableFetcher<Row> for Fixed {
        async fn fetch(&self, params: QueryParams) -> Result<FetchResponse<Row>, FetchError> {
            self.seen.lock().unwrap().push(params);
            self.result.clone()
        }
    }

    fn controller(
        url: &str,
        fetcher: Fixed,
    ) -> (TableController<Row, Fixed>, Arc<MemoryQueryStore>) {
        let store = Arc::new(MemoryQueryStore::with_query(url));
        let controller = TableController::new(fetcher, store.clone(), TableConfig::default());
        (controller, store)
    }

    fn ok(rows: Vec<Row>) -> Fixed {
        Fixed::new(Ok(FetchResponse::new(rows)))
    }

    #[test]
    fn search_then_page_round_trips_through_the_url() {
        let (table, store) = controller("", ok(vec![]));
        table.handle_search("foo");
        table.handle_page_change(3);

        assert_eq!(store.query_string(), "search=foo&page=3");
        let query = TableQuery::from_params(
            &QueryParams::parse(&store.query_string()),
            &table.config().query_defaults(),
        );
        assert_eq!(query.search, "foo");
        assert_eq!(query.page, 3);
    }

    #[test]
    fn empty_search_removes_the_parameter() {
        let (table, store) = controller("search=iso&page=4", ok(vec![]));
        table.handle_search("");
        assert_eq!(store.query_string(), "page=1");
    }

    #[test]
    fn sort_toggles_on_same_key_and_restarts_on_new_key() {
        let (table, _store) = controller("sortBy=name&sortOrder=asc", ok(vec![]));

        table.handle_sort("name");
        let query = table.query();
        assert_eq!((query.sort_by.as_str(), query.sort_order), ("name", SortOrder::Desc));

        table.handle_sort("email");
        let query = table.query();
        assert_eq!((query.sort_by.as_str(), query.sort_order), ("email", SortOrder::Asc));
    }

    #[test]
    fn query_changes_reset_the_page() {
        let (table, _store) = controller("page=5", ok(vec![]));
        table.handle_search("x");
        assert_eq!(table.query().page, 1);

        table.handle_page_change(5);
        table.handle_filter_change("status", "pending");
        assert_eq!(table.query().page, 1);

        table.handle_page_change(5);
        table.handle_sort("title");
        assert_eq!(table.query().page, 1);

        table.handle_page_change(5);
        table.handle_limit_change(50);
        assert_eq!(table.query().page, 1);
        assert_eq!(table.query().limit, 50);
    }

    #[test]
    fn empty_filter_value_deletes_the_filter() {
        let (table, store) = controller("status=pending&page=2", ok(vec![]));
        table.handle_filter_change("status", "");
        assert_eq!(store.query_string(), "page=1");
    }

    #[tokio::test]
    async fn fetch_sends_canonical_params_and_url_filters() {
        let (table, _store) = controller("status=approved&search=iso&page=2", ok(vec![row("ISO 27001")]));
        assert_eq!(table.fetch_data().await, FetchOutcome::Applied);

        let seen = table.fetcher.seen.lock().unwrap();
        assert_eq!(
            seen[0].to_query_string(),
            "page=2&limit=10&search=iso&sortBy=createdAt&sortOrder=desc&status=approved"
        );
    }

    #[tokio::test]
    async fn failure_leaves_a_renderable_table() {
        let (table, _store) = controller("", Fixed::new(Err(FetchError::message("boom"))));
        assert_eq!(table.fetch_data().await, FetchOutcome::Failed);

        let snapshot = table.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.data.is_empty());
        assert!(snapshot.empty_message.contains("boom"));
        assert_eq!(snapshot.error, Some(FetchError::message("boom")));
    }

    #[tokio::test]
    async fn on_error_replaces_the_notifier() {
        struct Counting(Arc<AtomicUsize>);
        impl Notifier for Counting {
            fn notify_error(&self, _message: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let notified = Arc::new(AtomicUsize::new(0));
        let handled = Arc::new(AtomicUsize::new(0));
        let seen = handled.clone();
        let config = TableConfig::default().with_on_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let table = TableController::new(
            Fixed::new(Err(FetchError::message("boom"))),
            Arc::new(MemoryQueryStore::new()),
            config,
        )
        .with_notifier(Arc::new(Counting(notified.clone())));

        table.fetch_data().await;
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn server_message_wins_for_empty_results() {
        let fetcher = Fixed::new(Ok(FetchResponse::new(vec![]).with_message("Custom")));
        let (table, _store) = controller("search=abc", fetcher);
        table.fetch_data().await;
        assert_eq!(table.snapshot().empty_message, "Custom");
    }

    #[tokio::test]
    async fn search_hint_beats_the_default() {
        let (table, _store) = controller("search=abc", ok(vec![]));
        table.fetch_data().await;
        assert_eq!(table.snapshot().empty_message, "No results found for \"abc\"");

        let (table, _store) = controller("", ok(vec![]));
        table.fetch_data().await;
        assert_eq!(table.snapshot().empty_message, "No data found");
    }

    #[tokio::test]
    async fn pagination_flags_follow_the_current_page() {
        let fetcher = Fixed::new(Ok(FetchResponse::new(vec![row("a")]).with_pagination(4, 37)));
        let (table, _store) = controller("page=4", fetcher);
        table.fetch_data().await;

        let pagination = table.snapshot().pagination;
        assert_eq!(pagination, Pagination::new(4, 4, 37, 10));
        assert!(pagination.has_prev_page);
        assert!(!pagination.has_next_page);
    }

    #[tokio::test]
    async fn missing_pagination_means_a_single_page() {
        let (table, _store) = controller("", ok(vec![row("a"), row("b")]));
        table.fetch_data().await;

        let pagination = table.snapshot().pagination;
        assert_eq!((pagination.total_pages, pagination.total_items), (1, 2));
        assert!(!pagination.has_next_page);
    }

    #[tokio::test]
    async fn listeners_see_loading_then_result() {
        let (table, _store) = controller("", ok(vec![row("a")]));
        let loading = Arc::new(Mutex::new(Vec::new()));
        let seen = loading.clone();
        let _sub = table.on_change(move |snapshot| seen.lock().unwrap().push(snapshot.loading));

        table.fetch_data().await;
        assert_eq!(*loading.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn empty_message_precedence() {
        assert_eq!(empty_message(Some("Custom"), "abc", "None"), "Custom");
        assert_eq!(empty_message(Some("  "), "abc", "None"), "No results found for \"abc\"");
        assert_eq!(empty_message(None, "", "None"), "None");
    }
}
