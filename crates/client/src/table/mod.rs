//! Remote, server-paginated tables whose query lives in the URL.
//!
//! Every admin listing (frameworks, categories, users, comparisons) is the
//! same table: page, search, sort and free-form filters in the query string,
//! one fetch per change.

mod controller;
mod debounce;
mod hooks;
mod store;

pub use controller::{
    ErrorCallback, FetchOutcome, LogNotifier, Notifier, TableConfig, TableController,
    TableFetcher, TableSnapshot,
};
pub use debounce::Debouncer;
pub use hooks::{use_debounced_search, use_remote_table, DebouncedSearch, RemoteTable};
pub use store::{default_query_store, MemoryQueryStore, QueryStore};

#[cfg(target_arch = "wasm32")]
pub use store::BrowserQueryStore;
