//! Dioxus bindings for [`TableController`].

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use dioxus::prelude::*;
use frameworks_shared::TableQuery;
use futures_channel::mpsc::unbounded;
use futures_util::StreamExt;

use super::controller::{TableConfig, TableController, TableFetcher, TableSnapshot};
use super::debounce::Debouncer;
use super::store::default_query_store;
use crate::config::ClientConfig;
use crate::stores::ToastNotifier;

enum TableEvent<T> {
    Changed(TableSnapshot<T>),
    QueryChanged,
}

/// A remote table owned by the calling component.
pub struct RemoteTable<T: 'static, F: 'static> {
    pub state: Signal<TableSnapshot<T>>,
    controller: Rc<TableController<T, F>>,
}

impl<T: 'static, F: 'static> Clone for RemoteTable<T, F> {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            controller: self.controller.clone(),
        }
    }
}

impl<T: 'static, F: 'static> PartialEq for RemoteTable<T, F> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.controller, &other.controller)
    }
}

impl<T, F> RemoteTable<T, F>
where
    T: Clone + 'static,
    F: TableFetcher<T> + 'static,
{
    pub fn query(&self) -> TableQuery {
        self.controller.query()
    }

    pub fn handle_page_change(&self, page: u32) {
        self.controller.handle_page_change(page);
    }

    pub fn handle_search(&self, term: &str) {
        self.controller.handle_search(term);
    }

    pub fn handle_sort(&self, key: &str) {
        self.controller.handle_sort(key);
    }

    pub fn handle_filter_change(&self, key: &str, value: &str) {
        self.controller.handle_filter_change(key, value);
    }

    pub fn handle_limit_change(&self, limit: u32) {
        self.controller.handle_limit_change(limit);
    }

    /// Fetch again without touching the query, e.g. after a create or
    /// delete. Also the hook for extra dependencies: call it from a
    /// `use_effect` that reads them.
    pub fn refetch(&self) {
        let controller = self.controller.clone();
        spawn(async move {
            controller.refetch().await;
        });
    }
}

/// Bind a table to the page URL and fetch with `fetcher` whenever the query
/// changes. Failures without an `on_error` become toasts.
pub fn use_remote_table<T, F>(fetcher: F, config: TableConfig) -> RemoteTable<T, F>
where
    T: Clone + Send + 'static,
    F: TableFetcher<T> + 'static,
{
    let controller = use_hook(move || {
        Rc::new(
            TableController::new(fetcher, default_query_store(), config)
                .with_notifier(Arc::new(ToastNotifier)),
        )
    });
    let mut state = use_signal(|| controller.snapshot());

    let subscriptions = use_hook(|| {
        let (tx, mut rx) = unbounded::<TableEvent<T>>();
        let on_query = tx.clone();
        let subscriptions = vec![
            controller.on_change(move |snapshot| {
                let _ = tx.unbounded_send(TableEvent::Changed(snapshot.clone()));
            }),
            controller.watch_query(move |_| {
                let _ = on_query.unbounded_send(TableEvent::QueryChanged);
            }),
        ];

        let initial = controller.clone();
        spawn(async move {
            initial.fetch_data().await;
        });

        let controller = controller.clone();
        spawn(async move {
            while let Some(event) = rx.next().await {
                match event {
                    TableEvent::Changed(snapshot) => state.set(snapshot),
                    TableEvent::QueryChanged => {
                        let controller = controller.clone();
                        spawn(async move {
                            controller.fetch_data().await;
                        });
                    }
                }
            }
        });

        Rc::new(RefCell::new(subscriptions))
    });

    use_drop(move || subscriptions.borrow_mut().clear());

    RemoteTable { state, controller }
}

/// Search box state: the input updates on every keystroke, the table only
/// once typing pauses.
#[derive(Clone)]
pub struct DebouncedSearch {
    pub input: Signal<String>,
    debouncer: Debouncer,
    apply: Rc<dyn Fn(&str)>,
}

impl DebouncedSearch {
    pub fn set(&mut self, term: String) {
        self.input.set(term.clone());
        let debouncer = self.debouncer.clone();
        let apply = self.apply.clone();
        spawn(async move {
            if debouncer.wait().await {
                apply(&term);
            }
        });
    }

    /// Apply the current input now (Enter key, clear button).
    pub fn flush(&self) {
        self.debouncer.cancel();
        (self.apply)(self.input.peek().as_str());
    }
}

/// Debounced search input for `table`. The delay comes from the provided
/// [`ClientConfig`], falling back to its default.
pub fn use_debounced_search<T, F>(table: &RemoteTable<T, F>) -> DebouncedSearch
where
    T: Clone + 'static,
    F: TableFetcher<T> + 'static,
{
    let delay = try_use_context::<ClientConfig>()
        .unwrap_or_default()
        .search_debounce;
    let input = use_signal(|| table.query().search);
    let controller = table.controller.clone();

    use_hook(move || DebouncedSearch {
        input,
        debouncer: Debouncer::new(delay),
        apply: Rc::new(move |term: &str| controller.handle_search(term)),
    })
}
