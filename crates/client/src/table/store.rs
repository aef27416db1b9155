//! Where a table's query string lives.
//!
//! In the browser that is the address bar, so a reload or a shared link
//! reproduces the same view. Desktop and tests keep it in memory.

use std::sync::{Arc, Mutex};

use frameworks_shared::QueryParams;

use crate::realtime::{HandlerSet, Subscription};
use crate::runtime::MaybeSendSync;

/// Canonical storage for table query parameters.
pub trait QueryStore: MaybeSendSync {
    /// Current parameters, read fresh every call.
    fn query(&self) -> QueryParams;

    /// Replace the parameters. Watchers are told only when something
    /// actually changed.
    fn replace(&self, params: QueryParams);

    /// Called with the new parameters after every change, including ones
    /// made outside this process (browser back/forward).
    fn watch(&self, handler: Box<dyn Fn(&QueryParams) + Send + Sync>) -> Subscription;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryQueryStore {
    params: Mutex<QueryParams>,
    watchers: HandlerSet<QueryParams>,
}

impl MemoryQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a query string such as `"page=2&status=pending"`.
    pub fn with_query(query: &str) -> Self {
        Self {
            params: Mutex::new(QueryParams::parse(query)),
            watchers: HandlerSet::new(),
        }
    }

    pub fn query_string(&self) -> String {
        self.query().to_query_string()
    }
}

impl QueryStore for MemoryQueryStore {
    fn query(&self) -> QueryParams {
        self.params
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, params: QueryParams) {
        {
            let mut current = self
                .params
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if *current == params {
                return;
            }
            *current = params.clone();
        }
        self.watchers.emit(&params);
    }

    fn watch(&self, handler: Box<dyn Fn(&QueryParams) + Send + Sync>) -> Subscription {
        self.watchers.add_arc(Arc::from(handler))
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserQueryStore;

#[cfg(target_arch = "wasm32")]
mod browser {
    use std::sync::Arc;

    use frameworks_shared::QueryParams;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsValue;

    use super::QueryStore;
    use crate::realtime::{HandlerSet, Subscription};

    /// Query string of the page URL, written with `history.pushState` so
    /// each table change is a history entry.
    ///
    /// Back/forward navigation is observed through a `popstate` listener
    /// owned by the store and removed when it is dropped.
    pub struct BrowserQueryStore {
        watchers: HandlerSet<QueryParams>,
        on_pop: Option<Closure<dyn FnMut(web_sys::Event)>>,
    }

    impl BrowserQueryStore {
        pub fn new() -> Self {
            let watchers = HandlerSet::new();
            let mut on_pop = None;

            if let Some(window) = web_sys::window() {
                let emit = watchers.clone();
                let callback = Closure::wrap(Box::new(move |_: web_sys::Event| {
                    emit.emit(&current_params());
                }) as Box<dyn FnMut(web_sys::Event)>);
                match window
                    .add_event_listener_with_callback("popstate", callback.as_ref().unchecked_ref())
                {
                    Ok(()) => on_pop = Some(callback),
                    Err(e) => crate::log_warn!("Failed to watch popstate: {:?}", e),
                }
            }

            Self { watchers, on_pop }
        }
    }

    impl Drop for BrowserQueryStore {
        fn drop(&mut self) {
            let (Some(callback), Some(window)) = (self.on_pop.take(), web_sys::window()) else {
                return;
            };
            if let Err(e) = window
                .remove_event_listener_with_callback("popstate", callback.as_ref().unchecked_ref())
            {
                crate::log_warn!("Failed to unwatch popstate: {:?}", e);
            }
        }
    }

    impl Default for BrowserQueryStore {
        fn default() -> Self {
            Self::new()
        }
    }

    fn current_params() -> QueryParams {
        web_sys::window()
            .and_then(|w| w.location().search().ok())
            .map(|search| QueryParams::parse(&search))
            .unwrap_or_default()
    }

    impl QueryStore for BrowserQueryStore {
        fn query(&self) -> QueryParams {
            current_params()
        }

        fn replace(&self, params: QueryParams) {
            if current_params() == params {
                return;
            }
            let Some(window) = web_sys::window() else {
                return;
            };
            let path = window.location().pathname().unwrap_or_default();
            let url = if params.is_empty() {
                path
            } else {
                format!("{path}?{params}")
            };
            match window.history() {
                Ok(history) => {
                    if let Err(e) = history.push_state_with_url(&JsValue::NULL, "", Some(&url)) {
                        crate::log_error!("Failed to update URL: {:?}", e);
                        return;
                    }
                }
                Err(e) => {
                    crate::log_error!("History unavailable: {:?}", e);
                    return;
                }
            }
            self.watchers.emit(&params);
        }

        fn watch(&self, handler: Box<dyn Fn(&QueryParams) + Send + Sync>) -> Subscription {
            self.watchers.add_arc(Arc::from(handler))
        }
    }
}

/// The address bar in the browser, memory elsewhere.
pub fn default_query_store() -> Arc<dyn QueryStore> {
    #[cfg(target_arch = "wasm32")]
    {
        Arc::new(BrowserQueryStore::new())
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        Arc::new(MemoryQueryStore::new())
    }
}
