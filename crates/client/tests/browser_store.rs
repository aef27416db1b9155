// Run with `wasm-pack test --headless --chrome crates/client`.

#![cfg(target_arch = "wasm32")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use frameworks_client::table::{BrowserQueryStore, QueryStore};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn fire_popstate() {
    let window = web_sys::window().unwrap();
    let event = web_sys::Event::new("popstate").unwrap();
    window.dispatch_event(&event).unwrap();
}

fn counting_watcher(store: &BrowserQueryStore) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    store
        .watch(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .detach();
    calls
}

#[wasm_bindgen_test]
fn back_and_forward_reach_watchers() {
    let store = BrowserQueryStore::new();
    let calls = counting_watcher(&store);

    fire_popstate();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[wasm_bindgen_test]
fn dropped_store_stops_listening_to_history() {
    let store = BrowserQueryStore::new();
    let calls = counting_watcher(&store);
    drop(store);

    fire_popstate();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
