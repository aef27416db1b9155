//! Frameworks admin client - Main entry point
//!
//! Supports both web (WASM) and desktop platforms.

#![allow(non_snake_case)]

use dioxus::prelude::*;
use frameworks_client::{logging, views::FrameworksView, ClientConfig, RealtimeProvider};

fn main() {
    logging::init();
    dioxus::launch(App);
}

#[component]
fn App() -> Element {
    let config = use_hook(ClientConfig::from_env);

    rsx! {
        RealtimeProvider { config,
            FrameworksView {}
        }
    }
}
