//! Frameworks admin client - Dioxus application
//!
//! Dashboard client for uploading, reviewing and comparing compliance
//! frameworks. Server-side jobs (AI extraction, framework comparison)
//! report progress over a reconnecting realtime socket; every listing is a
//! remote table whose page, search and sort live in the URL.

pub mod logging;

pub mod api_client;
pub mod config;
pub mod realtime;
pub mod runtime;
pub mod stores;
pub mod table;
pub mod views;

pub use api_client::{ApiClient, ListEndpoint};
pub use config::ClientConfig;
pub use realtime::{Connection, RealtimeProvider};
pub use table::{TableController, TableFetcher};
