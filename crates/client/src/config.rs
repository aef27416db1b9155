//! Client configuration.
//!
//! Desktop builds read environment variables; the browser build derives
//! its endpoints from the page origin and its token from `localStorage`.

use std::time::Duration;

use crate::realtime::{RealtimeConfig, ReconnectConfig};
use crate::table::TableConfig;

const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_WS_PATH: &str = "/ws";
#[cfg(target_arch = "wasm32")]
const TOKEN_STORAGE_KEY: &str = "token";

/// Everything the app root needs to build its connection and tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the REST API (`http(s)://host[:port]`).
    pub api_base_url: String,
    /// Base URL of the realtime endpoint (`ws(s)://host[:port]`).
    pub ws_base_url: String,
    /// Path appended to `ws_base_url` on connect.
    pub ws_endpoint: String,
    /// Session token, if one is already known.
    pub token: Option<String>,
    pub reconnect: ReconnectConfig,
    /// Quiet period before a search box commits its value.
    pub search_debounce: Duration,
    /// Upper bound on a single table fetch.
    pub fetch_timeout: Duration,
    /// How long a failed job stays in the error state before going idle.
    pub job_error_reset: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            ws_base_url: http_to_ws(DEFAULT_API_URL),
            ws_endpoint: DEFAULT_WS_PATH.to_string(),
            token: None,
            reconnect: ReconnectConfig::default(),
            search_debounce: Duration::from_millis(1000),
            fetch_timeout: Duration::from_secs(30),
            job_error_reset: Duration::from_secs(3),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FRAMEWORKS_API_URL`: REST base URL (default: "http://localhost:5000")
    /// - `FRAMEWORKS_WS_URL`: realtime base URL (default: derived from the API URL)
    /// - `FRAMEWORKS_WS_PATH`: realtime endpoint path (default: "/ws")
    /// - `FRAMEWORKS_TOKEN`: session token to connect with
    /// - `FRAMEWORKS_RECONNECT_BASE_MS`: first reconnect delay (default: 1000)
    /// - `FRAMEWORKS_RECONNECT_MAX_ATTEMPTS`: reconnect budget (default: 5)
    /// - `FRAMEWORKS_SEARCH_DEBOUNCE_MS`: search debounce (default: 1000)
    /// - `FRAMEWORKS_FETCH_TIMEOUT_MS`: table fetch timeout (default: 30000)
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Derive configuration from the page the app is served from.
    #[cfg(target_arch = "wasm32")]
    pub fn from_env() -> Self {
        let window = web_sys::window();
        let origin = window
            .as_ref()
            .and_then(|w| w.location().origin().ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let token = window
            .as_ref()
            .and_then(|w| w.local_storage().ok().flatten())
            .and_then(|storage| storage.get_item(TOKEN_STORAGE_KEY).ok().flatten());

        let mut config = Self::default();
        config.ws_base_url = http_to_ws(&origin);
        config.api_base_url = origin;
        config.token = token.filter(|t| !t.is_empty());
        config
    }

    /// Build from an arbitrary key lookup. Unset or unparseable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        let api_base_url = lookup("FRAMEWORKS_API_URL")
            .map(|url| with_scheme(&url))
            .unwrap_or(defaults.api_base_url);
        let ws_base_url = lookup("FRAMEWORKS_WS_URL")
            .map(|url| http_to_ws(&with_scheme(&url)))
            .unwrap_or_else(|| http_to_ws(&api_base_url));

        let mut reconnect = defaults.reconnect;
        if let Some(base) = millis("FRAMEWORKS_RECONNECT_BASE_MS") {
            reconnect.base_interval = base;
        }
        if let Some(max) = lookup("FRAMEWORKS_RECONNECT_MAX_ATTEMPTS").and_then(|v| v.trim().parse().ok()) {
            reconnect.max_attempts = max;
        }

        Self {
            api_base_url,
            ws_base_url,
            ws_endpoint: lookup("FRAMEWORKS_WS_PATH").unwrap_or(defaults.ws_endpoint),
            token: lookup("FRAMEWORKS_TOKEN").filter(|t| !t.is_empty()),
            reconnect,
            search_debounce: millis("FRAMEWORKS_SEARCH_DEBOUNCE_MS").unwrap_or(defaults.search_debounce),
            fetch_timeout: millis("FRAMEWORKS_FETCH_TIMEOUT_MS").unwrap_or(defaults.fetch_timeout),
            job_error_reset: defaults.job_error_reset,
        }
    }

    pub fn realtime(&self) -> RealtimeConfig {
        RealtimeConfig {
            base_url: self.ws_base_url.clone(),
            reconnect: self.reconnect.clone(),
        }
    }

    /// Table defaults with this client's fetch timeout applied.
    pub fn table(&self) -> TableConfig {
        TableConfig {
            fetch_timeout: self.fetch_timeout,
            ..TableConfig::default()
        }
    }
}

/// Check if a host is a local/development address.
fn is_local_address(host: &str) -> bool {
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
}

/// Add a scheme to a bare host: plain http for local addresses, https otherwise.
fn with_scheme(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else if is_local_address(url) {
        format!("http://{url}")
    } else {
        format!("https://{url}")
    }
}

/// Convert an HTTP/HTTPS URL to WS/WSS.
pub fn http_to_ws(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}
