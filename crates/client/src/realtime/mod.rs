//! Realtime channel to the admin API.
//!
//! One [`Connection`] per session carries server pushes (AI extraction
//! progress, framework comparison results, status overrides) to whichever
//! components subscribed to their `type`.
//!
//! # Architecture
//!
//! ```text
//!        ┌───────────────────────────────────────────┐
//!        │              RealtimeProvider             │
//!        │  (owns the Connection, shares it by ctx)  │
//!        └───────────────────────────────────────────┘
//!                              │
//!                              ▼
//!   ┌───────────┐   events   ┌──────────────────────────────┐
//!   │  Socket   │ ─────────▶ │          Connection          │
//!   │ (native / │ ◀───────── │  reconnect policy, registry  │
//!   │  browser) │  send/close└──────────────────────────────┘
//!   └───────────┘                    │ type-keyed dispatch
//!                   ┌────────────────┼────────────────┐
//!                   ▼                ▼                ▼
//!            use_realtime()  use_subscription()  use_job_tracker()
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! rsx! {
//!     RealtimeProvider { config: ClientConfig::from_env(),
//!         // app here
//!     }
//! }
//!
//! fn ComparisonPanel() -> Element {
//!     let job = use_job_tracker("comparison");
//!     rsx! { "{job.read().count} matched controls" }
//! }
//! ```

mod connection;
mod hooks;
mod job_tracker;
mod registry;

pub use connection::{
    build_url, default_connector, Connection, Connector, ReadyState, RealtimeConfig,
    RealtimeError, ReconnectConfig, Socket, SocketEvents,
};
pub use hooks::{
    use_connection, use_job_tracker, use_realtime, use_subscription, RealtimeHandle,
    RealtimeProvider,
};
pub use job_tracker::{JobPhase, JobTracker, JobTransition};
pub use registry::{Handler, HandlerSet, KeyedHandlers, Subscription};

#[cfg(not(target_arch = "wasm32"))]
pub use connection::TungsteniteConnector;
#[cfg(target_arch = "wasm32")]
pub use connection::BrowserConnector;
