//! Shared types for the frameworks admin client.
//!
//! Nothing in here touches a runtime, a socket or the DOM: these are the
//! wire frames pushed over the realtime socket and the table query state
//! persisted in the address bar.

pub mod error;
pub mod protocol;
pub mod query;

pub use error::*;
pub use protocol::*;
pub use query::*;
