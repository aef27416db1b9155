//! Managed realtime connection with auto-reconnect.
//!
//! A [`Connection`] owns at most one live socket, the reconnection policy,
//! and the handler registries. Sockets are opened through a [`Connector`]
//! and report back through [`SocketEvents`], the same four callbacks a
//! browser `WebSocket` fires (open, message, close, error). The
//! platform-specific connectors live in the submodules.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use frameworks_shared::{
    ConnectionStatus, InboundMessage, ServerEvent, CLOSE_NORMAL, CONNECTION_MESSAGE_TYPE,
};
use futures_channel::oneshot;
use serde::Serialize;

use super::registry::{HandlerSet, KeyedHandlers, Subscription};
use crate::runtime::{self, MaybeSendSync};

/// Errors surfaced to `on_error` listeners and `connect` callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    /// Socket-level failure. Non-fatal; a reconnect may follow.
    #[error("transport error: {0}")]
    Transport(String),
    /// The reconnect budget ran out. Only a new `connect` recovers.
    #[error("max reconnect attempts ({attempts}) reached")]
    ReconnectExhausted { attempts: u32 },
    #[error("invalid realtime url: {0}")]
    InvalidUrl(String),
    /// The connection was closed before the attempt settled.
    #[error("connection closed")]
    Closed,
}

/// Ready state of an underlying socket, numbered like `WebSocket.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Configuration for auto-reconnect behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry; doubles on each further attempt.
    pub base_interval: Duration,
    /// Retries allowed after an unexpected close before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_interval.saturating_mul(1u32 << exponent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// `ws(s)://host[:port]`; the endpoint passed to `connect` is appended.
    pub base_url: String,
    pub reconnect: ReconnectConfig,
}

/// An open (or opening) socket as seen by the connection.
pub trait Socket: MaybeSendSync {
    fn ready_state(&self) -> ReadyState;
    /// Queue a text frame. `false` if the socket cannot take it.
    fn send_text(&self, text: &str) -> bool;
    fn close(&self, code: u16, reason: &str);
}

/// Opens sockets. Opening returns immediately; progress is reported
/// through `events`.
pub trait Connector: MaybeSendSync {
    fn open(&self, url: &str, events: SocketEvents) -> Result<Arc<dyn Socket>, RealtimeError>;
}

/// Callback sink handed to a socket when it is opened.
///
/// Events from a socket that has since been replaced are ignored.
#[derive(Clone)]
pub struct SocketEvents {
    inner: Weak<Inner>,
    generation: u64,
}

impl SocketEvents {
    pub fn opened(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_open(self.generation);
        }
    }

    pub fn frame(&self, text: &str) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_frame(self.generation, text);
        }
    }

    pub fn closed(&self, code: u16, reason: &str) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_close(self.generation, code, reason);
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_error(self.generation, message.into());
        }
    }
}

impl fmt::Debug for SocketEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketEvents")
            .field("generation", &self.generation)
            .finish()
    }
}

enum Slot {
    Empty,
    /// `Connector::open` is running.
    Opening,
    Live(Arc<dyn Socket>),
}

type Waiter = oneshot::Sender<Result<(), RealtimeError>>;

struct State {
    slot: Slot,
    /// Identifies the current socket; bumped on every open.
    generation: u64,
    /// Bumped by `close`; reconnect timers from an older epoch do nothing.
    epoch: u64,
    url: Option<String>,
    manual_close: bool,
    attempts: u32,
    exhausted: bool,
    waiters: Vec<Waiter>,
}

struct Inner {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<State>,
    messages: KeyedHandlers<InboundMessage>,
    any_message: HandlerSet<InboundMessage>,
    events: HandlerSet<ServerEvent>,
    status: HandlerSet<ConnectionStatus>,
    errors: HandlerSet<RealtimeError>,
    /// Not cleared by `close`.
    resets: HandlerSet<Connection>,
}

/// Handle to a managed realtime connection. Clones share the connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.inner.config.base_url)
            .field("state", &self.get_state())
            .finish()
    }
}

enum Begin {
    Ready(Result<(), RealtimeError>),
    Wait(oneshot::Receiver<Result<(), RealtimeError>>),
}

impl Connection {
    pub fn new(config: RealtimeConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                state: Mutex::new(State {
                    slot: Slot::Empty,
                    generation: 0,
                    epoch: 0,
                    url: None,
                    manual_close: false,
                    attempts: 0,
                    exhausted: false,
                    waiters: Vec::new(),
                }),
                messages: KeyedHandlers::default(),
                any_message: HandlerSet::new(),
                events: HandlerSet::new(),
                status: HandlerSet::new(),
                errors: HandlerSet::new(),
                resets: HandlerSet::new(),
            }),
        }
    }

    /// Open the connection, authenticating with `token`.
    ///
    /// The attempt is registered before this returns, so a second call made
    /// while the first is pending joins it instead of opening another
    /// socket. Resolves once the socket is open; an already-open connection
    /// resolves immediately.
    pub fn connect(
        &self,
        token: &str,
        endpoint: &str,
    ) -> impl Future<Output = Result<(), RealtimeError>> + 'static {
        let begin = self.inner.begin_connect(token, endpoint);
        async move {
            match begin {
                Begin::Ready(result) => result,
                Begin::Wait(rx) => rx.await.unwrap_or(Err(RealtimeError::Closed)),
            }
        }
    }

    /// Serialize and send `message`. Returns `false` (and drops the message)
    /// unless the socket is open.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.send_text(&json),
            Err(e) => {
                crate::log_error!("Serialize failed: {}", e);
                false
            }
        }
    }

    pub fn send_text(&self, text: &str) -> bool {
        let socket = match &self.inner.lock().slot {
            Slot::Live(socket) if socket.ready_state() == ReadyState::Open => socket.clone(),
            _ => {
                crate::log_warn!("Realtime send dropped: socket not open");
                return false;
            }
        };
        let sent = socket.send_text(text);
        if sent {
            crate::log_debug!("Realtime sent: {}", text);
        }
        sent
    }

    /// Register `handler` for frames whose `type` equals `kind`.
    pub fn subscribe(
        &self,
        kind: &str,
        handler: impl Fn(&InboundMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.messages.add(kind, handler)
    }

    /// Register `handler` for every decoded frame, whatever its type.
    pub fn on_message(&self, handler: impl Fn(&InboundMessage) + Send + Sync + 'static) -> Subscription {
        self.inner.any_message.add(handler)
    }

    /// Register `handler` for every frame, decoded into the closed event set.
    pub fn on_event(&self, handler: impl Fn(&ServerEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.events.add(handler)
    }

    pub fn on_connection_status(
        &self,
        handler: impl Fn(&ConnectionStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.status.add(handler)
    }

    pub fn on_error(&self, handler: impl Fn(&RealtimeError) + Send + Sync + 'static) -> Subscription {
        self.inner.errors.add(handler)
    }

    /// Called right after `close()` has emptied the registries, with the
    /// connection itself so the handler can register again. These listeners
    /// outlive `close()`; drop the returned guard to remove one.
    pub fn on_reset(&self, handler: impl Fn(&Connection) + Send + Sync + 'static) -> Subscription {
        self.inner.resets.add(handler)
    }

    /// Close for good: no reconnection, and every registry is emptied.
    /// A later `connect` starts over with no subscribers.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Live state, read from the socket itself.
    pub fn get_state(&self) -> ConnectionStatus {
        let state = self.inner.lock();
        if state.exhausted {
            return ConnectionStatus::Error;
        }
        match &state.slot {
            Slot::Empty => ConnectionStatus::Disconnected,
            Slot::Opening => ConnectionStatus::Connecting,
            Slot::Live(socket) => match socket.ready_state() {
                ReadyState::Connecting => ConnectionStatus::Connecting,
                ReadyState::Open => ConnectionStatus::Connected,
                ReadyState::Closing => ConnectionStatus::Closing,
                ReadyState::Closed => ConnectionStatus::Disconnected,
            },
        }
    }

    pub fn is_connected(&self) -> bool {
        self.get_state().is_connected()
    }

    /// Registered type-keyed handlers across all types.
    pub fn subscription_count(&self) -> usize {
        self.inner.messages.total()
    }

    /// Registered status, error, catch-all and reset listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.status.len()
            + self.inner.errors.len()
            + self.inner.any_message.len()
            + self.inner.events.len()
            + self.inner.resets.len()
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_connect(self: &Arc<Self>, token: &str, endpoint: &str) -> Begin {
        let url = match build_url(&self.config.base_url, endpoint, token) {
            Ok(url) => url,
            Err(e) => return Begin::Ready(Err(e)),
        };

        let (tx, rx) = oneshot::channel();
        let generation = {
            let mut state = self.lock();
            match &state.slot {
                Slot::Live(socket) if socket.ready_state() == ReadyState::Open => {
                    return Begin::Ready(Ok(()));
                }
                Slot::Opening => {
                    state.waiters.push(tx);
                    return Begin::Wait(rx);
                }
                Slot::Live(socket) if socket.ready_state() == ReadyState::Connecting => {
                    state.waiters.push(tx);
                    return Begin::Wait(rx);
                }
                _ => {}
            }

            state.manual_close = false;
            state.exhausted = false;
            state.attempts = 0;
            state.url = Some(url.clone());
            state.waiters.push(tx);
            state.generation += 1;
            state.slot = Slot::Opening;
            state.generation
        };

        crate::log_info!("Realtime connecting to {}", redact_token(&url));
        self.emit_status(ConnectionStatus::Connecting);
        self.open_socket(&url, generation, false);
        Begin::Wait(rx)
    }

    /// Run the connector for `generation` and install the socket it returns.
    /// A failed reconnect attempt counts against the budget like a dropped
    /// socket does.
    fn open_socket(self: &Arc<Self>, url: &str, generation: u64, reconnecting: bool) {
        let events = SocketEvents {
            inner: Arc::downgrade(self),
            generation,
        };

        match self.connector.open(url, events) {
            Ok(socket) => {
                let mut state = self.lock();
                if state.generation == generation && matches!(state.slot, Slot::Opening) {
                    state.slot = Slot::Live(socket);
                } else {
                    // close() ran while the connector was opening.
                    drop(state);
                    socket.close(CLOSE_NORMAL, "superseded");
                }
            }
            Err(e) => {
                let (waiters, retry) = {
                    let mut state = self.lock();
                    let current = state.generation == generation;
                    if current {
                        state.slot = Slot::Empty;
                    }
                    (
                        std::mem::take(&mut state.waiters),
                        reconnecting && current && !state.manual_close,
                    )
                };
                crate::log_error!("Realtime open failed: {}", e);
                self.emit_status(ConnectionStatus::Disconnected);
                self.errors.emit(&e);
                settle(waiters, Err(e));

                if retry {
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let current = self.lock().generation;
        if current != generation {
            crate::log_debug!(
                "Ignoring event from stale socket (generation {} != {})",
                generation,
                current
            );
        }
        current == generation
    }

    fn handle_open(&self, generation: u64) {
        let waiters = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.attempts = 0;
            state.exhausted = false;
            std::mem::take(&mut state.waiters)
        };
        crate::log_info!("Realtime connected");
        self.emit_status(ConnectionStatus::Connected);
        settle(waiters, Ok(()));
    }

    fn handle_frame(&self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            return;
        }

        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                crate::log_error!("Failed to parse realtime frame: {}", e);
                return;
            }
        };

        self.messages.emit(&message.kind, &message);
        if message.kind == CONNECTION_MESSAGE_TYPE {
            if let Some(status) = message.get_str("status") {
                self.emit_status(ConnectionStatus::from(status));
            }
        }
        self.any_message.emit(&message);
        if !self.events.is_empty() {
            self.events.emit(&message.event());
        }
    }

    fn handle_close(self: &Arc<Self>, generation: u64, code: u16, reason: &str) {
        let (waiters, reconnect) = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.slot = Slot::Empty;
            (
                std::mem::take(&mut state.waiters),
                !state.manual_close && code != CLOSE_NORMAL,
            )
        };

        crate::log_info!("Realtime closed (code {}, reason {:?})", code, reason);
        self.emit_status(ConnectionStatus::Disconnected);
        settle(
            waiters,
            Err(RealtimeError::Transport(format!("closed with code {code}"))),
        );

        if reconnect {
            self.schedule_reconnect();
        }
    }

    fn handle_error(&self, generation: u64, message: String) {
        let waiters = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            std::mem::take(&mut state.waiters)
        };
        crate::log_error!("Realtime transport error: {}", message);
        let error = RealtimeError::Transport(message);
        self.errors.emit(&error);
        settle(waiters, Err(error));
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let max_attempts = self.config.reconnect.max_attempts;
        let scheduled = {
            let mut state = self.lock();
            if state.manual_close {
                return;
            }
            if state.attempts >= max_attempts {
                state.exhausted = true;
                None
            } else {
                state.attempts += 1;
                Some((state.attempts, state.epoch))
            }
        };

        let Some((attempt, epoch)) = scheduled else {
            crate::log_error!("Realtime giving up after {} reconnect attempts", max_attempts);
            self.emit_status(ConnectionStatus::Error);
            self.errors.emit(&RealtimeError::ReconnectExhausted {
                attempts: max_attempts,
            });
            return;
        };

        let delay = self.config.reconnect.delay_for_attempt(attempt);
        crate::log_info!(
            "Realtime reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            attempt,
            max_attempts
        );

        let weak = Arc::downgrade(self);
        runtime::spawn(async move {
            runtime::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.reconnect(epoch);
            }
        });
    }

    fn reconnect(self: &Arc<Self>, epoch: u64) {
        let (url, generation) = {
            let mut state = self.lock();
            if state.epoch != epoch || state.manual_close {
                return;
            }
            if !matches!(state.slot, Slot::Empty) {
                // Someone called connect() in the meantime.
                return;
            }
            let Some(url) = state.url.clone() else {
                return;
            };
            state.generation += 1;
            state.slot = Slot::Opening;
            (url, state.generation)
        };

        self.emit_status(ConnectionStatus::Connecting);
        self.open_socket(&url, generation, true);
    }

    fn close(self: &Arc<Self>) {
        let (socket, waiters) = {
            let mut state = self.lock();
            state.manual_close = true;
            state.exhausted = false;
            state.epoch += 1;
            let socket = match std::mem::replace(&mut state.slot, Slot::Empty) {
                Slot::Live(socket) => Some(socket),
                _ => None,
            };
            (socket, std::mem::take(&mut state.waiters))
        };

        if let Some(socket) = socket {
            socket.close(CLOSE_NORMAL, "client closed");
        }
        crate::log_info!("Realtime closed by client");

        self.messages.clear();
        self.any_message.clear();
        self.events.clear();
        self.status.clear();
        self.errors.clear();
        settle(waiters, Err(RealtimeError::Closed));

        self.resets.emit(&Connection {
            inner: self.clone(),
        });
    }

    fn emit_status(&self, status: ConnectionStatus) {
        self.status.emit(&status);
    }
}

fn settle(waiters: Vec<Waiter>, result: Result<(), RealtimeError>) {
    for waiter in waiters {
        // The caller may have dropped its future.
        let _ = waiter.send(result.clone());
    }
}

/// `base_url` + `endpoint`, with `token` as a query parameter.
///
/// The token travels in the URL because the browser WebSocket API cannot
/// set headers on the handshake.
pub fn build_url(base_url: &str, endpoint: &str, token: &str) -> Result<String, RealtimeError> {
    let base = base_url.trim_end_matches('/');
    let joined = if endpoint.is_empty() {
        base.to_string()
    } else if endpoint.starts_with('/') || endpoint.starts_with('?') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    };

    let mut url =
        url::Url::parse(&joined).map_err(|e| RealtimeError::InvalidUrl(format!("{joined}: {e}")))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

/// Strip the token before a URL goes to the log.
fn redact_token(url: &str) -> String {
    match url.split_once("token=") {
        Some((head, tail)) => {
            let rest = tail.find('&').map_or("", |i| &tail[i..]);
            format!("{head}token=***{rest}")
        }
        None => url.to_string(),
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod transport_wasm;
#[cfg(target_arch = "wasm32")]
pub use transport_wasm::BrowserConnector;

#[cfg(not(target_arch = "wasm32"))]
mod transport_native;
#[cfg(not(target_arch = "wasm32"))]
pub use transport_native::TungsteniteConnector;

/// The connector for the platform being built.
#[cfg(target_arch = "wasm32")]
pub fn default_connector() -> Arc<dyn Connector> {
    Arc::new(BrowserConnector)
}

#[cfg(not(target_arch = "wasm32"))]
pub fn default_connector() -> Arc<dyn Connector> {
    Arc::new(TungsteniteConnector)
}
