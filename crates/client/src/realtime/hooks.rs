//! Realtime hooks for Dioxus components.
//!
//! Listeners registered here belong to the component that registered them
//! and are removed when it unmounts, so remounting a screen never stacks
//! duplicate handlers on the shared connection.
//!
//! `Connection::close` empties every registry, so each hook also holds a
//! reset listener that registers its handlers again right away. The
//! component keeps receiving frames across a disconnect/connect cycle.
//!
//! Connection callbacks may fire off the UI thread on desktop, so they
//! never touch signals directly: they forward into a channel drained by a
//! task spawned in the owning scope.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};

use dioxus::prelude::*;
use frameworks_shared::{ConnectionStatus, InboundMessage, JobUpdate};
use futures_channel::mpsc::{unbounded, UnboundedSender};
use futures_util::StreamExt;
use serde::Serialize;

use super::connection::{default_connector, Connection, RealtimeError};
use super::job_tracker::{JobTracker, JobTransition};
use super::registry::Subscription;
use crate::config::ClientConfig;
use crate::runtime;

/// Owns the app's realtime connection and shares it through context.
///
/// Connects straight away when the config carries a token and closes the
/// connection when unmounted (logout).
#[component]
pub fn RealtimeProvider(config: ClientConfig, children: Element) -> Element {
    let config = use_context_provider(|| config.clone());
    let connection =
        use_context_provider(|| Connection::new(config.realtime(), default_connector()));

    use_hook({
        let connection = connection.clone();
        move || {
            if let Some(token) = config.token.clone() {
                let endpoint = config.ws_endpoint.clone();
                spawn(async move {
                    if let Err(e) = connection.connect(&token, &endpoint).await {
                        crate::log_warn!("Initial realtime connect failed: {}", e);
                    }
                });
            }
        }
    });

    use_drop(move || connection.close());

    children
}

/// The connection provided by the nearest [`RealtimeProvider`].
pub fn use_connection() -> Connection {
    use_context::<Connection>()
}

enum HookEvent {
    Status(ConnectionStatus),
    Message(InboundMessage),
    Error(RealtimeError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registrations that come back after `Connection::close`.
///
/// `register` runs once now and again after every close, replacing the
/// previous guards. Dropping this removes both the reset listener and the
/// current registrations.
struct Scoped {
    // Dropped first so a concurrent close cannot re-register mid-teardown.
    _reset: Subscription,
    active: Arc<Mutex<Vec<Subscription>>>,
}

impl Scoped {
    fn new(
        connection: &Connection,
        register: impl Fn(&Connection) -> Vec<Subscription> + Send + Sync + 'static,
    ) -> Self {
        let active = Arc::new(Mutex::new(register(connection)));
        let slot = active.clone();
        let reset = connection.on_reset(move |connection| {
            crate::log_debug!("Realtime registries cleared; registering hook handlers again");
            *lock(&slot) = register(connection);
        });
        Self {
            _reset: reset,
            active,
        }
    }

    fn len(&self) -> usize {
        lock(&self.active).len()
    }
}

/// Forward every `kind` frame into `tx`.
fn forward(
    connection: &Connection,
    kind: &str,
    tx: &UnboundedSender<InboundMessage>,
) -> Subscription {
    let tx = tx.clone();
    connection.subscribe(kind, move |message| {
        let _ = tx.unbounded_send(message.clone());
    })
}

/// Status, error and message listeners feeding one `use_realtime` scope.
fn attach(connection: &Connection, events: &UnboundedSender<HookEvent>) -> Vec<Subscription> {
    let status = events.clone();
    let errors = events.clone();
    let messages = events.clone();
    vec![
        connection.on_connection_status(move |next| {
            let _ = status.unbounded_send(HookEvent::Status(next.clone()));
        }),
        connection.on_error(move |error| {
            let _ = errors.unbounded_send(HookEvent::Error(error.clone()));
        }),
        connection.on_message(move |message| {
            let _ = messages.unbounded_send(HookEvent::Message(message.clone()));
        }),
    ]
}

/// Reactive view of the connection plus scoped wrappers around it.
#[derive(Clone)]
pub struct RealtimeHandle {
    pub status: Signal<ConnectionStatus>,
    pub last_message: Signal<Option<InboundMessage>>,
    pub last_error: Signal<Option<RealtimeError>>,
    connection: Connection,
    endpoint: String,
    listeners: Rc<RefCell<Option<Scoped>>>,
}

impl RealtimeHandle {
    /// Connect with `token` on the configured endpoint.
    pub fn connect(&self, token: impl Into<String>) {
        let connection = self.connection.clone();
        let endpoint = self.endpoint.clone();
        let token = token.into();
        spawn(async move {
            if let Err(e) = connection.connect(&token, &endpoint).await {
                crate::log_warn!("Realtime connect failed: {}", e);
            }
        });
    }

    /// Close the connection. Subscribers registered directly on it are
    /// dropped; hook-owned ones come back on their own.
    pub fn disconnect(&mut self) {
        self.connection.close();
        self.status.set(ConnectionStatus::Disconnected);
    }

    /// Subscribe on the shared connection. The caller owns the returned
    /// registration; see [`use_subscription`] for a scoped variant.
    pub fn subscribe(
        &self,
        kind: &str,
        handler: impl Fn(&InboundMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.connection.subscribe(kind, handler)
    }

    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        self.connection.send(message)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Listeners this handle currently holds on the connection.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().as_ref().map_or(0, Scoped::len)
    }
}

/// Connection status, last message and last error as signals, with
/// `connect`/`disconnect`/`subscribe`/`send` wrappers.
pub fn use_realtime() -> RealtimeHandle {
    let connection = use_connection();
    let config = use_context::<ClientConfig>();
    let mut status = use_signal(|| connection.get_state());
    let mut last_message = use_signal(|| None::<InboundMessage>);
    let mut last_error = use_signal(|| None::<RealtimeError>);

    let handle = use_hook(move || {
        let (events, mut rx) = unbounded::<HookEvent>();
        spawn(async move {
            while let Some(event) = rx.next().await {
                match event {
                    HookEvent::Status(next) => status.set(next),
                    HookEvent::Message(message) => last_message.set(Some(message)),
                    HookEvent::Error(error) => last_error.set(Some(error)),
                }
            }
        });

        let listeners = Scoped::new(&connection, move |connection| attach(connection, &events));
        RealtimeHandle {
            status,
            last_message,
            last_error,
            connection,
            endpoint: config.ws_endpoint.clone(),
            listeners: Rc::new(RefCell::new(Some(listeners))),
        }
    });

    let listeners = handle.listeners.clone();
    use_drop(move || {
        listeners.borrow_mut().take();
    });

    handle
}

/// Latest frame of type `kind`, for as long as the calling component lives.
pub fn use_subscription(kind: &str) -> Signal<Option<InboundMessage>> {
    let connection = use_connection();
    let mut latest = use_signal(|| None::<InboundMessage>);

    let subscription = use_hook(|| {
        let (tx, mut rx) = unbounded::<InboundMessage>();
        let kind = kind.to_string();
        let scoped = Scoped::new(&connection, move |connection| {
            vec![forward(connection, &kind, &tx)]
        });
        spawn(async move {
            while let Some(message) = rx.next().await {
                latest.set(Some(message));
            }
        });
        Rc::new(RefCell::new(Some(scoped)))
    });

    use_drop(move || {
        subscription.borrow_mut().take();
    });

    latest
}

/// Track a server job through its `<feature>-update` frames.
///
/// Completed runs keep their result and count; a failed run shows its
/// message for the configured delay and then drops back to idle, unless a
/// newer update arrived in the meantime.
pub fn use_job_tracker(feature: &str) -> Signal<JobTracker> {
    let connection = use_connection();
    let config = use_context::<ClientConfig>();
    let mut tracker = use_signal(|| JobTracker::new(feature));

    let subscription = use_hook(|| {
        let (tx, mut rx) = unbounded::<InboundMessage>();
        let kind = tracker.peek().update_type();
        let scoped = Scoped::new(&connection, move |connection| {
            vec![forward(connection, &kind, &tx)]
        });

        let reset_after = config.job_error_reset;
        spawn(async move {
            while let Some(message) = rx.next().await {
                let update = match message.payload_as::<JobUpdate>() {
                    Ok(update) => update,
                    Err(e) => {
                        crate::log_warn!("Malformed {} frame: {}", message.kind, e);
                        continue;
                    }
                };

                let transition = tracker.write().apply(&update);
                match transition {
                    JobTransition::Completed => {
                        crate::log_info!("{} completed with {} items", message.kind, update.result_count());
                    }
                    JobTransition::Failed => {
                        let failure = tracker.peek().failure();
                        spawn(async move {
                            runtime::sleep(reset_after).await;
                            tracker.write().clear_error(failure);
                        });
                    }
                    JobTransition::Started | JobTransition::Progressed | JobTransition::Ignored => {}
                }
            }
        });

        Rc::new(RefCell::new(Some(scoped)))
    });

    use_drop(move || {
        subscription.borrow_mut().take();
    });

    tracker
}
