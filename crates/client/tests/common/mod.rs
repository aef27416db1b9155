#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use frameworks_client::realtime::{
    Connection, Connector, ReadyState, RealtimeConfig, RealtimeError, ReconnectConfig, Socket,
    SocketEvents,
};

/// Socket whose lifecycle the test drives by hand.
pub struct MockSocket {
    state: AtomicU16,
    sent: Mutex<Vec<String>>,
    closed_with: Mutex<Option<(u16, String)>>,
}

impl MockSocket {
    fn new() -> Self {
        Self {
            state: AtomicU16::new(ReadyState::Connecting as u16),
            sent: Mutex::new(Vec::new()),
            closed_with: Mutex::new(None),
        }
    }

    pub fn set_state(&self, state: ReadyState) {
        self.state.store(state as u16, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closed_with(&self) -> Option<(u16, String)> {
        self.closed_with.lock().unwrap().clone()
    }
}

impl Socket for MockSocket {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u16(self.state.load(Ordering::SeqCst))
    }

    fn send_text(&self, text: &str) -> bool {
        if self.ready_state() != ReadyState::Open {
            return false;
        }
        self.sent.lock().unwrap().push(text.to_string());
        true
    }

    fn close(&self, code: u16, reason: &str) {
        self.set_state(ReadyState::Closing);
        *self.closed_with.lock().unwrap() = Some((code, reason.to_string()));
    }
}

/// One socket opened by the connection under test.
#[derive(Clone)]
pub struct MockHandle {
    pub url: String,
    pub events: SocketEvents,
    pub socket: Arc<MockSocket>,
}

impl MockHandle {
    /// Complete the handshake.
    pub fn open(&self) {
        self.socket.set_state(ReadyState::Open);
        self.events.opened();
    }

    pub fn frame(&self, text: &str) {
        self.events.frame(text);
    }

    /// The peer (or the network) closed the socket.
    pub fn drop_with(&self, code: u16) {
        self.socket.set_state(ReadyState::Closed);
        self.events.closed(code, "");
    }

    /// A transport error followed by the close a browser would report.
    pub fn fail(&self, message: &str) {
        self.events.error(message);
        self.drop_with(1006);
    }
}

/// Records every socket it opens.
#[derive(Default)]
pub struct MockConnector {
    opened: Mutex<Vec<MockHandle>>,
    refusing: AtomicBool,
    refused: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn last(&self) -> MockHandle {
        self.opened
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no socket opened yet")
    }

    pub fn nth(&self, index: usize) -> MockHandle {
        self.opened.lock().unwrap()[index].clone()
    }

    /// Make `open` itself fail (DNS, refused handshake) from now on.
    pub fn refuse(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Opens rejected while refusing.
    pub fn refused(&self) -> usize {
        self.refused.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str, events: SocketEvents) -> Result<Arc<dyn Socket>, RealtimeError> {
        if self.refusing.load(Ordering::SeqCst) {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(RealtimeError::Transport("refused".to_string()));
        }
        let socket = Arc::new(MockSocket::new());
        self.opened.lock().unwrap().push(MockHandle {
            url: url.to_string(),
            events,
            socket: socket.clone(),
        });
        Ok(socket)
    }
}

pub fn config(max_attempts: u32) -> RealtimeConfig {
    RealtimeConfig {
        base_url: "ws://admin.test".to_string(),
        reconnect: ReconnectConfig {
            base_interval: Duration::from_secs(1),
            max_attempts,
        },
    }
}

pub fn connection(connector: &Arc<MockConnector>) -> Connection {
    Connection::new(config(3), connector.clone())
}

/// Let spawned tasks run up to their next suspension point.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
