//! Native/Desktop socket implementation using tokio-tungstenite.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use frameworks_shared::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::{Connector, ReadyState, RealtimeError, Socket, SocketEvents};

/// Close code reported when the peer closes without giving one.
const CLOSE_NO_STATUS: u16 = 1005;

enum Outbound {
    Text(String),
    Close(u16, String),
}

/// Opens sockets on the ambient tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str, events: SocketEvents) -> Result<Arc<dyn Socket>, RealtimeError> {
        let (sender, receiver) = unbounded();
        let ready = Arc::new(AtomicU16::new(ReadyState::Connecting as u16));

        tokio::spawn(run_socket(
            url.to_string(),
            ready.clone(),
            receiver,
            events,
        ));

        Ok(Arc::new(TungsteniteSocket { sender, ready }))
    }
}

struct TungsteniteSocket {
    sender: UnboundedSender<Outbound>,
    ready: Arc<AtomicU16>,
}

impl Socket for TungsteniteSocket {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u16(self.ready.load(Ordering::SeqCst))
    }

    fn send_text(&self, text: &str) -> bool {
        if self.ready_state() != ReadyState::Open {
            return false;
        }
        self.sender
            .unbounded_send(Outbound::Text(text.to_string()))
            .is_ok()
    }

    fn close(&self, code: u16, reason: &str) {
        match self.ready_state() {
            ReadyState::Closing | ReadyState::Closed => {}
            _ => {
                self.ready.store(ReadyState::Closing as u16, Ordering::SeqCst);
                let _ = self
                    .sender
                    .unbounded_send(Outbound::Close(code, reason.to_string()));
            }
        }
    }
}

/// Drive one socket from handshake to close, reporting through `events`.
async fn run_socket(
    url: String,
    ready: Arc<AtomicU16>,
    mut outbound: UnboundedReceiver<Outbound>,
    events: SocketEvents,
) {
    let set_state = |state: ReadyState| ready.store(state as u16, Ordering::SeqCst);

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            set_state(ReadyState::Closed);
            events.error(format!("connect failed: {e}"));
            events.closed(CLOSE_ABNORMAL, "");
            return;
        }
    };

    // close() may have been called during the handshake.
    if ready.load(Ordering::SeqCst) == ReadyState::Connecting as u16 {
        set_state(ReadyState::Open);
        events.opened();
    }

    let (mut write, mut read) = ws_stream.split();
    let mut close_code = CLOSE_ABNORMAL;
    let mut close_reason = String::new();
    let mut outbound_open = true;

    loop {
        tokio::select! {
            msg = outbound.next(), if outbound_open => match msg {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        crate::log_error!("Send failed: {}", e);
                        events.error(format!("send failed: {e}"));
                        break;
                    }
                }
                Some(Outbound::Close(code, reason)) => {
                    set_state(ReadyState::Closing);
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if write.send(Message::Close(Some(frame))).await.is_err() {
                        close_code = code;
                        close_reason = reason;
                        break;
                    }
                    close_code = code;
                    close_reason = reason;
                }
                None => {
                    // Every handle dropped: close politely.
                    outbound_open = false;
                    set_state(ReadyState::Closing);
                    let _ = write.send(Message::Close(None)).await;
                    close_code = CLOSE_NORMAL;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => events.frame(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        close_code = u16::from(frame.code);
                        close_reason = frame.reason.as_str().to_string();
                    } else if ready.load(Ordering::SeqCst) != ReadyState::Closing as u16 {
                        close_code = CLOSE_NO_STATUS;
                    }
                    break;
                }
                Some(Ok(Message::Ping(data))) => {
                    // Pong is handled automatically by tungstenite
                    crate::log_debug!("Received ping: {:?}", data);
                }
                Some(Ok(_)) => {
                    // Ignore binary, pong, etc.
                }
                Some(Err(e)) => {
                    crate::log_error!("WebSocket read error: {}", e);
                    events.error(format!("read failed: {e}"));
                    close_code = CLOSE_ABNORMAL;
                    break;
                }
                None => break,
            },
        }
    }

    set_state(ReadyState::Closed);
    events.closed(close_code, &close_reason);
}
