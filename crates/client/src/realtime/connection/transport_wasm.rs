//! Browser socket implementation on top of `web_sys::WebSocket`.

use std::sync::Arc;

use wasm_bindgen::prelude::*;
use web_sys::{js_sys, CloseEvent, MessageEvent, WebSocket};

use super::{Connector, ReadyState, RealtimeError, Socket, SocketEvents};

/// Opens sockets with the browser's WebSocket API.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserConnector;

impl Connector for BrowserConnector {
    fn open(&self, url: &str, events: SocketEvents) -> Result<Arc<dyn Socket>, RealtimeError> {
        let ws = WebSocket::new(url)
            .map_err(|e| RealtimeError::Transport(format!("Failed to create WebSocket: {e:?}")))?;

        let on_open = events.clone();
        let onopen_callback = Closure::wrap(Box::new(move |_: web_sys::Event| {
            on_open.opened();
        }) as Box<dyn FnMut(web_sys::Event)>);
        ws.set_onopen(Some(onopen_callback.as_ref().unchecked_ref()));
        onopen_callback.forget();

        let on_message = events.clone();
        let onmessage_callback = Closure::wrap(Box::new(move |e: MessageEvent| {
            if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
                let text: String = text.into();
                on_message.frame(&text);
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        ws.set_onmessage(Some(onmessage_callback.as_ref().unchecked_ref()));
        onmessage_callback.forget();

        let on_close = events.clone();
        let onclose_callback = Closure::wrap(Box::new(move |e: CloseEvent| {
            on_close.closed(e.code(), &e.reason());
        }) as Box<dyn FnMut(CloseEvent)>);
        ws.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
        onclose_callback.forget();

        // Browsers hide the cause of socket errors; the close event that
        // follows carries the code.
        let on_error = events;
        let onerror_callback = Closure::wrap(Box::new(move |_: web_sys::Event| {
            on_error.error("WebSocket error");
        }) as Box<dyn FnMut(web_sys::Event)>);
        ws.set_onerror(Some(onerror_callback.as_ref().unchecked_ref()));
        onerror_callback.forget();

        Ok(Arc::new(BrowserSocket { ws }))
    }
}

struct BrowserSocket {
    ws: WebSocket,
}

impl Socket for BrowserSocket {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u16(self.ws.ready_state())
    }

    fn send_text(&self, text: &str) -> bool {
        if self.ready_state() != ReadyState::Open {
            return false;
        }
        match self.ws.send_with_str(text) {
            Ok(()) => true,
            Err(e) => {
                crate::log_error!("Send failed: {:?}", e);
                false
            }
        }
    }

    fn close(&self, code: u16, reason: &str) {
        if let Err(e) = self.ws.close_with_code_and_reason(code, reason) {
            crate::log_warn!("WebSocket close failed: {:?}", e);
        }
    }
}
