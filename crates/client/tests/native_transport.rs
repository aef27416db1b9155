#![cfg(not(target_arch = "wasm32"))]

use std::sync::Arc;
use std::time::Duration;

use frameworks_client::realtime::{
    Connection, RealtimeConfig, ReconnectConfig, TungsteniteConnector,
};
use frameworks_shared::ConnectionStatus;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

fn config(base_url: String) -> RealtimeConfig {
    RealtimeConfig {
        base_url,
        reconnect: ReconnectConfig::default(),
    }
}

#[tokio::test]
async fn round_trip_against_a_local_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uri_rx) = oneshot::channel::<String>();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(req.uri().to_string());
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        ws.send(Message::Text(
            r#"{"type":"comparison-update","status":"completed","count":2}"#.into(),
        ))
        .await
        .unwrap();

        let mut received = Vec::new();
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => received.push(text.as_str().to_string()),
                Ok(Message::Close(frame)) => return (received, frame.map(|f| u16::from(f.code))),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        (received, None)
    });

    let conn = Connection::new(config(format!("ws://{addr}")), Arc::new(TungsteniteConnector));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = conn.subscribe("comparison-update", move |m| {
        let _ = tx.send(m.clone());
    });

    timeout(WAIT, conn.connect("secret token", "/ws"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conn.get_state(), ConnectionStatus::Connected);
    assert_eq!(uri_rx.await.unwrap(), "/ws?token=secret+token");

    let update = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(update.get_str("status"), Some("completed"));

    assert!(conn.send(&json!({"type": "ack"})));
    conn.close();

    let (received, close_code) = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(received, vec![r#"{"type":"ack"}"#.to_string()]);
    assert_eq!(close_code, Some(1000));
}

#[tokio::test]
async fn refused_connection_rejects_connect() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let conn = Connection::new(config(format!("ws://{addr}")), Arc::new(TungsteniteConnector));
    let result = timeout(WAIT, conn.connect("jwt", "/ws")).await.unwrap();
    assert!(result.is_err());
    conn.close();
}
