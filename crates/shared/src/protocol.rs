//! Realtime wire protocol.
//!
//! Every frame the server pushes is a JSON object carrying a `type`
//! discriminator next to an arbitrary payload:
//!
//! ```json
//! { "type": "ai-processing-update", "status": "completed", "result": [ ... ] }
//! ```
//!
//! [`InboundMessage`] keeps the frame as-is for type-keyed subscribers, and
//! [`InboundMessage::event`] decodes it into the closed [`ServerEvent`] set
//! for code that wants an exhaustive match.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Close code for a normal, requested closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when a socket drops without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Message type the server uses to push connection status overrides.
pub const CONNECTION_MESSAGE_TYPE: &str = "connection";
/// Suffix shared by every job progress feed (`<feature>-update`).
pub const JOB_UPDATE_SUFFIX: &str = "-update";

/// A decoded inbound frame: its `type` plus everything else it carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl InboundMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Builder used mostly by tests and fixtures.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Parse a text frame. Frames without a string `type` are rejected.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Deserialize the payload (without `type`) into a concrete shape.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }

    /// Decode into the closed event set.
    pub fn event(&self) -> ServerEvent {
        if self.kind == CONNECTION_MESSAGE_TYPE {
            if let Some(status) = self.get_str("status") {
                return ServerEvent::Connection {
                    status: ConnectionStatus::from(status),
                };
            }
        }

        if let Some(feature) = self.kind.strip_suffix(JOB_UPDATE_SUFFIX) {
            if !feature.is_empty() {
                if let Ok(update) = self.payload_as::<JobUpdate>() {
                    return ServerEvent::JobUpdate {
                        feature: feature.to_string(),
                        update,
                    };
                }
            }
        }

        ServerEvent::Unrecognized {
            kind: self.kind.clone(),
        }
    }
}

/// Every frame shape the client knows how to interpret.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Server-pushed status override (`{"type":"connection","status":...}`).
    Connection { status: ConnectionStatus },
    /// Progress of a long-running server job (`{"type":"<feature>-update",...}`).
    JobUpdate { feature: String, update: JobUpdate },
    /// Anything else. Still delivered to type-keyed subscribers.
    Unrecognized { kind: String },
}

/// Connection status as reported to status listeners.
///
/// The first five are the lifecycle states of a client connection; servers
/// may push other labels through `connection` frames, which land in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Error,
    Other(String),
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Closing => "closing",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Other(label) => label,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl From<&str> for ConnectionStatus {
    fn from(value: &str) -> Self {
        match value {
            "disconnected" => ConnectionStatus::Disconnected,
            "connecting" => ConnectionStatus::Connecting,
            "connected" => ConnectionStatus::Connected,
            "closing" => ConnectionStatus::Closing,
            "error" => ConnectionStatus::Error,
            other => ConnectionStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for ConnectionStatus {
    fn from(value: String) -> Self {
        ConnectionStatus::from(value.as_str())
    }
}

impl From<ConnectionStatus> for String {
    fn from(value: ConnectionStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status field of a job progress frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "started", alias = "pending")]
    Processing,
    #[serde(alias = "complete", alias = "done")]
    Completed,
    #[serde(alias = "failed")]
    Error,
    #[serde(other)]
    Unknown,
}

/// Payload of a `<feature>-update` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl JobUpdate {
    /// Item count for a completed job: the explicit `count`, else the length
    /// of an array `result`, else zero.
    pub fn result_count(&self) -> u64 {
        if let Some(count) = self.count {
            return count;
        }
        match &self.result {
            Some(Value::Array(items)) => items.len() as u64,
            _ => 0,
        }
    }
}

/// Message type carrying updates for `feature`.
pub fn job_update_type(feature: &str) -> String {
    format!("{feature}{JOB_UPDATE_SUFFIX}")
}
