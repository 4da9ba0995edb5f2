//! Streaming client protocol.
//!
//! Every WebSocket text frame is a JSON envelope `{"event": <name>, "data": <payload>}`.
//!
//! | Event              | Direction       | Payload                      |
//! |--------------------|-----------------|------------------------------|
//! | `StartMonitor`     | client → bridge | [`StartMonitorCommand`]      |
//! | `ack`              | client → bridge | [`AckCommand`]               |
//! | `reconnect`        | client → bridge | none                         |
//! | `message`          | bridge → client | welcome string               |
//! | `MonitorVitalData` | bridge → client | [`VitalBatchMessage`]        |
//! | `DicomData`        | bridge → client | [`ImagingResult`]            |

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::imaging::ImagingResult;
use crate::vitals::{VitalSample, WaveformFrame};

/// Greeting sent to every client on connect.
pub const WELCOME_MESSAGE: &str = "Welcome to the MedIoT bridge service";

/// `event` value of a [`StartMonitorCommand`] that stops monitoring.
pub const STOP_EVENT: &str = "stop";

/// Message received from a streaming client.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Start or stop a monitor. Kept as received so it can be republished
    /// byte for byte.
    StartMonitor(Box<RawValue>),
    /// Acknowledge a delivered batch.
    Ack(AckCommand),
    /// Request replay of every unacknowledged batch.
    Reconnect,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

impl ClientMessage {
    /// Parse a client text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let Envelope { event, data } = serde_json::from_str(text)?;
        let payload = |data: Option<Box<RawValue>>| {
            data.ok_or_else(|| Error::Protocol(format!("'{}' event carries no data", event)))
        };

        match event.as_str() {
            "StartMonitor" => Ok(ClientMessage::StartMonitor(payload(data)?)),
            "ack" => Ok(ClientMessage::Ack(serde_json::from_str(payload(data)?.get())?)),
            "reconnect" => Ok(ClientMessage::Reconnect),
            other => Err(Error::Protocol(format!("Unknown client event '{}'", other))),
        }
    }
}

/// Start/stop instruction for a monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartMonitorCommand {
    pub monitor_id: String,
    #[serde(default)]
    pub patient_ipp: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    /// `"stop"` unsubscribes, anything else (re)subscribes.
    #[serde(default)]
    pub event: String,
}

impl StartMonitorCommand {
    /// Decode the `StartMonitor` payload.
    ///
    /// Clients send either the command object or a string holding the command
    /// JSON. Returns the command together with the raw command text, which is
    /// what gets republished to the device.
    pub fn decode(data: &RawValue) -> Result<(Self, Vec<u8>)> {
        let text = data.get();
        match text.trim_start().as_bytes().first() {
            Some(b'"') => {
                let inner: String = serde_json::from_str(text)?;
                let command = serde_json::from_str(&inner)?;
                Ok((command, inner.into_bytes()))
            }
            Some(b'{') => {
                let command = serde_json::from_str(text)?;
                Ok((command, text.as_bytes().to_vec()))
            }
            _ => Err(Error::Protocol(format!(
                "StartMonitor payload must be an object or a JSON string, got {}",
                text
            ))),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.event == STOP_EVENT
    }
}

/// Acknowledgment of a delivered batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckCommand {
    pub monitor_id: String,
    #[serde(rename = "messageId")]
    pub message_id: Uuid,
}

/// Combined vitals and waveform delivered for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalBatchMessage {
    /// Identifier to acknowledge; absent for untracked previews.
    #[serde(
        rename = "messageId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<Uuid>,
    pub monitor_id: String,
    pub data: Vec<VitalSample>,
    pub wave: Option<WaveformFrame>,
}

/// Event pushed to streaming clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "message")]
    Message(String),
    MonitorVitalData(VitalBatchMessage),
    DicomData(ImagingResult),
}

impl ServerEvent {
    pub fn welcome() -> Self {
        ServerEvent::Message(WELCOME_MESSAGE.to_string())
    }

    /// Encode as a client text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
