use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Vital readings as published by a monitor on its `data` topic.
///
/// Only `Timestamp` is mandatory; monitors omit readings they do not measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalReadings {
    /// Device timestamp as sent by the monitor.
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,

    /// Body temperature.
    #[serde(rename = "TEMP", default)]
    pub temperature: Option<f64>,

    /// Oxygen saturation.
    #[serde(rename = "SPO2", default)]
    pub spo2: Option<f64>,

    /// Non-invasive blood pressure, e.g. "120/80".
    #[serde(rename = "NIBP", default)]
    pub non_invasive_blood_pressure: Option<String>,

    /// Pulse rate.
    #[serde(rename = "PR", default)]
    pub pulse_rate: Option<f64>,

    /// Heart rate.
    #[serde(rename = "HR", default)]
    pub heart_rate: Option<f64>,
}

impl VitalReadings {
    /// Parse a `data` topic payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// A vital sample received from a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSample {
    /// Bridge-assigned identifier, unique and increasing within a bridge run.
    pub id: u64,

    #[serde(rename = "deviceId")]
    pub device_id: String,

    #[serde(flatten)]
    pub readings: VitalReadings,
}

impl VitalSample {
    pub fn new(id: u64, device_id: impl Into<String>, readings: VitalReadings) -> Self {
        Self {
            id,
            device_id: device_id.into(),
            readings,
        }
    }
}

/// A single waveform frame received from a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformFrame {
    pub id: u64,

    pub device_id: String,

    /// Frame payload exactly as published on the `wave` topic.
    #[serde(with = "crate::base64_bytes")]
    pub raw_bytes: Vec<u8>,
}

impl WaveformFrame {
    pub fn new(id: u64, device_id: impl Into<String>, raw_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            device_id: device_id.into(),
            raw_bytes: raw_bytes.into(),
        }
    }
}
