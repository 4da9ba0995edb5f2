//! Broker topic builders and parsers.
//!
//! Device topics follow the pattern `<prefix>/<device_id>/<channel>` where the
//! channel is one of `data`, `wave` or `configuration`. Imaging notifications
//! arrive on a single fixed topic.

use crate::error::{Error, Result};

/// Default prefix for device topics.
pub const DEFAULT_PREFIX: &str = "mediot";

/// Default topic carrying imaging notifications.
pub const DEFAULT_IMAGING_TOPIC: &str = "dicom/data";

/// Characters that cannot appear in a single topic segment.
const RESERVED_CHARS: &[char] = &['/', '*', '$', '?', '#'];

/// Per-device topic channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceChannel {
    /// Discrete vital samples (JSON).
    Data,
    /// Raw waveform frames (binary).
    Wave,
    /// Control-plane messages published by the bridge.
    Configuration,
}

impl DeviceChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceChannel::Data => "data",
            DeviceChannel::Wave => "wave",
            DeviceChannel::Configuration => "configuration",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "data" => Some(DeviceChannel::Data),
            "wave" => Some(DeviceChannel::Wave),
            "configuration" => Some(DeviceChannel::Configuration),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an inbound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTopic<'a> {
    /// A device-scoped topic.
    Device {
        device_id: &'a str,
        channel: DeviceChannel,
    },
    /// The imaging notification topic.
    Imaging,
}

/// Topic layout used by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    prefix: String,
    imaging: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_IMAGING_TOPIC)
    }
}

impl TopicScheme {
    /// Create a scheme with a custom device prefix and imaging topic.
    pub fn new(prefix: impl Into<String>, imaging: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            imaging: imaging.into(),
        }
    }

    /// Build a device topic.
    ///
    /// # Example
    /// ```
    /// use mediot_common::topic::{DeviceChannel, TopicScheme};
    ///
    /// let topics = TopicScheme::default();
    /// assert_eq!(topics.device("M1", DeviceChannel::Data), "mediot/M1/data");
    /// ```
    pub fn device(&self, device_id: &str, channel: DeviceChannel) -> String {
        format!("{}/{}/{}", self.prefix, device_id, channel)
    }

    pub fn data(&self, device_id: &str) -> String {
        self.device(device_id, DeviceChannel::Data)
    }

    pub fn wave(&self, device_id: &str) -> String {
        self.device(device_id, DeviceChannel::Wave)
    }

    pub fn configuration(&self, device_id: &str) -> String {
        self.device(device_id, DeviceChannel::Configuration)
    }

    /// Topics carrying live data for a device, in subscription order.
    pub fn live_topics(&self, device_id: &str) -> [String; 2] {
        [self.data(device_id), self.wave(device_id)]
    }

    /// The imaging notification topic.
    pub fn imaging(&self) -> &str {
        &self.imaging
    }

    /// Topic for bridge status messages.
    ///
    /// # Example
    /// ```
    /// use mediot_common::topic::TopicScheme;
    ///
    /// assert_eq!(TopicScheme::default().status(), "mediot/@/status");
    /// ```
    pub fn status(&self) -> String {
        format!("{}/@/status", self.prefix)
    }

    /// Classify an inbound topic.
    ///
    /// Returns `None` for topics that are neither device topics under the
    /// prefix nor the imaging topic.
    pub fn parse<'a>(&self, topic: &'a str) -> Option<ParsedTopic<'a>> {
        if topic == self.imaging {
            return Some(ParsedTopic::Imaging);
        }

        let rest = topic.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        let (device_id, channel) = rest.split_once('/')?;

        if device_id.is_empty() || channel.contains('/') {
            return None;
        }

        Some(ParsedTopic::Device {
            device_id,
            channel: DeviceChannel::parse(channel)?,
        })
    }
}

/// Check that a device identifier can be used as a single topic segment.
pub fn validate_device_id(device_id: &str) -> Result<()> {
    if device_id.is_empty() {
        return Err(Error::Topic("device identifier is empty".to_string()));
    }
    if let Some(c) = device_id.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(Error::Topic(format!(
            "device identifier '{}' contains reserved character '{}'",
            device_id, c
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_topics() {
        let topics = TopicScheme::default();

        assert_eq!(topics.data("M1"), "mediot/M1/data");
        assert_eq!(topics.wave("M1"), "mediot/M1/wave");
        assert_eq!(topics.configuration("M1"), "mediot/M1/configuration");
        assert_eq!(
            topics.live_topics("M1"),
            ["mediot/M1/data".to_string(), "mediot/M1/wave".to_string()]
        );
        assert_eq!(topics.imaging(), "dicom/data");
    }

    #[test]
    fn test_parse_device_topics() {
        let topics = TopicScheme::default();

        assert_eq!(
            topics.parse("mediot/M1/data"),
            Some(ParsedTopic::Device {
                device_id: "M1",
                channel: DeviceChannel::Data
            })
        );
        assert_eq!(
            topics.parse("mediot/bed-12/wave"),
            Some(ParsedTopic::Device {
                device_id: "bed-12",
                channel: DeviceChannel::Wave
            })
        );
        assert_eq!(topics.parse("dicom/data"), Some(ParsedTopic::Imaging));
    }

    #[test]
    fn test_parse_rejects_foreign_topics() {
        let topics = TopicScheme::default();

        assert!(topics.parse("mediot/M1").is_none());
        assert!(topics.parse("mediot//data").is_none());
        assert!(topics.parse("mediot/M1/data/extra").is_none());
        assert!(topics.parse("mediot/M1/unknown").is_none());
        assert!(topics.parse("mediotx/M1/data").is_none());
        assert!(topics.parse("other/M1/data").is_none());
    }

    #[test]
    fn test_custom_scheme() {
        let topics = TopicScheme::new("ward3", "pacs/notify");

        assert_eq!(topics.data("M1"), "ward3/M1/data");
        assert_eq!(topics.parse("pacs/notify"), Some(ParsedTopic::Imaging));
        assert!(topics.parse("dicom/data").is_none());
    }

    #[test]
    fn test_validate_device_id() {
        assert!(validate_device_id("M1").is_ok());
        assert!(validate_device_id("bed-12_a").is_ok());
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id("a/b").is_err());
        assert!(validate_device_id("*").is_err());
        assert!(validate_device_id("dev$1").is_err());
    }
}
