//! Realtime configuration.
//!
//! `RealtimeConfig::default()` carries the central realtime settings; each
//! consumer derives its own connection settings from it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::RetryPolicy;

/// Channel (topic) names used by the consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNames {
    pub live_stream: String,
    pub live_chat: String,
    pub admin_chat: String,
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            live_stream: "live_stream_settings_sync".to_string(),
            live_chat: "live_chat_messages_sync".to_string(),
            admin_chat: "admin_live_chat".to_string(),
        }
    }
}

/// Central realtime settings.
///
/// Deserializable from JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub max_retries: u32,
    /// Base retry delay for the stream settings channel
    pub retry_delay_ms: u64,
    /// Base retry delay for the chat channels
    pub chat_retry_delay_ms: u64,
    /// Handshake watchdog; `0` disables it
    pub connection_timeout_ms: u64,
    pub channels: ChannelNames,
    pub chat_message_limit: usize,
    pub admin_chat_message_limit: usize,
    pub auto_scroll: bool,
    /// Pixels from the bottom that still count as "at the bottom"
    pub scroll_threshold: f64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_ms: 2000,
            chat_retry_delay_ms: 1500,
            connection_timeout_ms: 10_000,
            channels: ChannelNames::default(),
            chat_message_limit: 100,
            admin_chat_message_limit: 50,
            auto_scroll: true,
            scroll_threshold: 100.0,
        }
    }
}

impl RealtimeConfig {
    /// Parse a JSON document
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    fn handshake_timeout(&self) -> Option<Duration> {
        (self.connection_timeout_ms > 0).then(|| Duration::from_millis(self.connection_timeout_ms))
    }

    /// Connection settings for the live stream settings channel
    pub fn stream_connection(&self) -> ConnectionConfig {
        ConnectionConfig::new(&self.channels.live_stream)
            .with_retry(RetryPolicy::new(
                self.max_retries,
                Duration::from_millis(self.retry_delay_ms),
            ))
            .with_handshake_timeout(self.handshake_timeout())
    }

    /// Connection settings for a chat channel
    pub fn chat_connection(&self, channel_name: &str) -> ConnectionConfig {
        ConnectionConfig::new(channel_name)
            .with_retry(RetryPolicy::new(
                self.max_retries,
                Duration::from_millis(self.chat_retry_delay_ms),
            ))
            .with_handshake_timeout(self.handshake_timeout())
    }
}

/// Settings for one connection manager
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub channel_name: String,
    pub retry: RetryPolicy,
    pub handshake_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// 5 retries from a 1 s base delay, 10 s handshake watchdog
    pub fn new(channel_name: &str) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            retry: RetryPolicy::default(),
            handshake_timeout: Some(Duration::from_secs(10)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}
