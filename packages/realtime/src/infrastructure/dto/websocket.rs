//! WebSocket frames of the `/realtime` change feed endpoint.
//!
//! The client joins and leaves topics; the gateway answers each join with a
//! status frame and then forwards every change event to joined topics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ChangeKind, SubscribeStatus};

/// Client → gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { topic: String },
    Leave { topic: String },
}

/// Gateway → client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Status {
        topic: String,
        status: SubscribeStatus,
    },
    Change {
        topic: String,
        event: ChangeEventDto,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEventDto {
    pub table: String,
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}
