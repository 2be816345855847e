//! Message envelope for pub/sub

use crate::types::Topic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// Topic
    pub topic: Topic,

    /// Ledger event sequence number this message carries
    pub sequence: u64,

    /// Payload (JSON-serialized ledger event)
    pub payload: serde_json::Value,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Headers (metadata)
    pub headers: std::collections::HashMap<String, String>,
}

impl Message {
    /// Create new message
    pub fn new(topic: Topic, sequence: u64, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            topic,
            sequence,
            payload,
            timestamp: Utc::now(),
            headers: std::collections::HashMap::new(),
        }
    }

    /// Add header
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Subject string for this message
    pub fn subject(&self) -> &'static str {
        self.topic.subject()
    }
}
