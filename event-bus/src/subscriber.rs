//! Subscribing side of the bus

use crate::{error::Error, message::Message, types::Topic, Result};
use tokio::sync::broadcast;

/// Subscriber handle
///
/// Each subscriber has its own cursor. A subscriber that falls more than the
/// channel capacity behind loses the oldest messages and gets
/// `Error::Lagged`; it can recover by replaying the persisted event log from
/// its last seen sequence number.
pub struct Subscriber {
    receiver: broadcast::Receiver<Message>,
    topic_filter: Option<Vec<Topic>>,
}

impl Subscriber {
    /// Create subscriber from a broadcast receiver
    pub(crate) fn new(receiver: broadcast::Receiver<Message>) -> Self {
        Self {
            receiver,
            topic_filter: None,
        }
    }

    /// Restrict this subscriber to the given topics
    pub fn with_topics(mut self, topics: Vec<Topic>) -> Self {
        self.topic_filter = Some(topics);
        self
    }

    /// Receive the next message (filtered if a topic filter is set)
    pub async fn recv(&mut self) -> Result<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => {
                    if let Some(ref topics) = self.topic_filter {
                        if !topics.contains(&message.topic) {
                            continue;
                        }
                    }
                    return Ok(message);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(dropped = n, "Subscriber lagged");
                    return Err(Error::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::Closed);
                }
            }
        }
    }

    /// Try to receive without waiting
    pub fn try_recv(&mut self) -> Result<Option<Message>> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    if let Some(ref topics) = self.topic_filter {
                        if !topics.contains(&message.topic) {
                            continue;
                        }
                    }
                    return Ok(Some(message));
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Err(Error::Lagged(n))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Err(Error::Closed),
            }
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("topic_filter", &self.topic_filter)
            .finish()
    }
}
