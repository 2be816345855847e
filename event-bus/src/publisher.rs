//! Publishing side of the bus
//!
//! Publishing is fire-and-forget: a send with no live subscribers is not an
//! error, and a slow subscriber only loses its own messages. The ledger's
//! authoritative event log lives in storage; the bus is a notification
//! channel, so dropped notifications are recoverable by replaying the log.

use crate::{message::Message, metrics, Subscriber};
use tokio::sync::broadcast;

/// Publisher handle
#[derive(Clone)]
pub struct Publisher {
    sender: broadcast::Sender<Message>,
}

impl Publisher {
    /// Create a publisher with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a message to all current subscribers
    ///
    /// Returns the number of subscribers that received the message.
    pub fn publish(&self, message: Message) -> usize {
        let topic = message.topic;
        let sequence = message.sequence;

        match self.sender.send(message) {
            Ok(receivers) => {
                metrics::record_published(topic);
                tracing::debug!(%topic, sequence, receivers, "Message published");
                receivers
            }
            Err(_) => {
                // No subscribers; message intentionally dropped
                metrics::record_dropped(topic);
                tracing::trace!(%topic, sequence, "No subscribers, message dropped");
                0
            }
        }
    }

    /// Create a new subscriber attached to this publisher
    pub fn subscribe(&self) -> Subscriber {
        Subscriber::new(self.sender.subscribe())
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
