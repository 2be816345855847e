//! Prometheus metrics for the event bus

use crate::types::Topic;
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    /// Total messages published
    pub static ref BUS_PUBLISH_TOTAL: CounterVec = register_counter_vec!(
        "event_bus_publish_total",
        "Total messages published",
        &["topic", "status"]
    )
    .unwrap();
}

/// Record a delivered publish
pub fn record_published(topic: Topic) {
    BUS_PUBLISH_TOTAL
        .with_label_values(&[topic.subject(), "delivered"])
        .inc();
}

/// Record a publish with no subscribers
pub fn record_dropped(topic: Topic) {
    BUS_PUBLISH_TOTAL
        .with_label_values(&[topic.subject(), "dropped"])
        .inc();
}
