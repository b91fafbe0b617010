//! Topic fan-out for committed booking and helper changes.
//!
//! One `tokio::sync::broadcast` channel per topic, created lazily by the
//! first subscriber. Publishing to a topic nobody listens on is dropped.
//!
//! ```text
//! Dispatcher / HelperRegistry ──event──▶ StreamHub ──▶ "bookings"
//!                                                  ├─▶ "booking:{id}"
//!                                                  ├─▶ "requester:{id}"
//!                                                  └─▶ "helper:{id}"  ──▶ SSE / tests
//! ```

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{trace, warn};

use crate::domains::bookings::BookingEvent;
use crate::domains::helpers::HelperEvent;

/// Buffered events per topic before slow subscribers start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub mod topics {
    use crate::common::{BookingId, HelperId, RequesterId};

    /// Every booking change.
    pub const BOOKINGS: &str = "bookings";
    /// Every helper registry change.
    pub const HELPERS: &str = "helpers";

    pub fn booking(id: BookingId) -> String {
        format!("booking:{id}")
    }

    pub fn requester(id: RequesterId) -> String {
        format!("requester:{id}")
    }

    /// Offers, assignments and profile changes for one helper.
    pub fn helper(id: HelperId) -> String {
        format!("helper:{id}")
    }

    /// Whether `topic` is one of the names above with a well-formed id.
    pub fn is_known(topic: &str) -> bool {
        match topic.split_once(':') {
            None => topic == BOOKINGS || topic == HELPERS,
            Some(("booking", id)) => id.parse::<BookingId>().is_ok(),
            Some(("requester", id)) => id.parse::<RequesterId>().is_ok(),
            Some(("helper", id)) => id.parse::<HelperId>().is_ok(),
            Some(_) => false,
        }
    }
}

type Channels = HashMap<String, broadcast::Sender<Value>>;

/// Cheap to clone; clones share the same channels.
#[derive(Clone)]
pub struct StreamHub {
    channels: Arc<RwLock<Channels>>,
    channel_capacity: usize,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self {
            channels: Arc::default(),
            channel_capacity,
        }
    }

    /// Send `value` to the current subscribers of `topic`, returning how many
    /// received it.
    pub async fn publish(&self, topic: &str, value: Value) -> usize {
        match self.channels.read().await.get(topic) {
            Some(sender) => sender.send(value).unwrap_or(0),
            None => 0,
        }
    }

    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value> {
        let capacity = self.channel_capacity;
        self.channels
            .write()
            .await
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    /// Drop topics whose last subscriber went away.
    pub async fn cleanup(&self) {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        trace!(dropped = before - channels.len(), "Stream topics cleaned up");
    }

    pub async fn publish_booking_event(&self, event: &BookingEvent) {
        self.fan_out(event, &event.topics()).await;
    }

    pub async fn publish_helper_event(&self, event: &HelperEvent) {
        self.fan_out(event, &event.topics()).await;
    }

    async fn fan_out<E: Serialize>(&self, event: &E, topics: &[String]) {
        let value = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Dropping event that failed to serialize");
                return;
            }
        };
        for topic in topics {
            self.publish(topic, value.clone()).await;
        }
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}
