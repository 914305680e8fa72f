//! ==============================================================================
//! store.rs - last raw reading per device
//! ==============================================================================
//!
//! purpose:
//!     holds the most recent raw value each sensor device reported, and
//!     pushes every write to subscribers. this is the "document store" the
//!     subscription source listens to, whether the value arrived over the
//!     http endpoint or from the firestore mirror.
//!
//! concurrency:
//!     one tokio rwlock over the map (http reads, device writes) and one
//!     broadcast channel for updates. last write wins per device; a single
//!     physical writer per device id is assumed.
//!
//! relationships:
//!     - written by: server.rs (POST /api/sensor), firestore.rs (mirror)
//!     - read by: server.rs (GET /api/sensor)
//!     - subscribed by: acquisition/source.rs (SubscriptionSource)
//!
//! ==============================================================================

use crate::domain::{now_ms, RawReading};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// a write to the store, as seen by subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUpdate {
    pub device_id: String,
    pub reading: RawReading,
}

pub struct ReadingStore {
    readings: RwLock<HashMap<String, RawReading>>,
    updates: broadcast::Sender<DeviceUpdate>,
    started_at: i64,
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            readings: RwLock::new(HashMap::new()),
            updates,
            started_at: now_ms(),
        }
    }

    /// record a value stamped with the arrival time
    pub async fn put(&self, device_id: &str, raw_value: f64) -> RawReading {
        let reading = RawReading { raw_value, timestamp: now_ms() };
        self.put_reading(device_id, reading).await;
        reading
    }

    pub async fn put_reading(&self, device_id: &str, reading: RawReading) {
        self.readings.write().await.insert(device_id.to_string(), reading);

        // no subscribers is fine - nobody is measuring right now
        let _ = self.updates.send(DeviceUpdate {
            device_id: device_id.to_string(),
            reading,
        });
    }

    /// last reading for the device, or `{0, process start}` if it never reported
    pub async fn latest(&self, device_id: &str) -> RawReading {
        self.readings
            .read()
            .await
            .get(device_id)
            .copied()
            .unwrap_or(RawReading { raw_value: 0.0, timestamp: self.started_at })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceUpdate> {
        self.updates.subscribe()
    }
}
