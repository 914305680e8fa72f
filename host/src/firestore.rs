//! ==============================================================================
//! firestore.rs - cloud document mirror
//! ==============================================================================
//!
//! purpose:
//!     the esp32 firmware can write its readings to a firestore document
//!     (`live_reading/{deviceId}`) instead of posting to this host. this task
//!     watches that document over the firestore rest api and copies every
//!     new value into the reading store, which pushes it on to a
//!     subscription-source acquisition window.
//!
//! document shape written by the firmware:
//!
//! ```text
//!     { "fields": { "rawValue":  { "integerValue": "2417" },
//!                   "timestamp": { "integerValue": "123456" } },
//!       "updateTime": "2024-06-03T10:15:02.123456Z" }
//! ```
//!
//! relationships:
//!     - writes: store.rs
//!     - started by: main.rs when [firestore] enabled = true
//!
//! ==============================================================================

use crate::config::FirestoreConfig;
use crate::store::ReadingStore;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    fields: HashMap<String, FieldValue>,
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldValue {
    // firestore encodes 64-bit integers as strings
    integer_value: Option<String>,
    double_value: Option<f64>,
}

impl FieldValue {
    fn as_f64(&self) -> Option<f64> {
        self.integer_value
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .or(self.double_value)
    }
}

/// raw value + change marker from a document, if it carries a usable reading
fn parse_document(body: &str) -> Result<Option<(f64, String)>> {
    let doc: Document = serde_json::from_str(body).context("malformed firestore document")?;
    let raw = doc.fields.get("rawValue").and_then(FieldValue::as_f64);
    Ok(match (raw, doc.update_time) {
        (Some(raw), Some(updated)) if raw != 0.0 && raw.is_finite() => Some((raw, updated)),
        _ => None,
    })
}

pub fn document_url(config: &FirestoreConfig, device_id: &str) -> String {
    let mut url = format!(
        "{}/projects/{}/databases/(default)/documents/{}/{}",
        config.base_url.trim_end_matches('/'),
        config.project_id,
        config.collection,
        device_id
    );
    if !config.api_key.is_empty() {
        url.push_str("?key=");
        url.push_str(&config.api_key);
    }
    url
}

pub struct FirestoreMirror {
    client: reqwest::Client,
    url: String,
    device_id: String,
    period: Duration,
    store: Arc<ReadingStore>,
    last_update: Option<String>,
}

impl FirestoreMirror {
    pub fn new(
        config: &FirestoreConfig,
        device_id: &str,
        store: Arc<ReadingStore>,
    ) -> Result<Self> {
        let period = Duration::from_millis(config.poll_millis.max(100));
        let client = reqwest::Client::builder()
            .timeout(period.max(Duration::from_secs(2)))
            .build()
            .context("failed to build firestore http client")?;

        Ok(Self {
            client,
            url: document_url(config, device_id),
            device_id: device_id.to_string(),
            period,
            store,
            last_update: None,
        })
    }

    pub async fn run(mut self, token: CancellationToken) {
        tracing::info!("[FIRESTORE] Mirroring live_reading for {}", self.device_id);
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("[FIRESTORE] Mirror shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        tracing::warn!("[FIRESTORE] ⚠ {:#}", e);
                    }
                }
            }
        }
    }

    /// fetch the document once; returns whether a new value was stored
    pub async fn sync_once(&mut self) -> Result<bool> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("firestore request failed")?
            .error_for_status()
            .context("firestore rejected the request")?
            .text()
            .await?;

        let Some((raw, updated)) = parse_document(&body)? else {
            return Ok(false);
        };
        if self.last_update.as_deref() == Some(updated.as_str()) {
            return Ok(false);
        }

        tracing::debug!("[FIRESTORE] {} -> {}", self.device_id, raw);
        self.store.put(&self.device_id, raw).await;
        self.last_update = Some(updated);
        Ok(true)
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::sync::Mutex;

    #[test]
    fn test_parse_integer_and_double_values() {
        let body = r#"{"fields":{"rawValue":{"integerValue":"2417"}},"updateTime":"t1"}"#;
        assert_eq!(parse_document(body).unwrap(), Some((2417.0, "t1".to_string())));

        let body = r#"{"fields":{"rawValue":{"doubleValue":2417.5}},"updateTime":"t2"}"#;
        assert_eq!(parse_document(body).unwrap(), Some((2417.5, "t2".to_string())));
    }

    #[test]
    fn test_parse_ignores_missing_or_zero() {
        assert_eq!(parse_document(r#"{"fields":{},"updateTime":"t"}"#).unwrap(), None);
        let zero = r#"{"fields":{"rawValue":{"integerValue":"0"}},"updateTime":"t"}"#;
        assert_eq!(parse_document(zero).unwrap(), None);
        assert!(parse_document("<html>").is_err());
    }

    #[test]
    fn test_document_url() {
        let config = FirestoreConfig {
            project_id: "grainscan".to_string(),
            api_key: "k123".to_string(),
            ..FirestoreConfig::default()
        };
        assert_eq!(
            document_url(&config, "device_A4B2"),
            "https://firestore.googleapis.com/v1/projects/grainscan/databases/(default)/documents/live_reading/device_A4B2?key=k123"
        );
    }

    #[tokio::test]
    async fn test_sync_only_stores_changed_documents() {
        let doc = Arc::new(Mutex::new(
            r#"{"fields":{"rawValue":{"integerValue":"2500"}},"updateTime":"t1"}"#.to_string(),
        ));
        let served = doc.clone();
        let app = Router::new().route(
            "/projects/p/databases/(default)/documents/live_reading/device_A4B2",
            get(move || {
                let served = served.clone();
                async move { served.lock().unwrap().clone() }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = FirestoreConfig {
            project_id: "p".to_string(),
            base_url: format!("http://{}", addr),
            ..FirestoreConfig::default()
        };
        let store = Arc::new(ReadingStore::new());
        let mut mirror = FirestoreMirror::new(&config, "device_A4B2", store.clone()).unwrap();

        assert!(mirror.sync_once().await.unwrap());
        assert_eq!(store.latest("device_A4B2").await.raw_value, 2500.0);
        assert!(!mirror.sync_once().await.unwrap());

        *doc.lock().unwrap() = r#"{"fields":{"rawValue":{"integerValue":"2600"}},"updateTime":"t2"}"#.to_string();
        assert!(mirror.sync_once().await.unwrap());
        assert_eq!(store.latest("device_A4B2").await.raw_value, 2600.0);
    }
}
