use async_trait::async_trait;
use shared::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use domain::entities::metrics::QueueMetrics;
use domain::entities::queue::QueueKey;

/// Read-side view of the job broker.
///
/// Implementations may call out to an external system; the supervisor wraps
/// every fetch in a deadline of half a tick, so slow sources cost a queue
/// its tick rather than stalling the loop.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self, connection: &str, queue: &str) -> Result<QueueMetrics>;
}

/// Fetches queue metrics from a broker-side HTTP endpoint returning the
/// [`QueueMetrics`] JSON shape at `/queues/<connection>/<queue>/metrics`.
pub struct HttpMetricsSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetricsSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn fetch(&self, connection: &str, queue: &str) -> Result<QueueMetrics> {
        let url = format!(
            "{}/queues/{}/{}/metrics",
            self.base_url.trim_end_matches('/'),
            connection,
            queue
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::MetricsUnavailable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::MetricsUnavailable(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        let metrics: QueueMetrics = response
            .json()
            .await
            .map_err(|e| Error::MetricsUnavailable(format!("{}: malformed body: {}", url, e)))?;

        if !metrics.is_sane() {
            return Err(Error::MetricsUnavailable(format!(
                "{}: non-finite or negative fields",
                url
            )));
        }
        Ok(metrics)
    }
}

/// Fixed in-memory metrics table. Used by tests and demo setups; entries can
/// be swapped between ticks to script a scenario.
#[derive(Default)]
pub struct StaticMetricsSource {
    table: Mutex<HashMap<QueueKey, QueueMetrics>>,
}

impl StaticMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: QueueKey, metrics: QueueMetrics) {
        self.table.lock().expect("metrics table poisoned").insert(key, metrics);
    }

    pub fn clear(&self, key: &QueueKey) {
        self.table.lock().expect("metrics table poisoned").remove(key);
    }
}

#[async_trait]
impl MetricsSource for StaticMetricsSource {
    async fn fetch(&self, connection: &str, queue: &str) -> Result<QueueMetrics> {
        let key = QueueKey::new(connection, queue);
        self.table
            .lock()
            .expect("metrics table poisoned")
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::MetricsUnavailable(format!("no metrics for {}", key)))
    }
}
