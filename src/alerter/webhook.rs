use anyhow::{ensure, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::config::WebhookConfig;
use crate::types::SpikeAlert;
use super::{zone_filter_accepts, AlertChannel};

/// Posts spike alerts as JSON to a custom endpoint
pub struct WebhookChannel {
    url: String,
    headers: std::collections::HashMap<String, String>,
    zone_filter: Vec<String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        ensure!(!config.url.trim().is_empty(), "webhook url must not be empty");

        Ok(Self {
            url: config.url.clone(),
            headers: config.headers.clone(),
            zone_filter: config.zone_filter.clone(),
            client: reqwest::Client::new(),
        })
    }
}

pub(crate) fn payload(alert: &SpikeAlert) -> serde_json::Value {
    json!({
        "hostname": &alert.hostname,
        "zone_id": &alert.zone_id,
        "zone_name": &alert.zone_name,
        "value": alert.value,
        "threshold": alert.threshold,
        "confidence": alert.confidence,
        "cause": &alert.cause,
        "authority": &alert.authority,
        "recommended_action": &alert.recommended_action,
        "labels": &alert.labels,
        "timestamp": alert.timestamp.to_rfc3339(),
    })
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str { "webhook" }

    fn accepts_zone(&self, zone_id: &str) -> bool {
        zone_filter_accepts(&self.zone_filter, zone_id)
    }

    async fn send(&self, alert: &SpikeAlert) -> Result<()> {
        let mut req = self.client.post(&self.url).json(&payload(alert));
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }

        req.send().await?.error_for_status()?;
        Ok(())
    }
}
