use anyhow::Result;
use async_trait::async_trait;

use crate::config::LogChannelConfig;
use crate::types::SpikeAlert;
use super::{zone_filter_accepts, AlertChannel};

/// Writes spike alerts to the tracing output
pub struct LogChannel {
    zone_filter: Vec<String>,
}

impl LogChannel {
    pub fn new(config: &LogChannelConfig) -> Self {
        Self { zone_filter: config.zone_filter.clone() }
    }
}

#[async_trait]
impl AlertChannel for LogChannel {
    fn name(&self) -> &str { "log" }

    fn accepts_zone(&self, zone_id: &str) -> bool {
        zone_filter_accepts(&self.zone_filter, zone_id)
    }

    async fn send(&self, alert: &SpikeAlert) -> Result<()> {
        tracing::warn!(
            zone = %alert.zone_id,
            value = alert.value,
            threshold = alert.threshold,
            confidence = alert.confidence,
            cause = %alert.cause,
            authority = %alert.authority,
            "Spike in {}: notify {} ({})",
            alert.zone_name,
            alert.authority,
            alert.recommended_action
        );
        Ok(())
    }
}
