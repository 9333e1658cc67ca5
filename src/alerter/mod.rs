pub mod log;
#[cfg(feature = "webhook")]
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::AlertingConfig;
use crate::types::SpikeAlert;

/// Trait for spike notification channels
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Channel name
    fn name(&self) -> &str;

    /// Send a single alert
    async fn send(&self, alert: &SpikeAlert) -> Result<()>;

    /// Check if this channel wants alerts for the given zone
    fn accepts_zone(&self, zone_id: &str) -> bool;
}

/// Outcome of a dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    Deduplicated,
    RateLimited,
}

/// Routes spike alerts to channels with per-zone deduplication and a
/// global rate limit
pub struct AlertManager {
    channels: Vec<Box<dyn AlertChannel>>,
    dedup_map: HashMap<String, DedupEntry>,
    dedup_window: Duration,
    rate_limiter: RateLimiter,
}

struct DedupEntry {
    last_sent: Instant,
    suppressed: u32,
}

struct RateLimiter {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new(per_minute: u32) -> Self {
        Self {
            tokens: per_minute as f64,
            max_tokens: per_minute as f64,
            refill_rate: per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl AlertManager {
    pub fn new(config: &AlertingConfig) -> Result<Self> {
        let mut channels: Vec<Box<dyn AlertChannel>> = Vec::new();

        if config.log.enabled {
            channels.push(Box::new(log::LogChannel::new(&config.log)));
        }

        if let Some(ref wc) = config.webhook {
            if wc.enabled {
                #[cfg(feature = "webhook")]
                channels.push(Box::new(webhook::WebhookChannel::new(wc)?));
                #[cfg(not(feature = "webhook"))]
                tracing::warn!(url = %wc.url, "Webhook channel configured but the `webhook` feature is disabled");
            }
        }

        tracing::info!(channels = channels.len(), "Initialized alert channels");

        Ok(Self::with_channels(channels, config))
    }

    pub fn with_channels(channels: Vec<Box<dyn AlertChannel>>, config: &AlertingConfig) -> Self {
        Self {
            channels,
            dedup_map: HashMap::new(),
            dedup_window: Duration::from_secs(config.dedup_window_secs),
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute),
        }
    }

    pub async fn dispatch(&mut self, alert: SpikeAlert) -> Dispatch {
        if let Some(entry) = self.dedup_map.get_mut(&alert.zone_id) {
            if entry.last_sent.elapsed() < self.dedup_window {
                entry.suppressed += 1;
                tracing::debug!(zone = %alert.zone_id, suppressed = entry.suppressed, "Spike alert deduplicated");
                return Dispatch::Deduplicated;
            }
        }

        if !self.rate_limiter.try_acquire() {
            tracing::warn!(zone = %alert.zone_id, "Spike alert rate limited");
            return Dispatch::RateLimited;
        }

        for channel in &self.channels {
            if channel.accepts_zone(&alert.zone_id) {
                if let Err(e) = channel.send(&alert).await {
                    tracing::error!(
                        channel = channel.name(),
                        zone = %alert.zone_id,
                        error = %e,
                        "Failed to send alert"
                    );
                }
            }
        }

        self.dedup_map.insert(alert.zone_id.clone(), DedupEntry {
            last_sent: Instant::now(),
            suppressed: 0,
        });

        Dispatch::Sent
    }
}

pub(crate) fn zone_filter_accepts(filter: &[String], zone_id: &str) -> bool {
    filter.is_empty() || filter.iter().any(|z| z == zone_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use smallvec::smallvec;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        sent: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl AlertChannel for Recorder {
        fn name(&self) -> &str { "recorder" }

        async fn send(&self, alert: &SpikeAlert) -> Result<()> {
            self.sent.lock().unwrap().push(alert.zone_id.clone());
            if self.fail {
                anyhow::bail!("channel down");
            }
            Ok(())
        }

        fn accepts_zone(&self, zone_id: &str) -> bool {
            zone_id != "W-999"
        }
    }

    fn alert(zone_id: &str) -> SpikeAlert {
        SpikeAlert {
            timestamp: Utc::now(),
            zone_id: zone_id.into(),
            zone_name: "Test".into(),
            value: 500,
            threshold: 392.0,
            confidence: 88,
            cause: "Traffic".into(),
            authority: "Traffic Police".into(),
            recommended_action: "Signal diversion + enforcement".into(),
            hostname: "test-host".into(),
            labels: smallvec![],
        }
    }

    fn manager(dedup_secs: u64, per_minute: u32, fail: bool) -> (AlertManager, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let config = AlertingConfig {
            rate_limit_per_minute: per_minute,
            dedup_window_secs: dedup_secs,
            ..AlertingConfig::default()
        };
        let channels: Vec<Box<dyn AlertChannel>> = vec![Box::new(Recorder { sent: sent.clone(), fail })];
        (AlertManager::with_channels(channels, &config), sent)
    }

    #[tokio::test]
    async fn deduplicates_per_zone() {
        let (mut mgr, sent) = manager(60, 100, false);
        assert_eq!(mgr.dispatch(alert("W-101")).await, Dispatch::Sent);
        assert_eq!(mgr.dispatch(alert("W-101")).await, Dispatch::Deduplicated);
        assert_eq!(mgr.dispatch(alert("W-102")).await, Dispatch::Sent);
        assert_eq!(*sent.lock().unwrap(), vec!["W-101", "W-102"]);
    }

    #[tokio::test]
    async fn rate_limit_caps_bursts() {
        let (mut mgr, sent) = manager(0, 2, false);
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(mgr.dispatch(alert("W-101")).await);
        }
        assert_eq!(&outcomes[..2], &[Dispatch::Sent, Dispatch::Sent]);
        assert!(outcomes[2..].iter().all(|o| *o == Dispatch::RateLimited));
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn channel_failure_is_not_fatal() {
        let (mut mgr, sent) = manager(60, 10, true);
        assert_eq!(mgr.dispatch(alert("W-103")).await, Dispatch::Sent);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skips_channels_filtering_out_the_zone() {
        let (mut mgr, sent) = manager(60, 10, false);
        mgr.dispatch(alert("W-999")).await;
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_zone_filter_accepts_everything() {
        assert!(zone_filter_accepts(&[], "W-101"));
        let filter = vec!["W-102".to_string()];
        assert!(zone_filter_accepts(&filter, "W-102"));
        assert!(!zone_filter_accepts(&filter, "W-101"));
    }
}
