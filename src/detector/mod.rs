pub mod confidence;

use std::sync::Arc;

use crate::config::DetectorConfig;
use crate::error::EngineError;
use crate::types::{DetectionResult, Reading, Zone, NORMAL_CAUSE};

pub use confidence::{ConfidenceStrategy, FixedConfidence, RandomConfidence};

pub const DEFAULT_SPIKE_RATIO: f64 = 1.4;

/// Fixed-ratio spike detector.
///
/// A reading is a spike when it is strictly above `baseline * spike_ratio`.
/// Classification depends only on the reading, the zone and the injected
/// confidence strategy.
#[derive(Clone)]
pub struct AnomalyDetector {
    spike_ratio: f64,
    confidence: Arc<dyn ConfidenceStrategy>,
}

impl AnomalyDetector {
    pub fn new(spike_ratio: f64, confidence: Arc<dyn ConfidenceStrategy>) -> Result<Self, EngineError> {
        if !(spike_ratio.is_finite() && spike_ratio > 0.0) {
            return Err(EngineError::invalid(format!(
                "spike ratio must be positive, got {}",
                spike_ratio
            )));
        }
        Ok(Self { spike_ratio, confidence })
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self, EngineError> {
        let strategy = RandomConfidence::new(config.confidence_floor, config.confidence_span);
        Self::new(config.spike_ratio, Arc::new(strategy))
    }

    pub fn spike_ratio(&self) -> f64 {
        self.spike_ratio
    }

    pub fn threshold(&self, zone: &Zone) -> Result<f64, EngineError> {
        if !(zone.baseline.is_finite() && zone.baseline > 0.0) {
            return Err(EngineError::invalid(format!(
                "zone '{}' has non-positive baseline {}",
                zone.id, zone.baseline
            )));
        }
        Ok(zone.baseline * self.spike_ratio)
    }

    pub fn classify(&self, reading: &Reading, zone: &Zone) -> Result<DetectionResult, EngineError> {
        let threshold = self.threshold(zone)?;
        let spike_detected = reading.value > threshold;

        let (confidence, cause) = if spike_detected {
            (
                Some(self.confidence.confidence(reading, zone, threshold)),
                zone.dominant_source.clone(),
            )
        } else {
            (None, NORMAL_CAUSE.to_string())
        };

        Ok(DetectionResult {
            timestamp: reading.timestamp,
            value: reading.value.floor() as i64,
            threshold,
            spike_detected,
            confidence,
            cause,
        })
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            spike_ratio: DEFAULT_SPIKE_RATIO,
            confidence: Arc::new(RandomConfidence::default()),
        }
    }
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("spike_ratio", &self.spike_ratio)
            .finish_non_exhaustive()
    }
}
