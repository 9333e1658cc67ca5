pub mod alerter;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod history;
pub mod registry;
pub mod source;

pub use engine::{Engine, EngineStats};
pub use error::EngineError;

/// Common types used across modules
pub mod types {
    use chrono::{DateTime, Local, Utc};
    use serde::{Deserialize, Serialize};
    use smallvec::SmallVec;

    /// Cause reported for a reading that is not a spike
    pub const NORMAL_CAUSE: &str = "Normal";

    /// Functional category of a monitored zone
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum ZoneCategory {
        #[serde(rename = "Traffic Corridor")]
        TrafficCorridor,
        #[serde(rename = "Industrial Zone")]
        IndustrialZone,
        Residential,
        Commercial,
        #[serde(rename = "Mixed Use")]
        MixedUse,
    }

    /// A monitored ward with its baseline and response metadata
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Zone {
        pub id: String,
        pub name: String,
        pub category: ZoneCategory,
        /// Expected steady-state pollutant concentration
        pub baseline: f64,
        /// Probable cause attributed to this zone's spikes
        pub dominant_source: String,
        pub authority: String,
        pub recommended_action: String,
    }

    /// A single scalar pollutant sample
    #[derive(Debug, Clone, Copy, PartialEq, Serialize)]
    pub struct Reading {
        pub timestamp: DateTime<Utc>,
        pub value: f64,
    }

    impl Reading {
        pub fn new(value: f64) -> Self {
            Self { timestamp: Utc::now(), value }
        }
    }

    /// Outcome of classifying one reading against a zone baseline.
    ///
    /// `confidence` is `Some` exactly when `spike_detected` is true.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct DetectionResult {
        pub timestamp: DateTime<Utc>,
        /// Reading value floored to whole concentration units
        pub value: i64,
        pub threshold: f64,
        pub spike_detected: bool,
        pub confidence: Option<u8>,
        pub cause: String,
    }

    /// One sample of the rolling per-zone history
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct HistoryEntry {
        pub timestamp: DateTime<Utc>,
        /// Wall-clock label for charting, `HH:MM:SS`
        pub time_label: String,
        pub value: i64,
        /// Baseline of the zone active when the sample was captured
        pub baseline: f64,
    }

    impl HistoryEntry {
        pub fn capture(reading: &Reading, zone: &Zone) -> Self {
            Self {
                timestamp: reading.timestamp,
                time_label: reading
                    .timestamp
                    .with_timezone(&Local)
                    .format("%H:%M:%S")
                    .to_string(),
                value: reading.value.floor() as i64,
                baseline: zone.baseline,
            }
        }
    }

    /// Snapshot published to consumers after every tick and zone switch.
    ///
    /// Between a switch and the next tick, `latest` still describes the
    /// previously active zone.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct EngineState {
        pub active_zone: Zone,
        pub latest: Option<DetectionResult>,
        pub history: Vec<HistoryEntry>,
    }

    /// A label key-value pair
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Label {
        pub key: String,
        pub value: String,
    }

    /// Spike notification handed to the alerting layer
    #[derive(Debug, Clone, Serialize)]
    pub struct SpikeAlert {
        pub timestamp: DateTime<Utc>,
        pub zone_id: String,
        pub zone_name: String,
        pub value: i64,
        pub threshold: f64,
        pub confidence: u8,
        pub cause: String,
        pub authority: String,
        pub recommended_action: String,
        pub hostname: String,
        pub labels: SmallVec<[Label; 4]>,
    }

    impl std::fmt::Display for ZoneCategory {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let s = match self {
                ZoneCategory::TrafficCorridor => "Traffic Corridor",
                ZoneCategory::IndustrialZone => "Industrial Zone",
                ZoneCategory::Residential => "Residential",
                ZoneCategory::Commercial => "Commercial",
                ZoneCategory::MixedUse => "Mixed Use",
            };
            write!(f, "{}", s)
        }
    }

    impl std::fmt::Display for Zone {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{} {} ({})", self.id, self.name, self.category)
        }
    }
}
