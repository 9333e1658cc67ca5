pub mod scripted;
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{SourceConfig, SourceKind};
use crate::history::HistoryBuffer;
use crate::types::{Reading, Zone};

pub use scripted::ScriptedSource;
pub use simulated::SimulatedSource;

/// Trait for anything that can feed pollutant readings to the engine.
///
/// The engine calls `next_reading` once per tick for the active zone. A
/// source only produces samples; deciding whether a sample is a spike is
/// left to the detector. A hardware or telemetry adapter implements this
/// trait with the same contract and reports failures as errors.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Human-readable name for this source (e.g., "simulated")
    fn name(&self) -> &str;

    /// Produce the next reading for `zone`. `history` holds the samples
    /// captured for the zone since it became active.
    async fn next_reading(&mut self, zone: &Zone, history: &HistoryBuffer) -> Result<Reading>;
}

/// Create the configured reading source
pub fn create_source(config: &SourceConfig) -> Result<Box<dyn ReadingSource>> {
    let source: Box<dyn ReadingSource> = match config.kind {
        SourceKind::Simulated => Box::new(SimulatedSource::new(config)?),
    };

    tracing::info!(source = source.name(), seed = ?config.seed, "Initialized reading source");
    Ok(source)
}
