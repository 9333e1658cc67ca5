use anyhow::{ensure, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SourceConfig;
use crate::error::EngineError;
use crate::history::HistoryBuffer;
use crate::types::{Reading, Zone};
use super::ReadingSource;

/// Random stand-in for a sensor feed.
///
/// Each reading is either a spike event (`baseline + offset + U[0, spread)`)
/// with probability `spike_probability`, or normal noise around the
/// baseline (`baseline + U[-noise, noise)`).
pub struct SimulatedSource {
    rng: StdRng,
    spike_probability: f64,
    spike_offset: f64,
    spike_spread: f64,
    noise_amplitude: f64,
}

impl SimulatedSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    pub fn seeded(config: &SourceConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &SourceConfig, rng: StdRng) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&config.spike_probability),
            EngineError::invalid(format!(
                "spike_probability must be within [0, 1], got {}",
                config.spike_probability
            ))
        );
        ensure!(
            config.spike_offset.is_finite(),
            EngineError::invalid(format!("spike_offset must be finite, got {}", config.spike_offset))
        );
        for (name, value) in [
            ("spike_spread", config.spike_spread),
            ("noise_amplitude", config.noise_amplitude),
        ] {
            ensure!(
                value.is_finite() && value >= 0.0,
                EngineError::invalid(format!("{} must be finite and not negative, got {}", name, value))
            );
        }

        Ok(Self {
            rng,
            spike_probability: config.spike_probability,
            spike_offset: config.spike_offset,
            spike_spread: config.spike_spread,
            noise_amplitude: config.noise_amplitude,
        })
    }

    fn sample(&mut self, baseline: f64) -> f64 {
        if self.rng.gen_bool(self.spike_probability) {
            baseline + self.spike_offset + self.rng.gen::<f64>() * self.spike_spread
        } else {
            baseline + (self.rng.gen::<f64>() * 2.0 - 1.0) * self.noise_amplitude
        }
    }
}

#[async_trait]
impl ReadingSource for SimulatedSource {
    fn name(&self) -> &str { "simulated" }

    async fn next_reading(&mut self, zone: &Zone, _history: &HistoryBuffer) -> Result<Reading> {
        Ok(Reading::new(self.sample(zone.baseline)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ZoneRegistry;

    fn config() -> SourceConfig {
        SourceConfig::default()
    }

    #[test]
    fn samples_fall_in_normal_or_spike_band() {
        let mut src = SimulatedSource::seeded(&config(), 7).unwrap();
        let baseline = 280.0;
        let mut spikes = 0;
        let draws = 10_000;
        for _ in 0..draws {
            let v = src.sample(baseline);
            let normal = (baseline - 20.0..=baseline + 20.0).contains(&v);
            let spike = (baseline + 150.0..=baseline + 250.0).contains(&v);
            assert!(normal || spike, "value {} outside both bands", v);
            if spike {
                spikes += 1;
            }
        }
        let rate = spikes as f64 / draws as f64;
        assert!((0.12..0.18).contains(&rate), "spike rate {}", rate);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SimulatedSource::seeded(&config(), 42).unwrap();
        let mut b = SimulatedSource::seeded(&config(), 42).unwrap();
        let xs: Vec<f64> = (0..50).map(|_| a.sample(220.0)).collect();
        let ys: Vec<f64> = (0..50).map(|_| b.sample(220.0)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn rejects_bad_probability() {
        let mut cfg = config();
        cfg.spike_probability = 1.5;
        assert!(SimulatedSource::new(&cfg).is_err());
    }

    #[test]
    fn non_finite_parameters_are_invalid_configuration() {
        let cases: [fn(&mut SourceConfig); 4] = [
            |c| c.spike_spread = f64::NAN,
            |c| c.noise_amplitude = f64::INFINITY,
            |c| c.spike_offset = f64::NAN,
            |c| c.noise_amplitude = -1.0,
        ];
        for set in cases {
            let mut cfg = config();
            set(&mut cfg);
            let err = SimulatedSource::seeded(&cfg, 3).err().unwrap();
            assert!(matches!(
                err.downcast_ref::<EngineError>(),
                Some(EngineError::InvalidConfiguration(_))
            ), "{:?}", cfg);
        }
    }

    #[tokio::test]
    async fn reading_tracks_zone_baseline() {
        let mut cfg = config();
        cfg.spike_probability = 0.0;
        let mut src = SimulatedSource::seeded(&cfg, 1).unwrap();
        let registry = ZoneRegistry::builtin();
        let history = HistoryBuffer::new(3).unwrap();
        for zone in registry.iter() {
            let r = src.next_reading(zone, &history).await.unwrap();
            assert!((r.value - zone.baseline).abs() <= 20.0);
        }
    }
}
