use rand::Rng;

use crate::types::{Reading, Zone};

/// Produces the confidence percentage attached to a declared spike.
///
/// Injected into the detector so tests can pin the value while the
/// random generator is checked against its range separately.
pub trait ConfidenceStrategy: Send + Sync {
    fn confidence(&self, reading: &Reading, zone: &Zone, threshold: f64) -> u8;
}

/// Heuristic confidence: `floor + uniform_int[0, span)`.
///
/// With the defaults this is an integer in `[80, 94]`.
#[derive(Debug, Clone, Copy)]
pub struct RandomConfidence {
    floor: u8,
    span: u8,
}

impl RandomConfidence {
    pub fn new(floor: u8, span: u8) -> Self {
        Self { floor, span: span.max(1) }
    }

    pub fn range(&self) -> std::ops::RangeInclusive<u8> {
        self.floor..=self.floor.saturating_add(self.span - 1)
    }
}

impl Default for RandomConfidence {
    fn default() -> Self {
        Self::new(80, 15)
    }
}

impl ConfidenceStrategy for RandomConfidence {
    fn confidence(&self, _reading: &Reading, _zone: &Zone, _threshold: f64) -> u8 {
        let jitter = rand::thread_rng().gen_range(0..self.span);
        self.floor.saturating_add(jitter)
    }
}

/// Always reports the same confidence
#[derive(Debug, Clone, Copy)]
pub struct FixedConfidence(pub u8);

impl ConfidenceStrategy for FixedConfidence {
    fn confidence(&self, _reading: &Reading, _zone: &Zone, _threshold: f64) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ZoneRegistry;

    #[test]
    fn random_confidence_stays_in_range() {
        let strategy = RandomConfidence::default();
        let zone = ZoneRegistry::builtin().default_zone().clone();
        let reading = Reading::new(500.0);

        let mut seen_low = false;
        let mut seen_high = false;
        for _ in 0..5_000 {
            let c = strategy.confidence(&reading, &zone, 392.0);
            assert!((80..=94).contains(&c), "confidence {} out of range", c);
            seen_low |= c == 80;
            seen_high |= c == 94;
        }
        assert!(seen_low && seen_high);
        assert_eq!(strategy.range(), 80..=94);
    }

    #[test]
    fn zero_span_is_treated_as_one() {
        let strategy = RandomConfidence::new(90, 0);
        let zone = ZoneRegistry::builtin().default_zone().clone();
        assert_eq!(strategy.confidence(&Reading::new(1.0), &zone, 0.0), 90);
    }
}
