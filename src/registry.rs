use std::collections::HashSet;

use crate::error::EngineError;
use crate::types::{Zone, ZoneCategory};

/// Read-only, ordered set of monitored zones.
///
/// The first zone is the default active zone at startup.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    pub fn new(zones: Vec<Zone>) -> Result<Self, EngineError> {
        if zones.is_empty() {
            return Err(EngineError::invalid("zone list is empty"));
        }

        let mut seen = HashSet::with_capacity(zones.len());
        for zone in &zones {
            if zone.id.trim().is_empty() {
                return Err(EngineError::invalid("zone id must not be empty"));
            }
            if !seen.insert(zone.id.as_str()) {
                return Err(EngineError::invalid(format!("duplicate zone id '{}'", zone.id)));
            }
            if !(zone.baseline.is_finite() && zone.baseline > 0.0) {
                return Err(EngineError::invalid(format!(
                    "zone '{}' has non-positive baseline {}",
                    zone.id, zone.baseline
                )));
            }
        }

        Ok(Self { zones })
    }

    /// The reference wards used when no zones are configured explicitly
    pub fn builtin() -> Self {
        Self { zones: builtin_zones() }
    }

    pub fn get(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn default_zone(&self) -> &Zone {
        // Non-empty by construction
        &self.zones[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

pub(crate) fn builtin_zones() -> Vec<Zone> {
    vec![
        Zone {
            id: "W-101".into(),
            name: "Rohini Sector 9".into(),
            category: ZoneCategory::TrafficCorridor,
            baseline: 280.0,
            dominant_source: "Traffic".into(),
            authority: "Traffic Police".into(),
            recommended_action: "Signal diversion + enforcement".into(),
        },
        Zone {
            id: "W-102".into(),
            name: "Okhla Ind. Area".into(),
            category: ZoneCategory::IndustrialZone,
            baseline: 220.0,
            dominant_source: "Industry".into(),
            authority: "PCB Enforcement Squad".into(),
            recommended_action: "Check scrubber units".into(),
        },
        Zone {
            id: "W-103".into(),
            name: "Dwarka Residential".into(),
            category: ZoneCategory::Residential,
            baseline: 180.0,
            dominant_source: "Biomass/Waste".into(),
            authority: "Municipal Corporation".into(),
            recommended_action: "Dispatch waste collection".into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: &str, baseline: f64) -> Zone {
        Zone {
            id: id.into(),
            name: format!("Zone {}", id),
            category: ZoneCategory::Residential,
            baseline,
            dominant_source: "Traffic".into(),
            authority: "Traffic Police".into(),
            recommended_action: "Divert".into(),
        }
    }

    #[test]
    fn first_zone_is_default() {
        let reg = ZoneRegistry::new(vec![zone("A", 100.0), zone("B", 200.0)]).unwrap();
        assert_eq!(reg.default_zone().id, "A");
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("B").map(|z| z.baseline), Some(200.0));
        assert!(reg.get("C").is_none());
    }

    #[test]
    fn rejects_empty_list() {
        let err = ZoneRegistry::new(vec![]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_non_positive_baseline() {
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = ZoneRegistry::new(vec![zone("A", bad)]).unwrap_err();
            assert!(matches!(err, EngineError::InvalidConfiguration(_)), "baseline {}", bad);
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = ZoneRegistry::new(vec![zone("A", 1.0), zone("A", 2.0)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn builtin_wards_are_valid() {
        let reg = ZoneRegistry::new(builtin_zones()).unwrap();
        assert_eq!(reg.len(), 3);
        let rohini = reg.default_zone();
        assert_eq!(rohini.id, "W-101");
        assert_eq!(rohini.baseline, 280.0);
        assert_eq!(rohini.dominant_source, "Traffic");
    }
}
