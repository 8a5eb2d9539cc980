//! Safety rules and thresholds for hazard avoidance.

use crate::models::{Hazard, Intensity};
use crate::spatial::Rect;
use serde::{Deserialize, Serialize};

/// Configuration for hazard margins and detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyRules {
    /// Avoidance margin around low intensity hazards (km)
    pub low_margin_km: f64,
    /// Avoidance margin around medium intensity hazards (km)
    pub medium_margin_km: f64,
    /// Avoidance margin around high intensity hazards (km)
    pub high_margin_km: f64,
    /// Distance at which a hazard is reported as "in proximity" of the drone (km)
    pub detection_range_km: f64,
}

impl Default for SafetyRules {
    fn default() -> Self {
        Self {
            low_margin_km: 0.5,
            medium_margin_km: 1.0,
            high_margin_km: 1.5,
            detection_range_km: 1.0,
        }
    }
}

impl SafetyRules {
    pub fn margin_for(&self, intensity: Intensity) -> f64 {
        match intensity {
            Intensity::Low => self.low_margin_km,
            Intensity::Medium => self.medium_margin_km,
            Intensity::High => self.high_margin_km,
        }
        .max(0.0)
    }

    /// Hazard footprint grown by its intensity margin.
    pub fn danger_zone(&self, hazard: &Hazard) -> Rect {
        hazard.footprint().expand(self.margin_for(hazard.intensity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HazardKind;
    use crate::spatial::Point;

    #[test]
    fn higher_intensity_gets_wider_zone() {
        let rules = SafetyRules::default();
        let mut hazard = Hazard::new("cell", Point::new(0.0, 0.0), 2.0, 2.0, HazardKind::Storm, Intensity::Low);
        let low = rules.danger_zone(&hazard);
        hazard.intensity = Intensity::High;
        let high = rules.danger_zone(&hazard);

        assert!(high.width() > low.width());
        assert!((low.width() - 3.0).abs() < 1e-12);
        assert!((high.width() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn partial_rules_deserialize_with_defaults() {
        let rules: SafetyRules = serde_json::from_str(r#"{"high_margin_km": 3.0}"#).unwrap();
        assert_eq!(rules.high_margin_km, 3.0);
        assert_eq!(rules.low_margin_km, SafetyRules::default().low_margin_km);
    }
}
