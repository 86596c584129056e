// Tank calibration - converts ultrasonic distance readings to fill level
use serde::Deserialize;

/// Distance-to-level calibration for the reservoir.
///
/// The sensor sits above the water: `max_distance` is measured when the tank is
/// empty (0%), `min_distance` when it is full (100%).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TankCalibration {
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,
    /// Fill percentage below which the level is reported as low
    #[serde(default = "default_alert_level")]
    pub alert_level: f64,
}

fn default_max_distance() -> f64 {
    3.0
}

fn default_min_distance() -> f64 {
    0.3
}

fn default_alert_level() -> f64 {
    10.0
}

impl Default for TankCalibration {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            min_distance: default_min_distance(),
            alert_level: default_alert_level(),
        }
    }
}

impl TankCalibration {
    pub fn is_valid(&self) -> bool {
        self.max_distance > 0.0
            && self.min_distance >= 0.0
            && self.max_distance > self.min_distance
            && (0.0..=100.0).contains(&self.alert_level)
    }

    /// Fill percentage in `[0, 100]`, rounded to one decimal place.
    /// Returns `None` when the calibration cannot produce a level.
    pub fn water_level(&self, distance: f64) -> Option<f64> {
        if !distance.is_finite() || !self.is_valid() {
            return None;
        }
        let range = self.max_distance - self.min_distance;
        let clamped = distance.clamp(self.min_distance, self.max_distance);
        let level = (self.max_distance - clamped) / range * 100.0;
        Some((level * 10.0).round() / 10.0)
    }

    pub fn is_low(&self, level: f64) -> bool {
        level < self.alert_level
    }
}
