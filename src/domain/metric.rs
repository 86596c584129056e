// Metric catalogue - the fixed set of Plantomio sensor channels
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricId {
    Temperature,
    Ph,
    Ec,
    Tds,
    Distance,
    WaterLevel,
    Orp,
}

/// How the value axis of a metric is scaled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalePolicy {
    /// Static bounds, data is ignored.
    Fixed { min: f64, max: f64 },
    /// Bounds follow the visible data.
    Dynamic {
        padding: f64,
        fallback: (f64, f64),
        non_negative: bool,
    },
}

impl MetricId {
    pub const ALL: [MetricId; 7] = [
        MetricId::Temperature,
        MetricId::Ph,
        MetricId::Ec,
        MetricId::Tds,
        MetricId::Distance,
        MetricId::WaterLevel,
        MetricId::Orp,
    ];

    /// Metrics served by the trends endpoint. Water level is derived, not stored.
    pub const TRENDS: [MetricId; 6] = [
        MetricId::Temperature,
        MetricId::Ph,
        MetricId::Tds,
        MetricId::Ec,
        MetricId::Distance,
        MetricId::Orp,
    ];

    pub const DEFAULT_PADDING: f64 = 0.1;

    /// Name used by the backend in query strings and JSON keys
    pub fn wire_name(self) -> &'static str {
        match self {
            MetricId::Temperature => "temperature",
            MetricId::Ph => "pH",
            MetricId::Ec => "EC",
            MetricId::Tds => "TDS",
            MetricId::Distance => "distance",
            MetricId::WaterLevel => "waterLevel",
            MetricId::Orp => "ORP",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            MetricId::Temperature => "°C",
            MetricId::Ph => "pH",
            MetricId::Ec => "mS/cm",
            MetricId::Tds => "ppm",
            MetricId::Distance => "m",
            MetricId::WaterLevel => "%",
            MetricId::Orp => "mV",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricId::Temperature => "Temperature (°C)",
            MetricId::Ph => "pH Level",
            MetricId::Ec => "EC (mS/cm)",
            MetricId::Tds => "TDS (ppm)",
            MetricId::Distance => "Distance (m)",
            MetricId::WaterLevel => "Water Level (%)",
            MetricId::Orp => "ORP (mV)",
        }
    }

    /// Decimal places used when a reading is displayed
    pub fn precision(self) -> usize {
        match self {
            MetricId::Ec => 2,
            MetricId::Tds | MetricId::Orp => 0,
            _ => 1,
        }
    }

    /// Range a healthy tank is expected to stay in
    pub fn plausible_range(self) -> (f64, f64) {
        match self {
            MetricId::Temperature => (10.0, 30.0),
            MetricId::Ph => (6.0, 8.0),
            MetricId::Ec => (0.0, 2.0),
            MetricId::Tds => (0.0, 1000.0),
            MetricId::Distance => (0.0, 3.0),
            MetricId::WaterLevel => (0.0, 100.0),
            MetricId::Orp => (200.0, 800.0),
        }
    }

    pub fn scale_policy(self) -> ScalePolicy {
        let dynamic = |fallback: (f64, f64)| ScalePolicy::Dynamic {
            padding: Self::DEFAULT_PADDING,
            fallback,
            non_negative: true,
        };
        match self {
            MetricId::Ph => ScalePolicy::Fixed { min: 0.0, max: 14.0 },
            MetricId::WaterLevel => ScalePolicy::Fixed { min: 0.0, max: 100.0 },
            MetricId::Temperature => dynamic((0.0, 40.0)),
            MetricId::Ec => dynamic((0.0, 2.0)),
            MetricId::Tds => dynamic((0.0, 1000.0)),
            MetricId::Distance => dynamic((0.0, 3.0)),
            MetricId::Orp => dynamic((0.0, 800.0)),
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for MetricId {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "temperature" | "temp" => Ok(MetricId::Temperature),
            "ph" => Ok(MetricId::Ph),
            "ec" => Ok(MetricId::Ec),
            "tds" => Ok(MetricId::Tds),
            "distance" => Ok(MetricId::Distance),
            "waterlevel" => Ok(MetricId::WaterLevel),
            "orp" => Ok(MetricId::Orp),
            _ => Err(UnknownMetric(s.to_string())),
        }
    }
}

impl TryFrom<String> for MetricId {
    type Error = UnknownMetric;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricId> for String {
    fn from(metric: MetricId) -> Self {
        metric.wire_name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wire_names() {
        for metric in MetricId::ALL {
            assert_eq!(metric.wire_name().parse::<MetricId>(), Ok(metric));
        }
        assert_eq!("PH".parse::<MetricId>(), Ok(MetricId::Ph));
        assert_eq!("water_level".parse::<MetricId>(), Ok(MetricId::WaterLevel));
        assert!("humidity".parse::<MetricId>().is_err());
    }

    #[test]
    fn test_fixed_policies_are_explicit() {
        assert_eq!(
            MetricId::Ph.scale_policy(),
            ScalePolicy::Fixed { min: 0.0, max: 14.0 }
        );
        assert!(matches!(
            MetricId::Ec.scale_policy(),
            ScalePolicy::Dynamic { non_negative: true, .. }
        ));
    }

    #[test]
    fn test_serde_uses_wire_name() {
        let json = serde_json::to_string(&MetricId::Orp).unwrap();
        assert_eq!(json, "\"ORP\"");
        let parsed: MetricId = serde_json::from_str("\"tds\"").unwrap();
        assert_eq!(parsed, MetricId::Tds);
    }
}
