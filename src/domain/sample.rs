// Sample domain model and raw point normalization
use super::metric::MetricId;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub metric: MetricId,
    /// Unix seconds
    pub timestamp: i64,
    /// `None` marks a missing or invalid reading and renders as a gap.
    pub value: Option<f64>,
}

/// Why a raw entry was skipped during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NotAPair,
    BadTimestamp,
    BadValue,
}

impl Sample {
    pub fn new(metric: MetricId, timestamp: i64, value: Option<f64>) -> Self {
        Self {
            metric,
            timestamp,
            value: value.filter(|v| v.is_finite()),
        }
    }

    /// Parse a `[timestamp, value]` pair as served by the trends endpoint.
    pub fn from_raw(metric: MetricId, raw: &Value) -> Result<Self, RejectReason> {
        let pair = match raw.as_array() {
            Some(items) if items.len() == 2 => items,
            _ => return Err(RejectReason::NotAPair),
        };

        let timestamp = parse_timestamp(&pair[0]).ok_or(RejectReason::BadTimestamp)?;
        let value = normalize_value(&pair[1])?;

        Ok(Self::new(metric, timestamp, value))
    }
}

/// Timestamps arrive as integers, floats (VictoriaMetrics) or numeric strings.
pub fn parse_timestamp(raw: &Value) -> Option<i64> {
    let seconds = match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_seconds))?,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_seconds))?
        }
        _ => return None,
    };
    Some(seconds)
}

/// `None` for non-finite values and anything an `i64` cannot hold; `as` would saturate.
fn float_seconds(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    let seconds = f.trunc();
    (seconds.is_finite() && seconds >= i64::MIN as f64 && seconds < i64::MAX as f64)
        .then_some(seconds as i64)
}

/// Normalize a reading: NaN in any spelling, null and unparseable text become `None`.
pub fn normalize_value(raw: &Value) -> Result<Option<f64>, RejectReason> {
    match raw {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64().filter(|v| v.is_finite())),
        Value::String(s) => Ok(s.trim().parse::<f64>().ok().filter(|v| v.is_finite())),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => Err(RejectReason::BadValue),
    }
}
