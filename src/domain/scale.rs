// Axis bounds recalculation from the visible window
use super::metric::{MetricId, ScalePolicy};
use super::window::MetricWindow;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleBounds {
    pub min: f64,
    pub max: f64,
}

impl ScaleBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Per-metric scale policies: the built-in table plus configured overrides.
#[derive(Debug, Clone, Default)]
pub struct ScaleTable {
    overrides: HashMap<MetricId, ScalePolicy>,
}

impl ScaleTable {
    pub fn with_override(mut self, metric: MetricId, policy: ScalePolicy) -> Self {
        self.overrides.insert(metric, policy);
        self
    }

    pub fn policy(&self, metric: MetricId) -> ScalePolicy {
        self.overrides
            .get(&metric)
            .copied()
            .unwrap_or_else(|| metric.scale_policy())
    }

    pub fn bounds(&self, metric: MetricId, window: &MetricWindow) -> ScaleBounds {
        compute_bounds_with(self.policy(metric), window)
    }
}

/// Bounds for `metric` using its built-in policy.
pub fn compute_bounds(metric: MetricId, window: &MetricWindow) -> ScaleBounds {
    compute_bounds_with(metric.scale_policy(), window)
}

pub fn compute_bounds_with(policy: ScalePolicy, window: &MetricWindow) -> ScaleBounds {
    match policy {
        ScalePolicy::Fixed { min, max } => ScaleBounds::new(min, max),
        ScalePolicy::Dynamic {
            padding,
            fallback,
            non_negative,
        } => dynamic_bounds(window.values(), padding, fallback, non_negative),
    }
}

fn dynamic_bounds(
    values: impl Iterator<Item = Option<f64>>,
    padding: f64,
    fallback: (f64, f64),
    non_negative: bool,
) -> ScaleBounds {
    let observed = values
        .flatten()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });

    let Some((lo, hi)) = observed else {
        return ScaleBounds::new(fallback.0, fallback.1);
    };

    let padding = if padding.is_finite() && padding >= 0.0 {
        padding
    } else {
        MetricId::DEFAULT_PADDING
    };

    let (mut min, mut max) = if hi > lo {
        let pad = (hi - lo) * padding;
        (lo - pad, hi + pad)
    } else {
        // Single distinct value: spread proportionally around it.
        let mut spread = lo.abs() * padding.max(MetricId::DEFAULT_PADDING);
        if spread <= f64::EPSILON {
            spread = 1.0;
        }
        (lo - spread, lo + spread)
    };

    // Padding near the edge of the f64 range overflows; keep the raw extremes instead.
    if !min.is_finite() {
        min = lo;
    }
    if !max.is_finite() {
        max = hi;
    }
    if non_negative && min < 0.0 {
        min = 0.0;
    }
    if max <= min {
        let spread = 1.0_f64.max(min.abs() * 1e-6);
        if (min + spread).is_finite() {
            max = min + spread;
        } else {
            min -= spread;
        }
    }

    ScaleBounds::new(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of(values: &[Option<f64>]) -> MetricWindow {
        let mut window = MetricWindow::new(100, None);
        for (i, v) in values.iter().enumerate() {
            window.upsert(i as i64, *v);
        }
        window
    }

    #[test]
    fn test_ph_is_always_fixed() {
        for values in [vec![], vec![Some(3.0)], vec![Some(-5.0), Some(40.0), None]] {
            let bounds = compute_bounds(MetricId::Ph, &window_of(&values));
            assert_eq!(bounds, ScaleBounds::new(0.0, 14.0));
        }
    }

    #[test]
    fn test_ec_padding_and_clamp() {
        let bounds = compute_bounds(MetricId::Ec, &window_of(&[Some(1.0), Some(2.0), Some(3.0)]));
        assert!(bounds.min <= 1.0);
        assert!(bounds.max >= 3.0);
        assert!(bounds.min >= 0.0);
        assert!((bounds.min - 0.8).abs() < 1e-9);
        assert!((bounds.max - 3.2).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_uses_fallback() {
        for metric in MetricId::ALL {
            let bounds = compute_bounds(metric, &window_of(&[]));
            assert!(bounds.min.is_finite() && bounds.max.is_finite());
            assert!(bounds.max > bounds.min);
        }
        let bounds = compute_bounds(MetricId::Tds, &window_of(&[None, None]));
        assert_eq!(bounds, ScaleBounds::new(0.0, 1000.0));
    }

    #[test]
    fn test_collapsed_range_is_not_zero_width() {
        let bounds = compute_bounds(MetricId::Temperature, &window_of(&[Some(24.0), Some(24.0)]));
        assert!(bounds.span() > 0.0);
        assert!(bounds.min < 24.0 && bounds.max > 24.0);

        let zero = compute_bounds(MetricId::Orp, &window_of(&[Some(0.0)]));
        assert_eq!(zero, ScaleBounds::new(0.0, 1.0));
    }

    #[test]
    fn test_table_override_wins() {
        let table = ScaleTable::default()
            .with_override(MetricId::Ec, ScalePolicy::Fixed { min: 0.0, max: 5.0 });
        let window = window_of(&[Some(9.0)]);
        assert_eq!(table.bounds(MetricId::Ec, &window), ScaleBounds::new(0.0, 5.0));
        assert_eq!(table.bounds(MetricId::Ph, &window), ScaleBounds::new(0.0, 14.0));
    }

    #[test]
    fn test_extreme_readings_keep_a_finite_axis() {
        let cases = [
            vec![Some(0.0), Some(f64::MAX)],
            vec![Some(f64::MAX)],
            vec![Some(-f64::MAX), Some(f64::MAX)],
            vec![Some(-f64::MAX)],
        ];
        for values in cases {
            for metric in [MetricId::Tds, MetricId::Temperature] {
                let bounds = compute_bounds(metric, &window_of(&values));
                assert!(bounds.min.is_finite() && bounds.max.is_finite(), "{values:?}: {bounds:?}");
                assert!(bounds.max > bounds.min, "{values:?}: {bounds:?}");
            }
        }

        let bounds = compute_bounds(MetricId::Tds, &window_of(&[Some(0.0), Some(f64::MAX)]));
        assert_eq!(bounds, ScaleBounds::new(0.0, f64::MAX));
    }

    #[test]
    fn test_low_values_clamped_to_zero() {
        let bounds = compute_bounds(MetricId::Distance, &window_of(&[Some(0.05), Some(2.0)]));
        assert_eq!(bounds.min, 0.0);
    }
}
