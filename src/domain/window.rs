// Rolling per-metric sample window
use std::collections::BTreeMap;

/// Ordered samples for one metric, keyed by timestamp.
///
/// Bounded by `capacity` (newest points win) and optionally by `max_age_secs`,
/// measured back from the newest timestamp held.
#[derive(Debug, Clone)]
pub struct MetricWindow {
    points: BTreeMap<i64, Option<f64>>,
    capacity: usize,
    max_age_secs: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibleSeries {
    /// Unix-second timestamps, strictly increasing
    pub labels: Vec<i64>,
    pub values: Vec<Option<f64>>,
}

impl VisibleSeries {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

impl MetricWindow {
    pub fn new(capacity: usize, max_age_secs: Option<i64>) -> Self {
        Self {
            points: BTreeMap::new(),
            capacity: capacity.max(1),
            max_age_secs,
        }
    }

    /// Insert or replace the reading at `timestamp` (last write wins).
    pub fn upsert(&mut self, timestamp: i64, value: Option<f64>) {
        self.points.insert(timestamp, value);
    }

    /// Drop the oldest points until both bounds hold.
    pub fn truncate(&mut self) {
        if let (Some(max_age), Some(newest)) = (self.max_age_secs, self.newest_timestamp()) {
            let cutoff = newest.saturating_sub(max_age);
            self.points = self.points.split_off(&cutoff);
        }
        while self.points.len() > self.capacity {
            self.points.pop_first();
        }
    }

    pub fn set_max_age(&mut self, max_age_secs: Option<i64>) {
        self.max_age_secs = max_age_secs;
        self.truncate();
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn newest_timestamp(&self) -> Option<i64> {
        self.points.last_key_value().map(|(ts, _)| *ts)
    }

    pub fn get(&self, timestamp: i64) -> Option<Option<f64>> {
        self.points.get(&timestamp).copied()
    }

    /// Readings in timestamp order, gaps included
    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.points.values().copied()
    }

    pub fn snapshot(&self) -> VisibleSeries {
        let (labels, values) = self.points.iter().map(|(ts, v)| (*ts, *v)).unzip();
        VisibleSeries { labels, values }
    }
}
