// Telemetry client - owns the per-metric windows and reconciles poll and stream data
use crate::application::renderer::Renderer;
use crate::domain::chart::ChartFrame;
use crate::domain::metric::MetricId;
use crate::domain::sample::Sample;
use crate::domain::scale::{ScaleBounds, ScaleTable};
use crate::domain::tank::TankCalibration;
use crate::domain::time_range::TimeRange;
use crate::domain::window::{MetricWindow, VisibleSeries};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub max_points: usize,
    pub range: TimeRange,
    pub scales: ScaleTable,
    /// When set, distance readings also produce water-level samples.
    pub tank: Option<TankCalibration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_points: 500,
            range: TimeRange::default(),
            scales: ScaleTable::default(),
            tank: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub skipped: usize,
}

/// Single source of truth for what the dashboard currently shows.
///
/// Both the poll path and the stream path feed [`TelemetryClient::ingest_batch`].
/// Merging is an upsert keyed by timestamp, so the result does not depend on the
/// order in which overlapping batches arrive, only on which write came last.
#[derive(Debug)]
pub struct TelemetryClient {
    windows: BTreeMap<MetricId, MetricWindow>,
    dirty: BTreeSet<MetricId>,
    options: ClientOptions,
    device: Option<String>,
    generation: u64,
}

impl TelemetryClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            windows: BTreeMap::new(),
            dirty: BTreeSet::new(),
            options,
            device: None,
            generation: 0,
        }
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn range(&self) -> TimeRange {
        self.options.range
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a result tagged with `generation` still belongs to the current view
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn is_dirty(&self, metric: MetricId) -> bool {
        self.dirty.contains(&metric)
    }

    /// Merge raw `[timestamp, value]` entries into the metric's window.
    ///
    /// Malformed entries are skipped individually; the rest of the batch is kept.
    pub fn ingest_batch(&mut self, metric: MetricId, batch: &[Value]) -> IngestReport {
        let mut report = IngestReport::default();
        let mut samples = Vec::with_capacity(batch.len());

        for raw in batch {
            match Sample::from_raw(metric, raw) {
                Ok(sample) => samples.push(sample),
                Err(reason) => {
                    report.skipped += 1;
                    tracing::debug!(%metric, ?reason, entry = %raw, "Skipping malformed sample");
                }
            }
        }

        report.accepted = samples.len();
        self.ingest_samples(metric, &samples);
        report
    }

    /// Merge already-validated samples. Samples for other metrics are ignored.
    pub fn ingest_samples(&mut self, metric: MetricId, samples: &[Sample]) {
        let window = self.window_mut(metric);
        for sample in samples.iter().filter(|s| s.metric == metric) {
            window.upsert(sample.timestamp, sample.value);
        }
        window.truncate();
        self.dirty.insert(metric);

        if metric == MetricId::Distance {
            self.derive_water_level(samples);
        }
    }

    fn derive_water_level(&mut self, distances: &[Sample]) {
        let Some(tank) = self.options.tank else {
            return;
        };
        let window = self.window_mut(MetricId::WaterLevel);
        for sample in distances.iter().filter(|s| s.metric == MetricId::Distance) {
            let level = sample.value.and_then(|d| tank.water_level(d));
            window.upsert(sample.timestamp, level);
        }
        window.truncate();
        self.dirty.insert(MetricId::WaterLevel);
    }

    pub fn tank(&self) -> Option<TankCalibration> {
        self.options.tank
    }

    /// Adopt the backend's calibration. The water-level window is rebuilt from the
    /// distance window so a chart never mixes levels from two calibrations.
    pub fn set_tank(&mut self, tank: TankCalibration) {
        if self.options.tank == Some(tank) {
            return;
        }
        self.options.tank = Some(tank);

        let distances: Vec<Sample> = match self.windows.get(&MetricId::Distance) {
            Some(window) => {
                let series = window.snapshot();
                series
                    .labels
                    .into_iter()
                    .zip(series.values)
                    .map(|(ts, value)| Sample::new(MetricId::Distance, ts, value))
                    .collect()
            }
            None => return,
        };
        if distances.is_empty() {
            return;
        }

        self.window_mut(MetricId::WaterLevel).clear();
        self.derive_water_level(&distances);
    }

    /// Snapshot of the metric's window; recomputed on every call.
    pub fn get_visible(&self, metric: MetricId) -> VisibleSeries {
        self.windows
            .get(&metric)
            .map(MetricWindow::snapshot)
            .unwrap_or_default()
    }

    pub fn bounds(&self, metric: MetricId) -> ScaleBounds {
        match self.windows.get(&metric) {
            Some(window) => self.options.scales.bounds(metric, window),
            None => self
                .options
                .scales
                .bounds(metric, &MetricWindow::new(1, None)),
        }
    }

    pub fn frame(&self, metric: MetricId) -> ChartFrame {
        ChartFrame::from_series(self.get_visible(metric), self.bounds(metric))
    }

    /// Clear the metric's window. It is marked dirty so the chart is redrawn empty.
    pub fn reset(&mut self, metric: MetricId) {
        if let Some(window) = self.windows.get_mut(&metric) {
            window.clear();
        }
        self.dirty.insert(metric);
    }

    pub fn reset_all(&mut self) {
        let metrics: Vec<MetricId> = self.windows.keys().copied().collect();
        for metric in metrics {
            self.reset(metric);
        }
    }

    /// An empty poll result still has to reach the renderer as "no data".
    pub fn mark_no_data(&mut self, metric: MetricId) {
        self.dirty.insert(metric);
    }

    /// Point the client at another device. Returns the new generation; results
    /// tagged with an older one must be discarded.
    pub fn switch_device(&mut self, device: &str) -> u64 {
        self.device = Some(device.to_string());
        self.reset_all();
        self.generation += 1;
        self.generation
    }

    /// Change the history range. Windows are emptied and refilled by the next poll.
    pub fn set_range(&mut self, range: TimeRange) -> u64 {
        self.options.range = range;
        for window in self.windows.values_mut() {
            window.set_max_age(Some(range.as_secs()));
        }
        self.reset_all();
        self.generation += 1;
        self.generation
    }

    /// Hand every dirty metric to the renderer. Returns how many were rendered.
    pub fn flush(&mut self, renderer: &mut dyn Renderer) -> usize {
        let dirty = std::mem::take(&mut self.dirty);
        for metric in &dirty {
            renderer.render(*metric, &self.frame(*metric));
        }
        dirty.len()
    }

    fn window_mut(&mut self, metric: MetricId) -> &mut MetricWindow {
        let max_points = self.options.max_points;
        let max_age = Some(self.options.range.as_secs());
        self.windows
            .entry(metric)
            .or_insert_with(|| MetricWindow::new(max_points, max_age))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(max_points: usize) -> TelemetryClient {
        TelemetryClient::new(ClientOptions {
            max_points,
            ..ClientOptions::default()
        })
    }

    #[derive(Default)]
    struct Recorder {
        frames: Vec<(MetricId, ChartFrame)>,
    }

    impl Renderer for Recorder {
        fn render(&mut self, metric: MetricId, frame: &ChartFrame) {
            self.frames.push((metric, frame.clone()));
        }
    }

    #[test]
    fn test_any_order_yields_strictly_increasing_timestamps() {
        let mut client = client(100);
        client.ingest_batch(MetricId::Ec, &[json!([5, 1.5]), json!([2, 1.2]), json!([9, 1.9])]);
        client.ingest_batch(MetricId::Ec, &[json!([2, 1.2]), json!([7, 1.7]), json!([1, 1.1])]);

        let visible = client.get_visible(MetricId::Ec);
        assert_eq!(visible.labels, vec![1, 2, 5, 7, 9]);
        assert!(visible.labels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_duplicate_ingest_leaves_length_unchanged() {
        let mut client = client(100);
        let batch = [json!([10, 6.5]), json!([11, 6.6])];
        client.ingest_batch(MetricId::Ph, &batch);
        client.ingest_batch(MetricId::Ph, &batch);
        assert_eq!(client.get_visible(MetricId::Ph).len(), 2);
    }

    #[test]
    fn test_last_write_wins() {
        let mut client = client(100);
        client.ingest_batch(MetricId::Temperature, &[json!([100, 21.0])]);
        client.ingest_batch(MetricId::Temperature, &[json!([100, 22.5])]);
        let visible = client.get_visible(MetricId::Temperature);
        assert_eq!(visible.labels, vec![100]);
        assert_eq!(visible.values, vec![Some(22.5)]);
    }

    #[test]
    fn test_capacity_five_keeps_last_five() {
        let mut client = client(5);
        let batch: Vec<Value> = (1..=7).map(|ts| json!([ts, ts as f64])).collect();
        client.ingest_batch(MetricId::Tds, &batch);
        assert_eq!(client.get_visible(MetricId::Tds).labels, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_nan_is_a_gap_not_zero() {
        let mut client = client(100);
        client.ingest_batch(MetricId::Orp, &[json!([10, "nan"]), json!([11, 5.0])]);
        assert_eq!(client.get_visible(MetricId::Orp).values, vec![None, Some(5.0)]);
    }

    #[test]
    fn test_malformed_entries_do_not_fail_batch() {
        let mut client = client(100);
        let report = client.ingest_batch(
            MetricId::Ec,
            &[json!([1, 1.0]), json!("garbage"), json!(["x", 2.0]), json!([3, {}]), json!([4, null])],
        );
        assert_eq!(report, IngestReport { accepted: 2, skipped: 3 });
        assert_eq!(client.get_visible(MetricId::Ec).labels, vec![1, 4]);
    }

    #[test]
    fn test_reset_and_switch_device() {
        let mut client = client(100);
        client.ingest_batch(MetricId::Ec, &[json!([1, 1.0])]);
        client.reset(MetricId::Ec);
        assert!(client.get_visible(MetricId::Ec).is_empty());

        client.ingest_batch(MetricId::Ph, &[json!([1, 7.0])]);
        let before = client.generation();
        let after = client.switch_device("plt-b");
        assert!(after > before);
        assert!(!client.is_current(before));
        assert_eq!(client.device(), Some("plt-b"));
        assert!(client.get_visible(MetricId::Ph).is_empty());

        // The cleared charts are redrawn empty before the next answer arrives.
        let mut recorder = Recorder::default();
        client.flush(&mut recorder);
        assert_eq!(
            recorder.frames,
            vec![(MetricId::Ph, ChartFrame::NoData), (MetricId::Ec, ChartFrame::NoData)]
        );
    }

    #[test]
    fn test_flush_renders_dirty_metrics_once() {
        let mut client = client(100);
        client.ingest_batch(MetricId::Ec, &[json!([1, 1.0]), json!([2, 3.0])]);
        client.mark_no_data(MetricId::Orp);

        let mut recorder = Recorder::default();
        assert_eq!(client.flush(&mut recorder), 2);
        assert_eq!(client.flush(&mut recorder), 0);

        let (metric, frame) = &recorder.frames[0];
        assert_eq!(*metric, MetricId::Ec);
        match frame {
            ChartFrame::Data { labels, bounds, .. } => {
                assert_eq!(labels, &vec![1, 2]);
                assert!(bounds.min <= 1.0 && bounds.max >= 3.0);
            }
            ChartFrame::NoData => panic!("expected data"),
        }
        assert_eq!(recorder.frames[1], (MetricId::Orp, ChartFrame::NoData));
    }

    #[test]
    fn test_distance_derives_water_level() {
        let mut client = TelemetryClient::new(ClientOptions {
            tank: Some(TankCalibration::default()),
            ..ClientOptions::default()
        });
        client.ingest_batch(MetricId::Distance, &[json!([1, 3.0]), json!([2, 0.3]), json!([3, "NaN"])]);
        let level = client.get_visible(MetricId::WaterLevel);
        assert_eq!(level.labels, vec![1, 2, 3]);
        assert_eq!(level.values, vec![Some(0.0), Some(100.0), None]);
        assert!(client.is_dirty(MetricId::WaterLevel));
    }

    #[test]
    fn test_set_tank_rebuilds_water_level() {
        let mut client = TelemetryClient::new(ClientOptions {
            tank: Some(TankCalibration::default()),
            ..ClientOptions::default()
        });
        client.ingest_batch(MetricId::Distance, &[json!([1, 1.0]), json!([2, 2.0])]);
        client.ingest_batch(MetricId::WaterLevel, &[json!([3, 42.0])]);

        let backend = TankCalibration {
            max_distance: 2.0,
            min_distance: 0.0,
            alert_level: 20.0,
        };
        client.set_tank(backend);
        assert_eq!(client.tank(), Some(backend));

        let level = client.get_visible(MetricId::WaterLevel);
        assert_eq!(level.labels, vec![1, 2]);
        assert_eq!(level.values, vec![Some(50.0), Some(0.0)]);

        client.ingest_batch(MetricId::Distance, &[json!([4, 0.5])]);
        assert_eq!(client.get_visible(MetricId::WaterLevel).values.last(), Some(&Some(75.0)));
    }

    #[test]
    fn test_set_tank_without_distance_keeps_levels() {
        let mut client = client(100);
        client.ingest_batch(MetricId::WaterLevel, &[json!([3, 42.0])]);
        client.set_tank(TankCalibration::default());
        assert_eq!(client.get_visible(MetricId::WaterLevel).values, vec![Some(42.0)]);
    }

    #[test]
    fn test_range_bounds_window_age() {
        let mut client = TelemetryClient::new(ClientOptions {
            range: TimeRange::from_minutes(1),
            ..ClientOptions::default()
        });
        client.ingest_batch(MetricId::Ec, &[json!([0, 1.0]), json!([90, 1.0]), json!([120, 1.0])]);
        assert_eq!(client.get_visible(MetricId::Ec).labels, vec![90, 120]);
    }
}
