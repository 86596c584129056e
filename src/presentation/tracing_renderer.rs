// Renderer that writes chart updates to the log
use crate::application::renderer::Renderer;
use crate::application::stream_manager::{ConnectionState, DataSourceMode};
use crate::application::telemetry_source::HealthReport;
use crate::domain::chart::ChartFrame;
use crate::domain::metric::MetricId;
use crate::domain::tank::TankCalibration;
use chrono::{DateTime, Local, TimeZone};

/// Headless stand-in for the chart widgets: one log line per redrawn chart.
#[derive(Debug, Default)]
pub struct TracingRenderer {
    tank: Option<TankCalibration>,
    frames: u64,
}

impl TracingRenderer {
    pub fn new(tank: Option<TankCalibration>) -> Self {
        Self { tank, frames: 0 }
    }

    /// Number of frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Axis label for a unix-seconds timestamp, e.g. `05-01 10:00`.
pub fn format_label<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match DateTime::from_timestamp(timestamp, 0) {
        Some(utc) => utc.with_timezone(tz).format("%m-%d %H:%M").to_string(),
        None => timestamp.to_string(),
    }
}

fn format_value(metric: MetricId, value: f64) -> String {
    let precision = metric.precision();
    format!("{value:.precision$} {}", metric.unit())
}

impl Renderer for TracingRenderer {
    fn render(&mut self, metric: MetricId, frame: &ChartFrame) {
        self.frames += 1;

        let ChartFrame::Data { labels, values, bounds } = frame else {
            tracing::info!(%metric, "No data for selected range");
            return;
        };

        let (Some(first), Some(last)) = (labels.first(), labels.last()) else {
            return;
        };
        let latest = frame.latest_value();

        tracing::info!(
            %metric,
            points = values.len(),
            from = %format_label(*first, &Local),
            to = %format_label(*last, &Local),
            y_min = bounds.min,
            y_max = bounds.max,
            latest = %latest.map(|v| format_value(metric, v)).unwrap_or_else(|| "-".into()),
            "{}", metric.label()
        );

        if metric != MetricId::WaterLevel {
            return;
        }
        if let (Some(tank), Some(level)) = (self.tank, latest) {
            if tank.is_low(level) {
                tracing::warn!(level, alert_level = tank.alert_level, "Water level is low");
            }
        }
    }

    fn connection_changed(&mut self, state: &ConnectionState, mode: DataSourceMode) {
        match (state, mode) {
            (_, DataSourceMode::PollingOnly) => {
                tracing::warn!("Live stream unavailable, showing polled data only")
            }
            (ConnectionState::Connected, _) => tracing::info!("Live stream connected"),
            (ConnectionState::Backoff { attempt, delay }, _) => {
                tracing::info!(attempt, retry_in = ?delay, "Live stream reconnecting")
            }
            (state, _) => tracing::debug!(?state, "Live stream state"),
        }
    }

    fn tank_changed(&mut self, tank: &TankCalibration) {
        tracing::debug!(alert_level = tank.alert_level, "Tank calibration updated");
        self.tank = Some(*tank);
    }

    fn devices_changed(&mut self, devices: &[String]) {
        tracing::info!(count = devices.len(), devices = ?devices, "Available devices");
    }

    fn health_changed(&mut self, report: &HealthReport) {
        for (service, status) in &report.services {
            if status == "ok" {
                tracing::debug!(%service, "Service healthy");
            } else {
                tracing::warn!(%service, %status, "Service unhealthy");
            }
        }
    }
}
