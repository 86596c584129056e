// Render callback consumed by the dashboard
use crate::application::stream_manager::{ConnectionState, DataSourceMode};
use crate::application::telemetry_source::HealthReport;
use crate::domain::chart::ChartFrame;
use crate::domain::metric::MetricId;
use crate::domain::tank::TankCalibration;

pub trait Renderer: Send {
    /// Called once per dirty metric after each scheduler turn
    fn render(&mut self, metric: MetricId, frame: &ChartFrame);

    fn connection_changed(&mut self, _state: &ConnectionState, _mode: DataSourceMode) {}

    fn health_changed(&mut self, _report: &HealthReport) {}

    fn tank_changed(&mut self, _tank: &TankCalibration) {}

    /// Choices for the device picker
    fn devices_changed(&mut self, _devices: &[String]) {}
}
