// Source trait for backend telemetry access
use crate::domain::metric::MetricId;
use crate::domain::tank::TankCalibration;
use crate::domain::time_range::TimeRange;
use crate::error::TelemetryResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameters of one poll against the trends endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct TrendsQuery {
    pub device: String,
    pub metrics: Vec<MetricId>,
    pub range: TimeRange,
    /// Resolution override; derived from `range` when absent
    pub step: Option<String>,
}

impl TrendsQuery {
    pub fn step(&self) -> &str {
        self.step.as_deref().unwrap_or(self.range.default_step())
    }
}

/// Raw `[timestamp, value]` entries per metric, as returned by a poll.
/// Entries are validated when they are ingested, not here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendsResponse {
    pub series: BTreeMap<MetricId, Vec<Value>>,
}

/// One decoded Server-Sent Event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry_ms: Option<u64>,
}

pub type EventStream = BoxStream<'static, TelemetryResult<StreamEvent>>;

/// Service name to status string (`ok`, `error`, `unknown`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub services: BTreeMap<String, String>,
}

impl HealthReport {
    pub fn is_ok(&self, service: &str) -> bool {
        self.services.get(service).is_some_and(|s| s == "ok")
    }
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Historical window for a batch of metrics
    async fn fetch_trends(&self, query: &TrendsQuery) -> TelemetryResult<TrendsResponse>;

    /// Open the push channel. The returned stream ends when the server closes it.
    async fn open_stream(&self, device: &str) -> TelemetryResult<EventStream>;

    /// Status of the backend services
    async fn fetch_health(&self) -> TelemetryResult<HealthReport>;

    /// Calibration the backend uses for its own water-level readings
    async fn fetch_tank_settings(&self) -> TelemetryResult<TankCalibration>;

    /// Devices that have reported data, sorted and deduplicated
    async fn fetch_devices(&self) -> TelemetryResult<Vec<String>>;
}
