use crate::application::live_dashboard::DashboardOptions;
use crate::application::stream_manager::BackoffPolicy;
use crate::application::telemetry_client::ClientOptions;
use crate::domain::metric::{MetricId, ScalePolicy};
use crate::domain::scale::ScaleTable;
use crate::domain::tank::TankCalibration;
use crate::domain::time_range::TimeRange;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/plantomio";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub dashboard: DashboardSettings,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub scale: ScaleSettings,
    pub tank: Option<TankCalibration>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Read the tank calibration from `/api/tank-settings`; `[tank]` is the fallback
    #[serde(default = "default_true")]
    pub tank_settings: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardSettings {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricId>,
    #[serde(default)]
    pub range_minutes: TimeRange,
    pub step: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_fallback_poll_interval_secs")]
    pub fallback_poll_interval_secs: u64,
    /// 0 disables health polling
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowSettings {
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScaleSettings {
    #[serde(default = "default_padding")]
    pub padding: f64,
    #[serde(default)]
    pub overrides: HashMap<MetricId, ScaleOverride>,
}

/// Per-metric axis override. Both bounds pin the metric to a fixed range.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScaleOverride {
    pub y_min: Option<f64>,
    pub y_max: Option<f64>,
    pub padding: Option<f64>,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_device() -> String {
    "plt-404cca470da0".to_string()
}

fn default_metrics() -> Vec<MetricId> {
    MetricId::TRENDS.to_vec()
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_fallback_poll_interval_secs() -> u64 {
    10
}

fn default_health_interval_secs() -> u64 {
    30
}

fn default_max_points() -> usize {
    500
}

fn default_true() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_padding() -> f64 {
    MetricId::DEFAULT_PADDING
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            tank_settings: true,
        }
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            device: default_device(),
            metrics: default_metrics(),
            range_minutes: TimeRange::default(),
            step: None,
            poll_interval_secs: default_poll_interval_secs(),
            fallback_poll_interval_secs: default_fallback_poll_interval_secs(),
            health_interval_secs: default_health_interval_secs(),
        }
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            padding: default_padding(),
            overrides: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs.max(1))
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.stream.base_delay_ms.max(1)),
            cap: Duration::from_secs(self.stream.max_delay_secs.max(1)),
            max_attempts: self.stream.max_attempts,
        }
    }

    /// Built-in per-metric table with the global padding and per-metric overrides applied.
    /// A fixed range always wins over dynamic scaling.
    pub fn scale_table(&self) -> ScaleTable {
        MetricId::ALL.into_iter().fold(ScaleTable::default(), |table, metric| {
            let over = self.scale.overrides.get(&metric).cloned().unwrap_or_default();
            let policy = match (over.y_min, over.y_max, metric.scale_policy()) {
                (Some(min), Some(max), _) if max > min => ScalePolicy::Fixed { min, max },
                (_, _, fixed @ ScalePolicy::Fixed { .. }) => fixed,
                (_, _, ScalePolicy::Dynamic { fallback, non_negative, .. }) => ScalePolicy::Dynamic {
                    padding: over.padding.unwrap_or(self.scale.padding),
                    fallback,
                    non_negative,
                },
            };
            table.with_override(metric, policy)
        })
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            max_points: self.window.max_points,
            range: self.dashboard.range_minutes,
            scales: self.scale_table(),
            tank: self.tank.filter(TankCalibration::is_valid),
        }
    }

    pub fn dashboard_options(&self) -> DashboardOptions {
        let health = self.dashboard.health_interval_secs;
        DashboardOptions {
            device: self.dashboard.device.clone(),
            metrics: self.dashboard.metrics.clone(),
            step: self.dashboard.step.clone(),
            poll_interval: Duration::from_secs(self.dashboard.poll_interval_secs.max(1)),
            fallback_poll_interval: Duration::from_secs(
                self.dashboard.fallback_poll_interval_secs.max(1),
            ),
            poll_timeout: self.request_timeout(),
            health_interval: (health > 0).then(|| Duration::from_secs(health)),
            streaming: self.stream.enabled,
            backend_tank: self.backend.tank_settings,
            backoff: self.backoff_policy(),
        }
    }
}

/// Load `config/plantomio.toml` (or the path in `PLANTOMIO_CONFIG`), then apply
/// `PLANTOMIO__SECTION__KEY` environment overrides.
pub fn load_settings() -> anyhow::Result<Settings> {
    let path = std::env::var("PLANTOMIO_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_settings_from(&path)
}

pub fn load_settings_from(path: &str) -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("PLANTOMIO")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn parse_settings(toml: &str) -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings.backend.base_url, "http://localhost:5000");
        assert_eq!(settings.dashboard.metrics, MetricId::TRENDS.to_vec());
        assert_eq!(settings.dashboard.range_minutes, TimeRange::DAY);
        assert!(settings.tank.is_none());

        let options = settings.dashboard_options();
        assert_eq!(options.poll_timeout, Duration::from_secs(15));
        assert_eq!(options.backoff.cap, Duration::from_secs(30));
        assert_eq!(options.health_interval, Some(Duration::from_secs(30)));
        assert!(options.backend_tank);
    }

    #[test]
    fn test_full_config() {
        let settings = parse_settings(
            r#"
            [backend]
            base_url = "http://raspberrypi.local:5000"
            tank_settings = false

            [dashboard]
            device = "plt-b"
            metrics = ["pH", "EC", "distance"]
            range_minutes = 10080
            health_interval_secs = 0

            [stream]
            max_attempts = 3

            [scale]
            padding = 0.3

            [scale.overrides.EC]
            y_min = 0.0
            y_max = 4.0

            [tank]
            max_distance = 1.2
            min_distance = 0.2
            "#,
        )
        .unwrap();

        assert_eq!(settings.dashboard.metrics, vec![MetricId::Ph, MetricId::Ec, MetricId::Distance]);
        assert_eq!(settings.dashboard.range_minutes, TimeRange::WEEK);
        assert_eq!(settings.stream.max_attempts, 3);
        assert_eq!(settings.dashboard_options().health_interval, None);
        assert!(!settings.dashboard_options().backend_tank);

        let table = settings.scale_table();
        assert_eq!(table.policy(MetricId::Ec), ScalePolicy::Fixed { min: 0.0, max: 4.0 });
        assert_eq!(table.policy(MetricId::Ph), ScalePolicy::Fixed { min: 0.0, max: 14.0 });
        assert!(matches!(
            table.policy(MetricId::Tds),
            ScalePolicy::Dynamic { padding, .. } if (padding - 0.3).abs() < 1e-9
        ));

        let tank = settings.client_options().tank.unwrap();
        assert_eq!(tank.max_distance, 1.2);
        assert_eq!(tank.alert_level, 10.0);
    }

    #[test]
    fn test_invalid_tank_is_ignored() {
        let settings = parse_settings(
            r#"
            [tank]
            max_distance = 0.1
            min_distance = 0.5
            "#,
        )
        .unwrap();
        assert!(settings.client_options().tank.is_none());
    }
}
