// HTTP telemetry source - polls /api/trends and subscribes to /api/events
use crate::application::telemetry_source::{
    EventStream, HealthReport, TelemetrySource, TrendsQuery, TrendsResponse,
};
use crate::error::{TelemetryError, TelemetryResult};
use crate::infrastructure::event_stream::decode_event_stream;
use crate::domain::tank::TankCalibration;
use crate::infrastructure::payload::{parse_devices, parse_health, parse_tank_settings, parse_trends};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpTelemetrySource {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTelemetrySource {
    pub fn new(base_url: &str, request_timeout: Duration) -> TelemetryResult<Self> {
        // No overall client timeout: it would also cut the long-lived event stream.
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            request_timeout,
        })
    }

    pub fn trends_url(&self, query: &TrendsQuery) -> String {
        let metrics = query
            .metrics
            .iter()
            .map(|m| m.wire_name())
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{}/api/trends?metrics={}&device={}&minutes={}&step={}",
            self.base_url,
            urlencoding::encode(&metrics),
            urlencoding::encode(&query.device),
            query.range.minutes(),
            urlencoding::encode(query.step()),
        )
    }

    pub fn events_url(&self, device: &str) -> String {
        format!(
            "{}/api/events?device={}",
            self.base_url,
            urlencoding::encode(device)
        )
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    pub fn tank_settings_url(&self) -> String {
        format!("{}/api/tank-settings", self.base_url)
    }

    pub fn devices_url(&self) -> String {
        format!("{}/api/devices", self.base_url)
    }

    async fn get_json(&self, url: &str) -> TelemetryResult<Value> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TelemetryError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                %url,
                body_preview = %text.chars().take(200).collect::<String>(),
                "Failed to parse backend response"
            );
            TelemetryError::from(e)
        })
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn fetch_trends(&self, query: &TrendsQuery) -> TelemetryResult<TrendsResponse> {
        let url = self.trends_url(query);
        tracing::debug!(%url, "Fetching trends");

        let body = self.get_json(&url).await?;
        let response = parse_trends(body)?;

        tracing::debug!(
            series = response.series.len(),
            points = response.series.values().map(Vec::len).sum::<usize>(),
            "Trends fetched"
        );
        Ok(response)
    }

    async fn open_stream(&self, device: &str) -> TelemetryResult<EventStream> {
        let url = self.events_url(device);
        tracing::debug!(%url, "Connecting to event stream");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("text/event-stream") {
            tracing::warn!(%content_type, "Event stream answered with unexpected content type");
        }

        Ok(decode_event_stream(response.bytes_stream()))
    }

    async fn fetch_health(&self) -> TelemetryResult<HealthReport> {
        let body = self.get_json(&self.health_url()).await?;
        parse_health(&body)
    }

    async fn fetch_tank_settings(&self) -> TelemetryResult<TankCalibration> {
        let body = self.get_json(&self.tank_settings_url()).await?;
        parse_tank_settings(body)
    }

    async fn fetch_devices(&self) -> TelemetryResult<Vec<String>> {
        let body = self.get_json(&self.devices_url()).await?;
        let devices = parse_devices(&body)?;
        tracing::debug!(count = devices.len(), "Devices fetched");
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::MetricId;
    use crate::domain::time_range::TimeRange;

    fn source() -> HttpTelemetrySource {
        HttpTelemetrySource::new("http://plantomio.local:5000/", Duration::from_secs(15)).unwrap()
    }

    #[test]
    fn test_trends_url() {
        let query = TrendsQuery {
            device: "plt-404cca470da0".to_string(),
            metrics: vec![MetricId::Temperature, MetricId::Ph, MetricId::Ec],
            range: TimeRange::WEEK,
            step: None,
        };
        assert_eq!(
            source().trends_url(&query),
            "http://plantomio.local:5000/api/trends?metrics=temperature%2CpH%2CEC&device=plt-404cca470da0&minutes=10080&step=2h"
        );
    }

    #[test]
    fn test_step_override_and_encoding() {
        let query = TrendsQuery {
            device: "tank 2".to_string(),
            metrics: vec![MetricId::Orp],
            range: TimeRange::DAY,
            step: Some("5m".to_string()),
        };
        let url = source().trends_url(&query);
        assert!(url.contains("device=tank%202"));
        assert!(url.ends_with("&step=5m"));
    }

    #[test]
    fn test_events_and_health_urls() {
        let source = source();
        assert_eq!(
            source.events_url("plt-1"),
            "http://plantomio.local:5000/api/events?device=plt-1"
        );
        assert_eq!(source.health_url(), "http://plantomio.local:5000/health");
        assert_eq!(
            source.tank_settings_url(),
            "http://plantomio.local:5000/api/tank-settings"
        );
        assert_eq!(source.devices_url(), "http://plantomio.local:5000/api/devices");
    }
}
