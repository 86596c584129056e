// Decoding of backend JSON payloads (trends, stream messages, health)
use crate::application::telemetry_source::{HealthReport, TrendsResponse};
use crate::domain::metric::MetricId;
use crate::domain::sample::parse_timestamp;
use crate::domain::tank::TankCalibration;
use crate::error::{TelemetryError, TelemetryResult};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// A decoded push-channel message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// One `[timestamp, value]` entry per metric carried by the message
    Samples {
        device: Option<String>,
        batches: Vec<(MetricId, Vec<Value>)>,
    },
    Status(String),
    ServerError(String),
}

/// `{"status": "success", "data": {"<metric>": [[ts, value], ...]}}`
pub fn parse_trends(body: Value) -> TelemetryResult<TrendsResponse> {
    let Value::Object(mut root) = body else {
        return Err(TelemetryError::Malformed("trends response is not an object".into()));
    };

    let status = root.get("status").and_then(Value::as_str).unwrap_or_default();
    if status != "success" {
        let message = root
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        return Err(TelemetryError::Malformed(format!(
            "trends status {status:?}: {message}"
        )));
    }

    let Some(Value::Object(data)) = root.remove("data") else {
        return Err(TelemetryError::Malformed("trends response has no data object".into()));
    };

    let mut series = BTreeMap::new();
    for (key, entries) in data {
        let Ok(metric) = key.parse::<MetricId>() else {
            tracing::debug!(%key, "Ignoring unknown metric in trends response");
            continue;
        };
        match entries {
            Value::Array(points) => {
                series.insert(metric, points);
            }
            Value::Null => {
                series.insert(metric, Vec::new());
            }
            other => {
                tracing::warn!(%metric, value = %other, "Trends series is not an array");
            }
        }
    }

    Ok(TrendsResponse { series })
}

/// Accepts the multi-metric snapshot the backend pushes
/// (`{"timestamp": ts, "pH": 6.8, "EC": 1.2, ...}`), single samples
/// (`{"metric": "pH", "timestamp": ts, "value": 6.8}`) and status/error notices.
pub fn parse_stream_message(data: &str) -> TelemetryResult<StreamMessage> {
    let value: Value = serde_json::from_str(data)?;
    let Value::Object(fields) = value else {
        return Err(TelemetryError::Malformed("stream message is not an object".into()));
    };

    if let Some(error) = fields.get("error") {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Ok(StreamMessage::ServerError(message));
    }

    let device = fields
        .get("deviceID")
        .or_else(|| fields.get("device"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(metric) = fields.get("metric") {
        return single_sample(metric, &fields, device);
    }

    let readings: Vec<(MetricId, &Value)> = fields
        .iter()
        .filter_map(|(key, value)| key.parse::<MetricId>().ok().map(|m| (m, value)))
        .collect();

    if readings.is_empty() {
        return match fields.get("status").and_then(Value::as_str) {
            Some(status) => Ok(StreamMessage::Status(status.to_string())),
            None => Err(TelemetryError::Malformed("stream message carries no readings".into())),
        };
    }

    let timestamp = stream_timestamp(&fields)?;
    let mut batches: Vec<(MetricId, Vec<Value>)> = readings
        .into_iter()
        .map(|(metric, value)| (metric, vec![json!([timestamp, value])]))
        .collect();
    batches.sort_by_key(|(metric, _)| *metric);

    Ok(StreamMessage::Samples { device, batches })
}

fn single_sample(
    metric: &Value,
    fields: &Map<String, Value>,
    device: Option<String>,
) -> TelemetryResult<StreamMessage> {
    let metric = metric
        .as_str()
        .and_then(|m| m.parse::<MetricId>().ok())
        .ok_or_else(|| TelemetryError::Malformed(format!("unknown metric {metric}")))?;
    let timestamp = stream_timestamp(fields)?;
    let value = fields.get("value").cloned().unwrap_or(Value::Null);

    Ok(StreamMessage::Samples {
        device,
        batches: vec![(metric, vec![json!([timestamp, value])])],
    })
}

fn stream_timestamp(fields: &Map<String, Value>) -> TelemetryResult<i64> {
    fields
        .get("timestamp")
        .and_then(parse_timestamp)
        .ok_or_else(|| TelemetryError::Malformed("stream message has no numeric timestamp".into()))
}

/// `{"status": "ok", "services": {"node_red": {"status": "ok"}, ...}}`
pub fn parse_health(body: &Value) -> TelemetryResult<HealthReport> {
    let services = body
        .get("services")
        .and_then(Value::as_object)
        .ok_or_else(|| TelemetryError::Malformed("health response has no services".into()))?;

    let services = services
        .iter()
        .map(|(name, entry)| {
            let status = entry
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            (name.clone(), status)
        })
        .collect();

    Ok(HealthReport { services })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TankSettingsBody {
    max_distance: f64,
    min_distance: f64,
    alert_level: Option<f64>,
}

/// `{"maxDistance": 3.0, "minDistance": 0.3, "alertLevel": 10.0}`
pub fn parse_tank_settings(body: Value) -> TelemetryResult<TankCalibration> {
    let body: TankSettingsBody = serde_json::from_value(body)?;
    let defaults = TankCalibration::default();
    let tank = TankCalibration {
        max_distance: body.max_distance,
        min_distance: body.min_distance,
        alert_level: body.alert_level.unwrap_or(defaults.alert_level),
    };

    if !tank.is_valid() {
        return Err(TelemetryError::Malformed(format!(
            "unusable tank calibration {tank:?}"
        )));
    }
    Ok(tank)
}

/// `{"status": "success", "devices": ["plt-...", ...]}`
pub fn parse_devices(body: &Value) -> TelemetryResult<Vec<String>> {
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
    if status != "success" {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        return Err(TelemetryError::Malformed(format!(
            "devices status {status:?}: {message}"
        )));
    }

    let devices = body
        .get("devices")
        .and_then(Value::as_array)
        .ok_or_else(|| TelemetryError::Malformed("devices response has no device list".into()))?;

    let unique: BTreeSet<String> = devices
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect();
    Ok(unique.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trends_keeps_raw_entries() {
        let body = json!({
            "status": "success",
            "data": {
                "pH": [[1, 6.5], [2, "NaN"]],
                "EC": [],
                "humidity": [[1, 40]],
                "ORP": null
            }
        });
        let response = parse_trends(body).unwrap();
        assert_eq!(response.series[&MetricId::Ph].len(), 2);
        assert!(response.series[&MetricId::Ec].is_empty());
        assert!(response.series[&MetricId::Orp].is_empty());
        assert_eq!(response.series.len(), 3);
    }

    #[test]
    fn test_parse_trends_rejects_error_status() {
        let body = json!({"status": "error", "message": "VM down"});
        let err = parse_trends(body).unwrap_err();
        assert!(err.to_string().contains("VM down"));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_multi_metric_snapshot() {
        let data = r#"{"deviceID":"plt-1","lastUpdate":"2024-05-01T10:00:00","timestamp":1714557600,
                       "temperature":22.5,"pH":"NaN","EC":1.25,"waterLevel":64.0}"#;
        let StreamMessage::Samples { device, batches } = parse_stream_message(data).unwrap() else {
            panic!("expected samples");
        };
        assert_eq!(device.as_deref(), Some("plt-1"));
        let metrics: Vec<MetricId> = batches.iter().map(|(m, _)| *m).collect();
        assert_eq!(
            metrics,
            vec![MetricId::Temperature, MetricId::Ph, MetricId::Ec, MetricId::WaterLevel]
        );
        assert_eq!(batches[1].1, vec![json!([1714557600, "NaN"])]);
    }

    #[test]
    fn test_single_sample_and_status() {
        let single = parse_stream_message(r#"{"metric":"TDS","timestamp":10,"value":412}"#).unwrap();
        assert_eq!(
            single,
            StreamMessage::Samples {
                device: None,
                batches: vec![(MetricId::Tds, vec![json!([10, 412])])],
            }
        );

        let status =
            parse_stream_message(r#"{"status":"connected","timestamp":"2024-05-01T10:00:00"}"#).unwrap();
        assert_eq!(status, StreamMessage::Status("connected".into()));

        let error = parse_stream_message(r#"{"error":"query failed"}"#).unwrap();
        assert_eq!(error, StreamMessage::ServerError("query failed".into()));
    }

    #[test]
    fn test_malformed_stream_messages() {
        assert!(matches!(parse_stream_message("{not json"), Err(TelemetryError::Json(_))));
        assert!(matches!(parse_stream_message("[1,2]"), Err(TelemetryError::Malformed(_))));
        assert!(matches!(
            parse_stream_message(r#"{"pH": 7.0}"#),
            Err(TelemetryError::Malformed(_))
        ));
        assert!(matches!(
            parse_stream_message(r#"{"deviceID": "plt-1"}"#),
            Err(TelemetryError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_tank_settings() {
        let tank = parse_tank_settings(json!({"maxDistance": 2, "minDistance": 0.25, "alertLevel": 15})).unwrap();
        assert_eq!(
            tank,
            TankCalibration { max_distance: 2.0, min_distance: 0.25, alert_level: 15.0 }
        );

        let no_alert = parse_tank_settings(json!({"maxDistance": 2.0, "minDistance": 0.0})).unwrap();
        assert_eq!(no_alert.alert_level, 10.0);

        assert!(matches!(
            parse_tank_settings(json!({"maxDistance": 0.2, "minDistance": 0.5})),
            Err(TelemetryError::Malformed(_))
        ));
        assert!(matches!(
            parse_tank_settings(json!({"minDistance": 0.5})),
            Err(TelemetryError::Json(_))
        ));
    }

    #[test]
    fn test_parse_devices_sorts_and_dedups() {
        let body = json!({"status": "success", "devices": ["plt-b", "plt-a", "plt-b", 7, ""]});
        assert_eq!(parse_devices(&body).unwrap(), vec!["plt-a", "plt-b"]);

        let failed = json!({"status": "error", "message": "VictoriaMetrics unreachable"});
        assert!(parse_devices(&failed).unwrap_err().to_string().contains("unreachable"));
        assert!(parse_devices(&json!({"status": "success"})).is_err());
    }

    #[test]
    fn test_parse_health() {
        let body = json!({"status": "ok", "services": {
            "dashboard": {"status": "ok"},
            "victoria_metrics": {"status": "error"},
            "mqtt": {}
        }});
        let report = parse_health(&body).unwrap();
        assert!(report.is_ok("dashboard"));
        assert!(!report.is_ok("victoria_metrics"));
        assert_eq!(report.services["mqtt"], "unknown");
    }
}
