use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TelemetryError {
    /// Transport-level failures are retried with backoff; payload problems are not.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Closed(_) | Self::Status { .. }
        )
    }
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(TelemetryError::Timeout(Duration::from_secs(15)).is_transport());
        assert!(
            TelemetryError::Status {
                status: 502,
                body: String::new()
            }
            .is_transport()
        );
        assert!(!TelemetryError::Malformed("no data".into()).is_transport());
    }
}
