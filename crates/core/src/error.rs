use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShipError {
    #[error("source unavailable: {category}: {reason}")]
    SourceUnavailable { category: String, reason: String },

    #[error("malformed payload: {category}: {reason}")]
    MalformedPayload { category: String, reason: String },

    #[error("invalid metric value: {measurement}.{field}={value:?}")]
    InvalidMetricValue {
        measurement: String,
        field: String,
        value: String,
    },

    #[error("sink write failed{}: {reason}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    SinkWriteFailure { status: Option<u16>, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Where in a cycle an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Build,
    Write,
    Startup,
}

impl ShipError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::SourceUnavailable { .. } | Self::MalformedPayload { .. } => Stage::Fetch,
            Self::InvalidMetricValue { .. } => Stage::Build,
            Self::SinkWriteFailure { .. } => Stage::Write,
            Self::Config(_) | Self::Internal(_) => Stage::Startup,
        }
    }

    /// Glances category the error belongs to, when one is known.
    pub fn category(&self) -> Option<&str> {
        match self {
            Self::SourceUnavailable { category, .. } | Self::MalformedPayload { category, .. } => {
                Some(category)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Build => "build",
            Self::Write => "write",
            Self::Startup => "startup",
        })
    }
}

pub type Result<T> = std::result::Result<T, ShipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_follows_variant() {
        let err = ShipError::SourceUnavailable {
            category: "fs".into(),
            reason: "HTTP 500".into(),
        };
        assert_eq!(err.stage(), Stage::Fetch);
        assert_eq!(err.category(), Some("fs"));

        let err = ShipError::InvalidMetricValue {
            measurement: "sensor".into(),
            field: "value".into(),
            value: "n/a".into(),
        };
        assert_eq!(err.stage(), Stage::Build);
        assert_eq!(err.category(), None);
    }

    #[test]
    fn sink_failure_mentions_status() {
        let err = ShipError::SinkWriteFailure {
            status: Some(401),
            reason: "unauthorized".into(),
        };
        assert_eq!(err.to_string(), "sink write failed (status 401): unauthorized");

        let err = ShipError::SinkWriteFailure {
            status: None,
            reason: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "sink write failed: connection refused");
    }
}
