use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, ShipError};

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| ShipError::Config(format!("invalid duration {input}: {e}")))
}

/// Nanoseconds since the epoch, as InfluxDB expects with `precision=ns`.
pub fn unix_nanos(ts: &DateTime<Utc>) -> Result<i64> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| ShipError::Internal(format!("timestamp out of nanosecond range: {ts}")))
}
