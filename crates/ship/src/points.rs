use chrono::{DateTime, Utc};
use glanceship_core::error::{Result, ShipError};
use glanceship_core::model::point::Point;
use glanceship_core::model::snapshot::{
    Cpu, Filesystem, Memory, MetricSnapshot, NetworkInterface, Sensor, SensorValue,
};

/// Turns a snapshot into the batch written for one cycle.
///
/// Forwarded measurements are `cpu`, `mem`, `sensor`, `network` and
/// `filesystem`. GPU and per-core CPU data are fetched but not forwarded.
#[derive(Debug, Clone)]
pub struct PointBuilder {
    fallback_host: String,
}

impl PointBuilder {
    pub fn new(fallback_host: impl Into<String>) -> Self {
        Self {
            fallback_host: fallback_host.into(),
        }
    }

    /// Host tag for the snapshot: the agent's own hostname, else the local one.
    pub fn host_for<'a>(&'a self, snapshot: &'a MetricSnapshot) -> &'a str {
        let remote = snapshot.system.hostname.trim();
        if remote.is_empty() {
            &self.fallback_host
        } else {
            remote
        }
    }

    pub fn build(&self, snapshot: &MetricSnapshot, ts: DateTime<Utc>) -> Result<Vec<Point>> {
        let host = self.host_for(snapshot);
        let mut points = Vec::with_capacity(
            2 + snapshot.sensors.len() + snapshot.network.len() + snapshot.fs.len(),
        );

        points.push(cpu_point(&snapshot.cpu, host, ts));
        points.push(mem_point(&snapshot.mem, host, ts));
        for sensor in &snapshot.sensors {
            points.push(sensor_point(sensor, host, ts)?);
        }
        for nic in &snapshot.network {
            points.push(network_point(nic, host, ts));
        }
        for fs in &snapshot.fs {
            points.push(filesystem_point(fs, host, ts));
        }
        Ok(points)
    }
}

fn cpu_point(cpu: &Cpu, host: &str, ts: DateTime<Utc>) -> Point {
    Point::new("cpu", ts)
        .tag("host", host)
        .float_field("total", cpu.total)
        .float_field("idle", cpu.idle)
        .float_field("user", cpu.user)
        .float_field("system", cpu.system)
}

fn mem_point(mem: &Memory, host: &str, ts: DateTime<Utc>) -> Point {
    Point::new("mem", ts)
        .tag("host", host)
        .int_field("total", mem.total)
        .int_field("available", mem.available)
        .int_field("used", mem.used)
        .int_field("free", mem.free)
        .float_field("percent", mem.percent)
}

fn sensor_point(sensor: &Sensor, host: &str, ts: DateTime<Utc>) -> Result<Point> {
    Ok(Point::new("sensor", ts)
        .tag("host", host)
        .tag("key", sensor.label.as_str())
        .string_field("unit", sensor.unit.as_str())
        .float_field("value", sensor_value(sensor)?))
}

fn network_point(nic: &NetworkInterface, host: &str, ts: DateTime<Utc>) -> Point {
    Point::new("network", ts)
        .tag("host", host)
        .tag("interface", nic.interface_name.as_str())
        .int_field("bytes_sent", nic.bytes_sent)
        .int_field("bytes_recv", nic.bytes_recv)
        .int_field("speed", nic.speed)
}

fn filesystem_point(fs: &Filesystem, host: &str, ts: DateTime<Utc>) -> Point {
    Point::new("filesystem", ts)
        .tag("host", host)
        .tag("key", fs.device_name.as_str())
        .int_field("used", fs.used)
        .int_field("free", fs.free)
        .float_field("percent", fs.percent)
}

/// Sensor readings arrive as numbers or numeric strings.
pub fn sensor_value(sensor: &Sensor) -> Result<f64> {
    let parsed = match &sensor.value {
        SensorValue::Number(n) => Some(*n),
        SensorValue::Text(s) => s.trim().parse::<f64>().ok(),
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ShipError::InvalidMetricValue {
            measurement: "sensor".to_string(),
            field: "value".to_string(),
            value: match &sensor.value {
                SensorValue::Number(n) => n.to_string(),
                SensorValue::Text(s) => s.clone(),
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use glanceship_core::Stage;
    use glanceship_core::model::point::FieldValue;
    use testkit::{fixed_ts, sample_snapshot};

    use super::*;

    fn builder() -> PointBuilder {
        PointBuilder::new("local-box")
    }

    fn find<'a>(points: &'a [Point], measurement: &str, tag: (&str, &str)) -> &'a Point {
        points
            .iter()
            .find(|p| p.measurement == measurement && p.tag_value(tag.0) == Some(tag.1))
            .unwrap()
    }

    #[test]
    fn batch_size_is_two_plus_lists() {
        let snapshot = sample_snapshot();
        let points = builder().build(&snapshot, fixed_ts()).unwrap();

        let expected = 2 + snapshot.sensors.len() + snapshot.network.len() + snapshot.fs.len();
        assert_eq!(points.len(), expected);
        assert_eq!(points.iter().filter(|p| p.measurement == "cpu").count(), 1);
        assert_eq!(points.iter().filter(|p| p.measurement == "mem").count(), 1);
        assert!(points.iter().all(|p| p.measurement != "gpu"));
    }

    #[test]
    fn every_point_shares_timestamp_and_host() {
        let points = builder().build(&sample_snapshot(), fixed_ts()).unwrap();
        assert!(points.iter().all(|p| p.ts == fixed_ts()));
        assert!(points.iter().all(|p| p.tag_value("host") == Some("glances-host")));
    }

    #[test]
    fn empty_remote_hostname_falls_back_to_local() {
        let mut snapshot = sample_snapshot();
        snapshot.system.hostname = "  ".to_string();

        let points = builder().build(&snapshot, fixed_ts()).unwrap();
        assert!(points.iter().all(|p| p.tag_value("host") == Some("local-box")));
    }

    #[test]
    fn mem_keeps_integer_totals_and_float_percent() {
        let points = builder().build(&sample_snapshot(), fixed_ts()).unwrap();
        let mem = find(&points, "mem", ("host", "glances-host"));

        assert_eq!(mem.field("total"), Some(&FieldValue::Integer(1000)));
        assert_eq!(mem.field("available"), Some(&FieldValue::Integer(400)));
        assert_eq!(mem.field("used"), Some(&FieldValue::Integer(600)));
        assert_eq!(mem.field("free"), Some(&FieldValue::Integer(400)));
        assert_eq!(mem.field("percent"), Some(&FieldValue::Float(60.0)));
        assert_eq!(mem.fields.len(), 5);
    }

    #[test]
    fn cpu_fields_are_floats() {
        let points = builder().build(&sample_snapshot(), fixed_ts()).unwrap();
        let cpu = find(&points, "cpu", ("host", "glances-host"));

        assert_eq!(cpu.field("total"), Some(&FieldValue::Float(12.5)));
        assert_eq!(cpu.field("idle"), Some(&FieldValue::Float(87.5)));
        assert_eq!(cpu.field("user"), Some(&FieldValue::Float(9.0)));
        assert_eq!(cpu.field("system"), Some(&FieldValue::Float(2.5)));
        assert!(cpu.field("nice").is_none());
    }

    #[test]
    fn filesystem_tagged_by_device() {
        let points = builder().build(&sample_snapshot(), fixed_ts()).unwrap();
        let fs = find(&points, "filesystem", ("key", "/dev/sda1"));

        assert_eq!(fs.field("used"), Some(&FieldValue::Integer(500)));
        assert_eq!(fs.field("free"), Some(&FieldValue::Integer(500)));
        assert_eq!(fs.field("percent"), Some(&FieldValue::Float(50.0)));
    }

    #[test]
    fn network_tagged_by_interface() {
        let points = builder().build(&sample_snapshot(), fixed_ts()).unwrap();
        let eth0 = find(&points, "network", ("interface", "eth0"));

        assert_eq!(eth0.field("bytes_sent"), Some(&FieldValue::Integer(1024)));
        assert_eq!(eth0.field("bytes_recv"), Some(&FieldValue::Integer(4096)));
        assert_eq!(eth0.field("speed"), Some(&FieldValue::Integer(1_073_741_824)));
    }

    #[test]
    fn string_sensor_value_is_coerced() {
        let points = builder().build(&sample_snapshot(), fixed_ts()).unwrap();
        let nvme = find(&points, "sensor", ("key", "nvme0"));

        assert_eq!(nvme.field("value"), Some(&FieldValue::Float(42.5)));
        assert_eq!(nvme.field("unit"), Some(&FieldValue::Text("C".into())));
    }

    #[test]
    fn non_numeric_sensor_value_fails_the_build() {
        let mut snapshot = sample_snapshot();
        snapshot.sensors[1].value = SensorValue::Text("not-a-number".into());

        let err = builder().build(&snapshot, fixed_ts()).unwrap_err();
        assert_eq!(err.stage(), Stage::Build);
        assert!(matches!(
            err,
            ShipError::InvalidMetricValue { ref value, .. } if value == "not-a-number"
        ));
    }

    #[test]
    fn non_finite_sensor_value_is_rejected() {
        let mut snapshot = sample_snapshot();
        snapshot.sensors[0].value = SensorValue::Text("NaN".into());
        assert!(builder().build(&snapshot, fixed_ts()).is_err());
    }

    #[test]
    fn empty_lists_yield_cpu_and_mem_only() {
        let mut snapshot = sample_snapshot();
        snapshot.sensors.clear();
        snapshot.network.clear();
        snapshot.fs.clear();

        let points = builder().build(&snapshot, fixed_ts()).unwrap();
        let names: Vec<_> = points.iter().map(|p| p.measurement.as_str()).collect();
        assert_eq!(names, vec!["cpu", "mem"]);
    }
}
