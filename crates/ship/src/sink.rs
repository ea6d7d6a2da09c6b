use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::io::Write;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use glanceship_core::error::{Result, ShipError};
use glanceship_core::model::point::{FieldValue, Point};
use glanceship_core::time::unix_nanos;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};

/// Destination for the batch built in one cycle.
pub trait Sink: Send + Sync + 'static {
    fn write(&self, points: Vec<Point>) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub compression: WriteCompression,
    pub timeout: Duration,
    /// Merged into every point; tags already on the point win.
    pub default_tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCompression {
    None,
    Gzip,
}

impl WriteCompression {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            other => Err(ShipError::Config(format!(
                "unknown influx compression {other:?} (expected none or gzip)"
            ))),
        }
    }
}

/// Writes batches to the InfluxDB v2 `/api/v2/write` endpoint as line protocol.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: Client,
    write_url: String,
    cfg: InfluxConfig,
}

impl InfluxSink {
    pub fn new(cfg: InfluxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ShipError::Internal(format!("failed to build influx http client: {e}")))?;
        let write_url = format!("{}/api/v2/write", cfg.url.trim_end_matches('/'));
        Ok(Self {
            client,
            write_url,
            cfg,
        })
    }

    pub fn encode(&self, points: &[Point]) -> Result<String> {
        encode_batch(points, &self.cfg.default_tags)
    }

    async fn post(&self, body: String) -> Result<()> {
        let (body, content_encoding) = maybe_compress_body(body.into_bytes(), self.cfg.compression)
            .map_err(|e| ShipError::SinkWriteFailure {
                status: None,
                reason: format!("failed to compress write payload: {e}"),
            })?;

        let mut req = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.cfg.org.as_str()),
                ("bucket", self.cfg.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.cfg.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8");
        if let Some(encoding) = content_encoding {
            req = req.header(CONTENT_ENCODING, encoding);
        }

        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| ShipError::SinkWriteFailure {
                status: None,
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(ShipError::SinkWriteFailure {
            status: Some(status.as_u16()),
            reason: truncate(text.trim(), 256).to_string(),
        })
    }
}

impl Sink for InfluxSink {
    async fn write(&self, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = self.encode(&points)?;
        tracing::debug!(points = points.len(), bytes = body.len(), "writing batch to influx");
        self.post(body).await
    }
}

pub fn encode_batch(points: &[Point], default_tags: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::new();
    for point in points {
        encode_line(&mut out, point, default_tags)?;
        out.push('\n');
    }
    Ok(out)
}

/// Appends one line-protocol record for `point` to `out`.
pub fn encode_line(
    out: &mut String,
    point: &Point,
    default_tags: &BTreeMap<String, String>,
) -> Result<()> {
    if point.fields.is_empty() {
        return Err(ShipError::SinkWriteFailure {
            status: None,
            reason: format!("point {} has no fields", point.measurement),
        });
    }

    escape_into(out, &point.measurement, &[',', ' ']);

    let mut tags = default_tags.clone();
    tags.extend(point.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    for (key, value) in tags.iter().filter(|(_, v)| !v.is_empty()) {
        out.push(',');
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        escape_into(out, value, &[',', '=', ' ']);
    }

    let mut sep = ' ';
    for (key, value) in &point.fields {
        out.push(sep);
        sep = ',';
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        match value {
            FieldValue::Integer(i) => {
                let _ = write!(out, "{i}i");
            }
            FieldValue::Float(f) => {
                if !f.is_finite() {
                    return Err(ShipError::InvalidMetricValue {
                        measurement: point.measurement.clone(),
                        field: key.clone(),
                        value: f.to_string(),
                    });
                }
                let _ = write!(out, "{f}");
            }
            FieldValue::Text(s) => {
                out.push('"');
                escape_into(out, s, &['"', '\\']);
                out.push('"');
            }
        }
    }

    let ts = unix_nanos(&point.ts).map_err(|e| ShipError::SinkWriteFailure {
        status: None,
        reason: e.to_string(),
    })?;
    let _ = write!(out, " {ts}");
    Ok(())
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn maybe_compress_body(
    body: Vec<u8>,
    compression: WriteCompression,
) -> std::io::Result<(Vec<u8>, Option<&'static str>)> {
    match compression {
        WriteCompression::None => Ok((body, None)),
        WriteCompression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            let compressed = encoder.finish()?;
            Ok((compressed, Some("gzip")))
        }
    }
}
