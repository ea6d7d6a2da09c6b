use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use glanceship_core::model::snapshot::{MetricSnapshot, OneOrMany};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

pub const CATEGORIES: [&str; 8] = [
    "sensors", "mem", "gpu", "fs", "network", "cpu", "percpu", "system",
];

pub fn fixed_ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

/// Glances API v4 response bodies for a small two-disk, two-NIC host.
pub fn category_body(category: &str) -> Value {
    match category {
        "sensors" => json!([
            {
                "label": "Package id 0",
                "unit": "C",
                "value": 48,
                "warning": 80,
                "critical": 100,
                "type": "temperature_core",
                "key": "label"
            },
            {
                "label": "nvme0",
                "unit": "C",
                "value": "42.5",
                "warning": null,
                "critical": null,
                "type": "temperature_hdd",
                "key": "label"
            }
        ]),
        "mem" => json!({
            "total": 1000,
            "available": 400,
            "percent": 60.0,
            "used": 600,
            "free": 400,
            "active": 350,
            "inactive": 150,
            "buffers": null
        }),
        "gpu" => json!([
            {
                "key": "gpu_id",
                "gpu_id": "nvidia0",
                "name": "GeForce GTX 1080",
                "mem": 12.5,
                "proc": 3.0,
                "temperature": 41,
                "fan_speed": null
            }
        ]),
        "fs" => json!([
            {
                "device_name": "/dev/sda1",
                "fs_type": "ext4",
                "mnt_point": "/",
                "options": "rw,relatime",
                "size": 1000,
                "used": 500,
                "free": 500,
                "percent": 50.0,
                "key": "mnt_point"
            },
            {
                "device_name": "/dev/sdb1",
                "fs_type": "xfs",
                "mnt_point": "/srv",
                "options": "rw",
                "size": 4000,
                "used": 1000,
                "free": 3000,
                "percent": 25.0,
                "key": "mnt_point"
            }
        ]),
        "network" => json!([
            {
                "bytes_sent": 1024,
                "bytes_recv": 4096,
                "speed": 1073741824,
                "key": "interface_name",
                "interface_name": "eth0",
                "alias": null,
                "is_up": true,
                "time_since_update": 2.5
            },
            {
                "bytes_sent": 10,
                "bytes_recv": 10,
                "speed": 0,
                "key": "interface_name",
                "interface_name": "lo",
                "alias": "loopback",
                "is_up": true
            }
        ]),
        "cpu" => json!({
            "total": 12.5,
            "system": 2.5,
            "user": 9.0,
            "idle": 87.5,
            "nice": 0.0,
            "cpucore": 4,
            "time_since_update": 2.0
        }),
        "percpu" => json!([
            { "key": "cpu_number", "cpu_number": 0, "total": 10.0, "system": 2.0, "user": 8.0, "idle": 90.0 },
            { "key": "cpu_number", "cpu_number": 1, "total": 15.0, "system": 3.0, "user": 12.0, "idle": 85.0 }
        ]),
        "system" => json!({
            "os_name": "Linux",
            "hostname": "glances-host",
            "platform": "64bit",
            "os_version": "6.8.0"
        }),
        other => panic!("unknown glances category {other}"),
    }
}

/// The snapshot decoded from [`category_body`].
pub fn sample_snapshot() -> MetricSnapshot {
    MetricSnapshot {
        sensors: decode("sensors"),
        mem: decode("mem"),
        gpu: decode("gpu"),
        fs: decode("fs"),
        network: decode("network"),
        cpu: decode("cpu"),
        percpu: serde_json::from_value::<OneOrMany<_>>(category_body("percpu"))
            .unwrap()
            .into_vec(),
        system: decode("system"),
    }
}

fn decode<T: serde::de::DeserializeOwned>(category: &str) -> T {
    serde_json::from_value(category_body(category)).unwrap()
}

#[derive(Default)]
struct GlancesState {
    bodies: Mutex<HashMap<String, Value>>,
    failures: Mutex<HashMap<String, u16>>,
    hits: AtomicUsize,
}

/// Glances stand-in serving `/api/4/{category}` on an ephemeral port.
pub struct MockGlances {
    pub base_url: String,
    state: Arc<GlancesState>,
    task: JoinHandle<()>,
}

impl MockGlances {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(GlancesState::default());
        {
            let mut bodies = state.bodies.lock().unwrap();
            for category in CATEGORIES {
                bodies.insert(category.to_string(), category_body(category));
            }
        }

        let app = Router::new()
            .route("/api/4/{category}", get(serve_category))
            .with_state(state.clone());
        let (addr, task) = serve(app).await?;

        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            task,
        })
    }

    pub fn fail(&self, category: &str, status: u16) {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert(category.to_string(), status);
    }

    pub fn heal(&self, category: &str) {
        self.state.failures.lock().unwrap().remove(category);
    }

    pub fn set_body(&self, category: &str, body: Value) {
        self.state
            .bodies
            .lock()
            .unwrap()
            .insert(category.to_string(), body);
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockGlances {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_category(
    State(state): State<Arc<GlancesState>>,
    Path(category): Path<String>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = state.failures.lock().unwrap().get(&category).copied() {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "injected failure").into_response();
    }
    match state.bodies.lock().unwrap().get(&category) {
        Some(body) => axum::Json(body.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown plugin").into_response(),
    }
}

#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub content_encoding: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedWrite {
    /// Request body as text, gunzipped when it was sent compressed.
    pub fn text(&self) -> String {
        if self.content_encoding.as_deref() == Some("gzip") {
            let mut out = String::new();
            GzDecoder::new(self.body.as_slice())
                .read_to_string(&mut out)
                .unwrap();
            out
        } else {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

struct InfluxState {
    writes: Mutex<Vec<RecordedWrite>>,
    status: AtomicU16,
}

/// InfluxDB v2 stand-in recording every `/api/v2/write` request.
pub struct MockInflux {
    pub url: String,
    state: Arc<InfluxState>,
    task: JoinHandle<()>,
}

impl MockInflux {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(InfluxState {
            writes: Mutex::new(Vec::new()),
            status: AtomicU16::new(204),
        });
        let app = Router::new()
            .route("/api/v2/write", post(record_write))
            .with_state(state.clone());
        let (addr, task) = serve(app).await?;

        Ok(Self {
            url: format!("http://{addr}"),
            state,
            task,
        })
    }

    /// Status returned to subsequent writes.
    pub fn respond_with(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.writes.lock().unwrap().clone()
    }
}

impl Drop for MockInflux {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn record_write(
    State(state): State<Arc<InfluxState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.writes.lock().unwrap().push(RecordedWrite {
        query,
        authorization: header("authorization"),
        content_encoding: header("content-encoding"),
        body: body.to_vec(),
    });

    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::NO_CONTENT);
    if status.is_success() {
        status.into_response()
    } else {
        (status, r#"{"code":"invalid","message":"rejected by mock"}"#).into_response()
    }
}

async fn serve(app: Router) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, task))
}
