use std::future::Future;
use std::time::Duration;

use glanceship_core::error::{Result, ShipError};
use glanceship_core::model::snapshot::{
    Cpu, Filesystem, Gpu, Memory, MetricSnapshot, NetworkInterface, OneOrMany, PerCpu, Sensor,
    SystemInfo,
};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Anything that can produce a full snapshot for one cycle.
pub trait MetricSource: Send + Sync + 'static {
    fn fetch_all(&self) -> impl Future<Output = Result<MetricSnapshot>> + Send;
}

/// Client for the Glances REST API v4.
#[derive(Debug, Clone)]
pub struct GlancesClient {
    base_url: String,
    client: Client,
}

impl GlancesClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShipError::Internal(format!("failed to build glances http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn category_url(&self, category: &str) -> String {
        format!("{}/api/4/{category}", self.base_url)
    }

    /// GET one category and decode it. Only 2xx responses count as success.
    pub async fn fetch_category<T: DeserializeOwned>(&self, category: &str) -> Result<T> {
        let url = self.category_url(category);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(category, format!("request to {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(unavailable(category, format!("HTTP {status} from {url}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| unavailable(category, format!("reading body from {url} failed: {e}")))?;
        tracing::trace!(category, bytes = body.len(), "glances category fetched");

        serde_json::from_slice(&body).map_err(|e| ShipError::MalformedPayload {
            category: category.to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn sensors(&self) -> Result<Vec<Sensor>> {
        self.fetch_category("sensors").await
    }

    pub async fn mem(&self) -> Result<Memory> {
        self.fetch_category("mem").await
    }

    pub async fn gpu(&self) -> Result<Vec<Gpu>> {
        self.fetch_category("gpu").await
    }

    pub async fn fs(&self) -> Result<Vec<Filesystem>> {
        self.fetch_category("fs").await
    }

    pub async fn network(&self) -> Result<Vec<NetworkInterface>> {
        self.fetch_category("network").await
    }

    pub async fn cpu(&self) -> Result<Cpu> {
        self.fetch_category("cpu").await
    }

    pub async fn percpu(&self) -> Result<Vec<PerCpu>> {
        self.fetch_category::<OneOrMany<PerCpu>>("percpu")
            .await
            .map(OneOrMany::into_vec)
    }

    pub async fn system(&self) -> Result<SystemInfo> {
        self.fetch_category("system").await
    }

    /// Fetches all eight categories concurrently. The first failure fails the
    /// whole snapshot; nothing partial is returned.
    pub async fn snapshot(&self) -> Result<MetricSnapshot> {
        let (sensors, mem, gpu, fs, network, cpu, percpu, system) = futures::try_join!(
            self.sensors(),
            self.mem(),
            self.gpu(),
            self.fs(),
            self.network(),
            self.cpu(),
            self.percpu(),
            self.system(),
        )?;

        Ok(MetricSnapshot {
            sensors,
            mem,
            gpu,
            fs,
            network,
            cpu,
            percpu,
            system,
        })
    }
}

impl MetricSource for GlancesClient {
    async fn fetch_all(&self) -> Result<MetricSnapshot> {
        self.snapshot().await
    }
}

fn unavailable(category: &str, reason: String) -> ShipError {
    ShipError::SourceUnavailable {
        category: category.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use glanceship_core::Stage;
    use serde_json::json;
    use testkit::MockGlances;

    use super::*;

    fn client(mock: &MockGlances) -> GlancesClient {
        GlancesClient::new(&mock.base_url, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn category_url_trims_trailing_slash() {
        let c = GlancesClient::new("http://glances:61208/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.category_url("mem"), "http://glances:61208/api/4/mem");
    }

    #[tokio::test]
    async fn fetch_all_returns_every_category() {
        let mock = MockGlances::start().await.unwrap();
        let snapshot = client(&mock).fetch_all().await.unwrap();

        assert_eq!(snapshot, testkit::sample_snapshot());
        assert_eq!(snapshot.system.hostname, "glances-host");
        assert_eq!(snapshot.percpu.len(), 2);
        assert_eq!(mock.hits(), 8);
    }

    #[tokio::test]
    async fn one_failed_category_fails_the_snapshot() {
        let mock = MockGlances::start().await.unwrap();
        mock.fail("fs", 500);

        let err = client(&mock).fetch_all().await.unwrap_err();
        assert_eq!(err.stage(), Stage::Fetch);
        assert_eq!(err.category(), Some("fs"));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn non_success_status_is_source_unavailable() {
        let mock = MockGlances::start().await.unwrap();
        mock.fail("system", 404);

        let err = client(&mock).system().await.unwrap_err();
        assert!(matches!(err, ShipError::SourceUnavailable { ref category, .. } if category == "system"));
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed_payload() {
        let mock = MockGlances::start().await.unwrap();
        mock.set_body("mem", json!({ "total": "lots" }));

        let err = client(&mock).mem().await.unwrap_err();
        assert!(matches!(err, ShipError::MalformedPayload { ref category, .. } if category == "mem"));
    }

    #[tokio::test]
    async fn percpu_single_record_is_normalized() {
        let mock = MockGlances::start().await.unwrap();
        mock.set_body(
            "percpu",
            json!({ "key": "cpu_number", "cpu_number": 0, "total": 5.0, "system": 1.0, "user": 4.0, "idle": 95.0 }),
        );

        let percpu = client(&mock).percpu().await.unwrap();
        assert_eq!(percpu.len(), 1);
        assert_eq!(percpu[0].cpu_number, 0);
    }

    #[tokio::test]
    async fn unreachable_agent_is_source_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let c = GlancesClient::new(&format!("http://{addr}"), Duration::from_millis(500)).unwrap();
        let err = c.cpu().await.unwrap_err();
        assert!(matches!(err, ShipError::SourceUnavailable { .. }));
    }
}
