use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShipError};

/// What the scheduler does when a tick fires while the previous cycle is still running.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// One cycle at a time; ticks that land on a running cycle are skipped.
    #[default]
    Serialize,
    /// Every tick starts a cycle, even if earlier ones are still in flight.
    AllowOverlap,
}

impl FromStr for OverlapPolicy {
    type Err = ShipError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serialize" | "serial" | "skip" => Ok(Self::Serialize),
            "overlap" | "allow" | "allow_overlap" | "allow-overlap" => Ok(Self::AllowOverlap),
            _ => Err(ShipError::Config(format!(
                "unknown overlap policy {s:?} (expected serialize or overlap)"
            ))),
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Serialize => "serialize",
            Self::AllowOverlap => "overlap",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub glances_url: Option<String>,
    pub influx_url: Option<String>,
    pub influx_token: Option<String>,
    pub influx_org: Option<String>,
    pub influx_bucket: Option<String>,
    pub interval: Duration,
    pub overlap: OverlapPolicy,
    pub host: Option<String>,
    pub fetch_timeout: Duration,
    pub write_timeout: Duration,
    pub influx_compression: String,
}

/// Resolved InfluxDB write target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxTarget {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            glances_url: None,
            influx_url: None,
            influx_token: None,
            influx_org: None,
            influx_bucket: None,
            interval: Duration::from_secs(10),
            overlap: OverlapPolicy::default(),
            host: None,
            fetch_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            influx_compression: "none".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    #[cfg(test)]
    fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    /// Checks every required key and reports all missing ones at once.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("GLANCES_API_URL", &self.glances_url),
            ("INFLUX_URL", &self.influx_url),
            ("INFLUX_TOKEN", &self.influx_token),
            ("INFLUX_ORG", &self.influx_org),
            ("INFLUX_BUCKET", &self.influx_bucket),
        ]
        .into_iter()
        .filter(|(_, v)| is_blank(v))
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ShipError::Config(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn glances_url(&self) -> Result<&str> {
        required(&self.glances_url, "GLANCES_API_URL")
    }

    pub fn influx_target(&self) -> Result<InfluxTarget> {
        self.validate()?;
        Ok(InfluxTarget {
            url: required(&self.influx_url, "INFLUX_URL")?.to_string(),
            token: required(&self.influx_token, "INFLUX_TOKEN")?.to_string(),
            org: required(&self.influx_org, "INFLUX_ORG")?.to_string(),
            bucket: required(&self.influx_bucket, "INFLUX_BUCKET")?.to_string(),
        })
    }
}

fn is_blank(v: &Option<String>) -> bool {
    v.as_deref().is_none_or(|s| s.trim().is_empty())
}

fn required<'a>(v: &'a Option<String>, name: &str) -> Result<&'a str> {
    match v.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ShipError::Config(format!(
            "missing required configuration: {name}"
        ))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    glances_url: Option<String>,
    influx_url: Option<String>,
    influx_token: Option<String>,
    influx_org: Option<String>,
    influx_bucket: Option<String>,
    interval_secs: Option<u64>,
    overlap: Option<String>,
    host: Option<String>,
    fetch_timeout: Option<String>,
    write_timeout: Option<String>,
    influx_compression: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("GLANCESHIP_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("glanceship/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| ShipError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| ShipError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

/// Blank variables count as unset.
fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let interval_secs = match env_value("INTERVAL_S") {
        Some(v) => Some(v.trim().parse::<u64>().map_err(|e| {
            ShipError::Config(format!("bad INTERVAL_S in environment: {e} (value={v})"))
        })?),
        None => None,
    };

    Ok(ConfigOverrides {
        glances_url: env_value("GLANCES_API_URL"),
        influx_url: env_value("INFLUX_URL"),
        influx_token: env_value("INFLUX_TOKEN"),
        influx_org: env_value("INFLUX_ORG"),
        influx_bucket: env_value("INFLUX_BUCKET"),
        interval_secs,
        overlap: env_value("GLANCESHIP_OVERLAP"),
        host: env_value("GLANCESHIP_HOST"),
        fetch_timeout: env_value("GLANCESHIP_FETCH_TIMEOUT"),
        write_timeout: env_value("INFLUX_TIMEOUT"),
        influx_compression: env_value("INFLUX_COMPRESSION"),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.glances_url {
        cfg.glances_url = Some(v);
    }
    if let Some(v) = overrides.influx_url {
        cfg.influx_url = Some(v);
    }
    if let Some(v) = overrides.influx_token {
        cfg.influx_token = Some(v);
    }
    if let Some(v) = overrides.influx_org {
        cfg.influx_org = Some(v);
    }
    if let Some(v) = overrides.influx_bucket {
        cfg.influx_bucket = Some(v);
    }
    if let Some(v) = overrides.interval_secs {
        if v == 0 {
            return Err(ShipError::Config(format!(
                "bad interval in {source}: must be at least one second"
            )));
        }
        cfg.interval = Duration::from_secs(v);
    }
    if let Some(v) = overrides.overlap {
        cfg.overlap = v
            .parse()
            .map_err(|e| ShipError::Config(format!("bad overlap in {source}: {e}")))?;
    }
    if let Some(v) = overrides.host {
        cfg.host = Some(v);
    }
    if let Some(v) = overrides.fetch_timeout {
        cfg.fetch_timeout = humantime::parse_duration(&v).map_err(|e| {
            ShipError::Config(format!("bad fetch_timeout in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.write_timeout {
        cfg.write_timeout = humantime::parse_duration(&v).map_err(|e| {
            ShipError::Config(format!("bad write_timeout in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.influx_compression {
        let v = v.trim().to_ascii_lowercase();
        if !matches!(v.as_str(), "none" | "gzip") {
            return Err(ShipError::Config(format!(
                "bad influx_compression in {source}: {v:?} (expected none or gzip)"
            )));
        }
        cfg.influx_compression = v;
    }
    Ok(())
}
