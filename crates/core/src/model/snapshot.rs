//! Wire shapes of the Glances API v4 categories, and the per-cycle snapshot
//! that aggregates them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::value::{ExtraValue, integer};

pub type Extensions = BTreeMap<String, ExtraValue>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SensorValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sensor {
    pub label: String,
    pub unit: String,
    pub value: SensorValue,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    #[serde(deserialize_with = "integer")]
    pub total: i64,
    #[serde(deserialize_with = "integer")]
    pub available: i64,
    pub percent: f64,
    #[serde(deserialize_with = "integer")]
    pub used: i64,
    #[serde(deserialize_with = "integer")]
    pub free: i64,
    #[serde(flatten)]
    pub extra: Extensions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gpu {
    pub key: String,
    pub gpu_id: String,
    pub name: String,
    pub mem: Option<f64>,
    pub proc: Option<f64>,
    pub temperature: Option<f64>,
    pub fan_speed: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filesystem {
    pub device_name: String,
    pub fs_type: String,
    pub mnt_point: String,
    pub options: String,
    #[serde(deserialize_with = "integer")]
    pub size: i64,
    #[serde(deserialize_with = "integer")]
    pub used: i64,
    #[serde(deserialize_with = "integer")]
    pub free: i64,
    pub percent: f64,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkInterface {
    #[serde(deserialize_with = "integer")]
    pub bytes_sent: i64,
    #[serde(deserialize_with = "integer")]
    pub bytes_recv: i64,
    #[serde(deserialize_with = "integer")]
    pub speed: i64,
    pub key: String,
    pub interface_name: String,
    pub alias: Option<String>,
    #[serde(flatten)]
    pub extra: Extensions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cpu {
    pub total: f64,
    pub system: f64,
    pub user: f64,
    pub idle: f64,
    #[serde(flatten)]
    pub extra: Extensions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerCpu {
    pub key: String,
    #[serde(deserialize_with = "integer")]
    pub cpu_number: i64,
    pub total: f64,
    pub system: f64,
    pub user: f64,
    pub idle: f64,
    #[serde(flatten)]
    pub extra: Extensions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    pub os_name: String,
    pub hostname: String,
    pub platform: String,
    pub os_version: String,
}

/// Some Glances builds answer `percpu` with a bare record instead of a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(v) => vec![v],
        }
    }
}

/// Everything fetched in one cycle.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricSnapshot {
    pub sensors: Vec<Sensor>,
    pub mem: Memory,
    pub gpu: Vec<Gpu>,
    pub fs: Vec<Filesystem>,
    pub network: Vec<NetworkInterface>,
    pub cpu: Cpu,
    pub percpu: Vec<PerCpu>,
    pub system: SystemInfo,
}
