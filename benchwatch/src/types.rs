//! Types that mirror the agent's JSON schema.

use serde::{Deserialize, Serialize};

/// One benchmark measurement as received from a source.
/// `memoryUsage` and `cpuUsage` are optional on the wire; older sources omit
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub latency: f64,
    #[serde(default)]
    pub memory_usage: Option<f64>,
    pub throughput: f64,
    #[serde(default)]
    pub cpu_usage: Option<f64>,
    pub timestamp: i64,
}

/// One projected chart point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub timestamp: i64,
    pub value: f64,
}
