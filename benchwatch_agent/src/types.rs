//! Data types sent to the client over HTTP/SSE.
//! Keep this module minimal and stable; it defines the wire format.

use serde::{Deserialize, Serialize};

/// One benchmark measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Wall-clock duration of the workload, ms.
    pub latency: f64,
    /// Resident memory of the process, MB. Omitted when the host query fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    /// Workload iterations per second.
    pub throughput: f64,
    /// Smoothed CPU estimate, 0..=100.
    pub cpu_usage: f64,
    /// Epoch ms at completion.
    pub timestamp: i64,
}

impl Sample {
    /// Build a sample from raw measurements; throughput follows from the
    /// iteration count and the latency.
    pub fn from_measurement(
        iterations: u64,
        latency_ms: f64,
        memory_usage: Option<f64>,
        cpu_usage: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            latency: latency_ms,
            memory_usage,
            throughput: iterations as f64 / (latency_ms / 1000.0),
            cpu_usage,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub service: String,
    pub timestamp: i64,
}

impl Health {
    pub fn ok(service: &str) -> Self {
        Self {
            status: "ok".into(),
            service: service.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
