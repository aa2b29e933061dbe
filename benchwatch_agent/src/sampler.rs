//! Benchmark sampler: runs the fixed CPU-bound workload and assembles a
//! [`Sample`] from its timing, process memory and the CPU estimate.

use std::sync::Arc;
use std::time::Instant;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::cpu::{CpuEstimator, EstimatorState};
use crate::types::Sample;

/// Iterations of the benchmark workload.
pub const ITERATIONS: u64 = 1_000_000;

// Floor for the measured latency so throughput stays finite.
const MIN_LATENCY_MS: f64 = 1e-6;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub type SharedSampler = Arc<Mutex<Sampler>>;

/// Reports the memory footprint of the sampling process.
pub trait MemoryProbe: Send {
    fn resident_bytes(&mut self) -> Option<u64>;
}

/// Resident memory of the current process via sysinfo.
pub struct ProcessMemory {
    sys: System,
    pid: Option<Pid>,
}

impl ProcessMemory {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("cannot resolve own pid, memory usage will be omitted: {e}");
                None
            }
        };
        Self {
            sys: System::new(),
            pid,
        }
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemory {
    fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            false,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.sys.process(pid).map(|p| p.memory())
    }
}

pub struct Sampler {
    iterations: u64,
    estimator: CpuEstimator,
    state: EstimatorState,
    memory: Box<dyn MemoryProbe>,
}

impl Sampler {
    pub fn new(estimator: CpuEstimator, memory: Box<dyn MemoryProbe>) -> Self {
        let state = estimator.initial_state();
        Self {
            iterations: ITERATIONS,
            estimator,
            state,
            memory,
        }
    }

    /// Override the workload size (tests use a small one).
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn estimator(&self) -> &CpuEstimator {
        &self.estimator
    }

    pub fn estimator_state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn into_shared(self) -> SharedSampler {
        Arc::new(Mutex::new(self))
    }

    /// Run the workload once and produce a sample.
    pub fn run_sample(&mut self) -> Sample {
        let start = Instant::now();
        let checksum = run_workload(self.iterations);
        let latency_ms = (start.elapsed().as_secs_f64() * 1000.0).max(MIN_LATENCY_MS);

        let memory_usage = self.memory.resident_bytes().map(|b| b as f64 / BYTES_PER_MB);
        let cpu_usage = self.estimator.sample(&mut self.state);
        let timestamp = chrono::Utc::now().timestamp_millis();

        debug!(latency_ms, checksum, cpu_usage, "sample taken");
        Sample::from_measurement(
            self.iterations,
            latency_ms,
            memory_usage,
            cpu_usage,
            timestamp,
        )
    }
}

/// Take one sample from a shared sampler on the blocking pool, holding the
/// lock for the duration. Err only if the workload panicked.
pub async fn sample_shared(sampler: &SharedSampler) -> Result<Sample, JoinError> {
    let mut guard = sampler.clone().lock_owned().await;
    tokio::task::spawn_blocking(move || guard.run_sample()).await
}

/// `sum += sqrt(i) * ln(i + 1)` over `n` iterations; the result is returned
/// so the loop cannot be optimized away.
pub fn run_workload(n: u64) -> f64 {
    let mut sum = 0.0f64;
    for i in 0..n {
        let x = std::hint::black_box(i as f64);
        sum += x.sqrt() * (x + 1.0).ln();
    }
    std::hint::black_box(sum)
}
