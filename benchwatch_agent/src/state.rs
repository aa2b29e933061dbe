//! Shared agent state handed to every request handler.

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::cpu::CpuEstimator;
use crate::publisher::StreamPublisher;
use crate::sampler::{ProcessMemory, Sampler, SharedSampler};

#[derive(Clone)]
pub struct AppState {
    // One sampler (and one estimator state) per process
    pub sampler: SharedSampler,
    pub publisher: Arc<StreamPublisher>,
    pub service_name: Arc<str>,
    // Frames a slow client may have queued before writes start failing
    pub stream_buffer: usize,
}

impl AppState {
    pub fn new(sampler: Sampler, config: &AgentConfig) -> Self {
        let sampler = sampler.into_shared();
        let publisher = Arc::new(StreamPublisher::new(sampler.clone(), config.interval));
        Self {
            sampler,
            publisher,
            service_name: Arc::from(config.service_name.as_str()),
            stream_buffer: config.stream_buffer.max(1),
        }
    }

    /// State backed by the host: sysinfo memory and the configured CPU strategy.
    pub fn from_config(config: &AgentConfig) -> Self {
        let estimator = CpuEstimator::for_strategy(config.cpu_strategy, config.cpu_baseline);
        let sampler = Sampler::new(estimator, Box::new(ProcessMemory::new()));
        Self::new(sampler, config)
    }
}
