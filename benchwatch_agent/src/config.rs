//! Agent configuration from CLI flags with environment fallbacks.
//!
//! Precedence: flag, then `BENCHWATCH_AGENT_*` (or `PORT`), then default.

use std::time::Duration;

use crate::cpu::{CpuStrategy, DEFAULT_TIMING_BASELINE};
use crate::error::ConfigError;
use crate::publisher::STREAM_INTERVAL;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_SERVICE_NAME: &str = "benchwatch-agent";
pub const DEFAULT_STREAM_BUFFER: usize = 8;

pub const USAGE: &str = "Usage: benchwatch_agent [--port PORT|-p PORT] [--cpu-strategy timing|idle] \
[--service-name NAME] [--interval-ms MS]\n\
Environment: PORT, BENCHWATCH_AGENT_CPU_STRATEGY, BENCHWATCH_AGENT_CPU_BASELINE_MS, \
BENCHWATCH_AGENT_SERVICE_NAME, BENCHWATCH_AGENT_INTERVAL_MS, BENCHWATCH_AGENT_STREAM_BUFFER";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub port: u16,
    pub cpu_strategy: CpuStrategy,
    pub cpu_baseline: Duration,
    pub service_name: String,
    pub interval: Duration,
    pub stream_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cpu_strategy: CpuStrategy::default(),
            cpu_baseline: DEFAULT_TIMING_BASELINE,
            service_name: DEFAULT_SERVICE_NAME.into(),
            interval: STREAM_INTERVAL,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ParsedArgs {
    Run(AgentConfig),
    Help,
}

impl AgentConfig {
    /// Parse process args and environment.
    pub fn from_env() -> Result<ParsedArgs, ConfigError> {
        Self::parse(std::env::args(), |k| std::env::var(k).ok())
    }

    /// Parse `args` (program name first) with `env` as the variable lookup.
    pub fn parse<I, F>(args: I, env: F) -> Result<ParsedArgs, ConfigError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut it = args.into_iter();
        let _ = it.next(); // program name
        let mut port: Option<String> = None;
        let mut strategy: Option<String> = None;
        let mut service: Option<String> = None;
        let mut interval: Option<String> = None;

        while let Some(a) = it.next() {
            match a.as_str() {
                "-h" | "--help" => return Ok(ParsedArgs::Help),
                "--port" | "-p" => port = Some(it.next().ok_or(ConfigError::MissingValue("--port"))?),
                "--cpu-strategy" => {
                    strategy = Some(it.next().ok_or(ConfigError::MissingValue("--cpu-strategy"))?)
                }
                "--service-name" => {
                    service = Some(it.next().ok_or(ConfigError::MissingValue("--service-name"))?)
                }
                "--interval-ms" => {
                    interval = Some(it.next().ok_or(ConfigError::MissingValue("--interval-ms"))?)
                }
                _ => match a.split_once('=') {
                    Some(("--port", v)) => port = Some(v.to_string()),
                    Some(("--cpu-strategy", v)) => strategy = Some(v.to_string()),
                    Some(("--service-name", v)) => service = Some(v.to_string()),
                    Some(("--interval-ms", v)) => interval = Some(v.to_string()),
                    _ => return Err(ConfigError::UnexpectedArgument(a)),
                },
            }
        }

        let mut cfg = AgentConfig::default();

        if let Some(p) = port.or_else(|| env("PORT")) {
            cfg.port = p.trim().parse().map_err(|_| ConfigError::InvalidValue {
                flag: "port",
                value: p.clone(),
            })?;
        }
        if let Some(s) = strategy.or_else(|| env("BENCHWATCH_AGENT_CPU_STRATEGY")) {
            cfg.cpu_strategy = s.parse().map_err(|_| ConfigError::InvalidValue {
                flag: "cpu-strategy",
                value: s.clone(),
            })?;
        }
        if let Some(n) = service.or_else(|| env("BENCHWATCH_AGENT_SERVICE_NAME")) {
            if !n.trim().is_empty() {
                cfg.service_name = n.trim().to_string();
            }
        }
        if let Some(ms) = interval.or_else(|| env("BENCHWATCH_AGENT_INTERVAL_MS")) {
            cfg.interval = parse_millis(&ms, "interval-ms")?;
        }
        if let Some(ms) = env("BENCHWATCH_AGENT_CPU_BASELINE_MS") {
            cfg.cpu_baseline = parse_millis(&ms, "BENCHWATCH_AGENT_CPU_BASELINE_MS")?;
        }
        if let Some(n) = env("BENCHWATCH_AGENT_STREAM_BUFFER") {
            cfg.stream_buffer = n
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    flag: "BENCHWATCH_AGENT_STREAM_BUFFER",
                    value: n.clone(),
                })?;
        }
        Ok(ParsedArgs::Run(cfg))
    }
}

fn parse_millis(v: &str, flag: &'static str) -> Result<Duration, ConfigError> {
    v.trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| ConfigError::InvalidValue {
            flag,
            value: v.to_string(),
        })
}
