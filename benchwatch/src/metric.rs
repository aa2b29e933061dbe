//! Selectable metrics and their typed accessors.

use std::fmt;
use std::str::FromStr;

use crate::types::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Metric {
    #[default]
    Latency,
    MemoryUsage,
    Throughput,
    CpuUsage,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Latency,
        Metric::MemoryUsage,
        Metric::Throughput,
        Metric::CpuUsage,
    ];

    /// Value of this metric in `s`, if the source reported it.
    pub fn value(self, s: &Sample) -> Option<f64> {
        match self {
            Metric::Latency => Some(s.latency),
            Metric::MemoryUsage => s.memory_usage,
            Metric::Throughput => Some(s.throughput),
            Metric::CpuUsage => s.cpu_usage,
        }
    }

    /// Wire field name.
    pub fn id(self) -> &'static str {
        match self {
            Metric::Latency => "latency",
            Metric::MemoryUsage => "memoryUsage",
            Metric::Throughput => "throughput",
            Metric::CpuUsage => "cpuUsage",
        }
    }

    /// Short label for selectors.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Latency => "Latency",
            Metric::MemoryUsage => "Memory Usage",
            Metric::Throughput => "Throughput",
            Metric::CpuUsage => "CPU Usage",
        }
    }

    /// Panel title.
    pub fn title(self) -> &'static str {
        match self {
            Metric::Latency => "Average Latency",
            Metric::MemoryUsage => "Memory Usage",
            Metric::Throughput => "Requests per second",
            Metric::CpuUsage => "CPU Load",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Latency => "ms",
            Metric::MemoryUsage => "MB",
            Metric::Throughput => "ops/sec",
            Metric::CpuUsage => "%",
        }
    }

    pub fn decimals(self) -> usize {
        match self {
            Metric::MemoryUsage => 1,
            Metric::CpuUsage => 0,
            Metric::Latency | Metric::Throughput => 2,
        }
    }

    pub fn format_value(self, v: f64) -> String {
        format!("{:.*}", self.decimals(), v)
    }

    pub fn next(self) -> Metric {
        let i = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Metric {
        let i = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(i + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latency" => Ok(Metric::Latency),
            "memoryusage" | "memory" | "mem" => Ok(Metric::MemoryUsage),
            "throughput" | "ops" => Ok(Metric::Throughput),
            "cpuusage" | "cpu" => Ok(Metric::CpuUsage),
            other => Err(format!(
                "unknown metric '{other}' (expected latency|memory|throughput|cpu)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sample {
        Sample {
            latency: 12.345,
            memory_usage: Some(48.25),
            throughput: 81_000.0,
            cpu_usage: None,
            timestamp: 1,
        }
    }

    #[test]
    fn accessors_pick_the_right_field() {
        let s = sample();
        assert_eq!(Metric::Latency.value(&s), Some(12.345));
        assert_eq!(Metric::MemoryUsage.value(&s), Some(48.25));
        assert_eq!(Metric::Throughput.value(&s), Some(81_000.0));
        assert_eq!(Metric::CpuUsage.value(&s), None);
    }

    #[test]
    fn formatting_follows_per_metric_precision() {
        assert_eq!(Metric::Latency.format_value(12.346), "12.35");
        assert_eq!(Metric::MemoryUsage.format_value(48.26), "48.3");
        assert_eq!(Metric::CpuUsage.format_value(37.6), "38");
    }

    #[test]
    fn cycling_visits_every_metric() {
        let mut m = Metric::Latency;
        let mut seen = vec![m];
        for _ in 0..3 {
            m = m.next();
            seen.push(m);
        }
        assert_eq!(seen, Metric::ALL.to_vec());
        assert_eq!(m.next(), Metric::Latency);
        assert_eq!(Metric::Latency.prev(), Metric::CpuUsage);
    }

    #[test]
    fn parses_ids_and_aliases() {
        for m in Metric::ALL {
            assert_eq!(m.id().parse::<Metric>(), Ok(m));
        }
        assert_eq!("cpu".parse::<Metric>(), Ok(Metric::CpuUsage));
        assert!("disk".parse::<Metric>().is_err());
    }
}
