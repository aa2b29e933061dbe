//! CPU load estimation for samples.
//!
//! Two interchangeable strategies feed one exponential moving average:
//! - `Timing`: time a small fixed workload and compare it to an idle baseline.
//! - `IdleDelta`: diff per-core idle/total tick counters between calls.
//!
//! The strategies agree on range (0..=100) and smoothing, not on absolute
//! value, so a deployment picks one and sticks with it.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::debug;

/// Weight of the previous smoothed value.
pub const SMOOTHING_PREV: f64 = 0.7;
/// Weight of the fresh raw estimate.
pub const SMOOTHING_RAW: f64 = 0.3;

/// Iterations of the timing probe workload.
pub const TIMING_ITERATIONS: u64 = 50_000;
/// Probe duration considered "idle" (maps to a raw value of 50).
pub const DEFAULT_TIMING_BASELINE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuStrategy {
    #[default]
    Timing,
    IdleDelta,
}

impl fmt::Display for CpuStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuStrategy::Timing => f.write_str("timing"),
            CpuStrategy::IdleDelta => f.write_str("idle"),
        }
    }
}

impl FromStr for CpuStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timing" | "workload" => Ok(CpuStrategy::Timing),
            "idle" | "idle-delta" | "host" => Ok(CpuStrategy::IdleDelta),
            other => Err(format!("unknown cpu strategy '{other}' (expected timing|idle)")),
        }
    }
}

/// Cumulative tick counters of one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreTicks {
    pub idle: u64,
    pub total: u64,
}

/// Source of per-core tick counters.
pub trait TickSource: Send + Sync {
    fn read(&self) -> io::Result<Vec<CoreTicks>>;
}

/// Reads per-core counters from `/proc/stat` (Linux).
pub struct ProcStat {
    path: PathBuf,
}

impl ProcStat {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/proc/stat"),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcStat {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for ProcStat {
    fn read(&self) -> io::Result<Vec<CoreTicks>> {
        let s = std::fs::read_to_string(&self.path)?;
        let cores = parse_proc_stat(&s);
        if cores.is_empty() {
            return Err(io::Error::other("no per-core cpu lines"));
        }
        Ok(cores)
    }
}

/// Parse the `cpuN` lines of `/proc/stat`.
/// Line layout: "cpu0 user nice system idle iowait irq softirq steal ...".
/// iowait counts as idle; guest time is already inside user, so only the
/// first 8 fields make up the total.
pub fn parse_proc_stat(s: &str) -> Vec<CoreTicks> {
    s.lines()
        .filter(|l| {
            l.strip_prefix("cpu")
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| c.is_ascii_digit())
        })
        .map(|line| {
            let vals: Vec<u64> = line
                .split_whitespace()
                .skip(1)
                .take(8)
                .map(|tok| tok.parse::<u64>().unwrap_or(0))
                .collect();
            let idle = vals.get(3).copied().unwrap_or(0) + vals.get(4).copied().unwrap_or(0);
            let total = vals.iter().fold(0u64, |acc, v| acc.saturating_add(*v));
            CoreTicks { idle, total }
        })
        .collect()
}

/// Smoothing state of one sampling process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EstimatorState {
    /// Last smoothed value, starts at 0.
    pub smoothed: f64,
    /// Counters seen on the previous call (idle-delta strategy).
    pub prev_ticks: Option<Vec<CoreTicks>>,
    /// Duration of the previous probe workload (timing strategy).
    pub prev_probe: Option<Duration>,
}

enum Probe {
    Timing { baseline: Duration },
    IdleDelta { source: Box<dyn TickSource> },
}

/// Produces a smoothed CPU estimate on every call to [`CpuEstimator::sample`].
pub struct CpuEstimator {
    probe: Probe,
}

impl CpuEstimator {
    pub fn timing(baseline: Duration) -> Self {
        Self {
            probe: Probe::Timing {
                baseline: if baseline.is_zero() {
                    DEFAULT_TIMING_BASELINE
                } else {
                    baseline
                },
            },
        }
    }

    pub fn idle_delta(source: Box<dyn TickSource>) -> Self {
        Self {
            probe: Probe::IdleDelta { source },
        }
    }

    /// Build the estimator for a strategy with the default host sources.
    pub fn for_strategy(strategy: CpuStrategy, baseline: Duration) -> Self {
        match strategy {
            CpuStrategy::Timing => Self::timing(baseline),
            CpuStrategy::IdleDelta => Self::idle_delta(Box::new(ProcStat::new())),
        }
    }

    pub fn strategy(&self) -> CpuStrategy {
        match self.probe {
            Probe::Timing { .. } => CpuStrategy::Timing,
            Probe::IdleDelta { .. } => CpuStrategy::IdleDelta,
        }
    }

    /// Fresh state for this estimator; the idle-delta strategy captures its
    /// first counter snapshot here so the first sample already has a delta.
    pub fn initial_state(&self) -> EstimatorState {
        let mut state = EstimatorState::default();
        if let Probe::IdleDelta { source } = &self.probe {
            state.prev_ticks = source.read().ok();
        }
        state
    }

    /// Take one raw reading and fold it into `state`. Never fails: an
    /// unreadable host signal holds the previous estimate.
    pub fn sample(&self, state: &mut EstimatorState) -> f64 {
        let raw = match &self.probe {
            Probe::Timing { baseline } => {
                let took = run_probe_workload();
                state.prev_probe = Some(took);
                timing_raw(took, *baseline)
            }
            Probe::IdleDelta { source } => match source.read() {
                Ok(cur) => {
                    let raw = state
                        .prev_ticks
                        .as_deref()
                        .and_then(|prev| idle_delta_raw(prev, &cur));
                    state.prev_ticks = Some(cur);
                    raw.unwrap_or(state.smoothed)
                }
                Err(e) => {
                    debug!("cpu tick counters unavailable: {e}");
                    state.smoothed
                }
            },
        };
        observe(state, raw)
    }
}

/// Fold a raw estimate into the moving average and return the new value.
pub fn observe(state: &mut EstimatorState, raw: f64) -> f64 {
    state.smoothed = clamp_pct(smooth(state.smoothed, clamp_pct(raw)));
    state.smoothed
}

pub fn smooth(prev: f64, raw: f64) -> f64 {
    SMOOTHING_PREV * prev + SMOOTHING_RAW * raw
}

pub fn clamp_pct(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

/// Raw estimate of the timing strategy: the probe taking exactly the
/// baseline maps to 50.
pub fn timing_raw(took: Duration, baseline: Duration) -> f64 {
    let t0 = baseline.as_secs_f64().max(f64::EPSILON);
    clamp_pct(took.as_secs_f64() / t0 * 50.0)
}

/// Raw estimate of the idle-delta strategy, aggregated across cores.
/// `None` when no ticks elapsed.
pub fn idle_delta_raw(prev: &[CoreTicks], cur: &[CoreTicks]) -> Option<f64> {
    let (d_idle, d_total) = prev
        .iter()
        .zip(cur)
        .fold((0u64, 0u64), |(idle, total), (p, c)| {
            (
                idle.saturating_add(c.idle.saturating_sub(p.idle)),
                total.saturating_add(c.total.saturating_sub(p.total)),
            )
        });
    if d_total == 0 {
        return None;
    }
    Some(clamp_pct(100.0 - (d_idle as f64 / d_total as f64) * 100.0))
}

fn run_probe_workload() -> Duration {
    let start = Instant::now();
    let mut sum = 0.0f64;
    for i in 0..TIMING_ITERATIONS {
        sum += std::hint::black_box(i as f64).sqrt();
    }
    std::hint::black_box(sum);
    start.elapsed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<io::Result<Vec<CoreTicks>>>>);

    impl TickSource for Scripted {
        fn read(&self) -> io::Result<Vec<CoreTicks>> {
            let mut q = self.0.lock().unwrap();
            if q.is_empty() {
                return Err(io::Error::other("drained"));
            }
            q.remove(0)
        }
    }

    fn ticks(pairs: &[(u64, u64)]) -> Vec<CoreTicks> {
        pairs
            .iter()
            .map(|&(idle, total)| CoreTicks { idle, total })
            .collect()
    }

    #[test]
    fn clamp_law_holds_for_extreme_raw_values() {
        let mut st = EstimatorState::default();
        for _ in 0..50 {
            let v = observe(&mut st, 500.0);
            assert!((0.0..=100.0).contains(&v));
        }
        assert!(st.smoothed > 99.9);

        let mut st = EstimatorState::default();
        assert_eq!(observe(&mut st, -20.0), 0.0);
        assert_eq!(observe(&mut st, f64::NAN), 0.0);
        assert_eq!(clamp_pct(500.0), 100.0);
        assert_eq!(clamp_pct(-20.0), 0.0);
    }

    #[test]
    fn ewma_converges_monotonically() {
        let mut st = EstimatorState::default();
        let r = 42.0;
        let mut last = st.smoothed;
        for _ in 0..100 {
            let v = observe(&mut st, r);
            assert!(v >= last && v <= r, "v={v} last={last}");
            last = v;
        }
        assert!((r - last).abs() < 1e-9);
    }

    #[test]
    fn first_smoothed_value_is_three_tenths_of_raw() {
        let mut st = EstimatorState::default();
        assert!((observe(&mut st, 80.0) - 24.0).abs() < 1e-12);
        assert!((observe(&mut st, 80.0) - (0.7 * 24.0 + 24.0)).abs() < 1e-12);
    }

    #[test]
    fn timing_raw_scales_against_baseline() {
        let base = Duration::from_millis(5);
        assert!((timing_raw(Duration::from_millis(5), base) - 50.0).abs() < 1e-9);
        assert!((timing_raw(Duration::from_micros(2500), base) - 25.0).abs() < 1e-9);
        assert_eq!(timing_raw(Duration::from_millis(100), base), 100.0);
    }

    #[test]
    fn idle_delta_aggregates_cores() {
        let prev = ticks(&[(100, 200), (100, 200)]);
        let cur = ticks(&[(150, 300), (110, 300)]);
        // d_idle = 60, d_total = 200 -> 70% busy
        let raw = idle_delta_raw(&prev, &cur).unwrap();
        assert!((raw - 70.0).abs() < 1e-9);
        assert_eq!(idle_delta_raw(&cur, &cur), None);
    }

    #[test]
    fn idle_delta_estimator_holds_when_counters_vanish() {
        let src = Scripted(Mutex::new(vec![
            Ok(ticks(&[(0, 0)])),
            Ok(ticks(&[(0, 100)])),
            Err(io::Error::other("gone")),
        ]));
        let est = CpuEstimator::idle_delta(Box::new(src));
        assert_eq!(est.strategy(), CpuStrategy::IdleDelta);
        let mut st = est.initial_state();
        assert!(st.prev_ticks.is_some());
        let first = est.sample(&mut st);
        assert!((first - 30.0).abs() < 1e-9);
        let held = est.sample(&mut st);
        // raw held at previous smoothed value keeps the estimate steady
        assert!((held - first).abs() < 1e-9);
    }

    #[test]
    fn timing_estimator_stays_in_range() {
        let est = CpuEstimator::timing(DEFAULT_TIMING_BASELINE);
        let mut st = est.initial_state();
        for _ in 0..3 {
            let v = est.sample(&mut st);
            assert!((0.0..=100.0).contains(&v));
        }
        assert!(st.prev_probe.is_some());
    }

    #[test]
    fn parses_per_core_proc_stat_lines() {
        let text = "cpu  10 0 10 100 5 0 0 0 0 0\n\
                    cpu0 1 2 3 4 5 6 7 8 9 10\n\
                    cpu1 10 0 10 80 0 0 0 0\n\
                    intr 12345\n";
        let cores = parse_proc_stat(text);
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0], CoreTicks { idle: 9, total: 36 });
        assert_eq!(cores[1], CoreTicks { idle: 80, total: 100 });
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!("timing".parse::<CpuStrategy>(), Ok(CpuStrategy::Timing));
        assert_eq!("IDLE".parse::<CpuStrategy>(), Ok(CpuStrategy::IdleDelta));
        assert!("bogus".parse::<CpuStrategy>().is_err());
    }

    #[test]
    fn proc_stat_reads_a_given_file() {
        let path = std::env::temp_dir().join(format!("benchwatch-stat-{}", std::process::id()));
        std::fs::write(&path, "cpu  20 0 20 160 0 0 0 0\ncpu0 10 0 10 80 0 0 0 0\n").unwrap();
        let src = ProcStat::at(&path);
        assert_eq!(src.read().unwrap(), ticks(&[(80, 100)]));

        let est = CpuEstimator::idle_delta(Box::new(ProcStat::at(&path)));
        let mut st = est.initial_state();
        est.sample(&mut st);
        // 60 of the next 100 ticks idle -> 40% busy
        std::fs::write(&path, "cpu0 30 0 30 140 0 0 0 0\n").unwrap();
        let v = est.sample(&mut st);
        assert!(v > 0.0 && v <= 40.0, "{v}");

        std::fs::remove_file(&path).unwrap();
        assert!(ProcStat::at(&path).read().is_err());
    }
}
