//! Bounded per-source sample history for charts.

use std::collections::VecDeque;

use crate::metric::Metric;
use crate::types::{Point, Sample};

/// Points kept per source (about a minute at one sample per second).
pub const MAX_POINTS: usize = 60;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if cap == 0 {
        return;
    }
    while dq.len() >= cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Time-ascending, capacity-bounded series; the oldest sample is evicted
/// first.
#[derive(Debug, Clone)]
pub struct SourceSeries {
    samples: VecDeque<Sample>,
    cap: usize,
}

impl SourceSeries {
    pub fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Append a sample. Rejects (returns false) a sample older than the
    /// newest one so the series stays ordered.
    pub fn push(&mut self, sample: Sample) -> bool {
        if self
            .samples
            .back()
            .is_some_and(|last| sample.timestamp < last.timestamp)
        {
            return false;
        }
        push_capped(&mut self.samples, sample, self.cap);
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Scalar series of one metric; samples lacking the field are skipped.
    pub fn project(&self, metric: Metric) -> Vec<Point> {
        self.samples
            .iter()
            .filter_map(|s| {
                metric.value(s).map(|value| Point {
                    timestamp: s.timestamp,
                    value,
                })
            })
            .collect()
    }
}

impl Default for SourceSeries {
    fn default() -> Self {
        Self::new(MAX_POINTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: i64) -> Sample {
        Sample {
            latency: ts as f64,
            memory_usage: None,
            throughput: 1.0,
            cpu_usage: Some(1.0),
            timestamp: ts,
        }
    }

    #[test]
    fn push_capped_keeps_most_recent() {
        let mut dq = VecDeque::new();
        for i in 0..5 {
            push_capped(&mut dq, i, 3);
        }
        assert_eq!(dq, VecDeque::from(vec![2, 3, 4]));
    }

    #[test]
    fn sixty_first_sample_evicts_the_oldest() {
        let mut s = SourceSeries::default();
        for ts in 1..=MAX_POINTS as i64 {
            assert!(s.push(at(ts)));
        }
        assert_eq!(s.len(), MAX_POINTS);
        s.push(at(61));
        assert_eq!(s.len(), MAX_POINTS);
        let ts: Vec<i64> = s.iter().map(|x| x.timestamp).collect();
        assert_eq!(ts, (2..=61).collect::<Vec<_>>());
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut s = SourceSeries::default();
        assert_eq!(s.capacity(), MAX_POINTS);
        for ts in 0..500 {
            s.push(at(ts));
            assert!(s.len() <= s.capacity());
        }
        let mut small = SourceSeries::new(2);
        for ts in 0..5 {
            small.push(at(ts));
        }
        assert_eq!(small.capacity(), 2);
        assert_eq!(small.latest().map(|x| x.timestamp), Some(4));
    }

    #[test]
    fn out_of_order_sample_is_rejected() {
        let mut s = SourceSeries::default();
        assert!(s.push(at(10)));
        assert!(s.push(at(10)));
        assert!(!s.push(at(9)));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn projection_skips_missing_fields() {
        let mut s = SourceSeries::default();
        s.push(at(1));
        s.push(at(2));
        assert!(s.project(Metric::MemoryUsage).is_empty());
        let lat: Vec<f64> = s.project(Metric::Latency).iter().map(|p| p.value).collect();
        assert_eq!(lat, vec![1.0, 2.0]);
    }
}
