//! Periodic push of samples to subscribers.
//!
//! Each [`Subscription`] owns one task that samples and emits immediately on
//! open, then once per period until cancelled. A failed write is logged and
//! skipped; only cancellation ends the schedule.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::sampler::{sample_shared, SharedSampler};
use crate::types::Sample;

pub const STREAM_INTERVAL: Duration = Duration::from_millis(1000);

/// "Emit one framed event" capability of a subscriber.
pub trait EventSink: Send + 'static {
    fn emit(&mut self, sample: &Sample) -> Result<(), SinkError>;
}

/// `data: <json>\n\n`
pub fn encode_sse_frame(sample: &Sample) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(sample)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Writes SSE frames into a bounded channel. A full or closed channel fails
/// the write right away; nothing is buffered beyond the channel.
pub struct SseChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl SseChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

impl EventSink for SseChannelSink {
    fn emit(&mut self, sample: &Sample) -> Result<(), SinkError> {
        let frame = encode_sse_frame(sample)?;
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

// Structured delivery for in-process consumers.
impl EventSink for mpsc::UnboundedSender<Sample> {
    fn emit(&mut self, sample: &Sample) -> Result<(), SinkError> {
        self.send(sample.clone()).map_err(|_| SinkError::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Created,
    Active,
    Cancelled,
}

const CREATED: u8 = 0;
const ACTIVE: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to one open push schedule. Dropping it cancels the schedule.
pub struct Subscription {
    id: u64,
    state: Arc<AtomicU8>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SubscriptionState {
        match self.state.load(Ordering::Acquire) {
            CREATED => SubscriptionState::Created,
            ACTIVE => SubscriptionState::Active,
            _ => SubscriptionState::Cancelled,
        }
    }

    /// Stop the schedule and release the sink. Safe to call repeatedly.
    pub fn cancel(&self) {
        let prev = self.state.swap(CANCELLED, Ordering::AcqRel);
        self.cancel.send_replace(true);
        if prev != CANCELLED {
            debug!(subscription = self.id, "subscription cancelled");
        }
    }

    /// Cancel and wait until the push task has finished and dropped its sink.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct StreamPublisher {
    sampler: SharedSampler,
    period: Duration,
    next_id: AtomicU64,
}

impl StreamPublisher {
    pub fn new(sampler: SharedSampler, period: Duration) -> Self {
        Self {
            sampler,
            period: if period.is_zero() {
                STREAM_INTERVAL
            } else {
                period
            },
            next_id: AtomicU64::new(1),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start pushing samples into `sink`: one right away, then every period.
    /// Must be called within a tokio runtime.
    pub fn open<S: EventSink>(&self, sink: S) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(AtomicU8::new(CREATED));
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_subscription(
            id,
            self.sampler.clone(),
            sink,
            self.period,
            state.clone(),
            cancel_rx,
        ));
        Subscription {
            id,
            state,
            cancel,
            task: Some(task),
        }
    }
}

async fn run_subscription<S: EventSink>(
    id: u64,
    sampler: SharedSampler,
    mut sink: S,
    period: Duration,
    state: Arc<AtomicU8>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    if state
        .compare_exchange(CREATED, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    // Initial push
    push(id, &sampler, &mut sink).await;

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            // Err means every handle is gone, which is a cancellation too.
            _ = cancel_rx.changed() => break,
            _ = ticker.tick() => {
                if *cancel_rx.borrow() {
                    break;
                }
                push(id, &sampler, &mut sink).await;
            }
        }
    }
    drop(sink);
    debug!(subscription = id, "sink released");
}

async fn push<S: EventSink>(id: u64, sampler: &SharedSampler, sink: &mut S) {
    let sample = match sample_shared(sampler).await {
        Ok(s) => s,
        Err(e) => {
            warn!(subscription = id, "sampling failed: {e}");
            return;
        }
    };
    if let Err(e) = sink.emit(&sample) {
        warn!(subscription = id, "stream write failed: {e}");
    }
}
