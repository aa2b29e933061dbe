//! Rolling per-source history fed by live streams.
//!
//! The aggregator is owned by one context (the UI loop). Stream tasks never
//! touch it directly: they push [`InboundFrame`]s into a channel which the
//! owner drains with [`RollingAggregator::pump`] or awaits with
//! [`RollingAggregator::recv`].

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, StreamError};
use crate::history::{SourceSeries, MAX_POINTS};
use crate::metric::Metric;
use crate::stream::{self, InboundFrame, StreamHandle};
use crate::types::{Point, Sample};

pub const INBOUND_BUFFER: usize = 256;

/// Identifies one live subscription. A later `subscribe` for the same source
/// supersedes it; frames still in flight from the old link are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    source_id: String,
    link: u64,
}

impl SubscriptionHandle {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

struct ActiveLink {
    link: u64,
    stream: StreamHandle,
}

pub struct RollingAggregator {
    cap: usize,
    series: BTreeMap<String, SourceSeries>,
    links: HashMap<String, ActiveLink>,
    next_link: u64,
    tx: mpsc::Sender<InboundFrame>,
    rx: mpsc::Receiver<InboundFrame>,
}

impl Default for RollingAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingAggregator {
    pub fn new() -> Self {
        Self::with_capacity(MAX_POINTS)
    }

    pub fn with_capacity(cap: usize) -> Self {
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        Self {
            cap,
            series: BTreeMap::new(),
            links: HashMap::new(),
            next_link: 1,
            tx,
            rx,
        }
    }

    /// Make `source_id` known so it shows up in `select` before any data.
    pub fn register(&mut self, source_id: &str) {
        self.series_mut(source_id);
    }

    pub fn ingest(&mut self, source_id: &str, sample: Sample) -> bool {
        let ts = sample.timestamp;
        let accepted = self.series_mut(source_id).push(sample);
        if accepted {
            debug!(source = source_id, ts, "sample ingested");
        } else {
            warn!(source = source_id, ts, "dropping out-of-order sample");
        }
        accepted
    }

    /// Decode `text` (an SSE frame or a bare JSON document) and ingest every
    /// sample it carries. Undecodable payloads are logged and dropped; the
    /// first decode error is returned after the good payloads are ingested.
    pub fn ingest_payload(&mut self, source_id: &str, text: &str) -> Result<usize, DecodeError> {
        let mut ingested = 0;
        let mut first_err = None;
        for payload in stream::frame_payloads(text) {
            match stream::decode_sample(&payload) {
                Ok(sample) => {
                    if self.ingest(source_id, sample) {
                        ingested += 1;
                    }
                }
                Err(e) => {
                    warn!(source = source_id, "dropping malformed frame: {e}");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(ingested),
        }
    }

    /// Every known source with its points for `metric`, ascending by time.
    pub fn select(&self, metric: Metric) -> BTreeMap<String, Vec<Point>> {
        self.series
            .iter()
            .map(|(id, s)| (id.clone(), s.project(metric)))
            .collect()
    }

    pub fn series(&self, source_id: &str) -> Option<&SourceSeries> {
        self.series.get(source_id)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn latest(&self, source_id: &str) -> Option<&Sample> {
        self.series.get(source_id).and_then(SourceSeries::latest)
    }

    /// Open a live stream for `source_id`. Replaces an existing one.
    /// Must be called within a tokio runtime.
    pub fn subscribe(
        &mut self,
        source_id: &str,
        endpoint: &str,
    ) -> Result<SubscriptionHandle, StreamError> {
        let url = stream::stream_url(endpoint)?;
        self.register(source_id);
        let link = self.next_link;
        self.next_link += 1;
        info!(source = source_id, %url, "subscribing");
        let handle = stream::spawn_stream(link, source_id.to_string(), url, self.tx.clone());
        if let Some(old) = self.links.insert(
            source_id.to_string(),
            ActiveLink {
                link,
                stream: handle,
            },
        ) {
            old.stream.close();
        }
        Ok(SubscriptionHandle {
            source_id: source_id.to_string(),
            link,
        })
    }

    /// Close the stream behind `handle`. History is kept. Returns false if the
    /// handle was already superseded or closed.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        match self.links.get(&handle.source_id) {
            Some(active) if active.link == handle.link => {
                self.close_link(&handle.source_id);
                true
            }
            _ => false,
        }
    }

    pub fn unsubscribe_all(&mut self) {
        let ids: Vec<String> = self.links.keys().cloned().collect();
        for id in ids {
            self.close_link(&id);
        }
    }

    pub fn is_subscribed(&self, source_id: &str) -> bool {
        self.links.contains_key(source_id)
    }

    /// Sender for frames from a transport other than the built-in SSE one.
    /// Frames are only accepted for a link returned by `subscribe`.
    pub fn frame_sender(&self) -> mpsc::Sender<InboundFrame> {
        self.tx.clone()
    }

    /// Drain frames that are ready without waiting. Returns the number of
    /// samples ingested.
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Ok(frame) = self.rx.try_recv() {
            n += self.accept(frame);
        }
        n
    }

    /// Wait for the next frame and ingest it.
    pub async fn recv(&mut self) -> usize {
        match self.rx.recv().await {
            Some(frame) => self.accept(frame),
            None => 0,
        }
    }

    pub fn reset(&mut self, source_id: &str) {
        if let Some(s) = self.series.get_mut(source_id) {
            s.clear();
        }
    }

    pub fn reset_all(&mut self) {
        for s in self.series.values_mut() {
            s.clear();
        }
    }

    /// Drop a source entirely: close its stream and remove its history.
    pub fn forget(&mut self, source_id: &str) {
        self.close_link(source_id);
        self.series.remove(source_id);
    }

    fn accept(&mut self, frame: InboundFrame) -> usize {
        let current = self
            .links
            .get(&frame.source_id)
            .is_some_and(|a| a.link == frame.link);
        if !current {
            debug!(source = %frame.source_id, link = frame.link, "ignoring frame from closed link");
            return 0;
        }
        self.ingest_payload(&frame.source_id, &frame.payload)
            .unwrap_or(0)
    }

    fn close_link(&mut self, source_id: &str) {
        if let Some(active) = self.links.remove(source_id) {
            active.stream.close();
            info!(source = source_id, "unsubscribed");
        }
    }

    fn series_mut(&mut self, source_id: &str) -> &mut SourceSeries {
        let cap = self.cap;
        self.series
            .entry(source_id.to_string())
            .or_insert_with(|| SourceSeries::new(cap))
    }
}
