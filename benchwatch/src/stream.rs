//! SSE client side: frame decoding and the per-source connection task.
//!
//! A connection task reads `text/event-stream` bytes, cuts them into events
//! and forwards each event's data to the aggregator's owner over a channel.
//! Dropped connections are retried with capped exponential backoff.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{DecodeError, StreamError};
use crate::types::Sample;

pub const STREAM_SUFFIX: &str = "/benchmark/stream";

const BACKOFF_START: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest event (pending line or joined data) the decoder will hold.
pub const MAX_EVENT_BYTES: usize = 64 * 1024;

/// Event data received from one source.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub link: u64,
    pub source_id: String,
    pub payload: String,
}

/// Stream URL for a configured endpoint: everything from `/benchmark` on is
/// replaced by `/benchmark/stream`.
pub fn stream_url(endpoint: &str) -> Result<Url, StreamError> {
    let invalid = |reason: String| StreamError::InvalidUrl {
        url: endpoint.to_string(),
        reason,
    };
    let mut url = Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    let path = url.path().to_string();
    let base = match path.find("/benchmark") {
        Some(i) => &path[..i],
        None => path.trim_end_matches('/'),
    };
    url.set_path(&format!("{base}{STREAM_SUFFIX}"));
    url.set_query(None);
    Ok(url)
}

/// Incremental `text/event-stream` decoder. Feed raw chunks, get back the
/// data of every completed event. Only `data:` fields matter here; comments
/// and other fields are skipped. An event larger than [`MAX_EVENT_BYTES`] is
/// discarded up to the next blank line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
    data_len: usize,
    skipping: bool,
    dropped: u64,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(ev) = self.feed_line(line) {
                out.push(ev);
            }
        }
        if self.buf.len() > MAX_EVENT_BYTES {
            self.buf.clear();
            self.discard_event();
        }
        out
    }

    /// Bytes held for the event in progress.
    pub fn buffered(&self) -> usize {
        self.buf.len() + self.data_len
    }

    /// Events discarded for exceeding the size limit.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Flush an event left open at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.skipping {
            self.reset();
            return None;
        }
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.feed_line(line.trim_end_matches('\r'));
        }
        self.dispatch()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.data.clear();
        self.data_len = 0;
        self.skipping = false;
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.skipping {
                self.skipping = false;
                return None;
            }
            return self.dispatch();
        }
        if self.skipping || line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        if field == "data" {
            self.data_len += value.len() + 1;
            if self.data_len > MAX_EVENT_BYTES {
                self.discard_event();
                return None;
            }
            self.data.push(value.to_string());
        }
        None
    }

    fn discard_event(&mut self) {
        if !self.skipping {
            self.dropped += 1;
            warn!(limit = MAX_EVENT_BYTES, "dropping oversized event");
        }
        self.data.clear();
        self.data_len = 0;
        self.skipping = true;
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let ev = self.data.join("\n");
        self.data.clear();
        self.data_len = 0;
        Some(ev)
    }
}

/// Event payloads inside `text`: either SSE framed (`data: ...`) or one bare
/// JSON document.
pub fn frame_payloads(text: &str) -> Vec<String> {
    let trimmed = text.trim_start();
    if trimmed.starts_with("data:") || trimmed.starts_with(':') {
        let mut d = SseDecoder::new();
        let mut out = d.feed(text.as_bytes());
        out.extend(d.finish());
        out
    } else if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![text.to_string()]
    }
}

pub fn decode_sample(payload: &str) -> Result<Sample, DecodeError> {
    if payload.trim().is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_str(payload)?)
}

/// Owns one connection task; closing or dropping it stops the task.
#[derive(Debug)]
pub struct StreamHandle {
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn close(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Connect to `url` and forward events until the receiver goes away.
/// Must be called within a tokio runtime.
pub fn spawn_stream(
    link: u64,
    source_id: String,
    url: Url,
    tx: mpsc::Sender<InboundFrame>,
) -> StreamHandle {
    StreamHandle {
        task: tokio::spawn(run_stream(link, source_id, url, tx)),
    }
}

enum Ended {
    // remote closed the stream
    Eof,
    // the aggregator side is gone
    ReceiverClosed,
}

async fn run_stream(link: u64, source_id: String, url: Url, tx: mpsc::Sender<InboundFrame>) {
    let client = match reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(source = %source_id, "cannot build http client: {e}");
            return;
        }
    };

    let mut backoff = BACKOFF_START;
    loop {
        match connect_once(&client, link, &source_id, &url, &tx, &mut backoff).await {
            Ok(Ended::ReceiverClosed) => return,
            Ok(Ended::Eof) => info!(source = %source_id, "stream ended by remote"),
            Err(e) => warn!(source = %source_id, "stream error: {e}"),
        }
        if tx.is_closed() {
            return;
        }
        debug!(source = %source_id, "reconnecting in {:?}", backoff);
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(BACKOFF_MAX);
    }
}

async fn connect_once(
    client: &reqwest::Client,
    link: u64,
    source_id: &str,
    url: &Url,
    tx: &mpsc::Sender<InboundFrame>,
    backoff: &mut Duration,
) -> Result<Ended, StreamError> {
    let res = client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?;
    if !res.status().is_success() {
        return Err(StreamError::Status(res.status().as_u16()));
    }
    info!(source = %source_id, %url, "stream connected");
    *backoff = BACKOFF_START;

    let mut decoder = SseDecoder::new();
    let mut body = res.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for payload in decoder.feed(&chunk) {
            let frame = InboundFrame {
                link,
                source_id: source_id.to_string(),
                payload,
            };
            if tx.send(frame).await.is_err() {
                return Ok(Ended::ReceiverClosed);
            }
        }
    }
    Ok(Ended::Eof)
}
