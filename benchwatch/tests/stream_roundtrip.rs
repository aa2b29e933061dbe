//! Agent -> viewer: frames encoded by the agent decode unchanged, and a live
//! subscription against an in-process agent fills the aggregator.

use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::Duration;

use benchwatch::history::SourceSeries;
use benchwatch::stream::{decode_sample, SseDecoder};
use benchwatch::{Metric, RollingAggregator};
use benchwatch_agent::config::AgentConfig;
use benchwatch_agent::cpu::{CpuEstimator, DEFAULT_TIMING_BASELINE};
use benchwatch_agent::publisher::encode_sse_frame;
use benchwatch_agent::sampler::{ProcessMemory, Sampler};
use benchwatch_agent::state::AppState;
use benchwatch_agent::types::Sample as AgentSample;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[test]
fn agent_frame_decodes_field_for_field() {
    let sent = AgentSample {
        latency: 5.123456789,
        memory_usage: Some(41.2109375),
        throughput: 195_182.33,
        cpu_usage: 37.5,
        timestamp: 1_700_000_000_123,
    };
    let frame = encode_sse_frame(&sent).unwrap();

    // split mid-frame to exercise buffering
    let (a, b) = frame.split_at(frame.len() / 2);
    let mut d = SseDecoder::new();
    let mut payloads = d.feed(a);
    payloads.extend(d.feed(b));
    assert_eq!(payloads.len(), 1);

    let got = decode_sample(&payloads[0]).unwrap();
    assert_eq!(got.latency, sent.latency);
    assert_eq!(got.memory_usage, sent.memory_usage);
    assert_eq!(got.throughput, sent.throughput);
    assert_eq!(got.cpu_usage, Some(sent.cpu_usage));
    assert_eq!(got.timestamp, sent.timestamp);
}

#[test]
fn missing_memory_stays_missing() {
    let sent = AgentSample {
        latency: 1.0,
        memory_usage: None,
        throughput: 2.0,
        cpu_usage: 0.0,
        timestamp: 3,
    };
    let frame = encode_sse_frame(&sent).unwrap();
    let mut agg = RollingAggregator::new();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert_eq!(agg.ingest_payload("a", &text).unwrap(), 1);
    assert!(agg.select(Metric::MemoryUsage)["a"].is_empty());
    assert_eq!(agg.select(Metric::Throughput)["a"].len(), 1);
}

fn agent_state() -> AppState {
    let cfg = AgentConfig {
        interval: Duration::from_millis(100),
        ..AgentConfig::default()
    };
    let sampler = Sampler::new(
        CpuEstimator::timing(DEFAULT_TIMING_BASELINE),
        Box::new(ProcessMemory::new()),
    )
    .with_iterations(10_000);
    AppState::new(sampler, &cfg)
}

/// Run an agent on its own runtime thread. Stopping it drops that runtime,
/// which closes every open connection too.
fn start_agent_thread(addr: SocketAddr) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<()>) {
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let thread = std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = TcpListener::bind(addr).await.expect("bind agent");
            ready_tx.send(listener.local_addr().unwrap()).unwrap();
            benchwatch_agent::serve(listener, agent_state(), async {
                let _ = stop_rx.await;
            })
            .await
            .unwrap();
        });
    });
    let bound = ready_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("agent bound");
    (bound, stop_tx, thread)
}

async fn stop_agent_thread(stop: oneshot::Sender<()>, thread: JoinHandle<()>) {
    let _ = stop.send(());
    tokio::task::spawn_blocking(move || thread.join())
        .await
        .unwrap()
        .expect("agent thread exits cleanly");
}

fn series_len(agg: &RollingAggregator, id: &str) -> usize {
    agg.series(id).map(SourceSeries::len).unwrap_or(0)
}

#[tokio::test]
async fn live_subscription_fills_history_and_survives_unsubscribe() {
    let state = agent_state();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(benchwatch_agent::serve(listener, state, async {
        let _ = stop_rx.await;
    }));

    let mut agg = RollingAggregator::new();
    agg.register("idle");
    let handle = agg
        .subscribe("live", &format!("http://{addr}/benchmark"))
        .unwrap();

    let mut got = 0;
    tokio::time::timeout(Duration::from_secs(10), async {
        while got < 3 {
            got += agg.recv().await;
        }
    })
    .await
    .expect("three samples within the deadline");

    assert!(agg.unsubscribe(&handle));
    let sel = agg.select(Metric::Latency);
    assert!(sel["live"].len() >= 3);
    assert!(sel["idle"].is_empty());
    let ts: Vec<i64> = sel["live"].iter().map(|p| p.timestamp).collect();
    assert!(ts.windows(2).all(|w| w[0] <= w[1]));
    assert!(sel["live"].iter().all(|p| p.value > 0.0));

    let _ = stop_tx.send(());
}

#[tokio::test]
async fn stream_resumes_after_agent_restart() {
    let (addr, stop, thread) = start_agent_thread("127.0.0.1:0".parse().unwrap());
    let mut agg = RollingAggregator::new();
    agg.subscribe("live", &format!("http://{addr}/benchmark"))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while series_len(&agg, "live") < 2 {
            agg.recv().await;
        }
    })
    .await
    .expect("samples before the restart");

    stop_agent_thread(stop, thread).await;
    agg.pump();
    let before = series_len(&agg, "live");

    let restarted_at = chrono::Utc::now().timestamp_millis();
    let (again, stop, thread) = start_agent_thread(addr);
    assert_eq!(again, addr);

    tokio::time::timeout(Duration::from_secs(20), async {
        while agg.latest("live").map_or(true, |s| s.timestamp < restarted_at) {
            agg.recv().await;
        }
    })
    .await
    .expect("samples after the restart");

    assert!(agg.is_subscribed("live"));
    assert!(series_len(&agg, "live") > before);
    stop_agent_thread(stop, thread).await;
}
