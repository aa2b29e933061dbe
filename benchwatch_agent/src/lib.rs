//! benchwatch agent: samples a synthetic CPU-bound benchmark and serves the
//! results over HTTP, one-shot (`/benchmark`) or as an SSE push stream
//! (`/benchmark/stream`).

pub mod config;
pub mod cpu;
pub mod error;
pub mod http;
pub mod publisher;
pub mod sampler;
pub mod state;
pub mod types;

use std::future::{Future, IntoFuture};

use tokio::net::TcpListener;

use crate::state::AppState;

/// Serve the agent on an already bound listener until `shutdown` resolves.
/// Open streams are dropped on shutdown rather than drained; they never end
/// on their own.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = axum::serve(listener, http::router(state)).into_future();
    tokio::select! {
        res = server => res,
        _ = shutdown => Ok(()),
    }
}
