//! HTTP surface: health, single benchmark, SSE stream, permissive CORS.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::publisher::{SseChannelSink, Subscription};
use crate::sampler::sample_shared;
use crate::state::AppState;
use crate::types::{Health, Sample};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/benchmark", get(benchmark))
        .route("/benchmark/stream", get(stream))
        .fallback(not_found)
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health::ok(&state.service_name))
}

async fn benchmark(State(state): State<AppState>) -> Result<Json<Sample>, StatusCode> {
    sample_shared(&state.sampler).await.map(Json).map_err(|e| {
        warn!("sampling failed: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
        .into_response()
}

async fn stream(State(state): State<AppState>) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(state.stream_buffer);
    let subscription = state.publisher.open(SseChannelSink::new(tx));
    info!(subscription = subscription.id(), "stream client connected");

    let mut res = Response::new(Body::from_stream(SubscriberStream { rx, subscription }));
    let h = res.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("x-accel-buffering", HeaderValue::from_static("no"));
    res
}

// Response body of one stream client. The body is dropped when the client
// goes away, which drops (and so cancels) the subscription.
struct SubscriberStream {
    rx: mpsc::Receiver<Bytes>,
    subscription: Subscription,
}

impl Stream for SubscriberStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

impl Drop for SubscriberStream {
    fn drop(&mut self) {
        info!(
            subscription = self.subscription.id(),
            "stream client disconnected"
        );
    }
}

async fn cors(req: Request, next: Next) -> Response {
    let mut res = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    apply_cors_headers(res.headers_mut());
    res
}

fn apply_cors_headers(h: &mut HeaderMap) {
    h.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    h.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    h.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Accept, Authorization, X-Requested-With"),
    );
    h.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}
