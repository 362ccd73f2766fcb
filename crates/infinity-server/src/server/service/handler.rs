//! Routes for streaming arbitrarily long JSON arrays.
//!
//! | Route                                | Policy                          |
//! |--------------------------------------|---------------------------------|
//! | `GET /infinity/unsafe/{count}`       | materialize, then send once     |
//! | `GET /infinity/safe/{count}`         | flush after every record        |
//! | `GET /infinity/safe2/{count}?every=K`| flush after every `K` records   |
//! | `GET /health`                        | liveness                        |
//!
//! The unsafe route exists to demonstrate the failure mode the other two
//! avoid: its memory grows with `count` and it is capped by
//! `MAX_BUFFERED_RECORDS`.
//!
//! Counts and intervals are validated before the response head is sent, so
//! a bad request is a plain 400. Streaming responses are sent chunked with no
//! `Content-Length`.

use super::{error::ApiError, state::AppState};
use crate::server::streaming::coordinator::{StreamOptions, spawn_stream};
use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use infinity::{Error, FlushPolicy, MemorySink, RandomPayload, RecordSource, StreamingEncoder};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

const JSON_UTF8: &str = "application/json; charset=utf-8";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/infinity/unsafe/{count}", get(stream_unsafe))
        .route("/infinity/safe/{count}", get(stream_safe))
        .route("/infinity/safe2/{count}", get(stream_safe2))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct EveryParams {
    every: Option<i64>,
}

async fn stream_unsafe(
    State(state): State<AppState>,
    Path(count): Path<i64>,
) -> Result<Response, ApiError> {
    let policy = FlushPolicy::unbounded(state.config.max_buffered_records);
    respond(&state, count, policy).await
}

async fn stream_safe(
    State(state): State<AppState>,
    Path(count): Path<i64>,
) -> Result<Response, ApiError> {
    respond(&state, count, FlushPolicy::EveryRecord).await
}

async fn stream_safe2(
    State(state): State<AppState>,
    Path(count): Path<i64>,
    Query(params): Query<EveryParams>,
) -> Result<Response, ApiError> {
    let policy = match params.every {
        Some(k) => FlushPolicy::every(k)?,
        None => FlushPolicy::EveryN(state.config.flush_interval),
    };
    respond(&state, count, policy).await
}

async fn health(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.lifecycle.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "not serving")
    } else {
        (StatusCode::OK, "serving")
    }
}

/// Validates the request, then either streams the array or, for the
/// unbounded policy, builds the whole body before answering.
#[tracing::instrument(skip(state))]
async fn respond(state: &AppState, count: i64, policy: FlushPolicy) -> Result<Response, ApiError> {
    let inflight = state.lifecycle.begin_stream()?;
    let source = RecordSource::try_new(count, RandomPayload)?;

    if let Some(max) = state.config.max_records {
        if source.count() > max {
            return Err(Error::Configuration {
                reason: format!("Count {count} exceeds maximum allowed ({max})"),
            }
            .into());
        }
    }

    let cancel = state.lifecycle.stream_token();

    if policy.is_streaming() {
        let options = StreamOptions {
            buffer: state.config.stream_buffer_size,
            timeout: state.config.stream_timeout,
        };
        let body = spawn_stream(source, policy, cancel, options, inflight);
        return Ok(json(Body::from_stream(body)));
    }

    // The unsafe path must finish before the head is sent so that a blown
    // ceiling can still become a 500.
    let mut sink = MemorySink::new();
    let summary = StreamingEncoder::new(policy)
        .with_cancellation(cancel)
        .encode(source, &mut sink)
        .await?;
    tracing::debug!(
        records = summary.records,
        peak_working_bytes = summary.peak_working_bytes,
        "Materialized response"
    );
    drop(inflight);

    Ok(json(Body::from(sink.into_delivered())))
}

fn json(body: Body) -> Response {
    ([(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8))], body).into_response()
}
