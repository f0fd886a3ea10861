//! HTTP data plane.
//!
//! Thin conversion layer between wire bodies and the in-memory types:
//!
//! - `POST /delta` - inbound gossip (the unicast channel's receive side)
//! - `POST /sensor` - inject a local reading through the admission policy
//! - `GET /state` - the converged fire picture
//! - `GET /stats` - gossip counters and liveness figures
//! - `GET /neighbors` - the live peer table
//! - `GET /health` - probe endpoint
//!
//! Malformed bodies are counted and answered with a 4xx, never propagated
//! into the core.

use crate::error::Result;
use crate::gossip::GossipEngine;
use crate::message::{headers as wire, DeltaMessage};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use ember_state::SensorReading;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiContext {
    engine: Arc<GossipEngine>,
    started_at: Instant,
}

impl ApiContext {
    pub fn new(engine: Arc<GossipEngine>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }

    fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub fn router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/delta", post(receive_delta))
        .route("/sensor", post(submit_reading))
        .route("/state", get(current_state))
        .route("/stats", get(stats))
        .route("/neighbors", get(neighbors))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve the data plane until shutdown fires.
pub async fn serve(
    listener: TcpListener,
    ctx: ApiContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "data plane listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

async fn receive_delta(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // Header short-circuit: a known message id means the body is not worth
    // decoding.
    let header_id = headers
        .get(wire::MESSAGE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok());
    if let Some(id) = header_id {
        if ctx.engine.already_seen(&id) {
            ctx.engine.record_dropped();
            return StatusCode::OK;
        }
    }

    match serde_json::from_slice::<DeltaMessage>(&body) {
        Ok(message) => {
            ctx.engine.handle_message(message).await;
            StatusCode::OK
        }
        Err(err) => {
            warn!(error = %err, "malformed delta body dropped");
            ctx.engine.record_dropped();
            StatusCode::BAD_REQUEST
        }
    }
}

async fn submit_reading(
    State(ctx): State<ApiContext>,
    Json(reading): Json<SensorReading>,
) -> Json<Value> {
    let outcome = ctx.engine.state().write().apply_reading(&reading);
    Json(json!({ "result": outcome }))
}

async fn current_state(State(ctx): State<ApiContext>) -> Json<Value> {
    let (node_id, fires) = {
        let state = ctx.engine.state().read();
        (state.node_id().to_string(), state.active_fires())
    };
    Json(json!({
        "node_id": node_id,
        "count": fires.len(),
        "fires": fires,
    }))
}

async fn stats(State(ctx): State<ApiContext>) -> Json<Value> {
    let stats = ctx.engine.stats();
    let active_cells = ctx.engine.state().read().active_count();
    Json(json!({
        "node_id": ctx.engine.node_id(),
        "gossip": stats,
        "active_cells": active_cells,
        "live_neighbors": ctx.engine.neighbors().live_neighbors().len(),
        "uptime_seconds": ctx.uptime_seconds(),
    }))
}

async fn neighbors(State(ctx): State<ApiContext>) -> Json<Value> {
    let peers: Vec<Value> = ctx
        .engine
        .neighbors()
        .live_neighbors()
        .into_iter()
        .map(|n| {
            json!({
                "node_id": n.node_id,
                "address": format!("{}:{}", n.ip, n.data_port),
                "seconds_since_seen": n.seconds_since_seen(),
            })
        })
        .collect();
    Json(json!({ "count": peers.len(), "neighbors": peers }))
}

async fn health(State(ctx): State<ApiContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "node_id": ctx.engine.node_id(),
        "uptime_seconds": ctx.uptime_seconds(),
    }))
}
