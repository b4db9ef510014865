// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pull-based metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub const METRICS_PATH: &str = "/metrics";
pub const PING_PATH: &str = "/ping";

pub fn make_router(registry: Registry) -> Router {
    Router::new()
        .route(METRICS_PATH, get(metrics_handler))
        .route(PING_PATH, get(|| async { "pong" }))
        .with_state(registry)
}

/// Serve the prometheus registry as a text endpoint for scraping.
pub fn start_metrics_server(socket_address: SocketAddr, registry: Registry) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(socket_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("can't bind metrics server to {}: {}", socket_address, e);
                return;
            }
        };
        info!("metrics server listening on {}", socket_address);
        if let Err(e) = axum::serve(listener, make_router(registry).into_make_service()).await {
            error!("metrics serve error: {}", e);
        }
    })
}

async fn metrics_handler(State(registry): State<Registry>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&registry.gather()) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
