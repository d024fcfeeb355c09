// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pdfwerk — PDF compression and splitting service
//
// Entry point. Initialises logging, loads configuration, and serves the HTTP
// API until the process is stopped.

mod error;
mod routes;
mod state;
mod upload;

use pdfwerk_core::ServiceConfig;
use pdfwerk_document::OptimizerAvailability;

use state::AppState;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("pdfwerk starting");

    let config = ServiceConfig::load();
    if config.external_optimizer_enabled {
        // Probe once up front so the first request does not pay for it.
        if !OptimizerAvailability::cached().is_available() {
            tracing::warn!("ghostscript not found, compression will use the built-in stages only");
        }
    }
    if config.linearize_enabled && !OptimizerAvailability::cached_linearizer().is_available() {
        tracing::info!("qpdf not found, output will not be linearized");
    }

    let addr = config.listen_addr();
    let app = routes::router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).await
}
