// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared state handed to every request handler.

use std::sync::Arc;

use pdfwerk_core::ServiceConfig;
use pdfwerk_jobs::{Compressor, JobRegistry, SessionRegistry, Splitter};

/// Configuration plus the two orchestrators and their registries. Cheap to
/// clone; everything inside is reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub compressor: Compressor,
    pub splitter: Splitter,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        let config = Arc::new(config);
        let ttl = config.session_ttl();
        let jobs = Arc::new(JobRegistry::new("job", ttl));
        let sessions = Arc::new(SessionRegistry::new("session", ttl));

        Self {
            compressor: Compressor::new(Arc::clone(&config), jobs),
            splitter: Splitter::new(Arc::clone(&config), sessions),
            config,
        }
    }

    /// Drop expired jobs and sessions. Returns `(jobs, sessions)` removed.
    pub fn sweep_expired(&self) -> (usize, usize) {
        (
            self.compressor.jobs().sweep_expired(),
            self.splitter.sessions().sweep_expired(),
        )
    }
}
