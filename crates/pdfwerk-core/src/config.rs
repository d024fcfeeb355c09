// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{CompressionProfile, ReencodePolicy};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "PDFWERK_CONFIG";

/// Environment variable overriding the bind address (host part).
pub const BIND_ENV: &str = "PDFWERK_BIND";

/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "PORT";

/// Runtime settings for the compression pipeline, the split sessions, and the
/// HTTP listener. Missing fields in a config file fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// Port for the HTTP server (default 5000).
    pub port: u16,
    /// JPEG quality used when the request does not specify one.
    pub default_image_quality: u8,
    /// Longest allowed image side in pixels before downsampling.
    pub max_image_dimension: u32,
    /// Images whose raw stream is smaller than this are left alone.
    pub small_image_threshold: usize,
    /// Whether JPEG images are re-encoded.
    pub reencode_policy: ReencodePolicy,
    /// Run Ghostscript as a final pass when it is installed.
    pub external_optimizer_enabled: bool,
    /// Linearize the structural output with qpdf when it is installed.
    pub linearize_enabled: bool,
    /// Ghostscript `-dPDFSETTINGS` profile.
    pub external_profile: CompressionProfile,
    /// Deadline for each external subprocess (Ghostscript, qpdf), in seconds.
    pub external_timeout_secs: u64,
    /// Lifetime of split sessions (and stale compression jobs), in seconds.
    pub session_ttl_secs: u64,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
    /// Parent directory for scratch and session directories. `None` uses the
    /// system temp directory.
    pub scratch_root: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 5000,
            default_image_quality: 50,
            max_image_dimension: 1500,
            small_image_threshold: 50 * 1024,
            reencode_policy: ReencodePolicy::SkipAlreadyLossy,
            external_optimizer_enabled: true,
            linearize_enabled: true,
            external_profile: CompressionProfile::Ebook,
            external_timeout_secs: 120,
            session_ttl_secs: 3600,
            max_upload_bytes: 100 * 1024 * 1024,
            scratch_root: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration: the JSON file named by `PDFWERK_CONFIG` (if any),
    /// then `PDFWERK_BIND` / `PORT` overrides.
    pub fn load() -> Self {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => match Self::from_file(&path) {
                Ok(config) => {
                    info!(path = %path, "configuration loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "unreadable config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.bind_address = bind;
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            match port.parse() {
                Ok(p) => config.port = p,
                Err(_) => warn!(port = %port, "ignoring non-numeric PORT"),
            }
        }
        config
    }

    /// Read a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Socket address for the HTTP listener, falling back to all interfaces
    /// when `bind_address` does not parse.
    pub fn listen_addr(&self) -> SocketAddr {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .unwrap_or_else(|_| {
                warn!(bind = %self.bind_address, "invalid bind address, using 0.0.0.0");
                SocketAddr::from(([0, 0, 0, 0], self.port))
            })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }

    /// Directory under which scratch and session directories are created.
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
