// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scoped scratch storage. Everything written under a `ScratchDir` is deleted
// when it is dropped, on success and error paths alike.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use pdfwerk_core::error::Result;

/// A uniquely named temporary directory.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory under `root` (created if missing). The
    /// directory name starts with `prefix`.
    pub fn new_in(root: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
        debug!(path = %dir.path().display(), "scratch directory created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the directory.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Delete the directory now, reporting failures instead of ignoring them.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!(path = %path.display(), error = %err, "failed to remove scratch directory");
        }
    }
}
