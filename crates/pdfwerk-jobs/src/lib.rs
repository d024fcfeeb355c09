// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pdfwerk-jobs — Orchestration for the pdfwerk service.
//
// Runs compression jobs and split requests on top of pdfwerk-document, reports
// compression progress, and keeps jobs and download sessions in expiring
// registries.

pub mod compress;
pub mod progress;
pub mod registry;
pub mod scratch;
pub mod split;

pub use compress::{CompressionOutcome, Compressor};
pub use progress::{JobRegistry, ProgressBand, ProgressEvent, ProgressReporter};
pub use registry::Registry;
pub use scratch::ScratchDir;
pub use split::{SessionRegistry, SplitFile, SplitSession, Splitter};
