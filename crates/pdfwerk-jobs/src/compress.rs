// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compression orchestrator: image recompression, structural optimisation,
// optional qpdf linearization and an optional Ghostscript pass, with progress
// reported into the job registry.
//
// Stage outputs live in a per-job scratch directory that is removed on every
// exit path. A job whose pipeline fails is removed from the registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, instrument, warn};

use pdfwerk_core::ServiceConfig;
use pdfwerk_core::error::{PdfwerkError, Result};
use pdfwerk_core::types::{CompressionJob, CompressionResult, CompressionStage, JobId};
use pdfwerk_document::external::{OptimizerAvailability, try_linearize_with, try_optimize_with};
use pdfwerk_document::pdf::{PdfDocument, RecompressOptions, RecompressionStats, optimize, recompress};

use crate::progress::{self, JobRegistry, ProgressBand, ProgressEvent, ProgressReporter};
use crate::scratch::ScratchDir;

/// A finished compression.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub job_id: JobId,
    pub result: CompressionResult,
    /// The compressed document.
    pub output: Vec<u8>,
    pub images: RecompressionStats,
    /// Whether the Ghostscript output was kept.
    pub externally_optimized: bool,
}

/// Runs compression jobs against a shared job registry.
#[derive(Clone)]
pub struct Compressor {
    config: Arc<ServiceConfig>,
    jobs: Arc<JobRegistry>,
    /// Overrides the process-wide Ghostscript lookup.
    external: Option<OptimizerAvailability>,
    /// Overrides the process-wide qpdf lookup.
    linearizer: Option<OptimizerAvailability>,
    observer: Option<UnboundedSender<ProgressEvent>>,
}

impl Compressor {
    pub fn new(config: Arc<ServiceConfig>, jobs: Arc<JobRegistry>) -> Self {
        Self {
            config,
            jobs,
            external: None,
            linearizer: None,
            observer: None,
        }
    }

    /// Use `availability` instead of searching the host for Ghostscript.
    pub fn with_external(mut self, availability: OptimizerAvailability) -> Self {
        self.external = Some(availability);
        self
    }

    /// Use `availability` instead of searching the host for qpdf.
    pub fn with_linearizer(mut self, availability: OptimizerAvailability) -> Self {
        self.linearizer = Some(availability);
        self
    }

    /// Receive every progress event once it has been applied to its job.
    pub fn with_progress_observer(mut self, observer: UnboundedSender<ProgressEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    /// Compress `input` as job `job_id` with the given JPEG quality (1..=100).
    ///
    /// The job is registered for progress polling while it runs and removed
    /// once it finishes, whatever the outcome. An id that belongs to a job
    /// still running is refused.
    #[instrument(skip(self, input), fields(job_id = %job_id, input_len = input.len()))]
    pub async fn compress(&self, job_id: JobId, input: Vec<u8>, quality: u8) -> Result<CompressionOutcome> {
        if !(1..=100).contains(&quality) {
            return Err(PdfwerkError::InvalidInput(format!(
                "image quality must be between 1 and 100, got {quality}"
            )));
        }
        if input.is_empty() {
            return Err(PdfwerkError::InvalidInput("uploaded file is empty".into()));
        }

        self.jobs.put_new(job_id, CompressionJob::new(job_id))?;
        let (reporter, drain) = progress::channel(job_id, Arc::clone(&self.jobs), self.observer.clone());

        let outcome = self.run(&reporter, input, quality).await;
        match &outcome {
            Ok(done) => {
                reporter.stage(CompressionStage::Done, 100, "Compression complete");
                info!(
                    original = done.result.original_size,
                    compressed = done.result.compressed_size,
                    ratio = done.result.ratio,
                    "compression finished"
                );
            }
            Err(err) => {
                reporter.fail(err.to_string());
                error!(error = %err, "compression failed");
            }
        }

        drop(reporter);
        drain.finish().await;
        self.jobs.delete(&job_id);
        outcome
    }

    async fn run(&self, reporter: &ProgressReporter, input: Vec<u8>, quality: u8) -> Result<CompressionOutcome> {
        let scratch = ScratchDir::new_in(self.config.scratch_root(), "pdfwerk-compress-")?;
        let structural_path = scratch.join("structural.pdf");
        let external_path = scratch.join("external.pdf");
        let original_size = input.len() as u64;
        tokio::fs::write(scratch.join(INPUT_FILE), &input).await?;

        let images = {
            let options = RecompressOptions::from_config(&self.config, quality);
            let reporter = reporter.clone();
            let structural_path = structural_path.clone();
            tokio::task::spawn_blocking(move || {
                internal_stages(&input, &options, &reporter, &structural_path)
            })
            .await
            .map_err(|err| PdfwerkError::Internal(format!("compression task failed: {err}")))??
        };

        let structural_path = self
            .linearize_stage(reporter, structural_path, scratch.join("linearized.pdf"))
            .await;
        reporter.stage(
            CompressionStage::StructurallyOptimized,
            ProgressBand::STRUCTURE.end,
            "PDF structure optimized",
        );

        let externally_optimized = self.external_stage(reporter, &structural_path, &external_path).await;
        let final_path = if externally_optimized { &external_path } else { &structural_path };
        let mut output = tokio::fs::read(final_path).await?;

        if output.len() as u64 >= original_size {
            warn!(
                original = original_size,
                compressed = output.len(),
                "output is not smaller, returning the original"
            );
            output = tokio::fs::read(scratch.join(INPUT_FILE)).await?;
        }

        scratch.close();
        Ok(CompressionOutcome {
            job_id: reporter.job_id(),
            result: CompressionResult::new(original_size, output.len() as u64),
            output,
            images,
            externally_optimized,
        })
    }

    /// Linearize the structural output with qpdf. Returns the file later
    /// stages should read.
    async fn linearize_stage(
        &self,
        reporter: &ProgressReporter,
        structural_path: PathBuf,
        linearized_path: PathBuf,
    ) -> PathBuf {
        if !self.config.linearize_enabled {
            return structural_path;
        }

        reporter.report(ProgressBand::STRUCTURE, 60, "Linearizing PDF");
        let availability = self
            .linearizer
            .as_ref()
            .unwrap_or_else(|| OptimizerAvailability::cached_linearizer());
        let linearized = try_linearize_with(
            availability,
            &structural_path,
            &linearized_path,
            self.config.external_timeout(),
        )
        .await;

        if linearized {
            info!("structural output linearized");
            linearized_path
        } else {
            structural_path
        }
    }

    /// Run Ghostscript over the structural output. Returns whether its output
    /// should be used.
    async fn external_stage(
        &self,
        reporter: &ProgressReporter,
        structural_path: &Path,
        external_path: &Path,
    ) -> bool {
        if !self.config.external_optimizer_enabled {
            reporter.stage(
                CompressionStage::ExternalOptimizerUnavailable,
                ProgressBand::EXTERNAL.end,
                "External optimizer disabled",
            );
            return false;
        }

        reporter.report(ProgressBand::EXTERNAL, 0, "Running external optimizer");
        let availability = self.external.as_ref().unwrap_or_else(|| OptimizerAvailability::cached());
        let ran = try_optimize_with(
            availability,
            structural_path,
            external_path,
            self.config.external_profile,
            self.config.external_timeout(),
        )
        .await;

        let smaller = ran && file_len(external_path).await < file_len(structural_path).await;
        if smaller {
            reporter.stage(
                CompressionStage::ExternallyOptimized,
                ProgressBand::EXTERNAL.end,
                "External optimization applied",
            );
        } else {
            if ran {
                info!("external output not smaller, keeping structural output");
            }
            reporter.stage(
                CompressionStage::ExternalOptimizerUnavailable,
                ProgressBand::EXTERNAL.end,
                "External optimization skipped",
            );
        }
        smaller
    }
}

/// Name of the copy of the upload kept in the scratch directory.
const INPUT_FILE: &str = "input.pdf";

/// The blocking part of the pipeline: open, recompress images, optimise, and
/// write the structural output. The document is released when this returns.
fn internal_stages(
    input: &[u8],
    options: &RecompressOptions,
    reporter: &ProgressReporter,
    structural_path: &Path,
) -> Result<RecompressionStats> {
    let mut doc = PdfDocument::from_bytes(input)?;

    let stats = recompress(&mut doc, options, |local, message| {
        reporter.report(ProgressBand::IMAGES, local, message);
    });
    reporter.stage(CompressionStage::ImagesCompressed, ProgressBand::IMAGES.end, "Images compressed");

    reporter.report(ProgressBand::STRUCTURE, 0, "Optimizing PDF structure");
    optimize(&mut doc, structural_path)?;

    Ok(stats)
}

async fn file_len(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|meta| meta.len()).unwrap_or(u64::MAX)
}
