// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress reporting for compression jobs.
//
// Workers (including blocking stages) send `ProgressEvent`s down an unbounded
// channel; one drain task per job applies them to the job registry in order.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use pdfwerk_core::types::{CompressionJob, CompressionStage, JobId};

use crate::registry::Registry;

/// Registry of compression jobs keyed by id.
pub type JobRegistry = Registry<JobId, CompressionJob>;

/// One progress update for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub job_id: JobId,
    /// Overall percentage, 0..=100.
    pub progress: u8,
    pub message: String,
    /// New lifecycle stage, if this event enters one.
    pub stage: Option<CompressionStage>,
}

/// The slice of the overall 0..=100 scale a pipeline stage reports into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressBand {
    pub start: u8,
    pub end: u8,
}

impl ProgressBand {
    /// Image recompression.
    pub const IMAGES: Self = Self::new(0, 50);
    /// Structural optimisation.
    pub const STRUCTURE: Self = Self::new(50, 75);
    /// External optimiser pass.
    pub const EXTERNAL: Self = Self::new(75, 95);

    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Map a stage-local percentage onto the overall scale.
    pub fn scale(&self, local: u8) -> u8 {
        let local = local.min(100) as u32;
        let span = self.end.saturating_sub(self.start) as u32;
        self.start + (span * local / 100) as u8
    }
}

/// Sending half handed to the pipeline stages. Cheap to clone; each clone
/// may be moved into a blocking task.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    sender: UnboundedSender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Report stage-local progress inside `band`.
    pub fn report(&self, band: ProgressBand, local: u8, message: impl Into<String>) {
        self.send(band.scale(local), message.into(), None);
    }

    /// Enter a new lifecycle stage at an overall percentage.
    pub fn stage(&self, stage: CompressionStage, progress: u8, message: impl Into<String>) {
        self.send(progress, message.into(), Some(stage));
    }

    /// Mark the job failed. The progress it had reached is kept.
    pub fn fail(&self, reason: impl Into<String>) {
        self.send(0, "Compression failed".into(), Some(CompressionStage::Failed(reason.into())));
    }

    fn send(&self, progress: u8, message: String, stage: Option<CompressionStage>) {
        let event = ProgressEvent {
            job_id: self.job_id,
            progress: progress.min(100),
            message,
            stage,
        };
        // The drain task only stops once every reporter is gone.
        if self.sender.send(event).is_err() {
            warn!(job_id = %self.job_id, "progress channel closed");
        }
    }
}

/// Handle to a job's drain task.
pub struct ProgressDrain {
    handle: JoinHandle<()>,
}

impl ProgressDrain {
    /// Wait until every event sent before the last reporter was dropped has
    /// been applied.
    pub async fn finish(self) {
        if let Err(err) = self.handle.await {
            warn!(error = %err, "progress drain task failed");
        }
    }
}

/// Open a progress channel for `job_id` whose events land in `jobs`.
///
/// Events for a job no longer in the registry (deleted after a failure) are
/// discarded, so a late event never resurrects an entry. Each applied event
/// is also forwarded to `observer`, carrying the progress the job ended up
/// with.
pub fn channel(
    job_id: JobId,
    jobs: Arc<JobRegistry>,
    observer: Option<UnboundedSender<ProgressEvent>>,
) -> (ProgressReporter, ProgressDrain) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let handle = tokio::spawn(drain(receiver, jobs, observer));
    (ProgressReporter { job_id, sender }, ProgressDrain { handle })
}

async fn drain(
    mut receiver: UnboundedReceiver<ProgressEvent>,
    jobs: Arc<JobRegistry>,
    observer: Option<UnboundedSender<ProgressEvent>>,
) {
    while let Some(mut event) = receiver.recv().await {
        match jobs.update(&event.job_id, |job| apply(job, &event)) {
            Ok(progress) => {
                event.progress = progress;
                if let Some(observer) = &observer
                    && observer.send(event).is_err()
                {
                    debug!("progress observer dropped");
                }
            }
            Err(_) => debug!(job_id = %event.job_id, "progress for unknown job dropped"),
        }
    }
}

/// Progress never moves backwards.
fn apply(job: &mut CompressionJob, event: &ProgressEvent) -> u8 {
    job.progress = job.progress.max(event.progress);
    job.message.clone_from(&event.message);
    if let Some(stage) = &event.stage {
        job.stage = stage.clone();
    }
    job.progress
}
