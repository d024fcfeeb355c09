// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for pdfwerk.

use thiserror::Error;

/// Top-level error type for all pdfwerk operations.
#[derive(Debug, Error)]
pub enum PdfwerkError {
    // -- User input --
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidRange(String),

    #[error("{0}")]
    NotFound(String),

    // -- Per-item, absorbed by the stage that raised them --
    #[error("image {object_id} could not be recompressed: {reason}")]
    DecodeFailure { object_id: u32, reason: String },

    #[error("external optimizer unavailable")]
    ExternalToolUnavailable,

    #[error("external optimizer failed: {0}")]
    ExternalToolFailed(String),

    // -- Fatal for the job --
    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used by callers to decide how an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caused by the request itself; reported back verbatim.
    InvalidInput,
    /// Unknown or expired session, job, or file.
    NotFound,
    /// One image could not be processed; the job continues.
    DecodeFailure,
    /// External optimizer missing or failed; the pipeline falls back.
    ExternalTool,
    /// The job cannot continue.
    FatalIo,
}

impl PdfwerkError {
    /// Classify this error into an [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::InvalidRange(_) => ErrorKind::InvalidInput,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            Self::ExternalToolUnavailable | Self::ExternalToolFailed(_) => ErrorKind::ExternalTool,
            Self::Pdf(_)
            | Self::Archive(_)
            | Self::Internal(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorKind::FatalIo,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PdfwerkError>;
