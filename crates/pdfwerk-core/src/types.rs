// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the pdfwerk service.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PdfwerkError;

/// Unique identifier for a compression job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = PdfwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| PdfwerkError::InvalidInput(format!("invalid job id: {s}")))
    }
}

/// Unique identifier for a split session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = PdfwerkError;

    /// Unparseable ids read as unknown sessions rather than bad input, so a
    /// mangled download link gets the same 404 as an expired one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| PdfwerkError::NotFound(format!("session {s} not found")))
    }
}

/// A validated, 1-indexed inclusive page range.
///
/// `pages` holds the zero-indexed page numbers `start - 1 ..= end - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
    pub pages: Vec<u32>,
}

impl PageRange {
    /// Build a range, checking `1 <= start <= end <= total_pages`.
    pub fn new(start: u32, end: u32, total_pages: u32) -> Result<Self, PdfwerkError> {
        if start < 1 {
            return Err(PdfwerkError::InvalidRange(format!(
                "page numbers start at 1, got {start}"
            )));
        }
        if end > total_pages {
            return Err(PdfwerkError::InvalidRange(format!(
                "page {end} is out of bounds (document has {total_pages} pages)"
            )));
        }
        if start > end {
            return Err(PdfwerkError::InvalidRange(format!(
                "range start {start} is after range end {end}"
            )));
        }
        Ok(Self {
            start,
            end,
            pages: (start - 1..end).collect(),
        })
    }

    /// `N` for a single page, `N-M` for a span.
    pub fn label(&self) -> String {
        if self.start == self.end {
            self.start.to_string()
        } else {
            format!("{}-{}", self.start, self.end)
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// How split output files are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingOption {
    /// `{range}.pdf`
    #[default]
    None,
    /// `{original-stem}_{range}.pdf`
    Original,
    /// `{custom-prefix}_{range}.pdf`
    Custom,
}

impl FromStr for NamingOption {
    type Err = PdfwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "original" => Ok(Self::Original),
            "custom" => Ok(Self::Custom),
            other => Err(PdfwerkError::InvalidInput(format!(
                "unknown naming option: {other}"
            ))),
        }
    }
}

/// Quality profile passed to the external optimizer (`-dPDFSETTINGS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionProfile {
    /// 72 dpi, smallest output.
    Screen,
    /// 150 dpi, the usual choice for on-screen reading.
    #[default]
    Ebook,
    /// 300 dpi.
    Printer,
    /// 300 dpi with colour preservation.
    Prepress,
    /// Ghostscript's own defaults.
    Default,
}

impl CompressionProfile {
    /// The `-dPDFSETTINGS` keyword for this profile.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Ebook => "ebook",
            Self::Printer => "printer",
            Self::Prepress => "prepress",
            Self::Default => "default",
        }
    }
}

/// Whether images already stored as JPEG are re-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReencodePolicy {
    /// Leave JPEG streams untouched; avoids a second generation of loss.
    #[default]
    SkipAlreadyLossy,
    /// Re-encode every eligible image, JPEG or not.
    AlwaysReencode,
}

/// Lifecycle states of a compression job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStage {
    Started,
    ImagesCompressed,
    StructurallyOptimized,
    ExternallyOptimized,
    ExternalOptimizerUnavailable,
    Done,
    Failed(String),
}

/// Progress record for a running compression job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionJob {
    pub id: JobId,
    /// 0..=100.
    pub progress: u8,
    pub message: String,
    pub stage: CompressionStage,
}

impl CompressionJob {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            progress: 0,
            message: "Starting compression".into(),
            stage: CompressionStage::Started,
        }
    }
}

/// Size summary of a finished compression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionResult {
    pub original_size: u64,
    pub compressed_size: u64,
    /// Percentage saved; 0 when the original was empty.
    pub ratio: f64,
}

impl CompressionResult {
    pub fn new(original_size: u64, compressed_size: u64) -> Self {
        Self {
            original_size,
            compressed_size,
            ratio: compression_ratio(original_size, compressed_size),
        }
    }
}

/// `(original - compressed) / original * 100`, or 0 for an empty original.
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    (original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0
}
