// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pdfwerk-document — Document processing for the pdfwerk service.
//
// Provides the PDF handle and its embedded-image inventory, image
// recompression, structural optimisation, the Ghostscript and qpdf adapters,
// page-range parsing, and sub-document assembly for splitting.

pub mod external;
pub mod image;
pub mod pdf;
pub mod ranges;

// Re-export the primary items so callers can use `pdfwerk_document::PdfDocument` etc.
pub use external::{OptimizerAvailability, try_linearize, try_optimize};
pub use image::processor::ImageProcessor;
pub use pdf::{
    PdfDocument, RecompressOptions, RecompressionStats, assemble_pages, optimize, recompress,
};
