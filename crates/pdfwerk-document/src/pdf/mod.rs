// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: document handle, image recompression, structural optimisation,
// and page-range assembly.

pub mod assemble;
pub mod document;
pub mod images;
pub mod optimize;

#[cfg(test)]
pub(crate) mod fixtures;

pub use assemble::assemble_pages;
pub use document::{ColorMode, ImageEncoding, ImageObject, Palette, PdfDocument};
pub use images::{RecompressOptions, RecompressionStats, recompress};
pub use optimize::optimize;
