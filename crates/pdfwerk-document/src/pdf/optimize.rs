// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structural optimisation: garbage-collect, renumber, and deflate a document
// before writing it out.

use std::path::Path;

use pdfwerk_core::error::Result;
use tracing::{debug, info, instrument};

use crate::pdf::document::PdfDocument;

/// Clean up `doc` and write it to `out_path`.
///
/// Drops objects no longer reachable from the trailer (such as images that
/// were replaced), removes empty streams, renumbers what is left densely, and
/// Flate-compresses every stream that has no filter yet. Streams marked as
/// not compressible (freshly written JPEGs) are left as they are. Any write
/// failure is fatal.
#[instrument(skip(doc, out_path), fields(path = %out_path.as_ref().display()))]
pub fn optimize(doc: &mut PdfDocument, out_path: impl AsRef<Path>) -> Result<()> {
    let document = doc.inner_mut();
    let objects_before = document.objects.len();

    let pruned = document.prune_objects();
    let empty = document.delete_zero_length_streams();
    document.renumber_objects();
    document.compress();

    debug!(pruned = pruned.len(), empty_streams = empty.len(), "document cleaned");
    info!(
        objects_before,
        objects_after = document.objects.len(),
        "structural optimisation done"
    );

    doc.save(out_path)
}
