// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Split orchestrator: turn one PDF plus a page-range expression into one
// sub-document per range and a zip of all of them, held in an expiring
// download session.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use pdfwerk_core::ServiceConfig;
use pdfwerk_core::error::{PdfwerkError, Result};
use pdfwerk_core::types::{NamingOption, PageRange, SessionId};
use pdfwerk_document::pdf::{PdfDocument, assemble_pages};
use pdfwerk_document::ranges;

use crate::registry::Registry;
use crate::scratch::ScratchDir;

/// Registry of split sessions keyed by id. Sessions are shared so a download
/// in progress keeps its files alive even if the session expires meanwhile.
pub type SessionRegistry = Registry<SessionId, Arc<SplitSession>>;

/// Archive name used when no prefix applies.
const DEFAULT_ARCHIVE_NAME: &str = "split_pages.zip";

/// One output document of a split.
#[derive(Debug, Clone, Serialize)]
pub struct SplitFile {
    pub filename: String,
    /// Range label, `N` or `N-M`.
    pub range: String,
    #[serde(skip)]
    pub path: PathBuf,
}

/// The outputs of one split request.
///
/// Owns its directory: the files and the archive are deleted when the last
/// reference to the session is dropped.
#[derive(Debug)]
pub struct SplitSession {
    pub id: SessionId,
    pub files: Vec<SplitFile>,
    pub archive_name: String,
    pub archive_path: PathBuf,
    pub created_at: DateTime<Utc>,
    dir: ScratchDir,
}

impl SplitSession {
    /// Look up an output by its file name. Only names produced by the split
    /// resolve.
    pub fn file(&self, filename: &str) -> Result<&SplitFile> {
        self.files
            .iter()
            .find(|file| file.filename == filename)
            .ok_or_else(|| {
                PdfwerkError::NotFound(format!("file {filename} not found in session {}", self.id))
            })
    }

    /// Directory holding the outputs.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Split `doc` along `ranges` into a fresh directory under `scratch_root`.
///
/// Outputs are written in range order and named `{prefix_}{label}.pdf`; the
/// same page may appear in several outputs. A `custom` naming option needs a
/// non-blank `custom_prefix`.
#[instrument(skip(doc, ranges, custom_prefix, scratch_root), fields(ranges = ranges.len()))]
pub fn split(
    doc: &PdfDocument,
    ranges: &[PageRange],
    naming: NamingOption,
    custom_prefix: Option<&str>,
    original_name: &str,
    scratch_root: &Path,
) -> Result<SplitSession> {
    if ranges.is_empty() {
        return Err(PdfwerkError::InvalidRange("no page ranges given".into()));
    }
    let prefix = output_prefix(naming, custom_prefix, original_name)?;
    let id = SessionId::new();
    let dir = ScratchDir::new_in(scratch_root, "pdfwerk-split-")?;

    let mut names = OutputNames::default();
    let mut files = Vec::with_capacity(ranges.len());
    for range in ranges {
        let label = range.label();
        let filename = names.claim(&prefixed(prefix.as_deref(), &label), "pdf");
        let path = dir.join(&filename);

        let mut part = assemble_pages(doc, &range.pages)?;
        part.save(&path)?;
        debug!(file = %filename, pages = range.len(), "split output written");

        files.push(SplitFile {
            filename,
            range: label,
            path,
        });
    }

    let archive_name = match &prefix {
        Some(prefix) => format!("{prefix}_split.zip"),
        None => DEFAULT_ARCHIVE_NAME.to_string(),
    };
    let archive_path = dir.join(&archive_name);
    write_archive(&archive_path, &files)?;

    info!(session_id = %id, outputs = files.len(), archive = %archive_name, "split complete");
    Ok(SplitSession {
        id,
        files,
        archive_name,
        archive_path,
        created_at: Utc::now(),
        dir,
    })
}

/// Runs split requests and owns the session registry.
#[derive(Clone)]
pub struct Splitter {
    config: Arc<ServiceConfig>,
    sessions: Arc<SessionRegistry>,
}

impl Splitter {
    pub fn new(config: Arc<ServiceConfig>, sessions: Arc<SessionRegistry>) -> Self {
        Self { config, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Parse `range_expression` against the uploaded document, split it, and
    /// register the resulting session.
    #[instrument(skip(self, input, custom_prefix), fields(input_len = input.len()))]
    pub async fn split_upload(
        &self,
        input: Vec<u8>,
        range_expression: String,
        naming: NamingOption,
        custom_prefix: Option<String>,
        original_name: String,
    ) -> Result<Arc<SplitSession>> {
        if input.is_empty() {
            return Err(PdfwerkError::InvalidInput("uploaded file is empty".into()));
        }

        let scratch_root = self.config.scratch_root();
        let session = tokio::task::spawn_blocking(move || {
            let doc = PdfDocument::from_bytes(&input)
                .map_err(|err| PdfwerkError::InvalidInput(format!("could not read PDF: {err}")))?;
            let ranges = ranges::parse(&range_expression, doc.page_count())?;
            split(
                &doc,
                &ranges,
                naming,
                custom_prefix.as_deref(),
                &original_name,
                &scratch_root,
            )
        })
        .await
        .map_err(|err| PdfwerkError::Internal(format!("split task failed: {err}")))??;

        let session = Arc::new(session);
        self.sessions.put_at(session.id, Arc::clone(&session), session.created_at);
        Ok(session)
    }

    /// A live session.
    pub fn session(&self, id: &SessionId) -> Result<Arc<SplitSession>> {
        self.sessions.get(id)
    }
}

/// Resolve the file-name prefix for a naming option.
fn output_prefix(naming: NamingOption, custom_prefix: Option<&str>, original_name: &str) -> Result<Option<String>> {
    match naming {
        NamingOption::None => Ok(None),
        NamingOption::Original => {
            let stem = Path::new(original_name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = sanitize(&stem);
            Ok(Some(if stem.is_empty() { "document".to_string() } else { stem }))
        }
        NamingOption::Custom => {
            let prefix = custom_prefix.map(sanitize).unwrap_or_default();
            if prefix.is_empty() {
                return Err(PdfwerkError::InvalidInput(
                    "custom naming requires a custom prefix".into(),
                ));
            }
            Ok(Some(prefix))
        }
    }
}

fn prefixed(prefix: Option<&str>, label: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}_{label}"),
        None => label.to_string(),
    }
}

/// Replace path separators, control characters, and characters reserved on
/// common filesystems with `_`.
fn sanitize(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Hands out unique file names, suffixing repeats with `_2`, `_3`, ...
#[derive(Default)]
struct OutputNames {
    seen: HashMap<String, usize>,
}

impl OutputNames {
    fn claim(&mut self, stem: &str, extension: &str) -> String {
        let count = self.seen.entry(stem.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            format!("{stem}.{extension}")
        } else {
            format!("{stem}_{count}.{extension}")
        }
    }
}

/// Package the outputs into one Deflate-compressed zip.
fn write_archive(path: &Path, files: &[SplitFile]) -> Result<()> {
    let archive_error = |err: zip::result::ZipError| PdfwerkError::Archive(err.to_string());

    let mut zip = zip::ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in files {
        zip.start_file(file.filename.as_str(), options).map_err(archive_error)?;
        zip.write_all(&std::fs::read(&file.path)?)?;
    }
    zip.finish().map_err(archive_error)?;
    Ok(())
}
