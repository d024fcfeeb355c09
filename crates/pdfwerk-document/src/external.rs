// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External tool adapters: a best-effort Ghostscript `pdfwrite` pass and a
// best-effort `qpdf --linearize` pass.
//
// The host is searched for each tool once per process. When a tool is missing,
// or its run fails or overruns its deadline, the adapter reports `false` and
// the caller keeps its own output.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use pdfwerk_core::error::{PdfwerkError, Result};
use pdfwerk_core::types::CompressionProfile;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Executable names tried, in order, on `PATH`.
pub const GHOSTSCRIPT_NAMES: [&str; 3] = ["gs", "gswin64c", "gswin32c"];

/// Executable names tried for linearization.
pub const QPDF_NAMES: [&str; 1] = ["qpdf"];

/// qpdf exits 3 when it succeeded with warnings.
const QPDF_OK_CODES: [i32; 2] = [0, 3];

/// Downsampling resolution for colour, gray, and mono images.
const IMAGE_RESOLUTION_DPI: u32 = 150;

static GHOSTSCRIPT: OnceLock<OptimizerAvailability> = OnceLock::new();
static QPDF: OnceLock<OptimizerAvailability> = OnceLock::new();

/// Result of searching the host for an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizerAvailability {
    Available(PathBuf),
    Unavailable,
}

impl OptimizerAvailability {
    /// Search the current `PATH` for Ghostscript.
    pub fn probe() -> Self {
        Self::probe_for(&GHOSTSCRIPT_NAMES)
    }

    /// Search the current `PATH` for the first of `names`.
    pub fn probe_for(names: &[&str]) -> Self {
        let found = std::env::var_os("PATH").and_then(|path| find_in_path(&path, names));
        match found {
            Some(program) => {
                info!(program = %program.display(), "external tool found");
                Self::Available(program)
            }
            None => {
                info!(tools = ?names, "external tool not on PATH");
                Self::Unavailable
            }
        }
    }

    /// The process-wide cached Ghostscript lookup.
    pub fn cached() -> &'static Self {
        GHOSTSCRIPT.get_or_init(Self::probe)
    }

    /// The process-wide cached qpdf lookup.
    pub fn cached_linearizer() -> &'static Self {
        QPDF.get_or_init(|| Self::probe_for(&QPDF_NAMES))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// First `names` entry that exists as a file in one of the `PATH` directories.
pub fn find_in_path(path: &OsStr, names: &[&str]) -> Option<PathBuf> {
    let suffix = std::env::consts::EXE_SUFFIX;
    names.iter().find_map(|name| {
        std::env::split_paths(path)
            .map(|dir| dir.join(format!("{name}{suffix}")))
            .find(|candidate| candidate.is_file())
    })
}

/// The fixed Ghostscript argument list for one run.
pub fn ghostscript_args(profile: CompressionProfile, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-sDEVICE=pdfwrite".to_string(),
        format!("-dPDFSETTINGS=/{}", profile.keyword()),
        "-dCompatibilityLevel=1.4".to_string(),
        "-dNOPAUSE".to_string(),
        "-dQUIET".to_string(),
        "-dBATCH".to_string(),
        "-dDetectDuplicateImages=true".to_string(),
        "-dCompressFonts=true".to_string(),
        "-dSubsetFonts=true".to_string(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    for kind in ["Color", "Gray", "Mono"] {
        args.push(format!("-d{kind}ImageDownsampleType=/Bicubic").into());
        args.push(format!("-d{kind}ImageResolution={IMAGE_RESOLUTION_DPI}").into());
    }

    let mut output_arg = OsString::from("-sOutputFile=");
    output_arg.push(output);
    args.push(output_arg);
    args.push(input.as_os_str().to_owned());
    args
}

/// qpdf arguments writing a linearized copy of `input` to `output`.
pub fn qpdf_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        OsString::from("--linearize"),
        input.as_os_str().to_owned(),
        output.as_os_str().to_owned(),
    ]
}

/// Run Ghostscript over `input`, writing `output`, if it is installed.
///
/// Returns `true` only when the tool ran, exited zero within `timeout`, and
/// left a non-empty output file.
pub async fn try_optimize(
    input: &Path,
    output: &Path,
    profile: CompressionProfile,
    timeout: Duration,
) -> bool {
    try_optimize_with(OptimizerAvailability::cached(), input, output, profile, timeout).await
}

/// [`try_optimize`] against an explicit availability.
pub async fn try_optimize_with(
    availability: &OptimizerAvailability,
    input: &Path,
    output: &Path,
    profile: CompressionProfile,
    timeout: Duration,
) -> bool {
    absorb("ghostscript", optimize_with(availability, input, output, profile, timeout).await)
}

/// Ghostscript pass with the failure reason kept.
pub async fn optimize_with(
    availability: &OptimizerAvailability,
    input: &Path,
    output: &Path,
    profile: CompressionProfile,
    timeout: Duration,
) -> Result<()> {
    let OptimizerAvailability::Available(program) = availability else {
        return Err(PdfwerkError::ExternalToolUnavailable);
    };
    run(program, ghostscript_args(profile, input, output), &[0], output, timeout).await
}

/// Linearize `input` into `output` with qpdf, if it is installed.
pub async fn try_linearize(input: &Path, output: &Path, timeout: Duration) -> bool {
    try_linearize_with(OptimizerAvailability::cached_linearizer(), input, output, timeout).await
}

/// [`try_linearize`] against an explicit availability.
pub async fn try_linearize_with(
    availability: &OptimizerAvailability,
    input: &Path,
    output: &Path,
    timeout: Duration,
) -> bool {
    absorb("qpdf", linearize_with(availability, input, output, timeout).await)
}

/// qpdf pass with the failure reason kept.
pub async fn linearize_with(
    availability: &OptimizerAvailability,
    input: &Path,
    output: &Path,
    timeout: Duration,
) -> Result<()> {
    let OptimizerAvailability::Available(program) = availability else {
        return Err(PdfwerkError::ExternalToolUnavailable);
    };
    run(program, qpdf_args(input, output), &QPDF_OK_CODES, output, timeout).await
}

/// Collapse a tool result to "use the output or not".
fn absorb(tool: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(PdfwerkError::ExternalToolUnavailable) => {
            debug!(tool, "external tool unavailable, skipping");
            false
        }
        Err(err) => {
            warn!(tool, error = %err, "external tool did not produce output");
            false
        }
    }
}

#[instrument(skip_all, fields(program = %program.display()))]
async fn run(
    program: &Path,
    args: Vec<OsString>,
    ok_codes: &[i32],
    output: &Path,
    timeout: Duration,
) -> Result<()> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let finished = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| PdfwerkError::ExternalToolFailed(format!("timed out after {timeout:?}")))?
        .map_err(|err| PdfwerkError::ExternalToolFailed(format!("failed to start: {err}")))?;

    let code = finished.status.code();
    if !code.is_some_and(|code| ok_codes.contains(&code)) {
        let stderr = String::from_utf8_lossy(&finished.stderr);
        return Err(PdfwerkError::ExternalToolFailed(format!(
            "exit code {}: {}",
            code.map_or_else(|| "unknown".to_string(), |code| code.to_string()),
            stderr.trim()
        )));
    }

    let written = tokio::fs::metadata(output).await.map(|meta| meta.len()).unwrap_or(0);
    if written == 0 {
        return Err(PdfwerkError::ExternalToolFailed("no output written".into()));
    }

    debug!(written, "external tool finished");
    Ok(())
}
