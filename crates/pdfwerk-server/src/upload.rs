// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Multipart upload handling shared by the compress and split endpoints.

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::error::AppError;

/// Name of the multipart field carrying the document.
const FILE_FIELD: &str = "file";

/// How far into an upload the `%PDF-` marker may appear.
const MAGIC_WINDOW: usize = 1024;

/// The uploaded document.
#[derive(Debug)]
pub struct UploadedFile {
    /// Client-supplied name, reduced to its final path component.
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A parsed multipart form: at most one file plus text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Drain `multipart` into memory. Size limits are enforced by the router's
    /// body limit and surface here as 413.
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            if name == FILE_FIELD {
                let filename = base_name(field.file_name().unwrap_or_default());
                let bytes = field.bytes().await?.to_vec();
                form.file = Some(UploadedFile { filename, bytes });
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// A text field, trimmed; blank values count as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Take the uploaded file, requiring it to be a non-empty PDF.
    pub fn take_pdf(&mut self) -> Result<UploadedFile, AppError> {
        let file = self
            .file
            .take()
            .ok_or_else(|| AppError::bad_request("No file uploaded"))?;
        if file.filename.is_empty() {
            return Err(AppError::bad_request("No file selected"));
        }
        if file.bytes.is_empty() {
            return Err(AppError::bad_request("Uploaded file is empty"));
        }
        if !looks_like_pdf(&file.bytes) {
            return Err(AppError::bad_request("File must be a PDF"));
        }
        Ok(file)
    }
}

/// PDF readers accept the header anywhere in the first kilobyte.
fn looks_like_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(MAGIC_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or_default().trim().to_owned()
}
