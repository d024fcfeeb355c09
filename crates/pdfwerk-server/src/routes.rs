// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP routes: compression, progress polling, splitting, and downloads.

use axum::Json;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::Serialize;
use tracing::{info, instrument};

use pdfwerk_core::{CompressionStage, JobId, NamingOption, PdfwerkError, SessionId};
use pdfwerk_jobs::SplitFile;

use crate::error::AppError;
use crate::state::AppState;
use crate::upload::UploadForm;

const BANNER: &str = "PDF Compression API is running!";

const X_ORIGINAL_SIZE: HeaderName = HeaderName::from_static("x-original-size");
const X_COMPRESSED_SIZE: HeaderName = HeaderName::from_static("x-compressed-size");
const X_COMPRESSION_RATIO: HeaderName = HeaderName::from_static("x-compression-ratio");
const X_JOB_ID: HeaderName = HeaderName::from_static("x-job-id");

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/compress-pdf", post(compress_pdf))
        .route("/compression-progress/{job_id}", get(compression_progress))
        .route("/split-pdf", post(split_pdf))
        .route("/download-split-file/{session_id}/{filename}", get(download_split_file))
        .route("/download-split-zip/{session_id}", get(download_split_zip))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn index() -> &'static str {
    BANNER
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

/// Liveness check. Also the point where expired jobs and sessions are purged.
async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    state.sweep_expired();
    Json(HealthBody { status: "ok" })
}

// -- Compression --------------------------------------------------------------

#[instrument(skip_all)]
async fn compress_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_pdf()?;
    let quality = match form.field("image_quality") {
        Some(raw) => parse_quality(raw)?,
        None => state.config.default_image_quality,
    };
    let job_id = match form.field("job_id") {
        Some(raw) => raw.parse::<JobId>()?,
        None => JobId::new(),
    };

    let outcome = state.compressor.compress(job_id, file.bytes, quality).await?;
    let result = outcome.result;
    info!(
        job_id = %job_id,
        filename = %file.filename,
        original_size = result.original_size,
        compressed_size = result.compressed_size,
        "compression finished"
    );

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        attachment(&format!("compressed_{}", file.filename)),
    );
    headers.insert(X_ORIGINAL_SIZE, HeaderValue::from(result.original_size));
    headers.insert(X_COMPRESSED_SIZE, HeaderValue::from(result.compressed_size));
    headers.insert(X_COMPRESSION_RATIO, text_header(format!("{:.2}", result.ratio))?);
    headers.insert(X_JOB_ID, text_header(job_id.to_string())?);
    Ok((headers, outcome.output))
}

fn parse_quality(raw: &str) -> Result<u8, AppError> {
    raw.parse::<u8>()
        .ok()
        .filter(|quality| (1..=100).contains(quality))
        .ok_or_else(|| AppError::bad_request(format!("image_quality must be an integer between 1 and 100, got {raw}")))
}

#[derive(Serialize)]
struct ProgressBody {
    job_id: JobId,
    progress: u8,
    message: String,
    stage: CompressionStage,
}

async fn compression_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ProgressBody>, AppError> {
    let job_id: JobId = job_id.parse()?;
    let job = state.compressor.jobs().get(&job_id)?;
    Ok(Json(ProgressBody {
        job_id: job.id,
        progress: job.progress,
        message: job.message,
        stage: job.stage,
    }))
}

// -- Splitting ----------------------------------------------------------------

#[derive(Serialize)]
struct SplitBody {
    success: bool,
    session_id: SessionId,
    files: Vec<SplitFile>,
    zip_filename: String,
}

#[instrument(skip_all)]
async fn split_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SplitBody>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_pdf()?;
    let ranges = form
        .field("pageRanges")
        .ok_or_else(|| AppError::bad_request("Page ranges are required"))?
        .to_owned();
    let naming: NamingOption = form.field("namingOption").unwrap_or_default().parse()?;
    let custom_prefix = form.field("customPrefix").map(str::to_owned);

    let session = state
        .splitter
        .split_upload(file.bytes, ranges, naming, custom_prefix, file.filename)
        .await?;
    info!(session_id = %session.id, files = session.files.len(), "split finished");

    Ok(Json(SplitBody {
        success: true,
        session_id: session.id,
        files: session.files.clone(),
        zip_filename: session.archive_name.clone(),
    }))
}

async fn download_split_file(
    State(state): State<AppState>,
    Path((session_id, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.splitter.session(&session_id.parse()?)?;
    let file = session.file(&filename)?;
    let bytes = tokio::fs::read(&file.path).await.map_err(PdfwerkError::from)?;
    Ok(download(bytes, "application/pdf", &file.filename))
}

async fn download_split_zip(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.splitter.session(&session_id.parse()?)?;
    let bytes = tokio::fs::read(&session.archive_path)
        .await
        .map_err(PdfwerkError::from)?;
    Ok(download(bytes, "application/zip", &session.archive_name))
}

// -- Helpers ------------------------------------------------------------------

fn download(bytes: Vec<u8>, content_type: &'static str, filename: &str) -> impl IntoResponse + use<> {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, attachment(filename)),
        ],
        bytes,
    )
}

/// `attachment; filename="..."` with anything unsafe in a quoted header
/// parameter replaced by `_`.
fn attachment(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn text_header(value: String) -> Result<HeaderValue, AppError> {
    HeaderValue::try_from(value)
        .map_err(|err| PdfwerkError::Internal(format!("invalid header value: {err}")).into())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use lopdf::{Document, Object, Stream, dictionary};
    use pdfwerk_core::ServiceConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const BOUNDARY: &str = "pdfwerk-test-boundary";

    struct Part<'a> {
        name: &'a str,
        filename: Option<&'a str>,
        body: &'a [u8],
    }

    fn text(name: &'static str, value: &'static str) -> Part<'static> {
        Part {
            name,
            filename: None,
            body: value.as_bytes(),
        }
    }

    fn file<'a>(filename: &'a str, body: &'a [u8]) -> Part<'a> {
        Part {
            name: "file",
            filename: Some(filename),
            body,
        }
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part.filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/pdf\r\n\r\n",
                        part.name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name).as_bytes(),
                ),
            }
            body.extend_from_slice(part.body);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post_form(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .expect("request")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    /// A document with `pages` text-only pages.
    fn sample_pdf(pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut kids: Vec<Object> = Vec::new();
        for number in 1..=pages {
            let content = format!("BT /F1 24 Tf 72 720 Td (Page {number}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save sample");
        bytes
    }

    struct TestApp {
        router: Router,
        state: AppState,
        _scratch: tempfile::TempDir,
    }

    fn app_with(configure: impl FnOnce(&mut ServiceConfig)) -> TestApp {
        let scratch = tempfile::tempdir().expect("scratch root");
        let mut config = ServiceConfig {
            external_optimizer_enabled: false,
            linearize_enabled: false,
            scratch_root: Some(scratch.path().to_path_buf()),
            ..ServiceConfig::default()
        };
        configure(&mut config);
        let state = AppState::new(config);
        TestApp {
            router: router(state.clone()),
            state,
            _scratch: scratch,
        }
    }

    fn app() -> TestApp {
        app_with(|_| {})
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body")
            .to_vec()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).expect("json body")
    }

    #[tokio::test]
    async fn index_serves_banner() {
        let app = app();
        let response = app.router.oneshot(get_request("/")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, BANNER.as_bytes());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app();
        let response = app.router.oneshot(get_request("/health")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn compress_without_file_is_bad_request() {
        let app = app();
        let request = post_form("/compress-pdf", &[text("image_quality", "50")]);
        let response = app.router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn compress_rejects_non_pdf() {
        let app = app();
        let request = post_form("/compress-pdf", &[file("notes.txt", b"hello world")]);
        let response = app.router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "File must be a PDF");
    }

    #[tokio::test]
    async fn compress_rejects_out_of_range_quality() {
        let app = app();
        let pdf = sample_pdf(1);
        for quality in ["0", "101", "high"] {
            let request = post_form(
                "/compress-pdf",
                &[
                    file("doc.pdf", &pdf),
                    Part {
                        name: "image_quality",
                        filename: None,
                        body: quality.as_bytes(),
                    },
                ],
            );
            let response = app.router.clone().oneshot(request).await.expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "quality {quality}");
        }
    }

    #[tokio::test]
    async fn compress_returns_pdf_with_size_headers() {
        let app = app();
        let pdf = sample_pdf(3);
        let request = post_form(
            "/compress-pdf",
            &[file("report.pdf", &pdf), text("image_quality", "60")],
        );
        let response = app.router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"compressed_report.pdf\""
        );
        assert_eq!(headers[X_ORIGINAL_SIZE], pdf.len().to_string().as_str());
        let compressed: usize = headers[X_COMPRESSED_SIZE]
            .to_str()
            .expect("ascii")
            .parse()
            .expect("number");
        let ratio = headers[X_COMPRESSION_RATIO].to_str().expect("ascii");
        assert_eq!(ratio.split('.').nth(1).map(str::len), Some(2));

        let body = body_bytes(response).await;
        assert_eq!(body.len(), compressed);
        assert!(body.len() <= pdf.len());
        let doc = Document::load_mem(&body).expect("output is a PDF");
        assert_eq!(doc.get_pages().len(), 3);

        // The job is gone once the response is out.
        let job_id: JobId = headers[X_JOB_ID]
            .to_str()
            .expect("ascii")
            .parse()
            .expect("job id");
        assert!(!app.state.compressor.jobs().contains(&job_id));
    }

    #[tokio::test]
    async fn compress_honours_client_job_id() {
        let app = app();
        let pdf = sample_pdf(1);
        let request = post_form(
            "/compress-pdf",
            &[
                file("doc.pdf", &pdf),
                text("job_id", "5f0c4a52-3b7e-4f5e-9d4b-2a7c1e9f8b10"),
            ],
        );
        let response = app.router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_JOB_ID], "5f0c4a52-3b7e-4f5e-9d4b-2a7c1e9f8b10");
    }

    #[tokio::test]
    async fn compress_refuses_a_job_id_in_use() {
        let app = app();
        let raw = "0b9e3f6a-8c21-4d7e-a5f0-3e6b1c2d4f58";
        let job_id: JobId = raw.parse().expect("job id");
        let mut running = pdfwerk_core::CompressionJob::new(job_id);
        running.progress = 40;
        app.state.compressor.jobs().put(job_id, running);

        let pdf = sample_pdf(1);
        let request = post_form(
            "/compress-pdf",
            &[file("doc.pdf", &pdf), text("job_id", raw)],
        );
        let response = app.router.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.state.compressor.jobs().get(&job_id).expect("kept").progress, 40);
    }

    #[tokio::test]
    async fn unknown_job_progress_is_not_found() {
        let app = app();
        let uri = format!("/compression-progress/{}", JobId::new());
        let response = app.router.oneshot(get_request(&uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn running_job_progress_is_reported() {
        let app = app();
        let job_id = JobId::new();
        let mut job = pdfwerk_core::CompressionJob::new(job_id);
        job.progress = 30;
        job.message = "Compressing images (3/5)".into();
        app.state.compressor.jobs().put(job_id, job);

        let uri = format!("/compression-progress/{job_id}");
        let response = app.router.oneshot(get_request(&uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["job_id"], job_id.to_string());
        assert_eq!(body["progress"], 30);
        assert_eq!(body["message"], "Compressing images (3/5)");
        assert_eq!(body["stage"], "started");
    }

    #[tokio::test]
    async fn split_then_download_files_and_archive() {
        let app = app();
        let pdf = sample_pdf(5);
        let request = post_form(
            "/split-pdf",
            &[
                file("report.pdf", &pdf),
                text("pageRanges", "1-2, 5"),
                text("namingOption", "original"),
            ],
        );
        let response = app.router.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["zip_filename"], "report_split.zip");
        let session_id = body["session_id"].as_str().expect("session id").to_owned();
        let files = body["files"].as_array().expect("files");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["filename"], "report_1-2.pdf");
        assert_eq!(files[0]["range"], "1-2");
        assert_eq!(files[1]["filename"], "report_5.pdf");

        let uri = format!("/download-split-file/{session_id}/report_1-2.pdf");
        let response = app.router.clone().oneshot(get_request(&uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let part = Document::load_mem(&body_bytes(response).await).expect("split part");
        assert_eq!(part.get_pages().len(), 2);

        let uri = format!("/download-split-zip/{session_id}");
        let response = app.router.oneshot(get_request(&uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
        let archive_bytes = body_bytes(response).await;
        let mut archive = zip_archive(&archive_bytes);
        assert_eq!(archive.len(), 2);
        let mut entry = archive.by_name("report_5.pdf").expect("entry");
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).expect("read entry");
        assert_eq!(Document::load_mem(&contents).expect("pdf").get_pages().len(), 1);
    }

    fn zip_archive(bytes: &[u8]) -> zip::ZipArchive<std::io::Cursor<&[u8]>> {
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("zip archive")
    }

    #[tokio::test]
    async fn split_with_invalid_range_is_bad_request() {
        let app = app();
        let pdf = sample_pdf(3);
        for ranges in ["4", "3-2", "0-1"] {
            let request = post_form(
                "/split-pdf",
                &[
                    file("doc.pdf", &pdf),
                    Part {
                        name: "pageRanges",
                        filename: None,
                        body: ranges.as_bytes(),
                    },
                ],
            );
            let response = app.router.clone().oneshot(request).await.expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "ranges {ranges}");
        }
        assert!(app.state.splitter.sessions().is_empty());
    }

    #[tokio::test]
    async fn split_without_ranges_is_bad_request() {
        let app = app();
        let pdf = sample_pdf(2);
        let request = post_form("/split-pdf", &[file("doc.pdf", &pdf)]);
        let response = app.router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Page ranges are required");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let app = app();
        for uri in [
            format!("/download-split-zip/{}", SessionId::new()),
            format!("/download-split-file/{}/1.pdf", SessionId::new()),
            "/download-split-zip/not-a-session".to_owned(),
        ] {
            let response = app.router.clone().oneshot(get_request(&uri)).await.expect("response");
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn unknown_file_in_live_session_is_not_found() {
        let app = app();
        let pdf = sample_pdf(2);
        let request = post_form(
            "/split-pdf",
            &[file("doc.pdf", &pdf), text("pageRanges", "1")],
        );
        let response = app.router.clone().oneshot(request).await.expect("response");
        let body = body_json(response).await;
        let session_id = body["session_id"].as_str().expect("session id");

        let uri = format!("/download-split-file/{session_id}/2.pdf");
        let response = app.router.oneshot(get_request(&uri)).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let app = app_with(|config| config.max_upload_bytes = 1024);
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.resize(4096, b' ');
        let request = post_form("/compress-pdf", &[file("big.pdf", &pdf)]);
        let response = app.router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn attachment_names_are_quoted_safely() {
        assert_eq!(attachment("a b.pdf"), "attachment; filename=\"a b.pdf\"");
        assert_eq!(attachment("we\"ird\\.pdf"), "attachment; filename=\"we_ird_.pdf\"");
        assert_eq!(attachment("résumé.pdf"), "attachment; filename=\"r_sum_.pdf\"");
    }
}
