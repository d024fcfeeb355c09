// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image recompression: walks every embedded raster image once (by object
// id), downsamples oversized ones, flattens them to opaque RGB, and swaps in a
// JPEG re-encode when that is smaller than what is stored.

use std::io::Read;

use lopdf::{Object, Stream};
use pdfwerk_core::ServiceConfig;
use pdfwerk_core::error::{PdfwerkError, Result};
use pdfwerk_core::types::ReencodePolicy;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::image::{ImageProcessor, RawLayout};
use crate::pdf::document::{ColorMode, ImageEncoding, ImageObject, Palette, PdfDocument, filter_names};

/// Tuning for [`recompress`].
#[derive(Debug, Clone)]
pub struct RecompressOptions {
    /// JPEG quality, 1..=100.
    pub quality: u8,
    /// Longest allowed side in pixels.
    pub max_dimension: u32,
    /// Streams smaller than this many bytes are left untouched.
    pub small_image_threshold: usize,
    pub policy: ReencodePolicy,
}

impl Default for RecompressOptions {
    fn default() -> Self {
        Self {
            quality: 50,
            max_dimension: 1500,
            small_image_threshold: 50 * 1024,
            policy: ReencodePolicy::SkipAlreadyLossy,
        }
    }
}

impl RecompressOptions {
    /// Options from the service config with a per-request quality.
    pub fn from_config(config: &ServiceConfig, quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            max_dimension: config.max_image_dimension,
            small_image_threshold: config.small_image_threshold,
            policy: config.reencode_policy,
        }
    }
}

/// What happened to the images of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecompressionStats {
    pub images_found: usize,
    pub recompressed: usize,
    pub skipped_small: usize,
    pub skipped_lossy: usize,
    /// Re-encoded but not smaller, so the original was kept.
    pub skipped_no_gain: usize,
    pub failed: usize,
    /// Stored bytes of the recompressed images before and after.
    pub bytes_before: usize,
    pub bytes_after: usize,
}

enum Outcome {
    Recompressed { before: usize, after: usize },
    SkippedSmall,
    SkippedLossy,
    NoGain,
}

/// Recompress every eligible image in `doc`, in place.
///
/// `progress` receives a stage-local percentage (0..=100) and a message: once
/// on entry, once per image, and once on exit. A failing image is logged and
/// skipped; it never aborts the stage.
#[instrument(skip_all, fields(quality = options.quality, max_dimension = options.max_dimension))]
pub fn recompress(
    doc: &mut PdfDocument,
    options: &RecompressOptions,
    mut progress: impl FnMut(u8, &str),
) -> RecompressionStats {
    let images = doc.image_objects();
    let total = images.len();
    let mut stats = RecompressionStats {
        images_found: total,
        ..RecompressionStats::default()
    };

    progress(0, &format!("Found {total} images"));

    for (index, image) in images.iter().enumerate() {
        match recompress_one(doc, image, options) {
            Ok(Outcome::Recompressed { before, after }) => {
                stats.recompressed += 1;
                stats.bytes_before += before;
                stats.bytes_after += after;
            }
            Ok(Outcome::SkippedSmall) => stats.skipped_small += 1,
            Ok(Outcome::SkippedLossy) => stats.skipped_lossy += 1,
            Ok(Outcome::NoGain) => stats.skipped_no_gain += 1,
            Err(err) => {
                warn!(object_id = image.id.0, error = %err, "skipping image");
                stats.failed += 1;
            }
        }

        let done = index + 1;
        progress(
            (done * 100 / total) as u8,
            &format!("Compressing images ({done}/{total})"),
        );
    }

    info!(
        found = stats.images_found,
        recompressed = stats.recompressed,
        failed = stats.failed,
        saved = stats.bytes_before.saturating_sub(stats.bytes_after),
        "image recompression finished"
    );
    progress(100, "Images compressed");
    stats
}

fn recompress_one(
    doc: &mut PdfDocument,
    image: &ImageObject,
    options: &RecompressOptions,
) -> Result<Outcome> {
    if image.raw_len < options.small_image_threshold {
        return Ok(Outcome::SkippedSmall);
    }
    if image.encoding == ImageEncoding::Jpeg && options.policy == ReencodePolicy::SkipAlreadyLossy {
        return Ok(Outcome::SkippedLossy);
    }

    let decoded = {
        let stream = doc.stream(image.id).ok_or_else(|| decode_failure(image, "not a stream"))?;
        decode(doc, stream, image)?
    };

    let processed = decoded.fit_within(options.max_dimension).flatten_to_rgb();
    let (width, height) = (processed.width(), processed.height());
    let jpeg = processed
        .to_jpeg_bytes(options.quality)
        .map_err(|err| decode_failure(image, &err.to_string()))?;

    if jpeg.len() >= image.raw_len {
        debug!(object_id = image.id.0, before = image.raw_len, after = jpeg.len(), "re-encode not smaller");
        return Ok(Outcome::NoGain);
    }

    let after = jpeg.len();
    if let Some(Object::Stream(stream)) = doc.inner_mut().objects.get_mut(&image.id) {
        replace_with_jpeg(stream, jpeg, width, height);
    }

    debug!(
        object_id = image.id.0,
        before = image.raw_len,
        after,
        width,
        height,
        "image recompressed"
    );
    Ok(Outcome::Recompressed {
        before: image.raw_len,
        after,
    })
}

/// Decode an image stream into pixels.
fn decode(doc: &PdfDocument, stream: &Stream, image: &ImageObject) -> Result<ImageProcessor> {
    if image.has_decode_array {
        return Err(decode_failure(image, "remapped samples (/Decode) not supported"));
    }

    match &image.encoding {
        ImageEncoding::Jpeg => {
            let payload = jpeg_payload(stream).map_err(|reason| decode_failure(image, &reason))?;
            ImageProcessor::from_bytes(&payload).map_err(|err| decode_failure(image, &err.to_string()))
        }
        ImageEncoding::Flate | ImageEncoding::Raw => {
            let data = if image.encoding == ImageEncoding::Raw {
                stream.content.clone()
            } else {
                inflate(stream).map_err(|reason| decode_failure(image, &reason))?
            };
            let (layout, samples) = match image.color {
                ColorMode::Indexed => {
                    let palette = doc
                        .palette(&stream.dict)
                        .ok_or_else(|| decode_failure(image, "unusable /Indexed palette"))?;
                    let indices = unpack_samples(&data, image, 1, false)
                        .map_err(|reason| decode_failure(image, &reason))?;
                    let layout = raw_layout(palette.base)
                        .ok_or_else(|| decode_failure(image, "unsupported palette base"))?;
                    (layout, expand_palette(&indices, &palette))
                }
                mode => {
                    let layout = raw_layout(mode).ok_or_else(|| decode_failure(image, "unsupported colour space"))?;
                    let samples = unpack_samples(&data, image, layout.components(), true)
                        .map_err(|reason| decode_failure(image, &reason))?;
                    (layout, samples)
                }
            };
            ImageProcessor::from_raw(image.width, image.height, layout, samples)
                .map_err(|err| decode_failure(image, &err.to_string()))
        }
        ImageEncoding::Other(filters) => Err(decode_failure(image, &format!("unsupported filter {filters}"))),
    }
}

fn raw_layout(mode: ColorMode) -> Option<RawLayout> {
    match mode {
        ColorMode::Gray => Some(RawLayout::Gray),
        ColorMode::Rgb => Some(RawLayout::Rgb),
        ColorMode::Cmyk => Some(RawLayout::Cmyk),
        ColorMode::Indexed | ColorMode::Other => None,
    }
}

/// Widen packed samples to one byte each. Rows start on a byte boundary;
/// 16-bit samples keep their high byte. With `scale`, 1/2/4-bit values are
/// stretched onto 0..=255; palette indices are passed through as they are.
fn unpack_samples(
    data: &[u8],
    image: &ImageObject,
    components: usize,
    scale: bool,
) -> std::result::Result<Vec<u8>, String> {
    let bits = image.bits_per_component;
    if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        return Err(format!("{bits} bits per component not supported"));
    }
    if image.width == 0 || image.height == 0 {
        return Err("image has no pixels".into());
    }

    let per_row = image.width as usize * components;
    let row_bytes = (per_row * bits as usize).div_ceil(8);
    let needed = row_bytes * image.height as usize;
    if data.len() < needed {
        return Err(format!("stream holds {} bytes, {needed} needed", data.len()));
    }
    let data = &data[..needed];

    match bits {
        8 => Ok(data.to_vec()),
        16 => Ok(data.chunks_exact(2).map(|pair| pair[0]).collect()),
        _ => {
            let max = (1u16 << bits) - 1;
            let per_byte = 8 / bits as usize;
            let mut samples = Vec::with_capacity(per_row * image.height as usize);
            for row in data.chunks_exact(row_bytes) {
                for i in 0..per_row {
                    let shift = 8 - bits as usize * (i % per_byte + 1);
                    let value = (row[i / per_byte] >> shift) as u16 & max;
                    samples.push(if scale { (value * 255 / max) as u8 } else { value as u8 });
                }
            }
            Ok(samples)
        }
    }
}

/// Replace each index with its palette entry. Out-of-range indices take the
/// last entry.
fn expand_palette(indices: &[u8], palette: &Palette) -> Vec<u8> {
    let width = palette.lookup.len() / (palette.hival as usize + 1);
    indices
        .iter()
        .flat_map(|&index| {
            let start = index.min(palette.hival) as usize * width;
            palette.lookup[start..start + width].iter().copied()
        })
        .collect()
}

/// JPEG bytes of a DCT stream, unwrapping a leading Flate layer if present.
fn jpeg_payload(stream: &Stream) -> std::result::Result<Vec<u8>, String> {
    let filters = filter_names(&stream.dict);
    match filters.as_slice() {
        [only] if only == b"DCTDecode" => Ok(stream.content.clone()),
        [first, last] if first == b"FlateDecode" && last == b"DCTDecode" => zlib_inflate(&stream.content),
        _ => Err("unsupported filter chain around DCTDecode".into()),
    }
}

/// Flate-decode a stream, honouring predictors via lopdf and falling back to a
/// plain zlib inflate when lopdf refuses the stream.
fn inflate(stream: &Stream) -> std::result::Result<Vec<u8>, String> {
    match stream.decompressed_content() {
        Ok(content) => Ok(content),
        Err(lopdf_err) => zlib_inflate(&stream.content)
            .map_err(|zlib_err| format!("lopdf: {lopdf_err}; zlib: {zlib_err}")),
    }
}

fn zlib_inflate(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut buffer = Vec::new();
    decoder
        .read_to_end(&mut buffer)
        .map_err(|err| format!("zlib inflate failed: {err}"))?;
    Ok(buffer)
}

/// Swap the stream's contents for a baseline JPEG. The soft mask, if any, is
/// left in place; PDF lets it differ in resolution from the base image.
fn replace_with_jpeg(stream: &mut Stream, jpeg: Vec<u8>, width: u32, height: u32) {
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    stream.dict.set("Width", Object::Integer(width as i64));
    stream.dict.set("Height", Object::Integer(height as i64));
    stream.dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    stream.dict.set("BitsPerComponent", Object::Integer(8));
    stream.dict.remove(b"DecodeParms");
    stream.dict.remove(b"Decode");
    stream.set_content(jpeg);
    stream.allows_compression = false;
}

fn decode_failure(image: &ImageObject, reason: &str) -> PdfwerkError {
    PdfwerkError::DecodeFailure {
        object_id: image.id.0,
        reason: reason.to_string(),
    }
}
