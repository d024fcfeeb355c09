// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decode, downsample, colour-normalise, and JPEG-encode the
// raster images pulled out of PDF streams. Operates on in-memory images using
// the `image` crate.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, LumaA, Rgb, RgbImage, Rgba};
use pdfwerk_core::error::PdfwerkError;
use tracing::{debug, instrument};

/// Sample layout of an unfiltered (or Flate-decoded) PDF image stream with 8
/// bits per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawLayout {
    Gray,
    Rgb,
    Cmyk,
}

impl RawLayout {
    /// Bytes per pixel.
    pub fn components(&self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }
}

/// Image processing pipeline operating on a single in-memory image.
///
/// Each transformation consumes `self` and returns a new `ImageProcessor`,
/// enabling method chaining:
///
/// ```ignore
/// let jpeg = ImageProcessor::from_bytes(&stream_bytes)?
///     .fit_within(1500)
///     .flatten_to_rgb()
///     .to_jpeg_bytes(50)?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Create a processor from encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, PdfwerkError> {
        let img = image::load_from_memory(data).map_err(|err| {
            PdfwerkError::Pdf(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Build an image from raw 8-bit samples as stored in a PDF stream.
    ///
    /// CMYK samples are converted to RGB with the naive subtractive formula;
    /// there is no colour management.
    pub fn from_raw(
        width: u32,
        height: u32,
        layout: RawLayout,
        samples: Vec<u8>,
    ) -> Result<Self, PdfwerkError> {
        let expected = width as usize * height as usize * layout.components();
        if width == 0 || height == 0 || samples.len() < expected {
            return Err(PdfwerkError::Pdf(format!(
                "raw image {}x{} needs {} bytes, stream has {}",
                width,
                height,
                expected,
                samples.len()
            )));
        }

        let mut samples = samples;
        samples.truncate(expected);

        let image = match layout {
            RawLayout::Gray => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
            RawLayout::Rgb => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
            RawLayout::Cmyk => {
                let rgb: Vec<u8> = samples.chunks_exact(4).flat_map(cmyk_to_rgb).collect();
                RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
            }
        }
        .ok_or_else(|| PdfwerkError::Pdf("raw image buffer has the wrong size".into()))?;

        Ok(Self { image })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    /// Current image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Current image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Consume the processor and return the underlying `DynamicImage`.
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Downsample so that neither side exceeds `max_dimension`, preserving
    /// aspect ratio. Uses Lanczos3 filtering. Images already within bounds are
    /// returned unchanged.
    #[instrument(skip(self), fields(max_dimension))]
    pub fn fit_within(self, max_dimension: u32) -> Self {
        if self.image.width() <= max_dimension && self.image.height() <= max_dimension {
            return self;
        }
        let resized = self
            .image
            .resize(max_dimension, max_dimension, FilterType::Lanczos3);
        debug!(
            new_w = resized.width(),
            new_h = resized.height(),
            "Resize complete"
        );
        Self { image: resized }
    }

    /// Normalise to opaque 8-bit RGB.
    ///
    /// Alpha is composited onto white: RGBA onto white RGB, gray+alpha onto a
    /// white luma background before widening to RGB. Every other mode is
    /// converted directly.
    pub fn flatten_to_rgb(self) -> Self {
        let flattened = match self.image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            DynamicImage::ImageLumaA8(gray_alpha) => {
                let gray = GrayImage::from_fn(gray_alpha.width(), gray_alpha.height(), |x, y| {
                    let LumaA([l, a]) = *gray_alpha.get_pixel(x, y);
                    Luma([blend_on_white(l, a)])
                });
                DynamicImage::ImageLuma8(gray).to_rgb8()
            }
            other if other.color().has_alpha() => {
                let rgba = other.to_rgba8();
                RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                    let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
                    Rgb([blend_on_white(r, a), blend_on_white(g, a), blend_on_white(b, a)])
                })
            }
            other => other.to_rgb8(),
        };
        Self {
            image: DynamicImage::ImageRgb8(flattened),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, PdfwerkError> {
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder).map_err(|err| {
            PdfwerkError::Pdf(format!("JPEG encoding failed: {}", err))
        })?;
        Ok(buffer)
    }
}

/// Composite one channel over white at the given alpha.
fn blend_on_white(channel: u8, alpha: u8) -> u8 {
    let alpha = alpha as u32;
    ((channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8
}

fn cmyk_to_rgb(cmyk: &[u8]) -> [u8; 3] {
    let k = 255 - cmyk[3] as u32;
    let channel = |v: u8| ((255 - v as u32) * k / 255) as u8;
    [channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]
}
