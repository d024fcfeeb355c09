// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF document handle: open, inspect, enumerate embedded images, and save
// existing PDF documents using the `lopdf` crate.

use std::collections::HashSet;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pdfwerk_core::error::PdfwerkError;
use tracing::{debug, info, instrument};

/// Depth limit when walking `/Parent` chains and nested Form XObjects.
const MAX_NESTING: usize = 64;

/// Opaque handle over a parsed PDF.
///
/// Wraps `lopdf::Document`; the document is released when the handle is
/// dropped, so every exit path of the owning operation frees it.
#[derive(Debug)]
pub struct PdfDocument {
    /// The underlying lopdf document.
    document: Document,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
}

/// How an image stream's bytes are encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageEncoding {
    /// `DCTDecode` somewhere in the filter chain.
    Jpeg,
    /// `FlateDecode` only.
    Flate,
    /// No filter: raw samples.
    Raw,
    /// Anything else (JPX, JBIG2, CCITT, LZW, ...).
    Other(String),
}

/// Colour space of an image stream, as far as recompression cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Gray,
    Rgb,
    Cmyk,
    /// Palette colour; see [`PdfDocument::palette`].
    Indexed,
    /// Separation, DeviceN, Lab, or unknown.
    Other,
}

/// The lookup table of an `/Indexed` colour space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    /// Colour mode of the table entries; never `Indexed` or `Other`.
    pub base: ColorMode,
    /// Highest valid index.
    pub hival: u8,
    /// `(hival + 1) * components(base)` bytes.
    pub lookup: Vec<u8>,
}

impl ColorMode {
    /// Samples per pixel in the image stream (an index counts as one).
    pub fn components(&self) -> Option<usize> {
        match self {
            Self::Gray | Self::Indexed => Some(1),
            Self::Rgb => Some(3),
            Self::Cmyk => Some(4),
            Self::Other => None,
        }
    }
}

/// An embedded raster image, identified by its object id.
///
/// Only produced by [`PdfDocument::image_objects`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageObject {
    pub id: ObjectId,
    /// Size of the encoded stream as stored in the file.
    pub raw_len: usize,
    pub encoding: ImageEncoding,
    pub width: u32,
    pub height: u32,
    pub color: ColorMode,
    pub bits_per_component: u8,
    /// Whether the stream carries a `/Decode` array (inverted or remapped
    /// samples).
    pub has_decode_array: bool,
}

impl PdfDocument {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PdfwerkError> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| {
            PdfwerkError::Pdf(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Create a handle from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, PdfwerkError> {
        let document = Document::load_mem(data).map_err(|err| {
            PdfwerkError::Pdf(format!("failed to load PDF from memory: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self {
            document,
            source_path: None,
        })
    }

    /// Wrap an already-built lopdf document.
    pub fn from_document(document: Document) -> Self {
        Self {
            document,
            source_path: None,
        }
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Page object ids in page order.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.document.get_pages().into_values().collect()
    }

    /// Return the source path if the handle was created via [`PdfDocument::open`].
    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    pub(crate) fn inner(&self) -> &Document {
        &self.document
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Borrow an object as a stream.
    pub(crate) fn stream(&self, id: ObjectId) -> Option<&Stream> {
        match self.document.objects.get(&id) {
            Some(Object::Stream(stream)) => Some(stream),
            _ => None,
        }
    }

    /// Resolve a page's `/Resources`, following `/Parent` for inherited ones.
    pub(crate) fn page_resources(&self, page_id: ObjectId) -> Option<&Dictionary> {
        let mut current = Some(page_id);
        for _ in 0..MAX_NESTING {
            let dict = self.document.get_dictionary(current?).ok()?;
            if let Ok(resources) = dict.get(b"Resources") {
                return resolve(&self.document, resources)?.as_dict().ok();
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }
        None
    }

    // -- Images ---------------------------------------------------------------

    /// Enumerate every raster image reachable from any page.
    ///
    /// An image drawn on several pages (or through several Form XObjects) is
    /// listed once. Stencil masks are not listed; soft masks are never
    /// reachable through `/XObject` and so are not listed either.
    #[instrument(skip(self))]
    pub fn image_objects(&self) -> Vec<ImageObject> {
        let mut visited = HashSet::new();
        let mut images = Vec::new();

        for page_id in self.page_ids() {
            if let Some(resources) = self.page_resources(page_id) {
                self.collect_images(resources, &mut visited, &mut images, 0);
            }
        }

        debug!(count = images.len(), "images enumerated");
        images
    }

    fn collect_images(
        &self,
        resources: &Dictionary,
        visited: &mut HashSet<ObjectId>,
        images: &mut Vec<ImageObject>,
        depth: usize,
    ) {
        if depth >= MAX_NESTING {
            return;
        }
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|obj| resolve(&self.document, obj))
            .and_then(|obj| obj.as_dict().ok())
        else {
            return;
        };

        for (_, value) in xobjects.iter() {
            let Ok(id) = value.as_reference() else {
                continue;
            };
            if !visited.insert(id) {
                continue;
            }
            let Some(stream) = self.stream(id) else {
                continue;
            };

            match name_of(&stream.dict, b"Subtype") {
                Some(b"Image") => {
                    let is_stencil = stream
                        .dict
                        .get(b"ImageMask")
                        .and_then(Object::as_bool)
                        .unwrap_or(false);
                    if !is_stencil {
                        images.push(self.describe_image(id, stream));
                    }
                }
                Some(b"Form") => {
                    if let Some(form_resources) = stream
                        .dict
                        .get(b"Resources")
                        .ok()
                        .and_then(|obj| resolve(&self.document, obj))
                        .and_then(|obj| obj.as_dict().ok())
                    {
                        self.collect_images(form_resources, visited, images, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    fn describe_image(&self, id: ObjectId, stream: &Stream) -> ImageObject {
        let dict = &stream.dict;
        let int = |key: &[u8]| dict.get(key).and_then(Object::as_i64).unwrap_or(0).max(0);

        ImageObject {
            id,
            raw_len: stream.content.len(),
            encoding: image_encoding(dict),
            width: int(b"Width") as u32,
            height: int(b"Height") as u32,
            color: self.color_mode(dict),
            bits_per_component: int(b"BitsPerComponent").min(u8::MAX as i64) as u8,
            has_decode_array: dict.has(b"Decode"),
        }
    }

    fn color_mode(&self, dict: &Dictionary) -> ColorMode {
        dict.get(b"ColorSpace")
            .ok()
            .map_or(ColorMode::Other, |space| self.space_mode(space))
    }

    fn space_mode(&self, space: &Object) -> ColorMode {
        match resolve(&self.document, space) {
            Some(Object::Name(name)) => device_color_mode(name),
            Some(Object::Array(items)) => {
                let family = items.first().and_then(|obj| obj.as_name().ok());
                match family {
                    Some(b"ICCBased") => {
                        let components = items
                            .get(1)
                            .and_then(|obj| resolve(&self.document, obj))
                            .and_then(|obj| obj.as_stream().ok())
                            .and_then(|icc| icc.dict.get(b"N").and_then(Object::as_i64).ok());
                        match components {
                            Some(1) => ColorMode::Gray,
                            Some(3) => ColorMode::Rgb,
                            Some(4) => ColorMode::Cmyk,
                            _ => ColorMode::Other,
                        }
                    }
                    Some(b"CalGray") => ColorMode::Gray,
                    Some(b"CalRGB") => ColorMode::Rgb,
                    Some(b"Indexed" | b"I") => ColorMode::Indexed,
                    _ => ColorMode::Other,
                }
            }
            _ => ColorMode::Other,
        }
    }

    /// Resolve the palette of an image whose colour space is
    /// `[/Indexed base hival lookup]`. The lookup may be a string or a stream.
    /// `None` when the space is not indexed, the base is not a device-like
    /// space, or the table is too short.
    pub fn palette(&self, image_dict: &Dictionary) -> Option<Palette> {
        let space = image_dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|obj| resolve(&self.document, obj))?;
        let Object::Array(items) = space else {
            return None;
        };
        let [family, base, hival, lookup] = items.as_slice() else {
            return None;
        };
        if !matches!(family.as_name(), Ok(b"Indexed" | b"I")) {
            return None;
        }

        let base = match self.space_mode(base) {
            mode @ (ColorMode::Gray | ColorMode::Rgb | ColorMode::Cmyk) => mode,
            ColorMode::Indexed | ColorMode::Other => return None,
        };
        let hival = resolve(&self.document, hival)?.as_i64().ok()?.clamp(0, 255) as u8;
        let mut lookup = match resolve(&self.document, lookup)? {
            Object::String(bytes, _) => bytes.clone(),
            Object::Stream(stream) => stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone()),
            _ => return None,
        };

        let needed = (hival as usize + 1) * base.components()?;
        if lookup.len() < needed {
            return None;
        }
        lookup.truncate(needed);
        Some(Palette { base, hival, lookup })
    }

    // -- Output ---------------------------------------------------------------

    /// Serialise the document to `path`.
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), PdfwerkError> {
        let path_ref = path.as_ref();
        self.document.save(path_ref).map_err(|err| {
            PdfwerkError::Pdf(format!("failed to write {}: {}", path_ref.display(), err))
        })?;
        debug!("PDF written");
        Ok(())
    }

    /// Serialise the document to bytes.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, PdfwerkError> {
        let mut output = Vec::new();
        self.document.save_to(&mut output).map_err(|err| {
            PdfwerkError::Pdf(format!("failed to serialise PDF: {}", err))
        })?;
        Ok(output)
    }
}

/// Follow one level of indirection.
pub(crate) fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn name_of<'a>(dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    dict.get(key).and_then(Object::as_name).ok()
}

/// Names of the filters applied to a stream, in order.
pub(crate) fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn image_encoding(dict: &Dictionary) -> ImageEncoding {
    let filters = filter_names(dict);
    if filters.is_empty() {
        ImageEncoding::Raw
    } else if filters.iter().any(|f| f == b"DCTDecode") {
        ImageEncoding::Jpeg
    } else if filters.iter().all(|f| f == b"FlateDecode") {
        ImageEncoding::Flate
    } else {
        let names: Vec<String> = filters
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();
        ImageEncoding::Other(names.join("+"))
    }
}

fn device_color_mode(name: &[u8]) -> ColorMode {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" => ColorMode::Gray,
        b"DeviceRGB" | b"CalRGB" | b"RGB" => ColorMode::Rgb,
        b"DeviceCMYK" | b"CMYK" => ColorMode::Cmyk,
        _ => ColorMode::Other,
    }
}
