// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic PDFs for unit tests.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

/// Raw RGB samples: a smooth gradient, which JPEG compresses well.
pub fn gradient_rgb(width: u32, height: u32) -> Vec<u8> {
    let mut samples = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            samples.push((x * 255 / width.max(1)) as u8);
            samples.push((y * 255 / height.max(1)) as u8);
            samples.push(128);
        }
    }
    samples
}

/// An unfiltered DeviceRGB image stream.
pub fn raw_rgb_image(width: u32, height: u32) -> Stream {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    let mut stream = Stream::new(dict, gradient_rgb(width, height));
    stream.allows_compression = false;
    stream
}

/// A DCTDecode image stream holding a real JPEG.
pub fn jpeg_image(width: u32, height: u32, quality: u8) -> Stream {
    let rgb = image::RgbImage::from_raw(width, height, gradient_rgb(width, height))
        .expect("gradient buffer");
    let jpeg = crate::image::ImageProcessor::from_dynamic(image::DynamicImage::ImageRgb8(rgb))
        .to_jpeg_bytes(quality)
        .expect("encode fixture jpeg");
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    let mut stream = Stream::new(dict, jpeg);
    stream.allows_compression = false;
    stream
}

fn page_content(draws_image: bool, label: &str) -> Vec<u8> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 24.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
        Operation::new("Tj", vec![Object::string_literal(label)]),
        Operation::new("ET", vec![]),
    ];
    if draws_image {
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![200.into(), 0.into(), 0.into(), 200.into(), 72.into(), 400.into()],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ]);
    }
    Content { operations }.encode().expect("encode content")
}

/// Build a document with `pages` pages. `resources_for` supplies each page's
/// resource dictionary (or `None` to leave it off the page).
fn build(
    pages: u32,
    mut resources_for: impl FnMut(&mut Document, u32) -> Option<Dictionary>,
    draws_image: bool,
) -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for index in 0..pages {
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            page_content(draws_image, &format!("Page {}", index + 1)),
        ));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if let Some(mut resources) = resources_for(&mut doc, index) {
            resources.set("Font", dictionary! { "F1" => font_id });
            page.set("Resources", resources);
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    (doc, pages_id)
}

/// Text-only pages.
pub fn text_document(pages: u32) -> Document {
    build(pages, |_, _| Some(Dictionary::new()), false).0
}

/// Every page draws the same raw RGB image object.
pub fn shared_image_document(pages: u32, width: u32, height: u32) -> Document {
    let mut image_id = None;
    build(
        pages,
        |doc, _| {
            let id = *image_id.get_or_insert_with(|| doc.add_object(raw_rgb_image(width, height)));
            Some(dictionary! { "XObject" => dictionary! { "Im0" => id } })
        },
        true,
    )
    .0
}

/// One page per supplied image stream, each drawing its own image.
pub fn document_with_images(images: Vec<Stream>) -> Document {
    let mut images = images.into_iter();
    let count = images.len() as u32;
    build(
        count,
        |doc, _| {
            let stream = images.next()?;
            let id = doc.add_object(stream);
            Some(dictionary! { "XObject" => dictionary! { "Im0" => id } })
        },
        true,
    )
    .0
}

/// A single page whose image is only reachable through a Form XObject.
pub fn form_wrapped_image_document(width: u32, height: u32) -> Document {
    build(
        1,
        |doc, _| {
            let image_id = doc.add_object(raw_rgb_image(width, height));
            let form = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), 1.into(), 1.into()],
                    "Resources" => dictionary! {
                        "XObject" => dictionary! { "Im0" => image_id },
                    },
                },
                b"q /Im0 Do Q".to_vec(),
            );
            let form_id = doc.add_object(form);
            Some(dictionary! { "XObject" => dictionary! { "Im0" => form_id } })
        },
        true,
    )
    .0
}

/// A single page with no `/Resources` of its own; the image comes from the
/// page-tree root.
pub fn inherited_resources_document(width: u32, height: u32) -> Document {
    let (mut doc, pages_id) = build(1, |_, _| None, true);
    let image_id = doc.add_object(raw_rgb_image(width, height));
    if let Ok(Object::Dictionary(pages)) = doc.get_object_mut(pages_id) {
        pages.set(
            "Resources",
            dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
        );
    }
    doc
}
