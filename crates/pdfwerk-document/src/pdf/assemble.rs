// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sub-document assembly: copy selected pages (and everything they reference)
// out of a source document into a fresh one.

use std::collections::{HashMap, HashSet};

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use pdfwerk_core::error::{PdfwerkError, Result};
use tracing::{debug, instrument, warn};

use crate::pdf::document::PdfDocument;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against malformed `/Parent` cycles.
const MAX_TREE_DEPTH: usize = 64;

/// Build a new document holding the given pages of `source`, in the given
/// order. `pages` holds 0-based page indices.
///
/// Objects shared between the copied pages (fonts, images) are copied once.
/// References to pages that are not part of the copy, such as link
/// destinations, become `null`.
#[instrument(skip(source), fields(pages = pages.len()))]
pub fn assemble_pages(source: &PdfDocument, pages: &[u32]) -> Result<PdfDocument> {
    if pages.is_empty() {
        return Err(PdfwerkError::InvalidRange("no pages selected".into()));
    }

    let page_ids = source.page_ids();
    let selected = pages
        .iter()
        .map(|&index| {
            page_ids.get(index as usize).copied().ok_or_else(|| {
                PdfwerkError::InvalidRange(format!(
                    "page {} does not exist (document has {} pages)",
                    index + 1,
                    page_ids.len()
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut copier = PageCopier::new(source.inner());
    let pages_id = copier.target.new_object_id();

    let mut kids = Vec::with_capacity(selected.len());
    for page_id in selected {
        kids.push(Object::Reference(copier.copy_page(page_id, pages_id)?));
    }

    let mut target = copier.target;
    let count = kids.len() as i64;
    target.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = target.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    target.trailer.set("Root", catalog_id);

    debug!(objects = target.objects.len(), "sub-document assembled");
    Ok(PdfDocument::from_document(target))
}

/// Copies objects from one document into another, remembering what has
/// already been copied.
struct PageCopier<'a> {
    source: &'a Document,
    target: Document,
    /// Source id to target id of every object copied so far.
    copied: HashMap<ObjectId, ObjectId>,
    /// Page and page-tree node ids of the source; never followed.
    page_tree: HashSet<ObjectId>,
}

impl<'a> PageCopier<'a> {
    fn new(source: &'a Document) -> Self {
        let mut page_tree: HashSet<ObjectId> = source.get_pages().into_values().collect();
        for id in page_tree.clone() {
            let mut current = id;
            for _ in 0..MAX_TREE_DEPTH {
                let Some(parent) = source
                    .get_dictionary(current)
                    .and_then(|dict| dict.get(b"Parent"))
                    .and_then(Object::as_reference)
                    .ok()
                else {
                    break;
                };
                if !page_tree.insert(parent) {
                    break;
                }
                current = parent;
            }
        }

        Self {
            source,
            target: Document::with_version(source.version.clone()),
            copied: HashMap::new(),
            page_tree,
        }
    }

    /// Copy one page under the target page-tree node `parent`.
    fn copy_page(&mut self, page_id: ObjectId, parent: ObjectId) -> Result<ObjectId> {
        let source = self.source;
        let page = source.get_dictionary(page_id).map_err(|err| {
            PdfwerkError::Pdf(format!("cannot read page object {:?}: {}", page_id, err))
        })?;

        let mut copy = Dictionary::new();
        for (key, value) in page.iter() {
            if key == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.copy_object(value));
        }
        for key in INHERITABLE {
            if !copy.has(key)
                && let Some(inherited) = self.inherited(page, key)
            {
                let value = self.copy_object(&inherited);
                copy.set(key.to_vec(), value);
            }
        }
        copy.set("Parent", Object::Reference(parent));

        Ok(self.target.add_object(copy))
    }

    /// Look an attribute up the page's ancestors.
    fn inherited(&self, page: &Dictionary, key: &[u8]) -> Option<Object> {
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        for _ in 0..MAX_TREE_DEPTH {
            let node = self.source.get_dictionary(parent?).ok()?;
            if let Ok(value) = node.get(key) {
                return Some(value.clone());
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
        None
    }

    fn copy_object(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(id) => self.copy_reference(*id),
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dictionary(dict)),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.copy_object(item)).collect())
            }
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.copy_dictionary(&stream.dict);
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn copy_dictionary(&mut self, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            copy.set(key.clone(), self.copy_object(value));
        }
        copy
    }

    fn copy_reference(&mut self, id: ObjectId) -> Object {
        if let Some(&copied) = self.copied.get(&id) {
            return Object::Reference(copied);
        }
        if self.page_tree.contains(&id) {
            return Object::Null;
        }
        let source = self.source;
        let Ok(object) = source.get_object(id) else {
            warn!(?id, "cannot resolve reference, using null");
            return Object::Null;
        };

        // Reserve the id first so cycles resolve to it.
        let new_id = self.target.new_object_id();
        self.copied.insert(id, new_id);
        let copy = self.copy_object(object);
        self.target.objects.insert(new_id, copy);
        Object::Reference(new_id)
    }
}
