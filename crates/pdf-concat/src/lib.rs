//! # pdf-concat
//!
//! Concatenate whole PDF documents page-by-page, in exactly the order the
//! caller lists them.
//!
//! ## How it works
//!
//! A fresh output document is created with an empty page tree. For every
//! input, in order:
//!
//! 1. Object ids are reserved for all of its pages up front, so references
//!    between pages (link annotations, `/Dest` arrays) resolve to the copies.
//! 2. Each page dictionary is deep-copied together with everything it
//!    references (content streams, fonts, images, annotations). Already
//!    copied objects are reused, which also breaks reference cycles.
//! 3. Attributes a page inherits from its source page tree (`Resources`,
//!    `MediaBox`, `CropBox`, `Rotate`) are written onto the page itself,
//!    because the copy is re-parented under the output tree.
//!
//! Document-level structures (outlines, named destinations, AcroForm) are not
//! carried over.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pdf_concat::merge_files;
//! use std::path::{Path, PathBuf};
//!
//! let inputs = vec![PathBuf::from("cover.pdf"), PathBuf::from("body.pdf")];
//! let summary = merge_files(&inputs, Path::new("merged.pdf")).expect("merge failed");
//! println!("{} pages", summary.pages);
//! ```

mod error;

pub use error::ConcatError;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Page attributes that may be inherited from an ancestor `Pages` node.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Upper bound on page-tree depth when resolving inherited attributes.
const MAX_TREE_DEPTH: usize = 64;

/// Outcome of a successful [`merge_files`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    /// Number of input documents.
    pub documents: usize,
    /// Pages in the written output.
    pub pages: usize,
}

/// Concatenate the PDFs at `inputs` (in slice order) and write the result to
/// `output`.
///
/// `output` is created or truncated. If this returns an error, `output` may
/// exist with partial content; callers are expected to discard it.
pub fn merge_files(inputs: &[PathBuf], output: &Path) -> Result<MergeSummary, ConcatError> {
    if inputs.is_empty() {
        return Err(ConcatError::EmptyInput);
    }

    let mut documents = Vec::with_capacity(inputs.len());
    for path in inputs {
        let bytes = std::fs::read(path).map_err(|source| ConcatError::Io {
            path: path.clone(),
            source,
        })?;
        let document = Document::load_mem(&bytes).map_err(|source| ConcatError::Parse {
            path: path.clone(),
            source,
        })?;
        debug!(
            "Loaded {} ({} pages)",
            path.display(),
            document.get_pages().len()
        );
        documents.push(document);
    }

    let mut merged = concat_documents(documents)?;
    let pages = merged.get_pages().len();

    let file = File::create(output).map_err(|source| ConcatError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    merged
        .save_to(&mut writer)
        .map_err(|e| ConcatError::Write {
            path: output.to_path_buf(),
            detail: e.to_string(),
        })?;
    writer.flush().map_err(|source| ConcatError::Io {
        path: output.to_path_buf(),
        source,
    })?;

    info!(
        "Merged {} documents into {} ({} pages)",
        inputs.len(),
        output.display(),
        pages
    );

    Ok(MergeSummary {
        documents: inputs.len(),
        pages,
    })
}

/// Build one document holding every page of `documents`, in order.
///
/// The output uses the PDF version of the first input.
pub fn concat_documents(documents: Vec<Document>) -> Result<Document, ConcatError> {
    let first = documents.first().ok_or(ConcatError::EmptyInput)?;

    let mut target = Document::with_version(first.version.clone());
    let pages_id = target.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for (index, source) in documents.iter().enumerate() {
        let copied = PageCopier::new(source, &mut target).copy_pages(pages_id)?;
        debug!("Document {} contributed {} pages", index + 1, copied.len());
        kids.extend(copied.into_iter().map(Object::Reference));
    }

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

    Ok(target)
}

/// Copies the pages of one source document into the output document.
struct PageCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    id_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageCopier<'a> {
    fn new(source: &'a Document, target: &'a mut Document) -> Self {
        Self {
            source,
            target,
            id_map: HashMap::new(),
        }
    }

    /// Copy every page of the source, re-parented under `pages_id`.
    /// Returns the new page ids in source page order.
    fn copy_pages(&mut self, pages_id: ObjectId) -> Result<Vec<ObjectId>, ConcatError> {
        let page_ids: Vec<ObjectId> = self.source.get_pages().into_values().collect();

        for &source_id in &page_ids {
            let new_id = self.target.add_object(Object::Null);
            self.id_map.insert(source_id, new_id);
        }

        let mut copied = Vec::with_capacity(page_ids.len());
        for source_id in page_ids {
            let mut page = self.source.get_object(source_id)?.as_dict()?.clone();
            for key in INHERITABLE_KEYS {
                if !page.has(key) {
                    if let Some(value) = inherited_attribute(self.source, &page, key) {
                        page.set(key, value);
                    }
                }
            }
            // Dropping Parent keeps the source page tree out of the copy.
            page.remove(b"Parent");

            let mut remapped = self.remap(Object::Dictionary(page))?;
            if let Object::Dictionary(ref mut dict) = remapped {
                dict.set("Parent", Object::Reference(pages_id));
            }

            let new_id = *self.id_map.get(&source_id).ok_or_else(|| {
                ConcatError::Structure(format!("page {source_id:?} has no reserved id"))
            })?;
            self.target.objects.insert(new_id, remapped);
            copied.push(new_id);
        }

        Ok(copied)
    }

    /// Deep-copy one object, returning its id in the target document.
    fn copy_object(&mut self, source_id: ObjectId) -> Result<ObjectId, ConcatError> {
        if let Some(&target_id) = self.id_map.get(&source_id) {
            return Ok(target_id);
        }

        // Register the id before recursing so cycles terminate.
        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);

        // A dangling reference is equivalent to null.
        let object = match self.source.get_object(source_id) {
            Ok(object) => object.clone(),
            Err(_) => Object::Null,
        };
        let remapped = self.remap(object)?;
        self.target.objects.insert(new_id, remapped);

        Ok(new_id)
    }

    fn remap(&mut self, object: Object) -> Result<Object, ConcatError> {
        Ok(match object {
            Object::Reference(id) => Object::Reference(self.copy_object(id)?),
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.remap(item))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Object::Dictionary(mut dict) => {
                self.remap_dict(&mut dict)?;
                Object::Dictionary(dict)
            }
            Object::Stream(mut stream) => {
                self.remap_dict(&mut stream.dict)?;
                Object::Stream(stream)
            }
            other => other,
        })
    }

    fn remap_dict(&mut self, dict: &mut Dictionary) -> Result<(), ConcatError> {
        for (_, value) in dict.iter_mut() {
            let taken = std::mem::replace(value, Object::Null);
            *value = self.remap(taken)?;
        }
        Ok(())
    }
}

/// Walk up the page tree from `page` looking for `key`.
fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_object(parent?).and_then(Object::as_dict).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}
