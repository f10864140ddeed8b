//! PDF object-model abstraction
//!
//! The parser only talks to documents through these traits so that the
//! underlying library can be swapped out (and faulty documents simulated in
//! tests). [`LopdfBackend`] is the production implementation.

use super::errors::{ErrorKind, PdfError};
use crate::cache::ObjectKey;
use lopdf::{Document, Object, ObjectId};
use std::path::Path;

/// Opens PDF documents
pub trait PdfBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, PdfError>;

    fn open_bytes(&self, data: &[u8]) -> Result<Box<dyn PdfDocument>, PdfError>;
}

/// An opened PDF document
pub trait PdfDocument: Send {
    fn page_count(&self) -> u32;

    /// 1-indexed page access. `None` when the page object is missing or null.
    fn page(&self, number: u32) -> Option<Box<dyn PdfPage + '_>>;
}

/// A single page of an opened document
pub trait PdfPage {
    /// Object identifier of the page dictionary, when known
    fn object_key(&self) -> Option<ObjectKey>;

    /// Look up a page attribute, following inheritance through the page tree
    /// and resolving indirect references. `None` when absent or null.
    fn attribute(&self, name: &str) -> Option<Object>;

    /// Resolve an indirect reference; direct objects are returned as-is
    fn resolve(&self, obj: &Object) -> Option<Object>;

    /// Plain text content of the page
    fn plain_text(&self) -> Result<String, PdfError>;
}

/// Backend built on the `lopdf` object model
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfBackend;

impl LopdfBackend {
    fn wrap(doc: Document) -> Box<dyn PdfDocument> {
        let page_ids = doc.get_pages().into_values().collect();
        Box::new(LopdfDocument { doc, page_ids })
    }
}

impl PdfBackend for LopdfBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, PdfError> {
        let doc = Document::load(path).map_err(|e| {
            PdfError::new(ErrorKind::InvalidHeader, format!("failed to open PDF: {}", e))
        })?;
        Ok(Self::wrap(doc))
    }

    fn open_bytes(&self, data: &[u8]) -> Result<Box<dyn PdfDocument>, PdfError> {
        let doc = Document::load_mem(data).map_err(|e| {
            PdfError::new(ErrorKind::InvalidHeader, format!("failed to parse PDF: {}", e))
        })?;
        Ok(Self::wrap(doc))
    }
}

struct LopdfDocument {
    doc: Document,
    /// Page object ids in page order
    page_ids: Vec<ObjectId>,
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    fn page(&self, number: u32) -> Option<Box<dyn PdfPage + '_>> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        let id = *self.page_ids.get(index)?;
        match self.doc.get_object(id) {
            Ok(Object::Dictionary(_)) => Some(Box::new(LopdfPage {
                doc: &self.doc,
                id,
                number,
            })),
            _ => None,
        }
    }
}

struct LopdfPage<'a> {
    doc: &'a Document,
    id: ObjectId,
    number: u32,
}

// Guards against /Parent cycles in damaged page trees
const MAX_PAGE_TREE_DEPTH: usize = 64;

impl LopdfPage<'_> {
    /// Walk up the page tree via /Parent until `key` is found
    fn resolve_inherited(&self, key: &[u8]) -> Option<&Object> {
        let mut current = self.id;
        for _ in 0..MAX_PAGE_TREE_DEPTH {
            let dict = self.doc.get_object(current).and_then(Object::as_dict).ok()?;
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        }
        None
    }
}

impl PdfPage for LopdfPage<'_> {
    fn object_key(&self) -> Option<ObjectKey> {
        Some(self.id.into())
    }

    fn attribute(&self, name: &str) -> Option<Object> {
        let value = self.resolve_inherited(name.as_bytes())?;
        self.resolve(value)
    }

    fn resolve(&self, obj: &Object) -> Option<Object> {
        let resolved = match obj {
            Object::Reference(id) => self.doc.get_object(*id).ok()?,
            other => other,
        };
        match resolved {
            Object::Null => None,
            other => Some(other.clone()),
        }
    }

    fn plain_text(&self) -> Result<String, PdfError> {
        self.doc.extract_text(&[self.number]).map_err(|e| {
            PdfError::new(
                ErrorKind::MalformedPage,
                format!("page {} text extraction failed: {}", self.number, e),
            )
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a document with `pages` pages, each showing one line of text.
    /// Pages listed in `without_media_box` get no MediaBox anywhere in
    /// their inheritance chain.
    pub fn document(pages: u32, without_media_box: &[u32]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for number in 1..=pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("Page {}", number))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().unwrap_or_default(),
            ));
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            };
            if !without_media_box.contains(&number) {
                let media_box: Vec<Object> = vec![0.into(), 0.into(), 612.into(), 792.into()];
                page.set("MediaBox", media_box);
            }
            kids.push(doc.add_object(page).into());
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
        doc
    }

    pub fn pdf_bytes(pages: u32) -> Vec<u8> {
        let mut doc = document(pages, &[]);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("serialize fixture");
        buf
    }

    /// Serialized document with its cross-reference section and trailer cut
    /// off. Handles both a classic `xref` table and an XRef stream object.
    pub fn truncated_pdf_bytes(pages: u32) -> Vec<u8> {
        let data = pdf_bytes(pages);
        if let Some(pos) = data.windows(5).rposition(|w| w == b"\nxref") {
            return data[..pos + 1].to_vec();
        }

        let marker = data
            .windows(5)
            .rposition(|w| w == b"/XRef")
            .expect("fixture has a cross-reference section");
        let xref_object = crate::pdf::xref::scan_object_offsets(&data)
            .values()
            .map(|loc| loc.offset)
            .filter(|&offset| offset < marker)
            .max()
            .expect("xref stream object header");
        data[..xref_object].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    #[test]
    fn test_open_bytes_and_pages() {
        let doc = LopdfBackend.open_bytes(&fixtures::pdf_bytes(3)).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert!(doc.page(0).is_none());
        assert!(doc.page(4).is_none());

        let page = doc.page(2).unwrap();
        assert!(page.object_key().is_some());
        assert!(matches!(page.attribute("MediaBox"), Some(Object::Array(_))));
        assert!(matches!(page.attribute("Resources"), Some(Object::Dictionary(_))));
        assert!(page.attribute("Rotate").is_none());
        assert!(page.plain_text().unwrap().contains("Page 2"));
    }

    #[test]
    fn test_attribute_inherited_from_parent() {
        let mut doc = fixtures::document(1, &[1]);
        let pages_id = doc
            .catalog()
            .and_then(|c| c.get(b"Pages"))
            .and_then(Object::as_reference)
            .unwrap();
        doc.get_object_mut(pages_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set("MediaBox", vec![Object::from(0), 0.into(), 100.into(), 100.into()]);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();

        let doc = LopdfBackend.open_bytes(&buf).unwrap();
        let page = doc.page(1).unwrap();
        assert!(page.attribute("MediaBox").is_some());
    }

    #[test]
    fn test_open_garbage_is_invalid_header() {
        let err = LopdfBackend.open_bytes(b"not a pdf at all").err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidHeader);
    }

    #[test]
    fn test_open_missing_file() {
        let err = LopdfBackend
            .open(Path::new("/nonexistent/file.pdf"))
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidHeader);
    }
}
