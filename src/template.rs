use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{FillError, Result};

/// Rectangle in page user space, origin bottom-left, normalized so x0 <= x1 and y0 <= y1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        (self.x0..=self.x1).contains(&x) && (self.y0..=self.y1).contains(&y)
    }

    fn from_object(obj: &Object, doc: &Document) -> Option<Rect> {
        let arr = resolve(obj, doc)?.as_array().ok()?;
        if arr.len() != 4 {
            return None;
        }
        let mut v = [0.0f32; 4];
        for (slot, o) in v.iter_mut().zip(arr) {
            *slot = as_f32(resolve(o, doc)?)?;
        }
        Some(Rect::new(v[0], v[1], v[2], v[3]))
    }
}

/// Handle to one page dictionary of a [`TemplateDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based
    pub number: u32,
    pub id: ObjectId,
}

/// An entry of a page's `/Annots` array
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub subtype: Option<Vec<u8>>,
    pub field_name: Option<String>,
    pub rect: Option<Rect>,
}

impl Annotation {
    pub fn is_widget(&self) -> bool {
        self.subtype.as_deref() == Some(b"Widget".as_slice())
    }
}

/// A parsed template, exclusively owning its object graph.
#[derive(Debug)]
pub struct TemplateDocument {
    pub(crate) doc: Document,
    pages: Vec<Page>,
}

impl TemplateDocument {
    fn from_document(doc: Document) -> Result<Self> {
        let pages: Vec<Page> = doc
            .get_pages()
            .into_iter()
            .map(|(number, id)| Page { number, id })
            .collect();
        if pages.is_empty() {
            return Err(FillError::MalformedTemplate("document has no pages".into()));
        }
        Ok(Self { doc, pages })
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn has_form_registry(&self) -> bool {
        catalog(&self.doc)
            .map(|c| c.has(b"AcroForm"))
            .unwrap_or(false)
    }

    /// Annotations of `page` in their natural order.
    pub fn annotations(&self, page: Page) -> Result<Vec<Annotation>> {
        let doc = &self.doc;
        let page_dict = doc
            .get_object(page.id)
            .and_then(Object::as_dict)
            .map_err(|e| FillError::MalformedTemplate(format!("page {}: {e}", page.number)))?;

        let Some(annots) = dict_get(page_dict, b"Annots").and_then(|o| resolve(o, doc)) else {
            return Ok(Vec::new());
        };
        let Ok(annots) = annots.as_array() else {
            return Ok(Vec::new());
        };

        Ok(annots
            .iter()
            .filter_map(|entry| resolve(entry, doc)?.as_dict().ok())
            .map(|annot| Annotation {
                subtype: dict_get(annot, b"Subtype")
                    .and_then(|o| resolve(o, doc))
                    .and_then(|o| o.as_name().ok())
                    .map(<[u8]>::to_vec),
                field_name: field_name(annot, doc),
                rect: dict_get(annot, b"Rect").and_then(|o| Rect::from_object(o, doc)),
            })
            .collect())
    }
}

pub struct TemplateLoader;

impl TemplateLoader {
    pub fn load(path: &Path) -> Result<TemplateDocument> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FillError::TemplateNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(FillError::Io(e)),
        };
        log::debug!("read template {} ({} bytes)", path.display(), bytes.len());
        Self::load_bytes(&bytes)
    }

    pub fn load_bytes(bytes: &[u8]) -> Result<TemplateDocument> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| FillError::MalformedTemplate(e.to_string()))?;
        TemplateDocument::from_document(doc)
    }
}

// ========== object graph helpers ==========

#[inline]
pub(crate) fn dict_get<'a>(dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok()
}

/// Follow a reference chain (bounded) to the direct object.
pub(crate) fn resolve<'a>(obj: &'a Object, doc: &'a Document) -> Option<&'a Object> {
    let mut cur = obj;
    for _ in 0..8 {
        match cur {
            Object::Reference(id) => cur = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// Whether an `/Annots` entry (direct or by reference) is a Widget annotation.
pub(crate) fn is_widget(entry: &Object, doc: &Document) -> bool {
    resolve(entry, doc)
        .and_then(|o| o.as_dict().ok())
        .and_then(|d| dict_get(d, b"Subtype"))
        .and_then(|o| resolve(o, doc))
        .and_then(|o| o.as_name().ok())
        == Some(b"Widget".as_slice())
}

pub(crate) fn obj_as_dict_owned(obj: &Object, doc: &Document) -> Option<Dictionary> {
    resolve(obj, doc)?.as_dict().ok().cloned()
}

pub(crate) fn as_f32(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

pub(crate) fn catalog(doc: &Document) -> Option<&Dictionary> {
    let root = doc.trailer.get(b"Root").ok()?;
    resolve(root, doc)?.as_dict().ok()
}

/// Resources of a page, walking up the page tree for inherited ones.
pub(crate) fn effective_resources(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut cur = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..32 {
        if let Some(obj) = dict_get(cur, b"Resources") {
            return obj_as_dict_owned(obj, doc);
        }
        match dict_get(cur, b"Parent") {
            Some(Object::Reference(pid)) => cur = doc.get_object(*pid).ok()?.as_dict().ok()?,
            _ => break,
        }
    }
    None
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise one char per byte.
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn text_string(obj: &Object, doc: &Document) -> Option<String> {
    match resolve(obj, doc)? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

/// `/T` of the widget, or of its direct parent field when the widget is a bare kid.
fn field_name(annot: &Dictionary, doc: &Document) -> Option<String> {
    if let Some(name) = dict_get(annot, b"T").and_then(|o| text_string(o, doc)) {
        return Some(name);
    }
    let parent = dict_get(annot, b"Parent").and_then(|o| resolve(o, doc))?;
    dict_get(parent.as_dict().ok()?, b"T").and_then(|o| text_string(o, doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{StringFormat, dictionary};
    use pretty_assertions::assert_eq;

    fn one_page_doc(annots: Vec<Object>) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let annots_ids: Vec<Object> = annots
            .into_iter()
            .map(|a| Object::Reference(doc.add_object(a)))
            .collect();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Annots" => annots_ids,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_missing_file_is_template_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.pdf");
        let err = TemplateLoader::load(&path).unwrap_err();
        assert!(matches!(err, FillError::TemplateNotFound(p) if p == path));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = TemplateLoader::load_bytes(b"this is not a pdf").unwrap_err();
        assert!(matches!(err, FillError::MalformedTemplate(_)));
    }

    #[test]
    fn test_reads_widget_name_and_normalized_rect() {
        let bytes = one_page_doc(vec![Object::Dictionary(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "T" => Object::string_literal("LastName"),
            "Rect" => vec![250.into(), 420.into(), 100.into(), 400.into()],
        })]);
        let tpl = TemplateLoader::load_bytes(&bytes).unwrap();
        let annots = tpl.annotations(tpl.pages()[0]).unwrap();
        assert_eq!(annots.len(), 1);
        assert!(annots[0].is_widget());
        assert_eq!(annots[0].field_name.as_deref(), Some("LastName"));
        assert_eq!(annots[0].rect, Some(Rect::new(100.0, 400.0, 250.0, 420.0)));
    }

    #[test]
    fn test_widget_kid_inherits_parent_name() {
        let mut doc_bytes_annots = Vec::new();
        let parent = dictionary! {
            "FT" => "Tx",
            "T" => Object::String(vec![0xFE, 0xFF, 0x00, b'N', 0x00, 0xF1], StringFormat::Hexadecimal),
        };
        doc_bytes_annots.push(Object::Dictionary(dictionary! {
            "Subtype" => "Widget",
            "Parent" => Object::Dictionary(parent),
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
        }));
        let tpl = TemplateLoader::load_bytes(&one_page_doc(doc_bytes_annots)).unwrap();
        let annots = tpl.annotations(tpl.pages()[0]).unwrap();
        assert_eq!(annots[0].field_name.as_deref(), Some("Nñ"));
    }

    #[test]
    fn test_page_without_annots_has_none() {
        let tpl = TemplateLoader::load_bytes(&one_page_doc(Vec::new())).unwrap();
        assert_eq!(tpl.page_count(), 1);
        assert!(!tpl.has_form_registry());
    }

    #[test]
    fn test_decode_text_string_latin1() {
        assert_eq!(decode_text_string(b"Last\xd1ame"), "LastÑame");
    }
}
