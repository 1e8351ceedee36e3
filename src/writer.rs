use std::collections::HashSet;
use std::io::Write;

use lopdf::{Document, Object, ObjectId};

use crate::error::{FillError, Result};
use crate::template::{TemplateDocument, dict_get, is_widget, resolve};

/// Maximum nesting followed while checking page references
const MAX_DEPTH: usize = 64;

pub struct DocumentWriter;

impl DocumentWriter {
    /// Validate, prune and serialize; the document is consumed.
    pub fn write(template: TemplateDocument) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        Self::write_to(template, &mut out)?;
        Ok(out)
    }

    /// Serialize into `sink`. Nothing is written when validation fails.
    pub fn write_to<W: Write>(template: TemplateDocument, sink: &mut W) -> Result<()> {
        let pages = template.pages().to_vec();
        let mut doc = template.doc;

        for page in &pages {
            let page_dict = doc
                .get_object(page.id)
                .and_then(Object::as_dict)
                .map_err(|e| {
                    FillError::SerializationError(format!("page {} is gone: {e}", page.number))
                })?;
            if has_widgets(page_dict, &doc) {
                return Err(FillError::SerializationError(format!(
                    "page {} still carries widget annotations",
                    page.number
                )));
            }
            let mut seen = HashSet::new();
            for (key, value) in page_dict.iter() {
                if key.as_slice() == b"Parent" {
                    continue;
                }
                check_references(&doc, value, &mut seen, 0).map_err(|missing| {
                    FillError::SerializationError(format!(
                        "page {} /{} references missing object {} {}",
                        page.number,
                        String::from_utf8_lossy(key),
                        missing.0,
                        missing.1
                    ))
                })?;
            }
        }

        let pruned = doc.prune_objects();
        log::debug!("pruned {} orphaned object(s)", pruned.len());
        let _ = doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| FillError::SerializationError(e.to_string()))?;
        sink.write_all(&bytes)?;
        log::debug!("wrote {} bytes", bytes.len());
        Ok(())
    }
}

fn has_widgets(page: &lopdf::Dictionary, doc: &Document) -> bool {
    let Some(Object::Array(annots)) = dict_get(page, b"Annots").and_then(|o| resolve(o, doc)) else {
        return false;
    };
    annots.iter().any(|entry| is_widget(entry, doc))
}

/// Every reference reachable from `obj` must resolve; returns the first that does not.
fn check_references(
    doc: &Document,
    obj: &Object,
    seen: &mut HashSet<ObjectId>,
    depth: usize,
) -> std::result::Result<(), ObjectId> {
    if depth > MAX_DEPTH {
        return Ok(());
    }
    match obj {
        Object::Reference(id) => {
            if !seen.insert(*id) {
                return Ok(());
            }
            let target = doc.get_object(*id).map_err(|_| *id)?;
            check_references(doc, target, seen, depth + 1)
        }
        Object::Array(arr) => arr
            .iter()
            .try_for_each(|o| check_references(doc, o, seen, depth + 1)),
        Object::Dictionary(dict) => dict
            .iter()
            .filter(|(k, _)| k.as_slice() != b"Parent" && k.as_slice() != b"P")
            .try_for_each(|(_, o)| check_references(doc, o, seen, depth + 1)),
        Object::Stream(stream) => stream
            .dict
            .iter()
            .try_for_each(|(_, o)| check_references(doc, o, seen, depth + 1)),
        _ => Ok(()),
    }
}
