use lopdf::Object;

use crate::error::{FillError, Result};
use crate::template::{Page, TemplateDocument, dict_get, is_widget, resolve};

pub struct AnnotationStripper;

impl AnnotationStripper {
    /// Remove every Widget from the page's `/Annots`; returns how many were removed.
    ///
    /// Other annotations (links, comments) stay. An array left empty is dropped.
    pub fn strip_page(template: &mut TemplateDocument, page: Page) -> Result<usize> {
        let doc = &mut template.doc;
        let (removed, kept) = {
            let page_dict = doc
                .get_object(page.id)
                .and_then(Object::as_dict)
                .map_err(|e| FillError::MalformedTemplate(format!("page {}: {e}", page.number)))?;
            let Some(annots) = dict_get(page_dict, b"Annots").and_then(|o| resolve(o, doc)) else {
                return Ok(0);
            };
            let Ok(annots) = annots.as_array() else {
                return Ok(0);
            };
            let kept: Vec<Object> = annots
                .iter()
                .filter(|entry| !is_widget(entry, doc))
                .cloned()
                .collect();
            (annots.len() - kept.len(), kept)
        };

        let page_dict = doc
            .get_object_mut(page.id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| FillError::MalformedTemplate(format!("page {}: {e}", page.number)))?;
        if kept.is_empty() {
            page_dict.remove(b"Annots");
        } else {
            page_dict.set("Annots", Object::Array(kept));
        }
        log::debug!("page {}: removed {removed} widget(s)", page.number);
        Ok(removed)
    }

    /// Drop the catalog's `/AcroForm` so no field registry outlives the widgets.
    pub fn detach_form_registry(template: &mut TemplateDocument) -> Result<bool> {
        let doc = &mut template.doc;
        let root = doc
            .trailer
            .get(b"Root")
            .map_err(|e| FillError::MalformedTemplate(format!("trailer: {e}")))?
            .clone();
        let catalog = match root {
            Object::Reference(id) => doc.get_object_mut(id).and_then(Object::as_dict_mut),
            _ => doc.trailer.get_mut(b"Root").and_then(Object::as_dict_mut),
        }
        .map_err(|e| FillError::MalformedTemplate(format!("catalog: {e}")))?;
        let detached = catalog.remove(b"AcroForm").is_some();
        if detached {
            log::debug!("detached AcroForm");
        }
        Ok(detached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateLoader;
    use lopdf::{Document, dictionary};

    fn template(annots_by_ref: bool) -> TemplateDocument {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let name = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal("LastName"),
            "Rect" => vec![100.into(), 400.into(), 250.into(), 420.into()],
        });
        let link = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
        });
        let annots = Object::Array(vec![Object::Reference(name), Object::Reference(link)]);
        let annots = if annots_by_ref {
            Object::Reference(doc.add_object(annots))
        } else {
            annots
        };
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Annots" => annots,
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
            "AcroForm" => dictionary! { "Fields" => vec![Object::Reference(name)], },
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        TemplateLoader::load_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_strips_widgets_keeps_links() {
        for by_ref in [false, true] {
            let mut tpl = template(by_ref);
            let page = tpl.pages()[0];
            assert_eq!(AnnotationStripper::strip_page(&mut tpl, page).unwrap(), 1);
            let annots = tpl.annotations(page).unwrap();
            assert_eq!(annots.len(), 1);
            assert!(!annots[0].is_widget());
        }
    }

    #[test]
    fn test_strip_is_idempotent() {
        let mut tpl = template(false);
        let page = tpl.pages()[0];
        AnnotationStripper::strip_page(&mut tpl, page).unwrap();
        assert_eq!(AnnotationStripper::strip_page(&mut tpl, page).unwrap(), 0);
    }

    #[test]
    fn test_detaches_acroform_once() {
        let mut tpl = template(false);
        assert!(tpl.has_form_registry());
        assert!(AnnotationStripper::detach_form_registry(&mut tpl).unwrap());
        assert!(!tpl.has_form_registry());
        assert!(!AnnotationStripper::detach_form_registry(&mut tpl).unwrap());
    }
}
