use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{FillError, Result};
use crate::overlay::OverlayLayer;
use crate::template::{Page, TemplateDocument, effective_resources, obj_as_dict_owned, resolve};

/// Preferred resource name of the overlay font
pub const OVERLAY_FONT_RESOURCE: &str = "FStamp";

/// Original content first, overlay after, so the overlay paints on top.
///
/// The original is wrapped in `q`/`Q` so whatever graphics state it leaves
/// behind (CTM, colours, clipping) does not leak into the overlay.
pub fn merge_streams(original: &[u8], overlay: &[u8]) -> Vec<u8> {
    if original.iter().all(u8::is_ascii_whitespace) {
        return overlay.to_vec();
    }
    let mut merged = Vec::with_capacity(original.len() + overlay.len() + 8);
    merged.extend_from_slice(b"q\n");
    merged.extend_from_slice(original);
    merged.extend_from_slice(b"\nQ\n");
    merged.extend_from_slice(overlay);
    merged
}

pub struct ContentMerger;

impl ContentMerger {
    /// A font resource name that does not clash with the page's own fonts.
    pub fn font_resource_name(template: &TemplateDocument, page: Page) -> String {
        let doc = template.document();
        let fonts = effective_resources(doc, page.id)
            .and_then(|res| res.get(b"Font").ok().and_then(|f| obj_as_dict_owned(f, doc)))
            .unwrap_or_default();
        let mut name = OVERLAY_FONT_RESOURCE.to_string();
        let mut n = 1;
        while fonts.has(name.as_bytes()) {
            name = format!("{OVERLAY_FONT_RESOURCE}{n}");
            n += 1;
        }
        name
    }

    /// Replace the page's content with original + overlay and register the overlay font.
    ///
    /// `font` is the overlay font object id and the resource name used by the layer.
    pub fn merge(
        template: &mut TemplateDocument,
        page: Page,
        layer: &OverlayLayer,
        font: (ObjectId, &str),
    ) -> Result<()> {
        if layer.page != page.number {
            return Err(FillError::SerializationError(format!(
                "overlay for page {} offered to page {}",
                layer.page, page.number
            )));
        }
        if layer.is_empty() {
            return Ok(());
        }
        let doc = &mut template.doc;

        let original = page_content(doc, page.id)?;
        let merged = merge_streams(&original, &layer.content);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), merged));

        let mut resources = effective_resources(doc, page.id).unwrap_or_default();
        if layer.uses_font() {
            let (font_id, font_name) = font;
            let mut fonts = resources
                .get(b"Font")
                .ok()
                .and_then(|f| obj_as_dict_owned(f, doc))
                .unwrap_or_default();
            fonts.set(font_name, Object::Reference(font_id));
            resources.set("Font", Object::Dictionary(fonts));
        }

        let page_dict = doc
            .get_object_mut(page.id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| FillError::MalformedTemplate(format!("page {}: {e}", page.number)))?;
        page_dict.set("Contents", Object::Reference(content_id));
        page_dict.set("Resources", Object::Dictionary(resources));
        log::debug!(
            "page {}: merged {} overlay bytes after {} original bytes",
            page.number,
            layer.content.len(),
            original.len()
        );
        Ok(())
    }
}

/// Concatenated, decoded content of every stream in the page's `/Contents`.
fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| FillError::MalformedTemplate(e.to_string()))?;
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };

    let mut streams: Vec<&Stream> = Vec::new();
    match resolve(contents, doc) {
        Some(Object::Stream(s)) => streams.push(s),
        Some(Object::Array(arr)) => {
            for entry in arr {
                match resolve(entry, doc) {
                    Some(Object::Stream(s)) => streams.push(s),
                    _ => {
                        return Err(FillError::MalformedTemplate(format!(
                            "content entry {entry:?} is not a stream"
                        )));
                    }
                }
            }
        }
        None => {
            return Err(FillError::MalformedTemplate(format!(
                "dangling /Contents {contents:?}"
            )));
        }
        Some(_) => {}
    }

    let mut out = Vec::new();
    for s in streams {
        let data = if s.dict.has(b"Filter") {
            s.decompressed_content()
                .map_err(|e| FillError::MalformedTemplate(format!("content stream: {e}")))?
        } else {
            s.content.clone()
        };
        out.extend_from_slice(&data);
        // streams of an array are separated as if by whitespace
        out.push(b'\n');
    }
    Ok(out)
}
