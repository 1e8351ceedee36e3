#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

/// Artwork every generated page carries, so tests can check it survives.
pub const ARTWORK: &[u8] = b"BT /F1 9 Tf 40 760 Td (REGISTRATION FORM) Tj ET 0.5 w 40 750 m 570 750 l S";

/// A text widget to place on a generated page
pub struct Widget {
    pub name: &'static str,
    pub rect: [i64; 4],
}

pub fn widget(name: &'static str, rect: [i64; 4]) -> Widget {
    Widget { name, rect }
}

/// Build a fillable template: one page per entry, with an AcroForm listing all widgets.
pub fn build_template(pages: &[Vec<Widget>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let helvetica = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    let mut fields = Vec::new();
    for widgets in pages {
        let content = doc.add_object(Stream::new(Dictionary::new(), ARTWORK.to_vec()));
        let page_id = doc.new_object_id();
        let mut annots = Vec::new();
        for w in widgets {
            let id = doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "FT" => "Tx",
                "T" => Object::string_literal(w.name),
                "Rect" => w.rect.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>(),
                "P" => page_id,
            });
            annots.push(Object::Reference(id));
            fields.push(Object::Reference(id));
        }
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => helvetica, }, },
        };
        if !annots.is_empty() {
            page.set("Annots", annots);
        }
        doc.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => dictionary! {
            "Fields" => fields,
            "NeedAppearances" => true,
        },
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// The registration form used across the tests: names and the sex selection on
/// page 1, the middle name on page 2.
pub fn registration_template() -> Vec<u8> {
    build_template(&[
        vec![
            widget("FirstName", [40, 700, 200, 720]),
            widget("LastName", [100, 400, 250, 420]),
            widget("Sex", [150, 540, 240, 570]),
        ],
        vec![widget("MidName", [40, 650, 200, 670])],
    ])
}

pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Decoded operations of the nth (0-based) page.
pub fn page_operations(doc: &Document, index: usize) -> Vec<Operation> {
    let id = page_ids(doc)[index];
    let bytes = doc.get_page_content(id).unwrap();
    Content::decode(&bytes).unwrap().operations
}

pub fn page_content(doc: &Document, index: usize) -> Vec<u8> {
    doc.get_page_content(page_ids(doc)[index]).unwrap()
}

/// `(x, y)` operands of every `Td` on the page, in order.
pub fn text_positions(ops: &[Operation]) -> Vec<(f32, f32)> {
    ops.iter()
        .filter(|op| op.operator == "Td")
        .map(|op| {
            (
                op.operands[0].as_float().unwrap(),
                op.operands[1].as_float().unwrap(),
            )
        })
        .collect()
}

/// Raw operand bytes of every `Tj` on the page, in order.
pub fn shown_strings(ops: &[Operation]) -> Vec<Vec<u8>> {
    ops.iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| op.operands.first())
        .filter_map(|o| o.as_str().ok().map(<[u8]>::to_vec))
        .collect()
}

pub fn widget_count(doc: &Document) -> usize {
    page_ids(doc)
        .into_iter()
        .filter_map(|id| doc.get_dictionary(id).ok())
        .filter_map(|page| page.get(b"Annots").ok())
        .filter_map(|annots| match annots {
            Object::Reference(id) => doc.get_object(*id).and_then(Object::as_array).ok(),
            other => other.as_array().ok(),
        })
        .flatten()
        .filter(|entry| {
            let dict = match entry {
                Object::Reference(id) => doc.get_dictionary(*id).ok(),
                other => other.as_dict().ok(),
            };
            dict.and_then(|d| d.get(b"Subtype").ok())
                .and_then(|s| s.as_name().ok())
                == Some(b"Widget".as_slice())
        })
        .count()
}

pub fn has_acroform(doc: &Document) -> bool {
    doc.catalog().map(|c| c.has(b"AcroForm")).unwrap_or(false)
}

/// Number of filled paths (`f`) on the page.
pub fn fill_count(ops: &[Operation]) -> usize {
    ops.iter().filter(|op| op.operator == "f").count()
}

pub fn stroke_count(ops: &[Operation]) -> usize {
    ops.iter().filter(|op| op.operator == "S").count()
}
