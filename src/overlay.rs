//! Overlay layer: the drawing operators stamped on top of a template page.
//!
//! Text is placed at a fixed offset from each widget's lower-left corner, with
//! no wrapping or fitting. The selection control is drawn as two stroked circles
//! and a filled dot inside the chosen one.

use std::collections::BTreeMap;

use pdf_writer::{Content, Name, Str};

use crate::config::{FillConfig, SelectionField};
use crate::fields::FieldBinding;
use crate::font::FontHandle;
use crate::record::DataRecord;

/// Bezier control distance for a quarter circle, as a fraction of the radius
const KAPPA: f32 = 0.552_284_75;
const MARK_LINE_WIDTH: f32 = 0.8;
/// Filled dot radius relative to the option circle
const MARK_FILL_RATIO: f32 = 0.55;

/// One page's overlay, consumed by the merger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayLayer {
    /// 1-based page this layer belongs to
    pub page: u32,
    pub content: Vec<u8>,
    /// Glyphs drawn with the overlay font (empty for the built-in font)
    pub glyphs: BTreeMap<u16, char>,
    /// Fields stamped, in drawing order
    pub stamped: Vec<String>,
    /// Selection option filled on this page, if any
    pub selected: Option<String>,
    /// Whether the selection circles were drawn on this page
    pub selection_drawn: bool,
}

impl OverlayLayer {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Whether the layer draws any text (and so needs the overlay font resource)
    pub fn uses_font(&self) -> bool {
        !self.stamped.is_empty()
    }
}

pub struct OverlayRenderer<'a> {
    font: &'a FontHandle,
    config: &'a FillConfig,
}

impl<'a> OverlayRenderer<'a> {
    pub fn new(font: &'a FontHandle, config: &'a FillConfig) -> Self {
        Self { font, config }
    }

    /// Build the overlay for `page` from its bindings; `font_resource` is the
    /// name the merger will register the overlay font under.
    pub fn render(
        &self,
        page: u32,
        bindings: &[FieldBinding],
        record: &DataRecord,
        font_resource: &str,
    ) -> OverlayLayer {
        let mut layer = OverlayLayer {
            page,
            ..OverlayLayer::default()
        };
        let selection = self.config.selection.as_ref();
        let mut content = Content::new();
        let mut drew = false;

        let [dx, dy] = self.config.text_offset;
        for binding in bindings {
            if selection.is_some_and(|s| s.field == binding.name) {
                continue;
            }
            let Some(value) = record.value(&binding.name) else {
                log::debug!("page {page}: no value for {:?}", binding.name);
                continue;
            };
            if !drew {
                content.save_state();
                drew = true;
            }
            let encoded = self.font.encode(value);
            content
                .set_fill_rgb(0.0, 0.0, 0.0)
                .begin_text()
                .set_font(Name(font_resource.as_bytes()), self.config.font_size)
                .next_line(binding.rect.x0 + dx, binding.rect.y0 + dy)
                .show(Str(&encoded.bytes))
                .end_text();
            layer.glyphs.extend(encoded.glyphs);
            layer.stamped.push(binding.name.clone());
        }

        // marks only on a page that carries the selection widget
        let has_widget = |s: &&SelectionField| bindings.iter().any(|b| b.name == s.field);
        if let Some(sel) = selection.filter(|s| s.page == page).filter(has_widget) {
            if let Some(value) = record.value(&sel.field) {
                if !drew {
                    content.save_state();
                    drew = true;
                }
                layer.selected = draw_selection(&mut content, sel, value);
                layer.selection_drawn = true;
                if layer.selected.is_none() {
                    log::debug!(
                        "page {page}: {:?} is not an option of {}, both marks left empty",
                        value,
                        sel.field
                    );
                }
            }
        }

        if drew {
            content.restore_state();
            layer.content = content.finish().to_vec();
        }
        layer
    }
}

/// Draw both option circles, then fill the one matching `value`.
fn draw_selection(content: &mut Content, sel: &SelectionField, value: &str) -> Option<String> {
    content
        .set_stroke_rgb(0.0, 0.0, 0.0)
        .set_fill_rgb(0.0, 0.0, 0.0)
        .set_line_width(MARK_LINE_WIDTH);
    for option in &sel.options {
        circle(content, option.x, option.y, sel.radius);
        content.stroke();
    }
    let index = sel.option_index(value)?;
    let option = &sel.options[index];
    circle(content, option.x, option.y, sel.radius * MARK_FILL_RATIO);
    content.fill_nonzero();
    Some(option.value.clone())
}

/// Closed circle path from four cubic segments.
fn circle(content: &mut Content, cx: f32, cy: f32, r: f32) {
    let k = r * KAPPA;
    content
        .move_to(cx + r, cy)
        .cubic_to(cx + r, cy + k, cx + k, cy + r, cx, cy + r)
        .cubic_to(cx - k, cy + r, cx - r, cy + k, cx - r, cy)
        .cubic_to(cx - r, cy - k, cx - k, cy - r, cx, cy - r)
        .cubic_to(cx + k, cy - r, cx + r, cy - k, cx + r, cy)
        .close_path();
}
