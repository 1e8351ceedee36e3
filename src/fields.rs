use crate::error::Result;
use crate::template::{Page, Rect, TemplateDocument};

/// A fillable widget: its field name and where it sits on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    pub name: String,
    pub rect: Rect,
}

pub struct FieldResolver;

impl FieldResolver {
    /// Widgets of `page` that carry both a name and a rectangle, in annotation order.
    pub fn resolve(template: &TemplateDocument, page: Page) -> Result<Vec<FieldBinding>> {
        let bindings: Vec<FieldBinding> = template
            .annotations(page)?
            .into_iter()
            .filter(|a| a.is_widget())
            .filter_map(|a| match (a.field_name, a.rect) {
                (Some(name), Some(rect)) => Some(FieldBinding { name, rect }),
                (name, rect) => {
                    log::debug!(
                        "page {}: skipping widget (name: {:?}, rect: {:?})",
                        page.number,
                        name,
                        rect
                    );
                    None
                }
            })
            .collect();
        log::debug!("page {}: {} field(s) resolved", page.number, bindings.len());
        Ok(bindings)
    }
}
