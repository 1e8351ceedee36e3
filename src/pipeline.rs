use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use crate::config::FillConfig;
use crate::error::{FillError, Result, Stage};
use crate::fields::FieldResolver;
use crate::font::FontHandle;
use crate::merge::ContentMerger;
use crate::overlay::{OverlayLayer, OverlayRenderer};
use crate::record::DataRecord;
use crate::strip::AnnotationStripper;
use crate::template::{TemplateDocument, TemplateLoader};
use crate::writer::DocumentWriter;

/// What one fill did, page by page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillReport {
    pub pages: usize,
    /// Field names stamped, per 1-based page
    pub stamped: BTreeMap<u32, Vec<String>>,
    pub widgets_removed: usize,
    pub selected: Option<String>,
    pub form_registry_detached: bool,
    /// Set when the overlay font fell back to the built-in one
    pub font_warning: Option<String>,
}

impl FillReport {
    pub fn stamped_count(&self) -> usize {
        self.stamped.values().map(Vec::len).sum()
    }
}

/// Runs load -> (resolve -> render -> merge -> strip) per page -> write.
pub struct FormFiller {
    font: FontHandle,
    config: FillConfig,
}

impl FormFiller {
    pub fn new(font: FontHandle, config: FillConfig) -> Self {
        Self { font, config }
    }

    pub fn font(&self) -> &FontHandle {
        &self.font
    }

    pub fn fill_path(&self, template: &Path, record: &DataRecord) -> Result<Vec<u8>> {
        let (bytes, _) = self.run(TemplateLoader::load(template)?, record)?;
        Ok(bytes)
    }

    pub fn fill_bytes(&self, template: &[u8], record: &DataRecord) -> Result<Vec<u8>> {
        let (bytes, _) = self.run(TemplateLoader::load_bytes(template)?, record)?;
        Ok(bytes)
    }

    /// Fill and write to `sink`; the sink sees nothing unless every step succeeded.
    pub fn fill_to<W: Write>(
        &self,
        template: &Path,
        record: &DataRecord,
        sink: &mut W,
    ) -> Result<FillReport> {
        let (bytes, report) = self.run(TemplateLoader::load(template)?, record)?;
        sink.write_all(&bytes)?;
        sink.flush()?;
        Ok(report)
    }

    fn run(
        &self,
        mut template: TemplateDocument,
        record: &DataRecord,
    ) -> Result<(Vec<u8>, FillReport)> {
        let mut stage = Stage::Loaded;
        log::debug!("{stage}: {} page(s)", template.page_count());

        let mut report = FillReport {
            pages: template.page_count(),
            font_warning: self.font.fallback_reason().map(str::to_string),
            ..FillReport::default()
        };
        let renderer = OverlayRenderer::new(&self.font, &self.config);
        let font_id = template.doc.new_object_id();
        let mut font_used = false;
        let mut glyphs = BTreeMap::new();
        let mut fields = BTreeSet::new();

        let pages = template.pages().to_vec();
        for page in pages {
            let bindings = FieldResolver::resolve(&template, page)
                .map_err(|e| stage_error(stage, e))?;
            advance(Stage::Resolved(page.number));
            fields.extend(bindings.iter().map(|b| b.name.clone()));

            let font_resource = ContentMerger::font_resource_name(&template, page);
            let layer: OverlayLayer =
                renderer.render(page.number, &bindings, record, &font_resource);
            stage = advance(Stage::Rendered(page.number));

            ContentMerger::merge(&mut template, page, &layer, (font_id, &font_resource))
                .map_err(|e| stage_error(stage, e))?;
            stage = advance(Stage::Merged(page.number));

            report.widgets_removed += AnnotationStripper::strip_page(&mut template, page)
                .map_err(|e| stage_error(stage, e))?;
            stage = advance(Stage::Stripped(page.number));

            font_used |= layer.uses_font();
            glyphs.extend(layer.glyphs);
            if layer.selected.is_some() {
                report.selected = layer.selected;
            }
            if !layer.stamped.is_empty() {
                report.stamped.insert(page.number, layer.stamped);
            }
        }
        for key in record.keys().filter(|k| !fields.contains(*k)) {
            log::debug!("no widget named {key:?}, value ignored");
        }

        report.form_registry_detached = AnnotationStripper::detach_form_registry(&mut template)
            .map_err(|e| stage_error(stage, e))?;
        if font_used {
            self.font
                .embed(&mut template.doc, font_id, &glyphs)
                .map_err(|e| stage_error(stage, e))?;
        }

        let bytes = DocumentWriter::write(template).map_err(|e| stage_error(stage, e))?;
        advance(Stage::Serialized);
        advance(Stage::Done);
        log::info!(
            "filled {} field(s) on {} page(s), removed {} widget(s)",
            report.stamped_count(),
            report.pages,
            report.widgets_removed
        );
        Ok((bytes, report))
    }
}

fn advance(stage: Stage) -> Stage {
    log::debug!("-> {stage}");
    stage
}

/// Taxonomy errors pass through untouched; anything else is wrapped with the stage reached.
fn stage_error(stage: Stage, err: FillError) -> FillError {
    advance(Stage::Failed);
    log::debug!("failed after {stage}: {err}");
    match err {
        FillError::TemplateNotFound(_)
        | FillError::MalformedTemplate(_)
        | FillError::SerializationError(_)
        | FillError::RenderFailure { .. } => err,
        other => FillError::render(stage, other),
    }
}
