//! Fill a PDF form template and flatten it.
//!
//! Values are stamped as page content at each widget's position, a mark is drawn
//! for the selection control, then the widgets and the AcroForm are removed so the
//! result can no longer be edited.
//!
//! ```ignore
//! use formstamp::{DataRecord, FillConfig, FontProvisioner, FormFiller};
//!
//! let config = FillConfig::default();
//! let font = FontProvisioner::new(config.font.clone()).provision();
//! let filler = FormFiller::new(font, config);
//! let record = DataRecord::new().with("LastName", "DELACRUZ").with("Sex", "Male");
//! let pdf = filler.fill_path("form.pdf".as_ref(), &record)?;
//! ```

pub mod config;
pub mod error;
pub mod fields;
pub mod font;
pub mod merge;
pub mod overlay;
pub mod pipeline;
pub mod record;
pub mod strip;
pub mod template;
pub mod writer;

pub use config::{FillConfig, FontSource, SelectionField, SelectionOption};
pub use error::{FillError, Result, Stage};
pub use fields::{FieldBinding, FieldResolver};
pub use font::{FontHandle, FontProvisioner};
pub use merge::{ContentMerger, merge_streams};
pub use overlay::{OverlayLayer, OverlayRenderer};
pub use pipeline::{FillReport, FormFiller};
pub use record::DataRecord;
pub use strip::AnnotationStripper;
pub use template::{Annotation, Page, Rect, TemplateDocument, TemplateLoader};
pub use writer::DocumentWriter;
