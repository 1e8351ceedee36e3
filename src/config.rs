use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FillError, Result};

/// Noto Sans covers Latin, Greek and Cyrillic, which is enough for names and addresses.
pub const DEFAULT_FONT_URL: &str =
    "https://github.com/notofonts/notofonts.github.io/raw/main/fonts/NotoSans/hinted/ttf/NotoSans-Regular.ttf";
pub const DEFAULT_FONT_CACHE: &str = "fonts/NotoSans-Regular.ttf";

/// Point size used for every stamped value.
pub const DEFAULT_FONT_SIZE: f32 = 10.0;
/// Offset of the text origin from the widget's lower-left corner, in user space units.
pub const DEFAULT_TEXT_OFFSET: [f32; 2] = [2.0, 2.0];

/// Where the overlay font comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSource {
    pub url: String,
    pub cache_path: PathBuf,
    /// Never touch the network; use the cache or fall back.
    pub offline: bool,
}

impl Default for FontSource {
    fn default() -> Self {
        Self {
            url: DEFAULT_FONT_URL.to_string(),
            cache_path: PathBuf::from(DEFAULT_FONT_CACHE),
            offline: false,
        }
    }
}

/// One option of the two-valued selection control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOption {
    /// Record value that selects this option
    pub value: String,
    /// Mark center (user space)
    pub x: f32,
    pub y: f32,
}

/// A binary selection control drawn as two circles, one of them filled.
///
/// The circle centers are template-specific: they are not derived from the widgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionField {
    pub field: String,
    /// 1-based page the marks are drawn on
    pub page: u32,
    pub radius: f32,
    pub options: [SelectionOption; 2],
}

impl SelectionField {
    /// `Sex` control of the registration form (Male / Female boxes on page 1)
    pub fn registration_sex() -> Self {
        Self {
            field: "Sex".to_string(),
            page: 1,
            radius: 4.0,
            options: [
                SelectionOption {
                    value: "Male".to_string(),
                    x: 163.0,
                    y: 556.0,
                },
                SelectionOption {
                    value: "Female".to_string(),
                    x: 223.0,
                    y: 556.0,
                },
            ],
        }
    }

    /// Index of the option matching `value`, compared exactly after trimming.
    pub fn option_index(&self, value: &str) -> Option<usize> {
        let value = value.trim();
        self.options.iter().position(|o| o.value == value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    pub font_size: f32,
    pub text_offset: [f32; 2],
    pub font: FontSource,
    pub selection: Option<SelectionField>,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self::registration_form()
    }
}

impl FillConfig {
    /// Preset for the registration form: 10pt text, +2/+2 offset, `Sex` selection.
    pub fn registration_form() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            text_offset: DEFAULT_TEXT_OFFSET,
            font: FontSource::default(),
            selection: Some(SelectionField::registration_sex()),
        }
    }

    /// Plain text stamping without any selection control
    pub fn text_only() -> Self {
        Self {
            selection: None,
            ..Self::registration_form()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: FillConfig =
            serde_json::from_str(raw).map_err(|e| FillError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(FillError::Config(format!(
                "font_size must be positive, got {}",
                self.font_size
            )));
        }
        if !self.text_offset.iter().all(|v| v.is_finite()) {
            return Err(FillError::Config("text_offset must be finite".into()));
        }
        if let Some(sel) = &self.selection {
            if sel.field.is_empty() {
                return Err(FillError::Config("selection field name is empty".into()));
            }
            if sel.page == 0 {
                return Err(FillError::Config("selection page is 1-based".into()));
            }
            if !(sel.radius.is_finite() && sel.radius > 0.0) {
                return Err(FillError::Config(format!(
                    "selection radius must be positive, got {}",
                    sel.radius
                )));
            }
            let [a, b] = &sel.options;
            if a.value.trim().is_empty() || b.value.trim().is_empty() {
                return Err(FillError::Config("selection option value is empty".into()));
            }
            if a.value == b.value {
                return Err(FillError::Config(format!(
                    "selection options must differ, both are {:?}",
                    a.value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_registration_preset() {
        let cfg = FillConfig::default();
        assert_eq!(cfg.font_size, 10.0);
        assert_eq!(cfg.text_offset, [2.0, 2.0]);
        assert_eq!(cfg.selection.as_ref().map(|s| s.field.as_str()), Some("Sex"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = FillConfig::from_json(r#"{"font_size": 12}"#).unwrap();
        assert_eq!(cfg.font_size, 12.0);
        assert_eq!(cfg.font, FontSource::default());
        assert_eq!(cfg.selection, Some(SelectionField::registration_sex()));
    }

    #[test]
    fn test_json_can_disable_selection() {
        let cfg = FillConfig::from_json(r#"{"selection": null}"#).unwrap();
        assert!(cfg.selection.is_none());
    }

    #[test]
    fn test_rejects_identical_options() {
        let raw = r#"{"selection": {"field": "Sex", "page": 1, "radius": 4,
            "options": [{"value": "M", "x": 1, "y": 1}, {"value": "M", "x": 2, "y": 2}]}}"#;
        assert!(matches!(FillConfig::from_json(raw), Err(FillError::Config(_))));
    }

    #[test]
    fn test_rejects_three_options() {
        let raw = r#"{"selection": {"field": "Sex", "page": 1, "radius": 4, "options": [
            {"value": "A", "x": 1, "y": 1}, {"value": "B", "x": 2, "y": 2}, {"value": "C", "x": 3, "y": 3}]}}"#;
        assert!(matches!(FillConfig::from_json(raw), Err(FillError::Config(_))));
    }

    #[test]
    fn test_rejects_non_positive_font_size() {
        assert!(FillConfig::from_json(r#"{"font_size": 0}"#).is_err());
    }

    #[test]
    fn test_option_index_trims_but_keeps_case() {
        let sel = SelectionField::registration_sex();
        assert_eq!(sel.option_index(" Female "), Some(1));
        assert_eq!(sel.option_index("Male"), Some(0));
        assert_eq!(sel.option_index("male"), None);
        assert_eq!(sel.option_index("Other"), None);
    }
}
