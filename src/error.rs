use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline step an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Loaded,
    Resolved(u32),
    Rendered(u32),
    Merged(u32),
    Stripped(u32),
    Serialized,
    Done,
    /// Terminal; the error carries the last stage reached
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Loaded => write!(f, "loaded"),
            Stage::Resolved(p) => write!(f, "resolved(page {p})"),
            Stage::Rendered(p) => write!(f, "rendered(page {p})"),
            Stage::Merged(p) => write!(f, "merged(page {p})"),
            Stage::Stripped(p) => write!(f, "stripped(page {p})"),
            Stage::Serialized => write!(f, "serialized"),
            Stage::Done => write!(f, "done"),
            Stage::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FillError {
    #[error("Template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("Malformed template: {0}")]
    MalformedTemplate(String),

    /// Never returned from the pipeline; used to report a font fallback.
    #[error("Font unavailable: {0}")]
    FontUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Render failure after {stage}: {message}")]
    RenderFailure { stage: Stage, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid data record: {0}")]
    Record(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FillError {
    /// Wrap an unexpected lower-level error raised after `stage` was reached.
    pub fn render(stage: Stage, err: impl fmt::Display) -> Self {
        FillError::RenderFailure {
            stage,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FillError>;
