//! Template blocks as handed over by the extractor.

use serde::{Deserialize, Serialize};

/// Whitespace directive on one side of a block's delimiters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimMode {
    #[default]
    None,
    /// Strip one adjacent newline.
    Newline,
    /// Strip all adjacent whitespace.
    Whitespace,
}

/// One script or interpolation unit of a template.
///
/// The extractor owns delimiter syntax and trim semantics; this crate only
/// reads `id`, `command` and `is_execution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateBlock {
    /// Position in the document. Defines the total order of blocks.
    pub id: usize,
    /// Original delimited text.
    #[serde(default)]
    pub match_text: String,
    /// Script inside the delimiters.
    pub command: String,
    /// Statement block (`true`) or single interpolation expression.
    #[serde(default)]
    pub is_execution: bool,
    #[serde(default)]
    pub left_trim: TrimMode,
    #[serde(default)]
    pub right_trim: TrimMode,
    #[serde(default)]
    pub original_start: usize,
    #[serde(default)]
    pub original_end: usize,
}

impl TemplateBlock {
    /// A statement block.
    pub fn execution(id: usize, command: impl Into<String>) -> Self {
        Self::new(id, command.into(), true)
    }

    /// An interpolation block.
    pub fn interpolation(id: usize, command: impl Into<String>) -> Self {
        Self::new(id, command.into(), false)
    }

    fn new(id: usize, command: String, is_execution: bool) -> Self {
        Self {
            id,
            match_text: command.clone(),
            command,
            is_execution,
            left_trim: TrimMode::None,
            right_trim: TrimMode::None,
            original_start: 0,
            original_end: 0,
        }
    }

    /// Set the original text and its offsets in the document.
    pub fn with_source(mut self, match_text: impl Into<String>, start: usize) -> Self {
        self.match_text = match_text.into();
        self.original_start = start;
        self.original_end = start + self.match_text.len();
        self
    }
}
