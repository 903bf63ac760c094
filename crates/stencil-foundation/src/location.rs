//! Source locations for diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A byte offset plus 1-based line/column position in script source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Byte offset from the beginning of the script.
    pub offset: u32,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number, counted in characters.
    pub column: u32,
}

impl SourceLocation {
    /// Create a location from its parts.
    pub fn new(offset: u32, line: u32, column: u32) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets to line/column positions.
///
/// Built once per source string; lookups are a binary search over line
/// start offsets.
#[derive(Debug, Clone)]
pub struct LineIndex<'src> {
    source: &'src str,
    line_starts: Vec<usize>,
}

impl<'src> LineIndex<'src> {
    /// Index the line starts of `source`.
    pub fn new(source: &'src str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    /// Resolve a byte offset into a [`SourceLocation`].
    ///
    /// Offsets past the end of the source clamp to the end.
    pub fn location(&self, offset: usize) -> SourceLocation {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .source
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - line_start);

        SourceLocation::new(offset as u32, line as u32 + 1, column as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_columns_are_one_based() {
        let index = LineIndex::new("let x = 1;");
        assert_eq!(index.location(0), SourceLocation::new(0, 1, 1));
        assert_eq!(index.location(4), SourceLocation::new(4, 1, 5));
    }

    #[test]
    fn offsets_after_newline_move_to_next_line() {
        let index = LineIndex::new("a\nbc\nd");
        assert_eq!(index.location(2).line, 2);
        assert_eq!(index.location(3).column, 2);
        assert_eq!(index.location(5), SourceLocation::new(5, 3, 1));
    }

    #[test]
    fn offset_past_end_is_clamped() {
        let index = LineIndex::new("ab");
        assert_eq!(index.location(99), SourceLocation::new(2, 1, 3));
    }
}
