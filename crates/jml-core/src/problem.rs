//! Located parse problems.
//!
//! Parsers report positions the way compilers print them: 1-based lines and
//! 1-based columns. The conversion to zero-based LSP positions lives here so
//! push and pull diagnostics share it.

use std::fmt;
use tower_lsp_server::ls_types::{Position, Range};

/// A 1-based line/column position in a source file.
///
/// Columns count UTF-16 code units, matching what LSP clients expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn to_lsp(self) -> Position {
        Position::new(self.line.saturating_sub(1), self.column.saturating_sub(1))
    }
}

/// Inclusive start, exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourceRange {
    pub const fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start: SourcePosition::new(start_line, start_column),
            end: SourcePosition::new(end_line, end_column),
        }
    }

    pub fn to_lsp(self) -> Range {
        Range::new(self.start.to_lsp(), self.end.to_lsp())
    }
}

/// A located error message produced while parsing one document.
///
/// Severity is always error. Problems without a location (I/O failures,
/// parser crashes) are reported at the start of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub location: Option<SourceRange>,
    pub message: String,
}

impl Problem {
    pub fn new(location: SourceRange, message: impl Into<String>) -> Self {
        Self {
            location: Some(location),
            message: message.into(),
        }
    }

    pub fn unlocated(message: impl Into<String>) -> Self {
        Self {
            location: None,
            message: message.into(),
        }
    }

    pub fn lsp_range(&self) -> Range {
        self.location.map(SourceRange::to_lsp).unwrap_or_default()
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(range) => write!(
                f,
                "{}:{}: {}",
                range.start.line, range.start.column, self.message
            ),
            None => f.write_str(&self.message),
        }
    }
}
