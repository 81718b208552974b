use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use super::SourceLine;

/// One assembly diagnostic: a line number, the offending source text and a
/// message.
///
/// Rendering the error with the source attached points the label at the
/// offending line.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("line {line}: {message}")]
pub struct AssemblyError {
    /// 1-based line number in the source
    pub line: usize,
    pub message: String,
    /// The offending source text
    pub text: String,
    #[label("{message}")]
    pub span: SourceSpan,
}

/// Accumulates diagnostics across both passes. A pass never stops at the
/// first problem; every line gets the chance to report.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    errors: Vec<AssemblyError>,
}

impl Diagnostics {
    pub(crate) fn report(&mut self, line: &SourceLine<'_>, message: impl Into<String>) {
        self.errors.push(AssemblyError {
            line: line.number,
            message: message.into(),
            text: line.text.to_string(),
            span: (line.offset, line.text.len()).into(),
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn into_errors(self) -> Vec<AssemblyError> {
        self.errors
    }
}
