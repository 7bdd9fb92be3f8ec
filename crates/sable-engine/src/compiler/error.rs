//! Diagnostics.
//!
//! Semantic problems do not abort compilation: they accumulate in a
//! [`DiagnosticSink`] while placeholder values keep the driver moving, so
//! one pass reports as much as possible. [`render_diagnostics`] formats the
//! collected batch against the source text.

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term;
use termcolor::{ColorChoice, StandardStream, WriteColor};
use thiserror::Error;

use crate::types::RegistryError;

/// A source position: byte offset plus 1-based line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub offset: u32,
    pub line: u32,
}

impl SourcePos {
    pub fn new(offset: u32, line: u32) -> Self {
        SourcePos { offset, line }
    }
}

/// One semantic error.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub pos: SourcePos,
}

/// Accumulates semantic errors during a compilation.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>, pos: SourcePos) {
        let message = message.into();
        log::debug!("diagnostic at {}:{}: {message}", pos.line, pos.offset);
        self.diagnostics.push(Diagnostic { message, pos });
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

/// Failure of a whole function compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compilation failed with {} diagnostic(s)", .0.len())]
    Semantic(Vec<Diagnostic>),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl CompileError {
    /// The collected semantic diagnostics, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Semantic(d) => d,
            CompileError::Registry(_) => &[],
        }
    }
}

/// Render diagnostics against `source` into `writer`.
pub fn render_diagnostics(
    name: &str,
    source: &str,
    diagnostics: &[Diagnostic],
    writer: &mut dyn WriteColor,
) -> Result<(), codespan_reporting::files::Error> {
    let file = SimpleFile::new(name, source);
    let config = term::Config::default();
    for diag in diagnostics {
        let start = (diag.pos.offset as usize).min(source.len());
        let end = (start + 1).min(source.len()).max(start);
        let cs = CsDiagnostic::error()
            .with_message(&diag.message)
            .with_labels(vec![Label::primary((), start..end)]);
        term::emit(writer, &config, &file, &cs)?;
    }
    Ok(())
}

/// Render diagnostics to stderr.
pub fn print_diagnostics(
    name: &str,
    source: &str,
    diagnostics: &[Diagnostic],
) -> Result<(), codespan_reporting::files::Error> {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    render_diagnostics(name, source, diagnostics, &mut stderr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    #[test]
    fn sink_accumulates() {
        let mut sink = DiagnosticSink::new();
        assert!(!sink.has_errors());
        sink.error("Unknown variable 'x'", SourcePos::new(4, 1));
        sink.error("Unknown variable 'y'", SourcePos::new(9, 2));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.diagnostics()[0].message, "Unknown variable 'x'");
    }

    #[test]
    fn rendering_includes_message_and_line() {
        let source = "int a;\nint a;\n";
        let diags = vec![Diagnostic {
            message: "Variable 'a' is already declared".into(),
            pos: SourcePos::new(7, 2),
        }];
        let mut buf = Buffer::no_color();
        render_diagnostics("test.sable", source, &diags, &mut buf).unwrap();
        let text = String::from_utf8(buf.into_inner()).unwrap();
        assert!(text.contains("Variable 'a' is already declared"));
        assert!(text.contains("test.sable"));
    }
}
