/**
Diagnostics shared by the semantic passes

Both passes accumulate diagnostics instead of stopping at the first problem.
Errors are logged as they are recorded and handed back to the caller as one
aggregate `CodeCheckError` once the pass is complete.
*/
use crate::ast::SourceLoc;
use std::fmt;
use thiserror::Error;

/// What went wrong, coarsely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Duplicate or malformed declarations, non-static correlation paths,
    /// invalid protocols or locations
    Structural,

    /// An input operation without a complete correlation set
    CorrelationCoverage,

    /// A correlation key needed before it is provided, provided twice,
    /// provided inconsistently across branches, inside a loop, or never fresh
    SessionSafety,

    /// Logged, never fatal
    Warning,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Structural => write!(f, "structural error"),
            DiagnosticKind::CorrelationCoverage => write!(f, "correlation coverage error"),
            DiagnosticKind::SessionSafety => write!(f, "session safety error"),
            DiagnosticKind::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub loc: SourceLoc,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(loc: SourceLoc, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic {
            loc,
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind != DiagnosticKind::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.loc, self.message)
    }
}

/// Aggregate failure of a semantic pass
#[derive(Debug, Clone, Error)]
#[error("semantic check failed with {} error(s):\n{}", .diagnostics.len(), render(.diagnostics))]
pub struct CodeCheckError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CodeCheckError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        CodeCheckError { diagnostics }
    }

    /// True if any diagnostic message contains `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        self.diagnostics.iter().any(|d| d.message.contains(needle))
    }
}

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collector owned by a single pass invocation
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, loc: &SourceLoc, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(loc.clone(), kind, message);
        tracing::error!(
            file = %diagnostic.loc.file,
            line = diagnostic.loc.line,
            kind = %diagnostic.kind,
            "{}",
            diagnostic.message
        );
        self.errors.push(diagnostic);
    }

    pub fn warning(&mut self, loc: &SourceLoc, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(loc.clone(), DiagnosticKind::Warning, message);
        tracing::warn!(
            file = %diagnostic.loc.file,
            line = diagnostic.loc.line,
            "{}",
            diagnostic.message
        );
        self.warnings.push(diagnostic);
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Split into (errors, warnings)
    pub fn into_parts(self) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
        (self.errors, self.warnings)
    }
}
