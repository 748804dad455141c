//! Diagnostic reporting shared by every pipeline stage.
//!
//! Every stage records [`Diagnostic`]s into a [`Reporter`] instead of
//! aborting on the first problem, so a single compilation pass surfaces as
//! many independent errors as the AST shape still allows (spec §7).

use std::fmt;

/// Severity of a single diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// The closed set of error kinds the compiler can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("lexical error")]
    LexicalError,
    #[error("syntax error")]
    SyntaxError,
    #[error("unresolved import")]
    UnresolvedImport,
    #[error("unresolved template")]
    UnresolvedTemplate,
    #[error("unresolved variable")]
    UnresolvedVariable,
    #[error("duplicate symbol")]
    DuplicateSymbol,
    #[error("cyclic inherit")]
    CyclicInherit,
    #[error("cyclic import")]
    CyclicImport,
    #[error("invalid delete")]
    InvalidDelete,
    #[error("invalid insert target")]
    InvalidInsertTarget,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("invalid configuration value")]
    ConfigValueInvalid,
    #[error("I/O error")]
    IoError,
    #[error("timeout")]
    Timeout,
}

/// One diagnostic, carrying the location it applies to.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn error(kind: ErrorKind, file: impl Into<String>, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            file: file.into(),
            line,
            column,
            hint: None,
        }
    }

    pub fn warning(kind: ErrorKind, file: impl Into<String>, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
            file: file.into(),
            line,
            column,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {:?}: {}",
            self.file, self.line, self.column, self.kind, self.message
        )?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

/// Accumulates diagnostics across every pipeline stage for one compilation.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            tracing::error!(%diagnostic, "diagnostic");
        } else {
            tracing::debug!(%diagnostic, "diagnostic");
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Diagnostics grouped by file, then ordered by line within each file,
    /// as required for the reporter's end-of-pipeline printout (spec §7).
    pub fn grouped(&self) -> Vec<(&str, Vec<&Diagnostic>)> {
        let mut files: Vec<&str> = self
            .diagnostics
            .iter()
            .map(|d| d.file.as_str())
            .collect::<Vec<_>>();
        files.sort_unstable();
        files.dedup();

        files
            .into_iter()
            .map(|file| {
                let mut ds: Vec<&Diagnostic> = self.diagnostics.iter().filter(|d| d.file == file).collect();
                ds.sort_by_key(|d| (d.line, d.column));
                (file, ds)
            })
            .collect()
    }

    pub fn merge(&mut self, other: Reporter) {
        self.diagnostics.extend(other.diagnostics);
    }
}
