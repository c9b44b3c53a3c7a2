//! # Diagnostics
//!
//! Load-time problems are collected as [`Diagnostic`]s rather than returned
//! one at a time, so a single run reports every broken file.
//!
//! The HCL parser does not expose byte spans for expressions, so a
//! [`SourceRange`] names the file and the dotted attribute path instead
//! (`ghost.hcl: variables.feeds[2]`). Parse errors keep the parser's own
//! line/column rendering in the detail.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// What stage produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The source could not be read.
    Io,
    /// The source is not valid HCL.
    Parse,
    /// A variable refers back to itself.
    CircularReference,
    /// A `variables` block is malformed.
    Variable,
    /// An expression failed to evaluate.
    Evaluation,
    /// The evaluated document does not match the schema.
    Decode,
}

/// Where a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub filename: String,
    /// Dotted path of the attribute inside the file; empty for the whole file.
    pub path: String,
}

impl SourceRange {
    #[must_use]
    pub fn file(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            path: String::new(),
        }
    }

    #[must_use]
    pub fn new(filename: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
        }
    }

    /// Location of a named child.
    #[must_use]
    pub fn attr(&self, name: &str) -> Self {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.path)
        };
        Self::new(self.filename.clone(), path)
    }

    /// Location of an indexed child.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        Self::new(self.filename.clone(), format!("{}[{index}]", self.path))
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.filename)
        } else {
            write!(f, "{}: {}", self.filename, self.path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub summary: String,
    pub detail: String,
    pub subject: Option<SourceRange>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            summary: summary.into(),
            detail: detail.into(),
            subject: None,
        }
    }

    #[must_use]
    pub fn at(mut self, subject: SourceRange) -> Self {
        self.subject = Some(subject);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if let Some(subject) = &self.subject {
            write!(f, " ({subject})")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// A non-empty set of diagnostics returned by a failed load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.0.iter().filter(|d| d.kind == kind).count()
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}
