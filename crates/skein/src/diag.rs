//! Located diagnostics.

use std::{fmt, sync::Arc};

/// A position in a grammar source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputLoc {
    pub file: Arc<str>,
    pub line: u32,
    pub col: u32,
}

impl InputLoc {
    pub fn new(file: impl Into<Arc<str>>, line: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            line,
            col,
        }
    }

    /// The location given to elements the builder creates on its own.
    pub fn internal() -> Self {
        Self::new("<internal>", 0, 0)
    }

    /// Order by line, then column. The file name is not considered.
    pub fn cmp_position(&self, other: &Self) -> std::cmp::Ordering {
        (self.line, self.col).cmp(&(other.line, other.col))
    }
}

impl Default for InputLoc {
    fn default() -> Self {
        Self::internal()
    }
}

impl fmt::Display for InputLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: InputLoc,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "{}: {}", self.loc, self.message),
            Severity::Warning => write!(f, "{}: warning: {}", self.loc, self.message),
        }
    }
}

/// Accumulates the problems found during a build.
///
/// Construction keeps going after an error so that as many problems as
/// possible are reported at once; output generation checks
/// [`Diagnostics::has_errors`] before packing any tables.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    error_count: usize,
}

impl Diagnostics {
    pub fn error(&mut self, loc: &InputLoc, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("error at {}: {}", loc, message);
        self.error_count += 1;
        self.items.push(Diagnostic {
            severity: Severity::Error,
            loc: loc.clone(),
            message,
        });
    }

    pub fn warning(&mut self, loc: &InputLoc, message: impl Into<String>) {
        self.items.push(Diagnostic {
            severity: Severity::Warning,
            loc: loc.clone(),
            message: message.into(),
        });
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.items.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Append everything reported in `other`.
    pub fn absorb(&mut self, other: Diagnostics) {
        self.error_count += other.error_count;
        self.items.extend(other.items);
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            writeln!(f, "{}", item)?;
        }
        Ok(())
    }
}
