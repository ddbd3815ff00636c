use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

use crate::span::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

impl DiagnosticLevel {
    fn label(self) -> &'static str {
        match self {
            DiagnosticLevel::Info => "Info",
            DiagnosticLevel::Warning => "Warning",
            DiagnosticLevel::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub location: Option<Location>,
    pub suggestions: Vec<String>,
    pub code: Option<String>,
}

impl Diagnostic {
    fn with_level(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            location: None,
            suggestions: Vec::new(),
            code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Info, message)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(
                f,
                "{} in {}: {}",
                self.level.label(),
                location,
                self.message
            )?,
            None => write!(f, "{}: {}", self.level.label(), self.message)?,
        }

        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }

        if !self.suggestions.is_empty() {
            let hints = self.suggestions.join("; ");
            write!(f, " (hints: {})", hints)?;
        }

        Ok(())
    }
}

/// Collects the non-fatal diagnostics of one unit. Fatal errors travel as
/// `Err` values instead.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticManager {
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
}

impl DiagnosticManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_diagnostic(&self, diagnostic: Diagnostic) {
        if diagnostic.level == DiagnosticLevel::Warning {
            crate::warn!("{}", diagnostic);
        }
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.push(diagnostic);
        }
    }

    pub fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.get_diagnostics()
            .into_iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .map(|d| d.iter().any(|diag| diag.level == DiagnosticLevel::Error))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.clear();
        }
    }

    /// One line per diagnostic.
    pub fn render_plain(&self) -> String {
        self.get_diagnostics()
            .iter()
            .map(|d| format!("{}\n", d))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_renders_with_location() {
        let manager = DiagnosticManager::new();
        manager.add_diagnostic(
            Diagnostic::warning("unused variable 'tmp'")
                .with_location(Location::new("a.em", 3))
                .with_code("unused-variable"),
        );
        assert_eq!(
            manager.render_plain(),
            "Warning in 'a.em' file at 3 line: unused variable 'tmp' [unused-variable]\n"
        );
        assert!(!manager.has_errors());
        assert_eq!(manager.warnings().len(), 1);
    }
}
