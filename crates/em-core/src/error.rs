use std::result;

use miette::Diagnostic;
use thiserror::Error;

use crate::span::Location;

#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum Error {
    /// Unknown identifiers, redeclarations, type mismatches, missing overloads,
    /// unresolved members, template arity and ABI shape failures.
    #[error("Error in '{file}' file at {line} line: {message}")]
    #[diagnostic(code(ember::semantic))]
    Semantic {
        file: String,
        line: u32,
        message: String,
    },
    /// The lowered function was rejected by verification; `dump` holds its
    /// textual form.
    #[error("Backend verification failed for '{function}': {message}\n{dump}")]
    #[diagnostic(code(ember::backend))]
    Backend {
        function: String,
        message: String,
        dump: String,
    },
    #[error("Configuration error: {0}")]
    #[diagnostic(code(ember::config))]
    Config(String),
    #[error("Generic error: {0}")]
    #[diagnostic(code(ember::generic))]
    Generic(String),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn semantic(location: Location, message: impl Into<String>) -> Self {
        Error::Semantic {
            file: location.file,
            line: location.line,
            message: message.into(),
        }
    }

    pub fn backend(
        function: impl Into<String>,
        message: impl Into<String>,
        dump: impl Into<String>,
    ) -> Self {
        Error::Backend {
            function: function.into(),
            message: message.into(),
            dump: dump.into(),
        }
    }

    /// The bare message without the location prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Semantic { message, .. } | Error::Backend { message, .. } => message,
            Error::Config(message) | Error::Generic(message) => message,
        }
    }

    pub fn line(&self) -> Option<u32> {
        match self {
            Error::Semantic { line, .. } => Some(*line),
            _ => None,
        }
    }
}

// Convert from eyre::Report to our Error type
impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Generic(err.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Generic(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_error_renders_file_and_line() {
        let err = Error::semantic(Location::new("main.em", 12), "unknown identifier 'x'");
        assert_eq!(
            err.to_string(),
            "Error in 'main.em' file at 12 line: unknown identifier 'x'"
        );
        assert_eq!(err.line(), Some(12));
        assert_eq!(err.message(), "unknown identifier 'x'");
    }

    #[test]
    fn errors_carry_diagnostic_codes() {
        let err = Error::backend("f", "block bb1 has no terminator", "fn f() {}");
        let code = Diagnostic::code(&err).map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("ember::backend"));
    }
}
