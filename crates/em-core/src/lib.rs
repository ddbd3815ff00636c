#[macro_use]
pub mod macros;

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lir;
pub mod span;
pub mod types;

// Re-export commonly used items for convenience
pub use tracing;

pub use config::CompileOptions;
pub use span::{Location, Span};

// Alias for error types
pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
