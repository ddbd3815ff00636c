use std::fmt;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize,
    Deserialize,
)]
pub struct FileId(pub u32);

/// Source position attached to every syntax node. Only the line is tracked;
/// fatal errors are reported per line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file: FileId,
    pub line: u32,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({}:{})", self.file, self.line)
    }
}

impl Span {
    pub fn new(file: FileId, line: u32) -> Span {
        Span { file, line }
    }
}

/// A span resolved against the unit's file table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' file at {} line", self.file, self.line)
    }
}

/// File table of one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    files: Vec<String>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<String>) -> FileId {
        let path = path.into();
        if let Some(pos) = self.files.iter().position(|f| *f == path) {
            return FileId(pos as u32);
        }
        self.files.push(path);
        FileId(self.files.len() as u32 - 1)
    }

    pub fn file_name(&self, file: FileId) -> &str {
        self.files
            .get(file.0 as usize)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    pub fn locate(&self, span: Span) -> Location {
        Location::new(self.file_name(span.file), span.line)
    }
}
