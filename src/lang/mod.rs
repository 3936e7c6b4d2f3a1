pub mod typescript;

use std::ops::Range;
use std::path::Path;

/// Opaque error from the source parser.
///
/// Callers never need to distinguish parse failure causes: they log and
/// skip the file.
#[derive(Debug, Clone)]
pub struct ParseError(String);

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// `import x from "y"`, `import x = require("y")`.
    Value,
    /// `import type ...`, or every named specifier is type-only.
    TypeOnly,
    /// `import "y"`.
    SideEffect,
    /// `export ... from "y"`.
    Reexport,
    /// `/// <reference path="..." />` or `/// <reference types="..." />`.
    Reference,
}

/// One module reference found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpecifier {
    pub specifier: String,
    pub kind: ImportKind,
    /// 1-based first line of the statement.
    pub line: usize,
    /// 1-based last line of the statement.
    pub end_line: usize,
    /// Byte span of the whole statement.
    pub span: Range<usize>,
}

/// How a source file participates in a package, by file name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Library,
    Test,
    Declaration,
}

impl SourceKind {
    /// `None` for files that are not TypeScript sources.
    pub fn of(file_name: &str) -> Option<Self> {
        if file_name.ends_with(".d.ts") {
            Some(Self::Declaration)
        } else if file_name.ends_with("_test.ts") || file_name.ends_with("_test.tsx") {
            Some(Self::Test)
        } else if file_name.ends_with(".ts") || file_name.ends_with(".tsx") {
            Some(Self::Library)
        } else {
            None
        }
    }
}

pub fn is_typescript_source(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| SourceKind::of(n).is_some())
}
