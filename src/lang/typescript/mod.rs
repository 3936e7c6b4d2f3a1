pub(crate) mod parser;
pub(crate) mod resolver;

use std::path::{Path, PathBuf};

use crate::lang::{ImportSpecifier, ParseError};

use self::resolver::ImportResolver;

/// Directories never treated as packages or searched for sources.
pub const SKIP_DIRS: &[&str] = &["node_modules"];

/// Parsing and relative-path resolution for TypeScript sources.
#[derive(Debug, Default)]
pub struct TypeScriptSupport {
    resolver: ImportResolver,
}

impl TypeScriptSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, path: &Path, source: &str) -> Result<Vec<ImportSpecifier>, ParseError> {
        parser::parse_source(path, source)
    }

    /// Resolve a relative specifier of a file in `source_dir` to a file.
    pub fn resolve(&self, source_dir: &Path, specifier: &str) -> Option<PathBuf> {
        self.resolver.resolve(source_dir, specifier)
    }
}

/// Whether a directory should be skipped by the tree walk.
pub fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name) || name.starts_with('.') || name.starts_with("bazel-")
}
