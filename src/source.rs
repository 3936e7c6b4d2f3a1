//! TypeScript source files of one package.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Error;
use crate::lang::typescript::TypeScriptSupport;
use crate::lang::{ImportSpecifier, SourceKind};

/// A scanned source file. Immutable for the rest of the run.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// File name relative to its package directory.
    pub name: String,
    pub path: PathBuf,
    pub kind: SourceKind,
    pub text: String,
    pub imports: Vec<ImportSpecifier>,
}

/// Names of the TypeScript sources directly inside `dir`, sorted.
pub fn package_sources(dir: &Path) -> Result<Vec<String>, Error> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io("list", dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io("list", dir, e))?;
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if is_file && SourceKind::of(&name).is_some() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Read and scan one source. A file that fails to parse is reported and
/// kept with no imports.
pub fn read_source(lang: &TypeScriptSupport, dir: &Path, name: &str) -> Result<SourceFile, Error> {
    let path = dir.join(name);
    let text = fs::read_to_string(&path).map_err(|e| Error::io("read", &path, e))?;
    let imports = match lang.parse(&path, &text) {
        Ok(imports) => imports,
        Err(e) => {
            warn!("skipping imports of {}: {e}", path.display());
            Vec::new()
        }
    };
    Ok(SourceFile {
        name: name.to_string(),
        kind: SourceKind::of(name).unwrap_or(SourceKind::Library),
        path,
        text,
        imports,
    })
}
