use std::path::{Path, PathBuf};

use oxc_resolver::{ResolveOptions, Resolver};

/// Filesystem resolution of relative specifiers with TypeScript probing:
/// `./x` tries `x.ts`, `x.tsx`, `x.d.ts`, then `x/index.*`, and `./x.js`
/// is read as `./x.ts`.
#[derive(Debug)]
pub struct ImportResolver {
    resolver: Resolver,
}

impl Default for ImportResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportResolver {
    pub fn new() -> Self {
        let resolver = Resolver::new(ResolveOptions {
            extensions: vec![".ts".into(), ".tsx".into(), ".d.ts".into()],
            extension_alias: vec![
                (".js".into(), vec![".ts".into(), ".tsx".into(), ".d.ts".into()]),
                (".jsx".into(), vec![".tsx".into()]),
            ],
            main_files: vec!["index".into()],
            // Keep paths under the workspace as written; a symlinked source
            // still belongs to the package it is linked into.
            symlinks: false,
            ..ResolveOptions::default()
        });
        Self { resolver }
    }

    /// Resolve `specifier` from `source_dir`. Only `./` and `../` specifiers
    /// are handled; everything else is `None`.
    pub fn resolve(&self, source_dir: &Path, specifier: &str) -> Option<PathBuf> {
        if !is_relative(specifier) {
            return None;
        }
        self.resolver
            .resolve(source_dir, specifier)
            .ok()
            .map(oxc_resolver::Resolution::into_path_buf)
    }
}

pub fn is_relative(specifier: &str) -> bool {
    specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../")
}
