//! Mapping import specifiers to the rules that provide them.
//!
//! Relative specifiers are resolved on the filesystem first. A file of the
//! current package maps to the rule the classifier attached it to; a file of
//! another package maps to the rule of that package's BUILD file listing it.
//! Everything else (bare module names, files no descriptor lists) is looked
//! up in the [`ResolutionIndex`], which was filled by the one batched query
//! before any package was touched.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::build::{PackageDescriptor, RuleKind};
use crate::classify::{Classification, Owner};
use crate::index::ResolutionIndex;
use crate::label::TargetLabel;
use crate::lang::ImportSpecifier;
use crate::lang::typescript::TypeScriptSupport;
use crate::lang::typescript::resolver::is_relative;
use crate::query::QueryKey;
use crate::source::SourceFile;
use crate::workspace::Workspace;

/// Where a specifier points before any rule is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A bare module name.
    Module(String),
    /// A file directly inside the importing package's directory.
    SamePackage(String),
    /// A file under a directory with a BUILD file.
    Package {
        dir: PathBuf,
        package: String,
        /// Path relative to the package directory.
        file: String,
        /// Path relative to the workspace root.
        path: String,
    },
    /// A workspace file no BUILD file covers.
    Unowned(String),
    /// Nothing on disk matches.
    Missing,
}

pub fn locate(workspace: &Workspace, lang: &TypeScriptSupport, dir: &Path, specifier: &str) -> Location {
    if !is_relative(specifier) {
        return Location::Module(specifier.to_string());
    }
    let Some(path) = lang.resolve(dir, specifier) else {
        return Location::Missing;
    };
    if path.parent() == Some(dir) {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            return Location::SamePackage(name.to_string());
        }
    }
    let Some(rel) = workspace.relative(&path) else {
        return Location::Missing;
    };
    match workspace.owning_package(&path) {
        Some((pkg_dir, package)) => {
            let file = Workspace::at(pkg_dir.clone())
                .relative(&path)
                .unwrap_or_else(|| rel.clone());
            Location::Package {
                dir: pkg_dir,
                package,
                file,
                path: rel,
            }
        }
        None => Location::Unowned(rel),
    }
}

/// Parsed BUILD files of other packages, loaded on first use.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    loaded: HashMap<PathBuf, Option<PackageDescriptor>>,
}

impl DescriptorCache {
    pub fn get(&mut self, dir: &Path, package: &str) -> Option<&PackageDescriptor> {
        self.loaded
            .entry(dir.to_path_buf())
            .or_insert_with(|| match PackageDescriptor::load(dir, package) {
                Ok(d) => d,
                Err(e) => {
                    debug!("ignoring unreadable descriptor while resolving: {e}");
                    None
                }
            })
            .as_ref()
    }

    fn owner(&mut self, dir: &Path, package: &str, file: &str) -> Option<TargetLabel> {
        self.get(dir, package)?
            .owner_of(file)
            .map(|rule| rule.label(package))
    }
}

/// What the pruner needs to know about a dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleInfo {
    pub kind: Option<RuleKind>,
    pub module_name: Option<String>,
}

/// An import with the labels it resolved to.
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub import: ImportSpecifier,
    /// Sorted and distinct. Empty when unresolved, several when ambiguous.
    pub candidates: Vec<TargetLabel>,
}

#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub name: String,
    pub imports: Vec<ResolvedImport>,
}

/// The package being updated.
pub struct PackageContext<'a> {
    pub dir: &'a Path,
    pub package: &'a str,
    pub descriptor: &'a PackageDescriptor,
    pub classification: &'a Classification,
}

pub struct SpecifierResolver<'a> {
    workspace: &'a Workspace,
    lang: &'a TypeScriptSupport,
    index: &'a ResolutionIndex,
    descriptors: DescriptorCache,
}

impl<'a> SpecifierResolver<'a> {
    pub fn new(workspace: &'a Workspace, lang: &'a TypeScriptSupport, index: &'a ResolutionIndex) -> Self {
        Self {
            workspace,
            lang,
            index,
            descriptors: DescriptorCache::default(),
        }
    }

    fn file_key(&self, path: &Path) -> Option<QueryKey> {
        self.workspace.relative(path).map(QueryKey::File)
    }

    /// Candidate labels for one specifier, sorted and distinct.
    pub fn resolve(&mut self, specifier: &str, cx: &PackageContext<'_>) -> Vec<TargetLabel> {
        let mut labels = match locate(self.workspace, self.lang, cx.dir, specifier) {
            Location::Module(name) => self.index.labels(&QueryKey::Module(name)),
            Location::SamePackage(name) => match cx.classification.owner(&name) {
                Some(Owner::Rule(rule)) => vec![TargetLabel::new(cx.package, rule.clone())],
                Some(Owner::External(labels)) => labels.clone(),
                None => self
                    .file_key(&cx.dir.join(&name))
                    .map(|key| self.index.labels(&key))
                    .unwrap_or_default(),
            },
            Location::Package {
                dir,
                package,
                file,
                path,
            } => {
                let local = if package == cx.package {
                    cx.descriptor.owner_of(&file).map(|r| r.label(&package))
                } else {
                    self.descriptors.owner(&dir, &package, &file)
                };
                match local {
                    Some(label) => vec![label],
                    None => self.index.labels(&QueryKey::File(path)),
                }
            }
            Location::Unowned(path) => self.index.labels(&QueryKey::File(path)),
            Location::Missing => Vec::new(),
        };
        labels.sort();
        labels.dedup();
        labels
    }

    pub fn resolve_sources(&mut self, sources: &[SourceFile], cx: &PackageContext<'_>) -> Vec<ResolvedFile> {
        sources
            .iter()
            .map(|source| ResolvedFile {
                name: source.name.clone(),
                imports: source
                    .imports
                    .iter()
                    .map(|import| ResolvedImport {
                        candidates: self.resolve(&import.specifier, cx),
                        import: import.clone(),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Kind and module name of a dependency: from this package's descriptor,
    /// the BUILD file of its package, or the index, in that order.
    pub fn rule_info(&mut self, label: &TargetLabel, cx: &PackageContext<'_>) -> RuleInfo {
        let from_rule = |rule: &crate::build::Rule| RuleInfo {
            kind: Some(rule.kind()),
            module_name: rule.module_name().map(str::to_string),
        };
        if label.is_in_package(cx.package) {
            if let Some(rule) = cx.descriptor.rule(label.name()) {
                return from_rule(rule);
            }
        } else if label.repo().is_none() {
            let dir = self.workspace.dir_of(label.package());
            if let Some(rule) = self
                .descriptors
                .get(&dir, label.package())
                .and_then(|d| d.rule(label.name()))
            {
                return from_rule(rule);
            }
        }
        RuleInfo {
            kind: self.index.kind_of(label),
            module_name: None,
        }
    }
}

/// Keys the batched query must answer for one package: bare modules,
/// files no local descriptor lists and, when pruning, every dependency
/// whose kind may be needed.
pub fn query_keys(
    workspace: &Workspace,
    lang: &TypeScriptSupport,
    descriptors: &mut DescriptorCache,
    dir: &Path,
    package: &str,
    sources: &[SourceFile],
    with_dependencies: bool,
) -> BTreeSet<QueryKey> {
    let mut keys = BTreeSet::new();
    let listed = |descriptors: &mut DescriptorCache, name: &str| {
        descriptors
            .get(dir, package)
            .is_some_and(|d| d.rules().iter().any(|r| !r.kind().is_aggregate() && r.owns(name)))
    };

    for source in sources {
        if !listed(descriptors, &source.name) {
            if let Some(rel) = workspace.relative(&source.path) {
                keys.insert(QueryKey::File(rel));
            }
        }
        for import in &source.imports {
            match locate(workspace, lang, dir, &import.specifier) {
                Location::Module(name) => {
                    keys.insert(QueryKey::Module(name));
                }
                Location::SamePackage(name) => {
                    if !listed(descriptors, &name) {
                        if let Some(rel) = workspace.relative(&dir.join(&name)) {
                            keys.insert(QueryKey::File(rel));
                        }
                    }
                }
                Location::Package {
                    dir: pkg_dir,
                    package: pkg,
                    file,
                    path,
                } => {
                    if descriptors.owner(&pkg_dir, &pkg, &file).is_none() {
                        keys.insert(QueryKey::File(path));
                    }
                }
                Location::Unowned(path) => {
                    keys.insert(QueryKey::File(path));
                }
                Location::Missing => {}
            }
        }
    }

    if with_dependencies {
        if let Some(descriptor) = descriptors.get(dir, package) {
            for rule in descriptor.rules() {
                for dep in rule.deps().unwrap_or_default() {
                    if !dep.is_in_package(package) {
                        keys.insert(QueryKey::Rule(dep.clone()));
                    }
                }
            }
        }
    }
    keys
}
