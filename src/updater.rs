//! Updating one package: classify, resolve, plan deps, write.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::build::{self, PackageDescriptor, Rule, RuleKind, DEFAULT_BUILD_FILE};
use crate::classify::{classify, ClassifyContext};
use crate::comments;
use crate::deps;
use crate::error::Error;
use crate::index::ResolutionIndex;
use crate::label::TargetLabel;
use crate::lang::typescript::TypeScriptSupport;
use crate::query::QueryKey;
use crate::resolver::{PackageContext, SpecifierResolver};
use crate::source::SourceFile;
use crate::walker;
use crate::workspace::Workspace;

/// `.bzl` file new rule kinds are loaded from unless configured otherwise.
pub const DEFAULT_RULES_BZL: &str = "@npm_bazel_typescript//:index.bzl";

const CONFIG_RULE: &str = "tsconfig";
const DEVSRCS_RULE: &str = "devsrcs";

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Drop declaration dependencies no import uses.
    pub remove_unused_declarations: bool,
    /// Maintain `// from //pkg:name` annotations in sources.
    pub update_comments: bool,
    pub rules_bzl: String,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            remove_unused_declarations: false,
            update_comments: false,
            rules_bzl: DEFAULT_RULES_BZL.to_string(),
        }
    }
}

/// What one package update wrote.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub build_file: Option<PathBuf>,
    pub sources: Vec<PathBuf>,
}

impl Outcome {
    pub fn is_changed(&self) -> bool {
        self.build_file.is_some() || !self.sources.is_empty()
    }
}

pub struct PackageUpdater<'a> {
    workspace: &'a Workspace,
    lang: &'a TypeScriptSupport,
    index: &'a ResolutionIndex,
    options: &'a UpdateOptions,
}

impl<'a> PackageUpdater<'a> {
    pub fn new(
        workspace: &'a Workspace,
        lang: &'a TypeScriptSupport,
        index: &'a ResolutionIndex,
        options: &'a UpdateOptions,
    ) -> Self {
        Self {
            workspace,
            lang,
            index,
            options,
        }
    }

    /// Bring the BUILD file of `dir` up to date with `sources`.
    ///
    /// Nothing is written unless every import of the package resolves to
    /// exactly one rule. With `root_and_last`, the project-wide `ts_config`
    /// and `ts_development_sources` rules are derived as well.
    pub fn update(&self, dir: &Path, sources: &[SourceFile], root_and_last: bool) -> Result<Outcome, Error> {
        let package = self.workspace.package_of(dir)?;
        self.update_package(dir, &package, sources, root_and_last)
            .map_err(|errors| Error::Package { package, errors })
    }

    fn update_package(
        &self,
        dir: &Path,
        package: &str,
        sources: &[SourceFile],
        root_and_last: bool,
    ) -> Result<Outcome, Vec<Error>> {
        let mut descriptor = match PackageDescriptor::load(dir, package).map_err(|e| vec![e])? {
            Some(d) => d,
            None if sources.is_empty() && !root_and_last => {
                debug!("{}: no sources and no BUILD file", dir.display());
                return Ok(Outcome::default());
            }
            None => PackageDescriptor::empty(dir.join(DEFAULT_BUILD_FILE), package),
        };

        let basename = self.workspace.package_basename(package);
        let external = |name: &str| {
            self.workspace
                .relative(&dir.join(name))
                .map(|rel| self.index.labels(&QueryKey::File(rel)))
                .unwrap_or_default()
        };
        let classification = classify(
            &mut descriptor,
            sources,
            &ClassifyContext {
                dir,
                basename: &basename,
                rules_bzl: &self.options.rules_bzl,
                external_owners: &external,
            },
        )?;

        let mut resolver = SpecifierResolver::new(self.workspace, self.lang, self.index);
        let cx = PackageContext {
            dir,
            package,
            descriptor: &descriptor,
            classification: &classification,
        };
        let files = resolver.resolve_sources(sources, &cx);
        let (plans, errors) = if self.options.remove_unused_declarations {
            let mut info_of = |label: &TargetLabel| resolver.rule_info(label, &cx);
            deps::plan(&descriptor, &classification, &files, Some(&mut info_of))
        } else {
            deps::plan(&descriptor, &classification, &files, None)
        };
        if !errors.is_empty() {
            return Err(errors);
        }
        deps::apply(&mut descriptor, plans);

        let mut rewrites = Vec::new();
        if self.options.update_comments {
            for (source, file) in sources.iter().zip(&files) {
                if let Some(text) = comments::sync(&source.text, &file.imports) {
                    rewrites.push((source.path.clone(), text));
                }
            }
        }

        if root_and_last {
            self.derive_aggregates(&mut descriptor, dir).map_err(|e| vec![e])?;
        }

        // Sources are opened before the BUILD file is written, so an
        // unwritable source leaves the whole package untouched.
        let mut staged = Vec::with_capacity(rewrites.len());
        for (path, text) in rewrites {
            let file = OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(|e| vec![Error::io("write", &path, e)])?;
            staged.push((path, file, text));
        }

        let mut outcome = Outcome::default();
        if descriptor.is_changed() {
            descriptor.write().map_err(|e| vec![e])?;
            info!("updated {}", descriptor.path().display());
            outcome.build_file = Some(descriptor.path().to_path_buf());
        }
        for (path, mut file, text) in staged {
            file.set_len(0)
                .and_then(|()| file.write_all(text.as_bytes()))
                .map_err(|e| vec![Error::io("write", &path, e)])?;
            info!("annotated imports in {}", path.display());
            outcome.sources.push(path);
        }
        Ok(outcome)
    }

    /// `ts_config` over the root `tsconfig*.json` files and
    /// `ts_development_sources` over every library under `dir`.
    fn derive_aggregates(&self, descriptor: &mut PackageDescriptor, dir: &Path) -> Result<(), Error> {
        let configs = tsconfig_files(dir)?;
        self.derive_rule(descriptor, RuleKind::Config, CONFIG_RULE, !configs.is_empty(), |rule, _| {
            rule.set_srcs(configs);
        });

        let libraries = self.libraries_under(descriptor, dir)?;
        self.derive_rule(
            descriptor,
            RuleKind::DevSources,
            DEVSRCS_RULE,
            !libraries.is_empty(),
            |rule, package| rule.set_deps(libraries, package),
        );
        Ok(())
    }

    /// Update the first rule of `kind`, or create one named `name` when
    /// `create` holds.
    fn derive_rule(
        &self,
        descriptor: &mut PackageDescriptor,
        kind: RuleKind,
        name: &str,
        create: bool,
        fill: impl FnOnce(&mut Rule, &str),
    ) {
        let package = descriptor.package().to_string();
        let existing = descriptor
            .rules()
            .iter()
            .find(|r| r.kind() == kind)
            .map(|r| r.name().to_string());
        if let Some(existing) = existing {
            if let Some(rule) = descriptor.rule_mut(&existing) {
                fill(rule, &package);
            }
            return;
        }
        if !create {
            return;
        }
        if descriptor.rule(name).is_some() {
            warn!("not creating {} :{name}: the name is taken", kind.function_name());
            return;
        }
        let mut rule = Rule::new(kind, name);
        fill(&mut rule, &package);
        descriptor.add_rule(rule, &self.options.rules_bzl);
    }

    /// Non-test library rules in `dir` and every package below it.
    fn libraries_under(&self, root: &PackageDescriptor, dir: &Path) -> Result<Vec<TargetLabel>, Error> {
        let is_library = |r: &&Rule| r.kind() == RuleKind::Library { testonly: false };
        let mut labels: Vec<TargetLabel> = root
            .rules()
            .iter()
            .filter(is_library)
            .map(|r| r.label(root.package()))
            .collect();
        for sub in walker::walk_dirs(dir) {
            if sub == dir || build::find_build_file(&sub).is_none() {
                continue;
            }
            let package = self.workspace.package_of(&sub)?;
            if let Some(descriptor) = PackageDescriptor::load(&sub, &package)? {
                labels.extend(descriptor.rules().iter().filter(is_library).map(|r| r.label(&package)));
            }
        }
        Ok(labels)
    }
}

fn tsconfig_files(dir: &Path) -> Result<Vec<String>, Error> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io("list", dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io("list", dir, e))?;
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with("tsconfig") && name.ends_with(".json") && entry.path().is_file() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
