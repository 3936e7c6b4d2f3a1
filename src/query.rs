//! Build-graph query services.
//!
//! The updater never asks the build system anything directly. All external
//! knowledge (which rule provides a module, which rule owns a file outside
//! the local descriptors, what kind a dependency is) comes from one batched
//! [`QueryService::lookup`] call made before any package is updated.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, info};

use crate::build::{PackageDescriptor, RuleKind};
use crate::error::Error;
use crate::label::TargetLabel;
use crate::workspace::Workspace;

/// One question for the query service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    /// Rules providing a bare module specifier (`widgets`, `@scope/x`).
    Module(String),
    /// Rules listing a workspace-relative file in their `srcs`.
    File(String),
    /// The rule itself, to learn its kind.
    Rule(TargetLabel),
}

/// A rule known to the query service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRule {
    pub label: TargetLabel,
    /// `None` for rule classes the updater does not manage.
    pub kind: Option<RuleKind>,
}

pub trait QueryService {
    /// Answer every key at once; the result has one entry per key, in order.
    fn lookup(&self, keys: &[QueryKey]) -> Result<Vec<Vec<IndexedRule>>, Error>;
}

fn kind_from_class(class: &str) -> Option<RuleKind> {
    RuleKind::from_function(class)
}

/// Module names that can provide `spec`, longest first: the specifier
/// itself and each prefix ending at a `/` (`lodash/fp` -> `lodash`). A
/// scope alone (`@scope`) is never a module name.
fn module_candidates(spec: &str) -> Vec<&str> {
    let min_segments = if spec.starts_with('@') { 2 } else { 1 };
    let mut out = vec![spec];
    let mut rest = spec;
    while let Some((head, _)) = rest.rsplit_once('/') {
        if head.split('/').count() < min_segments {
            break;
        }
        out.push(head);
        rest = head;
    }
    out
}

// ---------------------------------------------------------------------------
// JSON index file
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexData {
    #[serde(default)]
    modules: BTreeMap<String, Vec<TargetLabel>>,
    #[serde(default)]
    files: BTreeMap<String, Vec<TargetLabel>>,
    /// Rule label to rule class (`ts_library`, `ts_declaration`, ...).
    #[serde(default)]
    kinds: BTreeMap<String, String>,
}

/// Query service backed by a JSON file:
///
/// ```json
/// {
///   "modules": { "widgets": ["//third_party/widgets:widgets"] },
///   "files": { "pkg/bar.ts": ["//pkg:bar"] },
///   "kinds": { "//third_party/widgets:widgets": "ts_library" }
/// }
/// ```
#[derive(Debug, Default)]
pub struct IndexFile {
    modules: BTreeMap<String, Vec<TargetLabel>>,
    files: BTreeMap<String, Vec<TargetLabel>>,
    kinds: BTreeMap<TargetLabel, Option<RuleKind>>,
}

impl IndexFile {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|e| Error::io("read", path, e))?;
        Self::from_json(&text).map_err(|source| Error::IndexParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let data: IndexData = serde_json::from_str(text)?;
        let mut kinds = BTreeMap::new();
        for (label, class) in data.kinds {
            let label = TargetLabel::try_from(label).map_err(<serde_json::Error as serde::de::Error>::custom)?;
            kinds.insert(label, kind_from_class(&class));
        }
        Ok(Self {
            modules: data.modules,
            files: data.files,
            kinds,
        })
    }

    fn rules(&self, labels: Option<&Vec<TargetLabel>>) -> Vec<IndexedRule> {
        labels
            .into_iter()
            .flatten()
            .map(|label| IndexedRule {
                kind: self.kinds.get(label).copied().flatten(),
                label: label.clone(),
            })
            .collect()
    }
}

impl QueryService for IndexFile {
    fn lookup(&self, keys: &[QueryKey]) -> Result<Vec<Vec<IndexedRule>>, Error> {
        Ok(keys
            .iter()
            .map(|key| match key {
                QueryKey::Module(spec) => self.rules(
                    module_candidates(spec)
                        .into_iter()
                        .find_map(|name| self.modules.get(name)),
                ),
                QueryKey::File(path) => self.rules(self.files.get(path)),
                QueryKey::Rule(label) => match self.kinds.get(label) {
                    Some(kind) => vec![IndexedRule {
                        label: label.clone(),
                        kind: *kind,
                    }],
                    None => Vec::new(),
                },
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// bazel query
// ---------------------------------------------------------------------------

/// Query service that runs `bazel query --output=build` once with a union
/// of every key, then answers keys from the printed rules.
#[derive(Debug)]
pub struct BazelQuery {
    bazel: PathBuf,
    workspace: Workspace,
}

/// A rule printed by `bazel query --output=build`.
#[derive(Debug, Clone)]
struct QueriedRule {
    label: TargetLabel,
    kind: RuleKind,
    module_name: Option<String>,
    /// Workspace-relative paths of the files in `srcs`.
    files: BTreeSet<String>,
}

impl BazelQuery {
    pub fn new(bazel: impl Into<PathBuf>, workspace: Workspace) -> Self {
        Self {
            bazel: bazel.into(),
            workspace,
        }
    }

    fn expression(&self, keys: &[QueryKey]) -> String {
        let mut terms: Vec<String> = keys
            .iter()
            .map(|key| match key {
                QueryKey::Module(spec) => {
                    let names: Vec<String> = module_candidates(spec).into_iter().map(regex_escape).collect();
                    format!("attr(\"module_name\", \"^({})$\", //...)", names.join("|"))
                }
                QueryKey::File(path) => {
                    format!("attr(\"srcs\", \"{}\", //...)", regex_escape(&self.file_label(path)))
                }
                QueryKey::Rule(label) => format!("\"{label}\""),
            })
            .collect();
        terms.sort();
        terms.dedup();
        terms.join(" + ")
    }

    /// Label Bazel gives a source file: relative to the nearest package
    /// above it, so `pkg/sub/x.ts` is `//pkg:sub/x.ts` when `pkg/sub` has
    /// no BUILD file.
    fn file_label(&self, path: &str) -> String {
        let owner = self
            .workspace
            .owning_package(&self.workspace.root().join(path))
            .map(|(_, package)| package);
        match owner {
            Some(package) if package.is_empty() => format!("//:{path}"),
            Some(package) => match path.strip_prefix(&format!("{package}/")) {
                Some(name) => format!("//{package}:{name}"),
                None => format!("//:{path}"),
            },
            None => {
                let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
                format!("//{dir}:{file}")
            }
        }
    }

    fn run(&self, expression: &str) -> Result<String, Error> {
        info!("running {} query", self.bazel.display());
        debug!("query expression: {expression}");
        let output = Command::new(&self.bazel)
            .args(["query", "--output=build", "--keep_going", expression])
            .current_dir(self.workspace.root())
            .output()
            .map_err(|e| Error::Query(format!("failed to run {}: {e}", self.bazel.display())))?;

        // 3 means some targets could not be loaded; the rest are valid.
        let code = output.status.code();
        if !output.status.success() && code != Some(3) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Query(stderr.trim().to_string()));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| Error::Query("query output is not valid UTF-8".to_string()))
    }
}

impl QueryService for BazelQuery {
    fn lookup(&self, keys: &[QueryKey]) -> Result<Vec<Vec<IndexedRule>>, Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let output = self.run(&self.expression(keys))?;
        let rules = parse_query_output(&output, &self.workspace)?;
        debug!("query returned {} rules", rules.len());
        Ok(keys.iter().map(|key| answer(key, &rules)).collect())
    }
}

fn answer(key: &QueryKey, rules: &[QueriedRule]) -> Vec<IndexedRule> {
    // The longest module name providing the specifier wins.
    let module = match key {
        QueryKey::Module(spec) => module_candidates(spec)
            .into_iter()
            .find(|name| rules.iter().any(|r| r.module_name.as_deref() == Some(*name))),
        _ => None,
    };
    rules
        .iter()
        .filter(|rule| match key {
            QueryKey::Module(_) => module.is_some() && rule.module_name.as_deref() == module,
            QueryKey::File(path) => rule.files.contains(path),
            QueryKey::Rule(label) => rule.label == *label,
        })
        .map(|rule| IndexedRule {
            label: rule.label.clone(),
            kind: Some(rule.kind),
        })
        .collect()
}

/// Split `--output=build` text into rules. Each rule is preceded by a
/// `# /path/to/BUILD:line:column` comment naming the file it came from.
fn parse_query_output(output: &str, workspace: &Workspace) -> Result<Vec<QueriedRule>, Error> {
    let mut rules = Vec::new();
    let mut location: Option<&str> = None;
    let mut body = String::new();

    let mut flush = |location: Option<&str>, body: &mut String| -> Result<(), Error> {
        if let Some(loc) = location {
            if let Some((repo, package)) = package_of_location(loc, workspace) {
                rules.extend(rules_in_block(body, repo, &package)?);
            }
        }
        body.clear();
        Ok(())
    };

    for line in output.lines() {
        if let Some(loc) = line.strip_prefix("# ") {
            if loc.contains("BUILD") {
                flush(location, &mut body)?;
                location = Some(loc);
                continue;
            }
        }
        body.push_str(line);
        body.push('\n');
    }
    flush(location, &mut body)?;
    Ok(rules)
}

/// Repository and package of a `/abs/path/BUILD:3:11` location.
fn package_of_location(location: &str, workspace: &Workspace) -> Option<(Option<String>, String)> {
    let path = location.split(':').next()?;
    let dir = Path::new(path).parent()?;
    if let Some(package) = workspace.relative(dir) {
        return Some((None, package));
    }
    // External repositories live under <output_base>/external/<repo>/.
    let text = dir.to_str()?;
    let (_, rest) = text.rsplit_once("/external/")?;
    let (repo, package) = rest.split_once('/').unwrap_or((rest, ""));
    Some((Some(repo.to_string()), package.to_string()))
}

fn rules_in_block(body: &str, repo: Option<String>, package: &str) -> Result<Vec<QueriedRule>, Error> {
    let descriptor = PackageDescriptor::parse(PathBuf::from("<query output>"), package, body.to_string())?;
    Ok(descriptor
        .rules()
        .iter()
        .map(|rule| {
            let mut label = rule.label(package);
            if let Some(repo) = &repo {
                label = TargetLabel::parse(&format!("@{repo}//{package}:{}", rule.name()), package)
                    .unwrap_or(label);
            }
            let files = rule
                .srcs()
                .unwrap_or_default()
                .into_iter()
                .filter_map(|src| TargetLabel::parse(src, package).ok())
                .filter(|src| src.repo().is_none())
                .map(|src| {
                    if src.package().is_empty() {
                        src.name().to_string()
                    } else {
                        format!("{}/{}", src.package(), src.name())
                    }
                })
                .collect();
            QueriedRule {
                label,
                kind: rule.kind(),
                module_name: rule.module_name().map(str::to_string),
                files,
            }
        })
        .collect())
}

fn regex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
