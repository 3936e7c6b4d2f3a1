//! In-memory model of a package's BUILD file.
//!
//! A [`PackageDescriptor`] is parsed from the file text, edited through
//! [`Rule`] setters, and serialized back by splicing only the attribute
//! values that actually changed into the original text. Everything the model
//! does not interpret (other rules, assignments, comments, formatting) is
//! carried over byte-for-byte.

pub(crate) mod lexer;
mod parse;
mod render;

use std::collections::HashSet;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::label::{self, TargetLabel};

/// BUILD file names, in lookup order.
pub const BUILD_FILE_NAMES: &[&str] = &["BUILD.bazel", "BUILD"];

/// Name used when a package has no BUILD file yet.
pub const DEFAULT_BUILD_FILE: &str = "BUILD";

/// The rule kinds the updater manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    /// `ts_library`; test libraries carry `testonly = True`.
    Library { testonly: bool },
    /// `ts_declaration`: type information only.
    Declaration,
    /// `ts_config`: project-wide compiler configuration.
    Config,
    /// `ts_development_sources`: every library in the project.
    DevSources,
}

impl RuleKind {
    pub fn function_name(self) -> &'static str {
        match self {
            Self::Library { .. } => "ts_library",
            Self::Declaration => "ts_declaration",
            Self::Config => "ts_config",
            Self::DevSources => "ts_development_sources",
        }
    }

    /// Map a rule function name to its kind. Libraries come back with
    /// `testonly: false`; the parser fills in the attribute.
    pub fn from_function(name: &str) -> Option<Self> {
        match name {
            "ts_library" => Some(Self::Library { testonly: false }),
            "ts_declaration" => Some(Self::Declaration),
            "ts_config" => Some(Self::Config),
            "ts_development_sources" => Some(Self::DevSources),
            _ => None,
        }
    }

    pub fn is_aggregate(self) -> bool {
        matches!(self, Self::Config | Self::DevSources)
    }
}

/// One element of a literal list attribute, with the comments attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem<T> {
    pub value: T,
    /// Comment on the same line after the element, including the `#`.
    pub trailing: Option<String>,
    /// Whole-line comments directly above the element.
    pub leading: Vec<String>,
}

impl<T> ListItem<T> {
    fn plain(value: T) -> Self {
        Self {
            value,
            trailing: None,
            leading: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListValue<T> {
    pub items: Vec<ListItem<T>>,
    /// Whole-line comments after the last element.
    pub footer: Vec<String>,
}

impl<T> Default for ListValue<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            footer: Vec::new(),
        }
    }
}

/// State of a list attribute (`srcs`, `deps`) on a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListAttr<T> {
    Absent,
    Literal(ListValue<T>),
    /// Not a plain list literal (`glob(...)`, concatenation, a variable).
    Opaque,
}

/// Where a parsed rule sits in the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Origin {
    pub span: Range<usize>,
    /// Offset at which new attributes are inserted.
    pub insert_at: usize,
    /// End of the last argument, where a missing comma goes.
    pub last_arg_end: usize,
    /// Whether the last argument already ends with a comma.
    pub trailing_comma: bool,
    pub multiline: bool,
    /// Indentation of the rule's keyword arguments.
    pub indent: String,
    pub srcs_value: Option<Range<usize>>,
    pub deps_value: Option<Range<usize>>,
}

/// A managed rule: kind, name, sources and dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    kind: RuleKind,
    name: String,
    srcs: ListAttr<String>,
    deps: ListAttr<TargetLabel>,
    module_name: Option<String>,
    pub(crate) origin: Option<Origin>,
    srcs_changed: bool,
    deps_changed: bool,
}

impl Rule {
    /// A new rule with no sources and no dependencies.
    pub fn new(kind: RuleKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            srcs: ListAttr::Literal(ListValue::default()),
            deps: ListAttr::Literal(ListValue::default()),
            module_name: None,
            origin: None,
            srcs_changed: false,
            deps_changed: false,
        }
    }

    pub(crate) fn parsed(
        kind: RuleKind,
        name: String,
        srcs: ListAttr<String>,
        deps: ListAttr<TargetLabel>,
        module_name: Option<String>,
        origin: Origin,
    ) -> Self {
        Self {
            kind,
            name,
            srcs,
            deps,
            module_name,
            origin: Some(origin),
            srcs_changed: false,
            deps_changed: false,
        }
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self, package: &str) -> TargetLabel {
        TargetLabel::new(package, self.name.clone())
    }

    /// The `module_name` attribute, when set to a string literal.
    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// Whether the rule was created during this run.
    pub fn is_new(&self) -> bool {
        self.origin.is_none()
    }

    /// Source file names, or `None` when `srcs` is not a list literal.
    pub fn srcs(&self) -> Option<Vec<&str>> {
        match &self.srcs {
            ListAttr::Absent => Some(Vec::new()),
            ListAttr::Literal(list) => Some(list.items.iter().map(|i| i.value.as_str()).collect()),
            ListAttr::Opaque => None,
        }
    }

    pub fn owns(&self, file: &str) -> bool {
        match &self.srcs {
            ListAttr::Literal(list) => list.items.iter().any(|i| i.value == file),
            _ => false,
        }
    }

    /// Dependency labels, or `None` when `deps` is not a list literal.
    pub fn deps(&self) -> Option<Vec<&TargetLabel>> {
        match &self.deps {
            ListAttr::Absent => Some(Vec::new()),
            ListAttr::Literal(list) => Some(list.items.iter().map(|i| &i.value).collect()),
            ListAttr::Opaque => None,
        }
    }

    /// A dependency annotated with `# keep` is never pruned.
    pub fn is_kept(&self, dep: &TargetLabel) -> bool {
        match &self.deps {
            ListAttr::Literal(list) => list.items.iter().any(|i| {
                &i.value == dep
                    && i
                        .trailing
                        .as_deref()
                        .is_some_and(|c| c.trim_start_matches('#').trim() == "keep")
            }),
            _ => false,
        }
    }

    /// Replace the source list. Names are sorted and deduplicated; comments
    /// on retained entries are kept. No-op for opaque `srcs`.
    pub fn set_srcs(&mut self, mut names: Vec<String>) {
        names.sort();
        names.dedup();
        if let Some(list) = replace_list(&self.srcs, names) {
            self.srcs = ListAttr::Literal(list);
            self.srcs_changed = true;
        }
    }

    /// Replace the dependency list, sorted in buildifier order for
    /// `package`. The rule's own label is dropped. No-op for opaque `deps`.
    pub fn set_deps(&mut self, mut labels: Vec<TargetLabel>, package: &str) {
        let own = self.label(package);
        labels.retain(|l| *l != own);
        label::sort_for_package(&mut labels, package);
        labels.dedup();
        if let Some(list) = replace_list(&self.deps, labels) {
            self.deps = ListAttr::Literal(list);
            self.deps_changed = true;
        }
    }

    pub(crate) fn srcs_attr(&self) -> &ListAttr<String> {
        &self.srcs
    }

    pub(crate) fn deps_attr(&self) -> &ListAttr<TargetLabel> {
        &self.deps
    }

    pub(crate) fn srcs_changed(&self) -> bool {
        self.srcs_changed
    }

    pub(crate) fn deps_changed(&self) -> bool {
        self.deps_changed
    }
}

/// Build the replacement list if `values` differs from the current one.
fn replace_list<T: Clone + PartialEq>(attr: &ListAttr<T>, values: Vec<T>) -> Option<ListValue<T>> {
    let old = match attr {
        ListAttr::Opaque => return None,
        ListAttr::Absent => ListValue::default(),
        ListAttr::Literal(list) => list.clone(),
    };
    let unchanged = old.items.len() == values.len()
        && old.items.iter().zip(&values).all(|(item, v)| item.value == *v);
    if unchanged {
        return None;
    }
    let items = values
        .into_iter()
        .map(|value| {
            old.items
                .iter()
                .find(|i| i.value == value)
                .cloned()
                .unwrap_or_else(|| ListItem::plain(value))
        })
        .collect();
    Some(ListValue {
        items,
        footer: old.footer,
    })
}

/// A `load()` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Load {
    pub span: Range<usize>,
    pub bzl: String,
    /// `"symbol"` arguments: symbol and text as written.
    pub positional: Vec<(String, String)>,
    /// `alias = "symbol"` arguments: alias and text as written.
    pub keyword: Vec<(String, String)>,
    /// Symbols to append on serialize.
    pub added: Vec<String>,
}

impl Load {
    /// Whether the statement binds `name` in the file.
    pub fn binds(&self, name: &str) -> bool {
        self.positional.iter().any(|(s, _)| s == name)
            || self.keyword.iter().any(|(alias, _)| alias == name)
            || self.added.iter().any(|s| s == name)
    }

    pub fn is_modified(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Parsed form of one package's BUILD file.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    path: PathBuf,
    package: String,
    text: String,
    rules: Vec<Rule>,
    loads: Vec<Load>,
    /// Every top-level function called in the file.
    called: HashSet<String>,
    /// Symbols that need a new `load()`, keyed by `.bzl` label.
    pending_loads: Vec<(String, String)>,
}

impl PackageDescriptor {
    /// An empty descriptor for a package without a BUILD file.
    pub fn empty(path: PathBuf, package: impl Into<String>) -> Self {
        Self {
            path,
            package: package.into(),
            text: String::new(),
            rules: Vec::new(),
            loads: Vec::new(),
            called: HashSet::new(),
            pending_loads: Vec::new(),
        }
    }

    pub fn parse(path: PathBuf, package: impl Into<String>, text: String) -> Result<Self, Error> {
        let package = package.into();
        let parsed = parse::parse(&text, &package).map_err(|(offset, message)| Error::DescriptorParse {
            line: lexer::line_of(&text, offset),
            path: path.clone(),
            message,
        })?;
        Ok(Self {
            path,
            package,
            text,
            rules: parsed.rules,
            loads: parsed.loads,
            called: parsed.called,
            pending_loads: Vec::new(),
        })
    }

    /// Locate and parse the BUILD file of `dir`. `Ok(None)` when there is none.
    pub fn load(dir: &Path, package: &str) -> Result<Option<Self>, Error> {
        let Some(path) = find_build_file(dir) else {
            return Ok(None);
        };
        let text = fs::read_to_string(&path).map_err(|e| Error::io("read", &path, e))?;
        Self::parse(path, package, text).map(Some)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut [Rule] {
        &mut self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn rule_mut(&mut self, name: &str) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|r| r.name == name)
    }

    /// Append a rule; `bzl` is loaded for its kind when the file does not
    /// already have the symbol.
    pub fn add_rule(&mut self, rule: Rule, bzl: &str) {
        self.ensure_symbol(rule.kind.function_name(), bzl);
        self.rules.push(rule);
    }

    /// The rule owning `file`, if exactly one literal `srcs` lists it.
    pub fn owner_of(&self, file: &str) -> Option<&Rule> {
        let mut owners = self.rules.iter().filter(|r| !r.kind.is_aggregate() && r.owns(file));
        let first = owners.next()?;
        if owners.next().is_some() {
            return None;
        }
        Some(first)
    }

    fn ensure_symbol(&mut self, symbol: &str, bzl: &str) {
        let available = self.called.contains(symbol)
            || self.loads.iter().any(|l| l.binds(symbol))
            || self.pending_loads.iter().any(|(_, s)| s == symbol);
        if available {
            return;
        }
        if let Some(load) = self.loads.iter_mut().find(|l| l.bzl == bzl) {
            load.added.push(symbol.to_string());
        } else {
            self.pending_loads.push((bzl.to_string(), symbol.to_string()));
        }
    }

    /// Render the descriptor back to text.
    pub fn serialize(&self) -> String {
        render::serialize(self)
    }

    /// Whether serializing would produce different bytes than were loaded.
    pub fn is_changed(&self) -> bool {
        self.serialize() != self.text
    }

    pub fn write(&self) -> Result<(), Error> {
        fs::write(&self.path, self.serialize()).map_err(|e| Error::io("write", &self.path, e))
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub(crate) fn pending_loads(&self) -> &[(String, String)] {
        &self.pending_loads
    }
}

/// The BUILD file of `dir`, if any.
pub fn find_build_file(dir: &Path) -> Option<PathBuf> {
    BUILD_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BZL: &str = "@npm_bazel_typescript//:index.bzl";

    fn parse(text: &str) -> PackageDescriptor {
        PackageDescriptor::parse(PathBuf::from("pkg/BUILD"), "pkg", text.to_string()).unwrap()
    }

    #[test]
    fn unchanged_descriptor_round_trips_byte_for_byte() {
        let text = r#"# Copyright header
load("@npm_bazel_typescript//:index.bzl", "ts_library")

package(default_visibility = ["//visibility:public"])

ts_library(
    name = "pkg",
    srcs = glob(["*.ts"]),  # whatever
    deps = [
        "//a",
        ":b",
    ],
)

genrule(name = "gen", outs = ["x.txt"], cmd = "touch $@")
"#;
        let d = parse(text);
        assert_eq!(d.rules().len(), 1);
        assert!(!d.is_changed());
        assert_eq!(d.serialize(), text);
    }

    #[test]
    fn parses_kinds_sources_and_deps() {
        let d = parse(
            r#"
ts_library(
    name = "pkg_test",
    testonly = True,
    srcs = ["a_test.ts"],
    deps = [":pkg", "//other:lib"],
)

ts_declaration(name = "pkg_dts", srcs = ["types.d.ts"])
"#,
        );
        let test = d.rule("pkg_test").unwrap();
        assert_eq!(test.kind(), RuleKind::Library { testonly: true });
        assert_eq!(test.srcs().unwrap(), vec!["a_test.ts"]);
        let deps: Vec<String> = test.deps().unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(deps, vec!["//pkg:pkg", "//other:lib"]);

        let dts = d.rule("pkg_dts").unwrap();
        assert_eq!(dts.kind(), RuleKind::Declaration);
        assert!(dts.deps().unwrap().is_empty());
    }

    #[test]
    fn setting_identical_deps_is_not_a_change() {
        let mut d = parse("ts_library(\n    name = \"pkg\",\n    deps = [\"//a\"],\n)\n");
        let rule = d.rule_mut("pkg").unwrap();
        rule.set_deps(vec![TargetLabel::new("a", "a")], "pkg");
        assert!(!rule.deps_changed());
        assert!(!d.is_changed());
    }

    #[test]
    fn changed_deps_are_spliced_into_place() {
        let text = "ts_library(\n    name = \"pkg\",\n    srcs = [\"a.ts\"],  # sources\n    deps = [\"//a\"],\n)\n";
        let mut d = parse(text);
        d.rule_mut("pkg").unwrap().set_deps(
            vec![TargetLabel::new("z", "z"), TargetLabel::new("a", "a")],
            "pkg",
        );
        assert_eq!(
            d.serialize(),
            "ts_library(\n    name = \"pkg\",\n    srcs = [\"a.ts\"],  # sources\n    deps = [\n        \"//a\",\n        \"//z\",\n    ],\n)\n"
        );
    }

    #[test]
    fn missing_deps_attribute_is_inserted() {
        let text = "ts_library(\n    name = \"pkg\",\n    srcs = [\"a.ts\"],\n)\n";
        let mut d = parse(text);
        d.rule_mut("pkg")
            .unwrap()
            .set_deps(vec![TargetLabel::new("a", "a")], "pkg");
        assert_eq!(
            d.serialize(),
            "ts_library(\n    name = \"pkg\",\n    srcs = [\"a.ts\"],\n    deps = [\"//a\"],\n)\n"
        );
    }

    #[test]
    fn insertion_into_single_line_call() {
        let mut d = parse("ts_library(name = \"pkg\", srcs = [\"a.ts\"])\n");
        d.rule_mut("pkg")
            .unwrap()
            .set_deps(vec![TargetLabel::new("a", "a")], "pkg");
        assert_eq!(
            d.serialize(),
            "ts_library(name = \"pkg\", srcs = [\"a.ts\"], deps = [\"//a\"])\n"
        );
    }

    #[test]
    fn keep_comments_survive_rewrites() {
        let text = "ts_library(\n    name = \"pkg\",\n    deps = [\n        \"//keepme\",  # keep\n    ],\n)\n";
        let mut d = parse(text);
        let keep = TargetLabel::new("keepme", "keepme");
        assert!(d.rule("pkg").unwrap().is_kept(&keep));
        d.rule_mut("pkg")
            .unwrap()
            .set_deps(vec![keep.clone(), TargetLabel::new("a", "a")], "pkg");
        let out = d.serialize();
        assert!(out.contains("\"//keepme\",  # keep"), "{out}");
        assert!(out.contains("\"//a\","));
    }

    #[test]
    fn own_label_is_never_a_dependency() {
        let mut rule = Rule::new(RuleKind::Library { testonly: false }, "pkg");
        rule.set_deps(
            vec![TargetLabel::new("pkg", "pkg"), TargetLabel::new("pkg", "bar")],
            "pkg",
        );
        let deps: Vec<String> = rule.deps().unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(deps, vec!["//pkg:bar"]);
    }

    #[test]
    fn new_rule_in_empty_file_gets_a_load() {
        let mut d = PackageDescriptor::empty(PathBuf::from("pkg/BUILD"), "pkg");
        let mut rule = Rule::new(RuleKind::Library { testonly: false }, "pkg");
        rule.set_srcs(vec!["foo.ts".into()]);
        rule.set_deps(vec![TargetLabel::new("third_party/widgets", "widgets")], "pkg");
        d.add_rule(rule, BZL);
        assert_eq!(
            d.serialize(),
            r#"load("@npm_bazel_typescript//:index.bzl", "ts_library")

ts_library(
    name = "pkg",
    srcs = ["foo.ts"],
    deps = ["//third_party/widgets"],
)
"#
        );
    }

    #[test]
    fn existing_load_is_extended() {
        let text = "load(\"@npm_bazel_typescript//:index.bzl\", \"ts_library\")\n\nts_library(name = \"pkg\", srcs = [\"a.ts\"])\n";
        let mut d = parse(text);
        let mut rule = Rule::new(RuleKind::Declaration, "pkg_dts");
        rule.set_srcs(vec!["t.d.ts".into()]);
        d.add_rule(rule, BZL);
        let out = d.serialize();
        assert!(
            out.starts_with("load(\"@npm_bazel_typescript//:index.bzl\", \"ts_declaration\", \"ts_library\")\n"),
            "{out}"
        );
        assert!(out.ends_with("ts_declaration(\n    name = \"pkg_dts\",\n    srcs = [\"t.d.ts\"],\n)\n"));
    }

    #[test]
    fn symbol_used_without_load_is_not_loaded_again() {
        let mut d = parse("ts_library(name = \"pkg\", srcs = [\"a.ts\"])\n");
        d.add_rule(Rule::new(RuleKind::Library { testonly: true }, "pkg_test"), BZL);
        assert!(!d.serialize().contains("load("));
    }

    #[test]
    fn owner_of_requires_a_single_owner() {
        let d = parse(
            "ts_library(name = \"a\", srcs = [\"x.ts\"])\nts_library(name = \"b\", srcs = [\"x.ts\", \"y.ts\"])\n",
        );
        assert!(d.owner_of("x.ts").is_none());
        assert_eq!(d.owner_of("y.ts").unwrap().name(), "b");
        assert!(d.owner_of("z.ts").is_none());
    }

    #[test]
    fn invalid_dep_label_is_a_descriptor_error() {
        let err = PackageDescriptor::parse(
            PathBuf::from("pkg/BUILD"),
            "pkg",
            "\n\nts_library(name = \"pkg\", deps = [\"a:b:c\"])\n".to_string(),
        )
        .unwrap_err();
        match err {
            Error::DescriptorParse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_prefers_build_bazel() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("BUILD.bazel"), "ts_library(name = \"x\")\n").unwrap();
        fs::write(tmp.path().join("BUILD"), "").unwrap();
        let d = PackageDescriptor::load(tmp.path(), "x").unwrap().unwrap();
        assert!(d.path().ends_with("BUILD.bazel"));
        assert_eq!(d.rules().len(), 1);

        let empty = tempfile::tempdir().unwrap();
        assert!(PackageDescriptor::load(empty.path(), "y").unwrap().is_none());
        let d = PackageDescriptor::empty(empty.path().join(DEFAULT_BUILD_FILE), "y");
        assert!(d.rules().is_empty());
        assert!(!d.is_changed());
    }
}
