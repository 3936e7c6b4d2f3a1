//! Attaching each source file of a package to exactly one rule.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::build::{PackageDescriptor, Rule, RuleKind};
use crate::error::Error;
use crate::label::TargetLabel;
use crate::lang::SourceKind;
use crate::source::SourceFile;

/// Who owns a source file after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// A rule of this package's descriptor, by name.
    Rule(String),
    /// Not listed locally, but the query service knows rules listing it.
    External(Vec<TargetLabel>),
}

#[derive(Debug, Default)]
pub struct Classification {
    owners: BTreeMap<String, Owner>,
}

impl Classification {
    pub fn owner(&self, file: &str) -> Option<&Owner> {
        self.owners.get(file)
    }

    /// Files attached to the local rule `name`.
    pub fn files_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.owners.iter().filter_map(move |(file, owner)| match owner {
            Owner::Rule(rule) if rule == name => Some(file.as_str()),
            _ => None,
        })
    }

    /// Ownership exactly as the descriptor lists it.
    #[cfg(test)]
    pub(crate) fn from_descriptor(descriptor: &PackageDescriptor) -> Self {
        let mut owners = BTreeMap::new();
        for rule in descriptor.rules().iter().filter(|r| !r.kind().is_aggregate()) {
            for src in rule.srcs().unwrap_or_default() {
                owners.insert(src.to_string(), Owner::Rule(rule.name().to_string()));
            }
        }
        Self { owners }
    }
}

/// Inputs that do not come from the descriptor itself.
pub struct ClassifyContext<'a> {
    /// Package directory, for checking that listed sources still exist.
    pub dir: &'a Path,
    /// Base name for synthesized rules.
    pub basename: &'a str,
    /// `.bzl` file to load new rule kinds from.
    pub rules_bzl: &'a str,
    /// Rules the query service reports as listing a file of this package.
    pub external_owners: &'a dyn Fn(&str) -> Vec<TargetLabel>,
}

fn rule_kind_for(kind: SourceKind) -> RuleKind {
    match kind {
        SourceKind::Library => RuleKind::Library { testonly: false },
        SourceKind::Test => RuleKind::Library { testonly: true },
        SourceKind::Declaration => RuleKind::Declaration,
    }
}

fn synthesized_name(kind: SourceKind, basename: &str) -> String {
    match kind {
        SourceKind::Library => basename.to_string(),
        SourceKind::Test => format!("{basename}_test"),
        SourceKind::Declaration => format!("{basename}_dts"),
    }
}

fn is_file_reference(src: &str) -> bool {
    !(src.starts_with(':') || src.starts_with("//") || src.starts_with('@'))
}

/// Decide the owner of every source, creating rules and extending `srcs`
/// in `descriptor` as needed. Sources listed in a rule but missing from disk
/// are dropped from that rule.
pub fn classify(
    descriptor: &mut PackageDescriptor,
    sources: &[SourceFile],
    cx: &ClassifyContext<'_>,
) -> Result<Classification, Vec<Error>> {
    let mut errors = Vec::new();
    let mut classification = Classification::default();
    let mut additions: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let stale = remove_missing_sources(descriptor, cx.dir);

    for source in sources {
        let listed: Vec<&Rule> = descriptor
            .rules()
            .iter()
            .filter(|r| !r.kind().is_aggregate() && r.owns(&source.name))
            .collect();
        match listed.as_slice() {
            [owner] => {
                classification
                    .owners
                    .insert(source.name.clone(), Owner::Rule(owner.name().to_string()));
                continue;
            }
            [first, second, ..] => {
                errors.push(Error::Classification(format!(
                    "'{}' is listed in the srcs of both :{} and :{}",
                    source.name,
                    first.name(),
                    second.name()
                )));
                continue;
            }
            [] => {}
        }

        let external = (cx.external_owners)(&source.name);
        if !external.is_empty() {
            debug!("{} is owned outside the descriptor by {:?}", source.name, external);
            classification
                .owners
                .insert(source.name.clone(), Owner::External(external));
            continue;
        }

        let kind = rule_kind_for(source.kind);
        let candidates: Vec<String> = descriptor
            .rules()
            .iter()
            .filter(|r| r.kind() == kind)
            .map(|r| r.name().to_string())
            .collect();
        let name = match candidates.as_slice() {
            [single] => single.clone(),
            [] => {
                let name = synthesized_name(source.kind, cx.basename);
                if let Some(existing) = descriptor.rule(&name) {
                    errors.push(Error::Classification(format!(
                        "cannot create {} :{name} for '{}': a {} rule with that name exists",
                        kind.function_name(),
                        source.name,
                        existing.kind().function_name()
                    )));
                    continue;
                }
                info!("creating {} :{name}", kind.function_name());
                descriptor.add_rule(Rule::new(kind, name.clone()), cx.rules_bzl);
                name
            }
            many => {
                let names: Vec<String> = many.iter().map(|n| format!(":{n}")).collect();
                errors.push(Error::Classification(format!(
                    "cannot choose a rule for '{}' among {}",
                    source.name,
                    names.join(", ")
                )));
                continue;
            }
        };
        additions.entry(name.clone()).or_default().push(source.name.clone());
        classification.owners.insert(source.name.clone(), Owner::Rule(name));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    for rule in descriptor.rules_mut() {
        let added = additions.remove(rule.name());
        let pruned = stale.get(rule.name());
        if added.is_none() && pruned.is_none() {
            continue;
        }
        let Some(current) = rule.srcs() else {
            continue;
        };
        let mut srcs: Vec<String> = current
            .into_iter()
            .filter(|s| pruned.is_none_or(|gone| !gone.iter().any(|g| g == s)))
            .map(str::to_string)
            .collect();
        srcs.extend(added.into_iter().flatten());
        rule.set_srcs(srcs);
    }
    Ok(classification)
}

/// Names of listed sources that no longer exist, per rule.
fn remove_missing_sources(descriptor: &PackageDescriptor, dir: &Path) -> BTreeMap<String, Vec<String>> {
    let mut stale = BTreeMap::new();
    for rule in descriptor.rules() {
        if rule.kind().is_aggregate() {
            continue;
        }
        let missing: Vec<String> = rule
            .srcs()
            .unwrap_or_default()
            .into_iter()
            .filter(|src| is_file_reference(src) && !dir.join(src).exists())
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            info!("dropping missing sources {:?} from :{}", missing, rule.name());
            stale.insert(rule.name().to_string(), missing);
        }
    }
    stale
}
