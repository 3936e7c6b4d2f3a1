//! Dependency set synthesis and declaration pruning.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::build::{PackageDescriptor, RuleKind};
use crate::classify::Classification;
use crate::error::{Error, ImportProblem};
use crate::label::{self, TargetLabel};
use crate::resolver::{ResolvedFile, ResolvedImport, RuleInfo};

/// New dependency list for one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepsPlan {
    pub rule: String,
    pub deps: BTreeSet<TargetLabel>,
}

fn problem(file: &str, import: &ResolvedImport) -> Option<Error> {
    let problem = ImportProblem {
        file: file.to_string(),
        line: import.import.line,
        specifier: import.import.specifier.clone(),
        candidates: import.candidates.clone(),
    };
    match import.candidates.len() {
        0 => Some(Error::UnresolvedImport(problem)),
        1 => None,
        _ => Some(Error::AmbiguousImport(problem)),
    }
}

/// Whether specifier text names `dep` by module name or package path.
fn names_dependency(specifier: &str, dep: &TargetLabel, module_name: Option<&str>) -> bool {
    if let Some(module) = module_name {
        if specifier == module || specifier.starts_with(&format!("{module}/")) {
            return true;
        }
    }
    let package = dep.package();
    if package.is_empty() {
        return false;
    }
    let bare = specifier.trim_start_matches("./");
    bare == package
        || bare.starts_with(&format!("{package}/"))
        || package.ends_with(&format!("/{bare}"))
}

fn is_used(dep: &TargetLabel, info: &RuleInfo, imports: &[&ResolvedImport]) -> bool {
    imports.iter().any(|i| {
        i.candidates.contains(dep)
            || names_dependency(&i.import.specifier, dep, info.module_name.as_deref())
    })
}

/// Compute the new dependency set of every rule with literal `deps`.
///
/// A plan is produced whenever the canonical list (deduplicated, without
/// the rule's own label, in buildifier order) differs from the list as
/// written.
///
/// A rule whose sources have an unresolved or ambiguous import gets no plan
/// and contributes its problems to the returned errors. With `prune`, a
/// listed dependency outside the required set is dropped only when `info`
/// reports it as a declaration rule that no import of the rule mentions.
pub fn plan(
    descriptor: &PackageDescriptor,
    classification: &Classification,
    files: &[ResolvedFile],
    mut prune: Option<&mut dyn FnMut(&TargetLabel) -> RuleInfo>,
) -> (Vec<DepsPlan>, Vec<Error>) {
    let package = descriptor.package();
    let by_name: BTreeMap<&str, &ResolvedFile> = files.iter().map(|f| (f.name.as_str(), f)).collect();
    let mut plans = Vec::new();
    let mut errors = Vec::new();

    for rule in descriptor.rules() {
        if rule.kind().is_aggregate() {
            continue;
        }
        let Some(current) = rule.deps() else {
            debug!("{}: deps is not a list, leaving it", rule.label(package));
            continue;
        };
        let own = rule.label(package);

        let imports: Vec<(&str, &ResolvedImport)> = classification
            .files_of(rule.name())
            .filter_map(|name| by_name.get(name).copied())
            .flat_map(|f| f.imports.iter().map(move |i| (f.name.as_str(), i)))
            .collect();

        let problems: Vec<Error> = imports.iter().filter_map(|(file, i)| problem(file, i)).collect();
        if !problems.is_empty() {
            errors.extend(problems);
            continue;
        }

        let required: BTreeSet<TargetLabel> = imports
            .iter()
            .flat_map(|(_, i)| i.candidates.iter().cloned())
            .filter(|l| *l != own)
            .collect();

        let mut deps: BTreeSet<TargetLabel> = current.iter().map(|l| (*l).clone()).collect();
        deps.remove(&own);
        deps.extend(required.iter().cloned());

        if let Some(info_of) = prune.as_deref_mut() {
            let all: Vec<&ResolvedImport> = imports.iter().map(|(_, i)| *i).collect();
            deps.retain(|dep| {
                if required.contains(dep) || rule.is_kept(dep) {
                    return true;
                }
                let info = info_of(dep);
                if info.kind != Some(RuleKind::Declaration) {
                    return true;
                }
                let used = is_used(dep, &info, &all);
                if !used {
                    info!("{own}: removing unused declaration dependency {dep}");
                }
                used
            });
        }

        let mut canonical: Vec<TargetLabel> = deps.iter().cloned().collect();
        label::sort_for_package(&mut canonical, package);
        if !canonical.iter().eq(current.iter().copied()) {
            plans.push(DepsPlan {
                rule: rule.name().to_string(),
                deps,
            });
        }
    }
    (plans, errors)
}

/// Write the planned dependency sets into the descriptor.
pub fn apply(descriptor: &mut PackageDescriptor, plans: Vec<DepsPlan>) {
    let package = descriptor.package().to_string();
    for plan in plans {
        if let Some(rule) = descriptor.rule_mut(&plan.rule) {
            rule.set_deps(plan.deps.into_iter().collect(), &package);
        }
    }
}
