//! The resolution index: answers from the single batched query.

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use crate::build::RuleKind;
use crate::error::Error;
use crate::label::TargetLabel;
use crate::query::{IndexedRule, QueryKey, QueryService};

/// Read-only map from query key to the rules the query service returned.
/// Built once per run and passed by reference to every package update.
#[derive(Debug, Default)]
pub struct ResolutionIndex {
    entries: HashMap<QueryKey, Vec<IndexedRule>>,
    kinds: HashMap<TargetLabel, RuleKind>,
}

impl ResolutionIndex {
    /// Ask `service` about every key in one call.
    pub fn build(service: &dyn QueryService, keys: BTreeSet<QueryKey>) -> Result<Self, Error> {
        let keys: Vec<QueryKey> = keys.into_iter().collect();
        if keys.is_empty() {
            return Ok(Self::default());
        }
        info!("pre-resolving {} keys", keys.len());
        let answers = service.lookup(&keys)?;
        if answers.len() != keys.len() {
            return Err(Error::Query(format!(
                "expected {} answers, got {}",
                keys.len(),
                answers.len()
            )));
        }

        let mut index = Self::default();
        for (key, rules) in keys.into_iter().zip(answers) {
            for rule in &rules {
                if let Some(kind) = rule.kind {
                    index.kinds.insert(rule.label.clone(), kind);
                }
            }
            index.entries.insert(key, rules);
        }
        Ok(index)
    }

    /// Distinct labels answering `key`, sorted. Empty for unknown keys.
    pub fn labels(&self, key: &QueryKey) -> Vec<TargetLabel> {
        let mut labels: Vec<TargetLabel> = self
            .entries
            .get(key)
            .into_iter()
            .flatten()
            .map(|r| r.label.clone())
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }

    /// Kind of a rule seen in any answer.
    pub fn kind_of(&self, label: &TargetLabel) -> Option<RuleKind> {
        self.kinds.get(label).copied()
    }
}
