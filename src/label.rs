//! Bazel target labels.
//!
//! A [`TargetLabel`] names one rule: an optional external repository, a
//! package path relative to the workspace root, and a rule name. Labels
//! compare structurally and sort repository-first, so main-repository labels
//! come before `@external` ones.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetLabel {
    repo: Option<String>,
    package: String,
    name: String,
}

impl TargetLabel {
    /// A label in the main repository.
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            repo: None,
            package: package.into(),
            name: name.into(),
        }
    }

    /// Parse a label as written in a BUILD file of `current_package`.
    ///
    /// Accepts `//pkg:name`, `//pkg` (name is the last path segment),
    /// `@repo//pkg:name`, `:name` and bare `name`.
    pub fn parse(text: &str, current_package: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidLabel(text.to_string());
        if text.is_empty() || text.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let (repo, rest) = match text.strip_prefix('@') {
            Some(after) => {
                let (repo, rest) = after.split_once("//").ok_or_else(invalid)?;
                if repo.is_empty() {
                    return Err(invalid());
                }
                (Some(repo.to_string()), format!("//{rest}"))
            }
            None => (None, text.to_string()),
        };

        let (package, name) = if let Some(abs) = rest.strip_prefix("//") {
            match abs.split_once(':') {
                Some((pkg, name)) => (pkg.to_string(), name.to_string()),
                None => {
                    let last = abs.rsplit('/').next().unwrap_or(abs);
                    (abs.to_string(), last.to_string())
                }
            }
        } else if let Some(name) = rest.strip_prefix(':') {
            (current_package.to_string(), name.to_string())
        } else if !rest.contains(':') {
            (current_package.to_string(), rest.clone())
        } else {
            return Err(invalid());
        };

        if name.is_empty() || name.contains(':') || package.ends_with('/') || package.starts_with('/') {
            return Err(invalid());
        }
        Ok(Self {
            repo,
            package,
            name,
        })
    }

    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this label lives in `package` of the main repository.
    pub fn is_in_package(&self, package: &str) -> bool {
        self.repo.is_none() && self.package == package
    }

    /// The shortest form of the label as written in a BUILD file of
    /// `current_package`: `:name` locally, `//pkg` when the name repeats
    /// the last package segment, `//pkg:name` otherwise.
    pub fn render_in(&self, current_package: &str) -> String {
        if self.is_in_package(current_package) {
            return format!(":{}", self.name);
        }
        let prefix = match &self.repo {
            Some(repo) => format!("@{repo}//"),
            None => "//".to_string(),
        };
        let last = self.package.rsplit('/').next().unwrap_or(&self.package);
        if !self.package.is_empty() && last == self.name {
            format!("{prefix}{}", self.package)
        } else {
            format!("{prefix}{}:{}", self.package, self.name)
        }
    }

    /// Sort key for dependency lists in `current_package`, in buildifier
    /// order: local labels, then main-repository labels, then external ones.
    pub fn sort_key(&self, current_package: &str) -> (u8, String) {
        let group = if self.is_in_package(current_package) {
            0
        } else if self.repo.is_none() {
            1
        } else {
            2
        };
        (group, self.render_in(current_package))
    }
}

impl fmt::Display for TargetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(repo) = &self.repo {
            write!(f, "@{repo}")?;
        }
        write!(f, "//{}:{}", self.package, self.name)
    }
}

impl TryFrom<String> for TargetLabel {
    type Error = Error;

    /// Only absolute labels are accepted outside a BUILD file.
    fn try_from(value: String) -> Result<Self, Self::Error> {
        if !value.starts_with("//") && !value.starts_with('@') {
            return Err(Error::InvalidLabel(value));
        }
        Self::parse(&value, "")
    }
}

impl From<TargetLabel> for String {
    fn from(label: TargetLabel) -> Self {
        label.to_string()
    }
}

/// Sort labels in buildifier order for a dependency list of `current_package`.
pub fn sort_for_package(labels: &mut [TargetLabel], current_package: &str) {
    labels.sort_by_cached_key(|l| l.sort_key(current_package));
}
