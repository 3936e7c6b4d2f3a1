//! Error types for tsdeps.

use std::path::PathBuf;

use crate::label::TargetLabel;

/// An import specifier that could not be mapped to exactly one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProblem {
    /// Source file, relative to its package.
    pub file: String,
    /// 1-based line of the import statement.
    pub line: usize,
    pub specifier: String,
    /// Empty when unresolved, two or more when ambiguous.
    pub candidates: Vec<TargetLabel>,
}

impl std::fmt::Display for ImportProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: ", self.file, self.line)?;
        if self.candidates.is_empty() {
            write!(f, "cannot resolve import '{}'", self.specifier)
        } else {
            let names: Vec<String> = self.candidates.iter().map(ToString::to_string).collect();
            write!(
                f,
                "import '{}' is ambiguous between {}",
                self.specifier,
                names.join(", ")
            )
        }
    }
}

/// Errors from descriptor handling, resolution, classification and I/O.
///
/// Display is lowercase with no trailing punctuation, so messages compose
/// into larger ones (`main` prefixes them with `error:`).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A source file could not be scanned for imports.
    #[error("cannot parse '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// An import matched no rule.
    #[error("{0}")]
    UnresolvedImport(ImportProblem),

    /// An import matched more than one rule.
    #[error("{0}")]
    AmbiguousImport(ImportProblem),

    /// A source cannot be attached to exactly one rule of the right kind.
    #[error("{0}")]
    Classification(String),

    /// An existing BUILD file could not be interpreted.
    #[error("malformed '{}' at line {line}: {message}", .path.display())]
    DescriptorParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A string is not a valid target label.
    #[error("invalid label '{0}'")]
    InvalidLabel(String),

    #[error("cannot {action} '{}': {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The build-graph query service failed.
    #[error("build query failed: {0}")]
    Query(String),

    /// Index file is not valid JSON of the expected shape.
    #[error("invalid index file '{}': {source}", .path.display())]
    IndexParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No WORKSPACE/MODULE.bazel marker above the path.
    #[error("cannot find the workspace root above '{}'", .0.display())]
    WorkspaceNotFound(PathBuf),

    /// A path given on the command line lies outside the workspace.
    #[error("'{}' is outside the workspace", .0.display())]
    OutsideWorkspace(PathBuf),

    /// Mutually exclusive flags or arguments were combined.
    #[error("{0}")]
    MutuallyExclusiveFlags(String),

    /// One package failed; carries every problem found in it.
    #[error("{}", format_package_errors(.package, .errors))]
    Package {
        package: String,
        errors: Vec<Error>,
    },

    /// Several packages failed during a `--keep-going` run.
    #[error("{} packages failed", .0.len())]
    Run(Vec<Error>),
}

fn format_package_errors(package: &str, errors: &[Error]) -> String {
    let shown = if package.is_empty() { "//" } else { package };
    match errors {
        [single] => format!("{shown}: {single}"),
        _ => {
            let mut out = format!("{shown}: {} problems", errors.len());
            for e in errors {
                out.push_str("\n  ");
                out.push_str(&e.to_string());
            }
            out
        }
    }
}

impl Error {
    /// User-facing hint to accompany the error message.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::UnresolvedImport(_) => Some(
                "add a rule that lists the imported file in its srcs, or map the module in the index",
            ),
            Self::AmbiguousImport(_) => {
                Some("several rules provide this module; keep exactly one of them")
            }
            Self::Classification(_) => {
                Some("list the source in the srcs of the rule that should own it")
            }
            Self::WorkspaceNotFound(_) => {
                Some("run inside a Bazel workspace (a directory tree with WORKSPACE or MODULE.bazel)")
            }
            Self::Package { errors, .. } => match errors.as_slice() {
                [single] => single.hint(),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
