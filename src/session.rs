//! Session: one run over a set of packages.
//!
//! A [`Session`] expands the command-line paths into packages, scans their
//! sources, and asks the query service everything the updates will need in
//! a single call. [`Session::run`] then updates the packages one by one,
//! deepest first, against that fixed [`ResolutionIndex`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::Error;
use crate::index::ResolutionIndex;
use crate::lang::typescript::TypeScriptSupport;
use crate::query::{QueryKey, QueryService};
use crate::resolver::{self, DescriptorCache};
use crate::source::SourceFile;
use crate::updater::{Outcome, PackageUpdater, UpdateOptions};
use crate::walker::{self, PackageDir};
use crate::workspace::Workspace;

/// How the paths of a run are interpreted.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub paths: Vec<PathBuf>,
    /// The single path is the project root; derive the aggregate rules.
    pub root: bool,
    pub recursive: bool,
    /// Paths are source files; update their directories.
    pub files: bool,
    /// Attempt every package and report all failures at the end.
    pub keep_going: bool,
    pub update: UpdateOptions,
}

pub struct Session {
    workspace: Workspace,
    lang: TypeScriptSupport,
    packages: Vec<PackageDir>,
    sources: Vec<Vec<SourceFile>>,
    index: ResolutionIndex,
    options: RunOptions,
}

impl Session {
    /// Expand the paths, scan every package and pre-resolve in one query.
    pub fn open(workspace: Workspace, service: &dyn QueryService, options: RunOptions) -> Result<Self, Error> {
        if options.root && options.paths.len() > 1 {
            return Err(Error::MutuallyExclusiveFlags(
                "can only take exactly one path with --root".to_string(),
            ));
        }
        let lang = TypeScriptSupport::new();

        let paths = if options.files {
            let dirs = walker::filter_paths(&options.paths);
            if dirs.is_empty() {
                warn!("no TypeScript files among the given paths, nothing to do");
            }
            dirs
        } else {
            options.paths.clone()
        };

        let packages = walker::expand(&workspace, &paths, options.recursive)?;
        let sources = walker::read_packages(&lang, &packages)?;

        let mut descriptors = DescriptorCache::default();
        let mut keys: BTreeSet<QueryKey> = BTreeSet::new();
        for (pkg, files) in packages.iter().zip(&sources) {
            keys.extend(resolver::query_keys(
                &workspace,
                &lang,
                &mut descriptors,
                &pkg.dir,
                &pkg.package,
                files,
                options.update.remove_unused_declarations,
            ));
        }
        let index = ResolutionIndex::build(service, keys)?;

        Ok(Self {
            workspace,
            lang,
            packages,
            sources,
            index,
            options,
        })
    }

    /// Packages in update order.
    pub fn packages(&self) -> &[PackageDir] {
        &self.packages
    }

    /// Update every package in order, calling `on_update` after each one
    /// that succeeded. Stops at the first failure unless keep-going is set.
    pub fn run(&self, mut on_update: impl FnMut(&PackageDir, &Outcome)) -> Result<(), Error> {
        let updater = PackageUpdater::new(&self.workspace, &self.lang, &self.index, &self.options.update);
        let last = self.packages.len().saturating_sub(1);
        let mut failures = Vec::new();

        for (i, (pkg, sources)) in self.packages.iter().zip(&self.sources).enumerate() {
            let root_and_last = self.options.root && i == last;
            info!("updating {}", pkg.display);
            match updater.update(&pkg.dir, sources, root_and_last) {
                Ok(outcome) => on_update(pkg, &outcome),
                Err(e) if self.options.keep_going => {
                    warn!("{}: {e}", pkg.display);
                    failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Error::Run(failures)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use super::*;
    use crate::query::{IndexFile, IndexedRule};

    /// Records every batch it is asked about.
    struct Recording {
        inner: IndexFile,
        batches: RefCell<Vec<Vec<QueryKey>>>,
    }

    impl QueryService for Recording {
        fn lookup(&self, keys: &[QueryKey]) -> Result<Vec<Vec<IndexedRule>>, Error> {
            self.batches.borrow_mut().push(keys.to_vec());
            self.inner.lookup(keys)
        }
    }

    fn ws(files: &[(&str, &str)]) -> (tempfile::TempDir, Workspace) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::write(root.join("WORKSPACE"), "").unwrap();
        for (path, text) in files {
            let p = root.join(path);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, text).unwrap();
        }
        (tmp, Workspace::at(root))
    }

    fn recording(json: &str) -> Recording {
        Recording {
            inner: IndexFile::from_json(json).unwrap(),
            batches: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn root_takes_exactly_one_path() {
        let (_tmp, ws) = ws(&[]);
        let options = RunOptions {
            paths: vec![ws.root().join("a"), ws.root().join("b")],
            root: true,
            ..RunOptions::default()
        };
        let err = Session::open(ws, &recording("{}"), options).err().unwrap();
        assert!(matches!(err, Error::MutuallyExclusiveFlags(_)));
    }

    #[test]
    fn one_batch_for_the_whole_tree() {
        let (_tmp, ws) = ws(&[
            ("a/x.ts", "import 'left';\nimport './b/y';\n"),
            ("a/b/y.ts", "import 'right';\n"),
        ]);
        let service = recording(
            r#"{"modules": {"left": ["//third_party:left"], "right": ["//third_party:right"]}}"#,
        );
        let options = RunOptions {
            paths: vec![ws.root().join("a")],
            recursive: true,
            ..RunOptions::default()
        };
        let session = Session::open(ws.clone(), &service, options).unwrap();
        assert_eq!(service.batches.borrow().len(), 1);

        let mut written = Vec::new();
        session
            .run(|pkg, outcome| {
                if outcome.build_file.is_some() {
                    written.push(pkg.package.clone());
                }
            })
            .unwrap();
        assert_eq!(written, vec!["a/b", "a"]);
        assert_eq!(service.batches.borrow().len(), 1);

        let parent = fs::read_to_string(ws.root().join("a/BUILD")).unwrap();
        assert!(parent.contains("\"//a/b\""), "{parent}");
    }

    #[test]
    fn keep_going_collects_every_failure() {
        let (_tmp, ws) = ws(&[
            ("bad1/x.ts", "import 'missing';\n"),
            ("bad2/x.ts", "import 'missing';\n"),
            ("good/x.ts", "export const x = 1;\n"),
        ]);
        let options = RunOptions {
            paths: vec![ws.root().join("bad1"), ws.root().join("good"), ws.root().join("bad2")],
            keep_going: true,
            ..RunOptions::default()
        };
        let session = Session::open(ws.clone(), &recording("{}"), options.clone()).unwrap();
        let err = session.run(|_, _| {}).unwrap_err();
        assert!(matches!(&err, Error::Run(failures) if failures.len() == 2));
        assert!(ws.root().join("good/BUILD").exists());

        fs::remove_file(ws.root().join("good/BUILD")).unwrap();
        let fail_fast = RunOptions {
            keep_going: false,
            ..options
        };
        let session = Session::open(ws.clone(), &recording("{}"), fail_fast).unwrap();
        let err = session.run(|_, _| {}).unwrap_err();
        assert!(matches!(&err, Error::Package { package, .. } if package == "bad1"));
        assert!(!ws.root().join("good/BUILD").exists());
    }

    #[test]
    fn files_mode_without_sources_is_empty() {
        let (_tmp, ws) = ws(&[("notes.md", "")]);
        let options = RunOptions {
            paths: vec![ws.root().join("notes.md")],
            files: true,
            ..RunOptions::default()
        };
        let service = recording("{}");
        let session = Session::open(ws, &service, options).unwrap();
        assert!(session.packages().is_empty());
        assert!(service.batches.borrow().is_empty());
    }
}
