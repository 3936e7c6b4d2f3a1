#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// A throwaway Bazel workspace for integration tests.
///
/// Structure:
///   WORKSPACE
///   index.json       -> query answers used in place of `bazel query`
///   pkg/foo.ts       -> imports ./bar and the `widgets` module
///   pkg/bar.ts       -> standalone
///
/// Properties:
///   - `pkg` has no BUILD file yet
///   - `widgets` is provided by //third_party/widgets:widgets
///   - `bar.ts` is unowned unless a test adds it to `files` in the index
pub struct TestWorkspace {
    pub dir: tempfile::TempDir,
    pub root: PathBuf,
}

impl TestWorkspace {
    /// Create the fixture. Caller must keep the returned value alive
    /// (dropping `TempDir` deletes the files).
    pub fn new() -> Self {
        let ws = Self::empty();
        ws.write(
            "pkg/foo.ts",
            concat!(
                "import {bar} from './bar';\n",
                "import {Widget} from 'widgets';\n",
                "\n",
                "export const foo = new Widget(bar);\n",
            ),
        );
        ws.write("pkg/bar.ts", "export const bar = 1;\n");
        ws.index(r#"{"modules": {"widgets": ["//third_party/widgets:widgets"]}}"#);
        ws
    }

    /// Just the WORKSPACE marker and an empty index.
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().unwrap();
        // Canonicalize to avoid macOS /var vs /private/var symlink differences
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("WORKSPACE"), "").unwrap();
        std::fs::write(root.join("index.json"), "{}").unwrap();
        Self { dir, root }
    }

    pub fn write(&self, rel: &str, text: &str) {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.root.join(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root.join(rel).exists()
    }

    /// Replace the query answers.
    pub fn index(&self, json: &str) {
        self.write("index.json", json);
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
