mod common;

use std::collections::BTreeSet;

use tsdeps::build::PackageDescriptor;
use tsdeps::label::TargetLabel;
use tsdeps::query::IndexFile;
use tsdeps::session::{RunOptions, Session};
use tsdeps::updater::UpdateOptions;
use tsdeps::workspace::Workspace;

use common::TestWorkspace;

const INDEX: &str = r#"{
    "modules": {
        "widgets": ["//third_party/widgets:widgets"],
        "gadgets": ["//third_party/gadgets:gadgets"]
    },
    "kinds": {"//types/old:old": "ts_declaration"}
}"#;

fn run(ws: &TestWorkspace, packages: &[&str], update: UpdateOptions) {
    let options = RunOptions {
        paths: packages.iter().map(|p| ws.path(p)).collect(),
        update,
        ..RunOptions::default()
    };
    let index = IndexFile::from_json(INDEX).unwrap();
    let session = Session::open(Workspace::find(ws.root()).unwrap(), &index, options).unwrap();
    session.run(|_, _| {}).unwrap();
}

fn deps(ws: &TestWorkspace, package: &str, rule: &str) -> BTreeSet<TargetLabel> {
    let d = PackageDescriptor::load(&ws.path(package), package).unwrap().unwrap();
    d.rule(rule).unwrap().deps().unwrap().into_iter().cloned().collect()
}

fn existing_package(ws: &TestWorkspace) {
    ws.write(
        "app/BUILD",
        concat!(
            "# Hand-written header.\n",
            "load(\"@npm_bazel_typescript//:index.bzl\", \"ts_library\")\n",
            "\n",
            "ts_library(\n",
            "    name = \"app\",\n",
            "    srcs = [\"main.ts\"],\n",
            "    visibility = [\"//visibility:public\"],\n",
            "    deps = [\n",
            "        \"//types/old\",\n",
            "        \"//third_party/widgets\",  # keep\n",
            "    ],\n",
            ")\n",
            "\n",
            "genrule(name = \"gen\", outs = [\"gen.ts\"], cmd = \"touch $@\")\n",
        ),
    );
    ws.write("app/main.ts", "import {g} from 'gadgets';\nimport './util';\n");
    ws.write("app/util.ts", "export {};\n");
}

#[test]
fn additive_without_pruning() {
    let ws = TestWorkspace::empty();
    existing_package(&ws);
    let before = deps(&ws, "app", "app");
    run(&ws, &["app"], UpdateOptions::default());
    let after = deps(&ws, "app", "app");
    assert!(after.is_superset(&before));
    assert!(after.contains(&TargetLabel::new("third_party/gadgets", "gadgets")));
    assert!(!after.contains(&TargetLabel::new("app", "app")));
}

#[test]
fn unknown_content_survives_an_update() {
    let ws = TestWorkspace::empty();
    existing_package(&ws);
    run(&ws, &["app"], UpdateOptions::default());
    assert_eq!(
        ws.read("app/BUILD"),
        concat!(
            "# Hand-written header.\n",
            "load(\"@npm_bazel_typescript//:index.bzl\", \"ts_library\")\n",
            "\n",
            "ts_library(\n",
            "    name = \"app\",\n",
            "    srcs = [\n",
            "        \"main.ts\",\n",
            "        \"util.ts\",\n",
            "    ],\n",
            "    visibility = [\"//visibility:public\"],\n",
            "    deps = [\n",
            "        \"//third_party/gadgets\",\n",
            "        \"//third_party/widgets\",  # keep\n",
            "        \"//types/old\",\n",
            "    ],\n",
            ")\n",
            "\n",
            "genrule(name = \"gen\", outs = [\"gen.ts\"], cmd = \"touch $@\")\n",
        )
    );
}

#[test]
fn pruning_respects_keep_comments() {
    let ws = TestWorkspace::empty();
    existing_package(&ws);
    let update = UpdateOptions {
        remove_unused_declarations: true,
        ..UpdateOptions::default()
    };
    run(&ws, &["app"], update);
    let after = deps(&ws, "app", "app");
    let expected: BTreeSet<TargetLabel> = [
        TargetLabel::new("third_party/gadgets", "gadgets"),
        TargetLabel::new("third_party/widgets", "widgets"),
    ]
    .into_iter()
    .collect();
    assert_eq!(after, expected);
}

#[test]
fn identical_trees_give_identical_output() {
    let outputs: Vec<String> = (0..2)
        .map(|_| {
            let ws = TestWorkspace::new();
            ws.index(INDEX);
            run(&ws, &["pkg"], UpdateOptions::default());
            ws.read("pkg/BUILD")
        })
        .collect();
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn idempotent_after_first_run() {
    let ws = TestWorkspace::empty();
    existing_package(&ws);
    run(&ws, &["app"], UpdateOptions::default());
    let first = ws.read("app/BUILD");
    run(&ws, &["app"], UpdateOptions::default());
    assert_eq!(ws.read("app/BUILD"), first);
}
