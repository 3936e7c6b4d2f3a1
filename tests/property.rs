use std::path::PathBuf;

use proptest::prelude::*;

use tsdeps::build::{PackageDescriptor, Rule, RuleKind};
use tsdeps::label::TargetLabel;
use tsdeps::lang::typescript::TypeScriptSupport;
use tsdeps::walker::order_deepest_first;

fn label() -> impl Strategy<Value = TargetLabel> {
    ("[a-z]{1,3}(/[a-z]{1,3}){0,2}", "[a-z_]{1,5}").prop_map(|(pkg, name)| TargetLabel::new(pkg, name))
}

proptest! {
    /// Label parsing must never panic, regardless of input.
    #[test]
    fn label_parse_never_panics(input in "\\PC{0,80}", package in "[a-z/]{0,12}") {
        let _ = TargetLabel::parse(&input, &package);
    }

    /// Rendering a label and parsing it back gives the same label.
    #[test]
    fn rendered_labels_parse_back(l in label(), current in "[a-z]{1,3}") {
        let text = l.render_in(&current);
        prop_assert_eq!(TargetLabel::parse(&text, &current).unwrap(), l);
    }

    /// BUILD parsing must never panic, and an untouched descriptor
    /// serializes to exactly its input.
    #[test]
    fn descriptor_parse_preserves_text(input in "\\PC{0,200}") {
        if let Ok(d) = PackageDescriptor::parse(PathBuf::from("BUILD"), "pkg", input.clone()) {
            prop_assert_eq!(d.serialize(), input);
        }
    }

    /// Structured BUILD-like input.
    #[test]
    fn descriptor_parse_structured(
        func in "(ts_library|ts_declaration|ts_config|genrule|load)",
        name in "[a-z_]{0,8}",
        attr in "(srcs|deps|testonly|visibility|module_name)",
        value in "(\\[\\]|\\[\"[a-z./:]{0,10}\"\\]|True|glob\\(\\[\"\\*.ts\"\\]\\)|\"x\")",
    ) {
        let text = format!("{func}(name = \"{name}\", {attr} = {value})\n");
        let _ = PackageDescriptor::parse(PathBuf::from("BUILD"), "pkg", text);
    }

    /// The import extractor must never panic, regardless of input.
    #[test]
    fn source_parse_never_panics(input in "\\PC{0,200}") {
        let _ = TypeScriptSupport::new().parse(std::path::Path::new("a.ts"), &input);
    }

    /// Dependency rendering does not depend on the order labels arrive in.
    #[test]
    fn deps_order_is_deterministic(labels in prop::collection::vec(label(), 0..8)) {
        let render = |labels: Vec<TargetLabel>| {
            let mut d = PackageDescriptor::empty(PathBuf::from("pkg/BUILD"), "pkg");
            let mut rule = Rule::new(RuleKind::Library { testonly: false }, "pkg");
            rule.set_deps(labels, "pkg");
            d.add_rule(rule, "@npm_bazel_typescript//:index.bzl");
            d.serialize()
        };
        let mut reversed = labels.clone();
        reversed.reverse();
        prop_assert_eq!(render(labels), render(reversed));
    }

    /// Walk order is a function of the set of directories alone.
    #[test]
    fn deepest_first_is_deterministic(dirs in prop::collection::vec("[ab]{1,2}(/[ab]{1,2}){0,3}", 0..10)) {
        let mut forward: Vec<PathBuf> = dirs.iter().map(PathBuf::from).collect();
        let mut backward: Vec<PathBuf> = forward.iter().rev().cloned().collect();
        order_deepest_first(&mut forward);
        order_deepest_first(&mut backward);
        prop_assert_eq!(&forward, &backward);
        for pair in forward.windows(2) {
            prop_assert!(pair[0].as_os_str().len() >= pair[1].as_os_str().len());
        }
    }
}
