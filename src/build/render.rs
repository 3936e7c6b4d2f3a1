//! Serialization of a [`PackageDescriptor`] back to BUILD text.
//!
//! Parsed rules are edited in place: only changed `srcs`/`deps` values are
//! replaced, missing attributes are inserted after the last argument, and
//! extended `load()` statements are rewritten. New rules are appended.

use std::collections::BTreeMap;
use std::ops::Range;

use super::{ListAttr, ListValue, Load, PackageDescriptor, Rule, RuleKind};
use crate::label::TargetLabel;

struct Edit {
    range: Range<usize>,
    text: String,
}

pub(super) fn serialize(d: &PackageDescriptor) -> String {
    let text = d.text();
    let package = d.package();
    let mut edits = Vec::new();

    if let Some(load_text) = pending_load_text(d.pending_loads()) {
        let at = load_insertion_point(text, d.loads());
        let mut insert = String::new();
        if at > 0 && !text[..at].ends_with('\n') {
            insert.push('\n');
        }
        insert.push_str(&load_text);
        if !text[at..].is_empty() && !text[at..].starts_with('\n') {
            insert.push('\n');
        }
        edits.push(Edit {
            range: at..at,
            text: insert,
        });
    }

    for load in d.loads().iter().filter(|l| l.is_modified()) {
        edits.push(Edit {
            range: load.span.clone(),
            text: render_load(load),
        });
    }

    for rule in d.rules() {
        if let Some(origin) = &rule.origin {
            rule_edits(text, package, rule, origin, &mut edits);
        }
    }

    edits.sort_by_key(|e| e.range.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&text[cursor..edit.range.start]);
        out.push_str(&edit.text);
        cursor = edit.range.end;
    }
    out.push_str(&text[cursor..]);

    for rule in d.rules().iter().filter(|r| r.is_new()) {
        if !out.is_empty() {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
        }
        out.push_str(&render_rule(rule, package));
    }
    out
}

fn rule_edits(
    text: &str,
    package: &str,
    rule: &Rule,
    origin: &super::Origin,
    edits: &mut Vec<Edit>,
) {
    let mut inserted = Vec::new();

    if rule.srcs_changed() {
        if let ListAttr::Literal(list) = rule.srcs_attr() {
            match &origin.srcs_value {
                Some(range) => edits.push(Edit {
                    range: range.clone(),
                    text: format_list(list, &line_indent(text, range.start), |s| quote_str(s)),
                }),
                None => inserted.push(("srcs", list_inline(list, |s| quote_str(s)))),
            }
        }
    }
    if rule.deps_changed() {
        if let ListAttr::Literal(list) = rule.deps_attr() {
            let render = |l: &TargetLabel| quote_str(&l.render_in(package));
            match &origin.deps_value {
                Some(range) => edits.push(Edit {
                    range: range.clone(),
                    text: format_list(list, &line_indent(text, range.start), render),
                }),
                None => inserted.push(("deps", list_inline(list, render))),
            }
        }
    }
    if inserted.is_empty() {
        return;
    }

    if !origin.trailing_comma && origin.last_arg_end != origin.insert_at {
        edits.push(Edit {
            range: origin.last_arg_end..origin.last_arg_end,
            text: ",".to_string(),
        });
    }
    let mut insert = String::new();
    if origin.multiline {
        if !origin.trailing_comma && origin.last_arg_end == origin.insert_at {
            insert.push(',');
        }
        for (key, value) in inserted {
            insert.push_str(&format!("\n{}{key} = {value},", origin.indent));
        }
    } else {
        for (i, (key, value)) in inserted.into_iter().enumerate() {
            if i > 0 || !origin.trailing_comma {
                insert.push(',');
            }
            insert.push_str(&format!(" {key} = {value}"));
        }
        if origin.trailing_comma {
            insert.push(',');
        }
    }
    edits.push(Edit {
        range: origin.insert_at..origin.insert_at,
        text: insert,
    });
}

/// Leading whitespace of the line containing `offset`.
fn line_indent(text: &str, offset: usize) -> String {
    let line_start = text[..offset].rfind('\n').map_or(0, |p| p + 1);
    text[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}

fn quote_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn list_inline<T>(list: &ListValue<T>, render: impl Fn(&T) -> String) -> String {
    let items: Vec<String> = list.items.iter().map(|i| render(&i.value)).collect();
    format!("[{}]", items.join(", "))
}

/// Format a list value whose first line starts at `indent`. Empty and
/// single-element lists without comments stay on one line.
fn format_list<T>(list: &ListValue<T>, indent: &str, render: impl Fn(&T) -> String) -> String {
    let has_comments = !list.footer.is_empty()
        || list
            .items
            .iter()
            .any(|i| i.trailing.is_some() || !i.leading.is_empty());
    if !has_comments && list.items.len() <= 1 {
        return list_inline(list, render);
    }

    let inner = format!("{indent}    ");
    let mut out = String::from("[\n");
    for item in &list.items {
        for comment in &item.leading {
            out.push_str(&format!("{inner}{comment}\n"));
        }
        out.push_str(&format!("{inner}{},", render(&item.value)));
        if let Some(comment) = &item.trailing {
            out.push_str(&format!("  {comment}"));
        }
        out.push('\n');
    }
    for comment in &list.footer {
        out.push_str(&format!("{inner}{comment}\n"));
    }
    out.push_str(indent);
    out.push(']');
    out
}

fn render_load_line(bzl: &str, symbols: &[String]) -> String {
    let mut args = vec![quote_str(bzl)];
    args.extend(symbols.iter().map(|s| quote_str(s)));
    format!("load({})", args.join(", "))
}

fn render_load(load: &Load) -> String {
    let mut positional: Vec<(String, String)> = load.positional.clone();
    for symbol in &load.added {
        positional.push((symbol.clone(), quote_str(symbol)));
    }
    positional.sort_by(|a, b| a.0.cmp(&b.0));
    positional.dedup_by(|a, b| a.0 == b.0);

    let mut args = vec![quote_str(&load.bzl)];
    args.extend(positional.into_iter().map(|(_, raw)| raw));
    args.extend(load.keyword.iter().map(|(_, raw)| raw.clone()));
    format!("load({})", args.join(", "))
}

/// New `load()` lines, one per `.bzl` file, each ending in a newline.
fn pending_load_text(pending: &[(String, String)]) -> Option<String> {
    if pending.is_empty() {
        return None;
    }
    let mut by_bzl: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (bzl, symbol) in pending {
        by_bzl.entry(bzl).or_default().push(symbol.clone());
    }
    let mut out = String::new();
    for (bzl, mut symbols) in by_bzl {
        symbols.sort();
        symbols.dedup();
        out.push_str(&render_load_line(bzl, &symbols));
        out.push('\n');
    }
    Some(out)
}

/// After the last existing `load()` line, or after the leading comment
/// block when there is none.
fn load_insertion_point(text: &str, loads: &[Load]) -> usize {
    if let Some(last) = loads.iter().map(|l| l.span.end).max() {
        return text[last..].find('\n').map_or(text.len(), |p| last + p + 1);
    }
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if !line.starts_with('#') {
            break;
        }
        offset += line.len();
    }
    offset
}

fn render_rule(rule: &Rule, package: &str) -> String {
    let mut out = format!("{}(\n", rule.kind().function_name());
    out.push_str(&format!("    name = {},\n", quote_str(rule.name())));
    if rule.kind() != RuleKind::DevSources {
        if let ListAttr::Literal(list) = rule.srcs_attr() {
            out.push_str(&format!("    srcs = {},\n", format_list(list, "    ", |s| quote_str(s))));
        }
    }
    if matches!(rule.kind(), RuleKind::Library { testonly: true }) {
        out.push_str("    testonly = True,\n");
    }
    if let ListAttr::Literal(list) = rule.deps_attr() {
        if !list.items.is_empty() {
            let render = |l: &TargetLabel| quote_str(&l.render_in(package));
            out.push_str(&format!("    deps = {},\n", format_list(list, "    ", render)));
        }
    }
    out.push_str(")\n");
    out
}
