use std::path::Path;

use swc_common::{FileName, SourceMap, Span};
use swc_ecma_ast::{
    EsVersion, ExportSpecifier, ImportSpecifier as SwcImportSpecifier, Module, ModuleDecl,
    ModuleItem, Str, TsModuleRef,
};
use swc_ecma_parser::{Syntax, TsSyntax, parse_file_as_module};

use crate::lang::{ImportKind, ImportSpecifier, ParseError};

fn syntax_for_path(path: &Path) -> Syntax {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    Syntax::Typescript(TsSyntax {
        tsx: name.ends_with(".tsx"),
        decorators: true,
        dts: name.ends_with(".d.ts"),
        ..Default::default()
    })
}

/// Scan one TypeScript source for the modules it references, in file order.
pub fn parse_source(path: &Path, source: &str) -> Result<Vec<ImportSpecifier>, ParseError> {
    let cm = SourceMap::default();
    let fm = cm.new_source_file(
        FileName::Custom(path.display().to_string()).into(),
        source.to_string(),
    );

    let mut errors = vec![];
    let module = parse_file_as_module(&fm, syntax_for_path(path), EsVersion::EsNext, None, &mut errors)
        .map_err(|e| ParseError::new(format!("{}: {:?}", path.display(), e.kind())))?;

    let lines = LineIndex::new(source);
    let mut imports = references(source, &lines);
    imports.extend(extract_imports(&module, source, fm.start_pos.0, &lines));
    Ok(imports)
}

/// Byte offsets of line starts, for offset to line lookups.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// 1-based line containing `offset`.
    fn line(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset)
    }
}

struct Extractor<'a> {
    source: &'a str,
    base: u32,
    lines: &'a LineIndex,
    out: Vec<ImportSpecifier>,
}

impl Extractor<'_> {
    fn range(&self, span: Span) -> std::ops::Range<usize> {
        let lo = span.lo.0.saturating_sub(self.base) as usize;
        let hi = span.hi.0.saturating_sub(self.base) as usize;
        lo.min(self.source.len())..hi.min(self.source.len())
    }

    fn push(&mut self, stmt: Span, src: &Str, kind: ImportKind) {
        let span = self.range(stmt);
        let literal = &self.source[self.range(src.span)];
        // Drop the surrounding quotes; module names never need escapes.
        let specifier = literal
            .get(1..literal.len().saturating_sub(1))
            .unwrap_or_default()
            .to_string();
        self.out.push(ImportSpecifier {
            specifier,
            kind,
            line: self.lines.line(span.start),
            end_line: self.lines.line(span.end.saturating_sub(1).max(span.start)),
            span,
        });
    }

    fn visit(&mut self, decl: &ModuleDecl) {
        match decl {
            ModuleDecl::Import(import) => {
                let all_type = !import.specifiers.is_empty()
                    && import
                        .specifiers
                        .iter()
                        .all(|s| matches!(s, SwcImportSpecifier::Named(n) if n.is_type_only));
                let kind = if import.type_only || all_type {
                    ImportKind::TypeOnly
                } else if import.specifiers.is_empty() {
                    ImportKind::SideEffect
                } else {
                    ImportKind::Value
                };
                self.push(import.span, &import.src, kind);
            }
            ModuleDecl::ExportAll(export) => {
                let kind = if export.type_only {
                    ImportKind::TypeOnly
                } else {
                    ImportKind::Reexport
                };
                self.push(export.span, &export.src, kind);
            }
            ModuleDecl::ExportNamed(named) => {
                let Some(src) = &named.src else {
                    return;
                };
                let all_type = !named.specifiers.is_empty()
                    && named
                        .specifiers
                        .iter()
                        .all(|s| matches!(s, ExportSpecifier::Named(n) if n.is_type_only));
                let kind = if named.type_only || all_type {
                    ImportKind::TypeOnly
                } else {
                    ImportKind::Reexport
                };
                self.push(named.span, src, kind);
            }
            ModuleDecl::TsImportEquals(equals) => {
                if let TsModuleRef::TsExternalModuleRef(ext) = &equals.module_ref {
                    let kind = if equals.is_type_only {
                        ImportKind::TypeOnly
                    } else {
                        ImportKind::Value
                    };
                    self.push(equals.span, &ext.expr, kind);
                }
            }
            _ => {}
        }
    }
}

fn extract_imports(module: &Module, source: &str, base: u32, lines: &LineIndex) -> Vec<ImportSpecifier> {
    let mut extractor = Extractor {
        source,
        base,
        lines,
        out: Vec::new(),
    };
    for item in &module.body {
        if let ModuleItem::ModuleDecl(decl) = item {
            extractor.visit(decl);
        }
    }
    extractor.out
}

/// Triple-slash reference directives. They only count in the file header,
/// before the first statement.
fn references(source: &str, lines: &LineIndex) -> Vec<ImportSpecifier> {
    let mut out = Vec::new();
    let mut offset = 0;
    let mut in_block = false;
    for line in source.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // Block comments (license headers) may precede the directives.
        let block = if in_block {
            Some(trimmed)
        } else {
            trimmed.strip_prefix("/*")
        };
        if let Some(body) = block {
            match body.find("*/") {
                Some(end) => {
                    in_block = false;
                    if !body[end + 2..].trim().is_empty() {
                        break;
                    }
                }
                None => in_block = true,
            }
            continue;
        }
        if !trimmed.starts_with("//") {
            break;
        }
        let Some(directive) = trimmed.strip_prefix("///") else {
            continue;
        };
        let directive = directive.trim_start();
        if !directive.starts_with("<reference") {
            continue;
        }
        let specifier = if let Some(path) = attribute(directive, "path") {
            if path.starts_with('.') || path.starts_with('/') {
                path.to_string()
            } else {
                format!("./{path}")
            }
        } else if let Some(types) = attribute(directive, "types") {
            types.to_string()
        } else {
            continue;
        };
        let end = start + line.trim_end().len();
        out.push(ImportSpecifier {
            specifier,
            kind: ImportKind::Reference,
            line: lines.line(start),
            end_line: lines.line(start),
            span: start + (line.len() - line.trim_start().len())..end,
        });
    }
    out
}

/// Value of `name="..."` (or single-quoted) inside a directive.
fn attribute<'a>(directive: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = directive;
    while let Some(pos) = rest.find(name) {
        let preceded_by_space = rest[..pos].ends_with(char::is_whitespace);
        let after = rest[pos + name.len()..].trim_start();
        rest = &rest[pos + name.len()..];
        if !preceded_by_space {
            continue;
        }
        let Some(value) = after.strip_prefix('=') else {
            continue;
        };
        let value = value.trim_start();
        let quote = value.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let body = &value[1..];
        return body.find(quote).map(|end| &body[..end]);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ts(source: &str) -> Vec<ImportSpecifier> {
        parse_source(Path::new("test.ts"), source).expect("test source should parse")
    }

    fn specs(source: &str) -> Vec<(String, ImportKind)> {
        parse_ts(source)
            .into_iter()
            .map(|i| (i.specifier, i.kind))
            .collect()
    }

    #[test]
    fn named_and_default_imports() {
        assert_eq!(
            specs("import { foo } from \"bar\";\nimport baz from './baz';\n"),
            vec![
                ("bar".to_string(), ImportKind::Value),
                ("./baz".to_string(), ImportKind::Value),
            ]
        );
    }

    #[test]
    fn side_effect_import() {
        assert_eq!(specs("import \"./polyfill\";"), vec![("./polyfill".to_string(), ImportKind::SideEffect)]);
    }

    #[test]
    fn type_only_imports() {
        assert_eq!(specs("import type { Foo } from \"bar\";")[0].1, ImportKind::TypeOnly);
        assert_eq!(specs("import { type Foo, type Bar } from \"baz\";")[0].1, ImportKind::TypeOnly);
        assert_eq!(specs("import { type Foo, bar } from \"baz\";")[0].1, ImportKind::Value);
    }

    #[test]
    fn reexports() {
        assert_eq!(
            specs("export * from \"a\";\nexport { b } from \"b\";\nexport type { C } from \"c\";\nexport { local };\nconst local = 1;\n"),
            vec![
                ("a".to_string(), ImportKind::Reexport),
                ("b".to_string(), ImportKind::Reexport),
                ("c".to_string(), ImportKind::TypeOnly),
            ]
        );
    }

    #[test]
    fn import_equals_require() {
        assert_eq!(specs("import fs = require(\"fs\");"), vec![("fs".to_string(), ImportKind::Value)]);
    }

    #[test]
    fn strings_and_comments_are_not_imports() {
        let src = "// import \"fake\";\nconst s = \"import x from 'y'\";\n/* export * from 'z' */\n";
        assert!(parse_ts(src).is_empty());
    }

    #[test]
    fn dynamic_imports_are_not_extracted() {
        assert!(parse_ts("async function f() { await import(\"lazy\"); }").is_empty());
    }

    #[test]
    fn spans_cover_multiline_statements() {
        let src = "const a = 1;\nimport {\n  x,\n  y,\n} from \"./xy\";\n";
        let imports = parse_ts(src);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].line, 2);
        assert_eq!(imports[0].end_line, 5);
        assert_eq!(&src[imports[0].span.clone()], "import {\n  x,\n  y,\n} from \"./xy\";");
    }

    #[test]
    fn triple_slash_references_in_header() {
        let src = "// Copyright\n/// <reference path=\"globals.d.ts\" />\n/// <reference types=\"node\" />\nimport \"a\";\n/// <reference path=\"late.d.ts\" />\n";
        assert_eq!(
            specs(src),
            vec![
                ("./globals.d.ts".to_string(), ImportKind::Reference),
                ("node".to_string(), ImportKind::Reference),
                ("a".to_string(), ImportKind::SideEffect),
            ]
        );
        assert_eq!(parse_ts(src)[0].line, 2);
    }

    #[test]
    fn block_comments_before_references() {
        let one_line = "/** @license MIT */\n/// <reference types=\"node\" />\n";
        assert_eq!(specs(one_line), vec![("node".to_string(), ImportKind::Reference)]);

        let multi = "/**\n * @license\n * Copyright Example\n */\n\n/// <reference types=\"node\" />\nimport \"a\";\n";
        let refs = parse_ts(multi);
        assert_eq!(refs[0].specifier, "node");
        assert_eq!(refs[0].line, 6);

        let code_after = "/* x */ const y = 1;\n/// <reference types=\"node\" />\n";
        assert!(specs(code_after).is_empty());
    }

    #[test]
    fn tsx_and_declaration_files_parse() {
        let tsx = parse_source(Path::new("view.tsx"), "import React from \"react\";\nexport const V = () => <div/>;\n").unwrap();
        assert_eq!(tsx[0].specifier, "react");

        let dts = parse_source(Path::new("types.d.ts"), "declare const x: number;\nexport {};\n").unwrap();
        assert!(dts.is_empty());
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(parse_source(Path::new("bad.ts"), "const x = ;").is_err());
    }

    #[test]
    fn line_index_lookup() {
        let idx = LineIndex::new("a\nbb\n\nc");
        assert_eq!(idx.line(0), 1);
        assert_eq!(idx.line(2), 2);
        assert_eq!(idx.line(5), 3);
        assert_eq!(idx.line(6), 4);
    }
}
