//! `// from //pkg:name` annotations on import statements.

use crate::lang::ImportKind;
use crate::resolver::ResolvedImport;

const MARKER: &str = "// from ";

fn annotation(label: &str) -> String {
    format!("{MARKER}{label}")
}

/// Bring the annotations in `text` in line with the resolved imports.
///
/// Returns the new text, or `None` when nothing needs to change. Only
/// statements resolved to exactly one rule are annotated, and only when the
/// rest of their last line is empty or already an annotation.
pub fn sync(text: &str, imports: &[ResolvedImport]) -> Option<String> {
    let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();

    for resolved in imports {
        let [label] = resolved.candidates.as_slice() else {
            continue;
        };
        if resolved.import.kind == ImportKind::Reference {
            continue;
        }
        let end = resolved.import.span.end;
        if end > text.len() || !text.is_char_boundary(end) {
            continue;
        }
        let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);
        let tail = text[end..line_end].trim_end_matches('\r');
        let wanted = annotation(&label.to_string());

        let trimmed = tail.trim_start();
        if trimmed.is_empty() {
            edits.push((end..end + tail.len(), format!(" {wanted}")));
        } else if trimmed.starts_with(MARKER) {
            if trimmed.trim_end() != wanted {
                let start = end + (tail.len() - trimmed.len());
                edits.push((start..end + tail.len(), wanted));
            }
        }
    }

    if edits.is_empty() {
        return None;
    }
    edits.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));
    edits.dedup_by_key(|(range, _)| range.start);
    let mut out = text.to_string();
    for (range, replacement) in edits {
        out.replace_range(range, &replacement);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::TargetLabel;
    use crate::lang::typescript::parser::parse_source;
    use std::path::Path;

    fn resolved(text: &str, candidates: &[&[TargetLabel]]) -> Vec<ResolvedImport> {
        parse_source(Path::new("a.ts"), text)
            .unwrap()
            .into_iter()
            .zip(candidates)
            .map(|(import, c)| ResolvedImport {
                import,
                candidates: c.to_vec(),
            })
            .collect()
    }

    #[test]
    fn inserts_then_settles() {
        let bar = [TargetLabel::new("pkg", "bar")];
        let text = "import {b} from './bar';\nconsole.log(b);\n";
        let updated = sync(text, &resolved(text, &[&bar])).unwrap();
        assert_eq!(updated, "import {b} from './bar'; // from //pkg:bar\nconsole.log(b);\n");
        assert_eq!(sync(&updated, &resolved(&updated, &[&bar])), None);
    }

    #[test]
    fn rewrites_stale_annotation() {
        let text = "import './x';  // from //old:x\n";
        let updated = sync(text, &resolved(text, &[&[TargetLabel::new("new", "x")]])).unwrap();
        assert_eq!(updated, "import './x';  // from //new:x\n");
    }

    #[test]
    fn leaves_unrelated_comments_and_ambiguity_alone() {
        let a = TargetLabel::new("a", "a");
        let b = TargetLabel::new("b", "b");
        let text = "import 'x'; // side effects\nimport 'y';\nimport 'z';\n";
        let imports = resolved(text, &[&[a.clone()], &[a, b], &[]]);
        assert_eq!(sync(text, &imports), None);
    }

    #[test]
    fn annotates_last_line_of_multiline_import() {
        let text = "import {\n  a,\n} from './a';\n";
        let updated = sync(text, &resolved(text, &[&[TargetLabel::new("pkg", "a")]])).unwrap();
        assert_eq!(updated, "import {\n  a,\n} from './a'; // from //pkg:a\n");
    }
}
