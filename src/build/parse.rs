//! Top-level statement scanner for BUILD files.
//!
//! Only calls to managed rule functions and `load()` are interpreted. Every
//! other statement is skipped over with bracket matching, which is enough to
//! keep statement boundaries straight without a full Starlark grammar.

use std::collections::HashSet;
use std::ops::Range;

use super::lexer::{self, Token, TokenKind};
use super::{ListAttr, ListItem, ListValue, Load, Origin, Rule, RuleKind};
use crate::label::TargetLabel;

pub(super) struct Parsed {
    pub rules: Vec<Rule>,
    pub loads: Vec<Load>,
    pub called: HashSet<String>,
}

type ParseResult<T> = Result<T, (usize, String)>;

pub(super) fn parse(text: &str, package: &str) -> ParseResult<Parsed> {
    let tokens = lexer::tokenize(text).map_err(|e| (e.offset, e.message))?;
    let mut parsed = Parsed {
        rules: Vec::new(),
        loads: Vec::new(),
        called: HashSet::new(),
    };

    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i];
        if matches!(tok.kind, TokenKind::Newline | TokenKind::Comment) {
            i += 1;
            continue;
        }

        let is_call = tok.kind == TokenKind::Ident
            && tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::LParen);
        if !is_call {
            i = skip_statement(&tokens, i)?;
            continue;
        }

        let close = matching_close(&tokens, i + 1)?;
        let callee = tok.text(text);
        parsed.called.insert(callee.to_string());

        if callee == "load" {
            parsed.loads.push(parse_load(text, &tokens, i, close)?);
        } else if let Some(kind) = RuleKind::from_function(callee) {
            parsed.rules.push(parse_rule(text, package, &tokens, kind, i, close)?);
        }
        i = skip_statement(&tokens, close + 1)?;
    }

    Ok(parsed)
}

/// Index of the bracket closing the one at `open`.
fn matching_close(tokens: &[Token], open: usize) -> ParseResult<usize> {
    let mut stack: Vec<TokenKind> = Vec::new();
    for (idx, tok) in tokens.iter().enumerate().skip(open) {
        match tok.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => stack.push(tok.kind),
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                let expected = match tok.kind {
                    TokenKind::RParen => TokenKind::LParen,
                    TokenKind::RBracket => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                };
                if stack.pop() != Some(expected) {
                    return Err((tok.start, "mismatched closing bracket".to_string()));
                }
                if stack.is_empty() {
                    return Ok(idx);
                }
            }
            _ => {}
        }
    }
    Err((tokens[open].start, "unclosed bracket".to_string()))
}

/// Advance from `i` to just past the end of the current statement.
fn skip_statement(tokens: &[Token], mut i: usize) -> ParseResult<usize> {
    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::Newline => return Ok(i + 1),
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                i = matching_close(tokens, i)? + 1;
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                return Err((tokens[i].start, "unexpected closing bracket".to_string()));
            }
            _ => i += 1,
        }
    }
    Ok(i)
}

/// One call argument: token index range (exclusive of the separating comma).
struct Arg {
    key: Option<String>,
    key_start: usize,
    /// Token range of the value, comments and newlines included.
    value: Range<usize>,
}

fn is_trivia(tok: &Token) -> bool {
    matches!(tok.kind, TokenKind::Newline | TokenKind::Comment)
}

/// Split the tokens between `open` and `close` on top-level commas.
fn split_args(text: &str, tokens: &[Token], open: usize, close: usize) -> ParseResult<Vec<Arg>> {
    let mut args = Vec::new();
    let mut start = open + 1;
    let mut i = open + 1;
    while i <= close {
        let at_end = i == close;
        if at_end || tokens[i].kind == TokenKind::Comma {
            if let Some(arg) = make_arg(text, tokens, start, i) {
                args.push(arg);
            }
            start = i + 1;
            i += 1;
            continue;
        }
        if matches!(tokens[i].kind, TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace) {
            i = matching_close(tokens, i)? + 1;
        } else {
            i += 1;
        }
    }
    Ok(args)
}

fn make_arg(text: &str, tokens: &[Token], start: usize, end: usize) -> Option<Arg> {
    let first = (start..end).find(|&k| !is_trivia(&tokens[k]))?;
    let keyword = tokens[first].kind == TokenKind::Ident
        && tokens.get(first + 1).is_some_and(|t| t.kind == TokenKind::Equals);
    if keyword {
        Some(Arg {
            key: Some(tokens[first].text(text).to_string()),
            key_start: tokens[first].start,
            value: first + 2..end,
        })
    } else {
        Some(Arg {
            key: None,
            key_start: tokens[first].start,
            value: first..end,
        })
    }
}

/// Significant (non-trivia) token indices in a range.
fn significant(tokens: &[Token], range: Range<usize>) -> Vec<usize> {
    range.filter(|&k| !is_trivia(&tokens[k])).collect()
}

fn value_span(tokens: &[Token], range: Range<usize>) -> Option<Range<usize>> {
    let sig = significant(tokens, range);
    Some(tokens[*sig.first()?].start..tokens[*sig.last()?].end)
}

fn single_string(text: &str, tokens: &[Token], range: Range<usize>) -> Option<String> {
    match significant(tokens, range).as_slice() {
        [only] if tokens[*only].kind == TokenKind::Str => {
            Some(lexer::string_value(tokens[*only].text(text)))
        }
        _ => None,
    }
}

/// Interpret a value as a list of string literals with attached comments.
/// `None` when it is anything else.
fn string_list(text: &str, tokens: &[Token], range: Range<usize>) -> Option<ListValue<(String, usize)>> {
    let sig = significant(tokens, range);
    let (&open, &close) = (sig.first()?, sig.last()?);
    if tokens[open].kind != TokenKind::LBracket || tokens[close].kind != TokenKind::RBracket {
        return None;
    }
    if matching_close(tokens, open).ok()? != close {
        return None;
    }

    let mut list = ListValue::default();
    let mut pending: Vec<String> = Vec::new();
    let mut newline_since_item = true;
    for k in open + 1..close {
        let tok = tokens[k];
        match tok.kind {
            TokenKind::Str => {
                list.items.push(ListItem {
                    value: (lexer::string_value(tok.text(text)), tok.start),
                    trailing: None,
                    leading: std::mem::take(&mut pending),
                });
                newline_since_item = false;
            }
            TokenKind::Comma => {}
            TokenKind::Newline => newline_since_item = true,
            TokenKind::Comment => {
                let comment = tok.text(text).trim_end().to_string();
                match list.items.last_mut() {
                    Some(item) if !newline_since_item && item.trailing.is_none() => {
                        item.trailing = Some(comment);
                    }
                    _ => pending.push(comment),
                }
            }
            _ => return None,
        }
    }
    list.footer = pending;
    Some(list)
}

fn line_indent(text: &str, offset: usize) -> Option<String> {
    let line_start = text[..offset].rfind('\n').map_or(0, |p| p + 1);
    let prefix = &text[line_start..offset];
    prefix
        .chars()
        .all(|c| c == ' ' || c == '\t')
        .then(|| prefix.to_string())
}

fn parse_rule(
    text: &str,
    package: &str,
    tokens: &[Token],
    mut kind: RuleKind,
    callee: usize,
    close: usize,
) -> ParseResult<Rule> {
    let open = callee + 1;
    let args = split_args(text, tokens, open, close)?;

    let mut name = None;
    let mut srcs = ListAttr::Absent;
    let mut deps = ListAttr::Absent;
    let mut srcs_value = None;
    let mut deps_value = None;
    let mut module_name = None;
    let mut indent = None;

    for arg in &args {
        let Some(key) = arg.key.as_deref() else {
            continue;
        };
        if indent.is_none() {
            indent = line_indent(text, arg.key_start).filter(|s| !s.is_empty());
        }
        match key {
            "name" => {
                name = Some(single_string(text, tokens, arg.value.clone()).ok_or_else(|| {
                    (arg.key_start, "rule name must be a string literal".to_string())
                })?);
            }
            "module_name" => module_name = single_string(text, tokens, arg.value.clone()),
            "testonly" => {
                if let RuleKind::Library { testonly } = &mut kind {
                    let sig = significant(tokens, arg.value.clone());
                    *testonly = matches!(sig.as_slice(), [only] if matches!(tokens[*only].text(text), "True" | "1"));
                }
            }
            "srcs" => {
                srcs_value = value_span(tokens, arg.value.clone());
                srcs = match string_list(text, tokens, arg.value.clone()) {
                    Some(list) => ListAttr::Literal(strip_offsets(list)),
                    None => ListAttr::Opaque,
                };
            }
            "deps" => {
                deps_value = value_span(tokens, arg.value.clone());
                deps = match string_list(text, tokens, arg.value.clone()) {
                    Some(list) => ListAttr::Literal(labels(list, package)?),
                    None => ListAttr::Opaque,
                };
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| {
        (
            tokens[callee].start,
            format!("{}() without a name", kind.function_name()),
        )
    })?;

    // New attributes go after the last argument's comma and any comment
    // sharing its line.
    let last_sig = (open + 1..close).rev().find(|&k| !is_trivia(&tokens[k]));
    let trailing_comma = last_sig.is_some_and(|k| tokens[k].kind == TokenKind::Comma);
    let last_arg_end = last_sig.map_or(tokens[open].end, |k| tokens[k].end);
    let mut insert_at = last_arg_end;
    if let Some(k) = last_sig {
        if tokens[k + 1].kind == TokenKind::Comment {
            insert_at = tokens[k + 1].end;
        }
    }
    let multiline = tokens[open + 1..close]
        .iter()
        .any(|t| t.kind == TokenKind::Newline);

    Ok(Rule::parsed(
        kind,
        name,
        srcs,
        deps,
        module_name,
        Origin {
            span: tokens[callee].start..tokens[close].end,
            insert_at,
            last_arg_end,
            trailing_comma,
            multiline,
            indent: indent.unwrap_or_else(|| "    ".to_string()),
            srcs_value,
            deps_value,
        },
    ))
}

fn strip_offsets(list: ListValue<(String, usize)>) -> ListValue<String> {
    ListValue {
        items: list
            .items
            .into_iter()
            .map(|i| ListItem {
                value: i.value.0,
                trailing: i.trailing,
                leading: i.leading,
            })
            .collect(),
        footer: list.footer,
    }
}

fn labels(list: ListValue<(String, usize)>, package: &str) -> ParseResult<ListValue<TargetLabel>> {
    let mut items = Vec::with_capacity(list.items.len());
    for item in list.items {
        let (raw, offset) = item.value;
        let label = TargetLabel::parse(&raw, package)
            .map_err(|_| (offset, format!("invalid label '{raw}' in deps")))?;
        items.push(ListItem {
            value: label,
            trailing: item.trailing,
            leading: item.leading,
        });
    }
    Ok(ListValue {
        items,
        footer: list.footer,
    })
}

fn parse_load(text: &str, tokens: &[Token], callee: usize, close: usize) -> ParseResult<Load> {
    let args = split_args(text, tokens, callee + 1, close)?;
    let mut iter = args.iter();
    let module = iter
        .next()
        .filter(|a| a.key.is_none())
        .and_then(|a| single_string(text, tokens, a.value.clone()))
        .ok_or_else(|| (tokens[callee].start, "load() needs a module string".to_string()))?;

    let mut load = Load {
        span: tokens[callee].start..tokens[close].end,
        bzl: module,
        positional: Vec::new(),
        keyword: Vec::new(),
        added: Vec::new(),
    };
    for arg in iter {
        let Some(span) = value_span(tokens, arg.value.clone()) else {
            continue;
        };
        match &arg.key {
            Some(key) => {
                load.keyword.push((key.clone(), format!("{key} = {}", &text[span])));
            }
            None => {
                let symbol = single_string(text, tokens, arg.value.clone()).ok_or_else(|| {
                    (span.start, "load() symbols must be string literals".to_string())
                })?;
                load.positional.push((symbol, text[span].to_string()));
            }
        }
    }
    Ok(load)
}
