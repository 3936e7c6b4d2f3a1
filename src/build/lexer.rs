//! Tokenizer for the Starlark subset found in BUILD files.
//!
//! Tokens carry byte offsets into the original text so the descriptor can
//! splice edits back without re-rendering anything it did not change.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Str,
    Number,
    Comment,
    Newline,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Equals,
    /// Any other operator or punctuation character.
    Op,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }
}

/// Lexing failure: byte offset and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub offset: usize,
    pub message: String,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;
        let kind = match b {
            b' ' | b'\t' | b'\r' | b'\x0c' => {
                i += 1;
                continue;
            }
            // Explicit line continuation.
            b'\\' if bytes.get(i + 1) == Some(&b'\n') => {
                i += 2;
                continue;
            }
            b'\n' => {
                i += 1;
                TokenKind::Newline
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                TokenKind::Comment
            }
            b'"' | b'\'' => {
                i = scan_string(bytes, i)?;
                TokenKind::Str
            }
            b'(' => {
                i += 1;
                TokenKind::LParen
            }
            b')' => {
                i += 1;
                TokenKind::RParen
            }
            b'[' => {
                i += 1;
                TokenKind::LBracket
            }
            b']' => {
                i += 1;
                TokenKind::RBracket
            }
            b'{' => {
                i += 1;
                TokenKind::LBrace
            }
            b'}' => {
                i += 1;
                TokenKind::RBrace
            }
            b',' => {
                i += 1;
                TokenKind::Comma
            }
            b'=' if bytes.get(i + 1) != Some(&b'=') => {
                i += 1;
                TokenKind::Equals
            }
            b'=' | b'!' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'%' | b'|' | b'&' | b'^'
                if bytes.get(i + 1) == Some(&b'=') =>
            {
                i += 2;
                TokenKind::Op
            }
            b'0'..=b'9' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
                TokenKind::Number
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                // String prefixes: r"..", b"..", rb"..", br"..".
                let word = &src[start..i];
                let is_prefix = matches!(word, "r" | "b" | "rb" | "br" | "R" | "B" | "Rb" | "bR");
                if is_prefix && matches!(bytes.get(i), Some(b'"' | b'\'')) {
                    i = scan_string(bytes, i)?;
                    TokenKind::Str
                } else {
                    TokenKind::Ident
                }
            }
            _ => {
                // Advance by a whole UTF-8 character.
                let ch_len = src[i..].chars().next().map_or(1, char::len_utf8);
                i += ch_len;
                TokenKind::Op
            }
        };
        tokens.push(Token {
            kind,
            start,
            end: i,
        });
    }
    Ok(tokens)
}

/// Scan a string literal starting at the opening quote; returns the offset
/// just past the closing quote.
fn scan_string(bytes: &[u8], open: usize) -> Result<usize, LexError> {
    let quote = bytes[open];
    let triple = bytes.get(open + 1) == Some(&quote) && bytes.get(open + 2) == Some(&quote);
    let mut i = if triple { open + 3 } else { open + 1 };

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' {
            // Raw strings still cannot end on an escaped quote.
            i += 2;
            continue;
        }
        if triple {
            if b == quote && bytes.get(i + 1) == Some(&quote) && bytes.get(i + 2) == Some(&quote) {
                return Ok(i + 3);
            }
        } else if b == quote {
            return Ok(i + 1);
        } else if b == b'\n' {
            break;
        }
        i += 1;
    }
    Err(LexError {
        offset: open,
        message: "unterminated string literal".to_string(),
    })
}

/// Decode a string token's value, handling prefixes, triple quotes and the
/// common escapes.
pub(crate) fn string_value(token_text: &str) -> String {
    let prefix_len = token_text
        .find(['"', '\''])
        .unwrap_or(0);
    let raw = token_text[..prefix_len].contains(['r', 'R']);
    let body = &token_text[prefix_len..];
    let quote_len = if body.len() >= 6 && (body.starts_with("\"\"\"") || body.starts_with("'''")) {
        3
    } else {
        1
    };
    let inner = &body[quote_len.min(body.len())..body.len().saturating_sub(quote_len)];
    if raw {
        return inner.to_string();
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// 1-based line number of a byte offset.
pub(crate) fn line_of(src: &str, offset: usize) -> usize {
    src.as_bytes()[..offset.min(src.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_call() {
        use TokenKind::*;
        assert_eq!(
            kinds(r#"ts_library(name = "x")"#),
            vec![Ident, LParen, Ident, Equals, Str, RParen]
        );
    }

    #[test]
    fn comments_and_newlines_are_tokens() {
        use TokenKind::*;
        assert_eq!(kinds("# hi\nx\n"), vec![Comment, Newline, Ident, Newline]);
    }

    #[test]
    fn hash_inside_string_is_not_comment() {
        let src = r#"x = "a # b""#;
        let toks = tokenize(src).unwrap();
        assert_eq!(toks.last().unwrap().kind, TokenKind::Str);
        assert_eq!(string_value(toks.last().unwrap().text(src)), "a # b");
    }

    #[test]
    fn triple_quoted_and_raw_strings() {
        let src = "x = \"\"\"multi\nline\"\"\"\ny = r\"a\\b\"";
        let toks = tokenize(src).unwrap();
        let strs: Vec<String> = toks
            .iter()
            .filter(|t| t.kind == TokenKind::Str)
            .map(|t| string_value(t.text(src)))
            .collect();
        assert_eq!(strs, vec!["multi\nline".to_string(), "a\\b".to_string()]);
    }

    #[test]
    fn escapes_are_decoded() {
        assert_eq!(string_value(r#""a\"b""#), "a\"b");
        assert_eq!(string_value(r#"'it\'s'"#), "it's");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("x = \"abc\ny = 1").unwrap_err();
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn double_equals_is_an_operator() {
        use TokenKind::*;
        assert_eq!(kinds("a == b"), vec![Ident, Op, Ident]);
    }

    #[test]
    fn line_numbers() {
        let src = "a\nb\nc";
        assert_eq!(line_of(src, 0), 1);
        assert_eq!(line_of(src, 2), 2);
        assert_eq!(line_of(src, 4), 3);
    }
}
