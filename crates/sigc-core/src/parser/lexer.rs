//! Tokenizer for signature text.

use std::fmt;

use crate::error::SignatureError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Arrow,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Ident(name) => return write!(f, "identifier `{name}`"),
            TokenKind::Int(value) => return write!(f, "integer `{value}`"),
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Arrow => "'->'",
            TokenKind::Dot => "'.'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::EqEq => "'=='",
            TokenKind::Ne => "'!='",
            TokenKind::AndAnd => "'&&'",
            TokenKind::OrOr => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

/// A token with its byte range in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Splits `input` into tokens. The result always ends with [`TokenKind::Eof`].
///
/// `#` starts a comment that runs to the end of the line.
pub fn tokenize(input: &str) -> Result<Vec<Token>, SignatureError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if c == b'#' {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }

        let start = pos;
        if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(input[start..pos].to_string()),
                start,
                end: pos,
            });
            continue;
        }
        if c.is_ascii_digit() {
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let text = &input[start..pos];
            let value = text.parse::<i64>().map_err(|_| SignatureError::Parse {
                position: start,
                expected: "integer literal within 64-bit range".into(),
                found: format!("`{text}`"),
            })?;
            tokens.push(Token {
                kind: TokenKind::Int(value),
                start,
                end: pos,
            });
            continue;
        }

        let next = bytes.get(pos + 1).copied();
        let (kind, width) = match (c, next) {
            (b'-', Some(b'>')) => (TokenKind::Arrow, 2),
            (b'<', Some(b'=')) => (TokenKind::Le, 2),
            (b'>', Some(b'=')) => (TokenKind::Ge, 2),
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::Ne, 2),
            (b'&', Some(b'&')) => (TokenKind::AndAnd, 2),
            (b'|', Some(b'|')) => (TokenKind::OrOr, 2),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b':', _) => (TokenKind::Colon, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            _ => {
                let found = input[start..].chars().next().unwrap_or('?');
                return Err(SignatureError::Parse {
                    position: start,
                    expected: "token".into(),
                    found: format!("'{found}'"),
                });
            }
        };
        pos += width;
        tokens.push(Token {
            kind,
            start,
            end: pos,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        start: input.len(),
        end: input.len(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_signature_head() {
        assert_eq!(
            kinds("take(n: Nat) -> T"),
            vec![
                TokenKind::Ident("take".into()),
                TokenKind::LParen,
                TokenKind::Ident("n".into()),
                TokenKind::Colon,
                TokenKind::Ident("Nat".into()),
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Ident("T".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_operators_win_over_prefixes() {
        assert_eq!(
            kinds("a<=b != -c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Le,
                TokenKind::Ident("b".into()),
                TokenKind::Ne,
                TokenKind::Minus,
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("# leading\nf # trailing"),
            vec![TokenKind::Ident("f".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn spans_cover_source_bytes() {
        let tokens = tokenize("  xs").unwrap();
        assert_eq!((tokens[0].start, tokens[0].end), (2, 4));
        assert_eq!(tokens[1].start, 4);
    }

    #[test]
    fn unknown_character_is_a_parse_error() {
        let err = tokenize("f(x: @)").unwrap_err();
        assert_eq!(
            err,
            SignatureError::Parse {
                position: 5,
                expected: "token".into(),
                found: "'@'".into(),
            }
        );
    }

    #[test]
    fn oversized_integer_is_rejected() {
        assert!(matches!(
            tokenize("99999999999999999999"),
            Err(SignatureError::Parse { position: 0, .. })
        ));
    }
}
