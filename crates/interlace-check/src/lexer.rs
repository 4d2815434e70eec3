//! Tokens of the path-expression language.

use crate::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Star,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Literal(String),
    Number(f64),
    /// An NCName or `prefix:local` QName.
    Name(String),
}

/// A token and the byte offset it starts at.
pub(crate) type Spanned = (usize, Token);

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos];
        let token = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'/' if bytes.get(pos + 1) == Some(&b'/') => {
                pos += 2;
                Token::DoubleSlash
            }
            b'/' => {
                pos += 1;
                Token::Slash
            }
            b'.' if bytes.get(pos + 1) == Some(&b'.') => {
                pos += 2;
                Token::DotDot
            }
            b'.' if bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                let (number, end) = number(source, pos)?;
                pos = end;
                Token::Number(number)
            }
            b'.' => {
                pos += 1;
                Token::Dot
            }
            b'@' => single(&mut pos, Token::At),
            b'*' => single(&mut pos, Token::Star),
            b'[' => single(&mut pos, Token::LBracket),
            b']' => single(&mut pos, Token::RBracket),
            b'(' => single(&mut pos, Token::LParen),
            b')' => single(&mut pos, Token::RParen),
            b',' => single(&mut pos, Token::Comma),
            b'+' => single(&mut pos, Token::Plus),
            b'-' => single(&mut pos, Token::Minus),
            b'=' => single(&mut pos, Token::Eq),
            b'!' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                Token::NotEq
            }
            b'<' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                Token::Le
            }
            b'<' => single(&mut pos, Token::Lt),
            b'>' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                Token::Ge
            }
            b'>' => single(&mut pos, Token::Gt),
            b'"' | b'\'' => {
                let close = source[pos + 1..].find(char::from(c)).ok_or_else(|| {
                    ExprError::syntax(source, pos, "unterminated string literal")
                })?;
                let text = source[pos + 1..pos + 1 + close].to_string();
                pos += close + 2;
                Token::Literal(text)
            }
            b'0'..=b'9' => {
                let (number, end) = number(source, pos)?;
                pos = end;
                Token::Number(number)
            }
            c if is_name_start(c) => {
                pos = name_end(bytes, pos);
                // `prefix:local`, but not `axis::`.
                if bytes.get(pos) == Some(&b':')
                    && bytes.get(pos + 1).copied().is_some_and(is_name_start)
                {
                    pos = name_end(bytes, pos + 1);
                }
                Token::Name(source[start..pos].to_string())
            }
            _ => {
                let found = source[pos..].chars().next().unwrap_or('?');
                return Err(ExprError::syntax(
                    source,
                    pos,
                    &format!("unexpected character {found:?}"),
                ));
            }
        };
        tokens.push((start, token));
    }
    Ok(tokens)
}

fn single(pos: &mut usize, token: Token) -> Token {
    *pos += 1;
    token
}

fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn name_end(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len()
        && (bytes[pos].is_ascii_alphanumeric() || matches!(bytes[pos], b'_' | b'-' | b'.'))
    {
        pos += 1;
    }
    pos
}

fn number(source: &str, start: usize) -> Result<(f64, usize), ExprError> {
    let bytes = source.as_bytes();
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    let value = source[start..end]
        .parse()
        .map_err(|_| ExprError::syntax(source, start, "malformed number"))?;
    Ok((value, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|(_, t)| t).collect()
    }

    #[test]
    fn tokenizes_hello_world_path() {
        assert_eq!(
            kinds("/tns:helloWorld/word[2]/text()"),
            vec![
                Token::Slash,
                Token::Name("tns:helloWorld".into()),
                Token::Slash,
                Token::Name("word".into()),
                Token::LBracket,
                Token::Number(2.0),
                Token::RBracket,
                Token::Slash,
                Token::Name("text".into()),
                Token::LParen,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn tokenizes_operators_and_literals() {
        assert_eq!(
            kinds("count(//w) <= 2 and @lang != 'en' or .5"),
            vec![
                Token::Name("count".into()),
                Token::LParen,
                Token::DoubleSlash,
                Token::Name("w".into()),
                Token::RParen,
                Token::Le,
                Token::Number(2.0),
                Token::Name("and".into()),
                Token::At,
                Token::Name("lang".into()),
                Token::NotEq,
                Token::Literal("en".into()),
                Token::Name("or".into()),
                Token::Number(0.5),
            ]
        );
    }

    #[test]
    fn names_may_contain_hyphens() {
        assert_eq!(
            kinds("string-length(..)"),
            vec![
                Token::Name("string-length".into()),
                Token::LParen,
                Token::DotDot,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn reports_unterminated_literal() {
        let err = tokenize("word = 'oops").unwrap_err();
        assert!(err.to_string().contains("unterminated string literal"));
    }
}
