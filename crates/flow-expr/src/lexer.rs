//! Tokenizer for the expression grammar

use crate::error::{EvalError, Result};

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

/// A token with its byte offset in the source, for error reporting
#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Tokenize an expression string.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'(' => tokens.push(Spanned { token: Token::LParen, offset: start }),
            b')' => tokens.push(Spanned { token: Token::RParen, offset: start }),
            b'[' => tokens.push(Spanned { token: Token::LBracket, offset: start }),
            b']' => tokens.push(Spanned { token: Token::RBracket, offset: start }),
            b',' => tokens.push(Spanned { token: Token::Comma, offset: start }),
            b'.' => tokens.push(Spanned { token: Token::Dot, offset: start }),
            b'+' => tokens.push(Spanned { token: Token::Plus, offset: start }),
            b'-' => tokens.push(Spanned { token: Token::Minus, offset: start }),
            b'*' => tokens.push(Spanned { token: Token::Star, offset: start }),
            b'/' => tokens.push(Spanned { token: Token::Slash, offset: start }),
            b'%' => tokens.push(Spanned { token: Token::Percent, offset: start }),
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::EqEq, offset: start });
                    i += 1;
                } else {
                    return Err(EvalError::parse(start, "'=' is not an operator; use '=='"));
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::NotEq, offset: start });
                    i += 1;
                } else {
                    tokens.push(Spanned { token: Token::Bang, offset: start });
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::Le, offset: start });
                    i += 1;
                } else {
                    tokens.push(Spanned { token: Token::Lt, offset: start });
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::Ge, offset: start });
                    i += 1;
                } else {
                    tokens.push(Spanned { token: Token::Gt, offset: start });
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Spanned { token: Token::AndAnd, offset: start });
                    i += 1;
                } else {
                    return Err(EvalError::parse(start, "single '&'; use '&&'"));
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Spanned { token: Token::OrOr, offset: start });
                    i += 1;
                } else {
                    return Err(EvalError::parse(start, "single '|'; use '||'"));
                }
            }
            b'\'' | b'"' => {
                let (s, consumed) = read_string(&input[i..], c).map_err(|msg| EvalError::parse(start, msg))?;
                tokens.push(Spanned { token: Token::Str(s), offset: start });
                i += consumed;
                continue;
            }
            b'0'..=b'9' => {
                let mut end = i;
                let mut seen_dot = false;
                while end < bytes.len() {
                    match bytes[end] {
                        b'0'..=b'9' => end += 1,
                        // A dot is part of the number only when a digit follows;
                        // otherwise it is a path separator (e.g. `items.0.name`).
                        b'.' if !seen_dot
                            && matches!(bytes.get(end + 1).copied(), Some(b'0'..=b'9')) =>
                        {
                            seen_dot = true;
                            end += 1;
                        }
                        _ => break,
                    }
                }
                let text = &input[i..end];
                let n = text
                    .parse::<f64>()
                    .map_err(|_| EvalError::parse(start, format!("invalid number '{}'", text)))?;
                tokens.push(Spanned { token: Token::Number(n), offset: start });
                i = end;
                continue;
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                let mut end = i;
                while end < bytes.len()
                    && matches!(bytes[end], b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')
                {
                    end += 1;
                }
                let word = &input[i..end];
                let token = match word {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push(Spanned { token, offset: start });
                i = end;
                continue;
            }
            other => {
                return Err(EvalError::parse(
                    start,
                    format!("unexpected character '{}'", other as char),
                ));
            }
        }
        i += 1;
    }

    Ok(tokens)
}

/// Read a quoted string starting at `src[0]`, returning the unescaped
/// contents and the number of bytes consumed including both quotes.
fn read_string(src: &str, quote: u8) -> std::result::Result<(String, usize), String> {
    let bytes = src.as_bytes();
    let mut out = String::new();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let escaped = bytes.get(i + 1).ok_or("unterminated escape")?;
                match escaped {
                    b'n' => out.push('\n'),
                    b't' => out.push('\t'),
                    b'r' => out.push('\r'),
                    b'\\' => out.push('\\'),
                    b'\'' => out.push('\''),
                    b'"' => out.push('"'),
                    other => return Err(format!("unknown escape '\\{}'", *other as char)),
                }
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            _ => {
                // Copy the whole UTF-8 character, not just one byte
                let ch = src[i..].chars().next().ok_or("invalid UTF-8")?;
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    Err("unterminated string".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("a.b + 2"),
            vec![
                Token::Ident("a".into()),
                Token::Dot,
                Token::Ident("b".into()),
                Token::Plus,
                Token::Number(2.0),
            ]
        );
    }

    #[test]
    fn test_number_vs_path_dot() {
        // `items.0.name`: the dots separate path segments
        assert_eq!(
            kinds("items.0.name"),
            vec![
                Token::Ident("items".into()),
                Token::Dot,
                Token::Number(0.0),
                Token::Dot,
                Token::Ident("name".into()),
            ]
        );
        // `1.5` stays a single number
        assert_eq!(kinds("1.5"), vec![Token::Number(1.5)]);
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(kinds("'it\\'s'"), vec![Token::Str("it's".into())]);
        assert_eq!(kinds("\"a\\nb\""), vec![Token::Str("a\nb".into())]);
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds("a >= 1 && b != 2"),
            vec![
                Token::Ident("a".into()),
                Token::Ge,
                Token::Number(1.0),
                Token::AndAnd,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Number(2.0),
            ]
        );
    }

    #[test]
    fn test_rejects_single_ampersand() {
        assert!(tokenize("a & b").is_err());
        assert!(tokenize("a = b").is_err());
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("'abc").is_err());
    }
}
