use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
    Dot,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub tok: Tok,
    pub offset: usize,
}

fn err(offset: usize, message: impl Into<String>) -> ExprError {
    ExprError::Parse {
        offset,
        message: message.into(),
    }
}

pub(crate) fn lex(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let bytes = source.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                out.push(Spanned { tok: Tok::LParen, offset: i });
                i += 1;
            }
            ')' => {
                out.push(Spanned { tok: Tok::RParen, offset: i });
                i += 1;
            }
            ',' => {
                out.push(Spanned { tok: Tok::Comma, offset: i });
                i += 1;
            }
            '.' => {
                out.push(Spanned { tok: Tok::Dot, offset: i });
                i += 1;
            }
            '+' => {
                out.push(Spanned { tok: Tok::Plus, offset: i });
                i += 1;
            }
            '-' => {
                out.push(Spanned { tok: Tok::Minus, offset: i });
                i += 1;
            }
            '*' => {
                out.push(Spanned { tok: Tok::Star, offset: i });
                i += 1;
            }
            '/' => {
                out.push(Spanned { tok: Tok::Slash, offset: i });
                i += 1;
            }
            '%' => {
                out.push(Spanned { tok: Tok::Percent, offset: i });
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Spanned { tok: Tok::Eq, offset: i });
                    i += 2;
                } else {
                    return Err(err(i, "unexpected '='; did you mean '=='?"));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Spanned { tok: Tok::Ne, offset: i });
                    i += 2;
                } else {
                    out.push(Spanned { tok: Tok::Not, offset: i });
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Spanned { tok: Tok::Le, offset: i });
                    i += 2;
                } else {
                    out.push(Spanned { tok: Tok::Lt, offset: i });
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Spanned { tok: Tok::Ge, offset: i });
                    i += 2;
                } else {
                    out.push(Spanned { tok: Tok::Gt, offset: i });
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    out.push(Spanned { tok: Tok::And, offset: i });
                    i += 2;
                } else {
                    return Err(err(i, "unexpected '&'; did you mean '&&'?"));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    out.push(Spanned { tok: Tok::Or, offset: i });
                    i += 2;
                } else {
                    return Err(err(i, "unexpected '|'; did you mean '||'?"));
                }
            }
            '"' | '\'' => {
                let (s, next) = lex_string(source, i)?;
                out.push(Spanned { tok: Tok::Str(s), offset: i });
                i = next;
            }
            c if c.is_ascii_digit() => {
                let (tok, next) = lex_number(source, i)?;
                out.push(Spanned { tok, offset: i });
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                let word = &source[start..i];
                let tok = match word {
                    "true" => Tok::True,
                    "false" => Tok::False,
                    "null" | "nil" => Tok::Null,
                    "and" => Tok::And,
                    "or" => Tok::Or,
                    "not" => Tok::Not,
                    _ => Tok::Ident(word.to_string()),
                };
                out.push(Spanned { tok, offset: start });
            }
            other => return Err(err(i, format!("unexpected character '{other}'"))),
        }
    }

    Ok(out)
}

fn lex_string(source: &str, start: usize) -> Result<(String, usize), ExprError> {
    let quote = source.as_bytes()[start] as char;
    let mut s = String::new();
    let mut chars = source[start + 1..].char_indices();

    while let Some((off, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => s.push('\n'),
                Some((_, 't')) => s.push('\t'),
                Some((_, '\\')) => s.push('\\'),
                Some((_, e)) if e == quote => s.push(quote),
                Some((eoff, e)) => {
                    return Err(err(
                        start + 1 + eoff,
                        format!("unsupported escape '\\{e}'"),
                    ))
                }
                None => return Err(err(start, "unterminated string literal")),
            },
            c if c == quote => return Ok((s, start + 1 + off + c.len_utf8())),
            c => s.push(c),
        }
    }

    Err(err(start, "unterminated string literal"))
}

fn lex_number(source: &str, start: usize) -> Result<(Tok, usize), ExprError> {
    let bytes = source.as_bytes();
    let mut i = start;
    let mut is_float = false;

    while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
        i += 1;
    }
    // A dot only belongs to the number when followed by a digit, so member
    // access after a call result still lexes.
    if i < bytes.len()
        && bytes[i] == b'.'
        && i + 1 < bytes.len()
        && (bytes[i + 1] as char).is_ascii_digit()
    {
        is_float = true;
        i += 1;
        while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
            i += 1;
        }
    }

    let text = &source[start..i];
    let tok = if is_float {
        Tok::Float(
            text.parse()
                .map_err(|e| err(start, format!("invalid number '{text}': {e}")))?,
        )
    } else {
        Tok::Int(
            text.parse()
                .map_err(|e| err(start, format!("invalid number '{text}': {e}")))?,
        )
    };
    Ok((tok, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_operators_and_keywords() {
        let toks = lex("a.b >= 10 and not c").unwrap();
        let kinds: Vec<_> = toks.into_iter().map(|s| s.tok).collect();
        assert_eq!(
            kinds,
            vec![
                Tok::Ident("a".into()),
                Tok::Dot,
                Tok::Ident("b".into()),
                Tok::Ge,
                Tok::Int(10),
                Tok::And,
                Tok::Not,
                Tok::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn both_quote_styles_work() {
        assert_eq!(
            lex(r#""a" 'b'"#).unwrap()[1].tok,
            Tok::Str("b".to_string())
        );
    }

    #[test]
    fn single_equals_is_rejected_with_offset() {
        let e = lex("a = 1").unwrap_err();
        assert!(matches!(e, ExprError::Parse { offset: 2, .. }));
    }
}
