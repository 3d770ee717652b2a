use crate::functions;

use super::TemplateError;

/// A parsed template body: literal text interleaved with output pipelines
/// and conditional blocks.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Output(Pipeline),
    If {
        cond: Pipeline,
        then: Vec<Node>,
        els: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Term {
    /// `.a.b.c`; the empty path is `.`, the whole environment.
    Path(Vec<String>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// A function reference; called niladically in argument position.
    Ident(String),
    Paren(Pipeline),
}

enum RawAction {
    Output(Pipeline),
    If(Pipeline),
    Else,
    End,
}

enum Piece {
    Text(String),
    Action(RawAction, usize),
}

pub(crate) fn parse(name: &str, input: &str) -> Result<Vec<Node>, TemplateError> {
    let pieces = scan(name, input)?;
    let mut iter = pieces.into_iter().peekable();
    let (nodes, terminator) = parse_block(name, &mut iter)?;
    if let Some((word, offset)) = terminator {
        return Err(TemplateError::Parse {
            name: name.to_string(),
            offset,
            message: format!("unexpected '{{{{{word}}}}}' outside of an if block"),
        });
    }
    Ok(nodes)
}

type BlockEnd = Option<(&'static str, usize)>;

fn parse_block(
    name: &str,
    iter: &mut std::iter::Peekable<std::vec::IntoIter<Piece>>,
) -> Result<(Vec<Node>, BlockEnd), TemplateError> {
    let mut nodes = Vec::new();
    while let Some(piece) = iter.next() {
        match piece {
            Piece::Text(t) => nodes.push(Node::Text(t)),
            Piece::Action(RawAction::Output(p), _) => nodes.push(Node::Output(p)),
            Piece::Action(RawAction::If(cond), offset) => {
                let (then, term) = parse_block(name, iter)?;
                match term {
                    Some(("else", _)) => {
                        let (els, term) = parse_block(name, iter)?;
                        match term {
                            Some(("end", _)) => nodes.push(Node::If { cond, then, els }),
                            _ => {
                                return Err(unterminated_if(name, offset));
                            }
                        }
                    }
                    Some(("end", _)) => nodes.push(Node::If {
                        cond,
                        then,
                        els: Vec::new(),
                    }),
                    _ => return Err(unterminated_if(name, offset)),
                }
            }
            Piece::Action(RawAction::Else, offset) => return Ok((nodes, Some(("else", offset)))),
            Piece::Action(RawAction::End, offset) => return Ok((nodes, Some(("end", offset)))),
        }
    }
    Ok((nodes, None))
}

fn unterminated_if(name: &str, offset: usize) -> TemplateError {
    TemplateError::Parse {
        name: name.to_string(),
        offset,
        message: "'{{if ...}}' without a matching '{{end}}'".to_string(),
    }
}

/// Split the template into literal text and `{{ ... }}` actions.
fn scan(name: &str, input: &str) -> Result<Vec<Piece>, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = input;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            pieces.push(Piece::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let Some(close) = after.find("}}") else {
            return Err(TemplateError::Unclosed {
                name: name.to_string(),
                offset: offset + start,
            });
        };
        let body = &after[..close];
        let action_offset = offset + start;
        pieces.push(Piece::Action(
            parse_action(name, body, action_offset)?,
            action_offset,
        ));
        rest = &after[close + 2..];
        offset = action_offset + 2 + close + 2;
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest.to_string()));
    }
    Ok(pieces)
}

fn parse_action(name: &str, body: &str, offset: usize) -> Result<RawAction, TemplateError> {
    let trimmed = body.trim();
    if trimmed == "else" {
        return Ok(RawAction::Else);
    }
    if trimmed == "end" {
        return Ok(RawAction::End);
    }
    if let Some(cond) = trimmed.strip_prefix("if ") {
        return Ok(RawAction::If(parse_pipeline(name, cond, offset)?));
    }
    if trimmed.is_empty() {
        return Err(TemplateError::Parse {
            name: name.to_string(),
            offset,
            message: "empty action".to_string(),
        });
    }
    Ok(RawAction::Output(parse_pipeline(name, trimmed, offset)?))
}

fn parse_pipeline(name: &str, src: &str, offset: usize) -> Result<Pipeline, TemplateError> {
    let mut lex = ActionLexer::new(src);
    let pipeline = parse_pipeline_tokens(name, &mut lex, offset, false)?;
    if lex.peek(name, offset)?.is_some() {
        return Err(TemplateError::Parse {
            name: name.to_string(),
            offset,
            message: format!("unexpected trailing input in action '{src}'"),
        });
    }
    Ok(pipeline)
}

fn parse_pipeline_tokens(
    name: &str,
    lex: &mut ActionLexer<'_>,
    offset: usize,
    in_paren: bool,
) -> Result<Pipeline, TemplateError> {
    let mut cmds = Vec::new();
    loop {
        let cmd = parse_command(name, lex, offset, in_paren)?;
        cmds.push(cmd);
        match lex.peek(name, offset)? {
            Some(ATok::Pipe) => {
                lex.bump(name, offset)?;
            }
            _ => break,
        }
    }
    Ok(Pipeline { cmds })
}

fn parse_command(
    name: &str,
    lex: &mut ActionLexer<'_>,
    offset: usize,
    in_paren: bool,
) -> Result<Command, TemplateError> {
    let mut terms = Vec::new();
    loop {
        match lex.peek(name, offset)? {
            None | Some(ATok::Pipe) => break,
            Some(ATok::RParen) if in_paren => {
                if terms.is_empty() {
                    return Err(TemplateError::Parse {
                        name: name.to_string(),
                        offset,
                        message: "empty parenthesized action".to_string(),
                    });
                }
                break;
            }
            _ => {}
        }
        terms.push(parse_term(name, lex, offset)?);
    }

    if terms.is_empty() {
        return Err(TemplateError::Parse {
            name: name.to_string(),
            offset,
            message: "empty command".to_string(),
        });
    }

    // Any function reference must resolve at parse time.
    for (i, term) in terms.iter().enumerate() {
        if let Term::Ident(fn_name) = term {
            if functions::lookup(fn_name).is_none() {
                return Err(TemplateError::UnknownFunction {
                    name: name.to_string(),
                    function: fn_name.clone(),
                });
            }
        } else if i == 0 && terms.len() > 1 {
            return Err(TemplateError::Parse {
                name: name.to_string(),
                offset,
                message: "expected a function name before arguments".to_string(),
            });
        }
    }

    Ok(Command { terms })
}

fn parse_term(
    name: &str,
    lex: &mut ActionLexer<'_>,
    offset: usize,
) -> Result<Term, TemplateError> {
    match lex.bump(name, offset)? {
        Some(ATok::Path(p)) => Ok(Term::Path(p)),
        Some(ATok::Str(s)) => Ok(Term::Str(s)),
        Some(ATok::Int(n)) => Ok(Term::Int(n)),
        Some(ATok::Float(f)) => Ok(Term::Float(f)),
        Some(ATok::Ident(w)) => match w.as_str() {
            "true" => Ok(Term::Bool(true)),
            "false" => Ok(Term::Bool(false)),
            _ => Ok(Term::Ident(w)),
        },
        Some(ATok::LParen) => {
            let inner = parse_pipeline_tokens(name, lex, offset, true)?;
            match lex.bump(name, offset)? {
                Some(ATok::RParen) => Ok(Term::Paren(inner)),
                _ => Err(TemplateError::Parse {
                    name: name.to_string(),
                    offset,
                    message: "expected ')'".to_string(),
                }),
            }
        }
        Some(other) => Err(TemplateError::Parse {
            name: name.to_string(),
            offset,
            message: format!("unexpected token {other:?}"),
        }),
        None => Err(TemplateError::Parse {
            name: name.to_string(),
            offset,
            message: "unexpected end of action".to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ATok {
    Path(Vec<String>),
    Str(String),
    Int(i64),
    Float(f64),
    Ident(String),
    Pipe,
    LParen,
    RParen,
}

struct ActionLexer<'a> {
    src: &'a str,
    pos: usize,
    peeked: Option<Option<ATok>>,
}

impl<'a> ActionLexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            peeked: None,
        }
    }

    fn peek(&mut self, name: &str, offset: usize) -> Result<Option<&ATok>, TemplateError> {
        if self.peeked.is_none() {
            let next = self.next_token(name, offset)?;
            self.peeked = Some(next);
        }
        Ok(self.peeked.as_ref().and_then(|t| t.as_ref()))
    }

    fn bump(&mut self, name: &str, offset: usize) -> Result<Option<ATok>, TemplateError> {
        if let Some(t) = self.peeked.take() {
            return Ok(t);
        }
        self.next_token(name, offset)
    }

    fn next_token(&mut self, name: &str, offset: usize) -> Result<Option<ATok>, TemplateError> {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && (bytes[self.pos] as char).is_whitespace() {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return Ok(None);
        }

        let err = |message: String| TemplateError::Parse {
            name: name.to_string(),
            offset,
            message,
        };

        let c = bytes[self.pos] as char;
        match c {
            '|' => {
                self.pos += 1;
                Ok(Some(ATok::Pipe))
            }
            '(' => {
                self.pos += 1;
                Ok(Some(ATok::LParen))
            }
            ')' => {
                self.pos += 1;
                Ok(Some(ATok::RParen))
            }
            '.' => {
                let mut path = Vec::new();
                while self.pos < bytes.len() && bytes[self.pos] == b'.' {
                    self.pos += 1;
                    let start = self.pos;
                    while self.pos < bytes.len()
                        && ((bytes[self.pos] as char).is_ascii_alphanumeric()
                            || bytes[self.pos] == b'_')
                    {
                        self.pos += 1;
                    }
                    if self.pos == start {
                        // A lone `.` is the whole environment; `.foo.` is not.
                        if path.is_empty() {
                            return Ok(Some(ATok::Path(path)));
                        }
                        return Err(err("expected field name after '.'".to_string()));
                    }
                    path.push(self.src[start..self.pos].to_string());
                }
                Ok(Some(ATok::Path(path)))
            }
            '"' => {
                self.pos += 1;
                let mut s = String::new();
                loop {
                    let Some(&b) = bytes.get(self.pos) else {
                        return Err(err("unterminated string".to_string()));
                    };
                    self.pos += 1;
                    match b {
                        b'"' => break,
                        b'\\' => {
                            let Some(&esc) = bytes.get(self.pos) else {
                                return Err(err("unterminated string".to_string()));
                            };
                            self.pos += 1;
                            match esc {
                                b'n' => s.push('\n'),
                                b't' => s.push('\t'),
                                b'"' => s.push('"'),
                                b'\\' => s.push('\\'),
                                other => {
                                    return Err(err(format!(
                                        "unsupported escape '\\{}'",
                                        other as char
                                    )))
                                }
                            }
                        }
                        other => {
                            // Multi-byte characters pass through untouched.
                            let ch_start = self.pos - 1;
                            let ch = self.src[ch_start..].chars().next().expect("in bounds");
                            if ch.len_utf8() > 1 {
                                self.pos = ch_start + ch.len_utf8();
                                s.push(ch);
                            } else {
                                s.push(other as char);
                            }
                        }
                    }
                }
                Ok(Some(ATok::Str(s)))
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = self.pos;
                if c == '-' {
                    self.pos += 1;
                }
                let mut is_float = false;
                while self.pos < bytes.len()
                    && ((bytes[self.pos] as char).is_ascii_digit()
                        || (bytes[self.pos] == b'.' && !is_float))
                {
                    if bytes[self.pos] == b'.' {
                        is_float = true;
                    }
                    self.pos += 1;
                }
                let text = &self.src[start..self.pos];
                if is_float {
                    text.parse::<f64>()
                        .map(|f| Some(ATok::Float(f)))
                        .map_err(|e| err(format!("invalid number '{text}': {e}")))
                } else {
                    text.parse::<i64>()
                        .map(|n| Some(ATok::Int(n)))
                        .map_err(|e| err(format!("invalid number '{text}': {e}")))
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = self.pos;
                while self.pos < bytes.len()
                    && ((bytes[self.pos] as char).is_ascii_alphanumeric() || bytes[self.pos] == b'_')
                {
                    self.pos += 1;
                }
                Ok(Some(ATok::Ident(self.src[start..self.pos].to_string())))
            }
            other => Err(err(format!("unexpected character '{other}'"))),
        }
    }
}
