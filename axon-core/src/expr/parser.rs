use serde_json::Value;

use super::lexer::{Spanned, Tok};
use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Ident(String),
    Field(Box<Expr>, String),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    end: usize,
}

pub(crate) fn parse(tokens: &[Spanned]) -> Result<Expr, ExprError> {
    let end = tokens.last().map(|t| t.offset + 1).unwrap_or(0);
    let mut p = Parser { tokens, pos: 0, end };
    if tokens.is_empty() {
        return Err(p.err_here("empty expression"));
    }
    let expr = p.parse_or()?;
    if let Some(t) = p.peek() {
        return Err(ExprError::Parse {
            offset: t.offset,
            message: format!("unexpected token after expression: {:?}", t.tok),
        });
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Spanned> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek().map(|t| &t.tok) == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn err_here(&self, message: impl Into<String>) -> ExprError {
        let offset = self.peek().map(|t| t.offset).unwrap_or(self.end);
        ExprError::Parse {
            offset,
            message: message.into(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&Tok::And) {
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek().map(|t| &t.tok) {
            Some(Tok::Eq) => BinOp::Eq,
            Some(Tok::Ne) => BinOp::Ne,
            Some(Tok::Lt) => BinOp::Lt,
            Some(Tok::Le) => BinOp::Le,
            Some(Tok::Gt) => BinOp::Gt,
            Some(Tok::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Tok::Not) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        if self.eat(&Tok::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        while self.eat(&Tok::Dot) {
            match self.bump() {
                Some(Spanned {
                    tok: Tok::Ident(name),
                    ..
                }) => {
                    expr = Expr::Field(Box::new(expr), name.clone());
                }
                other => {
                    let offset = other.map(|t| t.offset).unwrap_or(self.end);
                    return Err(ExprError::Parse {
                        offset,
                        message: "expected field name after '.'".to_string(),
                    });
                }
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let Some(t) = self.bump() else {
            return Err(self.err_here("unexpected end of expression"));
        };
        match &t.tok {
            Tok::Int(n) => Ok(Expr::Literal(Value::from(*n))),
            Tok::Float(f) => Ok(Expr::Literal(
                serde_json::Number::from_f64(*f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Tok::Str(s) => Ok(Expr::Literal(Value::String(s.clone()))),
            Tok::True => Ok(Expr::Literal(Value::Bool(true))),
            Tok::False => Ok(Expr::Literal(Value::Bool(false))),
            Tok::Null => Ok(Expr::Literal(Value::Null)),
            Tok::LParen => {
                let inner = self.parse_or()?;
                if !self.eat(&Tok::RParen) {
                    return Err(self.err_here("expected ')'"));
                }
                Ok(inner)
            }
            Tok::Ident(name) => {
                if self.eat(&Tok::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Tok::RParen) {
                        loop {
                            args.push(self.parse_or()?);
                            if self.eat(&Tok::Comma) {
                                continue;
                            }
                            if self.eat(&Tok::RParen) {
                                break;
                            }
                            return Err(self.err_here("expected ',' or ')' in argument list"));
                        }
                    }
                    Ok(Expr::Call(name.clone(), args))
                } else {
                    Ok(Expr::Ident(name.clone()))
                }
            }
            other => Err(ExprError::Parse {
                offset: t.offset,
                message: format!("unexpected token: {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::lex;

    fn parse_src(s: &str) -> Result<Expr, ExprError> {
        parse(&lex(s).unwrap())
    }

    #[test]
    fn precedence_nests_and_below_or() {
        let e = parse_src("a or b and c").unwrap();
        match e {
            Expr::Binary(BinOp::Or, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(BinOp::And, _, _)))
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn call_with_member_arguments() {
        let e = parse_src("contains('x', data.name)").unwrap();
        assert!(matches!(e, Expr::Call(ref n, ref args) if n == "contains" && args.len() == 2));
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(parse_src("a b").is_err());
    }

    #[test]
    fn bare_operator_is_rejected() {
        assert!(parse_src("!=").is_err());
    }
}
