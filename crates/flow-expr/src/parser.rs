//! Recursive-descent parser for the expression grammar
//!
//! Precedence, loosest first: `||`, `&&`, equality, comparison,
//! additive, multiplicative, unary, postfix (call / path segments).

use serde_json::Value;

use crate::error::{EvalError, Result};
use crate::lexer::{tokenize, Spanned, Token};

/// One segment of a dotted path. Bracket indices (`a[0]`) and dotted
/// indices (`a.0`) parse to the same segment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathSeg {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Path(Vec<PathSeg>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
    /// Member access on a computed value: `first(users).name`,
    /// `(a)[0]`. Resolution mirrors path lookup (missing → null).
    Member {
        base: Box<Expr>,
        segments: Vec<PathSeg>,
    },
}

/// Parse an expression string into an AST.
pub(crate) fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: input.len(),
    };
    let expr = parser.or_expr()?;
    if let Some(t) = parser.peek() {
        return Err(EvalError::parse(t.offset, "trailing input after expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().map(|t| &t.token) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        let offset = self.offset();
        match self.advance() {
            Some(t) if t.token == token => Ok(()),
            _ => Err(EvalError::parse(offset, format!("expected {}", what))),
        }
    }

    fn offset(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.len)
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(&Token::OrOr) {
            let right = self.and_expr()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.comparison()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.eat(&Token::Bang) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let Some(spanned) = self.advance() else {
            return Err(EvalError::parse(offset, "unexpected end of expression"));
        };
        match spanned.token {
            Token::Number(n) => Ok(Expr::Literal(number_literal(n)?)),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LParen => {
                let inner = self.or_expr()?;
                self.expect(Token::RParen, "')'")?;
                self.postfix(inner)
            }
            Token::Ident(name) => {
                if self.peek().map(|t| &t.token) == Some(&Token::LParen) {
                    self.pos += 1;
                    let call = self.call(name)?;
                    self.postfix(call)
                } else {
                    self.path(name)
                }
            }
            other => Err(EvalError::parse(offset, format!("unexpected token {:?}", other))),
        }
    }

    fn call(&mut self, function: String) -> Result<Expr> {
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.or_expr()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(Token::RParen, "')' after call arguments")?;
                break;
            }
        }
        Ok(Expr::Call { function, args })
    }

    fn path(&mut self, first: String) -> Result<Expr> {
        let mut segments = vec![PathSeg::Key(first)];
        self.segments(&mut segments)?;
        // The optional `context.` prefix addresses the same scope root
        if segments.len() > 1 {
            if let PathSeg::Key(root) = &segments[0] {
                if root == "context" {
                    segments.remove(0);
                }
            }
        }
        Ok(Expr::Path(segments))
    }

    /// Trailing `.key` / `[index]` accesses on a computed value.
    fn postfix(&mut self, base: Expr) -> Result<Expr> {
        let mut segments = Vec::new();
        self.segments(&mut segments)?;
        if segments.is_empty() {
            Ok(base)
        } else {
            Ok(Expr::Member {
                base: Box::new(base),
                segments,
            })
        }
    }

    fn segments(&mut self, segments: &mut Vec<PathSeg>) -> Result<()> {
        loop {
            if self.eat(&Token::Dot) {
                let offset = self.offset();
                match self.advance().map(|t| t.token) {
                    Some(Token::Ident(key)) => segments.push(PathSeg::Key(key)),
                    // reuse keywords as plain keys (`result.null` is a valid path)
                    Some(Token::True) => segments.push(PathSeg::Key("true".into())),
                    Some(Token::False) => segments.push(PathSeg::Key("false".into())),
                    Some(Token::Null) => segments.push(PathSeg::Key("null".into())),
                    Some(Token::Number(n)) if n.fract() == 0.0 && n >= 0.0 => {
                        segments.push(PathSeg::Index(n as usize))
                    }
                    _ => return Err(EvalError::parse(offset, "expected path segment after '.'")),
                }
            } else if self.eat(&Token::LBracket) {
                let offset = self.offset();
                match self.advance().map(|t| t.token) {
                    Some(Token::Number(n)) if n.fract() == 0.0 && n >= 0.0 => {
                        segments.push(PathSeg::Index(n as usize));
                    }
                    Some(Token::Str(key)) => segments.push(PathSeg::Key(key)),
                    _ => return Err(EvalError::parse(offset, "expected index inside '[]'")),
                }
                self.expect(Token::RBracket, "']'")?;
            } else {
                return Ok(());
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn number_literal(n: f64) -> Result<Value> {
    // Integral literals stay integers so they render without ".0"
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        Ok(Value::Number(serde_json::Number::from(n as i64)))
    } else {
        crate::value::number(n)
    }
}
