//! Precedence-climbing parser: tokens → [`Expr`]
//!
//! Lowest to highest: `?:`, `or`, `and`, comparisons, `+ -`, `* / %`,
//! prefix `- + not`, `^`. Power is right-associative and binds tighter
//! than a leading minus, so `-2^2` is `-(2^2)`.
//!
//! Both parser recursion and the depth of the produced tree are capped at
//! [`MAX_DEPTH`]; evaluation recurses over the tree, so it inherits the cap.

use super::lexer::{Spanned, Tok};

/// Deepest nesting accepted, counting both grouping and operator chains
pub const MAX_DEPTH: usize = 256;

/// A parsed subtree plus its height
type Parsed = Result<(Expr, usize), ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub pos: usize,
    pub details: String,
}

pub fn parse(tokens: &[Spanned], source_len: usize) -> Result<Expr, ParseError> {
    if tokens.is_empty() {
        return Err(ParseError {
            pos: 0,
            details: "expression is empty".to_string(),
        });
    }

    let mut parser = Parser {
        tokens,
        idx: 0,
        source_len,
        depth: 0,
    };
    let (expr, _) = parser.conditional()?;

    if let Some(extra) = parser.peek() {
        return Err(ParseError {
            pos: extra.pos,
            details: format!("unexpected {}", describe(&extra.tok)),
        });
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    idx: usize,
    source_len: usize,
    /// Current recursion depth
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.idx)
    }

    fn peek_tok(&self) -> Option<&'a Tok> {
        self.peek().map(|s| &s.tok)
    }

    fn advance(&mut self) -> Option<&'a Spanned> {
        let tok = self.tokens.get(self.idx);
        if tok.is_some() {
            self.idx += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek_tok() == Some(tok) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), ParseError> {
        if self.eat(&tok) {
            return Ok(());
        }
        Err(self.error_here(format!("expected {}", describe(&tok))))
    }

    fn error_here(&self, expected: String) -> ParseError {
        match self.peek() {
            Some(s) => ParseError {
                pos: s.pos,
                details: format!("{}, found {}", expected, describe(&s.tok)),
            },
            None => ParseError {
                pos: self.source_len,
                details: format!("{}, found end of expression", expected),
            },
        }
    }

    fn too_deep(&self) -> ParseError {
        ParseError {
            pos: self.peek().map(|s| s.pos).unwrap_or(self.source_len),
            details: "expression nested too deeply".to_string(),
        }
    }

    /// Accept a node unless the tree got too tall
    fn node(&self, expr: Expr, height: usize) -> Parsed {
        if height > MAX_DEPTH {
            return Err(self.too_deep());
        }
        Ok((expr, height))
    }

    /// Run `f` one recursion level deeper
    fn nested(&mut self, f: fn(&mut Self) -> Parsed) -> Parsed {
        if self.depth >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn conditional(&mut self) -> Parsed {
        self.nested(Self::conditional_inner)
    }

    fn conditional_inner(&mut self) -> Parsed {
        let (cond, cond_h) = self.binary(0)?;
        if !self.eat(&Tok::Question) {
            return Ok((cond, cond_h));
        }
        let (then, then_h) = self.conditional()?;
        self.expect(Tok::Colon)?;
        let (otherwise, otherwise_h) = self.conditional()?;
        self.node(
            Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            1 + cond_h.max(then_h).max(otherwise_h),
        )
    }

    /// Left-associative binary levels, `min_level` upwards
    fn binary(&mut self, min_level: u8) -> Parsed {
        let (mut lhs, mut height) = self.unary()?;

        while let Some((op, level)) = self.peek_tok().and_then(binary_op) {
            if level < min_level {
                break;
            }
            self.idx += 1;
            let (rhs, rhs_h) = self.binary(level + 1)?;
            (lhs, height) = self.node(
                Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                1 + height.max(rhs_h),
            )?;
        }
        Ok((lhs, height))
    }

    fn unary(&mut self) -> Parsed {
        let op = match self.peek_tok() {
            Some(Tok::Minus) => UnaryOp::Neg,
            Some(Tok::Plus) => UnaryOp::Plus,
            Some(Tok::Not) => UnaryOp::Not,
            _ => return self.power(),
        };
        self.idx += 1;
        let (operand, height) = self.nested(Self::unary)?;
        self.node(
            Expr::Unary {
                op,
                operand: Box::new(operand),
            },
            height + 1,
        )
    }

    fn power(&mut self) -> Parsed {
        let (base, base_h) = self.primary()?;
        if !self.eat(&Tok::Caret) {
            return Ok((base, base_h));
        }
        // right-assoc; exponent may carry its own sign (2^-1)
        let (exponent, exponent_h) = self.nested(Self::unary)?;
        self.node(
            Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            },
            1 + base_h.max(exponent_h),
        )
    }

    fn primary(&mut self) -> Parsed {
        let Some(spanned) = self.advance() else {
            return Err(self.error_here("expected a value".to_string()));
        };

        match &spanned.tok {
            Tok::Number(n) => Ok((Expr::Number(*n), 1)),
            Tok::Str(s) => Ok((Expr::Text(s.clone()), 1)),
            Tok::LParen => {
                let inner = self.conditional()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Tok::Ident(name) => match name.as_str() {
                "true" => Ok((Expr::Bool(true), 1)),
                "false" => Ok((Expr::Bool(false), 1)),
                _ if self.eat(&Tok::LParen) => {
                    let (args, args_h) = self.call_args()?;
                    self.node(
                        Expr::Call {
                            name: name.clone(),
                            args,
                        },
                        args_h + 1,
                    )
                }
                _ => Ok((Expr::Name(name.clone()), 1)),
            },
            other => Err(ParseError {
                pos: spanned.pos,
                details: format!("expected a value, found {}", describe(other)),
            }),
        }
    }

    /// Arguments up to the closing paren, with the tallest argument's height
    fn call_args(&mut self) -> Result<(Vec<Expr>, usize), ParseError> {
        let mut args = Vec::new();
        let mut height = 0;
        if self.eat(&Tok::RParen) {
            return Ok((args, height));
        }
        loop {
            let (arg, arg_h) = self.conditional()?;
            height = height.max(arg_h);
            args.push(arg);
            if self.eat(&Tok::Comma) {
                continue;
            }
            self.expect(Tok::RParen)?;
            return Ok((args, height));
        }
    }
}

fn binary_op(tok: &Tok) -> Option<(BinaryOp, u8)> {
    let entry = match tok {
        Tok::Or => (BinaryOp::Or, 0),
        Tok::And => (BinaryOp::And, 1),
        Tok::Eq => (BinaryOp::Eq, 2),
        Tok::Ne => (BinaryOp::Ne, 2),
        Tok::Lt => (BinaryOp::Lt, 2),
        Tok::Le => (BinaryOp::Le, 2),
        Tok::Gt => (BinaryOp::Gt, 2),
        Tok::Ge => (BinaryOp::Ge, 2),
        Tok::Plus => (BinaryOp::Add, 3),
        Tok::Minus => (BinaryOp::Sub, 3),
        Tok::Star => (BinaryOp::Mul, 4),
        Tok::Slash => (BinaryOp::Div, 4),
        Tok::Percent => (BinaryOp::Rem, 4),
        _ => return None,
    };
    Some(entry)
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Number(n) => format!("number {}", n),
        Tok::Str(s) => format!("string {:?}", s),
        Tok::Ident(name) => format!("name '{}'", name),
        Tok::Plus => "'+'".into(),
        Tok::Minus => "'-'".into(),
        Tok::Star => "'*'".into(),
        Tok::Slash => "'/'".into(),
        Tok::Percent => "'%'".into(),
        Tok::Caret => "'^'".into(),
        Tok::LParen => "'('".into(),
        Tok::RParen => "')'".into(),
        Tok::Comma => "','".into(),
        Tok::Question => "'?'".into(),
        Tok::Colon => "':'".into(),
        Tok::Eq => "'=='".into(),
        Tok::Ne => "'!='".into(),
        Tok::Lt => "'<'".into(),
        Tok::Le => "'<='".into(),
        Tok::Gt => "'>'".into(),
        Tok::Ge => "'>='".into(),
        Tok::And => "'and'".into(),
        Tok::Or => "'or'".into(),
        Tok::Not => "'not'".into(),
    }
}
