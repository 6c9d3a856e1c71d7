//! Guard and after-effect expressions
//!
//! Rule files carry two tiny expression forms:
//!
//! - guards: `otp_fail < 5`, `ctx.stock_checked == false && id_retry <= 2`
//! - after-effects: `otp_fail += 1; branch_suggested = true`
//!
//! Both are compiled at load time against a [`ContextSchema`], so every
//! field reference becomes an index into the transaction's counter or
//! flag table. The language can only read and write those fields.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

/// Expression parse and type errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: &'static str },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("unknown context field '{0}'")]
    UnknownField(String),

    #[error("integer literal out of range: {0}")]
    IntegerOverflow(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("expression longer than {0} tokens")]
    TooLong(usize),
}

/// Deepest `(` / `not` nesting accepted in a guard
pub const MAX_NESTING: usize = 64;

/// Longest expression accepted, in tokens
pub const MAX_TOKENS: usize = 512;

/// Declared counters and flags, in index order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSchema {
    counters: Vec<(String, u32)>,
    flags: Vec<(String, bool)>,
}

impl ContextSchema {
    pub fn new(
        counters: impl IntoIterator<Item = (String, u32)>,
        flags: impl IntoIterator<Item = (String, bool)>,
    ) -> Self {
        Self {
            counters: counters.into_iter().collect(),
            flags: flags.into_iter().collect(),
        }
    }

    pub fn counter_index(&self, name: &str) -> Option<usize> {
        self.counters.iter().position(|(n, _)| n == name)
    }

    pub fn flag_index(&self, name: &str) -> Option<usize> {
        self.flags.iter().position(|(n, _)| n == name)
    }

    pub fn resolve(&self, name: &str) -> Option<FieldRef> {
        self.counter_index(name)
            .map(FieldRef::Counter)
            .or_else(|| self.flag_index(name).map(FieldRef::Flag))
    }

    pub fn counter_name(&self, index: usize) -> &str {
        &self.counters[index].0
    }

    pub fn flag_name(&self, index: usize) -> &str {
        &self.flags[index].0
    }

    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    pub fn flag_count(&self) -> usize {
        self.flags.len()
    }

    pub fn counter_names(&self) -> impl Iterator<Item = &str> {
        self.counters.iter().map(|(n, _)| n.as_str())
    }

    pub fn flag_names(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(|(n, _)| n.as_str())
    }

    pub fn initial_counters(&self) -> Vec<u32> {
        self.counters.iter().map(|(_, v)| *v).collect()
    }

    pub fn initial_flags(&self) -> Vec<bool> {
        self.flags.iter().map(|(_, v)| *v).collect()
    }
}

/// Indexed reference to a context field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRef {
    Counter(usize),
    Flag(usize),
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn apply<T: Ord>(self, lhs: T, rhs: T) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }
}

/// Numeric operand of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntOperand {
    Counter(usize),
    Literal(u32),
}

/// Compiled boolean guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardExpr {
    Literal(bool),
    Flag(usize),
    CompareInt {
        lhs: IntOperand,
        op: CmpOp,
        rhs: IntOperand,
    },
    /// `==` / `!=` between two boolean sub-expressions
    CompareBool {
        lhs: Box<GuardExpr>,
        equal: bool,
        rhs: Box<GuardExpr>,
    },
    Not(Box<GuardExpr>),
    And(Box<GuardExpr>, Box<GuardExpr>),
    Or(Box<GuardExpr>, Box<GuardExpr>),
}

/// One after-effect statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    SetCounter { index: usize, value: u32 },
    AddCounter { index: usize, amount: u32 },
    SetFlag { index: usize, value: bool },
}

/// A guard as declared in rule data, with its compiled form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub source: String,
    pub expr: GuardExpr,
}

impl Guard {
    pub fn parse(source: &str, schema: &ContextSchema) -> Result<Self, ExprError> {
        // Newlines are plain whitespace in a guard
        let tokens = tokenize(source, false)?;
        let mut parser = Parser::new(tokens, schema);
        let expr = parser.parse_or()?;
        parser.expect_end()?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// An after-effect as declared in rule data, with its compiled form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub source: String,
    pub statements: Vec<Assignment>,
}

impl Effect {
    pub fn parse(source: &str, schema: &ContextSchema) -> Result<Self, ExprError> {
        let tokens = tokenize(source, true)?;
        let mut parser = Parser::new(tokens, schema);
        let statements = parser.parse_statements()?;
        Ok(Self {
            source: source.trim().to_string(),
            statements,
        })
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Int(String),
    Bool(bool),
    LParen,
    RParen,
    Cmp(CmpOp),
    Assign,
    PlusAssign,
    And,
    Or,
    Not,
    Sep,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "identifier '{}'", name),
            Self::Int(digits) => write!(f, "integer {}", digits),
            Self::Bool(b) => write!(f, "boolean {}", b),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Cmp(op) => write!(f, "operator {:?}", op),
            Self::Assign => f.write_str("'='"),
            Self::PlusAssign => f.write_str("'+='"),
            Self::And => f.write_str("'and'"),
            Self::Or => f.write_str("'or'"),
            Self::Not => f.write_str("'not'"),
            Self::Sep => f.write_str("statement separator"),
        }
    }
}

fn tokenize(source: &str, newline_separates: bool) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        let token = match ch {
            ' ' | '\t' | '\r' => continue,
            '\n' if !newline_separates => continue,
            '\n' | ';' => Token::Sep,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '<' => with_eq(&mut chars, Token::Cmp(CmpOp::Le), Token::Cmp(CmpOp::Lt)),
            '>' => with_eq(&mut chars, Token::Cmp(CmpOp::Ge), Token::Cmp(CmpOp::Gt)),
            '=' => with_eq(&mut chars, Token::Cmp(CmpOp::Eq), Token::Assign),
            '!' => with_eq(&mut chars, Token::Cmp(CmpOp::Ne), Token::Not),
            '+' if next_is(&mut chars, '=') => Token::PlusAssign,
            '&' if next_is(&mut chars, '&') => Token::And,
            '|' if next_is(&mut chars, '|') => Token::Or,
            c if c.is_ascii_digit() => {
                let mut digits = c.to_string();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                Token::Int(digits)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = c.to_string();
                while let Some(&(_, d)) = chars.peek() {
                    if !(d.is_ascii_alphanumeric() || d == '_' || d == '.') {
                        break;
                    }
                    word.push(d);
                    chars.next();
                }
                keyword_or_ident(word)
            }
            ch => return Err(ExprError::UnexpectedChar { ch, offset }),
        };
        if tokens.len() == MAX_TOKENS {
            return Err(ExprError::TooLong(MAX_TOKENS));
        }
        tokens.push(token);
    }

    Ok(tokens)
}

fn next_is(chars: &mut Peekable<CharIndices<'_>>, expected: char) -> bool {
    if chars.peek().map(|&(_, c)| c) == Some(expected) {
        chars.next();
        true
    } else {
        false
    }
}

fn with_eq(chars: &mut Peekable<CharIndices<'_>>, with: Token, without: Token) -> Token {
    if next_is(chars, '=') { with } else { without }
}

fn keyword_or_ident(word: String) -> Token {
    match word.as_str() {
        "true" | "True" => Token::Bool(true),
        "false" | "False" => Token::Bool(false),
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => Token::Ident(word),
    }
}

/// A parsed atom before it is known to be numeric or boolean
enum Term {
    Int(IntOperand),
    Bool(GuardExpr),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    schema: &'a ContextSchema,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, schema: &'a ContextSchema) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            schema,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn nest<T>(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.depth == MAX_NESTING {
            return Err(ExprError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn expect_end(&self) -> Result<(), ExprError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken {
                found: token.to_string(),
                expected: "end of expression",
            }),
        }
    }

    fn parse_or(&mut self) -> Result<GuardExpr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = GuardExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<GuardExpr, ExprError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = GuardExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<GuardExpr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.nest(Self::parse_unary)?;
            return Ok(GuardExpr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<GuardExpr, ExprError> {
        let lhs = self.parse_term()?;
        let op = match self.peek() {
            Some(Token::Cmp(op)) => *op,
            _ => {
                return match lhs {
                    Term::Bool(expr) => Ok(expr),
                    Term::Int(_) => Err(ExprError::TypeMismatch(
                        "counter or integer used where a boolean is expected".into(),
                    )),
                };
            }
        };
        self.advance();
        let rhs = self.parse_term()?;

        match (lhs, rhs) {
            (Term::Int(lhs), Term::Int(rhs)) => Ok(GuardExpr::CompareInt { lhs, op, rhs }),
            (Term::Bool(lhs), Term::Bool(rhs)) if op.is_equality() => Ok(GuardExpr::CompareBool {
                lhs: Box::new(lhs),
                equal: op == CmpOp::Eq,
                rhs: Box::new(rhs),
            }),
            (Term::Bool(_), Term::Bool(_)) => Err(ExprError::TypeMismatch(
                "ordering comparison between booleans".into(),
            )),
            _ => Err(ExprError::TypeMismatch(
                "comparison between a number and a boolean".into(),
            )),
        }
    }

    fn parse_term(&mut self) -> Result<Term, ExprError> {
        match self.advance() {
            Some(Token::Int(digits)) => Ok(Term::Int(IntOperand::Literal(parse_u32(&digits)?))),
            Some(Token::Bool(b)) => Ok(Term::Bool(GuardExpr::Literal(b))),
            Some(Token::Ident(name)) => match self.field(&name)? {
                FieldRef::Counter(index) => Ok(Term::Int(IntOperand::Counter(index))),
                FieldRef::Flag(index) => Ok(Term::Bool(GuardExpr::Flag(index))),
            },
            Some(Token::LParen) => {
                let inner = self.nest(Self::parse_or)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(Term::Bool(inner)),
                    Some(token) => Err(ExprError::UnexpectedToken {
                        found: token.to_string(),
                        expected: "')'",
                    }),
                    None => Err(ExprError::UnexpectedEnd { expected: "')'" }),
                }
            }
            Some(token) => Err(ExprError::UnexpectedToken {
                found: token.to_string(),
                expected: "field, literal or '('",
            }),
            None => Err(ExprError::UnexpectedEnd {
                expected: "field, literal or '('",
            }),
        }
    }

    fn parse_statements(&mut self) -> Result<Vec<Assignment>, ExprError> {
        let mut statements = Vec::new();
        loop {
            while self.peek() == Some(&Token::Sep) {
                self.advance();
            }
            if self.peek().is_none() {
                return Ok(statements);
            }
            statements.push(self.parse_assignment()?);
            match self.peek() {
                None | Some(Token::Sep) => {}
                Some(token) => {
                    return Err(ExprError::UnexpectedToken {
                        found: token.to_string(),
                        expected: "';' or newline",
                    });
                }
            }
        }
    }

    fn parse_assignment(&mut self) -> Result<Assignment, ExprError> {
        let field = match self.advance() {
            Some(Token::Ident(name)) => self.field(&name)?,
            Some(token) => {
                return Err(ExprError::UnexpectedToken {
                    found: token.to_string(),
                    expected: "field name",
                });
            }
            None => return Err(ExprError::UnexpectedEnd { expected: "field name" }),
        };
        let increment = match self.advance() {
            Some(Token::Assign) => false,
            Some(Token::PlusAssign) => true,
            Some(token) => {
                return Err(ExprError::UnexpectedToken {
                    found: token.to_string(),
                    expected: "'=' or '+='",
                });
            }
            None => return Err(ExprError::UnexpectedEnd { expected: "'=' or '+='" }),
        };
        let value = self.advance();

        match (field, increment, value) {
            (FieldRef::Counter(index), false, Some(Token::Int(digits))) => Ok(Assignment::SetCounter {
                index,
                value: parse_u32(&digits)?,
            }),
            (FieldRef::Counter(index), true, Some(Token::Int(digits))) => Ok(Assignment::AddCounter {
                index,
                amount: parse_u32(&digits)?,
            }),
            (FieldRef::Flag(index), false, Some(Token::Bool(value))) => {
                Ok(Assignment::SetFlag { index, value })
            }
            (FieldRef::Flag(index), true, _) => Err(ExprError::TypeMismatch(format!(
                "'+=' applied to flag '{}'",
                self.schema.flag_name(index)
            ))),
            (FieldRef::Counter(index), _, Some(_)) => Err(ExprError::TypeMismatch(format!(
                "counter '{}' needs an integer literal",
                self.schema.counter_name(index)
            ))),
            (FieldRef::Flag(index), _, Some(_)) => Err(ExprError::TypeMismatch(format!(
                "flag '{}' needs a boolean literal",
                self.schema.flag_name(index)
            ))),
            (_, _, None) => Err(ExprError::UnexpectedEnd { expected: "literal" }),
        }
    }

    fn field(&self, name: &str) -> Result<FieldRef, ExprError> {
        let bare = name.strip_prefix("ctx.").unwrap_or(name);
        if bare.contains('.') {
            return Err(ExprError::UnknownField(name.to_string()));
        }
        self.schema
            .resolve(bare)
            .ok_or_else(|| ExprError::UnknownField(bare.to_string()))
    }
}

fn parse_u32(digits: &str) -> Result<u32, ExprError> {
    digits
        .parse()
        .map_err(|_| ExprError::IntegerOverflow(digits.to_string()))
}
