//! Message selectors over application headers.
//!
//! Supports comparisons, `AND`/`OR`/`NOT`, `IS [NOT] NULL`, `[NOT] IN`,
//! `[NOT] LIKE ... [ESCAPE ...]` and `[NOT] BETWEEN`. Evaluation uses SQL
//! three-valued logic: a missing header or a type mismatch yields UNKNOWN, and
//! only a TRUE result selects the message.

use crate::message::HeaderValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid selector at offset {offset}: {reason}")]
pub struct SelectorError {
    pub offset: usize,
    pub reason: String,
}

impl SelectorError {
    fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

#[derive(Debug)]
pub struct Selector {
    source: String,
    expression: Expr,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            position: 0,
            end: source.len(),
        };
        let expression = parser.parse_or()?;
        if let Some((offset, token)) = parser.tokens.get(parser.position) {
            return Err(SelectorError::new(
                *offset,
                format!("unexpected token {token:?}"),
            ));
        }
        Ok(Self {
            source: source.to_string(),
            expression,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, headers: &HashMap<String, HeaderValue>) -> bool {
        self.expression.evaluate(headers) == Some(HeaderValue::Bool(true))
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Identifier(String),
    Literal(HeaderValue),
    Null,
    And,
    Or,
    Not,
    Is,
    In,
    Like,
    Escape,
    Between,
    Minus,
    OpenParen,
    CloseParen,
    Comma,
    Compare(CompareOp),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
enum LikeToken {
    AnySequence,
    AnyChar,
    Literal(char),
}

#[derive(Debug)]
enum Expr {
    Literal(HeaderValue),
    Null,
    Identifier(String),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull {
        operand: Box<Expr>,
        negated: bool,
    },
    In {
        operand: Box<Expr>,
        values: Vec<HeaderValue>,
        negated: bool,
    },
    Like {
        operand: Box<Expr>,
        pattern: Vec<LikeToken>,
        negated: bool,
    },
    Between {
        operand: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, SelectorError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match ch {
            '(' => {
                chars.next();
                Token::OpenParen
            }
            ')' => {
                chars.next();
                Token::CloseParen
            }
            ',' => {
                chars.next();
                Token::Comma
            }
            '-' => {
                chars.next();
                Token::Minus
            }
            '=' => {
                chars.next();
                Token::Compare(CompareOp::Eq)
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some((_, '>')) => {
                        chars.next();
                        Token::Compare(CompareOp::Ne)
                    }
                    Some((_, '=')) => {
                        chars.next();
                        Token::Compare(CompareOp::Le)
                    }
                    _ => Token::Compare(CompareOp::Lt),
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    Token::Compare(CompareOp::Ge)
                } else {
                    Token::Compare(CompareOp::Gt)
                }
            }
            '\'' => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\'')) => {
                            if matches!(chars.peek(), Some((_, '\''))) {
                                chars.next();
                                literal.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some((_, other)) => literal.push(other),
                        None => {
                            return Err(SelectorError::new(offset, "unterminated string literal"))
                        }
                    }
                }
                Token::Literal(HeaderValue::String(literal))
            }
            c if c.is_ascii_digit() => {
                let mut number = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if number.contains('.') {
                    number
                        .parse::<f64>()
                        .map(|value| Token::Literal(HeaderValue::Float(value)))
                        .map_err(|_| SelectorError::new(offset, "malformed number"))?
                } else {
                    number
                        .parse::<i64>()
                        .map(|value| Token::Literal(HeaderValue::Int(value)))
                        .map_err(|_| SelectorError::new(offset, "integer out of range"))?
                }
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' || c == '.' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                keyword(&word).unwrap_or(Token::Identifier(word))
            }
            other => {
                return Err(SelectorError::new(
                    offset,
                    format!("unexpected character '{other}'"),
                ))
            }
        };
        tokens.push((offset, token));
    }

    Ok(tokens)
}

fn keyword(word: &str) -> Option<Token> {
    let token = match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "IS" => Token::Is,
        "IN" => Token::In,
        "LIKE" => Token::Like,
        "ESCAPE" => Token::Escape,
        "BETWEEN" => Token::Between,
        "NULL" => Token::Null,
        "TRUE" => Token::Literal(HeaderValue::Bool(true)),
        "FALSE" => Token::Literal(HeaderValue::Bool(false)),
        _ => return None,
    };
    Some(token)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    position: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(_, token)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .map_or(self.end, |(offset, _)| *offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|(_, token)| token.clone());
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), SelectorError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(SelectorError::new(self.offset(), format!("expected {what}")))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, SelectorError> {
        let mut expr = self.parse_and()?;
        while self.eat(&Token::Or) {
            expr = Expr::Or(Box::new(expr), Box::new(self.parse_and()?));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, SelectorError> {
        let mut expr = self.parse_not()?;
        while self.eat(&Token::And) {
            expr = Expr::And(Box::new(expr), Box::new(self.parse_not()?));
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr, SelectorError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, SelectorError> {
        let operand = self.parse_operand()?;

        match self.peek() {
            Some(Token::Compare(op)) => {
                let op = *op;
                self.position += 1;
                let right = self.parse_operand()?;
                Ok(Expr::Compare(Box::new(operand), op, Box::new(right)))
            }
            Some(Token::Is) => {
                self.position += 1;
                let negated = self.eat(&Token::Not);
                self.expect(&Token::Null, "NULL")?;
                Ok(Expr::IsNull {
                    operand: Box::new(operand),
                    negated,
                })
            }
            Some(Token::Not) => {
                self.position += 1;
                self.parse_negatable(operand, true)
            }
            Some(Token::In | Token::Like | Token::Between) => self.parse_negatable(operand, false),
            _ => Ok(operand),
        }
    }

    fn parse_negatable(&mut self, operand: Expr, negated: bool) -> Result<Expr, SelectorError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::In) => {
                self.expect(&Token::OpenParen, "'(' after IN")?;
                let mut values = vec![self.parse_literal()?];
                while self.eat(&Token::Comma) {
                    values.push(self.parse_literal()?);
                }
                self.expect(&Token::CloseParen, "')' closing IN list")?;
                Ok(Expr::In {
                    operand: Box::new(operand),
                    values,
                    negated,
                })
            }
            Some(Token::Like) => {
                let pattern = self.parse_string("LIKE pattern")?;
                let escape = if self.eat(&Token::Escape) {
                    let escape_offset = self.offset();
                    let escape = self.parse_string("ESCAPE character")?;
                    let mut chars = escape.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some(c),
                        _ => {
                            return Err(SelectorError::new(
                                escape_offset,
                                "ESCAPE must be a single character",
                            ))
                        }
                    }
                } else {
                    None
                };
                Ok(Expr::Like {
                    operand: Box::new(operand),
                    pattern: compile_like(&pattern, escape),
                    negated,
                })
            }
            Some(Token::Between) => {
                let low = self.parse_operand()?;
                self.expect(&Token::And, "AND in BETWEEN")?;
                let high = self.parse_operand()?;
                Ok(Expr::Between {
                    operand: Box::new(operand),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                })
            }
            _ => Err(SelectorError::new(offset, "expected IN, LIKE or BETWEEN")),
        }
    }

    fn parse_operand(&mut self) -> Result<Expr, SelectorError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::OpenParen) => {
                let expr = self.parse_or()?;
                self.expect(&Token::CloseParen, "')'")?;
                Ok(expr)
            }
            Some(Token::Identifier(name)) => Ok(Expr::Identifier(name)),
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::Null) => Ok(Expr::Null),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Literal(HeaderValue::Int(value))) => {
                    Ok(Expr::Literal(HeaderValue::Int(-value)))
                }
                Some(Token::Literal(HeaderValue::Float(value))) => {
                    Ok(Expr::Literal(HeaderValue::Float(-value)))
                }
                _ => Err(SelectorError::new(offset, "expected number after '-'")),
            },
            _ => Err(SelectorError::new(offset, "expected operand")),
        }
    }

    fn parse_literal(&mut self) -> Result<HeaderValue, SelectorError> {
        match self.parse_operand()? {
            Expr::Literal(value) => Ok(value),
            _ => Err(SelectorError::new(self.offset(), "expected literal")),
        }
    }

    fn parse_string(&mut self, what: &str) -> Result<String, SelectorError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Literal(HeaderValue::String(value))) => Ok(value),
            _ => Err(SelectorError::new(offset, format!("expected {what}"))),
        }
    }
}

fn compile_like(pattern: &str, escape: Option<char>) -> Vec<LikeToken> {
    let mut compiled = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if Some(c) == escape {
            if let Some(escaped) = chars.next() {
                compiled.push(LikeToken::Literal(escaped));
            }
            continue;
        }
        compiled.push(match c {
            '%' => LikeToken::AnySequence,
            '_' => LikeToken::AnyChar,
            other => LikeToken::Literal(other),
        });
    }
    compiled
}

/// Greedy wildcard match. Only the most recent `%` is ever retried, so the
/// work is bounded by text length times pattern length.
fn like_matches(text: &[char], pattern: &[LikeToken]) -> bool {
    let (mut t, mut p) = (0, 0);
    let mut retry: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(LikeToken::AnySequence) => {
                retry = Some((p, t));
                p += 1;
                continue;
            }
            Some(LikeToken::AnyChar) => {
                t += 1;
                p += 1;
                continue;
            }
            Some(LikeToken::Literal(expected)) if *expected == text[t] => {
                t += 1;
                p += 1;
                continue;
            }
            _ => {}
        }
        let Some((wildcard, start)) = retry else {
            return false;
        };
        retry = Some((wildcard, start + 1));
        p = wildcard + 1;
        t = start + 1;
    }
    pattern[p..]
        .iter()
        .all(|token| matches!(token, LikeToken::AnySequence))
}

fn truth(value: Option<HeaderValue>) -> Option<bool> {
    match value {
        Some(HeaderValue::Bool(value)) => Some(value),
        _ => None,
    }
}

fn order(left: &HeaderValue, right: &HeaderValue, op: CompareOp) -> Option<Ordering> {
    let equality_only = matches!(op, CompareOp::Eq | CompareOp::Ne);
    match (left, right) {
        (HeaderValue::Int(l), HeaderValue::Int(r)) => Some(l.cmp(r)),
        (HeaderValue::Int(l), HeaderValue::Float(r)) => (*l as f64).partial_cmp(r),
        (HeaderValue::Float(l), HeaderValue::Int(r)) => l.partial_cmp(&(*r as f64)),
        (HeaderValue::Float(l), HeaderValue::Float(r)) => l.partial_cmp(r),
        (HeaderValue::String(l), HeaderValue::String(r)) if equality_only => Some(l.cmp(r)),
        (HeaderValue::Bool(l), HeaderValue::Bool(r)) if equality_only => Some(l.cmp(r)),
        _ => None,
    }
}

fn compare(left: Option<HeaderValue>, op: CompareOp, right: Option<HeaderValue>) -> Option<bool> {
    let ordering = order(&left?, &right?, op)?;
    Some(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

impl Expr {
    fn evaluate(&self, headers: &HashMap<String, HeaderValue>) -> Option<HeaderValue> {
        match self {
            Expr::Literal(value) => Some(value.clone()),
            Expr::Null => None,
            Expr::Identifier(name) => headers.get(name).cloned(),
            Expr::Compare(left, op, right) => {
                compare(left.evaluate(headers), *op, right.evaluate(headers)).map(HeaderValue::Bool)
            }
            Expr::And(left, right) => {
                let left = truth(left.evaluate(headers));
                if left == Some(false) {
                    return Some(HeaderValue::Bool(false));
                }
                match (left, truth(right.evaluate(headers))) {
                    (_, Some(false)) => Some(HeaderValue::Bool(false)),
                    (Some(true), Some(true)) => Some(HeaderValue::Bool(true)),
                    _ => None,
                }
            }
            Expr::Or(left, right) => {
                let left = truth(left.evaluate(headers));
                if left == Some(true) {
                    return Some(HeaderValue::Bool(true));
                }
                match (left, truth(right.evaluate(headers))) {
                    (_, Some(true)) => Some(HeaderValue::Bool(true)),
                    (Some(false), Some(false)) => Some(HeaderValue::Bool(false)),
                    _ => None,
                }
            }
            Expr::Not(operand) => {
                truth(operand.evaluate(headers)).map(|value| HeaderValue::Bool(!value))
            }
            Expr::IsNull { operand, negated } => {
                Some(HeaderValue::Bool(operand.evaluate(headers).is_none() != *negated))
            }
            Expr::In {
                operand,
                values,
                negated,
            } => {
                let value = operand.evaluate(headers)?;
                let found = values.iter().any(|candidate| {
                    compare(Some(value.clone()), CompareOp::Eq, Some(candidate.clone()))
                        == Some(true)
                });
                Some(HeaderValue::Bool(found != *negated))
            }
            Expr::Like {
                operand,
                pattern,
                negated,
            } => match operand.evaluate(headers)? {
                HeaderValue::String(text) => {
                    let text: Vec<char> = text.chars().collect();
                    Some(HeaderValue::Bool(like_matches(&text, pattern) != *negated))
                }
                _ => None,
            },
            Expr::Between {
                operand,
                low,
                high,
                negated,
            } => {
                let value = operand.evaluate(headers);
                let above = compare(value.clone(), CompareOp::Ge, low.evaluate(headers))?;
                let below = compare(value, CompareOp::Le, high.evaluate(headers))?;
                Some(HeaderValue::Bool((above && below) != *negated))
            }
        }
    }
}
