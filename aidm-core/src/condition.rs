//! Success conditions.
//!
//! A condition is a comparison over integer arithmetic with two bound names,
//! `total` and `requirement`, e.g. `total > requirement` or
//! `total * 2 >= requirement + 3`. Nothing else is accepted: no other names,
//! no calls, no boolean connectives.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error type for parsing or evaluating a success condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("Empty condition")]
    Empty,

    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unknown name '{0}'; only 'total' and 'requirement' are allowed")]
    UnknownName(String),

    #[error("Number too large: {0}")]
    NumberTooLarge(String),

    #[error("Unexpected '{found}' at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("Condition ends unexpectedly")]
    UnexpectedEnd,

    #[error("Condition must be a single comparison such as 'total > requirement'")]
    NotAComparison,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic overflow")]
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compare {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(i64),
    Total,
    Requirement,
    Arith(Arith),
    Compare(Compare),
    Open,
    Close,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::Number(n) => return write!(f, "{n}"),
            Token::Total => "total",
            Token::Requirement => "requirement",
            Token::Arith(Arith::Add) => "+",
            Token::Arith(Arith::Sub) => "-",
            Token::Arith(Arith::Mul) => "*",
            Token::Arith(Arith::Div) => "/",
            Token::Arith(Arith::Rem) => "%",
            Token::Compare(Compare::Gt) => ">",
            Token::Compare(Compare::Ge) => ">=",
            Token::Compare(Compare::Lt) => "<",
            Token::Compare(Compare::Le) => "<=",
            Token::Compare(Compare::Eq) => "==",
            Token::Compare(Compare::Ne) => "!=",
            Token::Open => "(",
            Token::Close => ")",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Number(i64),
    Total,
    Requirement,
    Negate(Box<Expr>),
    Binary(Arith, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, total: i64, requirement: i64) -> Result<i64, ConditionError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Total => Ok(total),
            Expr::Requirement => Ok(requirement),
            Expr::Negate(inner) => inner
                .eval(total, requirement)?
                .checked_neg()
                .ok_or(ConditionError::Overflow),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(total, requirement)?;
                let b = rhs.eval(total, requirement)?;
                match op {
                    Arith::Add => a.checked_add(b).ok_or(ConditionError::Overflow),
                    Arith::Sub => a.checked_sub(b).ok_or(ConditionError::Overflow),
                    Arith::Mul => a.checked_mul(b).ok_or(ConditionError::Overflow),
                    Arith::Div if b == 0 => Err(ConditionError::DivisionByZero),
                    Arith::Rem if b == 0 => Err(ConditionError::DivisionByZero),
                    Arith::Div => a.checked_div(b).ok_or(ConditionError::Overflow),
                    Arith::Rem => a.checked_rem(b).ok_or(ConditionError::Overflow),
                }
            }
        }
    }
}

/// A parsed success condition.
///
/// Serializes as its source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SuccessCondition {
    source: String,
    lhs: Expr,
    op: Compare,
    rhs: Expr,
}

impl SuccessCondition {
    /// Parse a condition such as `total > requirement`.
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let source = input.trim();
        if source.is_empty() {
            return Err(ConditionError::Empty);
        }

        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };

        let lhs = parser.sum()?;
        let op = match parser.next() {
            Some((Token::Compare(op), _)) => op,
            Some((found, pos)) => {
                return Err(ConditionError::UnexpectedToken {
                    found: found.to_string(),
                    pos,
                })
            }
            None => return Err(ConditionError::NotAComparison),
        };
        let rhs = parser.sum()?;

        if let Some((found, pos)) = parser.next() {
            return Err(match found {
                Token::Compare(_) => ConditionError::NotAComparison,
                other => ConditionError::UnexpectedToken {
                    found: other.to_string(),
                    pos,
                },
            });
        }

        Ok(Self {
            source: source.to_string(),
            lhs,
            op,
            rhs,
        })
    }

    /// Evaluate with the given bindings.
    pub fn evaluate(&self, total: i32, requirement: i32) -> Result<bool, ConditionError> {
        let total = i64::from(total);
        let requirement = i64::from(requirement);
        let a = self.lhs.eval(total, requirement)?;
        let b = self.rhs.eval(total, requirement)?;

        Ok(match self.op {
            Compare::Gt => a > b,
            Compare::Ge => a >= b,
            Compare::Lt => a < b,
            Compare::Le => a <= b,
            Compare::Eq => a == b,
            Compare::Ne => a != b,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for SuccessCondition {
    fn default() -> Self {
        Self {
            source: "total > requirement".to_string(),
            lhs: Expr::Total,
            op: Compare::Gt,
            rhs: Expr::Requirement,
        }
    }
}

impl fmt::Display for SuccessCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for SuccessCondition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SuccessCondition {
    type Error = ConditionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SuccessCondition> for String {
    fn from(value: SuccessCondition) -> Self {
        value.source
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let mut digits = String::new();
            while i < chars.len() && chars[i].is_ascii_digit() {
                digits.push(chars[i]);
                i += 1;
            }
            let n = digits
                .parse::<i64>()
                .map_err(|_| ConditionError::NumberTooLarge(digits.clone()))?;
            tokens.push((Token::Number(n), start));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut word = String::new();
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                word.push(chars[i]);
                i += 1;
            }
            let token = match word.as_str() {
                "total" => Token::Total,
                "requirement" => Token::Requirement,
                _ => return Err(ConditionError::UnknownName(word)),
            };
            tokens.push((token, start));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('>', Some('=')) => (Token::Compare(Compare::Ge), 2),
            ('<', Some('=')) => (Token::Compare(Compare::Le), 2),
            ('=', Some('=')) => (Token::Compare(Compare::Eq), 2),
            ('!', Some('=')) => (Token::Compare(Compare::Ne), 2),
            ('>', _) => (Token::Compare(Compare::Gt), 1),
            ('<', _) => (Token::Compare(Compare::Lt), 1),
            ('+', _) => (Token::Arith(Arith::Add), 1),
            ('-', _) => (Token::Arith(Arith::Sub), 1),
            ('*', _) => (Token::Arith(Arith::Mul), 1),
            ('/', _) => (Token::Arith(Arith::Div), 1),
            ('%', _) => (Token::Arith(Arith::Rem), 1),
            ('(', _) => (Token::Open, 1),
            (')', _) => (Token::Close, 1),
            _ => return Err(ConditionError::UnexpectedChar { ch: c, pos: start }),
        };
        tokens.push((token, start));
        i += width;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    // sum := product (('+' | '-') product)*
    fn sum(&mut self) -> Result<Expr, ConditionError> {
        let mut expr = self.product()?;
        while let Some(Token::Arith(op @ (Arith::Add | Arith::Sub))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.product()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    // product := unary (('*' | '/' | '%') unary)*
    fn product(&mut self) -> Result<Expr, ConditionError> {
        let mut expr = self.unary()?;
        while let Some(Token::Arith(op @ (Arith::Mul | Arith::Div | Arith::Rem))) =
            self.peek().cloned()
        {
            self.pos += 1;
            let rhs = self.unary()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        match self.peek() {
            Some(Token::Arith(Arith::Sub)) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Arith(Arith::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Expr, ConditionError> {
        match self.next() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::Total, _)) => Ok(Expr::Total),
            Some((Token::Requirement, _)) => Ok(Expr::Requirement),
            Some((Token::Open, _)) => {
                let inner = self.sum()?;
                match self.next() {
                    Some((Token::Close, _)) => Ok(inner),
                    Some((found, pos)) => Err(ConditionError::UnexpectedToken {
                        found: found.to_string(),
                        pos,
                    }),
                    None => Err(ConditionError::UnexpectedEnd),
                }
            }
            Some((found, pos)) => Err(ConditionError::UnexpectedToken {
                found: found.to_string(),
                pos,
            }),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str, total: i32, requirement: i32) -> Result<bool, ConditionError> {
        SuccessCondition::parse(expr)?.evaluate(total, requirement)
    }

    #[test]
    fn test_default_is_strictly_greater() {
        let cond = SuccessCondition::default();
        assert_eq!(cond.as_str(), "total > requirement");
        assert!(cond.evaluate(5, 4).unwrap());
        assert!(!cond.evaluate(4, 4).unwrap());
        assert_eq!(cond, SuccessCondition::parse("total > requirement").unwrap());
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert!(eval("total * 2 >= requirement + 3", 5, 7).unwrap());
        assert!(!eval("total * 2 >= requirement + 3", 4, 6).unwrap());
        assert!(eval("total - requirement * 2 == -3", 5, 4).unwrap());
        assert!(eval("(total - requirement) * 2 == 2", 5, 4).unwrap());
        assert!(eval("total % 2 != 0", 7, 0).unwrap());
        assert!(eval("-total < requirement", 3, 0).unwrap());
    }

    #[test]
    fn test_rejects_other_names() {
        assert_eq!(
            SuccessCondition::parse("__import__ > 0"),
            Err(ConditionError::UnknownName("__import__".into()))
        );
        assert_eq!(
            SuccessCondition::parse("hp > requirement"),
            Err(ConditionError::UnknownName("hp".into()))
        );
    }

    #[test]
    fn test_rejects_non_comparisons() {
        assert_eq!(
            SuccessCondition::parse("total + 1"),
            Err(ConditionError::NotAComparison)
        );
        assert_eq!(
            SuccessCondition::parse("total > 1 > 0"),
            Err(ConditionError::NotAComparison)
        );
        assert_eq!(SuccessCondition::parse("   "), Err(ConditionError::Empty));
        assert!(matches!(
            SuccessCondition::parse("total = requirement"),
            Err(ConditionError::UnexpectedChar { ch: '=', .. })
        ));
        assert_eq!(
            SuccessCondition::parse("(total > requirement"),
            Err(ConditionError::UnexpectedToken {
                found: ">".into(),
                pos: 7
            })
        );
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        assert_eq!(
            eval("total / requirement > 1", 4, 0),
            Err(ConditionError::DivisionByZero)
        );
        assert_eq!(
            eval("total % requirement > 1", 4, 0),
            Err(ConditionError::DivisionByZero)
        );
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert_eq!(
            eval("total * 9223372036854775807 > 0", 2, 0),
            Err(ConditionError::Overflow)
        );
    }

    #[test]
    fn test_serde_as_string() {
        let cond = SuccessCondition::parse("total >= requirement").unwrap();
        let json = serde_json::to_string(&cond).unwrap();
        assert_eq!(json, "\"total >= requirement\"");
        let back: SuccessCondition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cond);
        assert!(serde_json::from_str::<SuccessCondition>("\"open('x')\"").is_err());
    }
}
