// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! WHERE-clause text to [`Condition`] compiler.
//!
//! The accepted language is deliberately small: comparisons of a field
//! against a placeholder, combined with `AND`, `OR`, `NOT` and parentheses.
//! There are no literals. Values always arrive through an [`ArgMap`].
//!
//! ```text
//! expr       := or
//! or         := and ( OR and )*
//! and        := unary ( AND unary )*
//! unary      := NOT unary | '(' expr ')' | comparison
//! comparison := field op param | field IN '(' param ')'
//! op         := = | == | != | <> | < | <= | > | >= | LIKE | IN
//! param      := ? | :name
//! ```
//!
//! Positional `?` placeholders bind argument keys `"0"`, `"1"`, ... in order
//! of appearance.

use crate::condition::{ArgMap, Condition, Operator};
use crate::error::QueryError;
use crate::value::FieldValue;

/// Maximum nesting of parentheses and `NOT`.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Param(String),
    Op(Operator),
    LParen,
    RParen,
    And,
    Or,
    Not,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Param(key) => format!("parameter ':{}'", key),
            Token::Op(op) => format!("operator '{}'", op),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Not => "NOT".to_string(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']')
}

/// Split `input` into tokens with their byte offsets.
/// Returns the tokens and the number of positional placeholders.
fn tokenize(input: &str) -> Result<(Vec<(usize, Token)>, usize), QueryError> {
    let mut tokens = Vec::new();
    let mut positional = 0usize;
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match ch {
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            '?' => {
                chars.next();
                let key = positional.to_string();
                positional += 1;
                Token::Param(key)
            }
            ':' => {
                chars.next();
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(QueryError::parse(start, "expected parameter name after ':'"));
                }
                Token::Param(name)
            }
            '=' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                }
                Token::Op(Operator::Eq)
            }
            '!' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => Token::Op(Operator::Ne),
                    _ => return Err(QueryError::parse(start, "expected '=' after '!'")),
                }
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some((_, '=')) => {
                        chars.next();
                        Token::Op(Operator::Le)
                    }
                    Some((_, '>')) => {
                        chars.next();
                        Token::Op(Operator::Ne)
                    }
                    _ => Token::Op(Operator::Lt),
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    Token::Op(Operator::Ge)
                } else {
                    Token::Op(Operator::Gt)
                }
            }
            c if is_ident_char(c) => {
                if c.is_ascii_digit() {
                    return Err(QueryError::parse(
                        start,
                        "literals are not supported; bind values with '?' or ':name'",
                    ));
                }
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if is_ident_char(c) {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "LIKE" => Token::Op(Operator::Like),
                    "IN" => Token::Op(Operator::In),
                    _ => Token::Ident(word),
                }
            }
            other => {
                return Err(QueryError::parse(
                    start,
                    format!("unexpected character '{}'", other),
                ))
            }
        };
        tokens.push((start, token));
    }

    Ok((tokens, positional))
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self, expecting: &str) -> Result<(usize, Token), QueryError> {
        match self.tokens.get(self.pos) {
            Some((offset, token)) => {
                self.pos += 1;
                Ok((*offset, token.clone()))
            }
            None => Err(QueryError::UnexpectedEnd(format!("expected {}", expecting))),
        }
    }

    fn descend(&mut self, offset: usize) -> Result<(), QueryError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(QueryError::parse(
                offset,
                format!("nesting deeper than {} levels", MAX_DEPTH),
            ));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Condition, QueryError> {
        let mut children = vec![self.and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            children.push(self.and()?);
        }
        Ok(collapse(children, Condition::Or))
    }

    fn and(&mut self) -> Result<Condition, QueryError> {
        let mut children = vec![self.unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            children.push(self.unary()?);
        }
        Ok(collapse(children, Condition::And))
    }

    fn unary(&mut self) -> Result<Condition, QueryError> {
        let (offset, token) = self.next("a condition")?;
        match token {
            Token::Not => {
                self.descend(offset)?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(Condition::not(inner))
            }
            Token::LParen => {
                self.descend(offset)?;
                let inner = self.or()?;
                self.expect_rparen()?;
                self.depth -= 1;
                Ok(inner)
            }
            Token::Ident(field) => self.comparison(&field),
            other => Err(QueryError::parse(
                offset,
                format!("expected a field name, found {}", other.describe()),
            )),
        }
    }

    fn comparison(&mut self, field: &str) -> Result<Condition, QueryError> {
        let (offset, token) = self.next("an operator")?;
        let op = match token {
            Token::Op(op) => op,
            other => {
                return Err(QueryError::parse(
                    offset,
                    format!("expected an operator after '{}', found {}", field, other.describe()),
                ))
            }
        };

        let parenthesized = op == Operator::In && self.peek() == Some(&Token::LParen);
        if parenthesized {
            self.pos += 1;
        }
        let (offset, token) = self.next("a parameter")?;
        let arg = match token {
            Token::Param(key) => key,
            other => {
                return Err(QueryError::parse(
                    offset,
                    format!("expected '?' or ':name', found {}", other.describe()),
                ))
            }
        };
        if parenthesized {
            self.expect_rparen()?;
        }
        Ok(Condition::compare(field, op, arg))
    }

    fn expect_rparen(&mut self) -> Result<(), QueryError> {
        match self.next("')'")? {
            (_, Token::RParen) => Ok(()),
            (offset, other) => Err(QueryError::parse(
                offset,
                format!("expected ')', found {}", other.describe()),
            )),
        }
    }
}

fn collapse(mut children: Vec<Condition>, wrap: fn(Vec<Condition>) -> Condition) -> Condition {
    if children.len() == 1 {
        children.remove(0)
    } else {
        wrap(children)
    }
}

/// A parsed WHERE clause and the number of positional placeholders it uses.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub condition: Condition,
    pub positional: usize,
}

impl WhereClause {
    /// Parse WHERE-clause text.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let (tokens, positional) = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let condition = parser.or()?;
        if let Some((offset, token)) = parser.tokens.get(parser.pos) {
            return Err(QueryError::parse(
                *offset,
                format!("unexpected {}", token.describe()),
            ));
        }
        Ok(Self {
            condition,
            positional,
        })
    }

    /// Bind positional `args` to this clause's placeholders.
    pub fn bind(&self, args: &[FieldValue]) -> Result<ArgMap, QueryError> {
        if args.len() != self.positional {
            return Err(QueryError::ArgumentCount {
                expected: self.positional,
                got: args.len(),
            });
        }
        Ok(ArgMap::positional(args.iter().cloned()))
    }
}

/// Parse WHERE-clause text into a condition tree.
pub fn parse_where(input: &str) -> Result<Condition, QueryError> {
    WhereClause::parse(input).map(|clause| clause.condition)
}

/// Parse `input` and bind positional `args` in one step.
pub fn compile(input: &str, args: &[FieldValue]) -> Result<(Condition, ArgMap), QueryError> {
    let clause = WhereClause::parse(input)?;
    let bound = clause.bind(args)?;
    Ok((clause.condition, bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn test_parse_simple_comparison() {
        let cond = parse_where("num > ?").unwrap();
        assert_eq!(cond, Condition::gt("num", "0"));
    }

    #[test]
    fn test_positional_keys_in_order() {
        let clause = WhereClause::parse("num > ? AND num < ?").unwrap();
        assert_eq!(clause.positional, 2);
        assert_eq!(
            clause.condition,
            Condition::and(vec![Condition::gt("num", "0"), Condition::lt("num", "1")])
        );
    }

    #[test]
    fn test_operator_spellings() {
        for (text, op) in [
            ("a = ?", Operator::Eq),
            ("a == ?", Operator::Eq),
            ("a != ?", Operator::Ne),
            ("a <> ?", Operator::Ne),
            ("a <= ?", Operator::Le),
            ("a >= ?", Operator::Ge),
            ("a like ?", Operator::Like),
            ("a In ?", Operator::In),
            ("a IN (?)", Operator::In),
        ] {
            assert_eq!(parse_where(text).unwrap(), Condition::compare("a", op, "0"), "{}", text);
        }
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let cond = parse_where("a = :x OR b = :y AND c = :z").unwrap();
        assert_eq!(
            cond,
            Condition::or(vec![
                Condition::eq("a", "x"),
                Condition::and(vec![Condition::eq("b", "y"), Condition::eq("c", "z")]),
            ])
        );
    }

    #[test]
    fn test_not_and_parentheses() {
        let cond = parse_where("NOT (a = ? OR b = ?)").unwrap();
        assert_eq!(
            cond,
            Condition::not(Condition::or(vec![
                Condition::eq("a", "0"),
                Condition::eq("b", "1"),
            ]))
        );
    }

    #[test]
    fn test_bracketed_identifiers() {
        let cond = parse_where("num[0].val >= :min").unwrap();
        assert_eq!(cond, Condition::ge("num[0].val", "min"));
    }

    #[test]
    fn test_parse_errors_carry_offsets() {
        assert_eq!(
            parse_where("num > 3"),
            Err(QueryError::Parse {
                offset: 6,
                message: "literals are not supported; bind values with '?' or ':name'".into()
            })
        );
        assert!(matches!(parse_where("num ? ?"), Err(QueryError::Parse { offset: 4, .. })));
        assert!(matches!(parse_where("a = ? )"), Err(QueryError::Parse { offset: 6, .. })));
        assert!(matches!(parse_where("a = :"), Err(QueryError::Parse { offset: 4, .. })));
        assert!(matches!(parse_where("a ! ?"), Err(QueryError::Parse { offset: 2, .. })));
        assert!(matches!(parse_where("a = ? ;"), Err(QueryError::Parse { offset: 6, .. })));
    }

    #[test]
    fn test_unexpected_end() {
        assert!(matches!(parse_where(""), Err(QueryError::UnexpectedEnd(_))));
        assert!(matches!(parse_where("a >"), Err(QueryError::UnexpectedEnd(_))));
        assert!(matches!(parse_where("(a = ?"), Err(QueryError::UnexpectedEnd(_))));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}a = ?{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse_where(&deep), Err(QueryError::Parse { .. })));
        let ok = format!("{}a = ?{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse_where(&ok).is_ok());
    }

    #[test]
    fn test_compile_checks_argument_count() {
        let err = compile("a > ? AND b < ?", &[FieldValue::Integer(1)]).unwrap_err();
        assert_eq!(err, QueryError::ArgumentCount { expected: 2, got: 1 });

        let (cond, args) = compile(
            "num > ? AND num < ?",
            &[FieldValue::Integer(2), FieldValue::Integer(5)],
        )
        .unwrap();
        let record = Record::new("r").with("num", 3);
        assert!(cond.test(&record, &args));
    }

    #[test]
    fn test_display_reparses_to_same_tree() {
        let cond = parse_where("a > ? AND (b LIKE :p OR NOT c IN ?)").unwrap();
        let reparsed = parse_where(&cond.to_string()).unwrap();
        assert_eq!(cond, reparsed);
    }
}
