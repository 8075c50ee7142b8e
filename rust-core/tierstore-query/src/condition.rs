// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Condition trees.
//!
//! A [`Condition`] is an immutable predicate over a [`Record`]. Comparison
//! leaves name an argument key rather than a literal, so one compiled tree
//! can be evaluated many times against different [`ArgMap`]s.
//!
//! Evaluation never fails:
//!
//! - a comparison whose field or argument is missing is false;
//! - an empty `And` or `Or` is false;
//! - `And` stops at the first failing child, `Or` at the first passing one.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{normalize_field, Record};
use crate::value::FieldValue;

/// Comparison operator of a condition leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Case-insensitive pattern match with `%` and `_` wildcards.
    Like,
    /// Membership in a list argument.
    In,
}

impl Operator {
    /// Apply the operator to a field value and a bound argument.
    pub fn apply(self, value: &FieldValue, arg: &FieldValue) -> bool {
        match self {
            Operator::Eq => value.compare(arg) == Some(Ordering::Equal),
            Operator::Ne => value.compare(arg) != Some(Ordering::Equal),
            Operator::Lt => value.compare(arg) == Some(Ordering::Less),
            Operator::Le => matches!(
                value.compare(arg),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Gt => value.compare(arg) == Some(Ordering::Greater),
            Operator::Ge => matches!(
                value.compare(arg),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Like => match (value.as_text(), arg.as_text()) {
                (Some(text), Some(pattern)) => like_match(&text, &pattern),
                _ => false,
            },
            Operator::In => match arg {
                FieldValue::List(items) => items
                    .iter()
                    .any(|item| value.compare(item) == Some(Ordering::Equal)),
                single => value.compare(single) == Some(Ordering::Equal),
            },
        }
    }

    /// Operator text as written in a WHERE clause.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// SQL-style LIKE: `%` matches any run of characters, `_` exactly one.
/// Matching ignores ASCII and Unicode case.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();

    let (mut t, mut p) = (0usize, 0usize);
    // Position of the last `%` seen and the text index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

/// Bound argument values, keyed by the names condition leaves refer to.
///
/// Positional placeholders use the keys `"0"`, `"1"`, ...
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgMap(BTreeMap<String, FieldValue>);

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `values` to the positional keys `"0"`, `"1"`, ...
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.into()))
                .collect(),
        )
    }

    /// Builder-style binding of one key.
    pub fn bind(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for ArgMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// An immutable predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// `field <op> args[arg]`
    Compare {
        field: String,
        op: Operator,
        arg: String,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// A comparison leaf. The field name is normalised.
    pub fn compare(field: &str, op: Operator, arg: impl Into<String>) -> Self {
        Condition::Compare {
            field: normalize_field(field),
            op,
            arg: arg.into(),
        }
    }

    pub fn eq(field: &str, arg: impl Into<String>) -> Self {
        Self::compare(field, Operator::Eq, arg)
    }

    pub fn ne(field: &str, arg: impl Into<String>) -> Self {
        Self::compare(field, Operator::Ne, arg)
    }

    pub fn lt(field: &str, arg: impl Into<String>) -> Self {
        Self::compare(field, Operator::Lt, arg)
    }

    pub fn le(field: &str, arg: impl Into<String>) -> Self {
        Self::compare(field, Operator::Le, arg)
    }

    pub fn gt(field: &str, arg: impl Into<String>) -> Self {
        Self::compare(field, Operator::Gt, arg)
    }

    pub fn ge(field: &str, arg: impl Into<String>) -> Self {
        Self::compare(field, Operator::Ge, arg)
    }

    pub fn like(field: &str, arg: impl Into<String>) -> Self {
        Self::compare(field, Operator::Like, arg)
    }

    pub fn is_in(field: &str, arg: impl Into<String>) -> Self {
        Self::compare(field, Operator::In, arg)
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Condition::And(children)
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Condition) -> Self {
        Condition::Not(Box::new(child))
    }

    /// Evaluate the tree against `record` with the bound `args`.
    pub fn test(&self, record: &Record, args: &ArgMap) -> bool {
        match self {
            Condition::Compare { field, op, arg } => {
                match (record.field(field), args.get(arg)) {
                    (Some(value), Some(bound)) => op.apply(&value, bound),
                    _ => false,
                }
            }
            Condition::And(children) => {
                !children.is_empty() && children.iter().all(|c| c.test(record, args))
            }
            Condition::Or(children) => children.iter().any(|c| c.test(record, args)),
            Condition::Not(child) => !child.test(record, args),
        }
    }

    /// Every argument key referenced by a leaf, in first-use order.
    pub fn arg_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_arg_keys(&mut keys);
        keys
    }

    fn collect_arg_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Condition::Compare { arg, .. } => {
                if !keys.contains(&arg.as_str()) {
                    keys.push(arg);
                }
            }
            Condition::And(children) | Condition::Or(children) => {
                for child in children {
                    child.collect_arg_keys(keys);
                }
            }
            Condition::Not(child) => child.collect_arg_keys(keys),
        }
    }
}

/// Renders WHERE-clause text with named placeholders.
///
/// An empty `And`/`Or` renders as `()`, which the parser rejects: empty
/// combinators have no textual form and do not round-trip.
impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, children: &[Condition], sep: &str) -> fmt::Result {
            write!(f, "(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")
        }

        match self {
            Condition::Compare { field, op, arg } => write!(f, "{} {} :{}", field, op, arg),
            Condition::And(children) => join(f, children, "AND"),
            Condition::Or(children) => join(f, children, "OR"),
            Condition::Not(child) => write!(f, "NOT {}", child),
        }
    }
}
