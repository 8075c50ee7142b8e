// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Result ordering and offset/limit windowing.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::record::{normalize_field, Record};

/// One `field [ASC|DESC]` term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: normalize_field(field),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: normalize_field(field),
            descending: true,
        }
    }

    /// Records without the field sort before records with it.
    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ordering = match (a.field(&self.field), b.field(&self.field)) {
            (Some(x), Some(y)) => x.sort_cmp(&y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// A parsed ORDER BY clause, e.g. `"num ASC, str_val DESC"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderBy {
    pub keys: Vec<SortKey>,
}

impl OrderBy {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    /// Compare two records key by key.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.keys
            .iter()
            .map(|key| key.compare(a, b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Stable in-place sort.
    pub fn sort(&self, records: &mut [Record]) {
        if !self.keys.is_empty() {
            records.sort_by(|a, b| self.compare(a, b));
        }
    }
}

impl FromStr for OrderBy {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut keys = Vec::new();
        for term in s.split(',') {
            let mut words = term.split_whitespace();
            let field = words
                .next()
                .ok_or_else(|| QueryError::InvalidOrderBy(s.to_string()))?;
            let descending = match words.next().map(str::to_ascii_uppercase).as_deref() {
                None | Some("ASC") => false,
                Some("DESC") => true,
                Some(_) => return Err(QueryError::InvalidOrderBy(s.to_string())),
            };
            if words.next().is_some() {
                return Err(QueryError::InvalidOrderBy(s.to_string()));
            }
            keys.push(SortKey {
                field: normalize_field(field),
                descending,
            });
        }
        Ok(Self { keys })
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", key.field, if key.descending { "DESC" } else { "ASC" })?;
        }
        Ok(())
    }
}

/// Apply `offset` then `limit` (0 = unbounded).
pub fn window<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    let iter = items.into_iter().skip(offset);
    if limit == 0 {
        iter.collect()
    } else {
        iter.take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    fn records() -> Vec<Record> {
        vec![
            Record::new("a").with("num", 3).with("s", "x"),
            Record::new("b").with("num", 1).with("s", "y"),
            Record::new("c").with("s", "z"),
            Record::new("d").with("num", 3).with("s", "w"),
        ]
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_parse_order_by() {
        let order: OrderBy = "Num ASC, s desc".parse().unwrap();
        assert_eq!(order.keys, vec![SortKey::asc("num"), SortKey::desc("s")]);
        let order: OrderBy = "num".parse().unwrap();
        assert_eq!(order.keys, vec![SortKey::asc("num")]);
        assert_eq!(order.to_string(), "num ASC");
    }

    #[test]
    fn test_parse_order_by_errors() {
        assert!(matches!("".parse::<OrderBy>(), Err(QueryError::InvalidOrderBy(_))));
        assert!(matches!("num UP".parse::<OrderBy>(), Err(QueryError::InvalidOrderBy(_))));
        assert!(matches!("num,".parse::<OrderBy>(), Err(QueryError::InvalidOrderBy(_))));
        assert!(matches!(
            "num ASC extra".parse::<OrderBy>(),
            Err(QueryError::InvalidOrderBy(_))
        ));
    }

    #[test]
    fn test_missing_fields_sort_first_ascending() {
        let mut rs = records();
        OrderBy::new(vec![SortKey::asc("num")]).sort(&mut rs);
        assert_eq!(ids(&rs), vec!["c", "b", "a", "d"]);
    }

    #[test]
    fn test_descending_with_tie_break() {
        let mut rs = records();
        "num DESC, s ASC".parse::<OrderBy>().unwrap().sort(&mut rs);
        assert_eq!(ids(&rs), vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn test_sort_by_id_field() {
        let mut rs = records();
        "_oid DESC".parse::<OrderBy>().unwrap().sort(&mut rs);
        assert_eq!(ids(&rs), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_window() {
        let items: Vec<i32> = (1..=7).collect();
        assert_eq!(window(items.clone(), 2, 2), vec![3, 4]);
        assert_eq!(window(items.clone(), 5, 0), vec![6, 7]);
        assert_eq!(window(items.clone(), 0, 0), items);
        assert!(window(items, 10, 3).is_empty());
    }

    #[test]
    fn test_mixed_numeric_and_text_values_sort_without_panic() {
        let mut rs = vec![
            Record::new("1").with("v", "10"),
            Record::new("2").with("v", "abc"),
            Record::new("3").with("v", FieldValue::Float(2.5)),
        ];
        OrderBy::new(vec![SortKey::asc("v")]).sort(&mut rs);
        assert_eq!(ids(&rs), vec!["3", "1", "2"]);
    }
}
