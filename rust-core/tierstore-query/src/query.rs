// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! A complete query: optional filter, bound arguments, ordering and window.

use crate::condition::{ArgMap, Condition};
use crate::error::QueryError;
use crate::order::{window, OrderBy};
use crate::parser::compile;
use crate::record::Record;
use crate::value::FieldValue;

/// Everything needed to select records from a scan.
///
/// ```rust
/// use tierstore_query::{FieldValue, Query};
///
/// let query = Query::parse("num > ?", &[FieldValue::Integer(2)])
///     .unwrap()
///     .order_by("num ASC")
///     .unwrap()
///     .offset(2)
///     .limit(2);
/// assert_eq!(query.limit, 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// `None` selects every record.
    pub condition: Option<Condition>,
    pub args: ArgMap,
    pub order: Option<OrderBy>,
    pub offset: usize,
    /// Maximum number of results; `0` means unbounded.
    pub limit: usize,
}

impl Query {
    /// Select every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter with a prebuilt tree and bound arguments.
    pub fn filter(condition: Condition, args: ArgMap) -> Self {
        Self {
            condition: Some(condition),
            args,
            ..Self::default()
        }
    }

    /// Compile WHERE-clause text with positional arguments.
    pub fn parse(where_clause: &str, args: &[FieldValue]) -> Result<Self, QueryError> {
        let (condition, args) = compile(where_clause, args)?;
        Ok(Self::filter(condition, args))
    }

    /// Parse and attach an ORDER BY clause.
    pub fn order_by(self, clause: &str) -> Result<Self, QueryError> {
        Ok(self.ordered(clause.parse()?))
    }

    pub fn ordered(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether `record` passes the filter.
    pub fn matches(&self, record: &Record) -> bool {
        match &self.condition {
            Some(condition) => condition.test(record, &self.args),
            None => true,
        }
    }

    /// Order the matched records, then apply offset and limit.
    pub fn finish(&self, mut records: Vec<Record>) -> Vec<Record> {
        if let Some(order) = &self.order {
            order.sort(&mut records);
        }
        window(records, self.offset, self.limit)
    }
}
