// SPDX-License-Identifier: PMPL-1.0-or-later
//! TierStore Query
//!
//! Typed records and the predicate trees used to filter them.
//! A condition is compiled once (from a builder or WHERE-clause text) and
//! evaluated many times against different bound arguments.

pub mod condition;
pub mod error;
pub mod order;
pub mod parser;
pub mod query;
pub mod record;
pub mod value;

pub use condition::{like_match, ArgMap, Condition, Operator};
pub use error::QueryError;
pub use order::{window, OrderBy, SortKey};
pub use parser::{compile, parse_where, WhereClause, MAX_DEPTH};
pub use query::Query;
pub use record::{normalize_field, Record, ID_FIELD};
pub use value::{FieldType, FieldValue};
