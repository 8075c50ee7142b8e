// SPDX-License-Identifier: PMPL-1.0-or-later
//! Stack error types.

use std::fmt;

use thiserror::Error;
use tierstore_query::QueryError;
use tierstore_storage::StorageError;

/// One member that failed during a fan-out across layers (or across the
/// maps of a single table).
#[derive(Debug)]
pub struct LayerFailure {
    /// Position of the failing member, `0` being the highest priority.
    pub layer: usize,
    /// Human-readable name of the failing member.
    pub name: String,
    pub cause: Box<StackError>,
}

impl LayerFailure {
    pub fn new(layer: usize, name: impl Into<String>, cause: StackError) -> Self {
        Self {
            layer,
            name: name.into(),
            cause: Box::new(cause),
        }
    }
}

impl fmt::Display for LayerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer {} ({}): {}", self.layer, self.name, self.cause)
    }
}

fn summarize(failures: &[LayerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by object tables, layered stacks and the catalog.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("schema violation in table '{table}', field '{field}': {reason}")]
    SchemaViolation {
        table: String,
        field: String,
        reason: String,
    },

    #[error("invalid table name '{name}': {reason}")]
    InvalidTableName { name: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error(
        "{operation} failed on {} of {attempted} layers: {}",
        .failures.len(),
        summarize(.failures)
    )]
    PartialLayerFailure {
        operation: String,
        attempted: usize,
        failures: Vec<LayerFailure>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StackError {
    /// Whether every underlying cause is a backend availability problem,
    /// i.e. the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            StackError::Storage(err) => err.is_unavailable(),
            StackError::PartialLayerFailure { failures, .. } => {
                !failures.is_empty() && failures.iter().all(|f| f.cause.is_retryable())
            }
            _ => false,
        }
    }

    /// Indices of the failed layers, if this is a fan-out failure.
    pub fn failed_layers(&self) -> Vec<usize> {
        match self {
            StackError::PartialLayerFailure { failures, .. } => {
                failures.iter().map(|f| f.layer).collect()
            }
            _ => Vec::new(),
        }
    }
}
