// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for the TierStore backend adapters.
//
// A single enum covers every failure an adapter may report. Connectivity and
// I/O problems always surface as `BackendUnavailable` (or `Io`), never as a
// silent "absent" result.

use thiserror::Error;

/// Errors that can occur when interacting with a backend adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize a value.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The storage backend is not available (e.g., connection lost).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A map name could not be used by the adapter.
    #[error("invalid map name '{name}': {reason}")]
    InvalidMapName {
        /// The rejected name.
        name: String,
        /// Why the adapter rejected it.
        reason: String,
    },
}

impl StorageError {
    /// True for failures caused by the backend being unreachable, as opposed
    /// to bad data. Only these are worth retrying.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::BackendUnavailable(_) | StorageError::Io(_))
    }
}
