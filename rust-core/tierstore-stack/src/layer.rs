// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! The capability a layered stack composes.

use async_trait::async_trait;
use tierstore_storage::KeyValueBackend;

use crate::error::StackError;
use crate::maintenance::Maintained;

/// One layer of a [`LayeredStack`](crate::stack::LayeredStack).
///
/// Object tables are layers over [`Record`](tierstore_query::Record)s; raw
/// backend maps are layers over bytes.
#[async_trait]
pub trait StackLayer: Maintained {
    type Value: Clone + Send + Sync + 'static;

    /// Read `id` together with its expiry timestamp
    /// ([`NEVER_EXPIRES`](tierstore_storage::NEVER_EXPIRES) when it lives
    /// until removed). A copy made from this value must not outlive it.
    async fn fetch(&self, id: &str) -> Result<Option<(Self::Value, i64)>, StackError>;

    /// Store `value` under `id`, replacing what was there.
    async fn store(&self, id: &str, value: &Self::Value, expiry: i64) -> Result<(), StackError>;

    /// Delete `id`. Returns whether anything was removed.
    async fn discard(&self, id: &str) -> Result<bool, StackError>;
}

#[async_trait]
impl StackLayer for dyn KeyValueBackend + '_ {
    type Value = Vec<u8>;

    async fn fetch(&self, id: &str) -> Result<Option<(Vec<u8>, i64)>, StackError> {
        let Some(value) = self.get(id).await? else {
            return Ok(None);
        };
        // An entry that expired between the two calls is a miss.
        Ok(self.get_expiry(id).await?.map(|expiry| (value, expiry)))
    }

    async fn store(&self, id: &str, value: &Vec<u8>, expiry: i64) -> Result<(), StackError> {
        self.put(id, value, expiry).await?;
        Ok(())
    }

    async fn discard(&self, id: &str) -> Result<bool, StackError> {
        Ok(self.remove(id).await?.is_some())
    }
}
