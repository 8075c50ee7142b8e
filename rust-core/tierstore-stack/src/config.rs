// SPDX-License-Identifier: PMPL-1.0-or-later
//! Stack configuration.
//!
//! Defaults:
//! - default_lifespan_secs: 0 (never expires)
//! - maintenance_probability: 0.02
//! - lock_stripes: 64
//! - query_layer: lowest (the durable layer answers queries)

use serde::{Deserialize, Serialize};

use crate::error::StackError;

/// Which layer of a stack answers scans and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryLayer {
    /// Index 0, usually a cache. May miss records it never saw.
    Highest,
    /// The last layer, usually the durable source of truth.
    Lowest,
}

impl QueryLayer {
    /// Resolve to a layer index for a stack of `layers` layers.
    pub fn index(self, layers: usize) -> usize {
        match self {
            QueryLayer::Highest => 0,
            QueryLayer::Lowest => layers.saturating_sub(1),
        }
    }
}

/// Configuration shared by the stacks a catalog builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Lifespan applied to writes, in seconds. `0` never expires.
    pub default_lifespan_secs: u64,
    /// Chance that an incremental maintenance call escalates to a full run.
    pub maintenance_probability: f64,
    /// Seed for the escalation RNG. `None` seeds from entropy.
    pub maintenance_seed: Option<u64>,
    /// Number of per-identifier lock stripes.
    pub lock_stripes: usize,
    pub query_layer: QueryLayer,
}

impl StackConfig {
    /// Reject values that cannot work.
    pub fn validate(&self) -> Result<(), StackError> {
        if !(0.0..=1.0).contains(&self.maintenance_probability) {
            return Err(StackError::InvalidConfig(format!(
                "maintenance_probability must be within [0, 1], got {}",
                self.maintenance_probability
            )));
        }
        if self.lock_stripes == 0 {
            return Err(StackError::InvalidConfig(
                "lock_stripes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, StackError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StackError::InvalidConfig(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            default_lifespan_secs: 0,
            maintenance_probability: 0.02,
            maintenance_seed: None,
            lock_stripes: 64,
            query_layer: QueryLayer::Lowest,
        }
    }
}
