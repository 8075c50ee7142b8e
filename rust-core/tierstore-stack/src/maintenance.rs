// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Lifecycle fan-out and the incremental maintenance policy.
//!
//! The [`MaintenanceCoordinator`] owns an ordered list of members and runs a
//! lifecycle verb on each of them in order. A failing member never stops the
//! members after it: every failure is collected and reported once, after the
//! last member has been attempted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tierstore_storage::{KeyValueBackend, StorageError};
use tracing::{info, warn};

use crate::config::StackConfig;
use crate::error::{LayerFailure, StackError};

/// A lifecycle verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOp {
    Setup,
    Teardown,
    Maintenance,
    IncrementalMaintenance,
    Clear,
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleOp::Setup => "setup",
            LifecycleOp::Teardown => "teardown",
            LifecycleOp::Maintenance => "maintenance",
            LifecycleOp::IncrementalMaintenance => "incremental maintenance",
            LifecycleOp::Clear => "clear",
        })
    }
}

/// Anything the coordinator can drive through its lifecycle.
#[async_trait]
pub trait Maintained: Send + Sync {
    /// Name used in logs and failure reports.
    fn label(&self) -> &str;

    async fn apply(&self, op: LifecycleOp) -> Result<(), StackError>;
}

#[async_trait]
impl Maintained for dyn KeyValueBackend + '_ {
    fn label(&self) -> &str {
        self.name()
    }

    async fn apply(&self, op: LifecycleOp) -> Result<(), StackError> {
        let result: Result<(), StorageError> = match op {
            LifecycleOp::Setup => self.setup().await,
            LifecycleOp::Teardown => self.teardown().await,
            LifecycleOp::Maintenance => self.maintenance().await,
            LifecycleOp::IncrementalMaintenance => self.incremental_maintenance().await,
            LifecycleOp::Clear => self.clear().await,
        };
        result.map_err(StackError::from)
    }
}

/// Runs lifecycle verbs over an ordered, exclusively owned member list.
pub struct MaintenanceCoordinator<T: ?Sized> {
    members: Vec<Arc<T>>,
}

impl<T: Maintained + ?Sized> MaintenanceCoordinator<T> {
    pub fn new(members: Vec<Arc<T>>) -> Self {
        Self { members }
    }

    /// Members in fan-out order.
    pub fn members(&self) -> &[Arc<T>] {
        &self.members
    }

    /// Apply `op` to every member in order.
    ///
    /// Returns `PartialLayerFailure` naming every member that failed.
    pub async fn run(&self, op: LifecycleOp) -> Result<(), StackError> {
        let mut failures = Vec::new();
        for (index, member) in self.members.iter().enumerate() {
            if let Err(err) = member.apply(op).await {
                warn!(member = member.label(), index, error = %err, "{} failed", op);
                failures.push(LayerFailure::new(index, member.label(), err));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StackError::PartialLayerFailure {
                operation: op.to_string(),
                attempted: self.members.len(),
                failures,
            })
        }
    }
}

/// Decides when an incremental maintenance call escalates to a full run.
///
/// The RNG is injectable through a seed so the decision sequence is
/// reproducible in tests.
pub struct IncrementalPolicy {
    probability: f64,
    rng: Mutex<StdRng>,
    escalations: AtomicU64,
}

impl IncrementalPolicy {
    /// Escalate with `probability` per call. Out-of-range values are clamped.
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self {
            probability,
            rng: Mutex::new(rng),
            escalations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &StackConfig) -> Self {
        Self::new(config.maintenance_probability, config.maintenance_seed)
    }

    /// Never escalate.
    pub fn never() -> Self {
        Self::new(0.0, Some(0))
    }

    /// Escalate on every call.
    pub fn always() -> Self {
        Self::new(1.0, Some(0))
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Draw once; `true` means run full maintenance now.
    pub fn should_escalate(&self) -> bool {
        let draw: f64 = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen()
        };
        let escalate = draw < self.probability;
        if escalate {
            self.escalations.fetch_add(1, Ordering::Relaxed);
        }
        escalate
    }

    /// How many draws have escalated so far.
    pub fn escalations(&self) -> u64 {
        self.escalations.load(Ordering::Relaxed)
    }
}

impl Default for IncrementalPolicy {
    fn default() -> Self {
        Self::from_config(&StackConfig::default())
    }
}

impl fmt::Debug for IncrementalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalPolicy")
            .field("probability", &self.probability)
            .field("escalations", &self.escalations())
            .finish()
    }
}

/// Run incremental upkeep through `coordinator`, escalating to a full
/// maintenance run when `policy` says so. Returns whether it escalated.
pub async fn run_incremental<T: Maintained + ?Sized>(
    coordinator: &MaintenanceCoordinator<T>,
    policy: &IncrementalPolicy,
) -> Result<bool, StackError> {
    if policy.should_escalate() {
        info!(members = coordinator.members().len(), "incremental maintenance escalated");
        coordinator.run(LifecycleOp::Maintenance).await?;
        Ok(true)
    } else {
        coordinator.run(LifecycleOp::IncrementalMaintenance).await?;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Probe {
        name: String,
        fail_on: Option<LifecycleOp>,
        calls: AtomicUsize,
    }

    impl Probe {
        fn new(name: &str, fail_on: Option<LifecycleOp>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail_on,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Maintained for Probe {
        fn label(&self) -> &str {
            &self.name
        }

        async fn apply(&self, op: LifecycleOp) -> Result<(), StackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(op) {
                Err(StackError::Storage(StorageError::BackendUnavailable(
                    self.name.clone(),
                )))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_members() {
        let top = Probe::new("cache", Some(LifecycleOp::Teardown));
        let bottom = Probe::new("durable", None);
        let coordinator = MaintenanceCoordinator::new(vec![top.clone(), bottom.clone()]);

        let err = coordinator.run(LifecycleOp::Teardown).await.unwrap_err();
        assert_eq!(top.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bottom.calls.load(Ordering::SeqCst), 1);
        match err {
            StackError::PartialLayerFailure {
                operation,
                attempted,
                failures,
            } => {
                assert_eq!(operation, "teardown");
                assert_eq!(attempted, 2);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].layer, 0);
                assert_eq!(failures[0].name, "cache");
            }
            other => panic!("expected PartialLayerFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_failures_aggregated() {
        let a = Probe::new("a", Some(LifecycleOp::Clear));
        let b = Probe::new("b", Some(LifecycleOp::Clear));
        let coordinator = MaintenanceCoordinator::new(vec![a, b]);
        let err = coordinator.run(LifecycleOp::Clear).await.unwrap_err();
        assert_eq!(err.failed_layers(), vec![0, 1]);
        assert!(err.is_retryable());
        assert!(coordinator.run(LifecycleOp::Setup).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_incremental_escalation() {
        let member = Probe::new("m", Some(LifecycleOp::Maintenance));
        let coordinator = MaintenanceCoordinator::new(vec![member]);

        assert!(!run_incremental(&coordinator, &IncrementalPolicy::never()).await.unwrap());
        // Escalation runs full maintenance, which this member rejects.
        assert!(run_incremental(&coordinator, &IncrementalPolicy::always()).await.is_err());
    }

    #[test]
    fn test_seeded_policy_is_reproducible() {
        let a = IncrementalPolicy::new(0.3, Some(42));
        let b = IncrementalPolicy::new(0.3, Some(42));
        let draws_a: Vec<bool> = (0..200).map(|_| a.should_escalate()).collect();
        let draws_b: Vec<bool> = (0..200).map(|_| b.should_escalate()).collect();
        assert_eq!(draws_a, draws_b);
        assert_eq!(a.escalations(), draws_a.iter().filter(|d| **d).count() as u64);
    }

    #[test]
    fn test_probability_clamped() {
        assert_eq!(IncrementalPolicy::new(2.0, Some(1)).probability(), 1.0);
        assert_eq!(IncrementalPolicy::new(-1.0, Some(1)).probability(), 0.0);
        assert_eq!(IncrementalPolicy::new(f64::NAN, Some(1)).probability(), 0.0);
        let never = IncrementalPolicy::never();
        assert!((0..1000).all(|_| !never.should_escalate()));
        let always = IncrementalPolicy::always();
        assert!((0..1000).all(|_| always.should_escalate()));
    }
}
