//! Unique runtime identifiers for model objects
//!
//! Every project, target, configuration, step list, and step carries a
//! process-unique id handed out by a shared atomic counter. Scheduler
//! bookkeeping (queue entries, active-step counters, building queries) is
//! keyed by these ids, so no part of the engine relies on address identity
//! or holds references into the model across suspension points.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

fn next_uid() -> u64 {
    NEXT_UID.fetch_add(1, Ordering::Relaxed)
}

/// Unique id of a [`crate::core::project::Project`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectUid(u64);

/// Unique id of a [`crate::core::target::Target`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetUid(u64);

/// Unique id of a build, deploy, or run configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigUid(u64);

/// Unique id of a [`crate::core::steplist::BuildStepList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListUid(u64);

/// Unique id of a [`crate::core::step::BuildStep`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepUid(u64);

impl ProjectUid {
    pub fn fresh() -> Self {
        Self(next_uid())
    }
}

impl TargetUid {
    pub fn fresh() -> Self {
        Self(next_uid())
    }
}

impl ConfigUid {
    pub fn fresh() -> Self {
        Self(next_uid())
    }
}

impl ListUid {
    pub fn fresh() -> Self {
        Self(next_uid())
    }
}

impl StepUid {
    pub fn fresh() -> Self {
        Self(next_uid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uids_are_unique() {
        let a = StepUid::fresh();
        let b = StepUid::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn test_uid_equality_is_by_value() {
        let a = ProjectUid::fresh();
        let b = a;
        assert_eq!(a, b);
    }
}
