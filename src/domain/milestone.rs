//! Lifecycle milestones tracked for every pod in a cohort.
//!
//! The vocabulary is fixed: a pod is created, scheduled, initialized, gets
//! its containers ready, becomes ready and is eventually deleted. The order
//! reflects normal progression but is never enforced.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named lifecycle condition whose first-observed time is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// The pod was observed for the first time
    Created,

    /// The pod was bound to a node
    Scheduled,

    /// All init containers completed
    Initialized,

    /// All containers report ready
    ContainersReady,

    /// The pod is able to serve
    Ready,

    /// The pod was removed from the cluster
    Deleted,
}

impl Milestone {
    /// Every milestone, in lifecycle order
    pub const ALL: [Milestone; 6] = [
        Milestone::Created,
        Milestone::Scheduled,
        Milestone::Initialized,
        Milestone::ContainersReady,
        Milestone::Ready,
        Milestone::Deleted,
    ];

    /// Milestones reported through pod conditions, in emission order
    pub const CONDITIONS: [Milestone; 4] = [
        Milestone::Scheduled,
        Milestone::Initialized,
        Milestone::ContainersReady,
        Milestone::Ready,
    ];

    /// Dense index used for fixed-size per-milestone tables
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether this milestone is driven by a pod condition
    pub fn is_condition(self) -> bool {
        Self::CONDITIONS.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Milestone::Created => "Created",
            Milestone::Scheduled => "Scheduled",
            Milestone::Initialized => "Initialized",
            Milestone::ContainersReady => "ContainersReady",
            Milestone::Ready => "Ready",
            Milestone::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of condition milestones a notification reports as true
///
/// Only [`Milestone::CONDITIONS`] can be members; inserting `Created` or
/// `Deleted` is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Conditions {
    bits: u8,
}

impl Conditions {
    /// No condition is true
    pub fn none() -> Self {
        Self::default()
    }

    /// Every condition is true
    pub fn all() -> Self {
        Milestone::CONDITIONS.into_iter().collect()
    }

    /// Add a condition, returning the updated set
    pub fn with(mut self, milestone: Milestone) -> Self {
        self.insert(milestone);
        self
    }

    /// Add a condition; returns false if the milestone is not a condition
    pub fn insert(&mut self, milestone: Milestone) -> bool {
        if !milestone.is_condition() {
            return false;
        }
        self.bits |= 1 << milestone.index();
        true
    }

    pub fn contains(&self, milestone: Milestone) -> bool {
        self.bits & (1 << milestone.index()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// True conditions in emission order
    pub fn iter(&self) -> impl Iterator<Item = Milestone> + '_ {
        Milestone::CONDITIONS
            .into_iter()
            .filter(move |m| self.contains(*m))
    }
}

impl FromIterator<Milestone> for Conditions {
    fn from_iter<I: IntoIterator<Item = Milestone>>(iter: I) -> Self {
        let mut conditions = Self::none();
        for milestone in iter {
            conditions.insert(milestone);
        }
        conditions
    }
}
