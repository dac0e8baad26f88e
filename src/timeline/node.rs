//! Timeline nodes: run-length segments of one entity's states on one branch.

use std::collections::BTreeSet;
use std::fmt;

use crate::state::StateVector;
use crate::time::Tick;
use crate::universe::DiffId;

/// Index of a node in its branch's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub(crate) usize);

impl NodeIndex {
    /// Arena slot of the node.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

/// Address of a node on any branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    /// Branch holding the node.
    pub branch: DiffId,
    /// Slot in that branch's arena.
    pub index: NodeIndex,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index.0, self.branch)
    }
}

/// A node on a descendant branch that continues this node's timeline
/// from `start` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchedNext {
    /// Date the descendant branch diverges.
    pub start: Tick,
    /// First node on the descendant branch.
    pub target: NodeRef,
}

/// A closed range `[start, start + length)` over which one entity's state
/// vector is constant.
#[derive(Debug, Clone)]
pub struct TimelineNode {
    pub(crate) start: Tick,
    pub(crate) length: Tick,
    pub(crate) vector: StateVector,
    pub(crate) previous: Option<NodeIndex>,
    pub(crate) next: Option<NodeIndex>,
    pub(crate) branched_nexts: BTreeSet<BranchedNext>,
    /// The date-0 placeholder of a non-root branch: lookups landing here
    /// continue in the parent branch. Never merged into.
    pub(crate) inherit: bool,
}

impl TimelineNode {
    pub(crate) fn new(start: Tick, vector: StateVector) -> Self {
        Self {
            start,
            length: 1,
            vector,
            previous: None,
            next: None,
            branched_nexts: BTreeSet::new(),
            inherit: false,
        }
    }

    /// First covered date.
    #[must_use]
    pub const fn start(&self) -> Tick {
        self.start
    }

    /// Number of covered dates.
    #[must_use]
    pub const fn length(&self) -> Tick {
        self.length
    }

    /// First date after the range.
    #[must_use]
    pub const fn end(&self) -> Tick {
        self.start.saturating_add(self.length)
    }

    /// Whether `date` falls inside the node.
    #[must_use]
    pub const fn covers(&self, date: Tick) -> bool {
        date >= self.start && date < self.end()
    }

    /// State over the covered range.
    #[must_use]
    pub const fn vector(&self) -> &StateVector {
        &self.vector
    }

    /// Preceding node on the same branch.
    #[must_use]
    pub const fn previous(&self) -> Option<NodeIndex> {
        self.previous
    }

    /// Following node on the same branch.
    #[must_use]
    pub const fn next(&self) -> Option<NodeIndex> {
        self.next
    }

    /// Nodes on descendant branches that diverge after this one.
    #[must_use]
    pub const fn branched_nexts(&self) -> &BTreeSet<BranchedNext> {
        &self.branched_nexts
    }

    /// Whether lookups landing here continue in the parent branch.
    #[must_use]
    pub const fn is_inherit_marker(&self) -> bool {
        self.inherit
    }
}
