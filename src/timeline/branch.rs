//! Per-diff timeline storage.
//!
//! A branch owns an arena of [`TimelineNode`]s. Each registered entity has
//! a doubly linked chain of nodes in date order, entered through its
//! endpoint (the latest node). Nodes removed by a merge leave a `None` slot
//! so indices held elsewhere never shift.

use std::collections::HashMap;

use crate::error::{TimelineError, TimelineResult};
use crate::object::EntityId;
use crate::state::StateVector;
use crate::time::Tick;
use crate::universe::{Diff, DiffId};

use super::node::{NodeIndex, TimelineNode};

/// The mutable timeline store of one diff.
#[derive(Debug, Clone)]
pub struct Branch {
    diff: Diff,
    nodes: Vec<Option<TimelineNode>>,
    endpoints: HashMap<EntityId, NodeIndex>,
}

impl Branch {
    pub(crate) fn new(diff: Diff) -> Self {
        Self {
            diff,
            nodes: Vec::new(),
            endpoints: HashMap::new(),
        }
    }

    /// The diff this branch materialises.
    #[must_use]
    pub const fn diff(&self) -> &Diff {
        &self.diff
    }

    /// Id of the branch's diff.
    #[must_use]
    pub const fn id(&self) -> DiffId {
        self.diff.id()
    }

    /// Branch point. Dates before it are shared with the parent branch.
    #[must_use]
    pub const fn date(&self) -> Tick {
        self.diff.date()
    }

    /// Parent branch; `None` for the root.
    #[must_use]
    pub const fn parent(&self) -> Option<DiffId> {
        self.diff.parent()
    }

    /// Whether `entity` has a chain on this branch.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.endpoints.contains_key(&entity)
    }

    /// Latest node of `entity` on this branch.
    #[must_use]
    pub fn endpoint(&self, entity: EntityId) -> Option<NodeIndex> {
        self.endpoints.get(&entity).copied()
    }

    /// Node at `index`, if it is live.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> Option<&TimelineNode> {
        self.nodes.get(index.0).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> Option<&mut TimelineNode> {
        self.nodes.get_mut(index.0).and_then(Option::as_mut)
    }

    fn get(&self, index: NodeIndex) -> TimelineResult<&TimelineNode> {
        self.node(index)
            .ok_or_else(|| TimelineError::internal(format!("dangling node {} on branch {}", index.0, self.id())))
    }

    fn get_mut(&mut self, index: NodeIndex) -> TimelineResult<&mut TimelineNode> {
        let id = self.id();
        self.node_mut(index)
            .ok_or_else(|| TimelineError::internal(format!("dangling node {} on branch {id}", index.0)))
    }

    /// Starts `entity`'s chain with a wildcard node at date 0.
    ///
    /// On a non-root branch the node is an inheritance marker. Does nothing
    /// if the entity already has a chain.
    pub(crate) fn register(&mut self, entity: EntityId, states: usize) -> NodeIndex {
        if let Some(existing) = self.endpoint(entity) {
            return existing;
        }
        let mut node = TimelineNode::new(0, StateVector::wildcard(states));
        node.inherit = !self.diff.is_root();

        let index = NodeIndex(self.nodes.len());
        self.nodes.push(Some(node));
        self.endpoints.insert(entity, index);
        index
    }

    /// The node with the latest start at or before `date`.
    #[must_use]
    pub fn node_at_or_before(&self, date: Tick, entity: EntityId) -> Option<NodeIndex> {
        let mut current = self.endpoint(entity);
        while let Some(index) = current {
            let node = self.node(index)?;
            if node.start <= date {
                return Some(index);
            }
            current = node.previous;
        }
        None
    }

    /// The earliest own node starting strictly after `date`.
    #[must_use]
    pub fn node_after(&self, date: Tick, entity: EntityId) -> Option<NodeIndex> {
        let mut found = None;
        let mut current = self.endpoint(entity);
        while let Some(index) = current {
            let node = self.node(index)?;
            if node.start <= date {
                break;
            }
            if !node.inherit {
                found = Some(index);
            }
            current = node.previous;
        }
        found
    }

    /// `entity`'s chain in date order.
    #[must_use]
    pub fn chain(&self, entity: EntityId) -> Vec<NodeIndex> {
        let mut chain = Vec::new();
        let mut current = self.endpoint(entity);
        while let Some(index) = current {
            let Some(node) = self.node(index) else { break };
            chain.push(index);
            current = node.previous;
        }
        chain.reverse();
        chain
    }

    /// Records `vector` for `entity` at `date` and returns the node now
    /// covering it.
    ///
    /// A date that is already covered is left untouched. Otherwise the
    /// one-tick segment is merged into a contiguous neighbour holding an
    /// identical vector, joining both neighbours when it fills the gap
    /// between them, or spliced in as a new node.
    ///
    /// # Errors
    ///
    /// `Internal` if the entity has no chain on this branch.
    pub fn insert_state(&mut self, date: Tick, entity: EntityId, vector: StateVector) -> TimelineResult<NodeIndex> {
        let at = self.node_at_or_before(date, entity).ok_or_else(|| {
            TimelineError::internal(format!("entity {entity} has no chain on branch {}", self.id()))
        })?;

        let (prev_end, prev_mergeable, next) = {
            let prev = self.get(at)?;
            (prev.end(), !prev.inherit && prev.vector == vector, prev.next)
        };
        if date < prev_end {
            return Ok(at);
        }

        let extend_prev = prev_end == date && prev_mergeable;
        let next_mergeable = match next {
            Some(next) => {
                let node = self.get(next)?;
                node.start == date.saturating_add(1) && node.vector == vector
            }
            None => false,
        };

        match (extend_prev, next.filter(|_| next_mergeable)) {
            (true, Some(next)) => {
                self.join(at, next, entity)?;
                tracing::trace!(entity = %entity, date, "joined neighbouring segments");
                Ok(at)
            }
            (true, None) => {
                self.get_mut(at)?.length += 1;
                Ok(at)
            }
            (false, Some(next)) => {
                let node = self.get_mut(next)?;
                node.start = date;
                node.length += 1;
                self.rehome(at, next, date)?;
                Ok(next)
            }
            (false, None) => {
                let index = NodeIndex(self.nodes.len());
                let mut node = TimelineNode::new(date, vector);
                node.previous = Some(at);
                node.next = next;
                self.nodes.push(Some(node));

                self.get_mut(at)?.next = Some(index);
                match next {
                    Some(next) => self.get_mut(next)?.previous = Some(index),
                    None => {
                        self.endpoints.insert(entity, index);
                    }
                }
                self.rehome(at, index, date)?;
                Ok(index)
            }
        }
    }

    /// Folds `next` into `prev`, which becomes contiguous with it.
    fn join(&mut self, prev: NodeIndex, next: NodeIndex, entity: EntityId) -> TimelineResult<()> {
        let removed = self
            .nodes
            .get_mut(next.0)
            .and_then(Option::take)
            .ok_or_else(|| TimelineError::internal("join of a dangling node"))?;

        let node = self.get_mut(prev)?;
        node.length = removed.end() - node.start;
        node.next = removed.next;
        node.branched_nexts.extend(removed.branched_nexts);

        match removed.next {
            Some(after) => self.get_mut(after)?.previous = Some(prev),
            None => {
                self.endpoints.insert(entity, prev);
            }
        }
        Ok(())
    }

    /// Moves branch fan-out that now dangles after `date` from `from` to `to`.
    fn rehome(&mut self, from: NodeIndex, to: NodeIndex, date: Tick) -> TimelineResult<()> {
        let source = self.get_mut(from)?;
        let moved: Vec<_> = source.branched_nexts.iter().filter(|bn| bn.start > date).copied().collect();
        if moved.is_empty() {
            return Ok(());
        }
        source.branched_nexts.retain(|bn| bn.start <= date);
        self.get_mut(to)?.branched_nexts.extend(moved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::node::{BranchedNext, NodeRef};

    fn root() -> (Branch, EntityId) {
        let mut branch = Branch::new(Diff::root());
        let entity = EntityId::new();
        branch.register(entity, 2);
        (branch, entity)
    }

    fn a() -> StateVector {
        StateVector::from_definite_state(0, 2)
    }

    fn b() -> StateVector {
        StateVector::from_definite_state(1, 2)
    }

    fn segments(branch: &Branch, entity: EntityId) -> Vec<(Tick, Tick)> {
        branch
            .chain(entity)
            .into_iter()
            .map(|i| {
                let n = branch.node(i).unwrap();
                (n.start(), n.length())
            })
            .collect()
    }

    #[test]
    fn test_insert_splices_new_nodes() {
        let (mut branch, e) = root();
        branch.insert_state(10, e, a()).unwrap();
        branch.insert_state(5, e, b()).unwrap();
        assert_eq!(segments(&branch, e), vec![(0, 1), (5, 1), (10, 1)]);
        let endpoint = branch.endpoint(e).unwrap();
        assert_eq!(branch.node(endpoint).unwrap().start(), 10);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let (mut branch, e) = root();
        let first = branch.insert_state(10, e, a()).unwrap();
        let before = segments(&branch, e);
        let second = branch.insert_state(10, e, a()).unwrap();
        assert_eq!(first, second);
        assert_eq!(segments(&branch, e), before);

        // A covered date keeps its recorded state.
        branch.insert_state(10, e, b()).unwrap();
        assert_eq!(branch.node(first).unwrap().vector(), &a());
    }

    #[test]
    fn test_insert_extends_previous() {
        let (mut branch, e) = root();
        let n = branch.insert_state(10, e, a()).unwrap();
        assert_eq!(branch.insert_state(11, e, a()).unwrap(), n);
        assert_eq!(segments(&branch, e), vec![(0, 1), (10, 2)]);
    }

    #[test]
    fn test_insert_extends_next_backward() {
        let (mut branch, e) = root();
        let n = branch.insert_state(10, e, a()).unwrap();
        assert_eq!(branch.insert_state(9, e, a()).unwrap(), n);
        assert_eq!(segments(&branch, e), vec![(0, 1), (9, 2)]);
    }

    #[test]
    fn test_insert_joins_both_neighbours() {
        let (mut branch, e) = root();
        let left = branch.insert_state(10, e, a()).unwrap();
        branch.insert_state(12, e, a()).unwrap();
        branch.insert_state(13, e, a()).unwrap();
        assert_eq!(branch.insert_state(11, e, a()).unwrap(), left);
        assert_eq!(segments(&branch, e), vec![(0, 1), (10, 4)]);
        assert_eq!(branch.endpoint(e), Some(left));
    }

    #[test]
    fn test_different_values_are_not_merged() {
        let (mut branch, e) = root();
        branch.insert_state(10, e, a()).unwrap();
        branch.insert_state(11, e, b()).unwrap();
        assert_eq!(segments(&branch, e), vec![(0, 1), (10, 1), (11, 1)]);
    }

    #[test]
    fn test_lookup_walks_back() {
        let (mut branch, e) = root();
        let n10 = branch.insert_state(10, e, a()).unwrap();
        let n20 = branch.insert_state(20, e, b()).unwrap();
        assert_eq!(branch.node_at_or_before(15, e), Some(n10));
        assert_eq!(branch.node_at_or_before(20, e), Some(n20));
        assert_eq!(branch.node_after(10, e), Some(n20));
        assert_eq!(branch.node_after(20, e), None);
        assert_eq!(branch.node_at_or_before(5, EntityId::new()), None);
    }

    #[test]
    fn test_branched_nexts_follow_the_insertion_point() {
        let (mut branch, e) = root();
        let origin = branch.endpoint(e).unwrap();
        let target = NodeRef {
            branch: DiffId::ROOT,
            index: NodeIndex(99),
        };
        branch
            .node_mut(origin)
            .unwrap()
            .branched_nexts
            .insert(BranchedNext { start: 50, target });
        branch
            .node_mut(origin)
            .unwrap()
            .branched_nexts
            .insert(BranchedNext { start: 5, target });

        let n = branch.insert_state(20, e, a()).unwrap();
        let starts = |i: NodeIndex| {
            branch
                .node(i)
                .unwrap()
                .branched_nexts()
                .iter()
                .map(|bn| bn.start)
                .collect::<Vec<_>>()
        };
        assert_eq!(starts(origin), vec![5]);
        assert_eq!(starts(n), vec![50]);
    }

    #[test]
    fn test_inherit_marker_is_never_extended() {
        let diff = Diff::diverge(
            DiffId::ROOT,
            1,
            EntityId::new(),
            crate::state::Position::new(crate::schema::TypeIndex::new(0), 0),
            crate::object::SuperNodeId::ROOT,
        );
        let mut branch = Branch::new(diff);
        let e = EntityId::new();
        let marker = branch.register(e, 2);
        assert!(branch.node(marker).unwrap().is_inherit_marker());

        let n = branch.insert_state(1, e, StateVector::wildcard(2)).unwrap();
        assert_ne!(n, marker);
        assert_eq!(segments(&branch, e), vec![(0, 1), (1, 1)]);
    }
}
