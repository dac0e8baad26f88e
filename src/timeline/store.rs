//! The branching timeline store.
//!
//! Every diff owns a [`Branch`]. What an entity looks like on a branch (its
//! *view*) is assembled from several chains:
//! - Dates before the branch point are shared with the parent branch.
//! - Entities outside the branch's affected scope that the branch never
//!   touched read and write the parent branch entirely.
//! - Affected entities start from an inheritance marker: a lookup that lands
//!   on it continues in the parent branch just before the branch point.
//!
//! Key invariants:
//! - A node found through the parent never appears to cover the branch
//!   point or anything after it.
//! - A future mask is the intersection over every timeline that shares the
//!   instant: the branch itself, its ancestors while the instant is shared,
//!   and the catalysts of branches fanning out after it.

use std::collections::{HashMap, HashSet};

use crate::error::{TimelineError, TimelineResult};
use crate::object::{EntityId, ObjectNode, ObjectTree};
use crate::schema::{EntityTypeSchema, SchemaTable};
use crate::state::{PossibilityMask, StateVector};
use crate::time::Tick;
use crate::universe::{Diff, DiffId};

use super::branch::Branch;
use super::node::{BranchedNext, NodeRef, TimelineNode};

/// Read-only collaborators of the timeline store.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    /// Compiled schemas.
    pub schemas: &'a SchemaTable,
    /// Registered entities and their links.
    pub objects: &'a ObjectTree,
}

impl<'a> Context<'a> {
    /// Bundles the collaborators.
    #[must_use]
    pub const fn new(schemas: &'a SchemaTable, objects: &'a ObjectTree) -> Self {
        Self { schemas, objects }
    }

    fn object(&self, entity: EntityId) -> TimelineResult<&'a ObjectNode> {
        self.objects
            .get(entity)
            .ok_or(TimelineError::UnknownEntity { id: entity })
    }

    fn schema_of(&self, entity: EntityId) -> TimelineResult<&'a EntityTypeSchema> {
        self.schemas.schema(self.object(entity)?.type_index())
    }
}

/// A node as seen from some branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    /// Where the node lives.
    pub node: NodeRef,
    /// First covered date.
    pub start: Tick,
    /// First date after the visible range.
    pub end: Tick,
    /// State over the visible range.
    pub vector: StateVector,
}

impl Located {
    fn new(node: NodeRef, timeline: &TimelineNode, clamp: Tick) -> Self {
        Self {
            node,
            start: timeline.start(),
            end: timeline.end().min(clamp),
            vector: timeline.vector().clone(),
        }
    }

    /// Whether `date` is inside the visible range.
    #[must_use]
    pub const fn covers(&self, date: Tick) -> bool {
        date >= self.start && date < self.end
    }

    /// Ticks of transition between the last date known here and `date`.
    /// Never less than one for a positive `date`.
    #[must_use]
    pub fn steps_until(&self, date: Tick) -> Tick {
        let last_known = self.end.saturating_sub(1);
        date.saturating_sub(last_known.min(date.saturating_sub(1)))
    }
}

/// Every branch of one timeline tree, keyed by diff.
#[derive(Debug, Clone)]
pub struct UniverseTree {
    branches: HashMap<DiffId, Branch>,
}

impl Default for UniverseTree {
    fn default() -> Self {
        Self::new()
    }
}

impl UniverseTree {
    /// A tree holding only the root branch.
    #[must_use]
    pub fn new() -> Self {
        let mut branches = HashMap::new();
        branches.insert(DiffId::ROOT, Branch::new(Diff::root()));
        Self { branches }
    }

    /// The branch of diff `id`.
    #[must_use]
    pub fn branch(&self, id: DiffId) -> Option<&Branch> {
        self.branches.get(&id)
    }

    /// Whether diff `id` has a branch.
    #[must_use]
    pub fn contains(&self, id: DiffId) -> bool {
        self.branches.contains_key(&id)
    }

    /// Number of branches, the root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Always false; the root branch exists from the start.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Resolves a node reference.
    #[must_use]
    pub fn node(&self, node: NodeRef) -> Option<&TimelineNode> {
        self.branches.get(&node.branch)?.node(node.index)
    }

    fn get(&self, id: DiffId) -> TimelineResult<&Branch> {
        self.branches.get(&id).ok_or(TimelineError::UnknownDiff { id })
    }

    fn get_mut(&mut self, id: DiffId) -> TimelineResult<&mut Branch> {
        self.branches.get_mut(&id).ok_or(TimelineError::UnknownDiff { id })
    }

    fn affects(ctx: Context<'_>, branch: &Branch, entity: EntityId) -> bool {
        branch.diff().is_root() || ctx.objects.is_affected_by(entity, branch.diff().affected())
    }

    /// Whether `branch` hands `entity` to its parent at every date.
    fn passes_through(ctx: Context<'_>, branch: &Branch, entity: EntityId) -> bool {
        branch.parent().is_some() && !branch.contains(entity) && !Self::affects(ctx, branch, entity)
    }

    fn ensure_registered(&mut self, ctx: Context<'_>, id: DiffId, entity: EntityId) -> TimelineResult<()> {
        let states = ctx.schema_of(entity)?.state_count();
        self.get_mut(id)?.register(entity, states);
        if id != DiffId::ROOT {
            self.get_mut(DiffId::ROOT)?.register(entity, states);
        }
        Ok(())
    }

    /// The known node at or before `date` in `id`'s view of `entity`.
    ///
    /// # Errors
    ///
    /// `UnknownDiff` if a branch on the way is missing.
    pub fn locate(&self, ctx: Context<'_>, id: DiffId, date: Tick, entity: EntityId) -> TimelineResult<Option<Located>> {
        let mut id = id;
        let mut date = date;
        let mut clamp = Tick::MAX;

        loop {
            let branch = self.get(id)?;
            let Some(parent) = branch.parent() else {
                return Ok(branch.node_at_or_before(date, entity).and_then(|index| {
                    branch
                        .node(index)
                        .map(|node| Located::new(NodeRef { branch: id, index }, node, clamp))
                }));
            };

            if Self::passes_through(ctx, branch, entity) {
                id = parent;
                continue;
            }

            let inherited = date < branch.date() || !branch.contains(entity);
            let own = if inherited {
                None
            } else {
                branch
                    .node_at_or_before(date, entity)
                    .and_then(|index| branch.node(index).map(|node| (index, node)))
            };

            match own {
                Some((index, node)) if !node.is_inherit_marker() => {
                    return Ok(Some(Located::new(NodeRef { branch: id, index }, node, clamp)));
                }
                _ => {
                    clamp = clamp.min(branch.date());
                    date = date.min(branch.date().saturating_sub(1));
                    id = parent;
                }
            }
        }
    }

    /// The earliest known node strictly after `date` in `id`'s view.
    fn next_known(&self, ctx: Context<'_>, id: DiffId, date: Tick, entity: EntityId) -> TimelineResult<Option<Located>> {
        let branch = self.get(id)?;
        if let Some(parent) = branch.parent() {
            if Self::passes_through(ctx, branch, entity) {
                return self.next_known(ctx, parent, date, entity);
            }
            if date < branch.date() {
                if let Some(found) = self.next_known(ctx, parent, date, entity)? {
                    if found.start < branch.date() {
                        return Ok(Some(found));
                    }
                }
            }
        }

        Ok(branch.node_after(date, entity).and_then(|index| {
            branch
                .node(index)
                .map(|node| Located::new(NodeRef { branch: id, index }, node, Tick::MAX))
        }))
    }

    /// The recorded vector at or before `date`; a lookup, not a forecast.
    ///
    /// `None` if nothing is known about `entity` in this view.
    pub fn state_at_or_before(
        &self,
        ctx: Context<'_>,
        id: DiffId,
        date: Tick,
        entity: EntityId,
    ) -> TimelineResult<Option<StateVector>> {
        Ok(self.locate(ctx, id, date, entity)?.map(|located| located.vector))
    }

    /// The branch whose chain stores `entity` at `date` in `id`'s view.
    fn owner(&self, ctx: Context<'_>, id: DiffId, date: Tick, entity: EntityId) -> TimelineResult<DiffId> {
        let mut id = id;
        loop {
            let branch = self.get(id)?;
            match branch.parent() {
                Some(parent) if date < branch.date() || Self::passes_through(ctx, branch, entity) => id = parent,
                _ => return Ok(id),
            }
        }
    }

    /// Records `vector` for `entity` at `date` and returns the vector now
    /// known there, which differs from `vector` if the date was covered.
    ///
    /// Dates before the branch point, and entities the branch does not
    /// affect, are written to the parent branch.
    pub fn insert_state(
        &mut self,
        ctx: Context<'_>,
        id: DiffId,
        date: Tick,
        entity: EntityId,
        vector: StateVector,
    ) -> TimelineResult<StateVector> {
        let owner = self.owner(ctx, id, date, entity)?;
        self.ensure_registered(ctx, owner, entity)?;

        let branch = self.get_mut(owner)?;
        let index = branch.insert_state(date, entity, vector)?;
        branch
            .node(index)
            .map(|node| node.vector().clone())
            .ok_or_else(|| TimelineError::internal("inserted node vanished"))
    }

    fn backward(schema: &EntityTypeSchema, vector: &StateVector, steps: Tick) -> PossibilityMask {
        PossibilityMask::from_vector(vector).project_backward_steps(schema, steps)
    }

    /// States at `date` that can still reach every known future state.
    ///
    /// Fully open when nothing is known after `date`.
    pub fn future_mask(
        &self,
        ctx: Context<'_>,
        id: DiffId,
        date: Tick,
        entity: EntityId,
    ) -> TimelineResult<PossibilityMask> {
        let schema = ctx.schema_of(entity)?;
        let mut mask = PossibilityMask::full(schema.state_count());
        let mut current = id;

        loop {
            let branch = self.get(current)?;

            if let Some(next) = self.next_known(ctx, current, date, entity)? {
                mask.and(&Self::backward(schema, &next.vector, next.start - date));
            }

            for index in branch.chain(entity) {
                let Some(node) = branch.node(index) else { continue };
                for fan_out in node.branched_nexts().iter().filter(|bn| bn.start > date) {
                    if let Some(target) = self.node(fan_out.target) {
                        mask.and(&Self::backward(schema, target.vector(), fan_out.start - date));
                    }
                }
            }

            match branch.parent() {
                Some(parent) if date < branch.date() || !Self::affects(ctx, branch, entity) => current = parent,
                _ => break,
            }
        }

        Ok(mask)
    }

    /// Balanced distribution over the states compatible with both the
    /// preceding known state and the known future.
    ///
    /// The recovery path for degenerate forecasts. Loosens to the future
    /// alone, then to every state, rather than fail.
    pub fn guess(&self, ctx: Context<'_>, id: DiffId, date: Tick, entity: EntityId) -> TimelineResult<StateVector> {
        let schema = ctx.schema_of(entity)?;
        let future = self.future_mask(ctx, id, date, entity)?;

        let mut mask = future.clone();
        if let Some(previous) = self.locate(ctx, id, date, entity)? {
            let reachable = PossibilityMask::from_vector(&previous.vector)
                .project_forward_steps(schema, previous.steps_until(date));
            mask.and(&reachable);
        }

        Ok(mask
            .balanced()
            .or_else(|| future.balanced())
            .unwrap_or_else(|| StateVector::balanced(schema.state_count())))
    }

    /// Forecasts `entity` at `date`.
    ///
    /// A known date returns its recorded vector. Otherwise the preceding
    /// known state is advanced over the gap, averaged with the translated
    /// forecasts of the parent and of every lateral partner, and masked
    /// against the known future. A degenerate mask falls back to
    /// [`Self::guess`].
    pub fn forecast(&mut self, ctx: Context<'_>, id: DiffId, date: Tick, entity: EntityId) -> TimelineResult<StateVector> {
        let mut visiting = HashSet::new();
        self.forecast_from(ctx, id, date, entity, &mut visiting)
    }

    fn forecast_from(
        &mut self,
        ctx: Context<'_>,
        id: DiffId,
        date: Tick,
        entity: EntityId,
        visiting: &mut HashSet<EntityId>,
    ) -> TimelineResult<StateVector> {
        visiting.insert(entity);
        let schema = ctx.schema_of(entity)?;
        let object = ctx.object(entity)?;

        let mut id = id;
        loop {
            let branch = self.get(id)?;
            match branch.parent() {
                Some(parent) if Self::passes_through(ctx, branch, entity) => {
                    tracing::trace!(entity = %entity, branch = %id, "forecast delegated to parent branch");
                    id = parent;
                }
                _ => break,
            }
        }
        self.ensure_registered(ctx, id, entity)?;

        let previous = self
            .locate(ctx, id, date, entity)?
            .ok_or_else(|| TimelineError::internal(format!("entity {entity} has no root chain")))?;
        if previous.covers(date) {
            return Ok(previous.vector);
        }

        let mut contributions = vec![previous.vector.transition(schema, previous.steps_until(date))];

        if let (Some(parent), Some(key)) = (object.parent(), schema.parent_key()) {
            if let Some(relation) = schema.relation(key) {
                if !visiting.contains(&parent) {
                    let forecast = self.forecast_from(ctx, id, date, parent, visiting)?;
                    contributions.push(forecast.translate(relation.translation()));
                }
            }
        }

        for link in object.laterals() {
            let Some(relation) = schema.relation(&link.key) else { continue };
            if visiting.contains(&link.partner) || ctx.object(link.partner)?.type_index() != relation.related() {
                continue;
            }
            let forecast = self.forecast_from(ctx, id, date, link.partner, visiting)?;
            contributions.push(forecast.translate(relation.translation()));
        }

        let combined = StateVector::average(&contributions)
            .ok_or_else(|| TimelineError::internal("forecast without contributions"))?;
        let mask = self.future_mask(ctx, id, date, entity)?;

        match combined.masked(&mask) {
            Ok(vector) => Ok(vector),
            Err(err) => {
                tracing::debug!(entity = %entity, date, error = %err, "degenerate forecast, guessing");
                self.guess(ctx, id, date, entity)
            }
        }
    }

    /// Materialises the branch of a diff produced by an assertion.
    ///
    /// The catalysing state is recorded at the diff date on the new branch,
    /// and the node preceding the divergence in the parent's view gains a
    /// branched next pointing at it. Creating an existing branch does
    /// nothing.
    ///
    /// # Errors
    ///
    /// `UnknownDiff` if the parent branch is missing, `UnknownEntity` if the
    /// catalyst is not registered, `PositionTypeMismatch` or `UnknownState`
    /// if the catalysing state does not belong to the catalyst's type, and
    /// `InvalidAssertion` for a diff dated at the root epoch.
    pub fn create_branch(&mut self, ctx: Context<'_>, diff: &Diff) -> TimelineResult<()> {
        if self.branches.contains_key(&diff.id()) {
            return Ok(());
        }
        let (Some(parent), Some(catalyst), Some(state)) = (diff.parent(), diff.catalyst(), diff.catalyzing_state())
        else {
            return Err(TimelineError::internal("the root branch cannot be created twice"));
        };
        self.get(parent)?;
        if diff.date() == 0 {
            return Err(TimelineError::InvalidAssertion { date: 0 });
        }
        let type_index = ctx.object(catalyst)?.type_index();
        let schema = ctx.schemas.schema(type_index)?;
        if state.type_index() != type_index {
            let position_type = ctx
                .schemas
                .get(state.type_index())
                .map_or_else(|| state.type_index().to_string(), |s| s.name().to_string());
            return Err(TimelineError::PositionTypeMismatch {
                position_type,
                entity_type: schema.name().to_string(),
            });
        }
        if state.state() >= schema.state_count() {
            return Err(TimelineError::UnknownState {
                type_name: schema.name().to_string(),
                state: state.state().to_string(),
            });
        }

        self.ensure_registered(ctx, DiffId::ROOT, catalyst)?;
        let anchor = self.locate(ctx, parent, diff.date().saturating_sub(1), catalyst)?;

        let mut branch = Branch::new(diff.clone());
        branch.register(catalyst, schema.state_count());
        let index = branch.insert_state(diff.date(), catalyst, state.to_vector(schema))?;
        self.branches.insert(diff.id(), branch);

        if let Some(anchor) = anchor {
            let fan_out = BranchedNext {
                start: diff.date(),
                target: NodeRef {
                    branch: diff.id(),
                    index,
                },
            };
            if let Some(node) = self
                .branches
                .get_mut(&anchor.node.branch)
                .and_then(|branch| branch.node_mut(anchor.node.index))
            {
                node.branched_nexts.insert(fan_out);
            }
        }

        tracing::debug!(diff = %diff.id(), parent = %parent, date = diff.date(), "created branch");
        Ok(())
    }
}
