//! Per-entity query surface.

use crate::engine::TimelineEngine;
use crate::error::{TimelineError, TimelineResult};
use crate::object::EntityId;
use crate::schema::{EntityTypeSchema, TypeIndex};
use crate::state::{Position, StateVector};
use crate::time::Tick;
use crate::timeline::Context;

use super::diff::{Diff, DiffId};

/// Outcome of [`Continuity::assert`].
///
/// Incoherence is an expected answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// The position cannot follow from what is already known before it.
    Incoherent,
    /// The position is coherent with past and future and is now recorded.
    Accepted,
    /// The position follows from the past but contradicts the known future.
    /// Registering the diff materialises a timeline where it holds.
    Diverged(Diff),
}

impl Assertion {
    /// Whether the position was recorded.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// The diff of a diverging assertion.
    #[must_use]
    pub const fn diff(&self) -> Option<&Diff> {
        match self {
            Self::Diverged(diff) => Some(diff),
            _ => None,
        }
    }

    /// Takes the diff of a diverging assertion.
    #[must_use]
    pub fn into_diff(self) -> Option<Diff> {
        match self {
            Self::Diverged(diff) => Some(diff),
            _ => None,
        }
    }
}

/// One entity's timeline as seen from one universe.
///
/// Obtained from [`TimelineEngine::continuity`]. Holds the engine mutably:
/// measuring collapses states and draws from the engine's random source.
#[derive(Debug)]
pub struct Continuity<'a> {
    engine: &'a mut TimelineEngine,
    universe: DiffId,
    entity: EntityId,
    type_index: TypeIndex,
}

impl<'a> Continuity<'a> {
    pub(crate) fn new(engine: &'a mut TimelineEngine, universe: DiffId, entity: EntityId, type_index: TypeIndex) -> Self {
        Self {
            engine,
            universe,
            entity,
            type_index,
        }
    }

    /// The entity this timeline follows.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// The universe this timeline is read from.
    #[must_use]
    pub const fn universe(&self) -> DiffId {
        self.universe
    }

    fn schema(&self) -> TimelineResult<&EntityTypeSchema> {
        self.engine.schemas.schema(self.type_index)
    }

    /// Observes the entity at `date`, fixing its state there for good.
    ///
    /// Date 0 returns the balanced prior and records nothing. A date that is
    /// already known returns the recorded state.
    ///
    /// # Errors
    ///
    /// Only on internal inconsistencies; degenerate forecasts are recovered.
    pub fn measure(&mut self, date: Tick) -> TimelineResult<StateVector> {
        if date == 0 {
            return Ok(StateVector::balanced(self.schema()?.state_count()));
        }

        let engine = &mut *self.engine;
        let ctx = Context::new(&engine.schemas, &engine.objects);
        let forecast = engine.timelines.forecast(ctx, self.universe, date, self.entity)?;
        let collapsed = forecast.collapse(&mut engine.rng);
        let recorded = engine
            .timelines
            .insert_state(ctx, self.universe, date, self.entity, collapsed)?;

        tracing::debug!(
            entity = %self.entity,
            universe = %self.universe,
            date,
            state = ?recorded.try_as_definite_state(),
            "measured"
        );
        Ok(recorded)
    }

    /// [`Self::measure`] as a definite position. `None` at date 0.
    pub fn measure_position(&mut self, date: Tick) -> TimelineResult<Option<Position>> {
        let type_index = self.type_index;
        Ok(self
            .measure(date)?
            .try_as_definite_state()
            .filter(|_| date > 0)
            .map(|state| Position::new(type_index, state)))
    }

    /// The forecast at `date` without collapsing or recording it.
    pub fn forecast(&mut self, date: Tick) -> TimelineResult<StateVector> {
        let engine = &mut *self.engine;
        let ctx = Context::new(&engine.schemas, &engine.objects);
        engine.timelines.forecast(ctx, self.universe, date, self.entity)
    }

    /// The recorded state at or before `date`; the wildcard if nothing is
    /// known yet.
    pub fn state_at_or_before(&self, date: Tick) -> TimelineResult<StateVector> {
        let engine = &*self.engine;
        let ctx = Context::new(&engine.schemas, &engine.objects);
        let known = engine.timelines.state_at_or_before(ctx, self.universe, date, self.entity)?;
        Ok(match known {
            Some(vector) => vector,
            None => StateVector::wildcard(self.schema()?.state_count()),
        })
    }

    /// Pins the entity to `position` at `date`.
    ///
    /// The position must be reachable from the state known before `date`.
    /// If it is also compatible with every known later state it is recorded
    /// on this universe; otherwise a [`Diff`] describing the divergence is
    /// returned and nothing is recorded.
    ///
    /// # Errors
    ///
    /// `InvalidAssertion` at date 0, `PositionTypeMismatch` or
    /// `UnknownState` for a position that does not belong to this entity.
    pub fn assert(&mut self, date: Tick, position: Position) -> TimelineResult<Assertion> {
        if date == 0 {
            return Err(TimelineError::InvalidAssertion { date });
        }

        let engine = &mut *self.engine;
        let schema = engine.schemas.schema(self.type_index)?;
        if position.type_index() != self.type_index {
            let position_type = engine
                .schemas
                .get(position.type_index())
                .map_or_else(|| position.type_index().to_string(), |s| s.name().to_string());
            return Err(TimelineError::PositionTypeMismatch {
                position_type,
                entity_type: schema.name().to_string(),
            });
        }
        let candidate = position.state();
        if schema.state_name(candidate).is_none() {
            return Err(TimelineError::UnknownState {
                type_name: schema.name().to_string(),
                state: candidate.to_string(),
            });
        }
        let target = position.to_vector(schema);

        let ctx = Context::new(&engine.schemas, &engine.objects);
        let known = engine
            .timelines
            .locate(ctx, self.universe, date, self.entity)?
            .filter(|located| located.covers(date));

        if known.as_ref().is_some_and(|located| located.vector == target) {
            tracing::debug!(entity = %self.entity, date, "assertion matches the recorded state");
            return Ok(Assertion::Accepted);
        }

        let coherent_past = engine
            .timelines
            .locate(ctx, self.universe, date - 1, self.entity)?
            .map_or(true, |before| {
                before
                    .vector
                    .is_reachable_within(schema, candidate, before.steps_until(date))
            });
        if !coherent_past {
            tracing::debug!(entity = %self.entity, date, "assertion incoherent with the past");
            return Ok(Assertion::Incoherent);
        }

        if known.is_none() {
            let future = engine.timelines.future_mask(ctx, self.universe, date, self.entity)?;
            if future.admits(candidate) {
                engine
                    .timelines
                    .insert_state(ctx, self.universe, date, self.entity, target)?;
                tracing::debug!(entity = %self.entity, universe = %self.universe, date, "assertion accepted");
                return Ok(Assertion::Accepted);
            }
        }

        let diff = self.diverge(date, position)?;
        tracing::debug!(entity = %self.entity, diff = %diff.id(), date, "assertion diverges");
        Ok(Assertion::Diverged(diff))
    }

    fn diverge(&self, date: Tick, position: Position) -> TimelineResult<Diff> {
        let timelines = &self.engine.timelines;
        let lookup = |id: DiffId| {
            timelines
                .branch(id)
                .map(|branch| branch.diff())
                .ok_or(TimelineError::UnknownDiff { id })
        };

        let mut parent = lookup(self.universe)?;
        while parent.date() > date {
            let id = parent
                .parent()
                .ok_or_else(|| TimelineError::internal("diff ancestry does not reach the root"))?;
            parent = lookup(id)?;
        }

        let affected = self
            .engine
            .objects
            .super_node_of(self.entity)
            .ok_or(TimelineError::UnknownEntity { id: self.entity })?;
        Ok(Diff::diverge(parent.id(), date, self.entity, position, affected))
    }
}
