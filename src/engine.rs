//! Timeline engine.
//!
//! Owns one timeline tree: the compiled schema table, the object
//! relationship tree, every branch and the shared random source. All
//! mutation goes through `&mut self`; callers that share an engine across
//! threads serialize access themselves.

use rand::rngs::StdRng;

use crate::config::EngineConfig;
use crate::error::{TimelineError, TimelineResult};
use crate::object::{Entity, EntityId, ObjectTree};
use crate::schema::SchemaTable;
use crate::timeline::{Context, UniverseTree};
use crate::universe::{Continuity, Diff, DiffId, Universe};

/// A branching probabilistic timeline store.
///
/// # Examples
///
/// ```
/// use branchline::{EngineConfig, Entity, SchemaTable, TimelineEngine};
///
/// let schemas = SchemaTable::from_json_str(r#"[
///     {"type_name": "Cell", "states": [
///         {"state_name": "A", "target_length": "2 days", "transitions_to": [{"state_name": "B"}]},
///         {"state_name": "B"}
///     ]}
/// ]"#).unwrap();
/// let cell_type = schemas.resolve("Cell").unwrap();
/// let b = schemas.position(cell_type, "B").unwrap();
///
/// let mut engine = TimelineEngine::new(schemas, EngineConfig::default().with_seed(7)).unwrap();
/// let cell = engine.register(&Entity::new(cell_type)).unwrap();
/// let root = engine.root_universe();
///
/// let mut timeline = engine.continuity(&root, cell).unwrap();
/// assert!(timeline.assert(10, b).unwrap().is_accepted());
/// assert_eq!(timeline.measure_position(10).unwrap(), Some(b));
/// ```
#[derive(Debug)]
pub struct TimelineEngine {
    pub(crate) schemas: SchemaTable,
    pub(crate) objects: ObjectTree,
    pub(crate) timelines: UniverseTree,
    pub(crate) rng: StdRng,
    config: EngineConfig,
}

impl TimelineEngine {
    /// Creates an engine holding only the root universe.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(schemas: SchemaTable, config: EngineConfig) -> TimelineResult<Self> {
        config.validate()?;
        tracing::debug!(types = schemas.len(), seeded = config.seed.is_some(), "timeline engine created");
        Ok(Self {
            schemas,
            objects: ObjectTree::new(),
            timelines: UniverseTree::new(),
            rng: config.rng(),
            config,
        })
    }

    /// The compiled schema table.
    #[must_use]
    pub const fn schemas(&self) -> &SchemaTable {
        &self.schemas
    }

    /// The object relationship tree.
    #[must_use]
    pub const fn objects(&self) -> &ObjectTree {
        &self.objects
    }

    /// Every registered branch.
    #[must_use]
    pub const fn timelines(&self) -> &UniverseTree {
        &self.timelines
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers an entity and its links. Must precede any query on it.
    ///
    /// # Errors
    ///
    /// `Relationship` errors for invalid links; the tree is unchanged.
    pub fn register(&mut self, entity: &Entity) -> TimelineResult<EntityId> {
        self.objects.register(entity, &self.schemas)?;
        Ok(entity.id())
    }

    /// The universe every timeline descends from.
    #[must_use]
    pub fn root_universe(&self) -> Universe {
        Universe::new(Diff::root())
    }

    /// The universe of a registered diff.
    #[must_use]
    pub fn universe(&self, id: DiffId) -> Option<Universe> {
        self.timelines
            .branch(id)
            .map(|branch| Universe::new(branch.diff().clone()))
    }

    /// Materialises the branch of a diff returned by an assertion.
    ///
    /// Registering the same diff again returns the existing universe.
    ///
    /// # Errors
    ///
    /// `BranchLimitExceeded` when the configured branch count is reached,
    /// `UnknownDiff` if the diff's parent is not registered.
    pub fn register_universe(&mut self, diff: &Diff) -> TimelineResult<Universe> {
        if let Some(existing) = self.universe(diff.id()) {
            return Ok(existing);
        }
        if self.timelines.len() >= self.config.max_branches {
            return Err(TimelineError::BranchLimitExceeded {
                max: self.config.max_branches,
            });
        }

        let ctx = Context::new(&self.schemas, &self.objects);
        self.timelines.create_branch(ctx, diff)?;
        self.objects.record_diff(diff.affected(), diff.id());

        tracing::debug!(diff = %diff.id(), branches = self.timelines.len(), "registered universe");
        Ok(Universe::new(diff.clone()))
    }

    /// Opens `entity`'s timeline in `universe`.
    ///
    /// # Errors
    ///
    /// `UnknownDiff` for an unregistered universe, `UnknownEntity` for an
    /// unregistered entity.
    pub fn continuity(&mut self, universe: &Universe, entity: EntityId) -> TimelineResult<Continuity<'_>> {
        if !self.timelines.contains(universe.id()) {
            return Err(TimelineError::UnknownDiff { id: universe.id() });
        }
        let type_index = self
            .objects
            .get(entity)
            .ok_or(TimelineError::UnknownEntity { id: entity })?
            .type_index();
        Ok(Continuity::new(self, universe.id(), entity, type_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityTypeRecord, StateRecord};
    use crate::universe::Assertion;

    fn engine(config: EngineConfig) -> (TimelineEngine, EntityId) {
        let schemas = SchemaTable::from_records(vec![EntityTypeRecord::new(
            "Chain",
            vec![
                StateRecord::new("A", "1 day").to("B"),
                StateRecord::new("B", "1 day").to("C"),
                StateRecord::new("C", ""),
            ],
        )])
        .unwrap();
        let ty = schemas.resolve("Chain").unwrap();
        let mut engine = TimelineEngine::new(schemas, config).unwrap();
        let e = engine.register(&Entity::new(ty)).unwrap();
        (engine, e)
    }

    fn diverge(engine: &mut TimelineEngine, e: EntityId) -> Diff {
        let ty = engine.schemas().resolve("Chain").unwrap();
        let a = engine.schemas().position(ty, "A").unwrap();
        let c = engine.schemas().position(ty, "C").unwrap();
        let root = engine.root_universe();
        let mut timeline = engine.continuity(&root, e).unwrap();
        assert!(timeline.assert(100, c).unwrap().is_accepted());
        match timeline.assert(99, a).unwrap() {
            Assertion::Diverged(diff) => diff,
            other => panic!("expected a diff, got {other:?}"),
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let schemas = SchemaTable::from_records(Vec::new()).unwrap();
        let config = EngineConfig {
            max_branches: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            TimelineEngine::new(schemas, config),
            Err(TimelineError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_register_universe_is_idempotent() {
        let (mut engine, e) = engine(EngineConfig::default().with_seed(1));
        let diff = diverge(&mut engine, e);

        let first = engine.register_universe(&diff).unwrap();
        let second = engine.register_universe(&diff).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.timelines().len(), 2);
        assert_eq!(engine.universe(diff.id()), Some(first));
        assert!(engine.objects().visible_diffs(e).unwrap().contains(&diff.id()));
        assert!(diff.is_affected(engine.objects(), e));
    }

    #[test]
    fn test_branch_limit() {
        let (mut engine, e) = engine(EngineConfig {
            seed: Some(1),
            max_branches: 1,
        });
        let diff = diverge(&mut engine, e);
        assert!(matches!(
            engine.register_universe(&diff),
            Err(TimelineError::BranchLimitExceeded { max: 1 })
        ));
    }

    #[test]
    fn test_continuity_requires_registration() {
        let (mut engine, _) = engine(EngineConfig::default());
        let root = engine.root_universe();
        assert!(matches!(
            engine.continuity(&root, EntityId::new()),
            Err(TimelineError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn test_root_universe_registration_returns_root() {
        let (mut engine, _) = engine(EngineConfig::default());
        let root = engine.register_universe(&Diff::root()).unwrap();
        assert!(root.is_root());
        assert_eq!(engine.timelines().len(), 1);
    }
}
