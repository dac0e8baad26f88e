//! Branch points.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::object::{EntityId, ObjectTree, SuperNodeId};
use crate::state::Position;
use crate::time::Tick;

const DIFF_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_3c2e_9d4a_5e70_8a21_c4f0_b7d3_1e95);

/// Identifier of a [`Diff`].
///
/// Derived from the divergence itself, so asserting the same divergence
/// twice names the same diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffId(Uuid);

impl DiffId {
    /// The root diff: date 0, no parent, no catalyst.
    pub const ROOT: Self = Self(Uuid::nil());

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Whether this is the root diff's id.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_nil()
    }

    fn derive(parent: Self, date: Tick, catalyst: EntityId, state: Position) -> Self {
        let mut name = Vec::with_capacity(16 + 8 + 16 + 16);
        name.extend_from_slice(parent.0.as_bytes());
        name.extend_from_slice(&date.to_be_bytes());
        name.extend_from_slice(catalyst.as_uuid().as_bytes());
        name.extend_from_slice(&(state.type_index().as_usize() as u64).to_be_bytes());
        name.extend_from_slice(&(state.state() as u64).to_be_bytes());
        Self(Uuid::new_v5(&DIFF_NAMESPACE, &name))
    }
}

impl fmt::Display for DiffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Where and why a timeline branched.
///
/// Immutable once created. Only the root diff and diffs returned by
/// [`Continuity::assert`](crate::Continuity::assert) exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    id: DiffId,
    parent: Option<DiffId>,
    date: Tick,
    catalyst: Option<EntityId>,
    catalyzing_state: Option<Position>,
    affected: SuperNodeId,
}

impl Diff {
    /// The root diff.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            id: DiffId::ROOT,
            parent: None,
            date: 0,
            catalyst: None,
            catalyzing_state: None,
            affected: SuperNodeId::ROOT,
        }
    }

    pub(crate) fn diverge(parent: DiffId, date: Tick, catalyst: EntityId, state: Position, affected: SuperNodeId) -> Self {
        Self {
            id: DiffId::derive(parent, date, catalyst, state),
            parent: Some(parent),
            date,
            catalyst: Some(catalyst),
            catalyzing_state: Some(state),
            affected,
        }
    }

    /// Deterministic id of the divergence.
    #[must_use]
    pub const fn id(&self) -> DiffId {
        self.id
    }

    /// Diff this one branches from; `None` for the root.
    #[must_use]
    pub const fn parent(&self) -> Option<DiffId> {
        self.parent
    }

    /// First date at which the branch differs from its parent.
    #[must_use]
    pub const fn date(&self) -> Tick {
        self.date
    }

    /// Entity whose assertion diverged; `None` for the root.
    #[must_use]
    pub const fn catalyst(&self) -> Option<EntityId> {
        self.catalyst
    }

    /// The asserted position; `None` for the root.
    #[must_use]
    pub const fn catalyzing_state(&self) -> Option<Position> {
        self.catalyzing_state
    }

    /// Super-node whose timelines the branch rewrites.
    #[must_use]
    pub const fn affected(&self) -> SuperNodeId {
        self.affected
    }

    /// Whether this is the root diff.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.id.is_root()
    }

    /// Whether this diff's branch rewrites `entity`'s timeline.
    #[must_use]
    pub fn is_affected(&self, objects: &ObjectTree, entity: EntityId) -> bool {
        objects.is_affected_by(entity, self.affected)
    }
}

/// A handle onto a registered diff, usable for queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    diff: Diff,
}

impl Universe {
    pub(crate) const fn new(diff: Diff) -> Self {
        Self { diff }
    }

    /// The wrapped diff.
    #[must_use]
    pub const fn diff(&self) -> &Diff {
        &self.diff
    }

    /// Id of the wrapped diff.
    #[must_use]
    pub const fn id(&self) -> DiffId {
        self.diff.id()
    }

    /// Whether this is the root universe.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.diff.is_root()
    }
}
