//! Entity handles and identity.
//!
//! An [`Entity`] owns no state. It names an instance of a schema type and
//! the links it will carry once registered with the engine; every
//! probabilistic fact about it lives on the timeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RelationshipError;
use crate::schema::TypeIndex;

/// Globally unique, stable entity identifier.
///
/// # Examples
///
/// ```
/// use branchline::EntityId;
///
/// let id = EntityId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

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

    /// Whether this is the nil UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// An entity instance waiting to be registered.
///
/// Links are declared here and validated against the schema when the
/// entity is registered; a lateral to `B` under key `k` gives `B` a reverse
/// link under the same key.
///
/// # Examples
///
/// ```
/// use branchline::{Entity, SchemaTable};
///
/// let table = SchemaTable::from_json_str(r#"[
///     {"type_name": "Host", "states": [{"state_name": "Up"}]},
///     {"type_name": "Guest", "parent_key_name": "host",
///      "lateral_objects": [{"type_name": "Host", "key_name": "host"}],
///      "states": [{"state_name": "Running"}]}
/// ]"#).unwrap();
///
/// let host = Entity::new(table.resolve("Host").unwrap());
/// let guest = Entity::new(table.resolve("Guest").unwrap())
///     .with_parent(host.id())
///     .unwrap();
/// assert_eq!(guest.parent(), Some(host.id()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    type_index: TypeIndex,
    parent: Option<EntityId>,
    laterals: BTreeMap<String, EntityId>,
}

impl Entity {
    /// Creates an unlinked entity of the given type with a fresh ID.
    #[must_use]
    pub fn new(type_index: TypeIndex) -> Self {
        Self::with_id(EntityId::new(), type_index)
    }

    /// An unlinked entity with a caller-chosen id.
    #[must_use]
    pub fn with_id(id: EntityId, type_index: TypeIndex) -> Self {
        Self {
            id,
            type_index,
            parent: None,
            laterals: BTreeMap::new(),
        }
    }

    /// The entity's id.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// The entity's schema type.
    #[must_use]
    pub const fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    /// The parent link, if set.
    #[must_use]
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Declared lateral links, keyed by relation name.
    #[must_use]
    pub const fn laterals(&self) -> &BTreeMap<String, EntityId> {
        &self.laterals
    }

    /// Attaches a parent.
    ///
    /// # Errors
    ///
    /// `ParentAlreadySet` if a parent is already attached, `SelfLink` if
    /// `parent` is this entity.
    pub fn set_parent(&mut self, parent: EntityId) -> Result<(), RelationshipError> {
        if parent == self.id {
            return Err(RelationshipError::SelfLink { entity: self.id });
        }
        if self.parent.is_some() {
            return Err(RelationshipError::ParentAlreadySet { entity: self.id });
        }
        self.parent = Some(parent);
        Ok(())
    }

    /// Adds a lateral partner under relation `key`.
    ///
    /// # Errors
    ///
    /// `LateralSlotOccupied` if `key` is taken, `SelfLink` if `partner` is
    /// this entity.
    pub fn add_lateral(&mut self, key: impl Into<String>, partner: EntityId) -> Result<(), RelationshipError> {
        let key = key.into();
        if partner == self.id {
            return Err(RelationshipError::SelfLink { entity: self.id });
        }
        if self.laterals.contains_key(&key) {
            return Err(RelationshipError::LateralSlotOccupied { entity: self.id, key });
        }
        self.laterals.insert(key, partner);
        Ok(())
    }

    /// Builder form of [`Self::set_parent`].
    pub fn with_parent(mut self, parent: EntityId) -> Result<Self, RelationshipError> {
        self.set_parent(parent)?;
        Ok(self)
    }

    /// Builder form of [`Self::add_lateral`].
    pub fn with_lateral(mut self, key: impl Into<String>, partner: EntityId) -> Result<Self, RelationshipError> {
        self.add_lateral(key, partner)?;
        Ok(self)
    }
}
