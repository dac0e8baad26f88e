//! Object relationship tree.
//!
//! Registered entities are grouped into super-nodes: classes closed under
//! lateral connectivity. Each super-node hangs under the super-node of its
//! members' common parent, or under the root. A branch created by a diff
//! affects the catalyst's super-node and everything below it.
//!
//! Key invariants:
//! - Super-node membership is fixed once formed.
//! - A super-node's visible diffs are its own diffs plus every ancestor's.
//!   They are pushed down eagerly when a diff is recorded, so lookups never
//!   walk the chain.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RelationshipError, TimelineResult};
use crate::schema::{SchemaTable, TypeIndex};
use crate::universe::DiffId;

use super::entity::{Entity, EntityId};

/// Index of a super-node in an [`ObjectTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuperNodeId(usize);

impl SuperNodeId {
    /// The tree root. Every super-node descends from it.
    pub const ROOT: Self = Self(0);

    /// Whether this is the tree root.
    #[must_use]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SuperNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "super#{}", self.0)
    }
}

/// A link between two registered entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LateralLink {
    /// Relation key of the link.
    pub key: String,
    /// Entity on the other end.
    pub partner: EntityId,
    /// True on the partner's side of a link declared by the other entity.
    pub reverse: bool,
}

/// A registered entity.
#[derive(Debug, Clone)]
pub struct ObjectNode {
    type_index: TypeIndex,
    parent: Option<EntityId>,
    super_node: SuperNodeId,
    laterals: Vec<LateralLink>,
}

impl ObjectNode {
    /// Schema type of the entity.
    #[must_use]
    pub const fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    /// Parent entity, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Super-node the entity belongs to.
    #[must_use]
    pub const fn super_node(&self) -> SuperNodeId {
        self.super_node
    }

    /// Lateral links, reverse links included.
    #[must_use]
    pub fn laterals(&self) -> &[LateralLink] {
        &self.laterals
    }
}

#[derive(Debug, Clone, Default)]
struct SuperNode {
    members: Vec<EntityId>,
    super_parent: Option<SuperNodeId>,
    children: Vec<SuperNodeId>,
    own_diffs: BTreeSet<DiffId>,
    visible_diffs: BTreeSet<DiffId>,
}

/// Registered entities and their super-node hierarchy.
#[derive(Debug, Clone)]
pub struct ObjectTree {
    nodes: HashMap<EntityId, ObjectNode>,
    super_nodes: Vec<SuperNode>,
}

impl Default for ObjectTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTree {
    /// A tree holding only the root super-node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            super_nodes: vec![SuperNode::default()],
        }
    }

    /// The registered node of `entity`.
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&ObjectNode> {
        self.nodes.get(&entity)
    }

    /// Whether `entity` is registered.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.nodes.contains_key(&entity)
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no entity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Super-node of a registered entity.
    #[must_use]
    pub fn super_node_of(&self, entity: EntityId) -> Option<SuperNodeId> {
        self.nodes.get(&entity).map(|node| node.super_node)
    }

    /// Members of a super-node, in registration order.
    #[must_use]
    pub fn members(&self, super_node: SuperNodeId) -> &[EntityId] {
        self.super_nodes
            .get(super_node.0)
            .map_or(&[], |s| s.members.as_slice())
    }

    /// Parent super-node; `None` for the root.
    #[must_use]
    pub fn super_parent(&self, super_node: SuperNodeId) -> Option<SuperNodeId> {
        self.super_nodes.get(super_node.0).and_then(|s| s.super_parent)
    }

    /// Registers an entity, validating its links against the schema.
    ///
    /// Returns the super-node the entity joined. A rejected registration
    /// leaves the tree unchanged.
    ///
    /// # Errors
    ///
    /// A `RelationshipError` when the entity is already registered, a link
    /// is undeclared, points at an unregistered entity or at the wrong
    /// type, or the lateral partners do not agree on one super-node with
    /// the entity's parent above it.
    pub fn register(&mut self, entity: &Entity, schemas: &SchemaTable) -> TimelineResult<SuperNodeId> {
        let id = entity.id();
        if self.nodes.contains_key(&id) {
            return Err(RelationshipError::AlreadyRegistered { entity: id }.into());
        }
        let schema = schemas.schema(entity.type_index())?;

        let parent_super = match entity.parent() {
            Some(parent) => {
                let key = schema.parent_key().ok_or_else(|| RelationshipError::NoParentRelation {
                    type_name: schema.name().to_string(),
                })?;
                self.check_partner(id, key, parent, schema.name(), entity.type_index(), schemas)?;
                self.nodes[&parent].super_node
            }
            None => SuperNodeId::ROOT,
        };

        let mut joined: Option<SuperNodeId> = None;
        for (key, &partner) in entity.laterals() {
            if entity.parent().is_some() && schema.parent_key() == Some(key.as_str()) {
                return Err(RelationshipError::LateralSlotOccupied {
                    entity: id,
                    key: key.clone(),
                }
                .into());
            }
            self.check_partner(id, key, partner, schema.name(), entity.type_index(), schemas)?;

            let partner_super = self.nodes[&partner].super_node;
            match joined {
                Some(existing) if existing != partner_super => {
                    return Err(RelationshipError::SplitSuperNode { entity: id }.into());
                }
                _ => joined = Some(partner_super),
            }
        }

        let super_node = match joined {
            Some(existing) => {
                if self.super_nodes[existing.0].super_parent != Some(parent_super) {
                    return Err(RelationshipError::SuperParentConflict { entity: id }.into());
                }
                existing
            }
            None => self.new_super_node(parent_super),
        };

        // Validation is complete; mutate.
        self.super_nodes[super_node.0].members.push(id);
        for (key, &partner) in entity.laterals() {
            if let Some(node) = self.nodes.get_mut(&partner) {
                node.laterals.push(LateralLink {
                    key: key.clone(),
                    partner: id,
                    reverse: true,
                });
            }
        }
        self.nodes.insert(
            id,
            ObjectNode {
                type_index: entity.type_index(),
                parent: entity.parent(),
                super_node,
                laterals: entity
                    .laterals()
                    .iter()
                    .map(|(key, &partner)| LateralLink {
                        key: key.clone(),
                        partner,
                        reverse: false,
                    })
                    .collect(),
            },
        );

        tracing::debug!(entity = %id, %super_node, "registered entity");
        Ok(super_node)
    }

    fn check_partner(
        &self,
        id: EntityId,
        key: &str,
        partner: EntityId,
        type_name: &str,
        type_index: TypeIndex,
        schemas: &SchemaTable,
    ) -> Result<(), RelationshipError> {
        if partner == id {
            return Err(RelationshipError::SelfLink { entity: id });
        }
        let relation = schemas
            .relation(type_index, key)
            .ok_or_else(|| RelationshipError::UndeclaredRelation {
                type_name: type_name.to_string(),
                key: key.to_string(),
            })?;
        let node = self
            .nodes
            .get(&partner)
            .ok_or(RelationshipError::NotRegistered { entity: partner })?;
        if node.type_index != relation.related() {
            let actual = schemas
                .get(node.type_index)
                .map_or_else(|| node.type_index.to_string(), |s| s.name().to_string());
            return Err(RelationshipError::RelatedTypeMismatch {
                key: key.to_string(),
                partner,
                expected: relation.related_type().to_string(),
                actual,
            });
        }
        Ok(())
    }

    fn new_super_node(&mut self, super_parent: SuperNodeId) -> SuperNodeId {
        let id = SuperNodeId(self.super_nodes.len());
        let visible_diffs = self.super_nodes[super_parent.0].visible_diffs.clone();
        self.super_nodes.push(SuperNode {
            super_parent: Some(super_parent),
            visible_diffs,
            ..SuperNode::default()
        });
        self.super_nodes[super_parent.0].children.push(id);
        id
    }

    /// Whether walking super-parents up from `entity`'s super-node reaches
    /// `scope` (the starting super-node included).
    #[must_use]
    pub fn is_affected_by(&self, entity: EntityId, scope: SuperNodeId) -> bool {
        let mut current = self.super_node_of(entity);
        while let Some(node) = current {
            if node == scope {
                return true;
            }
            current = self.super_parent(node);
        }
        false
    }

    /// Records that `diff` affects `scope` and everything below it.
    pub fn record_diff(&mut self, scope: SuperNodeId, diff: DiffId) {
        let Some(node) = self.super_nodes.get_mut(scope.0) else {
            return;
        };
        node.own_diffs.insert(diff);

        let mut stack = vec![scope];
        while let Some(current) = stack.pop() {
            let node = &mut self.super_nodes[current.0];
            node.visible_diffs.insert(diff);
            stack.extend(node.children.iter().copied());
        }
    }

    /// Diffs recorded directly on a super-node.
    #[must_use]
    pub fn own_diffs(&self, super_node: SuperNodeId) -> Option<&BTreeSet<DiffId>> {
        self.super_nodes.get(super_node.0).map(|s| &s.own_diffs)
    }

    /// Every diff whose branch affects `entity`.
    #[must_use]
    pub fn visible_diffs(&self, entity: EntityId) -> Option<&BTreeSet<DiffId>> {
        let super_node = self.super_node_of(entity)?;
        self.super_nodes.get(super_node.0).map(|s| &s.visible_diffs)
    }
}
