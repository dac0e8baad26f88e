//! Error types for Branchline.
//!
//! All errors are strongly typed using thiserror, one enum per concern,
//! folded into [`TimelineError`] at the public surface.

use thiserror::Error;

use crate::object::EntityId;
use crate::time::Tick;
use crate::universe::DiffId;

/// Errors raised while loading or compiling an entity-type schema.
///
/// Schema errors are unrecoverable: a table that fails to compile never
/// reaches the timeline engine.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The document is not valid JSON for the schema format.
    #[error("Schema document could not be parsed: {0}")]
    Json(#[from] serde_json::Error),

    /// The schema file could not be read.
    #[error("Schema file could not be read: {0}")]
    Io(#[from] std::io::Error),

    /// A target length contains an unknown word.
    #[error("Unrecognized token \"{token}\" in target length of state '{state}'")]
    UnrecognizedDurationToken {
        /// State the error refers to.
        state: String,
        /// The offending word.
        token: String,
    },

    /// A target length does not fit in a tick counter.
    #[error("Target length of state '{state}' overflows a tick counter")]
    DurationOverflow {
        /// State the error refers to.
        state: String,
    },

    /// A target length is above `MAX_TARGET_LENGTH`.
    #[error("Target length {length} of state '{state}' exceeds the maximum of {max} ticks (30 trillion years)")]
    TargetLengthExceeded {
        /// State the error refers to.
        state: String,
        /// Declared length in ticks.
        length: u64,
        /// Upper bound.
        max: u64,
    },

    /// A state with transitions declares no residency.
    #[error("State '{state}' of type '{type_name}' declares transitions but has a zero target length")]
    ZeroTargetLength {
        /// Entity type name.
        type_name: String,
        /// State the error refers to.
        state: String,
    },

    /// A type declares no states.
    #[error("Entity type '{type_name}' declares no states")]
    NoStates {
        /// Entity type name.
        type_name: String,
    },

    /// Two records share a type name.
    #[error("Entity type '{type_name}' is declared more than once")]
    DuplicateType {
        /// Entity type name.
        type_name: String,
    },

    /// Two states of one type share a name.
    #[error("State '{state}' is declared more than once in type '{type_name}'")]
    DuplicateState {
        /// Entity type name.
        type_name: String,
        /// State the error refers to.
        state: String,
    },

    /// Two relations of one type share a key.
    #[error("Relation '{key}' is declared more than once in type '{type_name}'")]
    DuplicateRelation {
        /// Entity type name.
        type_name: String,
        /// Relation key.
        key: String,
    },

    /// A transition names a state the type does not declare.
    #[error("State '{state}' of type '{type_name}' transitions to unknown state '{target}'")]
    UnknownTransitionTarget {
        /// Entity type name.
        type_name: String,
        /// State the error refers to.
        state: String,
        /// Named target state.
        target: String,
    },

    /// A state lists itself as a transition target.
    #[error("State '{state}' of type '{type_name}' declares a transition to itself")]
    SelfTransition {
        /// Entity type name.
        type_name: String,
        /// State the error refers to.
        state: String,
    },

    /// A weight is negative or not finite.
    #[error("Weight {weight} on '{state}' of type '{type_name}' must be finite and non-negative")]
    InvalidWeight {
        /// Entity type name.
        type_name: String,
        /// State the error refers to.
        state: String,
        /// The offending weight.
        weight: f64,
    },

    /// Transition weights do not normalise to 1.
    #[error("Transitions of state '{state}' in type '{type_name}' sum to {total} instead of 1")]
    TransitionsNotNormalized {
        /// Entity type name.
        type_name: String,
        /// State the error refers to.
        state: String,
        /// Sum after normalisation.
        total: f64,
    },

    /// A constraint or parent key names an undeclared relation.
    #[error("Type '{type_name}' references unknown relation '{key}'")]
    UnknownRelation {
        /// Entity type name.
        type_name: String,
        /// Relation key.
        key: String,
    },

    /// A relation points at a type the document does not declare.
    #[error("Relation '{key}' of type '{type_name}' points at unknown type '{related}'")]
    UnknownRelatedType {
        /// Entity type name.
        type_name: String,
        /// Relation key.
        key: String,
        /// Named related type.
        related: String,
    },

    /// A constraint names a state the related type does not declare.
    #[error("Constraint '{key}' of state '{state}' in type '{type_name}' names unknown related state '{related_state}'")]
    UnknownConstrainedState {
        /// Entity type name.
        type_name: String,
        /// State the error refers to.
        state: String,
        /// Relation key.
        key: String,
        /// Named related state.
        related_state: String,
    },
}

/// Errors raised when wiring parent and lateral links between entities.
///
/// A rejected call leaves the object tree unchanged.
#[derive(Debug, Error)]
pub enum RelationshipError {
    /// The parent slot is taken.
    #[error("Entity {entity} already has a parent")]
    ParentAlreadySet {
        /// Entity being registered or linked.
        entity: EntityId,
    },

    /// The lateral key is taken, or shadows the parent key.
    #[error("Lateral slot '{key}' of entity {entity} is already occupied")]
    LateralSlotOccupied {
        /// Entity being registered or linked.
        entity: EntityId,
        /// Relation key.
        key: String,
    },

    /// An entity links to itself.
    #[error("Entity {entity} cannot be linked to itself")]
    SelfLink {
        /// Entity being registered or linked.
        entity: EntityId,
    },

    /// The entity type declares no relation under this key.
    #[error("Type '{type_name}' declares no relation '{key}'")]
    UndeclaredRelation {
        /// Entity type name.
        type_name: String,
        /// Relation key.
        key: String,
    },

    /// A parent was given to a type without a parent key.
    #[error("Type '{type_name}' declares no parent relation")]
    NoParentRelation {
        /// Entity type name.
        type_name: String,
    },

    /// A link points at an entity the tree does not know.
    #[error("Entity {entity} is not registered")]
    NotRegistered {
        /// Entity being registered or linked.
        entity: EntityId,
    },

    /// The entity is registered already.
    #[error("Entity {entity} is already registered")]
    AlreadyRegistered {
        /// Entity being registered or linked.
        entity: EntityId,
    },

    /// A partner has the wrong type for the relation.
    #[error("Relation '{key}' expects type '{expected}' but partner {partner} is '{actual}'")]
    RelatedTypeMismatch {
        /// Relation key.
        key: String,
        /// Linked partner.
        partner: EntityId,
        /// Type the relation expects.
        expected: String,
        /// Type the partner has.
        actual: String,
    },

    /// Lateral partners sit in different super-nodes.
    #[error("Lateral partners of entity {entity} belong to different super-nodes")]
    SplitSuperNode {
        /// Entity being registered or linked.
        entity: EntityId,
    },

    /// The joined super-node formed under another parent.
    #[error("Entity {entity} would join a super-node that already formed under a different parent")]
    SuperParentConflict {
        /// Entity being registered or linked.
        entity: EntityId,
    },
}

/// Renormalising a vector against a mask left no surviving possibility.
///
/// The timeline store recovers from this with a guess; it never reaches callers
/// of `measure` or `assert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("No surviving possibility after masking a {states}-state vector")]
pub struct DegenerateForecast {
    /// Length of the masked vector.
    pub states: usize,
}

/// Top-level error type for Branchline.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// Schema loading or compilation failed.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Entity links were rejected.
    #[error("Relationship error: {0}")]
    Relationship(#[from] RelationshipError),

    /// Assertion at the root epoch.
    #[error("Assertion at date {date} rejected: the root epoch carries no entity state")]
    InvalidAssertion {
        /// Asserted date.
        date: Tick,
    },

    /// Masking left nothing to forecast.
    #[error("Degenerate forecast: {0}")]
    DegenerateForecast(#[from] DegenerateForecast),

    /// No type is registered under this name.
    #[error("Unknown entity type '{name}'")]
    UnknownEntityType {
        /// Requested type name.
        name: String,
    },

    /// The entity is not registered with the engine.
    #[error("Entity not found: {id}")]
    UnknownEntity {
        /// Requested identifier.
        id: EntityId,
    },

    /// The type has no such state.
    #[error("Type '{type_name}' has no state '{state}'")]
    UnknownState {
        /// Entity type name.
        type_name: String,
        /// State the error refers to.
        state: String,
    },

    /// No branch exists for this diff.
    #[error("Diff not found: {id}")]
    UnknownDiff {
        /// Requested identifier.
        id: DiffId,
    },

    /// A position of one type was applied to an entity of another.
    #[error("Position of type '{position_type}' cannot be applied to an entity of type '{entity_type}'")]
    PositionTypeMismatch {
        /// Type of the position.
        position_type: String,
        /// Type of the entity.
        entity_type: String,
    },

    /// The configured branch count is reached.
    #[error("Branch limit exceeded (max: {max})")]
    BranchLimitExceeded {
        /// Configured branch limit.
        max: usize,
    },

    /// The engine configuration does not validate.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What failed validation.
        reason: String,
    },

    /// Broken internal bookkeeping.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the inconsistency.
        message: String,
    },
}

impl TimelineError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a schema error.
    #[must_use]
    pub const fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Returns true if this is a relationship error.
    #[must_use]
    pub const fn is_relationship(&self) -> bool {
        matches!(self, Self::Relationship(_))
    }

    /// Returns true if this is an assertion rejected at the root epoch.
    #[must_use]
    pub const fn is_invalid_assertion(&self) -> bool {
        matches!(self, Self::InvalidAssertion { .. })
    }
}

/// Result type alias for Branchline operations.
pub type TimelineResult<T> = Result<T, TimelineError>;
