//! Definite positions.

use serde::{Deserialize, Serialize};

use crate::schema::{EntityTypeSchema, TypeIndex};

use super::StateVector;

/// One definite state of one entity type.
///
/// Obtain positions by name through [`SchemaTable::position`](crate::SchemaTable::position),
/// or from a collapsed vector through [`StateVector::try_as_definite_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    type_index: TypeIndex,
    state: usize,
}

impl Position {
    /// A position of `state` in type `type_index`.
    #[must_use]
    pub const fn new(type_index: TypeIndex, state: usize) -> Self {
        Self { type_index, state }
    }

    /// Schema type the position belongs to.
    #[must_use]
    pub const fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    /// Vector index of the state.
    #[must_use]
    pub const fn state(&self) -> usize {
        self.state
    }

    /// The one-hot vector for this position.
    #[must_use]
    pub fn to_vector(&self, schema: &EntityTypeSchema) -> StateVector {
        StateVector::from_definite_state(self.state, schema.state_count())
    }
}
