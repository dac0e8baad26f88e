//! Entity-type schemas: declarative records, compilation and lookup.

pub mod compiler;
pub mod document;
pub mod table;

pub use compiler::{residency_probability, EntityTypeSchema, Relation, StateInfo, STOCHASTIC_EPSILON};
pub use document::{ConstraintRecord, EntityTypeRecord, RelationRecord, StateRecord, WeightedState};
pub use table::{SchemaTable, TypeIndex};
