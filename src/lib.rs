//! # Branchline - a branching probabilistic timeline store
//!
//! Branchline models entities whose true state at any date is unknown but
//! statistically constrained by a per-type Markov chain. Callers measure or
//! assert states at arbitrary dates; every answer is reconciled against what
//! is already known before and after it on the same timeline. An assertion
//! that contradicts the known future does not rewrite history: it yields a
//! diff, the branch point of an alternate timeline.
//!
//! ## Core Concepts
//!
//! - **Schema**: compiled entity types (states, transition matrix, relations)
//! - **Entity**: an identity registered with its parent and lateral links
//! - **StateVector**: a distribution over a type's states, or the wildcard
//! - **Diff / Universe**: a branch point and a handle for querying it
//! - **Continuity**: one entity's timeline in one universe (`measure`, `assert`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use branchline::{EngineConfig, Entity, SchemaTable, TimelineEngine};
//!
//! let schemas = SchemaTable::from_path("schemas/cosmos.json")?;
//! let galaxy_type = schemas.resolve("Galaxy")?;
//! let active = schemas.position(galaxy_type, "Active")?;
//!
//! let mut engine = TimelineEngine::new(schemas, EngineConfig::default().with_seed(42))?;
//! let galaxy = engine.register(&Entity::new(galaxy_type))?;
//!
//! let root = engine.root_universe();
//! let mut timeline = engine.continuity(&root, galaxy)?;
//! if let Some(diff) = timeline.assert(365_000, active)?.into_diff() {
//!     let alternate = engine.register_universe(&diff)?;
//!     let state = engine.continuity(&alternate, galaxy)?.measure(400_000)?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// Numeric core
pub mod linalg;
pub mod schema;
pub mod state;
pub mod time;

// Objects and timelines
pub mod object;
pub mod timeline;
pub mod universe;

// Engine surface
pub mod config;
pub mod engine;
pub mod error;

pub use config::EngineConfig;
pub use engine::TimelineEngine;
pub use error::{DegenerateForecast, RelationshipError, SchemaError, TimelineError, TimelineResult};
pub use object::{Entity, EntityId, ObjectTree, SuperNodeId};
pub use schema::{EntityTypeRecord, EntityTypeSchema, SchemaTable, StateRecord, TypeIndex};
pub use state::{PossibilityMask, Position, StateVector};
pub use time::{parse_duration, Tick, TickExt};
pub use timeline::UniverseTree;
pub use universe::{Assertion, Continuity, Diff, DiffId, Universe};
