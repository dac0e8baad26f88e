//! Diffs, universes and the per-entity query surface.

pub mod continuity;
pub mod diff;

pub use continuity::{Assertion, Continuity};
pub use diff::{Diff, DiffId, Universe};
