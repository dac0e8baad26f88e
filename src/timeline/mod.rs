//! Per-branch, run-length compressed timelines.

pub mod branch;
pub mod node;
pub mod store;

pub use branch::Branch;
pub use node::{BranchedNext, NodeIndex, NodeRef, TimelineNode};
pub use store::{Context, Located, UniverseTree};
