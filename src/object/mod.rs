//! Entity handles and the object relationship tree.

pub mod entity;
pub mod tree;

pub use entity::{Entity, EntityId};
pub use tree::{LateralLink, ObjectNode, ObjectTree, SuperNodeId};
