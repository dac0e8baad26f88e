//! State-vector algebra and possibility masks.

pub mod mask;
pub mod position;
pub mod vector;

pub use mask::PossibilityMask;
pub use position::Position;
pub use vector::StateVector;
