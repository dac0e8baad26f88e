//! Possibility masks: 0/1 admissibility over an entity type's states.

use crate::schema::EntityTypeSchema;
use crate::time::Tick;

use super::StateVector;

/// Which states are still admissible at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PossibilityMask {
    bits: Vec<bool>,
}

impl PossibilityMask {
    /// Every state admitted.
    #[must_use]
    pub fn full(states: usize) -> Self {
        Self {
            bits: vec![true; states],
        }
    }

    /// No state admitted.
    #[must_use]
    pub fn empty(states: usize) -> Self {
        Self {
            bits: vec![false; states],
        }
    }

    /// The support of `vector`. The wildcard admits everything.
    #[must_use]
    pub fn from_vector(vector: &StateVector) -> Self {
        let mut mask = Self::empty(vector.state_count());
        for i in vector.support() {
            mask.bits[i] = true;
        }
        mask
    }

    /// Number of states the mask ranges over.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether no state is admitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|b| *b)
    }

    /// Whether `state` is admitted.
    #[must_use]
    pub fn admits(&self, state: usize) -> bool {
        self.bits.get(state).copied().unwrap_or(false)
    }

    /// Admits or excludes `state`. Out-of-range indices are ignored.
    pub fn set(&mut self, state: usize, admitted: bool) {
        if let Some(bit) = self.bits.get_mut(state) {
            *bit = admitted;
        }
    }

    /// Indices of the admitted states.
    pub fn admitted(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().filter(|(_, b)| **b).map(|(i, _)| i)
    }

    /// Intersection, in place.
    pub fn and(&mut self, other: &Self) {
        for (bit, o) in self.bits.iter_mut().zip(&other.bits) {
            *bit &= *o;
        }
    }

    /// Union, in place.
    pub fn or(&mut self, other: &Self) {
        for (bit, o) in self.bits.iter_mut().zip(&other.bits) {
            *bit |= *o;
        }
    }

    /// Everything reachable from an admitted state in one tick.
    #[must_use]
    pub fn project_forward(&self, schema: &EntityTypeSchema) -> Self {
        let mut out = Self::empty(self.len());
        for from in self.admitted() {
            for to in 0..self.len() {
                if schema.can_step(from, to) {
                    out.bits[to] = true;
                }
            }
        }
        out
    }

    /// Everything that reaches an admitted state in one tick.
    #[must_use]
    pub fn project_backward(&self, schema: &EntityTypeSchema) -> Self {
        let mut out = Self::empty(self.len());
        for from in 0..self.len() {
            if self.admitted().any(|to| schema.can_step(from, to)) {
                out.bits[from] = true;
            }
        }
        out
    }

    /// [`Self::project_forward`] applied once per tick of `steps`.
    ///
    /// Stops at a fix point, which is reached within `len()` steps.
    #[must_use]
    pub fn project_forward_steps(&self, schema: &EntityTypeSchema, steps: Tick) -> Self {
        self.iterate(steps, |mask| mask.project_forward(schema))
    }

    /// [`Self::project_backward`] applied once per tick of `steps`.
    #[must_use]
    pub fn project_backward_steps(&self, schema: &EntityTypeSchema, steps: Tick) -> Self {
        self.iterate(steps, |mask| mask.project_backward(schema))
    }

    fn iterate(&self, steps: Tick, project: impl Fn(&Self) -> Self) -> Self {
        let mut current = self.clone();
        let mut remaining = steps;
        while remaining > 0 {
            let next = project(&current);
            if next == current {
                break;
            }
            current = next;
            remaining -= 1;
        }
        current
    }

    /// The uniform distribution over admitted states.
    #[must_use]
    pub fn balanced(&self) -> Option<StateVector> {
        let admitted: Vec<usize> = self.admitted().collect();
        if admitted.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let share = 1.0 / admitted.len() as f64;
        let mut probabilities = vec![0.0; self.len()];
        for i in admitted {
            probabilities[i] = share;
        }
        StateVector::from_probabilities(&probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityTypeRecord, SchemaTable, StateRecord};

    fn chain() -> SchemaTable {
        SchemaTable::from_records(vec![EntityTypeRecord::new(
            "Chain",
            vec![
                StateRecord::new("A", "1 day").to("B"),
                StateRecord::new("B", "1 day").to("C"),
                StateRecord::new("C", ""),
                StateRecord::new("D", ""),
            ],
        )])
        .unwrap()
    }

    fn mask(bits: &[bool]) -> PossibilityMask {
        PossibilityMask { bits: bits.to_vec() }
    }

    #[test]
    fn from_vector_takes_support() {
        let v = StateVector::from_probabilities(&[0.5, 0.0, 0.5]).unwrap();
        assert_eq!(PossibilityMask::from_vector(&v), mask(&[true, false, true]));
        assert_eq!(
            PossibilityMask::from_vector(&StateVector::wildcard(3)),
            PossibilityMask::full(3)
        );
    }

    #[test]
    fn and_or_are_pointwise() {
        let mut a = mask(&[true, true, false]);
        a.and(&mask(&[false, true, true]));
        assert_eq!(a, mask(&[false, true, false]));

        let mut b = mask(&[true, false, false]);
        b.or(&mask(&[false, false, true]));
        assert_eq!(b, mask(&[true, false, true]));
    }

    #[test]
    fn forward_projection_is_one_step() {
        let table = chain();
        let schema = table.iter().next().unwrap().1;
        let a = mask(&[true, false, false, false]);
        assert_eq!(a.project_forward(schema), mask(&[true, true, false, false]));
        assert_eq!(a.project_forward_steps(schema, 2), mask(&[true, true, true, false]));
        assert_eq!(a.project_forward_steps(schema, u64::MAX), mask(&[true, true, true, false]));
    }

    #[test]
    fn backward_projection_is_one_step() {
        let table = chain();
        let schema = table.iter().next().unwrap().1;
        let c = mask(&[false, false, true, false]);
        assert_eq!(c.project_backward(schema), mask(&[false, true, true, false]));
        assert_eq!(c.project_backward_steps(schema, 5), mask(&[true, true, true, false]));
        assert_eq!(c.project_backward_steps(schema, 0), c);
    }

    #[test]
    fn balanced_over_admitted() {
        let v = mask(&[true, false, true, false]).balanced().unwrap();
        assert_eq!(v.as_slice().unwrap(), &[0.5, 0.0, 0.5, 0.0]);
        assert!(PossibilityMask::empty(3).balanced().is_none());
    }

    #[test]
    fn set_and_admits() {
        let mut m = PossibilityMask::empty(2);
        assert!(m.is_empty());
        m.set(1, true);
        assert!(m.admits(1));
        assert!(!m.admits(0));
        assert!(!m.admits(7));
        m.set(7, true);
        assert_eq!(m.len(), 2);
    }
}
