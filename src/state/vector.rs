//! Probability distributions over an entity type's states.

use std::fmt;

use nalgebra::{DMatrix, RowDVector};
use rand::Rng;

use crate::error::DegenerateForecast;
use crate::linalg;
use crate::schema::{EntityTypeSchema, STOCHASTIC_EPSILON};
use crate::time::Tick;

use super::mask::PossibilityMask;

/// A distribution over an entity type's states at one instant, or the
/// explicit wildcard ("totally unknown").
///
/// The wildcard is distinct from the balanced distribution: it has no
/// support to divide by, and it only equals another wildcard.
///
/// Equality is exact. Vectors that differ by rounding are different states
/// for run-length compression.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    states: usize,
    probabilities: Option<RowDVector<f64>>,
}

#[allow(clippy::cast_precision_loss)]
fn uniform(states: usize) -> f64 {
    1.0 / states as f64
}

impl StateVector {
    /// The "totally unknown" marker.
    #[must_use]
    pub const fn wildcard(states: usize) -> Self {
        Self {
            states,
            probabilities: None,
        }
    }

    /// The uniform distribution, the unconditioned prior.
    #[must_use]
    pub fn balanced(states: usize) -> Self {
        Self {
            states,
            probabilities: Some(RowDVector::from_element(states, uniform(states))),
        }
    }

    /// The one-hot vector for `state`.
    ///
    /// # Panics
    ///
    /// Panics if `state >= states`.
    #[must_use]
    pub fn from_definite_state(state: usize, states: usize) -> Self {
        assert!(state < states, "state index {state} out of range for {states} states");
        let mut v = RowDVector::zeros(states);
        v[state] = 1.0;
        Self {
            states,
            probabilities: Some(v),
        }
    }

    /// Wraps an explicit distribution.
    ///
    /// Returns `None` unless every entry is finite and non-negative and the
    /// entries sum to 1 within 1e-8.
    #[must_use]
    pub fn from_probabilities(probabilities: &[f64]) -> Option<Self> {
        if probabilities.is_empty() || probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return None;
        }
        let total: f64 = probabilities.iter().sum();
        if (total - 1.0).abs() > STOCHASTIC_EPSILON {
            return None;
        }
        Some(Self {
            states: probabilities.len(),
            probabilities: Some(RowDVector::from_row_slice(probabilities)),
        })
    }

    fn from_row(row: RowDVector<f64>) -> Self {
        Self {
            states: row.len(),
            probabilities: Some(row),
        }
    }

    /// Whether nothing is known about the distribution.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.probabilities.is_none()
    }

    /// Number of states this vector ranges over.
    #[must_use]
    pub const fn state_count(&self) -> usize {
        self.states
    }

    /// Probability of `state`; `None` for the wildcard or an out-of-range index.
    #[must_use]
    pub fn probability(&self, state: usize) -> Option<f64> {
        let v = self.probabilities.as_ref()?;
        (state < v.len()).then(|| v[state])
    }

    /// The probabilities; `None` for the wildcard.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[f64]> {
        self.probabilities.as_ref().map(|v| v.as_slice())
    }

    /// Indices with non-zero probability. Every index for the wildcard.
    pub fn support(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.states).filter(move |&i| self.probabilities.as_ref().map_or(true, |v| v[i] != 0.0))
    }

    /// The state index, if exactly one entry is non-zero.
    #[must_use]
    pub fn try_as_definite_state(&self) -> Option<usize> {
        let v = self.probabilities.as_ref()?;
        let mut found = None;
        for (i, p) in v.iter().enumerate() {
            if *p != 0.0 {
                if found.is_some() {
                    return None;
                }
                found = Some(i);
            }
        }
        found
    }

    /// The distribution after `elapsed` ticks of Markov transition.
    ///
    /// The wildcard transitions to the balanced distribution.
    #[must_use]
    pub fn transition(&self, schema: &EntityTypeSchema, elapsed: Tick) -> Self {
        match &self.probabilities {
            None => Self::balanced(self.states),
            Some(v) => Self::from_row(linalg::advance(v, schema.transition_matrix(), elapsed)),
        }
    }

    /// Whether one tick of transition can reach `candidate`.
    #[must_use]
    pub fn is_transitionable_to(&self, schema: &EntityTypeSchema, candidate: usize) -> bool {
        if self.is_wildcard() {
            return true;
        }
        self.transition(schema, 1)
            .probability(candidate)
            .is_some_and(|p| p > 0.0)
    }

    /// Whether `candidate` is reachable within `steps` ticks.
    ///
    /// One step is exactly [`Self::is_transitionable_to`]; zero steps asks
    /// whether `candidate` is already possible.
    #[must_use]
    pub fn is_reachable_within(&self, schema: &EntityTypeSchema, candidate: usize, steps: Tick) -> bool {
        match steps {
            0 => self.probability(candidate).map_or(self.is_wildcard(), |p| p > 0.0),
            1 => self.is_transitionable_to(schema, candidate),
            _ => PossibilityMask::from_vector(self)
                .project_forward_steps(schema, steps)
                .admits(candidate),
        }
    }

    /// Samples a definite state by inverse-CDF sampling.
    ///
    /// Deterministic for a given random source state. The wildcard collapses
    /// as the balanced distribution.
    #[must_use]
    pub fn collapse<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let balanced;
        let v = match &self.probabilities {
            Some(v) => v,
            None => {
                balanced = RowDVector::from_element(self.states, uniform(self.states));
                &balanced
            }
        };

        let mut remainder: f64 = rng.gen();
        let mut last_possible = 0;
        for (i, p) in v.iter().enumerate() {
            if *p > 0.0 {
                last_possible = i;
            }
            remainder -= p;
            if remainder < 0.0 {
                return Self::from_definite_state(i, self.states);
            }
        }

        // Rounding left the draw above the cumulative sum.
        Self::from_definite_state(last_possible, self.states)
    }

    /// Applies a possibility mask.
    ///
    /// Mass on excluded indices is removed and spread uniformly over the
    /// surviving possibilities (admitted indices with non-zero probability).
    /// The wildcard becomes the balanced distribution over the mask.
    ///
    /// # Errors
    ///
    /// `DegenerateForecast` when nothing survives.
    pub fn masked(&self, mask: &PossibilityMask) -> Result<Self, DegenerateForecast> {
        let degenerate = DegenerateForecast { states: self.states };

        let Some(v) = &self.probabilities else {
            return mask.balanced().ok_or(degenerate);
        };

        let survivors: Vec<usize> = (0..self.states)
            .filter(|&i| mask.admits(i) && v[i] > 0.0)
            .collect();
        if survivors.is_empty() {
            return Err(degenerate);
        }

        let removed: f64 = (0..self.states).filter(|&i| !mask.admits(i)).map(|i| v[i]).sum();
        #[allow(clippy::cast_precision_loss)]
        let share = removed / survivors.len() as f64;

        let mut out = RowDVector::zeros(self.states);
        for i in survivors {
            out[i] = v[i] + share;
        }
        Ok(Self::from_row(out))
    }

    /// Maps this vector onto another type's states through a translation
    /// matrix (rows: this vector's states, columns: the target's states).
    ///
    /// The wildcard translates as the balanced distribution.
    #[must_use]
    pub fn translate(&self, matrix: &DMatrix<f64>) -> Self {
        let balanced;
        let v = match &self.probabilities {
            Some(v) => v,
            None => {
                balanced = RowDVector::from_element(matrix.nrows(), uniform(matrix.nrows()));
                &balanced
            }
        };

        let mut out: RowDVector<f64> = v * matrix;
        let total = out.sum();
        if total > 0.0 && (total - 1.0).abs() > f64::EPSILON {
            out /= total;
        }
        Self::from_row(out)
    }

    /// Uniform average of several vectors over the same states.
    ///
    /// Wildcards count as the balanced distribution. `None` for an empty input.
    #[must_use]
    pub fn average<'a>(vectors: impl IntoIterator<Item = &'a StateVector>) -> Option<Self> {
        let mut sum: Option<RowDVector<f64>> = None;
        let mut count = 0usize;

        for vector in vectors {
            let row = match &vector.probabilities {
                Some(v) => v.clone(),
                None => RowDVector::from_element(vector.states, uniform(vector.states)),
            };
            sum = Some(match sum {
                Some(acc) => acc + row,
                None => row,
            });
            count += 1;
        }

        #[allow(clippy::cast_precision_loss)]
        sum.map(|acc| Self::from_row(acc / count as f64))
    }
}

impl fmt::Display for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.probabilities {
            None => write!(f, "[any; {}]", self.states),
            Some(v) => {
                write!(f, "[")?;
                for (i, p) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p:.4}")?;
                }
                write!(f, "]")
            }
        }
    }
}
