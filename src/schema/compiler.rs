//! Schema compilation: records in, dense matrices out.
//!
//! Key invariants:
//! - Every row of a compiled transition matrix sums to 1 (within 1e-8).
//! - A state without declared transitions is absorbing (`T[i][i] = 1`).
//! - Every row of a translation matrix sums to 1; related states without a
//!   declared correlation translate to the uniform row.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use nalgebra::DMatrix;

use crate::error::SchemaError;
use crate::time::{parse_duration, Tick};

use super::document::{EntityTypeRecord, WeightedState};
use super::table::TypeIndex;

/// Tolerance for stochastic sums.
pub const STOCHASTIC_EPSILON: f64 = 1e-8;

/// Read-only view of every record in a document, used to resolve
/// cross-type references while compiling one type.
pub(crate) struct Catalog<'a> {
    pub(crate) records: &'a [EntityTypeRecord],
    pub(crate) by_name: &'a HashMap<String, TypeIndex>,
}

impl Catalog<'_> {
    fn lookup(&self, name: &str) -> Option<(TypeIndex, &EntityTypeRecord)> {
        let index = *self.by_name.get(name)?;
        self.records.get(index.as_usize()).map(|record| (index, record))
    }
}

/// A compiled state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    /// State name.
    pub name: String,
    /// Mean residency in ticks.
    pub target_length: Tick,
}

/// A compiled relation to another entity type.
#[derive(Debug)]
pub struct Relation {
    key: String,
    related: TypeIndex,
    related_type: String,
    related_states: usize,
    /// Per state of this type: `(related state index, weight)` pairs.
    correlations: Vec<Vec<(usize, f64)>>,
    translation: OnceLock<DMatrix<f64>>,
}

impl Relation {
    /// Relation key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Index of the related type in the schema table.
    #[must_use]
    pub const fn related(&self) -> TypeIndex {
        self.related
    }

    /// Name of the related type.
    #[must_use]
    pub fn related_type(&self) -> &str {
        &self.related_type
    }

    /// Translation matrix: rows are the related type's states, columns this
    /// type's states. Built on first use and cached.
    pub fn translation(&self) -> &DMatrix<f64> {
        self.translation.get_or_init(|| self.build_translation())
    }

    fn build_translation(&self) -> DMatrix<f64> {
        let columns = self.correlations.len();
        let mut matrix = DMatrix::zeros(self.related_states, columns);

        for (column, pairs) in self.correlations.iter().enumerate() {
            for &(row, weight) in pairs {
                matrix[(row, column)] += weight;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let uniform = 1.0 / columns as f64;
        for row in 0..self.related_states {
            let total: f64 = matrix.row(row).sum();
            if total > 0.0 {
                for column in 0..columns {
                    matrix[(row, column)] /= total;
                }
            } else {
                matrix.row_mut(row).fill(uniform);
            }
        }

        matrix
    }
}

/// Immutable, compiled description of one entity type.
#[derive(Debug)]
pub struct EntityTypeSchema {
    name: String,
    states: Vec<StateInfo>,
    indices: HashMap<String, usize>,
    transition: DMatrix<f64>,
    parent_key: Option<String>,
    relations: BTreeMap<String, Relation>,
}

impl EntityTypeSchema {
    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compiled states, in vector order.
    #[must_use]
    pub fn states(&self) -> &[StateInfo] {
        &self.states
    }

    /// Number of states (the length of every vector over this type).
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Vector index of the named state.
    #[must_use]
    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    /// Name of the state at `index`.
    #[must_use]
    pub fn state_name(&self, index: usize) -> Option<&str> {
        self.states.get(index).map(|s| s.name.as_str())
    }

    /// Row-stochastic one-tick transition matrix.
    #[must_use]
    pub const fn transition_matrix(&self) -> &DMatrix<f64> {
        &self.transition
    }

    /// Relation key of the parent link, if any.
    #[must_use]
    pub fn parent_key(&self) -> Option<&str> {
        self.parent_key.as_deref()
    }

    /// Relation declared under `key`.
    #[must_use]
    pub fn relation(&self, key: &str) -> Option<&Relation> {
        self.relations.get(key)
    }

    /// Every declared relation, ordered by key.
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    /// Whether a one-tick transition from `from` to `to` has non-zero probability.
    #[must_use]
    pub fn can_step(&self, from: usize, to: usize) -> bool {
        from < self.states.len() && to < self.states.len() && self.transition[(from, to)] > 0.0
    }
}

fn check_weight(type_name: &str, state: &str, weight: f64) -> Result<(), SchemaError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(SchemaError::InvalidWeight {
            type_name: type_name.to_string(),
            state: state.to_string(),
            weight,
        })
    }
}

/// Self-transition probability giving a mean residency of `target_length`
/// ticks under a geometric holding-time model.
#[must_use]
pub fn residency_probability(target_length: Tick) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let exponent = 1.0 / target_length as f64;
    0.5f64.powf(exponent)
}

fn compile_row(
    record: &EntityTypeRecord,
    row: usize,
    transitions: &[WeightedState],
    target_length: Tick,
    indices: &HashMap<String, usize>,
    matrix: &mut DMatrix<f64>,
) -> Result<(), SchemaError> {
    let type_name = record.type_name.as_str();
    let state = record.states[row].state_name.as_str();

    if transitions.is_empty() {
        matrix[(row, row)] = 1.0;
        return Ok(());
    }

    if target_length == 0 {
        return Err(SchemaError::ZeroTargetLength {
            type_name: type_name.to_string(),
            state: state.to_string(),
        });
    }

    let mut total = 0.0;
    for transition in transitions {
        check_weight(type_name, state, transition.weight)?;
        total += transition.weight;
    }

    let mut normalized_sum = 0.0;
    let mut weights = vec![0.0; matrix.ncols()];
    for transition in transitions {
        let target = *indices.get(&transition.state_name).ok_or_else(|| {
            SchemaError::UnknownTransitionTarget {
                type_name: type_name.to_string(),
                state: state.to_string(),
                target: transition.state_name.clone(),
            }
        })?;
        if target == row {
            return Err(SchemaError::SelfTransition {
                type_name: type_name.to_string(),
                state: state.to_string(),
            });
        }
        let normalized = transition.weight / total;
        weights[target] += normalized;
        normalized_sum += normalized;
    }

    if !((normalized_sum - 1.0).abs() <= STOCHASTIC_EPSILON) {
        return Err(SchemaError::TransitionsNotNormalized {
            type_name: type_name.to_string(),
            state: state.to_string(),
            total: normalized_sum,
        });
    }

    let stay = residency_probability(target_length);
    for (column, weight) in weights.into_iter().enumerate() {
        matrix[(row, column)] = if column == row { stay } else { weight * (1.0 - stay) };
    }

    Ok(())
}

/// Compiles one entity-type record against the whole document.
pub(crate) fn compile(record: &EntityTypeRecord, catalog: &Catalog<'_>) -> Result<EntityTypeSchema, SchemaError> {
    let type_name = record.type_name.clone();

    if record.states.is_empty() {
        return Err(SchemaError::NoStates { type_name });
    }

    let mut indices = HashMap::with_capacity(record.states.len());
    for (index, state) in record.states.iter().enumerate() {
        if indices.insert(state.state_name.clone(), index).is_some() {
            return Err(SchemaError::DuplicateState {
                type_name,
                state: state.state_name.clone(),
            });
        }
    }

    // Relations first: constraints resolve against them.
    let mut relations = BTreeMap::new();
    for relation in &record.relations {
        if relations.contains_key(&relation.key_name) {
            return Err(SchemaError::DuplicateRelation {
                type_name,
                key: relation.key_name.clone(),
            });
        }
        let (related, related_record) = catalog.lookup(&relation.type_name).ok_or_else(|| {
            SchemaError::UnknownRelatedType {
                type_name: type_name.clone(),
                key: relation.key_name.clone(),
                related: relation.type_name.clone(),
            }
        })?;
        relations.insert(
            relation.key_name.clone(),
            Relation {
                key: relation.key_name.clone(),
                related,
                related_type: related_record.type_name.clone(),
                related_states: related_record.states.len(),
                correlations: vec![Vec::new(); record.states.len()],
                translation: OnceLock::new(),
            },
        );
    }

    if let Some(parent_key) = &record.parent_key {
        if !relations.contains_key(parent_key) {
            return Err(SchemaError::UnknownRelation {
                type_name,
                key: parent_key.clone(),
            });
        }
    }

    let count = record.states.len();
    let mut transition = DMatrix::zeros(count, count);
    let mut states = Vec::with_capacity(count);

    for (row, state) in record.states.iter().enumerate() {
        let target_length = parse_duration(&state.target_length, &state.state_name)?;
        compile_row(record, row, &state.transitions, target_length, &indices, &mut transition)?;

        for constraint in &state.constraints {
            let relation = relations.get_mut(&constraint.key_name).ok_or_else(|| {
                SchemaError::UnknownRelation {
                    type_name: type_name.clone(),
                    key: constraint.key_name.clone(),
                }
            })?;
            let related_record = &catalog.records[relation.related.as_usize()];

            for correlated in &constraint.constrained_states {
                check_weight(&type_name, &state.state_name, correlated.weight)?;
                let related_index = related_record
                    .states
                    .iter()
                    .position(|s| s.state_name == correlated.state_name)
                    .ok_or_else(|| SchemaError::UnknownConstrainedState {
                        type_name: type_name.clone(),
                        state: state.state_name.clone(),
                        key: constraint.key_name.clone(),
                        related_state: correlated.state_name.clone(),
                    })?;
                relation.correlations[row].push((related_index, correlated.weight));
            }
        }

        let row_sum: f64 = transition.row(row).sum();
        if !((row_sum - 1.0).abs() <= STOCHASTIC_EPSILON) {
            return Err(SchemaError::TransitionsNotNormalized {
                type_name,
                state: state.state_name.clone(),
                total: row_sum,
            });
        }

        states.push(StateInfo {
            name: state.state_name.clone(),
            target_length,
        });
    }

    Ok(EntityTypeSchema {
        name: type_name,
        states,
        indices,
        transition,
        parent_key: record.parent_key.clone(),
        relations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::document::StateRecord;
    use approx::assert_abs_diff_eq;

    fn compile_one(record: EntityTypeRecord) -> Result<EntityTypeSchema, SchemaError> {
        compile_all(vec![record]).map(|mut v| v.remove(0))
    }

    fn compile_all(records: Vec<EntityTypeRecord>) -> Result<Vec<EntityTypeSchema>, SchemaError> {
        let by_name: HashMap<String, TypeIndex> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.type_name.clone(), TypeIndex::new(i)))
            .collect();
        let catalog = Catalog {
            records: &records,
            by_name: &by_name,
        };
        records.iter().map(|r| compile(r, &catalog)).collect()
    }

    fn two_state() -> EntityTypeRecord {
        EntityTypeRecord::new(
            "Cell",
            vec![StateRecord::new("A", "2 days").to("B"), StateRecord::new("B", "")],
        )
    }

    #[test]
    fn state_without_transitions_is_absorbing() {
        let schema = compile_one(two_state()).unwrap();
        let t = schema.transition_matrix();
        assert_eq!(t[(1, 0)], 0.0);
        assert_eq!(t[(1, 1)], 1.0);
    }

    #[test]
    fn residency_sets_self_probability() {
        let schema = compile_one(two_state()).unwrap();
        let t = schema.transition_matrix();
        let p = 0.5f64.powf(0.5);
        assert_abs_diff_eq!(t[(0, 0)], p, epsilon = 1e-12);
        assert_abs_diff_eq!(t[(0, 1)], 1.0 - p, epsilon = 1e-12);
        assert_abs_diff_eq!(t[(0, 0)], 0.707_106_781, epsilon = 1e-9);
    }

    #[test]
    fn weighted_transitions_split_the_departure_mass() {
        let record = EntityTypeRecord::new(
            "Cell",
            vec![
                StateRecord::new("A", "1 day").to_weighted("B", 3.0).to_weighted("C", 1.0),
                StateRecord::new("B", ""),
                StateRecord::new("C", ""),
            ],
        );
        let schema = compile_one(record).unwrap();
        let t = schema.transition_matrix();
        assert_abs_diff_eq!(t[(0, 0)], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(t[(0, 1)], 0.375, epsilon = 1e-12);
        assert_abs_diff_eq!(t[(0, 2)], 0.125, epsilon = 1e-12);
    }

    #[test]
    fn rows_sum_to_one() {
        let record = EntityTypeRecord::new(
            "Star",
            vec![
                StateRecord::new("Cloud", "3 million years").to("Main").to_weighted("Dwarf", 0.25),
                StateRecord::new("Main", "10 billion years").to("Giant"),
                StateRecord::new("Giant", "1 billion years").to("Dwarf"),
                StateRecord::new("Dwarf", ""),
            ],
        );
        let schema = compile_one(record).unwrap();
        for row in 0..schema.state_count() {
            assert_abs_diff_eq!(schema.transition_matrix().row(row).sum(), 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn rejects_unknown_target() {
        let record = EntityTypeRecord::new("Cell", vec![StateRecord::new("A", "1 day").to("Z")]);
        assert!(matches!(
            compile_one(record).unwrap_err(),
            SchemaError::UnknownTransitionTarget { .. }
        ));
    }

    #[test]
    fn rejects_self_transition() {
        let record = EntityTypeRecord::new("Cell", vec![StateRecord::new("A", "1 day").to("A")]);
        assert!(matches!(compile_one(record).unwrap_err(), SchemaError::SelfTransition { .. }));
    }

    #[test]
    fn rejects_zero_weights() {
        let record = EntityTypeRecord::new(
            "Cell",
            vec![StateRecord::new("A", "1 day").to_weighted("B", 0.0), StateRecord::new("B", "")],
        );
        assert!(matches!(
            compile_one(record).unwrap_err(),
            SchemaError::TransitionsNotNormalized { .. }
        ));
    }

    #[test]
    fn rejects_negative_weights() {
        let record = EntityTypeRecord::new(
            "Cell",
            vec![StateRecord::new("A", "1 day").to_weighted("B", -1.0), StateRecord::new("B", "")],
        );
        assert!(matches!(compile_one(record).unwrap_err(), SchemaError::InvalidWeight { .. }));
    }

    #[test]
    fn rejects_zero_length_with_transitions() {
        let record = EntityTypeRecord::new(
            "Cell",
            vec![StateRecord::new("A", "").to("B"), StateRecord::new("B", "")],
        );
        assert!(matches!(compile_one(record).unwrap_err(), SchemaError::ZeroTargetLength { .. }));
    }

    #[test]
    fn rejects_duplicate_states_and_empty_types() {
        let record = EntityTypeRecord::new(
            "Cell",
            vec![StateRecord::new("A", ""), StateRecord::new("A", "")],
        );
        assert!(matches!(compile_one(record).unwrap_err(), SchemaError::DuplicateState { .. }));

        let record = EntityTypeRecord::new("Cell", Vec::new());
        assert!(matches!(compile_one(record).unwrap_err(), SchemaError::NoStates { .. }));
    }

    #[test]
    fn parent_key_must_be_a_relation() {
        let mut record = two_state();
        record.parent_key = Some("host".to_string());
        assert!(matches!(compile_one(record).unwrap_err(), SchemaError::UnknownRelation { .. }));
    }

    #[test]
    fn translation_normalizes_per_related_state() {
        let host = EntityTypeRecord::new(
            "Host",
            vec![StateRecord::new("Up", ""), StateRecord::new("Down", ""), StateRecord::new("Gone", "")],
        );
        let guest = EntityTypeRecord::new(
            "Guest",
            vec![
                StateRecord::new("Running", "")
                    .correlated("host", "Up", 3.0)
                    .correlated("host", "Down", 1.0),
                StateRecord::new("Stopped", "")
                    .correlated("host", "Up", 1.0)
                    .correlated("host", "Down", 1.0),
            ],
        )
        .parent("host", "Host");

        let compiled = compile_all(vec![host, guest]).unwrap();
        let relation = compiled[1].relation("host").unwrap();
        assert_eq!(relation.related(), TypeIndex::new(0));

        let m = relation.translation();
        assert_eq!(m.nrows(), 3);
        assert_eq!(m.ncols(), 2);
        assert_abs_diff_eq!(m[(0, 0)], 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(m[(0, 1)], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(m[(1, 0)], 0.5, epsilon = 1e-12);
        // "Gone" has no declared correlation.
        assert_abs_diff_eq!(m[(2, 0)], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m[(2, 1)], 0.5, epsilon = 1e-12);

        // Cached: same allocation on the second call.
        assert!(std::ptr::eq(relation.translation(), m));
    }

    #[test]
    fn rejects_unknown_constrained_state() {
        let host = EntityTypeRecord::new("Host", vec![StateRecord::new("Up", "")]);
        let guest = EntityTypeRecord::new(
            "Guest",
            vec![StateRecord::new("Running", "").correlated("host", "Sideways", 1.0)],
        )
        .relation("host", "Host");
        assert!(matches!(
            compile_all(vec![host, guest]).unwrap_err(),
            SchemaError::UnknownConstrainedState { .. }
        ));
    }

    #[test]
    fn rejects_unknown_related_type() {
        let guest = EntityTypeRecord::new("Guest", vec![StateRecord::new("Running", "")])
            .relation("host", "Host");
        assert!(matches!(
            compile_one(guest).unwrap_err(),
            SchemaError::UnknownRelatedType { .. }
        ));
    }
}
