//! Declarative schema records.
//!
//! These mirror the JSON schema document one-to-one. They carry no derived
//! data; compilation into matrices happens in [`super::compiler`].

use serde::{Deserialize, Serialize};

fn default_weight() -> f64 {
    1.0
}

/// One entity type: its states and the relations it participates in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeRecord {
    /// Schema key of the type.
    pub type_name: String,

    /// Relation key that names the parent link, if the type has one.
    ///
    /// Must match one of `lateral_objects`, which supplies the parent's type
    /// and the translation matrix.
    #[serde(default, rename = "parent_key_name", skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,

    /// Named relations to other entity types.
    #[serde(default, rename = "lateral_objects")]
    pub relations: Vec<RelationRecord>,

    /// Ordered states; the order fixes each state's vector index.
    pub states: Vec<StateRecord>,
}

/// A named relation from one entity type to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    /// Type on the other end of the relation.
    pub type_name: String,
    /// Relation key, unique within the declaring type.
    pub key_name: String,
}

/// One possible condition of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// State name, unique within the type.
    pub state_name: String,

    /// Duration expression, e.g. `"10 billion years"`.
    #[serde(default)]
    pub target_length: String,

    /// Outgoing transitions with relative weights.
    #[serde(default, rename = "transitions_to")]
    pub transitions: Vec<WeightedState>,

    /// Correlations with related types, one entry per relation key.
    #[serde(default)]
    pub constraints: Vec<ConstraintRecord>,
}

/// A state name paired with a relative weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedState {
    /// Name of the referenced state.
    pub state_name: String,

    /// Relative weight; normalised per state.
    #[serde(default = "default_weight", rename = "probability")]
    pub weight: f64,
}

impl WeightedState {
    /// A state reference carrying the default weight of 1.
    #[must_use]
    pub fn new(state_name: impl Into<String>) -> Self {
        Self {
            state_name: state_name.into(),
            weight: default_weight(),
        }
    }

    /// A state reference with an explicit weight.
    #[must_use]
    pub fn weighted(state_name: impl Into<String>, weight: f64) -> Self {
        Self {
            state_name: state_name.into(),
            weight,
        }
    }
}

/// Correlations between one state and the states of a related type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    /// Relation key this constraint applies to.
    pub key_name: String,

    /// Related states and their weights.
    #[serde(default)]
    pub constrained_states: Vec<WeightedState>,
}

impl StateRecord {
    /// A state with a target length and no transitions or constraints.
    #[must_use]
    pub fn new(state_name: impl Into<String>, target_length: impl Into<String>) -> Self {
        Self {
            state_name: state_name.into(),
            target_length: target_length.into(),
            transitions: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Adds a transition with the default weight.
    #[must_use]
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.transitions.push(WeightedState::new(target));
        self
    }

    /// Adds a weighted transition.
    #[must_use]
    pub fn to_weighted(mut self, target: impl Into<String>, weight: f64) -> Self {
        self.transitions.push(WeightedState::weighted(target, weight));
        self
    }

    /// Adds a weighted correlation with `related_state` through relation `key`.
    #[must_use]
    pub fn correlated(mut self, key: &str, related_state: impl Into<String>, weight: f64) -> Self {
        let entry = WeightedState::weighted(related_state, weight);
        match self.constraints.iter_mut().find(|c| c.key_name == key) {
            Some(constraint) => constraint.constrained_states.push(entry),
            None => self.constraints.push(ConstraintRecord {
                key_name: key.to_string(),
                constrained_states: vec![entry],
            }),
        }
        self
    }
}

impl EntityTypeRecord {
    /// A type with no relations.
    #[must_use]
    pub fn new(type_name: impl Into<String>, states: Vec<StateRecord>) -> Self {
        Self {
            type_name: type_name.into(),
            parent_key: None,
            relations: Vec::new(),
            states,
        }
    }

    /// Declares a relation.
    #[must_use]
    pub fn relation(mut self, key_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.relations.push(RelationRecord {
            type_name: type_name.into(),
            key_name: key_name.into(),
        });
        self
    }

    /// Declares a relation and marks it as the parent link.
    #[must_use]
    pub fn parent(mut self, key_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let key_name = key_name.into();
        self.parent_key = Some(key_name.clone());
        self.relation(key_name, type_name)
    }
}
