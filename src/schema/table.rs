//! Typed schema table.
//!
//! Entity types are bound to their schema explicitly, by key, once at
//! startup. Every later lookup goes through a [`TypeIndex`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, TimelineError, TimelineResult};
use crate::state::Position;

use super::compiler::{compile, Catalog, EntityTypeSchema, Relation};
use super::document::EntityTypeRecord;

/// Index of an entity type inside a [`SchemaTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeIndex(usize);

impl TypeIndex {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the type in its table.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Every compiled entity type of one schema document.
#[derive(Debug)]
pub struct SchemaTable {
    types: Vec<EntityTypeSchema>,
    by_name: HashMap<String, TypeIndex>,
}

impl SchemaTable {
    /// Compiles a set of entity-type records.
    ///
    /// # Errors
    ///
    /// Returns the first `SchemaError` found; nothing is partially compiled.
    pub fn from_records(records: Vec<EntityTypeRecord>) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if by_name.insert(record.type_name.clone(), TypeIndex::new(index)).is_some() {
                return Err(SchemaError::DuplicateType {
                    type_name: record.type_name.clone(),
                });
            }
        }

        let catalog = Catalog {
            records: &records,
            by_name: &by_name,
        };
        let types = records
            .iter()
            .map(|record| compile(record, &catalog))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(types = types.len(), "compiled schema table");
        Ok(Self { types, by_name })
    }

    /// Parses and compiles a JSON schema document (an array of type records).
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let records: Vec<EntityTypeRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Reads, parses and compiles a JSON schema file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Resolves a schema key to its type index.
    pub fn resolve(&self, type_name: &str) -> TimelineResult<TypeIndex> {
        self.by_name
            .get(type_name)
            .copied()
            .ok_or_else(|| TimelineError::UnknownEntityType {
                name: type_name.to_string(),
            })
    }

    /// The compiled type at `index`, if any.
    #[must_use]
    pub fn get(&self, index: TypeIndex) -> Option<&EntityTypeSchema> {
        self.types.get(index.0)
    }

    /// Like [`Self::get`], for indices that must come from this table.
    pub fn schema(&self, index: TypeIndex) -> TimelineResult<&EntityTypeSchema> {
        self.get(index)
            .ok_or_else(|| TimelineError::internal(format!("{index} is not part of this schema table")))
    }

    /// Builds a definite position from a state name.
    pub fn position(&self, index: TypeIndex, state_name: &str) -> TimelineResult<Position> {
        let schema = self.schema(index)?;
        let state = schema
            .state_index(state_name)
            .ok_or_else(|| TimelineError::UnknownState {
                type_name: schema.name().to_string(),
                state: state_name.to_string(),
            })?;
        Ok(Position::new(index, state))
    }

    /// Name of the state a position refers to.
    #[must_use]
    pub fn state_name(&self, position: Position) -> Option<&str> {
        self.get(position.type_index())?.state_name(position.state())
    }

    /// Relation `key` of type `index`, if declared.
    #[must_use]
    pub fn relation(&self, index: TypeIndex, key: &str) -> Option<&Relation> {
        self.get(index)?.relation(key)
    }

    /// Number of compiled types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the table holds no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Every compiled type with its index.
    pub fn iter(&self) -> impl Iterator<Item = (TypeIndex, &EntityTypeSchema)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, schema)| (TypeIndex::new(i), schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const COSMOS: &str = r#"[
        {
            "type_name": "Galaxy",
            "states": [
                {"state_name": "Initial", "target_length": "1 billion years", "transitions_to": [{"state_name": "Active"}]},
                {"state_name": "Active", "target_length": "10 billion years", "transitions_to": [{"state_name": "Dead"}]},
                {"state_name": "Dead"}
            ]
        },
        {
            "type_name": "Star",
            "parent_key_name": "galaxy",
            "lateral_objects": [{"type_name": "Galaxy", "key_name": "galaxy"}],
            "states": [
                {"state_name": "Main", "target_length": "5 billion years", "transitions_to": [{"state_name": "Remnant"}],
                 "constraints": [{"key_name": "galaxy", "constrained_states": [{"state_name": "Active"}]}]},
                {"state_name": "Remnant",
                 "constraints": [{"key_name": "galaxy", "constrained_states": [{"state_name": "Dead"}]}]}
            ]
        }
    ]"#;

    #[test]
    fn loads_json_document() {
        let table = SchemaTable::from_json_str(COSMOS).unwrap();
        assert_eq!(table.len(), 2);

        let star = table.resolve("Star").unwrap();
        let schema = table.schema(star).unwrap();
        assert_eq!(schema.parent_key(), Some("galaxy"));
        assert_eq!(schema.state_count(), 2);

        let relation = table.relation(star, "galaxy").unwrap();
        assert_eq!(relation.related(), table.resolve("Galaxy").unwrap());
        assert_eq!(relation.translation().nrows(), 3);
    }

    #[test]
    fn resolves_positions_by_name() {
        let table = SchemaTable::from_json_str(COSMOS).unwrap();
        let galaxy = table.resolve("Galaxy").unwrap();
        let position = table.position(galaxy, "Active").unwrap();
        assert_eq!(position.state(), 1);
        assert_eq!(table.state_name(position), Some("Active"));

        let err = table.position(galaxy, "Exploded").unwrap_err();
        assert!(matches!(err, TimelineError::UnknownState { .. }));
    }

    #[test]
    fn unknown_type_is_reported() {
        let table = SchemaTable::from_json_str(COSMOS).unwrap();
        assert!(matches!(
            table.resolve("Planet").unwrap_err(),
            TimelineError::UnknownEntityType { .. }
        ));
    }

    #[test]
    fn rejects_duplicate_types() {
        let json = r#"[{"type_name": "A", "states": [{"state_name": "x"}]},
                       {"type_name": "A", "states": [{"state_name": "y"}]}]"#;
        assert!(matches!(
            SchemaTable::from_json_str(json).unwrap_err(),
            SchemaError::DuplicateType { .. }
        ));
    }

    #[test]
    fn malformed_json_is_a_schema_error() {
        assert!(matches!(
            SchemaTable::from_json_str("{not json").unwrap_err(),
            SchemaError::Json(_)
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cosmos.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(COSMOS.as_bytes()).unwrap();

        let table = SchemaTable::from_path(&path).unwrap();
        assert!(table.resolve("Galaxy").is_ok());

        let missing = SchemaTable::from_path(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, SchemaError::Io(_)));
    }
}
