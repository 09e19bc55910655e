use crate::{
    EntityGraphError,
    definition::{Cardinality, DataType, Multiplicity, SchemaDefinition, edge_label_name},
};

use super::{ArtifactCoordinates, ArtifactEntry, edges, properties};

pub fn artifact_schema() -> Result<SchemaDefinition, EntityGraphError> {
    SchemaDefinition::builder()
        .property_key(properties::UUID, DataType::String)
        .property_key(properties::STORAGE_ID, DataType::String)
        .property_key(properties::REPOSITORY_ID, DataType::String)
        .property_key(properties::SIZE_IN_BYTES, DataType::Long)
        .property_key(properties::CREATED, DataType::Date)
        .property_key_with(properties::TAGS, DataType::String, Cardinality::Set)
        .property_key(properties::PATH, DataType::String)
        .property_key(properties::VERSION, DataType::String)
        .vertex_label(ArtifactEntry::LABEL)
        .vertex_label(ArtifactCoordinates::LABEL)
        .edge_label(
            &edge_label_name(ArtifactEntry::LABEL, ArtifactCoordinates::LABEL),
            Multiplicity::Many2One,
        )
        .edge_label(edges::ARTIFACT_DEPENDENCY, Multiplicity::Many2Many)
        .vertex_index(ArtifactCoordinates::LABEL, properties::PATH)
        .vertex_index(ArtifactCoordinates::LABEL, properties::UUID)
        .vertex_index(ArtifactEntry::LABEL, properties::UUID)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_schema_is_valid() {
        let schema = artifact_schema().expect("schema");
        assert_eq!(schema.property_keys.len(), 8);
        assert!(schema.has_edge_label(edges::ARTIFACT_ARTIFACT_COORDINATES));
        let names: Vec<_> = schema.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ArtifactCoordinates.path",
                "ArtifactCoordinates.uuid",
                "ArtifactEntry.uuid"
            ]
        );
    }
}
