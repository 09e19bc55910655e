use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    EntityGraphError,
    backend::GraphBackend,
    repository::{EntityMapping, VertexReader, VertexWriter},
};

use super::{edges, properties};

/// Where an artifact lives: its repository path and version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCoordinates {
    pub uuid: Option<String>,
    pub path: Option<String>,
    pub version: Option<String>,
}

impl ArtifactCoordinates {
    pub const LABEL: &'static str = "ArtifactCoordinates";

    pub fn new(path: &str, version: &str) -> Self {
        Self {
            uuid: None,
            path: Some(path.to_string()),
            version: Some(version.to_string()),
        }
    }
}

impl EntityMapping for ArtifactCoordinates {
    const LABEL: &'static str = ArtifactCoordinates::LABEL;

    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    fn unfold<G: GraphBackend>(&self, writer: &VertexWriter<'_, G>) -> Result<(), EntityGraphError> {
        writer.property_opt(properties::PATH, self.path.clone())?;
        writer.property_opt(properties::VERSION, self.version.clone())
    }

    fn materialize<G: GraphBackend>(reader: &VertexReader<'_, G>) -> Result<Self, EntityGraphError> {
        Ok(Self {
            uuid: Some(reader.uuid().to_string()),
            path: reader.string(properties::PATH)?,
            version: reader.string(properties::VERSION)?,
        })
    }
}

/// A stored artifact and the coordinates it was published under.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub uuid: Option<String>,
    pub storage_id: Option<String>,
    pub repository_id: Option<String>,
    pub size_in_bytes: Option<i64>,
    pub created: Option<DateTime<Utc>>,
    pub tags: HashSet<String>,
    pub artifact_coordinates: Option<ArtifactCoordinates>,
}

impl ArtifactEntry {
    pub const LABEL: &'static str = "ArtifactEntry";
}

impl EntityMapping for ArtifactEntry {
    const LABEL: &'static str = ArtifactEntry::LABEL;

    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    fn unfold<G: GraphBackend>(&self, writer: &VertexWriter<'_, G>) -> Result<(), EntityGraphError> {
        writer.property_opt(properties::STORAGE_ID, self.storage_id.clone())?;
        writer.property_opt(properties::REPOSITORY_ID, self.repository_id.clone())?;
        writer.property_opt(properties::SIZE_IN_BYTES, self.size_in_bytes)?;
        writer.property_opt(
            properties::CREATED,
            self.created
                .map(|created| created.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        )?;
        let mut tags: Vec<&String> = self.tags.iter().collect();
        tags.sort();
        writer.property_values(properties::TAGS, tags.into_iter().cloned())?;
        writer.relation(
            edges::ARTIFACT_ARTIFACT_COORDINATES,
            self.artifact_coordinates.as_ref(),
        )?;
        Ok(())
    }

    fn materialize<G: GraphBackend>(reader: &VertexReader<'_, G>) -> Result<Self, EntityGraphError> {
        Ok(Self {
            uuid: Some(reader.uuid().to_string()),
            storage_id: reader.string(properties::STORAGE_ID)?,
            repository_id: reader.string(properties::REPOSITORY_ID)?,
            size_in_bytes: reader.long(properties::SIZE_IN_BYTES)?,
            created: reader.date(properties::CREATED)?,
            tags: reader.string_set(properties::TAGS)?.unwrap_or_default(),
            artifact_coordinates: reader.relation(edges::ARTIFACT_ARTIFACT_COORDINATES)?,
        })
    }
}

/// `subject` depends on the artifact published as `dependency`. Stored as an
/// `ArtifactDependency` edge with its own uuid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDependency {
    pub uuid: Option<String>,
    pub subject: ArtifactEntry,
    pub dependency: ArtifactCoordinates,
}

impl ArtifactDependency {
    pub const LABEL: &'static str = edges::ARTIFACT_DEPENDENCY;

    pub fn new(subject: ArtifactEntry, dependency: ArtifactCoordinates) -> Self {
        Self {
            uuid: None,
            subject,
            dependency,
        }
    }
}
