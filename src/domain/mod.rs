//! Artifact metadata model: entries, their coordinates and the dependencies
//! between them.

pub mod artifact;
pub mod repositories;
pub mod schema;

pub use artifact::{ArtifactCoordinates, ArtifactDependency, ArtifactEntry};
pub use repositories::{ArtifactCoordinatesRepository, ArtifactEntryRepository};
pub use schema::artifact_schema;

pub mod properties {
    pub const UUID: &str = crate::definition::UUID_PROPERTY;
    pub const STORAGE_ID: &str = "storageId";
    pub const REPOSITORY_ID: &str = "repositoryId";
    pub const SIZE_IN_BYTES: &str = "sizeInBytes";
    pub const CREATED: &str = "created";
    pub const TAGS: &str = "tags";
    pub const PATH: &str = "path";
    pub const VERSION: &str = "version";
}

pub mod edges {
    /// `ArtifactEntry#ArtifactCoordinates`, many entries to one coordinate.
    pub const ARTIFACT_ARTIFACT_COORDINATES: &str = "ArtifactEntry#ArtifactCoordinates";
    pub const ARTIFACT_DEPENDENCY: &str = "ArtifactDependency";
}
