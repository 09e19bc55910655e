use crate::{
    EntityGraphError,
    backend::GraphBackend,
    dsl::EntityTraversalSource,
    graph::Direction,
    multi_hop::ChainStep,
    repository::{DependencyQuery, EntityRepository, save_entity},
};

use super::{ArtifactCoordinates, ArtifactDependency, ArtifactEntry, edges, properties};

pub struct ArtifactEntryRepository<'s, G: GraphBackend> {
    entries: EntityRepository<'s, G, ArtifactEntry>,
}

impl<'s, G: GraphBackend> ArtifactEntryRepository<'s, G> {
    pub fn new(source: &'s EntityTraversalSource<G>) -> Self {
        Self {
            entries: EntityRepository::new(source),
        }
    }

    pub fn save(&self, entry: &ArtifactEntry) -> Result<ArtifactEntry, EntityGraphError> {
        self.entries.save(entry)
    }

    pub fn find_by_id(&self, uuid: &str) -> Result<Option<ArtifactEntry>, EntityGraphError> {
        self.entries.find_by_id(uuid)
    }

    /// The entry published under the coordinates with `path`.
    pub fn find_by_path(&self, path: &str) -> Result<Option<ArtifactEntry>, EntityGraphError> {
        let entry = self
            .entries
            .source()
            .v()
            .has_label(ArtifactCoordinates::LABEL)
            .has(properties::PATH, path)
            .in_(edges::ARTIFACT_ARTIFACT_COORDINATES)
            .has_label(ArtifactEntry::LABEL)
            .next()?;
        entry.map(|vertex| self.entries.materialize(vertex)).transpose()
    }

    /// Saves both ends and links them with an `ArtifactDependency` edge.
    pub fn add_dependency(
        &self,
        dependency: &ArtifactDependency,
    ) -> Result<ArtifactDependency, EntityGraphError> {
        let source = self.entries.source();
        let edge = source.graph().atomically(|| {
            let subject = save_entity(source, &dependency.subject)?;
            let target = save_entity(source, &dependency.dependency)?;
            source.save_e(
                ArtifactDependency::LABEL,
                dependency.uuid.as_deref(),
                &subject,
                &target,
                |_| Ok(()),
            )
        })?;
        let subject_vertex = source.graph().edge_vertex(&edge, Direction::Outgoing)?;
        let target_vertex = source.graph().edge_vertex(&edge, Direction::Incoming)?;
        Ok(ArtifactDependency {
            uuid: Some(edge.uuid),
            subject: self.entries.materialize(subject_vertex)?,
            dependency: EntityRepository::<G, ArtifactCoordinates>::new(source)
                .materialize(target_vertex)?,
        })
    }

    /// Every entry depending on the coordinates, directly or through entries
    /// whose own coordinates are depended upon.
    pub fn find_all_dependent_artifact_entries(
        &self,
        coordinates_uuid: &str,
    ) -> Result<Vec<ArtifactEntry>, EntityGraphError> {
        self.entries
            .find_all_dependent_entries(coordinates_uuid, &dependency_query())
    }
}

pub struct ArtifactCoordinatesRepository<'s, G: GraphBackend> {
    coordinates: EntityRepository<'s, G, ArtifactCoordinates>,
}

impl<'s, G: GraphBackend> ArtifactCoordinatesRepository<'s, G> {
    pub fn new(source: &'s EntityTraversalSource<G>) -> Self {
        Self {
            coordinates: EntityRepository::new(source),
        }
    }

    pub fn save(
        &self,
        coordinates: &ArtifactCoordinates,
    ) -> Result<ArtifactCoordinates, EntityGraphError> {
        self.coordinates.save(coordinates)
    }

    pub fn find_by_id(&self, uuid: &str) -> Result<Option<ArtifactCoordinates>, EntityGraphError> {
        self.coordinates.find_by_id(uuid)
    }

    pub fn find_by_path(&self, path: &str) -> Result<Option<ArtifactCoordinates>, EntityGraphError> {
        self.coordinates.find_by(properties::PATH, path)
    }
}

fn dependency_query() -> DependencyQuery {
    DependencyQuery {
        root_label: ArtifactCoordinates::LABEL.to_string(),
        from_root: vec![ChainStep::incoming(edges::ARTIFACT_DEPENDENCY)],
        from_entity: vec![ChainStep::outgoing(edges::ARTIFACT_ARTIFACT_COORDINATES)],
    }
}
