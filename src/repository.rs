//! Generic entity repository.
//!
//! A domain type implements [`EntityMapping`] to name its vertex label and to
//! describe how it is written to ([`VertexWriter`]) and read back from
//! ([`VertexReader`]) a vertex. [`EntityRepository`] then provides save and
//! find operations for it.

use std::collections::HashSet;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::{
    EntityGraphError,
    backend::GraphBackend,
    definition::ElementKind,
    dsl::EntityTraversalSource,
    graph::{Direction, Element},
    multi_hop::{ChainStep, transitive_closure},
    traversal::Traversal,
};

pub trait EntityMapping: Sized {
    const LABEL: &'static str;

    /// `None` until the entity has been saved once.
    fn uuid(&self) -> Option<&str>;

    fn unfold<G: GraphBackend>(&self, writer: &VertexWriter<'_, G>) -> Result<(), EntityGraphError>;

    fn materialize<G: GraphBackend>(reader: &VertexReader<'_, G>) -> Result<Self, EntityGraphError>;
}

/// Writes an entity's properties and relations onto its vertex.
pub struct VertexWriter<'s, G: GraphBackend> {
    source: &'s EntityTraversalSource<G>,
    vertex: &'s Element,
}

impl<'s, G: GraphBackend> VertexWriter<'s, G> {
    pub fn vertex(&self) -> &Element {
        self.vertex
    }

    /// Replaces every value of `key` with `value`.
    pub fn property(&self, key: &str, value: impl Into<Value>) -> Result<(), EntityGraphError> {
        self.source
            .graph()
            .set_property_values(self.vertex, key, vec![value.into()])
    }

    /// Like [`VertexWriter::property`]; `None` removes the property.
    pub fn property_opt<V: Into<Value>>(
        &self,
        key: &str,
        value: Option<V>,
    ) -> Result<(), EntityGraphError> {
        match value {
            Some(value) => self.property(key, value),
            None => self.source.graph().remove_property(self.vertex, key),
        }
    }

    /// Replaces every value of a SET or LIST key. An empty input removes it.
    pub fn property_values<I, V>(&self, key: &str, values: I) -> Result<(), EntityGraphError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.source.graph().set_property_values(
            self.vertex,
            key,
            values.into_iter().map(Into::into).collect(),
        )
    }

    /// Points the single outgoing `edge_label` relation at `target`.
    ///
    /// The target is saved first, by its own identity. Other outgoing edges of
    /// the label are removed; with `None` all of them are.
    pub fn relation<R: EntityMapping>(
        &self,
        edge_label: &str,
        target: Option<&R>,
    ) -> Result<Option<Element>, EntityGraphError> {
        let graph = self.source.graph();
        let target_vertex = match target {
            Some(target) => Some(save_entity(self.source, target)?),
            None => None,
        };
        let mut linked = false;
        for edge in graph.incident_edges(self.vertex, Direction::Outgoing, Some(edge_label))? {
            let points_at_target = match &target_vertex {
                Some(target) => graph.edge_vertex(&edge, Direction::Incoming)?.id == target.id,
                None => false,
            };
            if points_at_target && !linked {
                linked = true;
            } else {
                debug!(edge = %edge.uuid, label = edge_label, "removing stale relation");
                graph.remove_edge(&edge)?;
            }
        }
        if let (Some(target), false) = (&target_vertex, linked) {
            self.source
                .save_e(edge_label, None, self.vertex, target, |_| Ok(()))?;
        }
        Ok(target_vertex)
    }
}

/// Lazily reads an entity back from its vertex. Absent properties come back
/// as `None`, distinct from present empty values.
pub struct VertexReader<'s, G: GraphBackend> {
    source: &'s EntityTraversalSource<G>,
    vertex: Element,
    /// Vertices already being materialized above this one.
    ancestors: Vec<i64>,
}

impl<'s, G: GraphBackend> VertexReader<'s, G> {
    pub fn vertex(&self) -> &Element {
        &self.vertex
    }

    pub fn uuid(&self) -> &str {
        &self.vertex.uuid
    }

    pub fn value(&self, key: &str) -> Result<Option<Value>, EntityGraphError> {
        Ok(self
            .traversal()
            .enrich_property_value(key)?
            .into_iter()
            .next()
            .flatten())
    }

    pub fn values(&self, key: &str) -> Result<Option<Vec<Value>>, EntityGraphError> {
        Ok(self
            .traversal()
            .enrich_property_values(key)?
            .into_iter()
            .next()
            .flatten())
    }

    pub fn string(&self, key: &str) -> Result<Option<String>, EntityGraphError> {
        self.value(key)?
            .map(|value| match value {
                Value::String(text) => Ok(text),
                other => Err(type_mismatch(key, "string", &other)),
            })
            .transpose()
    }

    pub fn long(&self, key: &str) -> Result<Option<i64>, EntityGraphError> {
        self.value(key)?
            .map(|value| value.as_i64().ok_or_else(|| type_mismatch(key, "long", &value)))
            .transpose()
    }

    pub fn date(&self, key: &str) -> Result<Option<DateTime<Utc>>, EntityGraphError> {
        self.string(key)?
            .map(|text| {
                DateTime::parse_from_rfc3339(&text)
                    .map(|date| date.with_timezone(&Utc))
                    .map_err(|e| EntityGraphError::invalid_input(format!("{key}: {e}")))
            })
            .transpose()
    }

    pub fn string_set(&self, key: &str) -> Result<Option<HashSet<String>>, EntityGraphError> {
        self.values(key)?
            .map(|values| {
                values
                    .into_iter()
                    .map(|value| match value {
                        Value::String(text) => Ok(text),
                        other => Err(type_mismatch(key, "string", &other)),
                    })
                    .collect()
            })
            .transpose()
    }

    /// The entity at the end of the outgoing `edge_label` relation.
    ///
    /// A relation leading back to a vertex that is already being materialized
    /// further up comes back as `None`, so cyclic relations terminate.
    pub fn relation<R: EntityMapping>(
        &self,
        edge_label: &str,
    ) -> Result<Option<R>, EntityGraphError> {
        let related = self
            .traversal()
            .out(edge_label)
            .has_label(R::LABEL)
            .map_to_object(|vertex| {
                if vertex.id == self.vertex.id || self.ancestors.contains(&vertex.id) {
                    debug!(uuid = %vertex.uuid, label = edge_label, "relation cycle cut");
                    return Ok(None);
                }
                let mut ancestors = self.ancestors.clone();
                ancestors.push(self.vertex.id);
                R::materialize(&VertexReader {
                    source: self.source,
                    vertex: vertex.clone(),
                    ancestors,
                })
                .map(Some)
            })?;
        Ok(related.and_then(|entities| entities.into_iter().flatten().next()))
    }

    fn traversal(&self) -> Traversal<'s, G> {
        Traversal::from_elements(self.source.graph(), vec![self.vertex.clone()])
    }
}

/// Paths for [`EntityRepository::find_all_dependent_entries`]: `from_root`
/// leads from a root vertex to dependent entities, `from_entity` from a
/// dependent entity to further roots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyQuery {
    pub root_label: String,
    pub from_root: Vec<ChainStep>,
    pub from_entity: Vec<ChainStep>,
}

pub struct EntityRepository<'s, G: GraphBackend, E: EntityMapping> {
    source: &'s EntityTraversalSource<G>,
    _entity: PhantomData<E>,
}

impl<'s, G: GraphBackend, E: EntityMapping> EntityRepository<'s, G, E> {
    pub fn new(source: &'s EntityTraversalSource<G>) -> Self {
        Self {
            source,
            _entity: PhantomData,
        }
    }

    pub fn source(&self) -> &'s EntityTraversalSource<G> {
        self.source
    }

    /// Upserts `entity` and everything it relates to in one transaction, then
    /// returns the entity as re-read from the graph.
    pub fn save(&self, entity: &E) -> Result<E, EntityGraphError> {
        let vertex = self
            .source
            .graph()
            .atomically(|| save_entity(self.source, entity))?;
        self.find_by_id(&vertex.uuid)?
            .ok_or_else(|| EntityGraphError::not_found(format!("{} {}", E::LABEL, vertex.uuid)))
    }

    pub fn find_by_id(&self, uuid: &str) -> Result<Option<E>, EntityGraphError> {
        first(self.map(self.source.find_by_id(E::LABEL, Some(uuid)))?)
    }

    pub fn find_by(&self, key: &str, value: impl Into<Value>) -> Result<Option<E>, EntityGraphError> {
        first(self.map(self.source.v().has_label(E::LABEL).has(key, value))?)
    }

    pub fn find_all_by(
        &self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<E>, EntityGraphError> {
        Ok(self
            .map(self.source.v().has_label(E::LABEL).has(key, value))?
            .unwrap_or_default())
    }

    /// Every entity reachable from the root with `root_uuid`, directly or
    /// through other dependent entities. Unknown roots yield an empty list.
    pub fn find_all_dependent_entries(
        &self,
        root_uuid: &str,
        query: &DependencyQuery,
    ) -> Result<Vec<E>, EntityGraphError> {
        let Some(root) = self
            .source
            .find_by_id(&query.root_label, Some(root_uuid))
            .next()?
        else {
            return Ok(Vec::new());
        };
        transitive_closure(self.source.graph(), &root, &query.from_root, &query.from_entity)?
            .into_iter()
            .filter(|element| element.label == E::LABEL)
            .map(|element| materialize(self.source, element))
            .collect()
    }

    pub fn materialize(&self, vertex: Element) -> Result<E, EntityGraphError> {
        materialize(self.source, vertex)
    }

    fn map(&self, traversal: Traversal<'s, G>) -> Result<Option<Vec<E>>, EntityGraphError> {
        traversal.map_to_object(|vertex| materialize(self.source, vertex.clone()))
    }
}

/// Saves `entity` by identity. Used for the root of a save and, recursively,
/// for every related entity.
pub fn save_entity<G: GraphBackend, E: EntityMapping>(
    source: &EntityTraversalSource<G>,
    entity: &E,
) -> Result<Element, EntityGraphError> {
    if !source.graph().has_label(ElementKind::Vertex, E::LABEL)? {
        return Err(EntityGraphError::unknown_label(E::LABEL));
    }
    source.save_v(E::LABEL, entity.uuid(), |vertex| {
        entity.unfold(&VertexWriter { source, vertex })
    })
}

fn materialize<G: GraphBackend, E: EntityMapping>(
    source: &EntityTraversalSource<G>,
    vertex: Element,
) -> Result<E, EntityGraphError> {
    E::materialize(&VertexReader {
        source,
        vertex,
        ancestors: Vec::new(),
    })
}

fn first<E>(mapped: Option<Vec<E>>) -> Result<Option<E>, EntityGraphError> {
    Ok(mapped.and_then(|entities| entities.into_iter().next()))
}

fn type_mismatch(key: &str, expected: &str, value: &Value) -> EntityGraphError {
    EntityGraphError::invalid_input(format!("{key}: expected {expected}, found {value}"))
}
