//! Entity traversal protocol: identity-keyed lookup and create-or-fetch upserts
//! on top of [`Traversal`].

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::{
    EntityGraphError,
    backend::GraphBackend,
    graph::{Element, Upserted},
    traversal::Traversal,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceAction {
    Created,
    Fetched,
}

impl fmt::Display for TraceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceAction::Created => f.write_str("Created"),
            TraceAction::Fetched => f.write_str("Fetched"),
        }
    }
}

/// Emitted once per upsert, on whichever branch was taken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEvent {
    pub action: TraceAction,
    pub label: String,
    pub id: i64,
    pub uuid: String,
}

/// Receives upsert traces. Implementations must not fail or block.
pub trait DiagnosticSink: Send + Sync {
    fn trace(&self, event: &TraceEvent);
}

/// Forwards traces to `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn trace(&self, event: &TraceEvent) {
        debug!(
            label = %event.label,
            id = event.id,
            uuid = %event.uuid,
            "{}",
            event.action
        );
    }
}

/// Starting point for entity traversals against one backend.
pub struct EntityTraversalSource<G: GraphBackend> {
    graph: G,
    sink: Arc<dyn DiagnosticSink>,
}

impl<G: GraphBackend> EntityTraversalSource<G> {
    pub fn new(graph: G) -> Self {
        Self::with_sink(graph, Arc::new(TracingSink))
    }

    pub fn with_sink(graph: G, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { graph, sink }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn sink(&self) -> Arc<dyn DiagnosticSink> {
        Arc::clone(&self.sink)
    }

    pub fn v(&self) -> Traversal<'_, G> {
        Traversal::vertices(&self.graph)
    }

    pub fn e(&self) -> Traversal<'_, G> {
        Traversal::edges(&self.graph)
    }

    /// Vertices with `label` whose uuid is `uuid`. A missing uuid matches
    /// nothing rather than every vertex of the label.
    pub fn find_by_id(&self, label: &str, uuid: Option<&str>) -> Traversal<'_, G> {
        match uuid {
            Some(uuid) => self.v().has_label(label).has_uuid(uuid),
            None => Traversal::empty(&self.graph),
        }
    }

    pub fn find_edge_by_id(&self, label: &str, uuid: Option<&str>) -> Traversal<'_, G> {
        match uuid {
            Some(uuid) => self.e().has_label(label).has_uuid(uuid),
            None => Traversal::empty(&self.graph),
        }
    }

    /// Create-or-fetch a vertex by identity, then run `unfold` against it.
    ///
    /// Without a uuid a fresh v4 uuid is assigned. A concurrent writer
    /// inserting the same uuid first turns the create into a fetch.
    pub fn save_v<F>(
        &self,
        label: &str,
        uuid: Option<&str>,
        unfold: F,
    ) -> Result<Element, EntityGraphError>
    where
        F: FnOnce(&Element) -> Result<(), EntityGraphError>,
    {
        let found = self.find_by_id(label, uuid).fold()?;
        let vertex = match found.into_iter().next() {
            Some(existing) => self.traced(TraceAction::Fetched, existing),
            None => {
                let uuid = uuid.map_or_else(fresh_uuid, str::to_string);
                let upserted = self.graph.add_vertex(label, &uuid)?;
                self.traced_upsert(upserted)
            }
        };
        unfold(&vertex)?;
        Ok(vertex)
    }

    /// Create-or-fetch an edge by identity between two vertices.
    pub fn save_e<F>(
        &self,
        label: &str,
        uuid: Option<&str>,
        from: &Element,
        to: &Element,
        unfold: F,
    ) -> Result<Element, EntityGraphError>
    where
        F: FnOnce(&Element) -> Result<(), EntityGraphError>,
    {
        let found = self.find_edge_by_id(label, uuid).fold()?;
        let edge = match found.into_iter().next() {
            Some(existing) => self.traced(TraceAction::Fetched, existing),
            None => {
                let uuid = uuid.map_or_else(fresh_uuid, str::to_string);
                let upserted = self.graph.add_edge(label, &uuid, from, to)?;
                self.traced_upsert(upserted)
            }
        };
        unfold(&edge)?;
        Ok(edge)
    }

    fn traced_upsert(&self, upserted: Upserted) -> Element {
        match upserted {
            Upserted::Created(element) => self.traced(TraceAction::Created, element),
            Upserted::Existing(element) => self.traced(TraceAction::Fetched, element),
        }
    }

    fn traced(&self, action: TraceAction, element: Element) -> Element {
        self.sink.trace(&TraceEvent {
            action,
            label: element.label.clone(),
            id: element.id,
            uuid: element.uuid.clone(),
        });
        element
    }
}

fn fresh_uuid() -> String {
    Uuid::new_v4().to_string()
}
