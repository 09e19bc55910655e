//! Backend trait bridging the traversal layer with a graph engine. Every step
//! of [`crate::traversal::Traversal`] and every upsert in [`crate::dsl`] is
//! expressed through these primitives, so a second engine only has to
//! implement this trait.

use serde_json::Value;

use crate::{
    EntityGraphError,
    definition::ElementKind,
    graph::{Direction, Element, ElementFilter, SqliteGraph, Upserted},
};

pub trait GraphBackend {
    /// All elements of `filter.kind` passing the label and equality filters.
    fn scan(&self, filter: &ElementFilter) -> Result<Vec<Element>, EntityGraphError>;
    fn adjacent(
        &self,
        vertex: &Element,
        direction: Direction,
        edge_label: Option<&str>,
    ) -> Result<Vec<Element>, EntityGraphError>;
    fn incident_edges(
        &self,
        vertex: &Element,
        direction: Direction,
        edge_label: Option<&str>,
    ) -> Result<Vec<Element>, EntityGraphError>;
    fn edge_vertex(&self, edge: &Element, direction: Direction)
    -> Result<Element, EntityGraphError>;
    fn property_values(
        &self,
        element: &Element,
        key: &str,
    ) -> Result<Option<Vec<Value>>, EntityGraphError>;
    fn add_vertex(&self, label: &str, uuid: &str) -> Result<Upserted, EntityGraphError>;
    fn add_edge(
        &self,
        label: &str,
        uuid: &str,
        from: &Element,
        to: &Element,
    ) -> Result<Upserted, EntityGraphError>;
    fn remove_edge(&self, edge: &Element) -> Result<(), EntityGraphError>;
    fn set_property(&self, element: &Element, key: &str, value: Value)
    -> Result<(), EntityGraphError>;
    fn set_property_values(
        &self,
        element: &Element,
        key: &str,
        values: Vec<Value>,
    ) -> Result<(), EntityGraphError>;
    fn remove_property(&self, element: &Element, key: &str) -> Result<(), EntityGraphError>;
    fn has_label(&self, kind: ElementKind, label: &str) -> Result<bool, EntityGraphError>;
    /// Runs `work` inside a transaction: committed on `Ok`, rolled back on `Err`.
    fn atomically<T, F>(&self, work: F) -> Result<T, EntityGraphError>
    where
        F: FnOnce() -> Result<T, EntityGraphError>;
}

impl GraphBackend for SqliteGraph {
    fn scan(&self, filter: &ElementFilter) -> Result<Vec<Element>, EntityGraphError> {
        SqliteGraph::scan(self, filter)
    }

    fn adjacent(
        &self,
        vertex: &Element,
        direction: Direction,
        edge_label: Option<&str>,
    ) -> Result<Vec<Element>, EntityGraphError> {
        SqliteGraph::adjacent(self, vertex, direction, edge_label)
    }

    fn incident_edges(
        &self,
        vertex: &Element,
        direction: Direction,
        edge_label: Option<&str>,
    ) -> Result<Vec<Element>, EntityGraphError> {
        SqliteGraph::incident_edges(self, vertex, direction, edge_label)
    }

    fn edge_vertex(
        &self,
        edge: &Element,
        direction: Direction,
    ) -> Result<Element, EntityGraphError> {
        SqliteGraph::edge_vertex(self, edge, direction)
    }

    fn property_values(
        &self,
        element: &Element,
        key: &str,
    ) -> Result<Option<Vec<Value>>, EntityGraphError> {
        SqliteGraph::property_values(self, element, key)
    }

    fn add_vertex(&self, label: &str, uuid: &str) -> Result<Upserted, EntityGraphError> {
        SqliteGraph::add_vertex(self, label, uuid)
    }

    fn add_edge(
        &self,
        label: &str,
        uuid: &str,
        from: &Element,
        to: &Element,
    ) -> Result<Upserted, EntityGraphError> {
        SqliteGraph::add_edge(self, label, uuid, from, to)
    }

    fn remove_edge(&self, edge: &Element) -> Result<(), EntityGraphError> {
        SqliteGraph::remove_edge(self, edge)
    }

    fn set_property(
        &self,
        element: &Element,
        key: &str,
        value: Value,
    ) -> Result<(), EntityGraphError> {
        SqliteGraph::set_property(self, element, key, value)
    }

    fn set_property_values(
        &self,
        element: &Element,
        key: &str,
        values: Vec<Value>,
    ) -> Result<(), EntityGraphError> {
        SqliteGraph::set_property_values(self, element, key, values)
    }

    fn remove_property(&self, element: &Element, key: &str) -> Result<(), EntityGraphError> {
        SqliteGraph::remove_property(self, element, key)
    }

    fn has_label(&self, kind: ElementKind, label: &str) -> Result<bool, EntityGraphError> {
        match kind {
            ElementKind::Vertex => self.vertex_label_exists(label),
            ElementKind::Edge => Ok(self.edge_multiplicity(label)?.is_some()),
        }
    }

    fn atomically<T, F>(&self, work: F) -> Result<T, EntityGraphError>
    where
        F: FnOnce() -> Result<T, EntityGraphError>,
    {
        let tx = self.transaction()?;
        let value = work()?;
        tx.commit()?;
        Ok(value)
    }
}

impl<B> GraphBackend for &B
where
    B: GraphBackend,
{
    fn scan(&self, filter: &ElementFilter) -> Result<Vec<Element>, EntityGraphError> {
        (*self).scan(filter)
    }

    fn adjacent(
        &self,
        vertex: &Element,
        direction: Direction,
        edge_label: Option<&str>,
    ) -> Result<Vec<Element>, EntityGraphError> {
        (*self).adjacent(vertex, direction, edge_label)
    }

    fn incident_edges(
        &self,
        vertex: &Element,
        direction: Direction,
        edge_label: Option<&str>,
    ) -> Result<Vec<Element>, EntityGraphError> {
        (*self).incident_edges(vertex, direction, edge_label)
    }

    fn edge_vertex(
        &self,
        edge: &Element,
        direction: Direction,
    ) -> Result<Element, EntityGraphError> {
        (*self).edge_vertex(edge, direction)
    }

    fn property_values(
        &self,
        element: &Element,
        key: &str,
    ) -> Result<Option<Vec<Value>>, EntityGraphError> {
        (*self).property_values(element, key)
    }

    fn add_vertex(&self, label: &str, uuid: &str) -> Result<Upserted, EntityGraphError> {
        (*self).add_vertex(label, uuid)
    }

    fn add_edge(
        &self,
        label: &str,
        uuid: &str,
        from: &Element,
        to: &Element,
    ) -> Result<Upserted, EntityGraphError> {
        (*self).add_edge(label, uuid, from, to)
    }

    fn remove_edge(&self, edge: &Element) -> Result<(), EntityGraphError> {
        (*self).remove_edge(edge)
    }

    fn set_property(
        &self,
        element: &Element,
        key: &str,
        value: Value,
    ) -> Result<(), EntityGraphError> {
        (*self).set_property(element, key, value)
    }

    fn set_property_values(
        &self,
        element: &Element,
        key: &str,
        values: Vec<Value>,
    ) -> Result<(), EntityGraphError> {
        (*self).set_property_values(element, key, values)
    }

    fn remove_property(&self, element: &Element, key: &str) -> Result<(), EntityGraphError> {
        (*self).remove_property(element, key)
    }

    fn has_label(&self, kind: ElementKind, label: &str) -> Result<bool, EntityGraphError> {
        (*self).has_label(kind, label)
    }

    fn atomically<T, F>(&self, work: F) -> Result<T, EntityGraphError>
    where
        F: FnOnce() -> Result<T, EntityGraphError>,
    {
        (*self).atomically(work)
    }
}
