//! Composable traversal over a [`GraphBackend`].
//!
//! A traversal starts from every vertex, every edge, or an explicit element
//! list, then applies a fixed set of steps in order. Label and equality
//! filters added before the first navigation step are pushed down into the
//! backend scan so an enabled composite index can answer them.

use ahash::AHashSet;
use serde_json::Value;

use crate::{
    EntityGraphError,
    backend::GraphBackend,
    definition::{ElementKind, UUID_PROPERTY},
    graph::{Direction, Element, ElementFilter},
};

enum Start {
    Scan(ElementFilter),
    Elements(Vec<Element>),
    Nothing,
}

enum Step<'g> {
    HasLabel(String),
    Has(String, Value),
    Vertices(Direction, Option<String>),
    Edges(Direction, Option<String>),
    EdgeVertex(Direction),
    Dedup,
    SideEffect(Box<dyn Fn(&Element) + 'g>),
}

pub struct Traversal<'g, G: GraphBackend> {
    graph: &'g G,
    start: Start,
    steps: Vec<Step<'g>>,
}

impl<'g, G: GraphBackend> Traversal<'g, G> {
    /// `V()`: every vertex.
    pub fn vertices(graph: &'g G) -> Self {
        Self::scan(graph, ElementFilter::new(ElementKind::Vertex))
    }

    /// `E()`: every edge.
    pub fn edges(graph: &'g G) -> Self {
        Self::scan(graph, ElementFilter::new(ElementKind::Edge))
    }

    pub fn from_elements(graph: &'g G, elements: Vec<Element>) -> Self {
        Self {
            graph,
            start: Start::Elements(elements),
            steps: Vec::new(),
        }
    }

    /// A traversal that yields nothing, whatever steps follow.
    pub fn empty(graph: &'g G) -> Self {
        Self {
            graph,
            start: Start::Nothing,
            steps: Vec::new(),
        }
    }

    fn scan(graph: &'g G, filter: ElementFilter) -> Self {
        Self {
            graph,
            start: Start::Scan(filter),
            steps: Vec::new(),
        }
    }

    pub fn graph(&self) -> &'g G {
        self.graph
    }

    pub fn has_label(mut self, label: &str) -> Self {
        match (&mut self.start, self.steps.is_empty()) {
            (Start::Scan(filter), true) if filter.label.is_none() => {
                filter.label = Some(label.to_string());
            }
            _ => self.steps.push(Step::HasLabel(label.to_string())),
        }
        self
    }

    pub fn has(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match (&mut self.start, self.steps.is_empty()) {
            (Start::Scan(filter), true) => filter.properties.push((key.to_string(), value)),
            _ => self.steps.push(Step::Has(key.to_string(), value)),
        }
        self
    }

    /// Shorthand for `has("uuid", uuid)`.
    pub fn has_uuid(self, uuid: &str) -> Self {
        self.has(UUID_PROPERTY, uuid)
    }

    pub fn out(mut self, edge_label: &str) -> Self {
        self.steps.push(Step::Vertices(
            Direction::Outgoing,
            Some(edge_label.to_string()),
        ));
        self
    }

    pub fn in_(mut self, edge_label: &str) -> Self {
        self.steps.push(Step::Vertices(
            Direction::Incoming,
            Some(edge_label.to_string()),
        ));
        self
    }

    pub fn out_e(mut self, edge_label: &str) -> Self {
        self.steps
            .push(Step::Edges(Direction::Outgoing, Some(edge_label.to_string())));
        self
    }

    pub fn in_e(mut self, edge_label: &str) -> Self {
        self.steps
            .push(Step::Edges(Direction::Incoming, Some(edge_label.to_string())));
        self
    }

    /// From an edge to the vertex it leaves.
    pub fn out_v(mut self) -> Self {
        self.steps.push(Step::EdgeVertex(Direction::Outgoing));
        self
    }

    /// From an edge to the vertex it enters.
    pub fn in_v(mut self) -> Self {
        self.steps.push(Step::EdgeVertex(Direction::Incoming));
        self
    }

    pub fn dedup(mut self) -> Self {
        self.steps.push(Step::Dedup);
        self
    }

    /// Runs `tap` on every element passing this point; the stream is unchanged.
    pub fn side_effect<F>(mut self, tap: F) -> Self
    where
        F: Fn(&Element) + 'g,
    {
        self.steps.push(Step::SideEffect(Box::new(tap)));
        self
    }

    pub fn to_list(self) -> Result<Vec<Element>, EntityGraphError> {
        self.execute()
    }

    /// Collects the stream into one list; an empty stream folds to `[]`.
    pub fn fold(self) -> Result<Vec<Element>, EntityGraphError> {
        self.execute()
    }

    pub fn next(self) -> Result<Option<Element>, EntityGraphError> {
        Ok(self.execute()?.into_iter().next())
    }

    pub fn has_next(self) -> Result<bool, EntityGraphError> {
        Ok(!self.execute()?.is_empty())
    }

    pub fn count(self) -> Result<usize, EntityGraphError> {
        Ok(self.execute()?.len())
    }

    /// One entry per element: its single value of `key`, or `None` when the
    /// element has no such property. A present empty string stays `Some`.
    pub fn enrich_property_value(self, key: &str) -> Result<Vec<Option<Value>>, EntityGraphError> {
        let graph = self.graph;
        self.execute()?
            .iter()
            .map(|element| {
                Ok(graph
                    .property_values(element, key)?
                    .and_then(|values| values.into_iter().next()))
            })
            .collect()
    }

    /// One entry per element: every value of `key`, or `None` when absent.
    pub fn enrich_property_values(
        self,
        key: &str,
    ) -> Result<Vec<Option<Vec<Value>>>, EntityGraphError> {
        let graph = self.graph;
        self.execute()?
            .iter()
            .map(|element| graph.property_values(element, key))
            .collect()
    }

    /// Folds the stream; `None` if empty, otherwise every element mapped.
    pub fn map_to_object<T, F>(self, mut map: F) -> Result<Option<Vec<T>>, EntityGraphError>
    where
        F: FnMut(&Element) -> Result<T, EntityGraphError>,
    {
        let folded = self.fold()?;
        if folded.is_empty() {
            return Ok(None);
        }
        folded.iter().map(&mut map).collect::<Result<Vec<_>, _>>().map(Some)
    }

    fn execute(self) -> Result<Vec<Element>, EntityGraphError> {
        let graph = self.graph;
        let mut current = match self.start {
            Start::Scan(filter) => graph.scan(&filter)?,
            Start::Elements(elements) => elements,
            Start::Nothing => return Ok(Vec::new()),
        };
        for step in self.steps {
            current = apply(graph, step, current)?;
            if current.is_empty() {
                break;
            }
        }
        Ok(current)
    }
}

fn apply<G: GraphBackend>(
    graph: &G,
    step: Step<'_>,
    current: Vec<Element>,
) -> Result<Vec<Element>, EntityGraphError> {
    let mut next = Vec::with_capacity(current.len());
    match step {
        Step::HasLabel(label) => next.extend(current.into_iter().filter(|e| e.label == label)),
        Step::Has(key, value) => {
            for element in current {
                let matched = graph
                    .property_values(&element, &key)?
                    .is_some_and(|values| values.contains(&value));
                if matched {
                    next.push(element);
                }
            }
        }
        Step::Vertices(direction, label) => {
            for element in current.iter().filter(|e| e.kind == ElementKind::Vertex) {
                next.extend(graph.adjacent(element, direction, label.as_deref())?);
            }
        }
        Step::Edges(direction, label) => {
            for element in current.iter().filter(|e| e.kind == ElementKind::Vertex) {
                next.extend(graph.incident_edges(element, direction, label.as_deref())?);
            }
        }
        Step::EdgeVertex(direction) => {
            for element in current.iter().filter(|e| e.kind == ElementKind::Edge) {
                next.push(graph.edge_vertex(element, direction)?);
            }
        }
        Step::Dedup => {
            let mut seen = AHashSet::new();
            next.extend(
                current
                    .into_iter()
                    .filter(|e| seen.insert((e.kind, e.id))),
            );
        }
        Step::SideEffect(tap) => {
            for element in &current {
                tap(element);
            }
            next = current;
        }
    }
    Ok(next)
}
