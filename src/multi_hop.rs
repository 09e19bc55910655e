use std::collections::VecDeque;

use ahash::AHashSet;

use crate::{
    EntityGraphError,
    backend::GraphBackend,
    graph::{Direction, Element},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainStep {
    pub direction: Direction,
    pub edge_label: Option<String>,
}

impl ChainStep {
    pub fn outgoing(edge_label: &str) -> Self {
        Self {
            direction: Direction::Outgoing,
            edge_label: Some(edge_label.to_string()),
        }
    }

    pub fn incoming(edge_label: &str) -> Self {
        Self {
            direction: Direction::Incoming,
            edge_label: Some(edge_label.to_string()),
        }
    }
}

/// Vertices reached from `start` by following `chain` step by step, without
/// duplicates, in id order.
pub fn chain_query<G: GraphBackend>(
    graph: &G,
    start: &Element,
    chain: &[ChainStep],
) -> Result<Vec<Element>, EntityGraphError> {
    let mut current = vec![start.clone()];
    for step in chain {
        let mut next = Vec::new();
        for vertex in &current {
            next.extend(graph.adjacent(vertex, step.direction, step.edge_label.as_deref())?);
        }
        if next.is_empty() {
            return Ok(Vec::new());
        }
        next.sort_by_key(|vertex| vertex.id);
        next.dedup_by_key(|vertex| vertex.id);
        current = next;
    }
    Ok(current)
}

/// Two-phase transitive closure.
///
/// `collect` leads from a frontier vertex to the results; `expand` leads from
/// a result back to further frontier vertices. Every frontier vertex is
/// visited once, so cycles terminate. Results are unique by uuid and ordered
/// by discovery.
pub fn transitive_closure<G: GraphBackend>(
    graph: &G,
    root: &Element,
    collect: &[ChainStep],
    expand: &[ChainStep],
) -> Result<Vec<Element>, EntityGraphError> {
    let mut visited = AHashSet::new();
    let mut seen_results = AHashSet::new();
    let mut results = Vec::new();
    let mut queue = VecDeque::new();
    visited.insert(root.id);
    queue.push_back(root.clone());

    while let Some(frontier) = queue.pop_front() {
        for found in chain_query(graph, &frontier, collect)? {
            if !seen_results.insert(found.uuid.clone()) {
                continue;
            }
            for next in chain_query(graph, &found, expand)? {
                if visited.insert(next.id) {
                    queue.push_back(next);
                }
            }
            results.push(found);
        }
    }
    Ok(results)
}
