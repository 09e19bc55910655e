use entitygraph::{
    ChainStep, Direction, Element, Multiplicity, SchemaDefinition, SchemaManager, SqliteGraph,
    multi_hop::{chain_query, transitive_closure},
};

fn graph() -> SqliteGraph {
    let schema = SchemaDefinition::builder()
        .vertex_label("Item")
        .edge_label("DEPENDS", Multiplicity::Many2Many)
        .edge_label("OWNS", Multiplicity::Many2Many)
        .build()
        .expect("schema");
    let graph = SqliteGraph::open_in_memory().expect("graph");
    SchemaManager::new(schema).apply_schema(&graph).expect("apply");
    graph
}

fn item(graph: &SqliteGraph, uuid: &str) -> Element {
    graph.add_vertex("Item", uuid).expect("item").into_element()
}

fn link(graph: &SqliteGraph, label: &str, from: &Element, to: &Element) {
    let uuid = format!("{}-{label}-{}", from.uuid, to.uuid);
    graph.add_edge(label, &uuid, from, to).expect("edge");
}

fn uuids(elements: &[Element]) -> Vec<&str> {
    elements.iter().map(|e| e.uuid.as_str()).collect()
}

#[test]
fn test_chain_query_follows_each_step() {
    let graph = graph();
    let a = item(&graph, "A");
    let dep1 = item(&graph, "dep1");
    let dep2 = item(&graph, "dep2");
    let dep3 = item(&graph, "dep3");
    link(&graph, "DEPENDS", &a, &dep1);
    link(&graph, "DEPENDS", &a, &dep2);
    link(&graph, "DEPENDS", &dep2, &dep3);
    link(&graph, "OWNS", &dep1, &dep3);

    let one = chain_query(&graph, &a, &[ChainStep::outgoing("DEPENDS")]).expect("one hop");
    assert_eq!(uuids(&one), vec!["dep1", "dep2"]);

    let two = chain_query(
        &graph,
        &a,
        &[ChainStep::outgoing("DEPENDS"), ChainStep::outgoing("DEPENDS")],
    )
    .expect("two hops");
    assert_eq!(uuids(&two), vec!["dep3"]);

    let back = chain_query(&graph, &dep3, &[ChainStep::incoming("DEPENDS")]).expect("incoming");
    assert_eq!(uuids(&back), vec!["dep2"]);

    let any = chain_query(
        &graph,
        &dep3,
        &[ChainStep {
            direction: Direction::Incoming,
            edge_label: None,
        }],
    )
    .expect("any label");
    assert_eq!(uuids(&any), vec!["dep1", "dep2"]);

    let dead_end = chain_query(&graph, &dep3, &[ChainStep::outgoing("DEPENDS")]).expect("dead end");
    assert!(dead_end.is_empty());
}

#[test]
fn test_transitive_closure_collects_every_level() {
    let graph = graph();
    let a = item(&graph, "A");
    let dep1 = item(&graph, "dep1");
    let dep2 = item(&graph, "dep2");
    let dep3 = item(&graph, "dep3");
    link(&graph, "DEPENDS", &a, &dep1);
    link(&graph, "DEPENDS", &a, &dep2);
    link(&graph, "DEPENDS", &dep2, &dep3);

    let reached = transitive_closure(
        &graph,
        &a,
        &[ChainStep::outgoing("DEPENDS")],
        &[],
    )
    .expect("closure");
    assert_eq!(uuids(&reached), vec!["dep1", "dep2", "dep3"]);
}
