use entitygraph::{
    Cardinality, DataType, Direction, ElementFilter, ElementKind, EntityGraphError, GraphConfig,
    Multiplicity, SchemaDefinition, SchemaManager, SqliteGraph, Upserted, index,
};
use serde_json::json;
use tempfile::TempDir;

fn schema() -> SchemaDefinition {
    SchemaDefinition::builder()
        .property_key("uuid", DataType::String)
        .property_key("name", DataType::String)
        .property_key("size", DataType::Long)
        .property_key("created", DataType::Date)
        .property_key_with("tags", DataType::String, Cardinality::Set)
        .property_key_with("history", DataType::String, Cardinality::List)
        .vertex_label("Item")
        .vertex_label("Owner")
        .edge_label("ownedBy", Multiplicity::Many2One)
        .edge_label("manages", Multiplicity::One2Many)
        .edge_label("pairedWith", Multiplicity::One2One)
        .vertex_index("Item", "name")
        .build()
        .expect("schema")
}

fn graph() -> SqliteGraph {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    SchemaManager::new(schema()).apply_schema(&graph).expect("apply");
    graph
}

#[test]
fn test_undeclared_labels_and_keys_are_rejected() {
    let graph = graph();
    let err = graph.add_vertex("Nope", "x").unwrap_err();
    assert!(matches!(err, EntityGraphError::UnknownLabel(_)));

    let item = graph.add_vertex("Item", "i1").expect("item").into_element();
    let err = graph.set_property(&item, "colour", json!("red")).unwrap_err();
    assert!(matches!(err, EntityGraphError::SchemaError(_)));

    let err = graph.set_property(&item, "size", json!("big")).unwrap_err();
    assert!(matches!(err, EntityGraphError::InvalidInput(_)));

    let err = graph.set_property(&item, "created", json!("last tuesday")).unwrap_err();
    assert!(matches!(err, EntityGraphError::InvalidInput(_)));

    let err = graph.set_property(&item, "uuid", json!("other")).unwrap_err();
    assert!(matches!(err, EntityGraphError::InvalidInput(_)));
}

#[test]
fn test_cardinality_semantics() {
    let graph = graph();
    let item = graph.add_vertex("Item", "i1").expect("item").into_element();

    graph.set_property(&item, "name", json!("a")).expect("name");
    graph.set_property(&item, "name", json!("b")).expect("name");
    assert_eq!(
        graph.property_values(&item, "name").expect("read"),
        Some(vec![json!("b")])
    );

    for tag in ["x", "y", "x"] {
        graph.set_property(&item, "tags", json!(tag)).expect("tag");
    }
    assert_eq!(
        graph.property_values(&item, "tags").expect("read"),
        Some(vec![json!("x"), json!("y")])
    );

    for entry in ["x", "y", "x"] {
        graph.set_property(&item, "history", json!(entry)).expect("history");
    }
    assert_eq!(
        graph.property_values(&item, "history").expect("read"),
        Some(vec![json!("x"), json!("y"), json!("x")])
    );

    let err = graph
        .set_property_values(&item, "name", vec![json!("a"), json!("b")])
        .unwrap_err();
    assert!(matches!(err, EntityGraphError::InvalidInput(_)));

    graph.set_property_values(&item, "tags", vec![]).expect("clear");
    assert_eq!(graph.property_values(&item, "tags").expect("read"), None);
    assert_eq!(
        graph.property_values(&item, "uuid").expect("uuid"),
        Some(vec![json!("i1")])
    );
}

#[test]
fn test_repeated_uuid_returns_existing_vertex() {
    let graph = graph();
    let first = graph.add_vertex("Item", "same").expect("first");
    let second = graph.add_vertex("Item", "same").expect("second");
    assert!(matches!(first, Upserted::Created(_)));
    assert!(matches!(second, Upserted::Existing(_)));
    assert_eq!(first.element().id, second.element().id);
    assert_eq!(graph.vertex_count().expect("count"), 1);

    let err = graph.add_vertex("Owner", "same").unwrap_err();
    assert!(matches!(err, EntityGraphError::InvalidInput(_)));
}

#[test]
fn test_edge_multiplicity_is_enforced() {
    let graph = graph();
    let item = graph.add_vertex("Item", "i1").expect("item").into_element();
    let other = graph.add_vertex("Item", "i2").expect("item").into_element();
    let alice = graph.add_vertex("Owner", "alice").expect("owner").into_element();
    let bob = graph.add_vertex("Owner", "bob").expect("owner").into_element();

    graph.add_edge("ownedBy", "e1", &item, &alice).expect("first owner");
    let err = graph.add_edge("ownedBy", "e2", &item, &bob).unwrap_err();
    assert!(matches!(err, EntityGraphError::InvalidInput(_)));
    graph.add_edge("ownedBy", "e3", &other, &alice).expect("many to one");

    graph.add_edge("manages", "m1", &alice, &item).expect("manages");
    let err = graph.add_edge("manages", "m2", &bob, &item).unwrap_err();
    assert!(matches!(err, EntityGraphError::InvalidInput(_)));

    graph.add_edge("pairedWith", "p1", &item, &other).expect("pair");
    assert!(graph.add_edge("pairedWith", "p2", &item, &alice).is_err());
    assert!(graph.add_edge("pairedWith", "p3", &bob, &other).is_err());

    let err = graph.add_edge("unknown", "u1", &item, &other).unwrap_err();
    assert!(matches!(err, EntityGraphError::UnknownLabel(_)));

    let owners = graph
        .adjacent(&item, Direction::Outgoing, Some("ownedBy"))
        .expect("owners");
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].uuid, "alice");
}

#[test]
fn test_removed_edge_frees_multiplicity_slot() {
    let graph = graph();
    let item = graph.add_vertex("Item", "i1").expect("item").into_element();
    let alice = graph.add_vertex("Owner", "alice").expect("owner").into_element();
    let bob = graph.add_vertex("Owner", "bob").expect("owner").into_element();
    let edge = graph
        .add_edge("ownedBy", "e1", &item, &alice)
        .expect("edge")
        .into_element();
    graph.remove_edge(&edge).expect("remove");
    graph.add_edge("ownedBy", "e2", &item, &bob).expect("rewire");
    assert_eq!(graph.edge_count().expect("count"), 1);
    assert!(matches!(
        graph.remove_edge(&edge).unwrap_err(),
        EntityGraphError::NotFound(_)
    ));
}

#[test]
fn test_transaction_rolls_back_on_drop() {
    let graph = graph();
    {
        let _tx = graph.transaction().expect("tx");
        graph.add_vertex("Item", "i1").expect("item");
    }
    assert_eq!(graph.vertex_count().expect("count"), 0);

    let outer = graph.transaction().expect("outer");
    graph.add_vertex("Item", "kept").expect("item");
    let inner = graph.transaction().expect("inner");
    graph.add_vertex("Item", "dropped").expect("item");
    inner.rollback().expect("inner rollback");
    outer.commit().expect("outer commit");

    let all = graph
        .scan(&ElementFilter::new(ElementKind::Vertex))
        .expect("scan");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].uuid, "kept");
}

#[test]
fn test_index_entries_follow_property_writes() {
    let graph = graph();
    let item = graph.add_vertex("Item", "i1").expect("item").into_element();
    graph.set_property(&item, "name", json!("widget")).expect("name");

    let mut filter = ElementFilter::new(ElementKind::Vertex);
    filter.label = Some("Item".into());
    filter.properties.push(("name".into(), json!("widget")));
    assert_eq!(index::lookup(&graph, &filter).expect("lookup"), Some(vec![item.id]));

    graph.remove_property(&item, "name").expect("remove");
    assert_eq!(index::lookup(&graph, &filter).expect("lookup"), Some(vec![]));
    assert!(graph.scan(&filter).expect("scan").is_empty());

    filter.label = Some("Owner".into());
    assert_eq!(index::lookup(&graph, &filter).expect("lookup"), None);
}

#[test]
fn test_graph_persists_on_disk() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("graph.db");
    let mut config = GraphConfig::default();
    config.sqlite.busy_timeout_ms = Some(1000);
    config
        .sqlite
        .pragma_settings
        .insert("journal_mode".into(), "WAL".into());
    {
        let graph = SqliteGraph::open_with_config(&path, config.clone()).expect("graph");
        SchemaManager::new(schema()).apply_schema(&graph).expect("apply");
        let item = graph.add_vertex("Item", "i1").expect("item").into_element();
        graph.set_property(&item, "name", json!("widget")).expect("name");
    }
    let graph = SqliteGraph::open_with_config(&path, config).expect("reopen");
    let created = SchemaManager::new(schema()).apply_schema(&graph).expect("reapply");
    assert!(created.is_empty());
    let mut filter = ElementFilter::new(ElementKind::Vertex);
    filter.properties.push(("name".into(), json!("widget")));
    let found = graph.scan(&filter).expect("scan");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].uuid, "i1");
}
