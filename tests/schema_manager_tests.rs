use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use entitygraph::{
    DataType, ElementFilter, ElementKind, EntityGraphError, GraphConfig, IndexStatus,
    IndexWaitConfig, Multiplicity, SchemaDefinition, SchemaManager, SchemaState, SqliteGraph,
    domain::artifact_schema, index,
};
use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;

fn declarations_only() -> SchemaDefinition {
    SchemaDefinition::builder()
        .property_key("path", DataType::String)
        .vertex_label("ArtifactCoordinates")
        .build()
        .expect("schema")
}

fn with_path_index() -> SchemaDefinition {
    SchemaDefinition::builder()
        .property_key("path", DataType::String)
        .vertex_label("ArtifactCoordinates")
        .vertex_index("ArtifactCoordinates", "path")
        .build()
        .expect("schema")
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("count")
}

#[test]
fn test_apply_schema_is_idempotent() {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    let mut manager = SchemaManager::new(artifact_schema().expect("schema"));
    assert_eq!(manager.state(), SchemaState::Undefined);

    let created = manager.apply_schema(&graph).expect("first run");
    assert_eq!(
        created.into_iter().collect::<Vec<_>>(),
        vec![
            "ArtifactCoordinates.path".to_string(),
            "ArtifactCoordinates.uuid".to_string(),
            "ArtifactEntry.uuid".to_string(),
        ]
    );
    assert_eq!(manager.state(), SchemaState::Ready);

    let again = manager.apply_schema(&graph).expect("second run");
    assert!(again.is_empty());
    assert_eq!(manager.state(), SchemaState::Ready);
    for record in index::list(&graph).expect("indexes") {
        assert_eq!(record.status, IndexStatus::Enabled);
    }
}

#[test]
fn test_new_index_backfills_existing_vertices_in_batches() {
    let config = GraphConfig {
        reindex_batch_size: 2,
        ..GraphConfig::default()
    };
    let graph = SqliteGraph::open_in_memory_with_config(config).expect("graph");
    SchemaManager::new(declarations_only())
        .apply_schema(&graph)
        .expect("declare");
    for n in 0..5 {
        let vertex = graph
            .add_vertex("ArtifactCoordinates", &format!("c{n}"))
            .expect("vertex")
            .into_element();
        graph
            .set_property(&vertex, "path", json!(format!("org/test/{n}.jar")))
            .expect("path");
    }

    let created = SchemaManager::new(with_path_index())
        .apply_schema(&graph)
        .expect("index");
    assert!(created.contains("ArtifactCoordinates.path"));

    let mut filter = ElementFilter::new(ElementKind::Vertex);
    filter.label = Some("ArtifactCoordinates".into());
    filter.properties.push(("path".into(), json!("org/test/3.jar")));
    let ids = index::lookup(&graph, &filter)
        .expect("lookup")
        .expect("index answers the scan");
    assert_eq!(ids.len(), 1);
    let found = graph.scan(&filter).expect("scan");
    assert_eq!(found[0].uuid, "c3");
}

#[test]
fn test_declaration_failure_rolls_back() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("graph.db");
    let graph = SqliteGraph::open(&path).expect("graph");
    let raw = Connection::open(&path).expect("raw");
    raw.execute_batch(
        "CREATE TRIGGER refuse_edge_labels BEFORE INSERT ON graph_edge_labels \
         BEGIN SELECT RAISE(ABORT, 'edge labels are frozen'); END;",
    )
    .expect("trigger");

    let schema = SchemaDefinition::builder()
        .property_key("path", DataType::String)
        .vertex_label("ArtifactCoordinates")
        .edge_label("ArtifactDependency", Multiplicity::Many2Many)
        .build()
        .expect("schema");
    let mut manager = SchemaManager::new(schema);
    let err = manager.apply_schema(&graph).unwrap_err();
    assert!(matches!(err, EntityGraphError::SchemaDefinitionError(_)));
    assert_eq!(manager.state(), SchemaState::Failed);
    assert_eq!(count(&raw, "graph_property_keys"), 0);
    assert_eq!(count(&raw, "graph_vertex_labels"), 0);
    assert!(!graph.vertex_label_exists("ArtifactCoordinates").expect("lookup"));
}

#[test]
fn test_busy_commit_rolls_back_declarations() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("graph.db");
    let mut config = GraphConfig::default();
    config.sqlite.busy_timeout_ms = Some(50);
    let graph = SqliteGraph::open_with_config(&path, config).expect("graph");
    let reader = Connection::open(&path).expect("reader");
    reader.execute_batch("BEGIN").expect("begin");
    assert_eq!(count(&reader, "graph_vertex_labels"), 0);

    let mut manager = SchemaManager::new(declarations_only());
    let err = manager.apply_schema(&graph).unwrap_err();
    assert!(matches!(err, EntityGraphError::SchemaDefinitionError(_)));
    assert!(!graph.vertex_label_exists("ArtifactCoordinates").expect("lookup"));
    assert!(graph.property_key("path").expect("lookup").is_none());

    reader.execute_batch("COMMIT").expect("commit");
    manager.apply_schema(&graph).expect("retry");
    let tx = graph.transaction().expect("tx");
    graph.add_vertex("ArtifactCoordinates", "c1").expect("vertex");
    tx.commit().expect("commit");
    drop(graph);

    let reopened = SqliteGraph::open(&path).expect("reopen");
    assert!(reopened.vertex_label_exists("ArtifactCoordinates").expect("lookup"));
    assert_eq!(reopened.vertex_count().expect("count"), 1);
}

#[test]
fn test_index_failure_rolls_back_indexes_only() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("graph.db");
    let graph = SqliteGraph::open(&path).expect("graph");
    let raw = Connection::open(&path).expect("raw");
    raw.execute_batch(
        "CREATE TRIGGER refuse_indexes BEFORE INSERT ON graph_indexes \
         BEGIN SELECT RAISE(ABORT, 'no indexes'); END;",
    )
    .expect("trigger");

    let mut manager = SchemaManager::new(with_path_index());
    let err = manager.apply_schema(&graph).unwrap_err();
    assert!(matches!(err, EntityGraphError::IndexDefinitionError(_)));
    assert_eq!(count(&raw, "graph_property_keys"), 1);
    assert_eq!(count(&raw, "graph_indexes"), 0);

    raw.execute_batch("DROP TRIGGER refuse_indexes").expect("drop trigger");
    let created = manager.apply_schema(&graph).expect("retry");
    assert_eq!(created.len(), 1);
    assert_eq!(manager.state(), SchemaState::Ready);
}

#[test]
fn test_index_wait_times_out() {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    let mut manager = SchemaManager::new(with_path_index()).with_index_wait(IndexWaitConfig {
        timeout_ms: 0,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
    });
    let err = manager.apply_schema(&graph).unwrap_err();
    assert!(
        matches!(err, EntityGraphError::IndexWaitTimeout(ref name) if name == "ArtifactCoordinates.path")
    );
    assert_eq!(manager.state(), SchemaState::Failed);
}

#[test]
fn test_cancelled_wait_resumes_on_next_run() {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    let cancel = Arc::new(AtomicBool::new(true));
    let mut manager = SchemaManager::new(with_path_index()).with_cancel_flag(Arc::clone(&cancel));
    let err = manager.apply_schema(&graph).unwrap_err();
    assert!(matches!(err, EntityGraphError::IndexWaitCancelled(_)));
    assert_eq!(
        graph.index_status("ArtifactCoordinates.path").expect("status"),
        Some(IndexStatus::Installed)
    );

    cancel.store(false, Ordering::SeqCst);
    let created = manager.apply_schema(&graph).expect("resume");
    assert!(created.is_empty());
    assert_eq!(
        graph.index_status("ArtifactCoordinates.path").expect("status"),
        Some(IndexStatus::Enabled)
    );
}

#[test]
fn test_management_describe_lists_catalog() {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    SchemaManager::new(artifact_schema().expect("schema"))
        .apply_schema(&graph)
        .expect("apply");
    let mgmt = graph.open_management().expect("management");
    let description = mgmt.describe().expect("describe");
    mgmt.rollback().expect("rollback");
    assert!(description.contains("ArtifactEntry#ArtifactCoordinates | MANY2ONE"));
    assert!(description.contains("tags | SET | String"));
    assert!(description.contains("ArtifactCoordinates.path | vertex | ArtifactCoordinates | path | ENABLED"));
}

#[test]
fn test_management_rejects_set_keyed_index() {
    let graph = SqliteGraph::open_in_memory().expect("graph");
    SchemaManager::new(artifact_schema().expect("schema"))
        .apply_schema(&graph)
        .expect("apply");
    let mgmt = graph.open_management().expect("management");
    let err = mgmt
        .build_composite_index(&entitygraph::IndexDef {
            name: "ArtifactEntry.tags".into(),
            element_kind: ElementKind::Vertex,
            keys: vec!["tags".into()],
            scope_label: Some("ArtifactEntry".into()),
        })
        .unwrap_err();
    assert!(matches!(err, EntityGraphError::SchemaError(_)));
    mgmt.rollback().expect("rollback");
}
