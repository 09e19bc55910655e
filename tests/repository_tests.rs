use entitygraph::{
    Cardinality, DataType, EntityGraphError, EntityMapping, EntityRepository, EntityTraversalSource,
    GraphBackend, Multiplicity, SchemaDefinition, SchemaManager, SqliteGraph, VertexReader,
    VertexWriter,
};

#[derive(Clone, Debug, Default, PartialEq)]
struct Team {
    uuid: Option<String>,
    name: Option<String>,
}

impl EntityMapping for Team {
    const LABEL: &'static str = "Team";

    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    fn unfold<G: GraphBackend>(&self, writer: &VertexWriter<'_, G>) -> Result<(), EntityGraphError> {
        writer.property_opt("name", self.name.clone())
    }

    fn materialize<G: GraphBackend>(reader: &VertexReader<'_, G>) -> Result<Self, EntityGraphError> {
        Ok(Self {
            uuid: Some(reader.uuid().to_string()),
            name: reader.string("name")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Member {
    uuid: Option<String>,
    name: Option<String>,
    nicknames: Vec<String>,
    team: Option<Team>,
}

impl EntityMapping for Member {
    const LABEL: &'static str = "Member";

    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    fn unfold<G: GraphBackend>(&self, writer: &VertexWriter<'_, G>) -> Result<(), EntityGraphError> {
        writer.property_opt("name", self.name.clone())?;
        writer.property_values("nicknames", self.nicknames.clone())?;
        writer.relation("memberOf", self.team.as_ref())?;
        Ok(())
    }

    fn materialize<G: GraphBackend>(reader: &VertexReader<'_, G>) -> Result<Self, EntityGraphError> {
        Ok(Self {
            uuid: Some(reader.uuid().to_string()),
            name: reader.string("name")?,
            nicknames: reader
                .values("nicknames")?
                .unwrap_or_default()
                .into_iter()
                .filter_map(|value| value.as_str().map(str::to_string))
                .collect(),
            team: reader.relation("memberOf")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Node {
    uuid: Option<String>,
    name: Option<String>,
    next: Option<Box<Node>>,
}

impl EntityMapping for Node {
    const LABEL: &'static str = "Node";

    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    fn unfold<G: GraphBackend>(&self, writer: &VertexWriter<'_, G>) -> Result<(), EntityGraphError> {
        writer.property_opt("name", self.name.clone())?;
        writer.relation("next", self.next.as_deref())?;
        Ok(())
    }

    fn materialize<G: GraphBackend>(reader: &VertexReader<'_, G>) -> Result<Self, EntityGraphError> {
        Ok(Self {
            uuid: Some(reader.uuid().to_string()),
            name: reader.string("name")?,
            next: reader.relation("next")?.map(Box::new),
        })
    }
}

fn node(uuid: &str, next: Option<Node>) -> Node {
    Node {
        uuid: Some(uuid.to_string()),
        name: Some(uuid.to_string()),
        next: next.map(Box::new),
    }
}

#[derive(Debug)]
struct Undeclared;

impl EntityMapping for Undeclared {
    const LABEL: &'static str = "Undeclared";

    fn uuid(&self) -> Option<&str> {
        None
    }

    fn unfold<G: GraphBackend>(&self, _writer: &VertexWriter<'_, G>) -> Result<(), EntityGraphError> {
        Ok(())
    }

    fn materialize<G: GraphBackend>(_reader: &VertexReader<'_, G>) -> Result<Self, EntityGraphError> {
        Ok(Undeclared)
    }
}

fn graph() -> SqliteGraph {
    let schema = SchemaDefinition::builder()
        .property_key("uuid", DataType::String)
        .property_key("name", DataType::String)
        .property_key_with("nicknames", DataType::String, Cardinality::List)
        .vertex_label("Team")
        .vertex_label("Member")
        .vertex_label("Node")
        .edge_label("memberOf", Multiplicity::Many2One)
        .edge_label("next", Multiplicity::Many2One)
        .vertex_index("Member", "uuid")
        .build()
        .expect("schema");
    let graph = SqliteGraph::open_in_memory().expect("graph");
    SchemaManager::new(schema).apply_schema(&graph).expect("apply");
    graph
}

fn member(name: &str, team: Option<Team>) -> Member {
    Member {
        uuid: None,
        name: Some(name.to_string()),
        nicknames: vec!["x".into(), "y".into(), "x".into()],
        team,
    }
}

#[test]
fn test_save_assigns_uuid_and_reads_back() {
    let graph = graph();
    let source = EntityTraversalSource::new(&graph);
    let members = EntityRepository::<_, Member>::new(&source);

    let team = Team {
        uuid: None,
        name: Some("core".into()),
    };
    let saved = members.save(&member("ada", Some(team))).expect("save");
    let uuid = saved.uuid.clone().expect("uuid assigned");
    assert_eq!(saved.name.as_deref(), Some("ada"));
    assert_eq!(saved.nicknames, vec!["x", "y", "x"]);
    let saved_team = saved.team.clone().expect("team");
    assert!(saved_team.uuid.is_some());
    assert_eq!(saved_team.name.as_deref(), Some("core"));

    assert_eq!(members.find_by_id(&uuid).expect("find"), Some(saved));
    assert_eq!(graph.vertex_count().expect("count"), 2);
    assert_eq!(graph.edge_count().expect("count"), 1);
}

#[test]
fn test_saving_twice_keeps_one_vertex() {
    let graph = graph();
    let source = EntityTraversalSource::new(&graph);
    let members = EntityRepository::<_, Member>::new(&source);
    let first = members.save(&member("ada", None)).expect("first");
    let mut renamed = first.clone();
    renamed.name = Some("ada lovelace".into());
    let second = members.save(&renamed).expect("second");

    assert_eq!(first.uuid, second.uuid);
    assert_eq!(second.name.as_deref(), Some("ada lovelace"));
    assert_eq!(graph.vertex_count().expect("count"), 1);
}

#[test]
fn test_cleared_fields_are_removed() {
    let graph = graph();
    let source = EntityTraversalSource::new(&graph);
    let members = EntityRepository::<_, Member>::new(&source);
    let team = Team {
        uuid: Some("team-1".into()),
        name: Some("core".into()),
    };
    let mut saved = members.save(&member("ada", Some(team))).expect("save");
    assert_eq!(graph.edge_count().expect("count"), 1);

    saved.name = None;
    saved.nicknames.clear();
    saved.team = None;
    let cleared = members.save(&saved).expect("clear");
    assert_eq!(cleared.name, None);
    assert!(cleared.nicknames.is_empty());
    assert_eq!(cleared.team, None);
    assert_eq!(graph.edge_count().expect("count"), 0);
    assert_eq!(
        EntityRepository::<_, Team>::new(&source)
            .find_by_id("team-1")
            .expect("team")
            .and_then(|team| team.name),
        Some("core".to_string())
    );
}

#[test]
fn test_relation_moves_to_new_target() {
    let graph = graph();
    let source = EntityTraversalSource::new(&graph);
    let members = EntityRepository::<_, Member>::new(&source);
    let core = Team {
        uuid: Some("core".into()),
        name: None,
    };
    let web = Team {
        uuid: Some("web".into()),
        name: None,
    };
    let mut saved = members.save(&member("ada", Some(core))).expect("save");
    saved.team = Some(web);
    let moved = members.save(&saved).expect("move");
    assert_eq!(moved.team.and_then(|team| team.uuid).as_deref(), Some("web"));
    assert_eq!(graph.edge_count().expect("count"), 1);
}

#[test]
fn test_find_missing_and_by_property() {
    let graph = graph();
    let source = EntityTraversalSource::new(&graph);
    let members = EntityRepository::<_, Member>::new(&source);
    assert_eq!(members.find_by_id("nobody").expect("find"), None);

    members.save(&member("ada", None)).expect("ada");
    members.save(&member("bob", None)).expect("bob");
    members.save(&member("bob", None)).expect("bob again");
    let ada = members.find_by("name", "ada").expect("find").expect("ada");
    assert_eq!(ada.name.as_deref(), Some("ada"));
    assert_eq!(members.find_all_by("name", "bob").expect("find all").len(), 2);
    assert!(members.find_all_by("name", "eve").expect("none").is_empty());
}

#[test]
fn test_undeclared_entity_type_is_rejected() {
    let graph = graph();
    let source = EntityTraversalSource::new(&graph);
    let err = EntityRepository::<_, Undeclared>::new(&source)
        .save(&Undeclared)
        .unwrap_err();
    assert!(matches!(err, EntityGraphError::UnknownLabel(_)));
    assert_eq!(graph.vertex_count().expect("count"), 0);
}

#[test]
fn test_cyclic_relations_materialize_once_per_path() {
    let graph = graph();
    let source = EntityTraversalSource::new(&graph);
    let nodes = EntityRepository::<_, Node>::new(&source);

    let saved = nodes
        .save(&node("a", Some(node("b", Some(node("a", None))))))
        .expect("save cycle");
    assert_eq!(graph.vertex_count().expect("count"), 2);
    assert_eq!(graph.edge_count().expect("count"), 2);
    assert_eq!(saved, node("a", Some(node("b", None))));

    let b = nodes.find_by_id("b").expect("find").expect("b");
    assert_eq!(b, node("b", Some(node("a", None))));
}
