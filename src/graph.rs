use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter, types::Value as SqlValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    cache::SchemaCache,
    config::GraphConfig,
    definition::{Cardinality, DataType, ElementKind, Multiplicity, PropertyKeyDef, UUID_PROPERTY},
    errors::EntityGraphError,
    index,
    schema::ensure_schema,
};

/// A vertex or edge as seen by a traversal: its kind, storage id, label and
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    pub id: i64,
    pub label: String,
    pub uuid: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Outcome of an identity-keyed insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted {
    Created(Element),
    /// The uuid was already taken under the same label.
    Existing(Element),
}

impl Upserted {
    pub fn element(&self) -> &Element {
        match self {
            Upserted::Created(element) | Upserted::Existing(element) => element,
        }
    }

    pub fn into_element(self) -> Element {
        match self {
            Upserted::Created(element) | Upserted::Existing(element) => element,
        }
    }
}

/// Label and property-equality filter evaluated by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFilter {
    pub kind: ElementKind,
    pub label: Option<String>,
    pub uuid: Option<String>,
    pub properties: Vec<(String, Value)>,
}

impl ElementFilter {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            label: None,
            uuid: None,
            properties: Vec::new(),
        }
    }
}

pub struct SqliteGraph {
    conn: Connection,
    config: GraphConfig,
    schema_cache: SchemaCache,
    savepoint_depth: Cell<u32>,
}

impl SqliteGraph {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EntityGraphError> {
        Self::open_with_config(path, GraphConfig::default())
    }

    pub fn open_in_memory() -> Result<Self, EntityGraphError> {
        Self::open_in_memory_with_config(GraphConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: GraphConfig,
    ) -> Result<Self, EntityGraphError> {
        let conn =
            Connection::open(path).map_err(|e| EntityGraphError::connection(e.to_string()))?;
        Self::from_connection(conn, config)
    }

    pub fn open_in_memory_with_config(config: GraphConfig) -> Result<Self, EntityGraphError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EntityGraphError::connection(e.to_string()))?;
        Self::from_connection(conn, config)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Opens a savepoint; nested calls nest savepoints.
    pub fn transaction(&self) -> Result<GraphTransaction<'_>, EntityGraphError> {
        let depth = self.savepoint_depth.get() + 1;
        let name = format!("graph_tx_{depth}");
        self.conn
            .execute_batch(&format!("SAVEPOINT {name}"))
            .map_err(|e| EntityGraphError::transaction(e.to_string()))?;
        self.savepoint_depth.set(depth);
        Ok(GraphTransaction {
            graph: self,
            name,
            finished: false,
        })
    }

    pub fn vertex_count(&self) -> Result<i64, EntityGraphError> {
        self.count("SELECT COUNT(*) FROM graph_entities")
    }

    pub fn edge_count(&self) -> Result<i64, EntityGraphError> {
        self.count("SELECT COUNT(*) FROM graph_edges")
    }

    pub fn property_key(&self, name: &str) -> Result<Option<PropertyKeyDef>, EntityGraphError> {
        if let Some(cached) = self.schema_cache.property_keys.get(&name.to_string()) {
            return Ok(Some(cached));
        }
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT data_type, cardinality FROM graph_property_keys WHERE name=?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let Some((data_type, cardinality)) = row else {
            return Ok(None);
        };
        let def = PropertyKeyDef {
            name: name.to_string(),
            data_type: DataType::parse(&data_type).ok_or_else(|| {
                EntityGraphError::schema(format!("unknown data type {data_type} for {name}"))
            })?,
            cardinality: Cardinality::parse(&cardinality).ok_or_else(|| {
                EntityGraphError::schema(format!("unknown cardinality {cardinality} for {name}"))
            })?,
        };
        self.schema_cache
            .property_keys
            .insert(name.to_string(), def.clone());
        Ok(Some(def))
    }

    pub fn vertex_label_exists(&self, name: &str) -> Result<bool, EntityGraphError> {
        if self.schema_cache.vertex_labels.get(&name.to_string()).is_some() {
            return Ok(true);
        }
        let exists = self.exists("SELECT 1 FROM graph_vertex_labels WHERE name=?1", name)?;
        if exists {
            self.schema_cache.vertex_labels.insert(name.to_string(), ());
        }
        Ok(exists)
    }

    pub fn edge_multiplicity(&self, name: &str) -> Result<Option<Multiplicity>, EntityGraphError> {
        if let Some(cached) = self.schema_cache.edge_labels.get(&name.to_string()) {
            return Ok(Some(cached));
        }
        let multiplicity: Option<String> = self
            .conn
            .query_row(
                "SELECT multiplicity FROM graph_edge_labels WHERE name=?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let Some(multiplicity) = multiplicity else {
            return Ok(None);
        };
        let parsed = Multiplicity::parse(&multiplicity).ok_or_else(|| {
            EntityGraphError::schema(format!("unknown multiplicity {multiplicity} for {name}"))
        })?;
        self.schema_cache
            .edge_labels
            .insert(name.to_string(), parsed);
        Ok(Some(parsed))
    }

    /// Inserts a vertex unless `uuid` is already taken.
    ///
    /// The uuid column is unique, so two writers on the same identity never
    /// end with two vertices. A writer that reaches the insert after the
    /// other's commit sees [`Upserted::Existing`]. While the other still holds
    /// its write lock the insert usually fails with `SQLITE_BUSY` instead,
    /// surfaced as an error once `busy_timeout_ms` runs out.
    pub fn add_vertex(&self, label: &str, uuid: &str) -> Result<Upserted, EntityGraphError> {
        validate_identity(label, uuid)?;
        if !self.vertex_label_exists(label)? {
            return Err(EntityGraphError::unknown_label(format!("vertex label {label}")));
        }
        let inserted = self
            .conn
            .execute(
                "INSERT INTO graph_entities(label, uuid) VALUES(?1, ?2) ON CONFLICT(uuid) DO NOTHING",
                params![label, uuid],
            )
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        if inserted == 0 {
            let existing = self
                .find_by_uuid(ElementKind::Vertex, uuid)?
                .ok_or_else(|| EntityGraphError::not_found(format!("vertex {uuid}")))?;
            return existing_with_label(existing, label);
        }
        let vertex = Element {
            kind: ElementKind::Vertex,
            id: self.conn.last_insert_rowid(),
            label: label.to_string(),
            uuid: uuid.to_string(),
        };
        index::refresh_entries(self, &vertex, None)?;
        Ok(Upserted::Created(vertex))
    }

    /// Inserts an edge unless `uuid` is already taken, enforcing the label's
    /// multiplicity.
    pub fn add_edge(
        &self,
        label: &str,
        uuid: &str,
        from: &Element,
        to: &Element,
    ) -> Result<Upserted, EntityGraphError> {
        validate_identity(label, uuid)?;
        if from.kind != ElementKind::Vertex || to.kind != ElementKind::Vertex {
            return Err(EntityGraphError::invalid_input(
                "edge endpoints must be vertices",
            ));
        }
        let multiplicity = self
            .edge_multiplicity(label)?
            .ok_or_else(|| EntityGraphError::unknown_label(format!("edge label {label}")))?;
        if let Some(existing) = self.find_by_uuid(ElementKind::Edge, uuid)? {
            return existing_with_label(existing, label);
        }
        if multiplicity.single_out()
            && !self
                .incident_edges(from, Direction::Outgoing, Some(label))?
                .is_empty()
        {
            return Err(EntityGraphError::invalid_input(format!(
                "{} edge {label} already leaves vertex {}",
                multiplicity.as_str(),
                from.uuid
            )));
        }
        if multiplicity.single_in()
            && !self
                .incident_edges(to, Direction::Incoming, Some(label))?
                .is_empty()
        {
            return Err(EntityGraphError::invalid_input(format!(
                "{} edge {label} already enters vertex {}",
                multiplicity.as_str(),
                to.uuid
            )));
        }
        let inserted = self
            .conn
            .execute(
                "INSERT INTO graph_edges(from_id, to_id, label, uuid) VALUES(?1, ?2, ?3, ?4) \
                 ON CONFLICT(uuid) DO NOTHING",
                params![from.id, to.id, label, uuid],
            )
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        if inserted == 0 {
            let existing = self
                .find_by_uuid(ElementKind::Edge, uuid)?
                .ok_or_else(|| EntityGraphError::not_found(format!("edge {uuid}")))?;
            return existing_with_label(existing, label);
        }
        let edge = Element {
            kind: ElementKind::Edge,
            id: self.conn.last_insert_rowid(),
            label: label.to_string(),
            uuid: uuid.to_string(),
        };
        index::refresh_entries(self, &edge, None)?;
        Ok(Upserted::Created(edge))
    }

    pub fn remove_edge(&self, edge: &Element) -> Result<(), EntityGraphError> {
        if edge.kind != ElementKind::Edge {
            return Err(EntityGraphError::invalid_input("not an edge"));
        }
        let affected = self
            .conn
            .execute("DELETE FROM graph_edges WHERE id=?1", params![edge.id])
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        if affected == 0 {
            return Err(EntityGraphError::not_found(format!("edge {}", edge.uuid)));
        }
        self.conn
            .execute(
                "DELETE FROM graph_properties WHERE element_kind='edge' AND element_id=?1",
                params![edge.id],
            )
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        index::remove_entries(self, edge)
    }

    pub fn element(&self, kind: ElementKind, id: i64) -> Result<Element, EntityGraphError> {
        let sql = match kind {
            ElementKind::Vertex => "SELECT id, label, uuid FROM graph_entities WHERE id=?1",
            ElementKind::Edge => "SELECT id, label, uuid FROM graph_edges WHERE id=?1",
        };
        self.conn
            .query_row(sql, params![id], |row| row_to_element(kind, row))
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    EntityGraphError::not_found(format!("{} {id}", kind.as_str()))
                }
                other => EntityGraphError::query(other.to_string()),
            })
    }

    /// Writes one value. `SINGLE` keys are replaced, `SET` keys gain the value
    /// unless present, `LIST` keys append it.
    pub fn set_property(
        &self,
        element: &Element,
        key: &str,
        value: Value,
    ) -> Result<(), EntityGraphError> {
        let def = self.writable_key(key, &value)?;
        match def.cardinality {
            Cardinality::Single => self.replace_values(element, key, &[value])?,
            Cardinality::Set => {
                let current = self.stored_values(element, key)?;
                if !current.contains(&value) {
                    self.insert_value(element, key, current.len() as i64, &value)?;
                }
            }
            Cardinality::List => {
                let next = self.stored_values(element, key)?.len() as i64;
                self.insert_value(element, key, next, &value)?;
            }
        }
        index::refresh_entries(self, element, Some(key))
    }

    /// Replaces every value of `key`. An empty list removes the property.
    pub fn set_property_values(
        &self,
        element: &Element,
        key: &str,
        values: Vec<Value>,
    ) -> Result<(), EntityGraphError> {
        let mut def = None;
        for value in &values {
            def = Some(self.writable_key(key, value)?);
        }
        let values = match def.map(|def| def.cardinality) {
            Some(Cardinality::Single) if values.len() > 1 => {
                return Err(EntityGraphError::invalid_input(format!(
                    "property {key} is SINGLE but {} values were given",
                    values.len()
                )));
            }
            Some(Cardinality::Set) => {
                let mut unique: Vec<Value> = Vec::with_capacity(values.len());
                for value in values {
                    if !unique.contains(&value) {
                        unique.push(value);
                    }
                }
                unique
            }
            _ => values,
        };
        if values.is_empty() {
            return self.remove_property(element, key);
        }
        self.replace_values(element, key, &values)?;
        index::refresh_entries(self, element, Some(key))
    }

    pub fn remove_property(&self, element: &Element, key: &str) -> Result<(), EntityGraphError> {
        if key == UUID_PROPERTY {
            return Err(EntityGraphError::invalid_input("uuid is immutable"));
        }
        self.conn
            .execute(
                "DELETE FROM graph_properties WHERE element_kind=?1 AND element_id=?2 AND key=?3",
                params![element.kind.as_str(), element.id, key],
            )
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        index::refresh_entries(self, element, Some(key))
    }

    /// All stored values of `key` in ordinal order, or `None` when the
    /// property was never set. `uuid` is answered from the identity column.
    pub fn property_values(
        &self,
        element: &Element,
        key: &str,
    ) -> Result<Option<Vec<Value>>, EntityGraphError> {
        if key == UUID_PROPERTY {
            return Ok(Some(vec![Value::String(element.uuid.clone())]));
        }
        let values = self.stored_values(element, key)?;
        Ok(if values.is_empty() { None } else { Some(values) })
    }

    pub fn scan(&self, filter: &ElementFilter) -> Result<Vec<Element>, EntityGraphError> {
        if let Some(ids) = index::lookup(self, filter)? {
            let mut elements = Vec::with_capacity(ids.len());
            for id in ids {
                let element = self.element(filter.kind, id)?;
                if self.matches(&element, filter)? {
                    elements.push(element);
                }
            }
            return Ok(elements);
        }
        let table = match filter.kind {
            ElementKind::Vertex => "graph_entities",
            ElementKind::Edge => "graph_edges",
        };
        let mut sql = format!("SELECT id, label, uuid FROM {table} WHERE 1=1");
        let mut args: Vec<SqlValue> = Vec::new();
        if let Some(label) = &filter.label {
            args.push(SqlValue::Text(label.clone()));
            sql.push_str(&format!(" AND label=?{}", args.len()));
        }
        if let Some(uuid) = &filter.uuid {
            args.push(SqlValue::Text(uuid.clone()));
            sql.push_str(&format!(" AND uuid=?{}", args.len()));
        }
        for (key, value) in &filter.properties {
            if key == UUID_PROPERTY {
                args.push(SqlValue::Text(value.as_str().unwrap_or_default().to_string()));
                sql.push_str(&format!(" AND uuid=?{}", args.len()));
                continue;
            }
            args.push(SqlValue::Text(filter.kind.as_str().to_string()));
            args.push(SqlValue::Text(key.clone()));
            args.push(SqlValue::Text(encode_value(value)?));
            let n = args.len();
            sql.push_str(&format!(
                " AND id IN (SELECT element_id FROM graph_properties \
                 WHERE element_kind=?{} AND key=?{} AND value=?{})",
                n - 2,
                n - 1,
                n
            ));
        }
        sql.push_str(" ORDER BY id");
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                row_to_element(filter.kind, row)
            })
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let mut elements = Vec::new();
        for row in rows {
            elements.push(row.map_err(|e| EntityGraphError::query(e.to_string()))?);
        }
        Ok(elements)
    }

    pub fn incident_edges(
        &self,
        vertex: &Element,
        direction: Direction,
        edge_label: Option<&str>,
    ) -> Result<Vec<Element>, EntityGraphError> {
        let column = match direction {
            Direction::Outgoing => "from_id",
            Direction::Incoming => "to_id",
        };
        let sql = match edge_label {
            Some(_) => format!(
                "SELECT id, label, uuid FROM graph_edges WHERE {column}=?1 AND label=?2 ORDER BY id"
            ),
            None => format!("SELECT id, label, uuid FROM graph_edges WHERE {column}=?1 ORDER BY id"),
        };
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let rows = match edge_label {
            Some(label) => stmt.query_map(params![vertex.id, label], edge_from_row),
            None => stmt.query_map(params![vertex.id], edge_from_row),
        }
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row.map_err(|e| EntityGraphError::query(e.to_string()))?);
        }
        Ok(edges)
    }

    /// The vertex an edge leaves (`Outgoing`) or enters (`Incoming`).
    pub fn edge_vertex(
        &self,
        edge: &Element,
        direction: Direction,
    ) -> Result<Element, EntityGraphError> {
        let sql = match direction {
            Direction::Outgoing => "SELECT from_id FROM graph_edges WHERE id=?1",
            Direction::Incoming => "SELECT to_id FROM graph_edges WHERE id=?1",
        };
        let vertex_id: i64 = self
            .conn
            .query_row(sql, params![edge.id], |row| row.get(0))
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    EntityGraphError::not_found(format!("edge {}", edge.uuid))
                }
                other => EntityGraphError::query(other.to_string()),
            })?;
        self.element(ElementKind::Vertex, vertex_id)
    }

    /// Vertices one hop away through edges of `edge_label`.
    pub fn adjacent(
        &self,
        vertex: &Element,
        direction: Direction,
        edge_label: Option<&str>,
    ) -> Result<Vec<Element>, EntityGraphError> {
        let far_end = match direction {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
        };
        let mut vertices = Vec::new();
        for edge in self.incident_edges(vertex, direction, edge_label)? {
            vertices.push(self.edge_vertex(&edge, far_end)?);
        }
        Ok(vertices)
    }
}

impl SqliteGraph {
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn schema_cache(&self) -> &SchemaCache {
        &self.schema_cache
    }

    pub(crate) fn matches(
        &self,
        element: &Element,
        filter: &ElementFilter,
    ) -> Result<bool, EntityGraphError> {
        if element.kind != filter.kind {
            return Ok(false);
        }
        if filter.label.as_ref().is_some_and(|label| *label != element.label) {
            return Ok(false);
        }
        if filter.uuid.as_ref().is_some_and(|uuid| *uuid != element.uuid) {
            return Ok(false);
        }
        for (key, value) in &filter.properties {
            let present = self
                .property_values(element, key)?
                .is_some_and(|values| values.contains(value));
            if !present {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn find_by_uuid(
        &self,
        kind: ElementKind,
        uuid: &str,
    ) -> Result<Option<Element>, EntityGraphError> {
        let sql = match kind {
            ElementKind::Vertex => "SELECT id, label, uuid FROM graph_entities WHERE uuid=?1",
            ElementKind::Edge => "SELECT id, label, uuid FROM graph_edges WHERE uuid=?1",
        };
        self.conn
            .query_row(sql, params![uuid], |row| row_to_element(kind, row))
            .optional()
            .map_err(|e| EntityGraphError::query(e.to_string()))
    }

    fn writable_key(&self, key: &str, value: &Value) -> Result<PropertyKeyDef, EntityGraphError> {
        if key == UUID_PROPERTY {
            return Err(EntityGraphError::invalid_input("uuid is immutable"));
        }
        let def = self
            .property_key(key)?
            .ok_or_else(|| EntityGraphError::schema(format!("undeclared property key {key}")))?;
        if !def.data_type.accepts(value) {
            return Err(EntityGraphError::invalid_input(format!(
                "value {value} is not a valid {} for {key}",
                def.data_type.as_str()
            )));
        }
        Ok(def)
    }

    fn stored_values(&self, element: &Element, key: &str) -> Result<Vec<Value>, EntityGraphError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT value FROM graph_properties \
                 WHERE element_kind=?1 AND element_id=?2 AND key=?3 ORDER BY ordinal",
            )
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![element.kind.as_str(), element.id, key], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let mut values = Vec::new();
        for row in rows {
            let text = row.map_err(|e| EntityGraphError::query(e.to_string()))?;
            values.push(
                serde_json::from_str(&text).map_err(|e| EntityGraphError::query(e.to_string()))?,
            );
        }
        Ok(values)
    }

    fn replace_values(
        &self,
        element: &Element,
        key: &str,
        values: &[Value],
    ) -> Result<(), EntityGraphError> {
        self.conn
            .execute(
                "DELETE FROM graph_properties WHERE element_kind=?1 AND element_id=?2 AND key=?3",
                params![element.kind.as_str(), element.id, key],
            )
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        for (ordinal, value) in values.iter().enumerate() {
            self.insert_value(element, key, ordinal as i64, value)?;
        }
        Ok(())
    }

    fn insert_value(
        &self,
        element: &Element,
        key: &str,
        ordinal: i64,
        value: &Value,
    ) -> Result<(), EntityGraphError> {
        self.conn
            .execute(
                "INSERT INTO graph_properties(element_kind, element_id, key, ordinal, value) \
                 VALUES(?1, ?2, ?3, ?4, ?5)",
                params![
                    element.kind.as_str(),
                    element.id,
                    key,
                    ordinal,
                    encode_value(value)?
                ],
            )
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        Ok(())
    }

    fn exists(&self, sql: &str, name: &str) -> Result<bool, EntityGraphError> {
        let found: Option<i64> = self
            .conn
            .query_row(sql, params![name], |row| row.get(0))
            .optional()
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        Ok(found.is_some())
    }

    fn count(&self, sql: &str) -> Result<i64, EntityGraphError> {
        self.conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| EntityGraphError::query(e.to_string()))
    }

    fn from_connection(conn: Connection, config: GraphConfig) -> Result<Self, EntityGraphError> {
        ensure_schema(&conn)?;
        apply_sqlite_config(&conn, &config)?;
        Ok(Self {
            conn,
            config,
            schema_cache: SchemaCache::new(),
            savepoint_depth: Cell::new(0),
        })
    }
}

/// Scoped savepoint. Dropping it without [`GraphTransaction::commit`] rolls
/// back every write made since it was opened.
pub struct GraphTransaction<'g> {
    graph: &'g SqliteGraph,
    name: String,
    finished: bool,
}

impl<'g> GraphTransaction<'g> {
    pub fn graph(&self) -> &'g SqliteGraph {
        self.graph
    }

    /// Releases the savepoint. If the release fails (an outermost release is
    /// a commit and can hit `SQLITE_BUSY`) the savepoint is rolled back
    /// before the error is returned, so nothing stays open.
    pub fn commit(mut self) -> Result<(), EntityGraphError> {
        self.finished = true;
        self.close();
        if let Err(err) = self
            .graph
            .conn
            .execute_batch(&format!("RELEASE {}", self.name))
        {
            warn!(savepoint = %self.name, error = %err, "release failed, rolling back");
            self.abandon();
            return Err(EntityGraphError::transaction(err.to_string()));
        }
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), EntityGraphError> {
        self.finished = true;
        self.close();
        self.rollback_savepoint()
    }

    fn close(&self) {
        let depth = self.graph.savepoint_depth.get();
        self.graph.savepoint_depth.set(depth.saturating_sub(1));
    }

    fn rollback_savepoint(&self) -> Result<(), EntityGraphError> {
        self.graph.schema_cache.clear();
        self.graph
            .conn
            .execute_batch(&format!(
                "ROLLBACK TO {name}; RELEASE {name}",
                name = self.name
            ))
            .map_err(|e| EntityGraphError::transaction(e.to_string()))
    }

    fn abandon(&self) {
        self.graph.schema_cache.clear();
        if self.graph.conn.is_autocommit() {
            return;
        }
        let sql = if self.graph.savepoint_depth.get() == 0 {
            "ROLLBACK".to_string()
        } else {
            format!("ROLLBACK TO {name}; RELEASE {name}", name = self.name)
        };
        if let Err(err) = self.graph.conn.execute_batch(&sql) {
            warn!(savepoint = %self.name, error = %err, "rollback after failed release failed");
        }
    }
}

impl Drop for GraphTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.close();
        debug!(savepoint = %self.name, "rolling back unfinished transaction");
        if let Err(err) = self.rollback_savepoint() {
            warn!(savepoint = %self.name, error = %err, "rollback failed");
        }
    }
}

pub(crate) fn encode_value(value: &Value) -> Result<String, EntityGraphError> {
    serde_json::to_string(value).map_err(|e| EntityGraphError::invalid_input(e.to_string()))
}

fn apply_sqlite_config(conn: &Connection, config: &GraphConfig) -> Result<(), EntityGraphError> {
    if let Some(capacity) = config.sqlite.cache_size {
        conn.set_prepared_statement_cache_capacity(capacity);
    }
    if let Some(timeout) = config.sqlite.busy_timeout_ms {
        conn.busy_timeout(Duration::from_millis(timeout))
            .map_err(|e| EntityGraphError::connection(e.to_string()))?;
    }
    for (key, value) in &config.sqlite.pragma_settings {
        match conn.execute(&format!("PRAGMA {key} = {value}"), []) {
            Ok(_) | Err(rusqlite::Error::ExecuteReturnedResults) => {}
            Err(e) => {
                return Err(EntityGraphError::connection(format!(
                    "PRAGMA {key} = {value}: {e}"
                )));
            }
        }
    }
    Ok(())
}

fn existing_with_label(existing: Element, label: &str) -> Result<Upserted, EntityGraphError> {
    if existing.label != label {
        return Err(EntityGraphError::invalid_input(format!(
            "uuid {} is already bound to {} {}",
            existing.uuid,
            existing.kind.as_str(),
            existing.label
        )));
    }
    Ok(Upserted::Existing(existing))
}

fn row_to_element(kind: ElementKind, row: &rusqlite::Row<'_>) -> Result<Element, rusqlite::Error> {
    Ok(Element {
        kind,
        id: row.get(0)?,
        label: row.get(1)?,
        uuid: row.get(2)?,
    })
}

fn edge_from_row(row: &rusqlite::Row<'_>) -> Result<Element, rusqlite::Error> {
    row_to_element(ElementKind::Edge, row)
}

fn validate_identity(label: &str, uuid: &str) -> Result<(), EntityGraphError> {
    if label.trim().is_empty() {
        return Err(EntityGraphError::invalid_input("label must be set"));
    }
    if uuid.trim().is_empty() {
        return Err(EntityGraphError::invalid_input("uuid must be set"));
    }
    Ok(())
}
