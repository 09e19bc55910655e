//! Schema-mutation transactions over the catalog tables.

use std::fmt::Write as _;

use rusqlite::{OptionalExtension, params};
use tracing::{debug, warn};

use crate::{
    EntityGraphError,
    definition::{Cardinality, EdgeLabelDef, ElementKind, IndexDef, PropertyKeyDef, VertexLabelDef},
    graph::{GraphTransaction, SqliteGraph},
    index::{self, IndexStatus},
};

impl SqliteGraph {
    /// Opens a schema-mutation transaction. Nothing it creates is visible to
    /// other connections until [`SchemaManagement::commit`].
    pub fn open_management(&self) -> Result<SchemaManagement<'_>, EntityGraphError> {
        Ok(SchemaManagement {
            tx: self.transaction()?,
        })
    }

    pub fn index_status(&self, name: &str) -> Result<Option<IndexStatus>, EntityGraphError> {
        Ok(index::load(self, name)?.map(|record| record.status))
    }

    /// Polls an index: advances its lifecycle by one step, committing the
    /// step, and reports the status reached.
    pub fn refresh_index_status(&self, name: &str) -> Result<IndexStatus, EntityGraphError> {
        let tx = self.transaction()?;
        let status = index::advance(self, name)?;
        tx.commit()?;
        Ok(status)
    }
}

pub struct SchemaManagement<'g> {
    tx: GraphTransaction<'g>,
}

impl<'g> SchemaManagement<'g> {
    fn graph(&self) -> &'g SqliteGraph {
        self.tx.graph()
    }

    pub fn contains_property_key(&self, name: &str) -> Result<bool, EntityGraphError> {
        self.exists("SELECT 1 FROM graph_property_keys WHERE name=?1", name)
    }

    pub fn make_property_key(&self, key: &PropertyKeyDef) -> Result<(), EntityGraphError> {
        self.graph()
            .connection()
            .execute(
                "INSERT INTO graph_property_keys(name, data_type, cardinality) VALUES(?1, ?2, ?3)",
                params![key.name, key.data_type.as_str(), key.cardinality.as_str()],
            )
            .map_err(|e| EntityGraphError::schema(format!("property key {}: {e}", key.name)))?;
        debug!(key = %key.name, cardinality = key.cardinality.as_str(), "property key created");
        Ok(())
    }

    pub fn contains_vertex_label(&self, name: &str) -> Result<bool, EntityGraphError> {
        self.exists("SELECT 1 FROM graph_vertex_labels WHERE name=?1", name)
    }

    pub fn make_vertex_label(&self, label: &VertexLabelDef) -> Result<(), EntityGraphError> {
        self.graph()
            .connection()
            .execute(
                "INSERT INTO graph_vertex_labels(name) VALUES(?1)",
                params![label.name],
            )
            .map_err(|e| EntityGraphError::schema(format!("vertex label {}: {e}", label.name)))?;
        debug!(label = %label.name, "vertex label created");
        Ok(())
    }

    pub fn contains_edge_label(&self, name: &str) -> Result<bool, EntityGraphError> {
        self.exists("SELECT 1 FROM graph_edge_labels WHERE name=?1", name)
    }

    pub fn make_edge_label(&self, label: &EdgeLabelDef) -> Result<(), EntityGraphError> {
        self.graph()
            .connection()
            .execute(
                "INSERT INTO graph_edge_labels(name, multiplicity) VALUES(?1, ?2)",
                params![label.name, label.multiplicity.as_str()],
            )
            .map_err(|e| EntityGraphError::schema(format!("edge label {}: {e}", label.name)))?;
        debug!(label = %label.name, multiplicity = label.multiplicity.as_str(), "edge label created");
        Ok(())
    }

    pub fn contains_graph_index(&self, name: &str) -> Result<bool, EntityGraphError> {
        self.exists("SELECT 1 FROM graph_indexes WHERE name=?1", name)
    }

    /// Installs a composite index. Keys must be committed or pending SINGLE
    /// property keys, and a scope label must exist for the index's element kind.
    pub fn build_composite_index(&self, index: &IndexDef) -> Result<(), EntityGraphError> {
        if index.keys.is_empty() {
            return Err(EntityGraphError::schema(format!(
                "index {} has no keys",
                index.name
            )));
        }
        for key in &index.keys {
            match self.graph().property_key(key)? {
                Some(def) if def.cardinality == Cardinality::Single => {}
                Some(_) => {
                    return Err(EntityGraphError::schema(format!(
                        "index {} key {key} must have SINGLE cardinality",
                        index.name
                    )));
                }
                None => {
                    return Err(EntityGraphError::schema(format!(
                        "index {} references unknown property key {key}",
                        index.name
                    )));
                }
            }
        }
        if let Some(label) = &index.scope_label {
            let exists = match index.element_kind {
                ElementKind::Vertex => self.contains_vertex_label(label)?,
                ElementKind::Edge => self.contains_edge_label(label)?,
            };
            if !exists {
                return Err(EntityGraphError::schema(format!(
                    "index {} is scoped to unknown {} label {label}",
                    index.name,
                    index.element_kind.as_str()
                )));
            }
        }
        index::create(self.graph(), index)
            .map_err(|e| EntityGraphError::schema(format!("index {}: {e}", index.name)))?;
        debug!(index = %index.name, keys = ?index.keys, "composite index installed");
        Ok(())
    }

    /// Human-readable dump of the catalog as seen inside this transaction.
    pub fn describe(&self) -> Result<String, EntityGraphError> {
        let conn = self.graph().connection();
        let mut out = String::new();
        let _ = writeln!(out, "Vertex Label Name");
        for (name,) in query_rows::<(String,)>(
            conn,
            "SELECT name FROM graph_vertex_labels ORDER BY name",
            |row| Ok((row.get(0)?,)),
        )? {
            let _ = writeln!(out, "  {name}");
        }
        let _ = writeln!(out, "Edge Label Name | Multiplicity");
        for (name, multiplicity) in query_rows::<(String, String)>(
            conn,
            "SELECT name, multiplicity FROM graph_edge_labels ORDER BY name",
            |row| Ok((row.get(0)?, row.get(1)?)),
        )? {
            let _ = writeln!(out, "  {name} | {multiplicity}");
        }
        let _ = writeln!(out, "Property Key Name | Cardinality | Data Type");
        for (name, cardinality, data_type) in query_rows::<(String, String, String)>(
            conn,
            "SELECT name, cardinality, data_type FROM graph_property_keys ORDER BY name",
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )? {
            let _ = writeln!(out, "  {name} | {cardinality} | {data_type}");
        }
        let _ = writeln!(out, "Graph Index | Type | Scope | Keys | Status");
        for record in index::list(self.graph())? {
            let def = &record.definition;
            let _ = writeln!(
                out,
                "  {} | {} | {} | {} | {}",
                def.name,
                def.element_kind.as_str(),
                def.scope_label.as_deref().unwrap_or("-"),
                def.keys.join(","),
                record.status.as_str()
            );
        }
        Ok(out)
    }

    pub fn commit(self) -> Result<(), EntityGraphError> {
        let graph = self.graph();
        self.tx.commit()?;
        graph.schema_cache().clear();
        Ok(())
    }

    pub fn rollback(self) -> Result<(), EntityGraphError> {
        warn!("rolling back schema management transaction");
        self.tx.rollback()
    }

    fn exists(&self, sql: &str, name: &str) -> Result<bool, EntityGraphError> {
        let found: Option<i64> = self
            .graph()
            .connection()
            .query_row(sql, params![name], |row| row.get(0))
            .optional()
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        Ok(found.is_some())
    }
}

fn query_rows<T>(
    conn: &rusqlite::Connection,
    sql: &str,
    map: fn(&rusqlite::Row<'_>) -> Result<T, rusqlite::Error>,
) -> Result<Vec<T>, EntityGraphError> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    let rows = stmt
        .query_map([], map)
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    let mut values = Vec::new();
    for row in rows {
        values.push(row.map_err(|e| EntityGraphError::query(e.to_string()))?);
    }
    Ok(values)
}
