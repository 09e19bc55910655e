//! Composite index storage.
//!
//! An index moves `Installed -> Registered -> Enabled`. Once registered,
//! every property write keeps its entries current; each status poll then
//! backfills one batch of pre-existing elements until the whole scope has been
//! visited and the index is enabled. Only enabled indexes answer scans.

use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    EntityGraphError,
    definition::{ElementKind, IndexDef, UUID_PROPERTY},
    graph::{Element, ElementFilter, SqliteGraph, encode_value},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexStatus {
    Installed,
    Registered,
    Enabled,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Installed => "INSTALLED",
            IndexStatus::Registered => "REGISTERED",
            IndexStatus::Enabled => "ENABLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INSTALLED" => Some(IndexStatus::Installed),
            "REGISTERED" => Some(IndexStatus::Registered),
            "ENABLED" => Some(IndexStatus::Enabled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRecord {
    pub definition: IndexDef,
    pub status: IndexStatus,
    /// Highest element id already backfilled.
    pub cursor: i64,
}

pub fn create(graph: &SqliteGraph, index: &IndexDef) -> Result<(), EntityGraphError> {
    let keys =
        serde_json::to_string(&index.keys).map_err(|e| EntityGraphError::query(e.to_string()))?;
    graph
        .connection()
        .execute(
            "INSERT INTO graph_indexes(name, element_kind, scope_label, keys, status, cursor) \
             VALUES(?1, ?2, ?3, ?4, ?5, 0)",
            params![
                index.name,
                index.element_kind.as_str(),
                index.scope_label,
                keys,
                IndexStatus::Installed.as_str()
            ],
        )
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    Ok(())
}

pub fn load(graph: &SqliteGraph, name: &str) -> Result<Option<IndexRecord>, EntityGraphError> {
    let row = graph
        .connection()
        .query_row(
            "SELECT name, element_kind, scope_label, keys, status, cursor \
             FROM graph_indexes WHERE name=?1",
            params![name],
            read_row,
        )
        .optional()
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    row.map(decode).transpose()
}

pub fn list(graph: &SqliteGraph) -> Result<Vec<IndexRecord>, EntityGraphError> {
    let conn = graph.connection();
    let mut stmt = conn
        .prepare_cached(
            "SELECT name, element_kind, scope_label, keys, status, cursor \
             FROM graph_indexes ORDER BY name",
        )
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    let rows = stmt
        .query_map([], read_row)
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    let mut records = Vec::new();
    for row in rows {
        records.push(decode(
            row.map_err(|e| EntityGraphError::query(e.to_string()))?,
        )?);
    }
    Ok(records)
}

/// Runs one step of the index lifecycle and returns the resulting status.
pub fn advance(graph: &SqliteGraph, name: &str) -> Result<IndexStatus, EntityGraphError> {
    let record = load(graph, name)?
        .ok_or_else(|| EntityGraphError::not_found(format!("index {name}")))?;
    match record.status {
        IndexStatus::Installed => {
            set_status(graph, name, IndexStatus::Registered, 0)?;
            debug!(index = name, "index registered");
            Ok(IndexStatus::Registered)
        }
        IndexStatus::Registered => backfill_batch(graph, &record),
        IndexStatus::Enabled => Ok(IndexStatus::Enabled),
    }
}

/// Recomputes the entries of every maintained index covering `element`.
/// `changed_key` limits the work to indexes containing that key.
pub fn refresh_entries(
    graph: &SqliteGraph,
    element: &Element,
    changed_key: Option<&str>,
) -> Result<(), EntityGraphError> {
    for record in list(graph)? {
        if record.status == IndexStatus::Installed || !covers(&record.definition, element) {
            continue;
        }
        if let Some(key) = changed_key {
            if !record.definition.keys.iter().any(|k| k == key) {
                continue;
            }
        }
        write_entry(graph, &record.definition, element)?;
    }
    Ok(())
}

pub fn remove_entries(graph: &SqliteGraph, element: &Element) -> Result<(), EntityGraphError> {
    graph
        .connection()
        .execute(
            "DELETE FROM graph_index_entries WHERE element_id=?1 AND index_name IN \
             (SELECT name FROM graph_indexes WHERE element_kind=?2)",
            params![element.id, element.kind.as_str()],
        )
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    Ok(())
}

/// Element ids answering `filter` from an enabled index whose keys are exactly
/// the filter's equality keys. `None` when no such index exists.
pub fn lookup(
    graph: &SqliteGraph,
    filter: &ElementFilter,
) -> Result<Option<Vec<i64>>, EntityGraphError> {
    let mut wanted: Vec<(&str, &Value)> = Vec::new();
    let uuid_value = filter.uuid.as_ref().map(|uuid| Value::String(uuid.clone()));
    if let Some(uuid) = &uuid_value {
        wanted.push((UUID_PROPERTY, uuid));
    }
    for (key, value) in &filter.properties {
        match wanted.iter().find(|(k, _)| *k == key.as_str()) {
            Some((_, existing)) if *existing != value => return Ok(Some(Vec::new())),
            Some(_) => {}
            None => wanted.push((key.as_str(), value)),
        }
    }
    if wanted.is_empty() {
        return Ok(None);
    }
    let candidate = list(graph)?.into_iter().find(|record| {
        let def = &record.definition;
        record.status == IndexStatus::Enabled
            && def.element_kind == filter.kind
            && (def.scope_label.is_none() || def.scope_label == filter.label)
            && def.keys.len() == wanted.len()
            && def.keys.iter().all(|k| wanted.iter().any(|(w, _)| *w == k.as_str()))
    });
    let Some(record) = candidate else {
        return Ok(None);
    };
    let mut key_values = Vec::with_capacity(record.definition.keys.len());
    for key in &record.definition.keys {
        if let Some((_, value)) = wanted.iter().find(|(w, _)| *w == key.as_str()) {
            key_values.push((*value).clone());
        }
    }
    let encoded = encode_value(&Value::Array(key_values))?;
    let conn = graph.connection();
    let mut stmt = conn
        .prepare_cached(
            "SELECT element_id FROM graph_index_entries \
             WHERE index_name=?1 AND key_values=?2 ORDER BY element_id",
        )
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    let rows = stmt
        .query_map(params![record.definition.name, encoded], |row| row.get(0))
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row.map_err(|e| EntityGraphError::query(e.to_string()))?);
    }
    debug!(index = %record.definition.name, hits = ids.len(), "index lookup");
    Ok(Some(ids))
}

fn backfill_batch(
    graph: &SqliteGraph,
    record: &IndexRecord,
) -> Result<IndexStatus, EntityGraphError> {
    let def = &record.definition;
    let table = match def.element_kind {
        ElementKind::Vertex => "graph_entities",
        ElementKind::Edge => "graph_edges",
    };
    let batch = graph.config().reindex_batch_size.max(1) as i64;
    let ids: Vec<i64> = {
        let conn = graph.connection();
        let (sql, scoped) = match &def.scope_label {
            Some(_) => (
                format!(
                    "SELECT id FROM {table} WHERE id>?1 AND label=?2 ORDER BY id LIMIT {batch}"
                ),
                true,
            ),
            None => (
                format!("SELECT id FROM {table} WHERE id>?1 ORDER BY id LIMIT {batch}"),
                false,
            ),
        };
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let rows = if scoped {
            stmt.query_map(params![record.cursor, def.scope_label], first_column)
        } else {
            stmt.query_map(params![record.cursor], first_column)
        }
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| EntityGraphError::query(e.to_string()))?);
        }
        ids
    };
    for id in &ids {
        let element = graph.element(def.element_kind, *id)?;
        write_entry(graph, def, &element)?;
    }
    let cursor = ids.last().copied().unwrap_or(record.cursor);
    if (ids.len() as i64) < batch {
        set_status(graph, &def.name, IndexStatus::Enabled, cursor)?;
        debug!(index = %def.name, "index enabled");
        Ok(IndexStatus::Enabled)
    } else {
        set_status(graph, &def.name, IndexStatus::Registered, cursor)?;
        debug!(index = %def.name, cursor, "index backfill batch done");
        Ok(IndexStatus::Registered)
    }
}

fn write_entry(
    graph: &SqliteGraph,
    def: &IndexDef,
    element: &Element,
) -> Result<(), EntityGraphError> {
    let mut key_values = Vec::with_capacity(def.keys.len());
    for key in &def.keys {
        match graph
            .property_values(element, key)?
            .and_then(|values| values.into_iter().next())
        {
            Some(value) => key_values.push(value),
            None => {
                graph
                    .connection()
                    .execute(
                        "DELETE FROM graph_index_entries WHERE index_name=?1 AND element_id=?2",
                        params![def.name, element.id],
                    )
                    .map_err(|e| EntityGraphError::query(e.to_string()))?;
                return Ok(());
            }
        }
    }
    graph
        .connection()
        .execute(
            "INSERT OR REPLACE INTO graph_index_entries(index_name, element_id, key_values) \
             VALUES(?1, ?2, ?3)",
            params![def.name, element.id, encode_value(&Value::Array(key_values))?],
        )
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    Ok(())
}

fn covers(def: &IndexDef, element: &Element) -> bool {
    def.element_kind == element.kind
        && def
            .scope_label
            .as_ref()
            .is_none_or(|label| *label == element.label)
}

fn set_status(
    graph: &SqliteGraph,
    name: &str,
    status: IndexStatus,
    cursor: i64,
) -> Result<(), EntityGraphError> {
    graph
        .connection()
        .execute(
            "UPDATE graph_indexes SET status=?1, cursor=?2 WHERE name=?3",
            params![status.as_str(), cursor, name],
        )
        .map_err(|e| EntityGraphError::query(e.to_string()))?;
    Ok(())
}

fn first_column(row: &rusqlite::Row<'_>) -> Result<i64, rusqlite::Error> {
    row.get(0)
}

type RawIndexRow = (String, String, Option<String>, String, String, i64);

fn read_row(row: &rusqlite::Row<'_>) -> Result<RawIndexRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode(raw: RawIndexRow) -> Result<IndexRecord, EntityGraphError> {
    let (name, kind, scope_label, keys, status, cursor) = raw;
    let element_kind = ElementKind::parse(&kind)
        .ok_or_else(|| EntityGraphError::schema(format!("index {name} has unknown kind {kind}")))?;
    let status = IndexStatus::parse(&status).ok_or_else(|| {
        EntityGraphError::schema(format!("index {name} has unknown status {status}"))
    })?;
    let keys: Vec<String> =
        serde_json::from_str(&keys).map_err(|e| EntityGraphError::schema(e.to_string()))?;
    Ok(IndexRecord {
        definition: IndexDef {
            name,
            element_kind,
            keys,
            scope_label,
        },
        status,
        cursor,
    })
}
