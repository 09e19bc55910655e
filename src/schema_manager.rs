//! Applies a [`SchemaDefinition`] to a live graph.
//!
//! `apply_schema` runs two management transactions, declarations first and
//! indexes second, then blocks until every index it created is enabled.
//! Existing objects are skipped, never altered, so running it again against
//! the same graph is a no-op that creates nothing.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::{
    EntityGraphError,
    config::IndexWaitConfig,
    definition::SchemaDefinition,
    graph::SqliteGraph,
    index::IndexStatus,
    management::SchemaManagement,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaState {
    Undefined,
    Declared,
    IndexesBuilding,
    Ready,
    Failed,
}

pub struct SchemaManager {
    schema: SchemaDefinition,
    index_wait: Option<IndexWaitConfig>,
    cancel: Arc<AtomicBool>,
    state: SchemaState,
}

impl SchemaManager {
    pub fn new(schema: SchemaDefinition) -> Self {
        Self {
            schema,
            index_wait: None,
            cancel: Arc::new(AtomicBool::new(false)),
            state: SchemaState::Undefined,
        }
    }

    /// Overrides the wait bounds taken from the graph's configuration.
    pub fn with_index_wait(mut self, index_wait: IndexWaitConfig) -> Self {
        self.index_wait = Some(index_wait);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Setting the returned flag aborts a running index wait.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    pub fn state(&self) -> SchemaState {
        self.state
    }

    /// Returns the names of the indexes this call created.
    #[instrument(skip_all)]
    pub fn apply_schema(
        &mut self,
        graph: &SqliteGraph,
    ) -> Result<BTreeSet<String>, EntityGraphError> {
        self.state = SchemaState::Undefined;
        let result = self.run(graph);
        if let Err(err) = &result {
            warn!(error = %err, "schema application failed");
            self.state = SchemaState::Failed;
        }
        result
    }

    fn run(&mut self, graph: &SqliteGraph) -> Result<BTreeSet<String>, EntityGraphError> {
        self.declare(graph)?;
        self.state = SchemaState::Declared;

        let created = self.build_indexes(graph)?;
        self.state = SchemaState::IndexesBuilding;

        // Indexes left half-built by an interrupted run are awaited too.
        let mut pending = created.clone();
        for index in &self.schema.indexes {
            if graph.index_status(&index.name)? != Some(IndexStatus::Enabled) {
                pending.insert(index.name.clone());
            }
        }
        let wait = self
            .index_wait
            .clone()
            .unwrap_or_else(|| graph.config().index_wait.clone());
        for name in &pending {
            self.await_index(graph, name, &wait)?;
        }
        self.state = SchemaState::Ready;
        info!(created = created.len(), "schema ready");
        Ok(created)
    }

    fn declare(&self, graph: &SqliteGraph) -> Result<(), EntityGraphError> {
        let mgmt = graph
            .open_management()
            .map_err(|e| EntityGraphError::schema_definition(e.to_string()))?;
        match self.declare_in(&mgmt) {
            Ok(()) => {
                match mgmt.describe() {
                    Ok(description) => info!("schema declared\n{description}"),
                    Err(err) => warn!(error = %err, "could not describe schema"),
                }
                mgmt.commit()
                    .map_err(|e| EntityGraphError::schema_definition(e.to_string()))
            }
            Err(err) => {
                rollback(mgmt);
                Err(EntityGraphError::schema_definition(err.to_string()))
            }
        }
    }

    fn declare_in(&self, mgmt: &SchemaManagement<'_>) -> Result<(), EntityGraphError> {
        for key in &self.schema.property_keys {
            if mgmt.contains_property_key(&key.name)? {
                debug!(key = %key.name, "property key exists");
                continue;
            }
            mgmt.make_property_key(key)?;
        }
        for label in &self.schema.vertex_labels {
            if mgmt.contains_vertex_label(&label.name)? {
                debug!(label = %label.name, "vertex label exists");
                continue;
            }
            mgmt.make_vertex_label(label)?;
        }
        for label in &self.schema.edge_labels {
            if mgmt.contains_edge_label(&label.name)? {
                debug!(label = %label.name, "edge label exists");
                continue;
            }
            mgmt.make_edge_label(label)?;
        }
        Ok(())
    }

    fn build_indexes(&self, graph: &SqliteGraph) -> Result<BTreeSet<String>, EntityGraphError> {
        let mgmt = graph
            .open_management()
            .map_err(|e| EntityGraphError::index_definition(e.to_string()))?;
        match self.build_indexes_in(&mgmt) {
            Ok(created) => {
                mgmt.commit()
                    .map_err(|e| EntityGraphError::index_definition(e.to_string()))?;
                Ok(created)
            }
            Err(err) => {
                rollback(mgmt);
                Err(EntityGraphError::index_definition(err.to_string()))
            }
        }
    }

    fn build_indexes_in(
        &self,
        mgmt: &SchemaManagement<'_>,
    ) -> Result<BTreeSet<String>, EntityGraphError> {
        let mut created = BTreeSet::new();
        for index in &self.schema.indexes {
            if mgmt.contains_graph_index(&index.name)? {
                debug!(index = %index.name, "index exists");
                continue;
            }
            mgmt.build_composite_index(index)?;
            created.insert(index.name.clone());
        }
        Ok(created)
    }

    fn await_index(
        &self,
        graph: &SqliteGraph,
        name: &str,
        wait: &IndexWaitConfig,
    ) -> Result<(), EntityGraphError> {
        let started = Instant::now();
        let timeout = wait.timeout();
        let mut backoff = wait.initial_backoff();
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(EntityGraphError::IndexWaitCancelled(name.to_string()));
            }
            let status = graph.refresh_index_status(name)?;
            if status == IndexStatus::Enabled {
                debug!(index = name, elapsed = ?started.elapsed(), "index enabled");
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(EntityGraphError::IndexWaitTimeout(name.to_string()));
            }
            thread::sleep(backoff.min(timeout - elapsed));
            backoff = next_backoff(backoff, wait.max_backoff());
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).max(Duration::from_millis(1)).min(max)
}

fn rollback(mgmt: SchemaManagement<'_>) {
    if let Err(err) = mgmt.rollback() {
        warn!(error = %err, "schema rollback failed");
    }
}
