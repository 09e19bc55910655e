//! Entity-to-graph mapping on an embedded SQLite graph store.
//!
//! The crate covers the schema and index lifecycle ([`SchemaManager`]), an
//! identity-keyed upsert protocol ([`EntityTraversalSource`]), generic entity
//! repositories ([`EntityRepository`]) and the relation query normalizer
//! ([`cypher::normalize`]).

pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod cypher;
pub mod definition;
pub mod domain;
pub mod dsl;
pub mod errors;
pub mod graph;
pub mod index;
pub mod management;
pub mod multi_hop;
pub mod repository;
pub mod schema;
pub mod schema_manager;
pub mod traversal;

pub use crate::backend::GraphBackend;
pub use crate::config::{GraphConfig, IndexWaitConfig, SqliteConfig};
pub use crate::cypher::{QueryClauseSet, normalize};
pub use crate::definition::{
    Cardinality, DataType, ElementKind, IndexDef, Multiplicity, SchemaDefinition,
};
pub use crate::dsl::{DiagnosticSink, EntityTraversalSource, TraceAction, TraceEvent, TracingSink};
pub use crate::errors::EntityGraphError;
pub use crate::graph::{Direction, Element, ElementFilter, GraphTransaction, SqliteGraph, Upserted};
pub use crate::index::IndexStatus;
pub use crate::management::SchemaManagement;
pub use crate::multi_hop::ChainStep;
pub use crate::repository::{
    DependencyQuery, EntityMapping, EntityRepository, VertexReader, VertexWriter,
};
pub use crate::schema_manager::{SchemaManager, SchemaState};
pub use crate::traversal::Traversal;
