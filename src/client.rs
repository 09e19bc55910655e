use std::path::PathBuf;

use crate::{EntityGraphError, config::GraphConfig, graph::SqliteGraph};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLineConfig {
    pub database: String,
    pub config_path: Option<PathBuf>,
    pub command: String,
    pub query: Option<String>,
    pub id: Option<String>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut database = String::from("memory");
        let mut config_path = None;
        let mut command = String::from("status");
        let mut query = None;
        let mut id = None;
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match *arg {
                "--db" | "--database" => {
                    database = iter
                        .next()
                        .ok_or_else(|| "--db requires a value".to_string())?
                        .to_string();
                }
                "--config" => {
                    config_path = Some(PathBuf::from(
                        iter.next()
                            .ok_or_else(|| "--config requires a value".to_string())?,
                    ));
                }
                "--command" => {
                    command = iter
                        .next()
                        .ok_or_else(|| "--command requires a value".to_string())?
                        .to_string();
                }
                "--query" => {
                    query = Some(
                        iter.next()
                            .ok_or_else(|| "--query requires a value".to_string())?
                            .to_string(),
                    );
                }
                "--id" => {
                    id = Some(
                        iter.next()
                            .ok_or_else(|| "--id requires a value".to_string())?
                            .to_string(),
                    );
                }
                other if other.starts_with('-') => {
                    return Err(format!("unknown flag {other}"));
                }
                _ => {
                    command = arg.to_string();
                }
            }
        }
        Ok(Self {
            database,
            config_path,
            command,
            query,
            id,
        })
    }

    pub fn help() -> &'static str {
        "Usage: entitygraph [--db memory|PATH] [--config FILE] [status|schema|normalize --query Q --id ID]\n"
    }

    pub fn graph_config(&self) -> Result<GraphConfig, EntityGraphError> {
        match &self.config_path {
            Some(path) => GraphConfig::from_file(path),
            None => Ok(GraphConfig::default()),
        }
    }

    pub fn open_graph(&self) -> Result<SqliteGraph, EntityGraphError> {
        let config = self.graph_config()?;
        if self.database == "memory" {
            SqliteGraph::open_in_memory_with_config(config)
        } else {
            SqliteGraph::open_with_config(&self.database, config)
        }
    }
}
