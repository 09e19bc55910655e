use std::{env, process};

use tracing_subscriber::EnvFilter;

use entitygraph::{
    EntityGraphError, SchemaManager, SqliteGraph, client::CommandLineConfig, cypher,
    domain::artifact_schema, index,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let config = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };

    if let Err(err) = run_command(&config) {
        eprintln!("command failed: {err}");
        process::exit(1);
    }
}

fn run_command(config: &CommandLineConfig) -> Result<(), EntityGraphError> {
    match config.command.as_str() {
        "status" => {
            let graph = config.open_graph()?;
            print_status(&graph)
        }
        "schema" => {
            let graph = config.open_graph()?;
            let created = SchemaManager::new(artifact_schema()?).apply_schema(&graph)?;
            for name in &created {
                println!("created index {name}");
            }
            print_status(&graph)
        }
        "normalize" => {
            let query = config
                .query
                .as_deref()
                .ok_or_else(|| EntityGraphError::invalid_input("normalize requires --query"))?;
            let id = config
                .id
                .as_deref()
                .ok_or_else(|| EntityGraphError::invalid_input("normalize requires --id"))?;
            println!("{}", cypher::normalize(query, id)?);
            Ok(())
        }
        other => Err(EntityGraphError::invalid_input(format!(
            "unknown command {other}"
        ))),
    }
}

fn print_status(graph: &SqliteGraph) -> Result<(), EntityGraphError> {
    println!(
        "vertices={} edges={}",
        graph.vertex_count()?,
        graph.edge_count()?
    );
    for record in index::list(graph)? {
        println!(
            "index {} status={}",
            record.definition.name,
            record.status.as_str()
        );
    }
    Ok(())
}
