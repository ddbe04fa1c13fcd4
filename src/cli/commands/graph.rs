//! `arbor graph` command - Inspect the note graph
//!
//! The graph database is project-local state under .arbor/. `status`
//! summarizes it; `query` runs read-only SQL against it for power users.

use chrono::DateTime;
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::GlobalOpts;
use crate::core::graph::GraphStore;

use super::resolve_project;

#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// Show graph statistics
    Status,

    /// Execute SQL query against the graph (read-only)
    Query {
        /// SQL query to execute
        sql: String,
    },
}

pub fn run(cmd: GraphCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        GraphCommands::Status => run_status(global),
        GraphCommands::Query { sql } => run_query(&sql, global),
    }
}

fn run_status(global: &GlobalOpts) -> Result<()> {
    let project = resolve_project(&global.project)?;
    let store = GraphStore::open(&project)?;
    let stats = store.stats()?;

    let last_run = if stats.last_run == 0.0 {
        "never".to_string()
    } else {
        DateTime::from_timestamp(stats.last_run as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    };

    println!("{} Note graph", style("→").blue());
    println!("  Notes:    {}", stats.notes);
    println!("  Files:    {}", stats.files);
    println!("  Links:    {}", stats.links);
    println!("  Aliases:  {}", stats.aliases);
    println!("  Last run: {}", last_run);
    println!("  Database: {} ({} bytes)", stats.db_path.display(), stats.db_size_bytes);

    if !stats.by_extension.is_empty() {
        let mut extensions: Vec<_> = stats.by_extension.iter().collect();
        extensions.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        println!("  By type:");
        for (ext, count) in extensions {
            println!("    .{:<10} {}", ext, count);
        }
    }

    Ok(())
}

fn run_query(sql: &str, global: &GlobalOpts) -> Result<()> {
    let project = resolve_project(&global.project)?;
    let store = GraphStore::open(&project)?;

    let columns = store.query_columns(sql)?;
    let rows = store.query_raw(sql)?;

    println!("{}", columns.join("\t"));
    for row in rows {
        println!("{}", row.join("\t"));
    }

    Ok(())
}
