//! `arbor build` command - the full incremental run
//!
//! Validation happens before any mutating stage: a malformed config or a
//! missing external tool aborts before the store is even opened.

use console::style;
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::GlobalOpts;
use crate::core::config::Config;
use crate::core::convert::ensure_tool;
use crate::core::engine::{Engine, RunSummary};
use crate::core::graph::GraphStore;

use super::resolve_project;

#[derive(clap::Args, Debug)]
pub struct BuildArgs {}

pub fn run(_args: BuildArgs, global: &GlobalOpts) -> Result<()> {
    let project = resolve_project(&global.project)?;

    let config = Config::load(&project);
    config.validate().map_err(|e| miette::miette!("{}", e))?;

    ensure_tool(&config.converter()).map_err(|e| miette::miette!("{}", e))?;
    ensure_tool(&config.renderer()).map_err(|e| miette::miette!("{}", e))?;

    let mut store = GraphStore::open(&project)?;
    let summary = Engine::new(&project, &config).run(&mut store)?;

    report(&summary, global);

    if summary.report.is_clean() {
        Ok(())
    } else {
        Err(miette::miette!(
            "{} file(s) failed to convert; they will be retried on the next build",
            summary.report.failures.len()
        ))
    }
}

fn report(summary: &RunSummary, global: &GlobalOpts) {
    for dropped in &summary.report.dropped_links {
        eprintln!(
            "Warning: {}: dropped link to unknown note {:?}",
            dropped.src_filename, dropped.target
        );
    }
    for vanished in &summary.report.vanished {
        eprintln!("Warning: {} vanished before conversion", vanished);
    }
    for failure in &summary.report.failures {
        eprintln!("{} {}", style("✗").red(), failure);
    }

    if !global.quiet {
        let changes = &summary.changes;
        if changes.is_empty() {
            println!("{} No note changes detected", style("✓").green());
        } else if global.verbose {
            println!(
                "{} {} added, {} modified, {} deleted",
                style("→").blue(),
                changes.added.len(),
                changes.modified.len(),
                changes.deleted.len()
            );
        }
        println!(
            "{} Compiled {} note(s) into {}",
            style("✓").green(),
            summary.report.processed,
            style(summary.artifact.display()).cyan()
        );
    }

    if !summary.affected.is_empty() {
        println!();
        println!(
            "{} The notes below reference notes that were just updated.",
            style("⚠").yellow()
        );
        println!("  You might want to review them for stale links.");

        let mut builder = Builder::default();
        builder.push_record(["ID", "Title", "File"]);
        for note in &summary.affected {
            builder.push_record([
                note.id.to_string(),
                note.title.clone(),
                note.filename.clone(),
            ]);
        }
        println!("{}", builder.build().with(Style::markdown()));
    }
}
