//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::{
    build::BuildArgs, completions::CompletionsArgs, graph::GraphCommands, info::InfoArgs,
    init::InitArgs,
};

#[derive(Parser)]
#[command(name = "arbor")]
#[command(author, version, about = "Arbor note compiler")]
#[command(
    long_about = "Incrementally compiles a directory of interlinked plain-text notes into a single static page, re-processing only what changed since the last run."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Note root (default: auto-detect by finding .arbor/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a note directory
    Init(InitArgs),

    /// Detect changes, reprocess them and compile the page
    Build(BuildArgs),

    /// Show one note's titles, aliases and links
    Info(InfoArgs),

    /// Inspect the note graph
    #[command(subcommand)]
    Graph(GraphCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
