//! `arbor init` command - Initialize a note directory

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::core::graph::GraphStore;
use crate::core::project::Project;

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Force initialization even if .arbor/ already exists
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
    }

    let project = if args.force {
        Project::init_force(&path)
    } else {
        Project::init(&path)
    }
    .map_err(|e| miette::miette!("{}", e))?;

    // Materialize the graph database up front so the first build starts
    // from a well-formed store.
    GraphStore::open(&project)?;

    println!(
        "{} Initialized arbor notes in {}",
        style("✓").green(),
        style(project.root().display()).cyan()
    );
    println!();
    println!("Next steps:");
    println!("  1. Write notes matching the patterns in .arbor/patterns");
    println!("  2. Point .arbor/config.yaml at your converter and renderer");
    println!("  3. Run 'arbor build'");

    Ok(())
}
