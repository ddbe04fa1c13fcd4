use clap::Parser;
use miette::Result;

use arbor::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    match cli.command {
        Commands::Init(args) => arbor::cli::commands::init::run(args),
        Commands::Build(args) => arbor::cli::commands::build::run(args, &global),
        Commands::Info(args) => arbor::cli::commands::info::run(args, &global),
        Commands::Graph(cmd) => arbor::cli::commands::graph::run(cmd, &global),
        Commands::Completions(args) => arbor::cli::commands::completions::run(args),
    }
}
