//! `arbor info` command - Show one note's metadata and neighbors

use console::style;
use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::GlobalOpts;
use crate::core::graph::GraphStore;

use super::resolve_project;

#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    /// Note id
    pub id: i64,
}

pub fn run(args: InfoArgs, global: &GlobalOpts) -> Result<()> {
    let project = resolve_project(&global.project)?;
    let store = GraphStore::open(&project)?;

    let Some(info) = store.note_info(args.id)? else {
        return Err(miette::miette!("no note with id {}", args.id));
    };

    println!(
        "{} {} {}",
        style(info.id).cyan(),
        style(&info.title).bold(),
        style(format!("({})", info.filename)).dim()
    );

    if !info.aliases.is_empty() {
        println!("Aliases: {}", info.aliases.join(", "));
    }

    if !info.outgoing.is_empty() || !info.incoming.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Direction", "ID", "Title"]);
        for (id, title) in &info.outgoing {
            builder.push_record(["→".to_string(), id.to_string(), title.clone()]);
        }
        for (id, title) in &info.incoming {
            builder.push_record(["←".to_string(), id.to_string(), title.clone()]);
        }
        println!("{}", builder.build().with(Style::markdown()));
    } else {
        println!("{}", style("No links").dim());
    }

    Ok(())
}
