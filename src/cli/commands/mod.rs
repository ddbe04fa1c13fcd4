//! CLI command implementations

pub mod build;
pub mod completions;
pub mod graph;
pub mod info;
pub mod init;

use std::path::PathBuf;

use miette::Result;

use crate::core::project::Project;

/// Resolve the note root from --project or by walking up
pub(crate) fn resolve_project(project: &Option<PathBuf>) -> Result<Project> {
    let result = match project {
        Some(path) => Project::discover_from(path),
        None => Project::discover(),
    };
    result.map_err(|e| miette::miette!("{}", e))
}
