//! Arbor: incremental note-graph compiler
//!
//! Compiles a directory of interlinked plain-text notes into a single
//! static page, re-processing only what changed since the last run.

pub mod cli;
pub mod core;
