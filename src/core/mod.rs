//! Core module - the incremental build engine

pub mod batch;
pub mod compile;
pub mod config;
pub mod convert;
pub mod detect;
pub mod engine;
pub mod graph;
pub mod project;
pub mod service;

pub use batch::{BatchOrchestrator, BatchReport};
pub use compile::Compiler;
pub use config::{Config, ConfigError};
pub use convert::{ConvertError, Converter, ToolError};
pub use detect::{ChangeDetector, Changes, DetectError};
pub use engine::{Engine, RunSummary};
pub use graph::{
    AffectedNote, DroppedLink, FileRecord, Fragment, GraphStats, GraphStore, LinkTarget,
    NoteInfo, NoteRecord,
};
pub use project::{Project, ProjectError};
pub use service::{MetadataService, RunMeta, ServiceHandle};
